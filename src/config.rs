//! Runtime tunables.
//!
//! The planner's knobs are read from the environment once per instance, the
//! same way the original tool family exposes its tolerance and path-length
//! settings. Malformed values fall back to the compiled defaults with a
//! warning rather than failing initialization.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// Global error floor below which paths are considered interchangeable.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
/// Maximum number of conversions in a planned chain.
pub const DEFAULT_PATH_LENGTH: usize = 5;
/// Cost weight in the planner objective.
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Error weight in the planner objective; errors dominate unless tiny.
pub const DEFAULT_BETA: f64 = 1e6;

#[derive(Clone, Debug)]
pub struct Tunables {
    pub tolerance: f64,
    pub max_path_length: usize,
    pub alpha: f64,
    pub beta: f64,
    /// Disk-cache file; `None` disables persistence.
    pub cache_path: Option<PathBuf>,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            tolerance: DEFAULT_TOLERANCE,
            max_path_length: DEFAULT_PATH_LENGTH,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            cache_path: None,
        }
    }
}

impl Tunables {
    pub fn from_env() -> Self {
        Tunables {
            tolerance: parsed_var("PIXELFISH_TOLERANCE", DEFAULT_TOLERANCE),
            max_path_length: parsed_var("PIXELFISH_PATH_LENGTH", DEFAULT_PATH_LENGTH),
            alpha: parsed_var("PIXELFISH_ALPHA", DEFAULT_ALPHA),
            beta: parsed_var("PIXELFISH_BETA", DEFAULT_BETA),
            cache_path: env::var_os("PIXELFISH_CACHE").map(PathBuf::from),
        }
    }
}

fn parsed_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(target: "config", var = name, value = %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

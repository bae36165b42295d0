//! pixelfish: a dynamically extensible pixel-format conversion library.
//!
//! Registries of numeric types, components, color models and packed formats
//! form a typed conversion graph; a bounded best-path planner compiles
//! chains of registered conversion primitives into *fishes*, cached
//! process-wide and executed by a streaming dispatcher.
//!
//! ## Invariants
//!
//! - **Names are identity.** Every node kind interns its names; equal name
//!   means equal node, and ids are dense and stable for the instance's life.
//! - **Nodes are immutable after registration.** Conversions, formats and
//!   models never change once published; fishes are publish-once cache
//!   entries.
//! - **Primitives are pure.** A conversion kernel reads its source buffer
//!   and writes its destination buffer, nothing else. Concurrent `process`
//!   calls on disjoint buffers commute.
//! - **A fish always exists.** When no admissible chain is found the
//!   planner falls back to the reference route through RGBA double, which
//!   is constructible for every registered format.
//! - **Determinism.** With a fixed registry the corpus seed fixes every
//!   measured error, so repeated planning yields identical chains.
//!
//! ## Quick start
//!
//! ```
//! pixelfish::init();
//! let fish = pixelfish::fish("R'G'B' u8", "R'G'B'A float").unwrap();
//! let src = [255u8, 0, 0];
//! let mut dst = [0u8; 16];
//! let n = pixelfish::process(&fish, &src, &mut dst, 1).unwrap();
//! assert_eq!(n, 1);
//! pixelfish::exit();
//! ```

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tracing::{debug, info};

mod base;
mod cache;
pub mod config;
pub mod conversion;
pub mod corpus;
pub mod fish;
pub mod node;
pub mod planner;
pub mod registry;

pub use config::Tunables;
pub use conversion::{ConvId, Kernel, KernelCtx, KernelError};
pub use fish::{Fish, Scratch};
pub use node::{ComponentId, Endpoint, FormatId, ModelFlags, ModelId, NodeKind, TypeId};
pub use planner::PLANNER_VERSION;

use cache::{DiskCache, FishCache};
use corpus::Corpus;
use fish::FishKind;
use planner::Planner;
use registry::Registry;

/// Library error kinds. Lookups surface unknown names as `None`; operations
/// that must succeed post-init surface them as [`Error::UnknownName`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The process-wide instance is not initialized (or already torn down).
    #[error("pixelfish is not initialized")]
    NotInitialized,
    /// A name was not found in the registry.
    #[error("unknown name: {0}")]
    UnknownName(String),
    /// A name was re-registered with different attributes.
    #[error("`{name}` re-registered with incompatible attributes")]
    DuplicateIncompatible { name: String },
    /// No conversion chain exists between the two formats. Kept for
    /// completeness: under the built-in registrations the reference fallback
    /// always exists and this kind never reaches callers.
    #[error("no conversion path from `{src}` to `{dst}`")]
    NoPath { src: String, dst: String },
    /// A conversion primitive reported failure; the fish is marked unusable.
    #[error(transparent)]
    Primitive(#[from] KernelError),
}

/// One fully independent library instance: registry, corpus, tunables and
/// fish caches. The public free functions operate on a process-wide
/// singleton; tests may construct private instances instead.
pub struct Instance {
    registry: RwLock<Registry>,
    corpus: Corpus,
    tunables: Tunables,
    fishes: FishCache,
    error_memo: Mutex<HashMap<[u8; 32], f64>>,
    disk: Option<Mutex<DiskCache>>,
}

impl Instance {
    /// Build an instance with environment-derived tunables.
    pub fn new() -> Self {
        Self::with_tunables(Tunables::from_env())
    }

    pub fn with_tunables(tunables: Tunables) -> Self {
        let mut reg = Registry::new();
        base::register_all(&mut reg).expect("built-in registrations are consistent");
        let disk = tunables
            .cache_path
            .clone()
            .map(|path| Mutex::new(DiskCache::load(path, &reg)));
        Instance {
            registry: RwLock::new(reg),
            corpus: Corpus::generate(),
            tunables,
            fishes: FishCache::new(),
            error_memo: Mutex::new(HashMap::new()),
            disk,
        }
    }

    /// Read access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.registry.read().expect("poisoned registry lock"))
    }

    /// Exclusive access for user-driven registrations.
    pub fn with_registry_mut<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.registry.write().expect("poisoned registry lock"))
    }

    pub fn lookup_format(&self, name: &str) -> Option<FormatId> {
        self.with_registry(|r| r.lookup_format(name))
    }

    /// Compile (or fetch) the fish between two formats, by name.
    pub fn fish(&self, src: &str, dst: &str) -> Result<Arc<Fish>, Error> {
        let (s, d) = self.with_registry(|r| (r.lookup_format(src), r.lookup_format(dst)));
        let s = s.ok_or_else(|| Error::UnknownName(src.to_string()))?;
        let d = d.ok_or_else(|| Error::UnknownName(dst.to_string()))?;
        self.fish_by_id(s, d)
    }

    pub fn fish_by_id(&self, src: FormatId, dst: FormatId) -> Result<Arc<Fish>, Error> {
        let key = (src, dst, PLANNER_VERSION);
        if let Some(f) = self.fishes.lookup(key) {
            return Ok(f);
        }
        // Serialize planning; a racing caller re-checks under the gate.
        let _gate = self.fishes.gate();
        if let Some(f) = self.fishes.lookup(key) {
            return Ok(f);
        }
        let reg = self.registry.read().expect("poisoned registry lock");
        if !self.fishes.begin(key) {
            // Re-entered the planner for a pair already being planned:
            // break the cycle with an uncached reference fish.
            return Ok(Arc::new(Fish::reference(&reg, src, dst)?));
        }
        let planned = self.plan_fish(&reg, src, dst);
        self.fishes.finish(key);
        Ok(self.fishes.install(key, Arc::new(planned?)))
    }

    fn plan_fish(&self, reg: &Registry, src: FormatId, dst: FormatId) -> Result<Fish, Error> {
        if src == dst {
            return Ok(Fish::new(reg, src, dst, FishKind::Path(Vec::new()), 0.0, 0.0));
        }

        if let Some(disk) = &self.disk {
            let hit = disk
                .lock()
                .expect("poisoned disk cache")
                .lookup_valid(reg, src, dst, self.tunables.tolerance);
            if let Some((chain, cost, error)) = hit {
                debug!(
                    target: "cache",
                    src = %reg.format(src).name,
                    dst = %reg.format(dst).name,
                    "fish restored from disk cache"
                );
                let kind = if chain.len() == 1 {
                    FishKind::Simple(chain[0])
                } else {
                    FishKind::Path(chain)
                };
                return Ok(Fish::new(reg, src, dst, kind, cost, error));
            }
        }

        let planner = Planner {
            reg,
            corpus: &self.corpus,
            tunables: &self.tunables,
            memo: &self.error_memo,
        };
        match planner.plan(src, dst) {
            Some(path) => {
                if let Some(disk) = &self.disk {
                    disk.lock().expect("poisoned disk cache").remember(
                        reg,
                        src,
                        dst,
                        &path.chain,
                        path.cost,
                        path.error,
                    );
                }
                let kind = if path.chain.len() == 1 {
                    FishKind::Simple(path.chain[0])
                } else {
                    FishKind::Path(path.chain)
                };
                Ok(Fish::new(reg, src, dst, kind, path.cost, path.error))
            }
            None => {
                info!(
                    target: "planner",
                    src = %reg.format(src).name,
                    dst = %reg.format(dst).name,
                    "no admissible chain, using the reference fish"
                );
                Fish::reference(reg, src, dst)
            }
        }
    }

    /// Stream `n` pixels through `fish`, drawing scratch from the calling
    /// thread's pool.
    pub fn process(
        &self,
        fish: &Fish,
        src: &[u8],
        dst: &mut [u8],
        n: usize,
    ) -> Result<usize, Error> {
        let reg = self.registry.read().expect("poisoned registry lock");
        fish::with_pooled_scratch(|scratch| fish.dispatch(&reg, src, dst, n, scratch))
    }

    /// Like [`Instance::process`] but with caller-owned scratch, for callers
    /// that pre-size buffers once and never allocate on the hot path.
    pub fn process_with(
        &self,
        fish: &Fish,
        scratch: &mut Scratch,
        src: &[u8],
        dst: &mut [u8],
        n: usize,
    ) -> Result<usize, Error> {
        let reg = self.registry.read().expect("poisoned registry lock");
        fish.dispatch(&reg, src, dst, n, scratch)
    }

    /// Number of fishes published so far.
    pub fn cached_fishes(&self) -> usize {
        self.fishes.len()
    }
}

impl Default for Instance {
    fn default() -> Self {
        Instance::new()
    }
}

// ============================================================================
// Process-wide singleton surface
// ============================================================================

static INSTANCE: OnceLock<RwLock<Option<Arc<Instance>>>> = OnceLock::new();

fn cell() -> &'static RwLock<Option<Arc<Instance>>> {
    INSTANCE.get_or_init(|| RwLock::new(None))
}

/// Initialize the process-wide instance. Idempotent.
pub fn init() {
    let mut guard = cell().write().expect("poisoned instance cell");
    if guard.is_none() {
        *guard = Some(Arc::new(Instance::new()));
    }
}

/// Tear the process-wide instance down, draining the fish cache and the
/// registry. Subsequent API use fails with [`Error::NotInitialized`] until
/// the next [`init`].
pub fn exit() {
    cell().write().expect("poisoned instance cell").take();
}

fn current() -> Result<Arc<Instance>, Error> {
    cell()
        .read()
        .expect("poisoned instance cell")
        .as_ref()
        .cloned()
        .ok_or(Error::NotInitialized)
}

/// Look up a numeric type by name. `None` when unknown or pre-init.
pub fn ty(name: &str) -> Option<TypeId> {
    current().ok()?.with_registry(|r| r.lookup_type(name))
}

/// Look up a component by name.
pub fn component(name: &str) -> Option<ComponentId> {
    current().ok()?.with_registry(|r| r.lookup_component(name))
}

/// Look up a model by name.
pub fn model(name: &str) -> Option<ModelId> {
    current().ok()?.with_registry(|r| r.lookup_model(name))
}

/// Look up a format by name.
pub fn format(name: &str) -> Option<FormatId> {
    current().ok()?.with_registry(|r| r.lookup_format(name))
}

pub fn format_exists(name: &str) -> bool {
    format(name).is_some()
}

pub fn format_n_components(fmt: FormatId) -> Result<usize, Error> {
    Ok(current()?.with_registry(|r| r.format(fmt).n_components()))
}

pub fn format_bytes_per_pixel(fmt: FormatId) -> Result<usize, Error> {
    Ok(current()?.with_registry(|r| r.format(fmt).bytes_per_pixel))
}

/// The type of a format's `i`-th component (in layout order).
pub fn format_type(fmt: FormatId, i: usize) -> Result<TypeId, Error> {
    current()?.with_registry(|r| {
        r.format(fmt)
            .types
            .get(i)
            .copied()
            .ok_or_else(|| Error::UnknownName(format!("component index {i}")))
    })
}

/// The interned name of a node.
pub fn get_name(node: Endpoint) -> Result<String, Error> {
    Ok(current()?.with_registry(|r| r.endpoint_name(node).to_string()))
}

/// Register a conversion between two same-kind nodes, resolved by name
/// (formats first, then models, then types).
pub fn conversion_new(
    src: &str,
    dst: &str,
    kernel: Kernel,
    cost: Option<f64>,
) -> Result<ConvId, Error> {
    let instance = current()?;
    instance.with_registry_mut(|reg| {
        let resolve = |reg: &Registry, name: &str| -> Result<Endpoint, Error> {
            if let Some(f) = reg.lookup_format(name) {
                return Ok(Endpoint::Format(f));
            }
            if let Some(m) = reg.lookup_model(name) {
                return Ok(Endpoint::Model(m));
            }
            if let Some(t) = reg.lookup_type(name) {
                return Ok(Endpoint::Type(t));
            }
            Err(Error::UnknownName(name.to_string()))
        };
        let src = resolve(reg, src)?;
        let dst = resolve(reg, dst)?;
        reg.register_conversion(registry::ConversionSpec {
            src,
            dst,
            kernel,
            cost,
            error: None,
            plane_fn: None,
        })
    })
}

/// Compile (or fetch) the fish translating `src` into `dst`.
pub fn fish(src: &str, dst: &str) -> Result<Arc<Fish>, Error> {
    current()?.fish(src, dst)
}

/// Stream `n` pixels through `fish`; returns the number processed.
pub fn process(fish: &Fish, src: &[u8], dst: &mut [u8], n: usize) -> Result<usize, Error> {
    current()?.process(fish, src, dst, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_are_independent() {
        let a = Instance::with_tunables(Tunables::default());
        let b = Instance::with_tunables(Tunables::default());
        let fish = a.fish("R'G'B' u8", "R'G'B' float").unwrap();
        assert_eq!(a.cached_fishes(), 1);
        assert_eq!(b.cached_fishes(), 0);
        assert_eq!(fish.source_bpp(), 3);
        assert_eq!(fish.dest_bpp(), 12);
    }

    #[test]
    fn identity_fish_is_a_copy() {
        let inst = Instance::with_tunables(Tunables::default());
        let fish = inst.fish("R'G'B' u8", "R'G'B' u8").unwrap();
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        inst.process(&fish, &src, &mut dst, 2).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn fishes_are_cached_per_pair() {
        let inst = Instance::with_tunables(Tunables::default());
        let a = inst.fish("R'G'B' u8", "R'G'B' float").unwrap();
        let b = inst.fish("R'G'B' u8", "R'G'B' float").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(inst.cached_fishes(), 1);
    }

    #[test]
    fn unknown_names_are_reported() {
        let inst = Instance::with_tunables(Tunables::default());
        let err = inst.fish("R'G'B' u8", "no such format").unwrap_err();
        assert!(matches!(err, Error::UnknownName(n) if n == "no such format"));
    }
}

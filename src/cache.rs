//! Fish memoization: the in-process cache and the optional on-disk cache.
//!
//! ## In-process cache
//! Keyed by `(source, destination, planner version)`. Lookups after publish
//! take only the shared lock; planning itself is serialized behind a gate so
//! concurrent misses on the same pair do not duplicate work. An in-flight
//! key set breaks pathological re-entrancy by letting the caller fall back
//! to a reference fish instead of recursing.
//!
//! ## Disk cache
//! Append-only UTF-8 text, one record per line:
//!
//! ```text
//! SRC | DST | COST | ERROR | C1,C2,...,Ck
//! ```
//!
//! Comment lines start with `#`; unknown or garbled lines are ignored. The
//! header records a digest of the registry's conversion set; when it does
//! not match at load time every record is dropped and the planner recomputes.
//! Individual records are additionally validated against the live registry
//! (every conversion resolves, the chain composes, the recorded error is
//! within tolerance) before being trusted.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, warn};

use crate::conversion::ConvId;
use crate::fish::Fish;
use crate::node::{Endpoint, FormatId};
use crate::registry::Registry;

pub(crate) type FishKey = (FormatId, FormatId, u32);

pub(crate) struct FishCache {
    map: RwLock<HashMap<FishKey, Arc<Fish>>>,
    plan_gate: Mutex<()>,
    in_flight: Mutex<HashSet<FishKey>>,
}

impl FishCache {
    pub fn new() -> Self {
        FishCache {
            map: RwLock::new(HashMap::new()),
            plan_gate: Mutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn lookup(&self, key: FishKey) -> Option<Arc<Fish>> {
        self.map.read().expect("poisoned fish cache").get(&key).cloned()
    }

    /// Publish-once installation; a racing earlier publish wins.
    pub fn install(&self, key: FishKey, fish: Arc<Fish>) -> Arc<Fish> {
        let mut map = self.map.write().expect("poisoned fish cache");
        map.entry(key).or_insert(fish).clone()
    }

    /// Serialize planner invocations. Held for the duration of a plan.
    pub fn gate(&self) -> MutexGuard<'_, ()> {
        self.plan_gate.lock().expect("poisoned plan gate")
    }

    /// Mark a key as being planned. Returns false when the key is already
    /// in flight, i.e. the caller re-entered the planner for the same pair.
    pub fn begin(&self, key: FishKey) -> bool {
        self.in_flight.lock().expect("poisoned in-flight set").insert(key)
    }

    pub fn finish(&self, key: FishKey) {
        self.in_flight.lock().expect("poisoned in-flight set").remove(&key);
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("poisoned fish cache").len()
    }
}

// ============================================================================
// Disk cache
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DiskRecord {
    pub cost: f64,
    pub error: f64,
    pub conversions: Vec<String>,
}

pub(crate) struct DiskCache {
    path: PathBuf,
    digest: String,
    records: HashMap<(String, String), DiskRecord>,
    /// Whether the backing file already carries our header.
    has_header: bool,
}

impl DiskCache {
    /// Load the cache file, dropping everything when the registry digest in
    /// the header no longer matches the live conversion set.
    pub fn load(path: PathBuf, reg: &Registry) -> Self {
        let digest = hex::encode(reg.conversion_digest());
        let mut cache = DiskCache {
            path,
            digest,
            records: HashMap::new(),
            has_header: false,
        };

        let text = match std::fs::read_to_string(&cache.path) {
            Ok(t) => t,
            Err(_) => return cache,
        };
        cache.has_header = true;

        let mut stale = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('#') {
                if let Some(d) = rest.trim().strip_prefix("registry ") {
                    if d.trim() != cache.digest {
                        debug!(target: "cache", "registry digest changed, dropping persisted plans");
                        stale = true;
                    }
                }
                continue;
            }
            if stale {
                continue;
            }
            if let Some((key, rec)) = parse_record(line) {
                cache.records.insert(key, rec);
            }
        }
        debug!(
            target: "cache",
            path = %cache.path.display(),
            records = cache.records.len(),
            "disk cache loaded"
        );
        cache
    }

    /// Resolve a persisted record into a live conversion chain. `None` when
    /// absent, stale, mis-composed, or over the error ceiling; the caller
    /// plans from scratch in every such case.
    pub fn lookup_valid(
        &self,
        reg: &Registry,
        src: FormatId,
        dst: FormatId,
        ceiling: f64,
    ) -> Option<(Vec<ConvId>, f64, f64)> {
        let key = (
            reg.format(src).name.clone(),
            reg.format(dst).name.clone(),
        );
        let rec = self.records.get(&key)?;
        if !(rec.error <= ceiling) {
            return None;
        }
        let mut chain = Vec::with_capacity(rec.conversions.len());
        for name in &rec.conversions {
            chain.push(reg.lookup_conversion(name)?);
        }
        // The chain must still compose and span the requested pair.
        let mut at = Endpoint::Format(src);
        for &cid in &chain {
            let conv = reg.conversion(cid);
            if conv.src != at {
                return None;
            }
            at = conv.dst;
        }
        if at != Endpoint::Format(dst) {
            return None;
        }
        Some((chain, rec.cost, rec.error))
    }

    /// Persist a freshly planned chain. Best-effort: I/O failures only warn.
    pub fn remember(
        &mut self,
        reg: &Registry,
        src: FormatId,
        dst: FormatId,
        chain: &[ConvId],
        cost: f64,
        error: f64,
    ) {
        let key = (
            reg.format(src).name.clone(),
            reg.format(dst).name.clone(),
        );
        if self.records.contains_key(&key) {
            return;
        }
        let names: Vec<String> =
            chain.iter().map(|&c| reg.conversion(c).name.clone()).collect();
        let line = format!("{} | {} | {} | {} | {}\n", key.0, key.1, cost, error, names.join(","));

        let mut file = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(target: "cache", error = %e, path = %self.path.display(), "cannot append to disk cache");
                return;
            }
        };
        let mut payload = String::new();
        if !self.has_header {
            payload.push_str("# pixelfish fish cache v1\n");
            payload.push_str(&format!("# registry {}\n", self.digest));
            self.has_header = true;
        }
        payload.push_str(&line);
        if let Err(e) = file.write_all(payload.as_bytes()) {
            warn!(target: "cache", error = %e, "disk cache write failed");
            return;
        }
        self.records.insert(key, DiskRecord { cost, error, conversions: names });
    }
}

fn parse_record(line: &str) -> Option<((String, String), DiskRecord)> {
    let mut parts = line.split('|').map(str::trim);
    let src = parts.next()?.to_string();
    let dst = parts.next()?.to_string();
    let cost: f64 = parts.next()?.parse().ok()?;
    let error: f64 = parts.next()?.parse().ok()?;
    let convs = parts.next()?;
    if parts.next().is_some() || src.is_empty() || dst.is_empty() {
        return None;
    }
    let conversions: Vec<String> =
        convs.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if conversions.is_empty() {
        return None;
    }
    Some(((src, dst), DiskRecord { cost, error, conversions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_parse_and_reject_garbage() {
        let (key, rec) =
            parse_record("R'G'B' u8 | CIE Lab u8 | 40 | 0.00001 | a to b,b to c").unwrap();
        assert_eq!(key.0, "R'G'B' u8");
        assert_eq!(rec.conversions, vec!["a to b".to_string(), "b to c".to_string()]);
        assert_eq!(rec.cost, 40.0);

        assert!(parse_record("not a record").is_none());
        assert!(parse_record("a | b | NaNish | 0 | c").is_none());
        assert!(parse_record("a | b | 1 | 0 | ").is_none());
    }

    #[test]
    fn in_flight_keys_are_exclusive() {
        let cache = FishCache::new();
        let key = (FormatId(1), FormatId(2), 1);
        assert!(cache.begin(key));
        assert!(!cache.begin(key));
        cache.finish(key);
        assert!(cache.begin(key));
    }

    #[test]
    fn disk_round_trip_with_digest() {
        use crate::registry::{Registry, TypeSpec};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fishes.txt");

        let mut reg = Registry::new();
        reg.register_type(TypeSpec {
            name: "double",
            bits: 64,
            integer: false,
            signed: true,
            linear: true,
        })
        .unwrap();

        std::fs::write(
            &path,
            format!(
                "# pixelfish fish cache v1\n# registry {}\nA | B | 12 | 0.5 | A to B\n",
                hex::encode(reg.conversion_digest())
            ),
        )
        .unwrap();
        let cache = DiskCache::load(path.clone(), &reg);
        assert_eq!(cache.records.len(), 1);

        // A digest mismatch drops everything silently.
        std::fs::write(
            &path,
            "# pixelfish fish cache v1\n# registry deadbeef\nA | B | 12 | 0.5 | A to B\n",
        )
        .unwrap();
        let cache = DiskCache::load(path, &reg);
        assert!(cache.records.is_empty());
    }
}

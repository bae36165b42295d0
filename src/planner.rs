//! The path planner: bounded best-path search over the conversion graph.
//!
//! Given a source and destination format the planner enumerates conversion
//! chains through the source-indexed adjacency, scores each complete chain
//! with `objective = α·cost + β·error`, and keeps the best admissible one.
//!
//! ## Search discipline
//! - Depth-first with iterative deepening on chain length, up to the
//!   configured maximum (default 5).
//! - A visited set prevents cycles; a node is re-entered only through a
//!   different depth iteration.
//! - Branch-and-bound: a partial chain is abandoned once its accumulated
//!   cost alone can no longer beat the incumbent objective (error is
//!   non-negative, so `α·cost` is an admissible lower bound).
//!
//! ## Error measurement
//! Chains that survive pruning are measured empirically: the test corpus is
//! packed into the source format, pushed through the candidate, normalized
//! back to RGBA double, and compared against the reference route for the
//! same pair. The metric is the per-pixel maximum absolute channel
//! deviation, averaged over the corpus, memoized per chain hash.
//!
//! The admissibility ceiling starts unbounded and tightens to
//! `max(tolerance floor, best error so far)` as candidates land. Chains
//! within 1% of the incumbent objective are tie-broken toward fewer edges,
//! fewer reference edges, then the lexicographically smaller id sequence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::config::Tunables;
use crate::conversion::ConvId;
use crate::corpus::Corpus;
use crate::fish::{reference_stages, run_chain, Scratch};
use crate::node::{Endpoint, FormatId};
use crate::registry::Registry;

/// Cache-key version: bump when the search or scoring semantics change so
/// persisted and memoized plans are not reused across incompatible planners.
pub const PLANNER_VERSION: u32 = 1;

/// A chain selected by the planner.
#[derive(Clone, Debug)]
pub struct PlannedPath {
    pub chain: Vec<ConvId>,
    pub cost: f64,
    pub error: f64,
}

#[derive(Clone)]
struct Candidate {
    chain: Vec<ConvId>,
    cost: f64,
    error: f64,
    objective: f64,
    n_reference: usize,
}

pub(crate) struct Planner<'a> {
    pub reg: &'a Registry,
    pub corpus: &'a Corpus,
    pub tunables: &'a Tunables,
    /// Measured chain errors, keyed by blake3 of the conversion id sequence.
    pub memo: &'a Mutex<HashMap<[u8; 32], f64>>,
}

impl<'a> Planner<'a> {
    /// Find the best admissible chain from `src` to `dst`, or `None` when no
    /// measurable chain exists within the length bound (the caller then
    /// falls back to a reference fish).
    pub fn plan(&self, src: FormatId, dst: FormatId) -> Option<PlannedPath> {
        debug_assert_ne!(src, dst, "identity pairs are handled by the fish cache");

        let mut best: Option<Candidate> = None;
        let mut stack = Vec::with_capacity(self.tunables.max_path_length);
        for depth in 1..=self.tunables.max_path_length {
            let mut visited = HashSet::with_capacity(depth * 4);
            visited.insert(src);
            self.dfs(src, dst, depth, 0.0, &mut stack, &mut visited, &mut best);
        }

        best.map(|b| {
            debug!(
                target: "planner",
                src = %self.reg.format(src).name,
                dst = %self.reg.format(dst).name,
                edges = b.chain.len(),
                cost = b.cost,
                error = b.error,
                "path selected"
            );
            PlannedPath { chain: b.chain, cost: b.cost, error: b.error }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        node: FormatId,
        dst: FormatId,
        remaining: usize,
        cost_so_far: f64,
        stack: &mut Vec<ConvId>,
        visited: &mut HashSet<FormatId>,
        best: &mut Option<Candidate>,
    ) {
        if remaining == 0 {
            return;
        }
        // Clone the adjacency ids up front; the list is short and this keeps
        // the borrow of the registry out of the recursion.
        let from_list = self.reg.format(node).from_list.clone();
        for cid in from_list {
            let conv = self.reg.conversion(cid);
            let Endpoint::Format(next) = conv.dst else { continue };
            if visited.contains(&next) {
                continue;
            }
            let cost = cost_so_far + conv.cost;
            if let Some(b) = best.as_ref() {
                // Keep partial chains that could still land inside the 1%
                // tie-break band of the incumbent.
                if self.tunables.alpha * cost > b.objective * 1.01 {
                    continue;
                }
            }
            stack.push(cid);
            if next == dst {
                self.consider(src_of(self.reg, stack), stack, cost, best);
            } else {
                visited.insert(next);
                self.dfs(next, dst, remaining - 1, cost, stack, visited, best);
                visited.remove(&next);
            }
            stack.pop();
        }
    }

    fn consider(
        &self,
        src: FormatId,
        chain: &[ConvId],
        cost: f64,
        best: &mut Option<Candidate>,
    ) {
        let ceiling = match best.as_ref() {
            Some(b) => self.tunables.tolerance.max(b.error),
            None => f64::INFINITY,
        };
        let error = self.measure_chain(src, chain);
        if !(error <= ceiling) {
            trace!(target: "planner", edges = chain.len(), error, ceiling, "candidate over ceiling");
            return;
        }
        let objective = self.tunables.alpha * cost + self.tunables.beta * error;
        let cand = Candidate {
            chain: chain.to_vec(),
            cost,
            error,
            objective,
            n_reference: chain
                .iter()
                .filter(|&&c| self.reg.conversion(c).is_reference())
                .count(),
        };
        let replace = match best.as_ref() {
            None => true,
            Some(b) => better(&cand, b),
        };
        if replace {
            trace!(target: "planner", edges = cand.chain.len(), objective, "new incumbent");
            *best = Some(cand);
        }
    }

    /// Measure a chain's deviation from the reference route over the test
    /// corpus, memoized per chain hash. Structural or kernel failures rate
    /// the chain unusable (infinite error).
    pub fn measure_chain(&self, src: FormatId, chain: &[ConvId]) -> f64 {
        let key = chain_hash(chain);
        if let Some(&e) = self.memo.lock().expect("poisoned error memo").get(&key) {
            return e;
        }
        let error = self.measure_chain_uncached(src, chain).unwrap_or(f64::INFINITY);
        self.memo.lock().expect("poisoned error memo").insert(key, error);
        error
    }

    fn measure_chain_uncached(&self, src: FormatId, chain: &[ConvId]) -> Option<f64> {
        let reg = self.reg;
        let dst = match reg.conversion(*chain.last()?).dst {
            Endpoint::Format(f) => f,
            _ => return None,
        };
        let rgba_canon = reg.model(reg.lookup_model("RGBA")?).canonical;
        let rgba_bpp = reg.format(rgba_canon).bytes_per_pixel;

        let n = crate::corpus::NUM_PATH_TEST_PIXELS;
        let rgba_bytes = Corpus::to_bytes(self.corpus.path_pixels());
        let mut scratch = Scratch::new();

        // Corpus into the source format via the reference route.
        let src_bpp = reg.format(src).bytes_per_pixel;
        let mut src_buf = vec![0u8; n * src_bpp];
        run_route(reg, rgba_canon, src, &rgba_bytes, &mut src_buf, n, &mut scratch)?;

        // Candidate chain, then normalize its output to RGBA double.
        let dst_bpp = reg.format(dst).bytes_per_pixel;
        let mut chain_out = vec![0u8; n * dst_bpp];
        run_chain(reg, chain, &src_buf, &mut chain_out, n, &mut scratch).ok()?;
        let mut chain_rgba = vec![0u8; n * rgba_bpp];
        run_route(reg, dst, rgba_canon, &chain_out, &mut chain_rgba, n, &mut scratch)?;

        // Reference route for the same pair, normalized the same way, so
        // loss inherent to the destination encoding cancels out.
        let mut ref_out = vec![0u8; n * dst_bpp];
        run_route(reg, src, dst, &src_buf, &mut ref_out, n, &mut scratch)?;
        let mut ref_rgba = vec![0u8; n * rgba_bpp];
        run_route(reg, dst, rgba_canon, &ref_out, &mut ref_rgba, n, &mut scratch)?;

        let mut total = 0.0f64;
        for px in 0..n {
            let mut worst = 0.0f64;
            for ch in 0..4 {
                let at = (px * 4 + ch) * 8;
                let a = f64::from_ne_bytes(chain_rgba[at..at + 8].try_into().ok()?);
                let b = f64::from_ne_bytes(ref_rgba[at..at + 8].try_into().ok()?);
                let d = (a - b).abs();
                if d.is_nan() {
                    return None;
                }
                if d > worst {
                    worst = d;
                }
            }
            total += worst;
        }
        Some(total / n as f64)
    }
}

fn src_of(reg: &Registry, chain: &[ConvId]) -> FormatId {
    match reg.conversion(chain[0]).src {
        Endpoint::Format(f) => f,
        _ => unreachable!("planner chains are format-level"),
    }
}

/// Run the reference route between two formats, treating the identity route
/// as a plain copy.
fn run_route(
    reg: &Registry,
    from: FormatId,
    to: FormatId,
    src: &[u8],
    dst: &mut [u8],
    n: usize,
    scratch: &mut Scratch,
) -> Option<()> {
    if from == to {
        let len = n * reg.format(from).bytes_per_pixel;
        dst[..len].copy_from_slice(&src[..len]);
        return Some(());
    }
    let stages = reference_stages(reg, from, to).ok()?;
    run_chain(reg, &stages, src, dst, n, scratch).ok()
}

fn better(cand: &Candidate, best: &Candidate) -> bool {
    let lo = cand.objective.min(best.objective).max(f64::MIN_POSITIVE);
    if (cand.objective - best.objective).abs() <= 0.01 * lo {
        (cand.chain.len(), cand.n_reference, &cand.chain)
            < (best.chain.len(), best.n_reference, &best.chain)
    } else {
        cand.objective < best.objective
    }
}

fn chain_hash(chain: &[ConvId]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for c in chain {
        hasher.update(&c.0.to_le_bytes());
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{run_plane_map, Kernel};
    use crate::node::ModelFlags;
    use crate::registry::{ConversionSpec, FormatSpec, ModelSpec, TypeSpec};

    /// RGBA world with a reversed-order sibling format and a cheap shuffle
    /// between the two.
    fn rgba_world() -> (Registry, FormatId, FormatId) {
        let mut reg = Registry::new();
        let double = reg
            .register_type(TypeSpec {
                name: "double",
                bits: 64,
                integer: false,
                signed: true,
                linear: true,
            })
            .unwrap();
        let r = reg.register_component("R").unwrap();
        let g = reg.register_component("G").unwrap();
        let b = reg.register_component("B").unwrap();
        let a = reg.register_component("A").unwrap();
        let rgba = reg
            .register_model(ModelSpec {
                name: "RGBA",
                components: &[r, g, b, a],
                flags: ModelFlags::ALPHA,
                space: None,
            })
            .unwrap();
        let canon = reg.model(rgba).canonical;
        let abgr = reg
            .register_format(FormatSpec {
                name: "ABGR double",
                model: rgba,
                layout: &[(a, double), (b, double), (g, double), (r, double)],
                planar: false,
                palette: false,
                space: None,
            })
            .unwrap();
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Format(abgr),
            dst: Endpoint::Format(canon),
            kernel: Kernel::Planar(run_plane_map),
            cost: None,
            error: None,
            plane_fn: None,
        })
        .unwrap();
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Format(canon),
            dst: Endpoint::Format(abgr),
            kernel: Kernel::Planar(run_plane_map),
            cost: None,
            error: None,
            plane_fn: None,
        })
        .unwrap();
        (reg, abgr, canon)
    }

    fn plan_world(reg: &Registry, src: FormatId, dst: FormatId) -> Option<PlannedPath> {
        let corpus = Corpus::generate();
        let tunables = Tunables::default();
        let memo = Mutex::new(HashMap::new());
        Planner { reg, corpus: &corpus, tunables: &tunables, memo: &memo }.plan(src, dst)
    }

    #[test]
    fn planner_prefers_the_cheap_shuffle_over_the_reference_crossing() {
        let (reg, abgr, canon) = rgba_world();
        let path = plan_world(&reg, abgr, canon).expect("path exists");
        assert_eq!(path.chain.len(), 1);
        let conv = reg.conversion(path.chain[0]);
        assert!(!conv.is_reference(), "tie-break must avoid the reference edge");
        assert!(path.error < 1e-12);
    }

    #[test]
    fn planned_chains_compose_and_respect_the_length_bound() {
        let (reg, abgr, canon) = rgba_world();
        let path = plan_world(&reg, canon, abgr).expect("path exists");
        assert!(path.chain.len() <= Tunables::default().max_path_length);
        for pair in path.chain.windows(2) {
            assert_eq!(reg.conversion(pair[0]).dst, reg.conversion(pair[1]).src);
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let (reg, abgr, canon) = rgba_world();
        let p1 = plan_world(&reg, abgr, canon).unwrap();
        let p2 = plan_world(&reg, abgr, canon).unwrap();
        assert_eq!(p1.chain, p2.chain);
    }
}

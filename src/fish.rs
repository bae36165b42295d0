//! Fish: compiled converters and the dispatch runtime.
//!
//! A fish translates pixels between two registered formats. Three species:
//!
//! - **Simple** wraps a single conversion.
//! - **Path** runs a planned chain of conversions, ping-ponging between two
//!   scratch buffers sized `n × max_intermediate_bpp`.
//! - **Reference** is the guaranteed fallback: unpack to the source model's
//!   canonical doubles, cross to RGBA double, cross to the destination
//!   model, pack. Slow by design, correct by construction.
//!
//! Dispatch never blocks and performs no allocation when the caller reuses a
//! [`Scratch`]; the plain `process` entry point draws from a thread-local
//! scratch pool instead. Fish are immutable after publication apart from the
//! advisory instrumentation counters.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::conversion::{ConvId, KernelError};
use crate::node::{Endpoint, FormatId};
use crate::registry::Registry;
use crate::Error;

#[derive(Clone, Debug)]
pub enum FishKind {
    Simple(ConvId),
    /// Planned chain; an empty chain is the identity (same source and
    /// destination format) and dispatches as a straight copy.
    Path(Vec<ConvId>),
    Reference(Vec<ConvId>),
}

#[derive(Debug)]
pub struct Fish {
    pub(crate) source: FormatId,
    pub(crate) dest: FormatId,
    pub(crate) kind: FishKind,
    pub(crate) source_bpp: usize,
    pub(crate) dest_bpp: usize,
    /// Largest bytes-per-pixel among intermediate chain nodes.
    pub(crate) max_mid_bpp: usize,
    pub(crate) cost: f64,
    pub(crate) error: f64,
    pixels: AtomicU64,
    poisoned: AtomicBool,
}

impl Fish {
    pub(crate) fn new(
        reg: &Registry,
        source: FormatId,
        dest: FormatId,
        kind: FishKind,
        cost: f64,
        error: f64,
    ) -> Self {
        let chain: &[ConvId] = match &kind {
            FishKind::Simple(c) => std::slice::from_ref(c),
            FishKind::Path(c) | FishKind::Reference(c) => c,
        };
        let max_mid_bpp = chain
            .iter()
            .take(chain.len().saturating_sub(1))
            .map(|&c| reg.conversion(c).ctx.dst_bpp)
            .max()
            .unwrap_or(0);
        Fish {
            source,
            dest,
            kind,
            source_bpp: reg.format(source).bytes_per_pixel,
            dest_bpp: reg.format(dest).bytes_per_pixel,
            max_mid_bpp,
            cost,
            error,
            pixels: AtomicU64::new(0),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Build the reference fish for a format pair. Always possible: every
    /// format reaches RGBA double through its model's canonical encoding.
    pub(crate) fn reference(reg: &Registry, source: FormatId, dest: FormatId) -> Result<Self, Error> {
        let stages = reference_stages(reg, source, dest)?;
        let cost: f64 = stages.iter().map(|&c| reg.conversion(c).cost).sum();
        Ok(Fish::new(reg, source, dest, FishKind::Reference(stages), cost, 0.0))
    }

    #[inline]
    pub fn source(&self) -> FormatId {
        self.source
    }

    #[inline]
    pub fn dest(&self) -> FormatId {
        self.dest
    }

    #[inline]
    pub fn source_bpp(&self) -> usize {
        self.source_bpp
    }

    #[inline]
    pub fn dest_bpp(&self) -> usize {
        self.dest_bpp
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Measured deviation from the reference path over the corpus.
    pub fn error(&self) -> f64 {
        self.error
    }

    /// Monotone count of pixels pushed through this fish.
    pub fn pixels_processed(&self) -> u64 {
        self.pixels.load(Ordering::Relaxed)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            FishKind::Simple(_) => "simple",
            FishKind::Path(_) => "path",
            FishKind::Reference(_) => "reference",
        }
    }

    /// The conversion chain this fish executes, in order.
    pub fn conversions(&self) -> &[ConvId] {
        match &self.kind {
            FishKind::Simple(c) => std::slice::from_ref(c),
            FishKind::Path(c) | FishKind::Reference(c) => c,
        }
    }

    /// Run `n` pixels through the fish. Buffer sizes are preconditions:
    /// `src` holds at least `n × source_bpp` bytes and `dst` at least
    /// `n × dest_bpp`.
    pub(crate) fn dispatch(
        &self,
        reg: &Registry,
        src: &[u8],
        dst: &mut [u8],
        n: usize,
        scratch: &mut Scratch,
    ) -> Result<usize, Error> {
        assert!(src.len() >= n * self.source_bpp, "source buffer undersized");
        assert!(dst.len() >= n * self.dest_bpp, "destination buffer undersized");
        if self.poisoned.load(Ordering::Relaxed) {
            return Err(Error::Primitive(KernelError("fish disabled by earlier failure")));
        }

        let chain = self.conversions();
        let result = if chain.is_empty() {
            dst[..n * self.dest_bpp].copy_from_slice(&src[..n * self.source_bpp]);
            Ok(())
        } else {
            scratch.reserve(n * self.max_mid_bpp);
            run_chain(reg, chain, src, dst, n, scratch)
        };

        match result {
            Ok(()) => {
                self.pixels.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.poisoned.store(true, Ordering::Relaxed);
                Err(Error::Primitive(e))
            }
        }
    }
}

/// Two ping-pong buffers reused across the edges of a chain. Create one per
/// worker with [`Scratch::for_pixels`] to keep the hot path allocation-free,
/// or let `process` use the thread-local pool.
pub struct Scratch {
    a: Vec<u8>,
    b: Vec<u8>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch { a: Vec::new(), b: Vec::new() }
    }

    /// Pre-size the buffers for converting up to `n` pixels through `fish`.
    pub fn for_pixels(fish: &Fish, n: usize) -> Self {
        let mut s = Scratch::new();
        s.reserve(n * fish.max_mid_bpp);
        s
    }

    fn reserve(&mut self, len: usize) {
        if self.a.len() < len {
            self.a.resize(len, 0);
            self.b.resize(len, 0);
        }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Scratch::new()
    }
}

thread_local! {
    static POOL: RefCell<Scratch> = RefCell::new(Scratch::new());
}

/// Run `f` with the calling thread's scratch pool.
pub(crate) fn with_pooled_scratch<R>(f: impl FnOnce(&mut Scratch) -> R) -> R {
    POOL.with(|s| f(&mut s.borrow_mut()))
}

/// Execute a conversion chain over `n` pixels, ping-ponging intermediates
/// through `scratch`. Single-edge chains bypass the scratch buffers.
pub(crate) fn run_chain(
    reg: &Registry,
    chain: &[ConvId],
    src: &[u8],
    dst: &mut [u8],
    n: usize,
    scratch: &mut Scratch,
) -> Result<(), KernelError> {
    let last = chain.len() - 1;
    if last == 0 {
        let conv = reg.conversion(chain[0]);
        return conv.kernel.run(&conv.ctx, src, dst, n);
    }

    let max_mid = chain[..last]
        .iter()
        .map(|&c| reg.conversion(c).ctx.dst_bpp)
        .max()
        .unwrap_or(0);
    scratch.reserve(n * max_mid);
    // Split borrows once; the ping-pong below alternates between the halves.
    let (buf_a, buf_b) = (&mut scratch.a, &mut scratch.b);

    for (i, &cid) in chain.iter().enumerate() {
        let conv = reg.conversion(cid);
        if i == last {
            // The final edge writes the caller's destination.
            let input: &[u8] = if (i - 1) % 2 == 0 { &*buf_a } else { &*buf_b };
            conv.kernel.run(&conv.ctx, input, dst, n)?;
        } else if i % 2 == 0 {
            let input: &[u8] = if i == 0 { src } else { &*buf_b };
            conv.kernel.run(&conv.ctx, input, buf_a, n)?;
        } else {
            conv.kernel.run(&conv.ctx, &*buf_a, buf_b, n)?;
        }
    }
    Ok(())
}

/// The staged reference route between two formats:
/// `src → canon(src.model) → RGBA double → canon(dst.model) → dst`,
/// with degenerate stages elided.
pub(crate) fn reference_stages(
    reg: &Registry,
    src: FormatId,
    dst: FormatId,
) -> Result<Vec<ConvId>, Error> {
    let canon_s = reg.canonical_of(src);
    let canon_d = reg.canonical_of(dst);

    let mut stages = Vec::with_capacity(4);
    if src != canon_s {
        stages.push(reg.format(src).unpack.expect("non-canonical formats carry an unpack edge"));
    }
    if canon_s != canon_d {
        let rgba = reg
            .lookup_model("RGBA")
            .ok_or_else(|| Error::UnknownName("RGBA".to_string()))?;
        let canon_rgba = reg.model(rgba).canonical;
        if canon_s != canon_rgba {
            stages.push(canonical_hop(reg, canon_s, canon_rgba, src, dst)?);
        }
        if canon_d != canon_rgba {
            stages.push(canonical_hop(reg, canon_rgba, canon_d, src, dst)?);
        }
    }
    if dst != canon_d {
        stages.push(reg.format(dst).pack.expect("non-canonical formats carry a pack edge"));
    }
    Ok(stages)
}

fn canonical_hop(
    reg: &Registry,
    from: FormatId,
    to: FormatId,
    req_src: FormatId,
    req_dst: FormatId,
) -> Result<ConvId, Error> {
    reg.format(from)
        .from_list
        .iter()
        .copied()
        .find(|&c| reg.conversion(c).dst == Endpoint::Format(to))
        .ok_or_else(|| Error::NoPath {
            src: reg.format(req_src).name.clone(),
            dst: reg.format(req_dst).name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{Kernel, KernelCtx};
    use crate::node::ModelFlags;
    use crate::registry::{ConversionSpec, FormatSpec, ModelSpec, TypeSpec};

    fn shift_kernel(
        _ctx: &KernelCtx,
        src: &[u8],
        dst: &mut [u8],
        n: usize,
    ) -> Result<(), KernelError> {
        for i in 0..n {
            dst[i] = src[i].wrapping_add(1);
        }
        Ok(())
    }

    fn one_byte_world() -> (Registry, FormatId) {
        let mut reg = Registry::new();
        reg.register_type(TypeSpec {
            name: "double",
            bits: 64,
            integer: false,
            signed: true,
            linear: true,
        })
        .unwrap();
        let u8t = reg
            .register_type(TypeSpec { name: "u8", bits: 8, integer: true, signed: false, linear: true })
            .unwrap();
        let y = reg.register_component("Y").unwrap();
        let model = reg
            .register_model(ModelSpec {
                name: "Y",
                components: &[y],
                flags: ModelFlags::empty(),
                space: None,
            })
            .unwrap();
        // A u8 format would normally need u8<->double conversions for its
        // crossings; register identity-ish plane workers first.
        fn u8_to_double(
            s: crate::conversion::Plane<'_>,
            mut d: crate::conversion::PlaneMut<'_>,
        ) -> Result<(), KernelError> {
            for i in 0..s.n {
                d.put_f64(i, s.get_u8(i) as f64 / 255.0);
            }
            Ok(())
        }
        fn double_to_u8(
            s: crate::conversion::Plane<'_>,
            mut d: crate::conversion::PlaneMut<'_>,
        ) -> Result<(), KernelError> {
            for i in 0..s.n {
                d.put_u8(i, (s.get_f64(i) * 255.0).round().clamp(0.0, 255.0) as u8);
            }
            Ok(())
        }
        fn plane_lift(
            ctx: &KernelCtx,
            src: &[u8],
            dst: &mut [u8],
            n: usize,
        ) -> Result<(), KernelError> {
            crate::conversion::run_plane_map(ctx, src, dst, n)
        }
        let double = reg.lookup_type("double").unwrap();
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Type(u8t),
            dst: Endpoint::Type(double),
            kernel: Kernel::Planar(plane_lift),
            cost: None,
            error: None,
            plane_fn: Some(u8_to_double),
        })
        .unwrap();
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Type(double),
            dst: Endpoint::Type(u8t),
            kernel: Kernel::Planar(plane_lift),
            cost: None,
            error: None,
            plane_fn: Some(double_to_u8),
        })
        .unwrap();
        let fmt = reg
            .register_format(FormatSpec {
                name: "Y u8",
                model,
                layout: &[(y, u8t)],
                planar: false,
                palette: false,
                space: None,
            })
            .unwrap();
        (reg, fmt)
    }

    #[test]
    fn chains_ping_pong_through_scratch() {
        let (mut reg, fmt) = one_byte_world();
        // Three +1 steps over single-byte pixels.
        let mut chain = Vec::new();
        for _ in 0..3 {
            chain.push(
                reg.register_conversion(ConversionSpec {
                    src: Endpoint::Format(fmt),
                    dst: Endpoint::Format(fmt),
                    kernel: Kernel::Linear(shift_kernel),
                    cost: None,
                    error: None,
                    plane_fn: None,
                })
                .unwrap(),
            );
        }
        let src = [10u8, 20, 30];
        let mut dst = [0u8; 3];
        let mut scratch = Scratch::new();
        run_chain(&reg, &chain, &src, &mut dst, 3, &mut scratch).unwrap();
        assert_eq!(dst, [13, 23, 33]);
    }

    #[test]
    fn identity_fish_copies() {
        let (reg, fmt) = one_byte_world();
        let fish = Fish::new(&reg, fmt, fmt, FishKind::Path(Vec::new()), 0.0, 0.0);
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        let mut scratch = Scratch::new();
        let n = fish.dispatch(&reg, &src, &mut dst, 4, &mut scratch).unwrap();
        assert_eq!(n, 4);
        assert_eq!(dst, src);
    }

    #[test]
    fn reference_stages_within_one_model_skip_the_rgba_hop() {
        let (reg, fmt) = one_byte_world();
        let canon = reg.canonical_of(fmt);
        let stages = reference_stages(&reg, fmt, canon).unwrap();
        assert_eq!(stages, vec![reg.format(fmt).unpack.unwrap()]);

        let back = reference_stages(&reg, canon, fmt).unwrap();
        assert_eq!(back, vec![reg.format(fmt).pack.unwrap()]);
    }

    #[test]
    fn pixel_counter_is_monotone() {
        let (reg, fmt) = one_byte_world();
        let fish = Fish::new(&reg, fmt, fmt, FishKind::Path(Vec::new()), 0.0, 0.0);
        let src = [0u8; 8];
        let mut dst = [0u8; 8];
        let mut s = Scratch::new();
        fish.dispatch(&reg, &src, &mut dst, 8, &mut s).unwrap();
        fish.dispatch(&reg, &src, &mut dst, 8, &mut s).unwrap();
        assert_eq!(fish.pixels_processed(), 16);
    }
}

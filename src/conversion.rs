//! Conversion nodes and kernel shapes.
//!
//! A conversion is a directed edge between two registry nodes of the same
//! kind, carrying a pure kernel plus cost/error metadata. Kernels come in
//! three shapes with distinct loop disciplines:
//!
//! - **linear**: one tight loop over packed pixels; the common fast path.
//! - **planar**: iterates component planes, one strided plane at a time.
//! - **reference**: arbitrary slow path; the synthesized layer crossings
//!   (format ↔ canonical double, model ↔ model mirrors) live here.
//!
//! Every kernel is a pure function of its inputs: no I/O, no global state,
//! no allocation that escapes the call. The planner relies on this when it
//! measures chains empirically, and the dispatcher relies on it to run
//! concurrent `process` calls without coordination.
//!
//! Kernels are plain `fn` pointers; everything a kernel needs beyond the
//! buffers travels in the [`KernelCtx`] resolved at registration time.

use crate::node::Endpoint;

/// Index of a registered conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConvId(pub u32);
impl ConvId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Failure reported by a conversion primitive. Essentially never produced by
/// the built-in kernels; the dispatcher propagates it and poisons the fish.
#[derive(Debug, Clone, thiserror::Error)]
#[error("kernel failure: {0}")]
pub struct KernelError(pub &'static str);

/// Shared signature of all kernel shapes: convert `n` pixels from `src`
/// into `dst`. Buffer sizes are validated by the dispatcher beforehand.
pub type KernelFn =
    fn(&KernelCtx, src: &[u8], dst: &mut [u8], n: usize) -> Result<(), KernelError>;

/// Per-plane worker used by planar kernels and the synthesized crossings:
/// converts one strided component plane. Registered type conversions supply
/// one of these so the crossings can be composed component-wise.
pub type PlaneFn = fn(src: Plane<'_>, dst: PlaneMut<'_>) -> Result<(), KernelError>;

/// A read-only view of one component plane inside an interleaved buffer.
#[derive(Copy, Clone)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Byte offset of the component within the first pixel.
    pub offset: usize,
    /// Byte distance between consecutive samples (the pixel stride).
    pub pitch: usize,
    /// Width in bytes of one sample.
    pub width: usize,
    /// Number of samples.
    pub n: usize,
}

/// Mutable counterpart of [`Plane`].
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    pub offset: usize,
    pub pitch: usize,
    pub width: usize,
    pub n: usize,
}

impl<'a> Plane<'a> {
    #[inline]
    pub fn get_u8(&self, i: usize) -> u8 {
        self.data[self.offset + i * self.pitch]
    }

    #[inline]
    pub fn get_u16(&self, i: usize) -> u16 {
        let at = self.offset + i * self.pitch;
        u16::from_ne_bytes([self.data[at], self.data[at + 1]])
    }

    #[inline]
    pub fn get_u32(&self, i: usize) -> u32 {
        let at = self.offset + i * self.pitch;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data[at..at + 4]);
        u32::from_ne_bytes(b)
    }

    #[inline]
    pub fn get_f32(&self, i: usize) -> f32 {
        f32::from_bits(self.get_u32(i))
    }

    #[inline]
    pub fn get_f64(&self, i: usize) -> f64 {
        let at = self.offset + i * self.pitch;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.data[at..at + 8]);
        f64::from_ne_bytes(b)
    }
}

impl<'a> PlaneMut<'a> {
    #[inline]
    pub fn put_u8(&mut self, i: usize, v: u8) {
        self.data[self.offset + i * self.pitch] = v;
    }

    #[inline]
    pub fn put_u16(&mut self, i: usize, v: u16) {
        let at = self.offset + i * self.pitch;
        self.data[at..at + 2].copy_from_slice(&v.to_ne_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, i: usize, v: u32) {
        let at = self.offset + i * self.pitch;
        self.data[at..at + 4].copy_from_slice(&v.to_ne_bytes());
    }

    #[inline]
    pub fn put_f32(&mut self, i: usize, v: f32) {
        self.put_u32(i, v.to_bits());
    }

    #[inline]
    pub fn put_f64(&mut self, i: usize, v: f64) {
        let at = self.offset + i * self.pitch;
        self.data[at..at + 8].copy_from_slice(&v.to_ne_bytes());
    }
}

/// What to do with one matched plane pair.
#[derive(Copy, Clone)]
pub enum PlaneOp {
    /// Same scalar on both sides: raw strided byte copy.
    Copy,
    /// Run a registered type conversion's plane worker.
    Convert(PlaneFn),
}

/// One matched component plane between the source and destination layouts.
#[derive(Copy, Clone)]
pub struct PlanePair {
    pub src_offset: usize,
    pub src_width: usize,
    pub dst_offset: usize,
    pub dst_width: usize,
    pub op: PlaneOp,
}

/// Layout context handed to every kernel invocation. Built once at
/// registration from the endpoint nodes; kernels never consult the registry.
#[derive(Clone, Default)]
pub struct KernelCtx {
    pub src_bpp: usize,
    pub dst_bpp: usize,
    /// Matched component planes, in destination order. Destination planes
    /// with no entry here are left untouched by plane-mapped kernels.
    pub planes: Vec<PlanePair>,
}

impl KernelCtx {
    pub fn packed(src_bpp: usize, dst_bpp: usize) -> Self {
        KernelCtx { src_bpp, dst_bpp, planes: Vec::new() }
    }
}

/// The sealed set of kernel shapes. Dispatch specializes on the tag; the
/// payload signature is shared so chains mix shapes freely.
#[derive(Copy, Clone)]
pub enum Kernel {
    Linear(KernelFn),
    Planar(KernelFn),
    Reference(KernelFn),
}

impl Kernel {
    #[inline]
    pub fn run(
        &self,
        ctx: &KernelCtx,
        src: &[u8],
        dst: &mut [u8],
        n: usize,
    ) -> Result<(), KernelError> {
        match self {
            Kernel::Linear(f) | Kernel::Planar(f) | Kernel::Reference(f) => f(ctx, src, dst, n),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Kernel::Linear(_) => "linear",
            Kernel::Planar(_) => "planar",
            Kernel::Reference(_) => "reference",
        }
    }

    /// Baseline cost when the registration does not declare one
    /// (cycle estimate ×10 plus a chain-length penalty unit).
    pub fn default_cost(&self) -> f64 {
        match self {
            Kernel::Linear(_) => 10.0,
            Kernel::Planar(_) => 30.0,
            Kernel::Reference(_) => 200.0,
        }
    }
}

/// A registered conversion edge.
pub struct ConversionNode {
    pub name: String,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub kernel: Kernel,
    pub ctx: KernelCtx,
    /// Declared cost (see [`Kernel::default_cost`]).
    pub cost: f64,
    /// Declared error; when absent the planner measures it over the corpus
    /// and memoizes the result per chain hash.
    pub error: Option<f64>,
    /// Plane worker, present on type conversions so the registry can
    /// synthesize component-wise layer crossings from them.
    pub plane_fn: Option<PlaneFn>,
}

impl ConversionNode {
    pub fn is_reference(&self) -> bool {
        matches!(self.kernel, Kernel::Reference(_))
    }
}

// ============================================================================
// Generic plane-mapped kernel
// ============================================================================

/// Kernel shared by every plane-mapped conversion: byte shuffles, the
/// synthesized pack/unpack crossings, and standalone type conversions. Walks
/// `ctx.planes` one plane at a time so callers can vectorize per component.
///
/// Destination planes without a matching source plane are not written. This
/// is load-bearing for the packed cairo CMYK layouts, where a round trip
/// through two complementary 4-channel formats reassembles all five source
/// planes.
pub fn run_plane_map(
    ctx: &KernelCtx,
    src: &[u8],
    dst: &mut [u8],
    n: usize,
) -> Result<(), KernelError> {
    for pair in &ctx.planes {
        let s = Plane {
            data: src,
            offset: pair.src_offset,
            pitch: ctx.src_bpp,
            width: pair.src_width,
            n,
        };
        let d = PlaneMut {
            data: dst,
            offset: pair.dst_offset,
            pitch: ctx.dst_bpp,
            width: pair.dst_width,
            n,
        };
        match pair.op {
            PlaneOp::Copy => copy_plane(s, d),
            PlaneOp::Convert(f) => f(s, d)?,
        }
    }
    Ok(())
}

fn copy_plane(src: Plane<'_>, dst: PlaneMut<'_>) {
    debug_assert_eq!(src.width, dst.width, "copy between unequal scalars");
    let w = src.width;
    for i in 0..src.n {
        let s_at = src.offset + i * src.pitch;
        let d_at = dst.offset + i * dst.pitch;
        dst.data[d_at..d_at + w].copy_from_slice(&src.data[s_at..s_at + w]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_views_round_trip_scalars() {
        let mut buf = vec![0u8; 4 * 8];
        let mut w = PlaneMut { data: &mut buf, offset: 0, pitch: 8, width: 8, n: 4 };
        for i in 0..4 {
            w.put_f64(i, i as f64 * 0.25);
        }
        let r = Plane { data: &buf, offset: 0, pitch: 8, width: 8, n: 4 };
        assert_eq!(r.get_f64(2), 0.5);
    }

    #[test]
    fn plane_map_copies_only_matched_planes() {
        // Two-component 2-byte pixels; only the second plane is mapped, and
        // it moves to the front of the destination pixel.
        let ctx = KernelCtx {
            src_bpp: 2,
            dst_bpp: 2,
            planes: vec![PlanePair {
                src_offset: 1,
                src_width: 1,
                dst_offset: 0,
                dst_width: 1,
                op: PlaneOp::Copy,
            }],
        };
        let src = [10u8, 11, 20, 21, 30, 31];
        let mut dst = [0xEEu8; 6];
        run_plane_map(&ctx, &src, &mut dst, 3).unwrap();
        assert_eq!(dst, [11, 0xEE, 21, 0xEE, 31, 0xEE]);
    }

    #[test]
    fn default_costs_order_by_shape() {
        fn nop(_: &KernelCtx, _: &[u8], _: &mut [u8], _: usize) -> Result<(), KernelError> {
            Ok(())
        }
        assert!(Kernel::Linear(nop).default_cost() < Kernel::Planar(nop).default_cost());
        assert!(Kernel::Planar(nop).default_cost() < Kernel::Reference(nop).default_cost());
    }
}

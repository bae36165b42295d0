//! Scalar types and their double bridges.
//!
//! Every built-in type registers a pair of planar conversions to and from
//! `double`. The registry composes the format↔model layer crossings from
//! these plane workers, so they must exist before any format registration.
//!
//! The `CIE u8 L` / `CIE u8 ab` encodings carry the classic byte scalings of
//! Lab pixels: L maps 0..255 onto 0..100, a/b map 0..255 onto −128..127.

use half::f16;

use crate::base::{u8_to_unit, unit_to_u8};
use crate::conversion::{run_plane_map, Kernel, KernelError, Plane, PlaneFn, PlaneMut};
use crate::node::Endpoint;
use crate::registry::{ConversionSpec, Registry, TypeSpec};
use crate::Error;

pub(crate) fn register(reg: &mut Registry) -> Result<(), Error> {
    let double = reg.register_type(TypeSpec {
        name: "double",
        bits: 64,
        integer: false,
        signed: true,
        linear: true,
    })?;
    let specs: &[(TypeSpec<'_>, PlaneFn, PlaneFn)] = &[
        (
            TypeSpec { name: "u8", bits: 8, integer: true, signed: false, linear: true },
            u8_to_double,
            double_to_u8,
        ),
        (
            TypeSpec { name: "u16", bits: 16, integer: true, signed: false, linear: true },
            u16_to_double,
            double_to_u16,
        ),
        (
            TypeSpec { name: "u32", bits: 32, integer: true, signed: false, linear: true },
            u32_to_double,
            double_to_u32,
        ),
        (
            TypeSpec { name: "half", bits: 16, integer: false, signed: true, linear: true },
            half_to_double,
            double_to_half,
        ),
        (
            TypeSpec { name: "float", bits: 32, integer: false, signed: true, linear: true },
            float_to_double,
            double_to_float,
        ),
        (
            TypeSpec { name: "CIE u8 L", bits: 8, integer: true, signed: false, linear: false },
            cie_l_u8_to_double,
            double_to_cie_l_u8,
        ),
        (
            TypeSpec { name: "CIE u8 ab", bits: 8, integer: true, signed: false, linear: false },
            cie_ab_u8_to_double,
            double_to_cie_ab_u8,
        ),
    ];
    for (spec, to_double, from_double) in specs {
        let id = reg.register_type(*spec)?;
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Type(id),
            dst: Endpoint::Type(double),
            kernel: Kernel::Planar(run_plane_map),
            cost: None,
            error: None,
            plane_fn: Some(*to_double),
        })?;
        reg.register_conversion(ConversionSpec {
            src: Endpoint::Type(double),
            dst: Endpoint::Type(id),
            kernel: Kernel::Planar(run_plane_map),
            cost: None,
            error: None,
            plane_fn: Some(*from_double),
        })?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Plane workers
// ----------------------------------------------------------------------

fn u8_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, u8_to_unit(s.get_u8(i)));
    }
    Ok(())
}

fn double_to_u8(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u8(i, unit_to_u8(s.get_f64(i)));
    }
    Ok(())
}

fn u16_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, s.get_u16(i) as f64 / 65535.0);
    }
    Ok(())
}

fn double_to_u16(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u16(i, (s.get_f64(i) * 65535.0).round().clamp(0.0, 65535.0) as u16);
    }
    Ok(())
}

fn u32_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, s.get_u32(i) as f64 / 4294967295.0);
    }
    Ok(())
}

fn double_to_u32(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u32(i, (s.get_f64(i) * 4294967295.0).round().clamp(0.0, 4294967295.0) as u32);
    }
    Ok(())
}

fn half_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, f16::from_bits(s.get_u16(i)).to_f64());
    }
    Ok(())
}

fn double_to_half(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u16(i, f16::from_f64(s.get_f64(i)).to_bits());
    }
    Ok(())
}

fn float_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, s.get_f32(i) as f64);
    }
    Ok(())
}

fn double_to_float(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f32(i, s.get_f64(i) as f32);
    }
    Ok(())
}

fn cie_l_u8_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, s.get_u8(i) as f64 / 255.0 * 100.0);
    }
    Ok(())
}

fn double_to_cie_l_u8(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u8(i, (s.get_f64(i) * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8);
    }
    Ok(())
}

fn cie_ab_u8_to_double(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_f64(i, s.get_u8(i) as f64 - 128.0);
    }
    Ok(())
}

fn double_to_cie_ab_u8(s: Plane<'_>, mut d: PlaneMut<'_>) -> Result<(), KernelError> {
    for i in 0..s.n {
        d.put_u8(i, (s.get_f64(i) + 128.0).round().clamp(0.0, 255.0) as u8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn through(f: PlaneFn, g: PlaneFn, bytes_in: &[u8], width: usize) -> Vec<u8> {
        let n = bytes_in.len() / width;
        let mut mid = vec![0u8; n * 8];
        f(
            Plane { data: bytes_in, offset: 0, pitch: width, width, n },
            PlaneMut { data: &mut mid, offset: 0, pitch: 8, width: 8, n },
        )
        .unwrap();
        let mut out = vec![0u8; bytes_in.len()];
        g(
            Plane { data: &mid, offset: 0, pitch: 8, width: 8, n },
            PlaneMut { data: &mut out, offset: 0, pitch: width, width, n },
        )
        .unwrap();
        out
    }

    #[test]
    fn u8_bridge_round_trips_every_value() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(through(u8_to_double, double_to_u8, &all, 1), all);
    }

    #[test]
    fn cie_scalings_match_the_classic_byte_layout() {
        // L: 255 -> 100.0, a/b: 128 -> 0.0.
        let src = [255u8, 128];
        let mut mid = vec![0u8; 16];
        cie_l_u8_to_double(
            Plane { data: &src, offset: 0, pitch: 1, width: 1, n: 1 },
            PlaneMut { data: &mut mid, offset: 0, pitch: 8, width: 8, n: 1 },
        )
        .unwrap();
        assert_eq!(f64::from_ne_bytes(mid[..8].try_into().unwrap()), 100.0);

        cie_ab_u8_to_double(
            Plane { data: &src[1..], offset: 0, pitch: 1, width: 1, n: 1 },
            PlaneMut { data: &mut mid, offset: 0, pitch: 8, width: 8, n: 1 },
        )
        .unwrap();
        assert_eq!(f64::from_ne_bytes(mid[..8].try_into().unwrap()), 0.0);
    }

    #[test]
    fn half_bridge_preserves_specials() {
        let specials = [f16::INFINITY, f16::NEG_INFINITY, f16::from_f32(0.0), f16::from_f32(-0.0)];
        let bytes: Vec<u8> = specials.iter().flat_map(|h| h.to_bits().to_ne_bytes()).collect();
        let out = through(half_to_double, double_to_half, &bytes, 2);
        assert_eq!(out, bytes);
    }
}

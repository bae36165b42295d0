//! Built-in types, components, models, formats and conversions.
//!
//! Registration order matters: scalar types and their double bridges come
//! first (the registry composes layer crossings from them), then the RGB
//! family that everything else references, then the CIE and CMYK families.

use crate::registry::Registry;
use crate::Error;

mod cairo;
mod cmyk;
mod lab;
mod rgb;
mod types;

pub(crate) fn register_all(reg: &mut Registry) -> Result<(), Error> {
    types::register(reg)?;
    rgb::register(reg)?;
    lab::register(reg)?;
    cmyk::register(reg)?;
    cairo::register(reg)?;
    Ok(())
}

/// Register a direct format→format conversion with a linear kernel.
pub(crate) fn fast_conversion(
    reg: &mut Registry,
    src: &str,
    dst: &str,
    kernel: crate::conversion::KernelFn,
    cost: f64,
) -> Result<(), Error> {
    let s = reg.lookup_format(src).ok_or_else(|| Error::UnknownName(src.to_string()))?;
    let d = reg.lookup_format(dst).ok_or_else(|| Error::UnknownName(dst.to_string()))?;
    reg.register_conversion(crate::registry::ConversionSpec {
        src: crate::node::Endpoint::Format(s),
        dst: crate::node::Endpoint::Format(d),
        kernel: crate::conversion::Kernel::Linear(kernel),
        cost: Some(cost),
        error: None,
        plane_fn: None,
    })?;
    Ok(())
}

/// Register a model→model conversion (packed doubles); the registry mirrors
/// it between the canonical formats so planned paths can use it.
pub(crate) fn model_conversion(
    reg: &mut Registry,
    src: &str,
    dst: &str,
    kernel: crate::conversion::KernelFn,
) -> Result<(), Error> {
    let s = reg.lookup_model(src).ok_or_else(|| Error::UnknownName(src.to_string()))?;
    let d = reg.lookup_model(dst).ok_or_else(|| Error::UnknownName(dst.to_string()))?;
    reg.register_conversion(crate::registry::ConversionSpec {
        src: crate::node::Endpoint::Model(s),
        dst: crate::node::Endpoint::Model(d),
        kernel: crate::conversion::Kernel::Linear(kernel),
        cost: None,
        error: None,
        plane_fn: None,
    })?;
    Ok(())
}

// Scalar accessors shared by the packed-pixel kernels. Index is in scalars,
// not bytes; native endianness throughout.

#[inline]
pub(crate) fn f32_at(buf: &[u8], idx: usize) -> f32 {
    let at = idx * 4;
    f32::from_ne_bytes(buf[at..at + 4].try_into().expect("in-bounds scalar read"))
}

#[inline]
pub(crate) fn put_f32(buf: &mut [u8], idx: usize, v: f32) {
    let at = idx * 4;
    buf[at..at + 4].copy_from_slice(&v.to_ne_bytes());
}

#[inline]
pub(crate) fn f64_at(buf: &[u8], idx: usize) -> f64 {
    let at = idx * 8;
    f64::from_ne_bytes(buf[at..at + 8].try_into().expect("in-bounds scalar read"))
}

#[inline]
pub(crate) fn put_f64(buf: &mut [u8], idx: usize, v: f64) {
    let at = idx * 8;
    buf[at..at + 8].copy_from_slice(&v.to_ne_bytes());
}

#[inline]
pub(crate) fn u8_to_unit(v: u8) -> f64 {
    v as f64 / 255.0
}

#[inline]
pub(crate) fn unit_to_u8(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn full_registration_succeeds_and_is_idempotent() {
        let mut reg = Registry::new();
        register_all(&mut reg).unwrap();
        let n_formats = reg.iter_formats().count();
        // Running the base registrations again must be a no-op.
        register_all(&mut reg).unwrap();
        assert_eq!(reg.iter_formats().count(), n_formats);
    }

    #[test]
    fn the_published_format_surface_is_present() {
        let mut reg = Registry::new();
        register_all(&mut reg).unwrap();
        for name in [
            "RGBA double",
            "RGBA float",
            "RGBA half",
            "R'G'B' u8",
            "R'G'B' float",
            "R'G'B'A float",
            "RaGaBaA float",
            "CIE Lab u8",
            "CIE Lab float",
            "CIE XYZ float",
            "CMYK float",
            "camayakaA u8",
            "cairo-ACYK32",
            "cairo-ACMK32",
        ] {
            assert!(reg.format_exists(name), "missing format {name}");
        }
    }

    #[test]
    fn unit_scaling_round_trips_all_bytes() {
        for v in 0..=255u8 {
            assert_eq!(unit_to_u8(u8_to_unit(v)), v);
        }
    }
}

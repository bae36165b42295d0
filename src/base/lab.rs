//! CIE XYZ and CIE L*a*b*.
//!
//! The RGB↔XYZ matrices are the ICC-profile (D50-adapted) sRGB set, so the
//! luminance row matches the profile builders rather than the raw D65
//! primaries. Lab uses the standard two-segment f(t) with ε = 216/24389 and
//! κ = 24389/27.

use crate::base::{f32_at, f64_at, fast_conversion, model_conversion, put_f32, put_f64};
use crate::conversion::{KernelCtx, KernelError};
use crate::node::ModelFlags;
use crate::registry::{FormatSpec, ModelSpec, Registry};
use crate::Error;

/// Bradford-adapted sRGB→XYZ under the D50 illuminant, row major.
#[rustfmt::skip]
const SRGB_TO_XYZ_D50: [f64; 9] = [
    0.436_074_7, 0.385_064_9, 0.143_080_4,
    0.222_504_5, 0.716_878_6, 0.060_616_9,
    0.013_932_2, 0.097_104_5, 0.714_173_3,
];

#[rustfmt::skip]
const XYZ_TO_SRGB_D50: [f64; 9] = [
     3.133_856_1, -1.616_866_7, -0.490_614_6,
    -0.978_768_4,  1.916_141_5,  0.033_454_0,
     0.071_945_3, -0.228_991_4,  1.405_242_7,
];

/// D50 reference white.
const WHITE: [f64; 3] = [0.96422, 1.0, 0.82521];

const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

#[inline]
fn lab_f_inv(ft: f64) -> f64 {
    let cube = ft * ft * ft;
    if cube > EPSILON {
        cube
    } else {
        (116.0 * ft - 16.0) / KAPPA
    }
}

#[inline]
pub(crate) fn rgb_to_xyz(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let m = &SRGB_TO_XYZ_D50;
    (
        m[0] * r + m[1] * g + m[2] * b,
        m[3] * r + m[4] * g + m[5] * b,
        m[6] * r + m[7] * g + m[8] * b,
    )
}

#[inline]
pub(crate) fn xyz_to_rgb(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let m = &XYZ_TO_SRGB_D50;
    (
        m[0] * x + m[1] * y + m[2] * z,
        m[3] * x + m[4] * y + m[5] * z,
        m[6] * x + m[7] * y + m[8] * z,
    )
}

#[inline]
pub(crate) fn xyz_to_lab(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let fx = lab_f(x / WHITE[0]);
    let fy = lab_f(y / WHITE[1]);
    let fz = lab_f(z / WHITE[2]);
    (116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

#[inline]
pub(crate) fn lab_to_xyz(l: f64, a: f64, b: f64) -> (f64, f64, f64) {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let yr = if l > KAPPA * EPSILON { fy * fy * fy } else { l / KAPPA };
    (lab_f_inv(fx) * WHITE[0], yr * WHITE[1], lab_f_inv(fz) * WHITE[2])
}

pub(crate) fn register(reg: &mut Registry) -> Result<(), Error> {
    let floatt = reg.lookup_type("float").expect("base types registered first");
    let l_u8 = reg.lookup_type("CIE u8 L").expect("base types registered first");
    let ab_u8 = reg.lookup_type("CIE u8 ab").expect("base types registered first");

    let l = reg.register_component("CIE L")?;
    let a = reg.register_component("CIE a")?;
    let b = reg.register_component("CIE b")?;
    let x = reg.register_component("CIE X")?;
    let y = reg.register_component("CIE Y")?;
    let z = reg.register_component("CIE Z")?;

    let lab = reg.register_model(ModelSpec {
        name: "CIE Lab",
        components: &[l, a, b],
        flags: ModelFlags::PERCEPTUAL,
        space: None,
    })?;
    let xyz = reg.register_model(ModelSpec {
        name: "CIE XYZ",
        components: &[x, y, z],
        flags: ModelFlags::empty(),
        space: None,
    })?;

    model_conversion(reg, "RGBA", "CIE XYZ", rgba_to_xyz_d)?;
    model_conversion(reg, "CIE XYZ", "RGBA", xyz_to_rgba_d)?;
    model_conversion(reg, "RGBA", "CIE Lab", rgba_to_lab_d)?;
    model_conversion(reg, "CIE Lab", "RGBA", lab_to_rgba_d)?;
    model_conversion(reg, "CIE XYZ", "CIE Lab", xyz_to_lab_d)?;
    model_conversion(reg, "CIE Lab", "CIE XYZ", lab_to_xyz_d)?;

    reg.register_format(FormatSpec {
        name: "CIE Lab u8",
        model: lab,
        layout: &[(l, l_u8), (a, ab_u8), (b, ab_u8)],
        planar: false,
        palette: false,
        space: None,
    })?;
    reg.register_format(FormatSpec {
        name: "CIE Lab float",
        model: lab,
        layout: &[(l, floatt), (a, floatt), (b, floatt)],
        planar: false,
        palette: false,
        space: None,
    })?;
    reg.register_format(FormatSpec {
        name: "CIE XYZ float",
        model: xyz,
        layout: &[(x, floatt), (y, floatt), (z, floatt)],
        planar: false,
        palette: false,
        space: None,
    })?;

    fast_conversion(reg, "CIE Lab float", "CIE Lab u8", labf_to_lab8, 12.0)?;
    fast_conversion(reg, "CIE Lab u8", "CIE Lab float", lab8_to_labf, 12.0)?;
    fast_conversion(reg, "CIE XYZ float", "CIE Lab float", xyzf_to_labf, 60.0)?;
    fast_conversion(reg, "CIE Lab float", "CIE XYZ float", labf_to_xyzf, 60.0)?;
    fast_conversion(reg, "RGBA float", "CIE Lab float", rgbaf_to_labf, 70.0)?;
    fast_conversion(reg, "CIE Lab float", "RGBA float", labf_to_rgbaf, 70.0)?;
    Ok(())
}

// ----------------------------------------------------------------------
// Model kernels
// ----------------------------------------------------------------------

fn rgba_to_xyz_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = rgb_to_xyz(f64_at(s, i * 4), f64_at(s, i * 4 + 1), f64_at(s, i * 4 + 2));
        put_f64(d, i * 3, x);
        put_f64(d, i * 3 + 1, y);
        put_f64(d, i * 3 + 2, z);
    }
    Ok(())
}

fn xyz_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (r, g, b) = xyz_to_rgb(f64_at(s, i * 3), f64_at(s, i * 3 + 1), f64_at(s, i * 3 + 2));
        put_f64(d, i * 4, r);
        put_f64(d, i * 4 + 1, g);
        put_f64(d, i * 4 + 2, b);
        put_f64(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgba_to_lab_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = rgb_to_xyz(f64_at(s, i * 4), f64_at(s, i * 4 + 1), f64_at(s, i * 4 + 2));
        let (l, a, b) = xyz_to_lab(x, y, z);
        put_f64(d, i * 3, l);
        put_f64(d, i * 3 + 1, a);
        put_f64(d, i * 3 + 2, b);
    }
    Ok(())
}

fn lab_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = lab_to_xyz(f64_at(s, i * 3), f64_at(s, i * 3 + 1), f64_at(s, i * 3 + 2));
        let (r, g, b) = xyz_to_rgb(x, y, z);
        put_f64(d, i * 4, r);
        put_f64(d, i * 4 + 1, g);
        put_f64(d, i * 4 + 2, b);
        put_f64(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn xyz_to_lab_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (l, a, b) = xyz_to_lab(f64_at(s, i * 3), f64_at(s, i * 3 + 1), f64_at(s, i * 3 + 2));
        put_f64(d, i * 3, l);
        put_f64(d, i * 3 + 1, a);
        put_f64(d, i * 3 + 2, b);
    }
    Ok(())
}

fn lab_to_xyz_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = lab_to_xyz(f64_at(s, i * 3), f64_at(s, i * 3 + 1), f64_at(s, i * 3 + 2));
        put_f64(d, i * 3, x);
        put_f64(d, i * 3 + 1, y);
        put_f64(d, i * 3 + 2, z);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Fast packed kernels
// ----------------------------------------------------------------------

fn labf_to_lab8(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let l = f32_at(s, i * 3) as f64;
        let a = f32_at(s, i * 3 + 1) as f64;
        let b = f32_at(s, i * 3 + 2) as f64;
        d[i * 3] = (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8;
        d[i * 3 + 1] = (a + 128.0).round().clamp(0.0, 255.0) as u8;
        d[i * 3 + 2] = (b + 128.0).round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

fn lab8_to_labf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        put_f32(d, i * 3, s[i * 3] as f32 / 255.0 * 100.0);
        put_f32(d, i * 3 + 1, s[i * 3 + 1] as f32 - 128.0);
        put_f32(d, i * 3 + 2, s[i * 3 + 2] as f32 - 128.0);
    }
    Ok(())
}

fn xyzf_to_labf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (l, a, b) = xyz_to_lab(
            f32_at(s, i * 3) as f64,
            f32_at(s, i * 3 + 1) as f64,
            f32_at(s, i * 3 + 2) as f64,
        );
        put_f32(d, i * 3, l as f32);
        put_f32(d, i * 3 + 1, a as f32);
        put_f32(d, i * 3 + 2, b as f32);
    }
    Ok(())
}

fn labf_to_xyzf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = lab_to_xyz(
            f32_at(s, i * 3) as f64,
            f32_at(s, i * 3 + 1) as f64,
            f32_at(s, i * 3 + 2) as f64,
        );
        put_f32(d, i * 3, x as f32);
        put_f32(d, i * 3 + 1, y as f32);
        put_f32(d, i * 3 + 2, z as f32);
    }
    Ok(())
}

fn rgbaf_to_labf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = rgb_to_xyz(
            f32_at(s, i * 4) as f64,
            f32_at(s, i * 4 + 1) as f64,
            f32_at(s, i * 4 + 2) as f64,
        );
        let (l, a, b) = xyz_to_lab(x, y, z);
        put_f32(d, i * 3, l as f32);
        put_f32(d, i * 3 + 1, a as f32);
        put_f32(d, i * 3 + 2, b as f32);
    }
    Ok(())
}

fn labf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (x, y, z) = lab_to_xyz(
            f32_at(s, i * 3) as f64,
            f32_at(s, i * 3 + 1) as f64,
            f32_at(s, i * 3 + 2) as f64,
        );
        let (r, g, b) = xyz_to_rgb(x, y, z);
        put_f32(d, i * 4, r as f32);
        put_f32(d, i * 4 + 1, g as f32);
        put_f32(d, i * 4 + 2, b as f32);
        put_f32(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

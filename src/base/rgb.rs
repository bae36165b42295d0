//! The RGB family: linear, gamma-companded and associated-alpha variants.
//!
//! `RGBA` (linear light, un-premultiplied, sRGB primaries) is the hub model
//! every other model converts through. The companded `R'G'B'` variants use
//! the sRGB transfer curve; its linear segment keeps negative and over-range
//! corpus values finite.

use half::f16;

use crate::base::{f32_at, f64_at, fast_conversion, model_conversion, put_f32, put_f64};
use crate::conversion::{KernelCtx, KernelError};
use crate::node::ModelFlags;
use crate::registry::{FormatSpec, ModelSpec, Registry};
use crate::Error;

/// sRGB electro-optical transfer, defined piecewise so the linear segment
/// also covers negative values.
#[inline]
pub(crate) fn gamma_to_linear(v: f64) -> f64 {
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

#[inline]
pub(crate) fn linear_to_gamma(v: f64) -> f64 {
    if v > 0.003130804954 {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    } else {
        v * 12.92
    }
}

pub(crate) fn register(reg: &mut Registry) -> Result<(), Error> {
    let u8t = reg.lookup_type("u8").expect("base types registered first");
    let halft = reg.lookup_type("half").expect("base types registered first");
    let floatt = reg.lookup_type("float").expect("base types registered first");

    let r = reg.register_component("R")?;
    let g = reg.register_component("G")?;
    let b = reg.register_component("B")?;
    let a = reg.register_component("A")?;
    let rp = reg.register_component("R'")?;
    let gp = reg.register_component("G'")?;
    let bp = reg.register_component("B'")?;
    let ra = reg.register_component("Ra")?;
    let ga = reg.register_component("Ga")?;
    let ba = reg.register_component("Ba")?;

    let rgba = reg.register_model(ModelSpec {
        name: "RGBA",
        components: &[r, g, b, a],
        flags: ModelFlags::ALPHA,
        space: Some("sRGB"),
    })?;
    let rgb = reg.register_model(ModelSpec {
        name: "RGB",
        components: &[r, g, b],
        flags: ModelFlags::empty(),
        space: Some("sRGB"),
    })?;
    let srgb = reg.register_model(ModelSpec {
        name: "R'G'B'",
        components: &[rp, gp, bp],
        flags: ModelFlags::empty(),
        space: Some("sRGB"),
    })?;
    let srgba = reg.register_model(ModelSpec {
        name: "R'G'B'A",
        components: &[rp, gp, bp, a],
        flags: ModelFlags::ALPHA,
        space: Some("sRGB"),
    })?;
    let premul = reg.register_model(ModelSpec {
        name: "RaGaBaA",
        components: &[ra, ga, ba, a],
        flags: ModelFlags::ALPHA | ModelFlags::PREMULTIPLIED,
        space: Some("sRGB"),
    })?;

    model_conversion(reg, "RGBA", "RGB", rgba_to_rgb_d)?;
    model_conversion(reg, "RGB", "RGBA", rgb_to_rgba_d)?;
    model_conversion(reg, "RGBA", "R'G'B'", rgba_to_srgb_d)?;
    model_conversion(reg, "R'G'B'", "RGBA", srgb_to_rgba_d)?;
    model_conversion(reg, "RGBA", "R'G'B'A", rgba_to_srgba_d)?;
    model_conversion(reg, "R'G'B'A", "RGBA", srgba_to_rgba_d)?;
    model_conversion(reg, "RGBA", "RaGaBaA", rgba_to_premul_d)?;
    model_conversion(reg, "RaGaBaA", "RGBA", premul_to_rgba_d)?;

    reg.register_format(FormatSpec {
        name: "RGBA float",
        model: rgba,
        layout: &[(r, floatt), (g, floatt), (b, floatt), (a, floatt)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "RGBA half",
        model: rgba,
        layout: &[(r, halft), (g, halft), (b, halft), (a, halft)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "RGB float",
        model: rgb,
        layout: &[(r, floatt), (g, floatt), (b, floatt)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "R'G'B' u8",
        model: srgb,
        layout: &[(rp, u8t), (gp, u8t), (bp, u8t)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "R'G'B' float",
        model: srgb,
        layout: &[(rp, floatt), (gp, floatt), (bp, floatt)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "R'G'B'A u8",
        model: srgba,
        layout: &[(rp, u8t), (gp, u8t), (bp, u8t), (a, u8t)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "R'G'B'A float",
        model: srgba,
        layout: &[(rp, floatt), (gp, floatt), (bp, floatt), (a, floatt)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;
    reg.register_format(FormatSpec {
        name: "RaGaBaA float",
        model: premul,
        layout: &[(ra, floatt), (ga, floatt), (ba, floatt), (a, floatt)],
        planar: false,
        palette: false,
        space: Some("sRGB"),
    })?;

    fast_conversion(reg, "R'G'B' u8", "R'G'B' float", srgb8_to_srgbf, 12.0)?;
    fast_conversion(reg, "R'G'B' float", "R'G'B' u8", srgbf_to_srgb8, 12.0)?;
    fast_conversion(reg, "R'G'B'A u8", "R'G'B'A float", srgba8_to_srgbaf, 14.0)?;
    fast_conversion(reg, "R'G'B'A float", "R'G'B'A u8", srgbaf_to_srgba8, 14.0)?;
    fast_conversion(reg, "R'G'B' u8", "R'G'B'A float", srgb8_to_srgbaf, 14.0)?;
    fast_conversion(reg, "R'G'B'A float", "R'G'B' u8", srgbaf_to_srgb8, 14.0)?;
    fast_conversion(reg, "R'G'B' float", "RGBA float", srgbf_to_rgbaf, 45.0)?;
    fast_conversion(reg, "RGBA float", "R'G'B' float", rgbaf_to_srgbf, 45.0)?;
    fast_conversion(reg, "R'G'B'A float", "RGBA float", srgbaf_to_rgbaf, 45.0)?;
    fast_conversion(reg, "RGBA float", "R'G'B'A float", rgbaf_to_srgbaf, 45.0)?;
    fast_conversion(reg, "RGBA float", "RGBA double", rgbaf_to_rgbad, 8.0)?;
    fast_conversion(reg, "RGBA double", "RGBA float", rgbad_to_rgbaf, 8.0)?;
    fast_conversion(reg, "RGBA float", "RGB float", rgbaf_to_rgbf, 10.0)?;
    fast_conversion(reg, "RGB float", "RGBA float", rgbf_to_rgbaf, 10.0)?;
    fast_conversion(reg, "RGBA float", "RaGaBaA float", rgbaf_to_premulf, 16.0)?;
    fast_conversion(reg, "RaGaBaA float", "RGBA float", premulf_to_rgbaf, 18.0)?;
    fast_conversion(reg, "RGBA half", "RGBA float", rgbah_to_rgbaf, 18.0)?;
    fast_conversion(reg, "RGBA float", "RGBA half", rgbaf_to_rgbah, 18.0)?;
    Ok(())
}

// ----------------------------------------------------------------------
// Model kernels (packed doubles, canonical component order)
// ----------------------------------------------------------------------

fn rgba_to_rgb_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 3 + c, f64_at(s, i * 4 + c));
        }
    }
    Ok(())
}

fn rgb_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 4 + c, f64_at(s, i * 3 + c));
        }
        put_f64(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgba_to_srgb_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 3 + c, linear_to_gamma(f64_at(s, i * 4 + c)));
        }
    }
    Ok(())
}

fn srgb_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 4 + c, gamma_to_linear(f64_at(s, i * 3 + c)));
        }
        put_f64(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgba_to_srgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 4 + c, linear_to_gamma(f64_at(s, i * 4 + c)));
        }
        put_f64(d, i * 4 + 3, f64_at(s, i * 4 + 3));
    }
    Ok(())
}

fn srgba_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f64(d, i * 4 + c, gamma_to_linear(f64_at(s, i * 4 + c)));
        }
        put_f64(d, i * 4 + 3, f64_at(s, i * 4 + 3));
    }
    Ok(())
}

fn rgba_to_premul_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f64_at(s, i * 4 + 3);
        for c in 0..3 {
            put_f64(d, i * 4 + c, f64_at(s, i * 4 + c) * alpha);
        }
        put_f64(d, i * 4 + 3, alpha);
    }
    Ok(())
}

fn premul_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f64_at(s, i * 4 + 3);
        for c in 0..3 {
            let v = f64_at(s, i * 4 + c);
            put_f64(d, i * 4 + c, if alpha == 0.0 { 0.0 } else { v / alpha });
        }
        put_f64(d, i * 4 + 3, alpha);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Fast packed kernels
// ----------------------------------------------------------------------

fn srgb8_to_srgbf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 3 {
        put_f32(d, i, s[i] as f32 / 255.0);
    }
    Ok(())
}

fn srgbf_to_srgb8(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 3 {
        d[i] = (f32_at(s, i) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

fn srgba8_to_srgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        put_f32(d, i, s[i] as f32 / 255.0);
    }
    Ok(())
}

fn srgbaf_to_srgba8(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        d[i] = (f32_at(s, i) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

fn srgb8_to_srgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 4 + c, s[i * 3 + c] as f32 / 255.0);
        }
        put_f32(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn srgbaf_to_srgb8(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            d[i * 3 + c] = (f32_at(s, i * 4 + c) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}

fn srgbf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 4 + c, gamma_to_linear(f32_at(s, i * 3 + c) as f64) as f32);
        }
        put_f32(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgbaf_to_srgbf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 3 + c, linear_to_gamma(f32_at(s, i * 4 + c) as f64) as f32);
        }
    }
    Ok(())
}

fn srgbaf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 4 + c, gamma_to_linear(f32_at(s, i * 4 + c) as f64) as f32);
        }
        put_f32(d, i * 4 + 3, f32_at(s, i * 4 + 3));
    }
    Ok(())
}

fn rgbaf_to_srgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 4 + c, linear_to_gamma(f32_at(s, i * 4 + c) as f64) as f32);
        }
        put_f32(d, i * 4 + 3, f32_at(s, i * 4 + 3));
    }
    Ok(())
}

fn rgbaf_to_rgbad(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        put_f64(d, i, f32_at(s, i) as f64);
    }
    Ok(())
}

fn rgbad_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        put_f32(d, i, f64_at(s, i) as f32);
    }
    Ok(())
}

fn rgbaf_to_rgbf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 3 + c, f32_at(s, i * 4 + c));
        }
    }
    Ok(())
}

fn rgbf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        for c in 0..3 {
            put_f32(d, i * 4 + c, f32_at(s, i * 3 + c));
        }
        put_f32(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgbaf_to_premulf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f32_at(s, i * 4 + 3);
        for c in 0..3 {
            put_f32(d, i * 4 + c, f32_at(s, i * 4 + c) * alpha);
        }
        put_f32(d, i * 4 + 3, alpha);
    }
    Ok(())
}

fn premulf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f32_at(s, i * 4 + 3);
        for c in 0..3 {
            let v = f32_at(s, i * 4 + c);
            put_f32(d, i * 4 + c, if alpha == 0.0 { 0.0 } else { v / alpha });
        }
        put_f32(d, i * 4 + 3, alpha);
    }
    Ok(())
}

fn rgbah_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        let at = i * 2;
        let bits = u16::from_ne_bytes([s[at], s[at + 1]]);
        put_f32(d, i, f16::from_bits(bits).to_f32());
    }
    Ok(())
}

fn rgbaf_to_rgbah(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n * 4 {
        let bits = f16::from_f32(f32_at(s, i)).to_bits();
        let at = i * 2;
        d[at..at + 2].copy_from_slice(&bits.to_ne_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_round_trips_in_and_out_of_gamut() {
        for v in [-0.5, 0.0, 0.0031, 0.04, 0.18, 0.5, 1.0, 1.8] {
            let rt = gamma_to_linear(linear_to_gamma(v));
            assert!((rt - v).abs() < 1e-12, "{v} -> {rt}");
        }
    }

    #[test]
    fn transfer_matches_known_points() {
        // 50% gray byte: 127/255 companded -> 0.2122 linear.
        let lin = gamma_to_linear(127.0 / 255.0);
        assert!((lin - 0.2122).abs() < 1e-4, "{lin}");
        assert!((linear_to_gamma(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn premultiplication_zeroes_transparent_pixels() {
        let mut rgba = vec![0u8; 32];
        for (i, v) in [0.25f64, 0.5, 0.75, 0.0].iter().enumerate() {
            put_f64(&mut rgba, i, *v);
        }
        let mut pre = vec![0u8; 32];
        rgba_to_premul_d(&KernelCtx::default(), &rgba, &mut pre, 1).unwrap();
        assert_eq!(f64_at(&pre, 0), 0.0);
        // And back: alpha 0 stays all-zero instead of dividing by zero.
        let mut back = vec![0u8; 32];
        premul_to_rgba_d(&KernelCtx::default(), &pre, &mut back, 1).unwrap();
        assert_eq!(f64_at(&back, 1), 0.0);
    }
}

//! CMYK and its associated-alpha complement `camayakaA`.
//!
//! The separation is the naive one, computed from linear RGB: the key is
//! the complement of the brightest channel and the chromatic inks are
//! normalized against it. `camayakaA` stores the ink *complements*
//! premultiplied by alpha, which is the layout the packed cairo formats
//! shuffle bytes with.

use crate::base::{f32_at, f64_at, fast_conversion, model_conversion, put_f32, put_f64};
use crate::conversion::{KernelCtx, KernelError};
use crate::node::ModelFlags;
use crate::registry::{FormatSpec, ModelSpec, Registry};
use crate::Error;

#[inline]
fn rgb_to_cmyk(r: f64, g: f64, b: f64) -> (f64, f64, f64, f64) {
    let k = 1.0 - r.max(g).max(b);
    let s = 1.0 - k;
    if s == 0.0 {
        return (0.0, 0.0, 0.0, 1.0);
    }
    ((1.0 - r - k) / s, (1.0 - g - k) / s, (1.0 - b - k) / s, k)
}

#[inline]
fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> (f64, f64, f64) {
    let s = 1.0 - k;
    ((1.0 - c) * s, (1.0 - m) * s, (1.0 - y) * s)
}

#[inline]
fn unpremul(v: f64, a: f64) -> f64 {
    if a == 0.0 {
        0.0
    } else {
        v / a
    }
}

pub(crate) fn register(reg: &mut Registry) -> Result<(), Error> {
    let u8t = reg.lookup_type("u8").expect("base types registered first");
    let floatt = reg.lookup_type("float").expect("base types registered first");
    let a = reg.lookup_component("A").expect("RGB family registered first");

    let cyan = reg.register_component("cyan")?;
    let magenta = reg.register_component("magenta")?;
    let yellow = reg.register_component("yellow")?;
    let key = reg.register_component("key")?;
    let ca = reg.register_component("ca")?;
    let ma = reg.register_component("ma")?;
    let ya = reg.register_component("ya")?;
    let ka = reg.register_component("ka")?;

    let cmyk = reg.register_model(ModelSpec {
        name: "CMYK",
        components: &[cyan, magenta, yellow, key],
        flags: ModelFlags::empty(),
        space: None,
    })?;
    let camayaka = reg.register_model(ModelSpec {
        name: "camayakaA",
        components: &[ca, ma, ya, ka, a],
        flags: ModelFlags::ALPHA | ModelFlags::PREMULTIPLIED,
        space: None,
    })?;

    model_conversion(reg, "RGBA", "CMYK", rgba_to_cmyk_d)?;
    model_conversion(reg, "CMYK", "RGBA", cmyk_to_rgba_d)?;
    model_conversion(reg, "RGBA", "camayakaA", rgba_to_camayaka_d)?;
    model_conversion(reg, "camayakaA", "RGBA", camayaka_to_rgba_d)?;

    reg.register_format(FormatSpec {
        name: "CMYK float",
        model: cmyk,
        layout: &[(cyan, floatt), (magenta, floatt), (yellow, floatt), (key, floatt)],
        planar: false,
        palette: false,
        space: None,
    })?;
    reg.register_format(FormatSpec {
        name: "camayakaA u8",
        model: camayaka,
        layout: &[(ca, u8t), (ma, u8t), (ya, u8t), (ka, u8t), (a, u8t)],
        planar: false,
        palette: false,
        space: None,
    })?;

    fast_conversion(reg, "RGBA float", "CMYK float", rgbaf_to_cmykf, 35.0)?;
    fast_conversion(reg, "CMYK float", "RGBA float", cmykf_to_rgbaf, 35.0)?;
    Ok(())
}

// ----------------------------------------------------------------------
// Model kernels
// ----------------------------------------------------------------------

fn rgba_to_cmyk_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (c, m, y, k) =
            rgb_to_cmyk(f64_at(s, i * 4), f64_at(s, i * 4 + 1), f64_at(s, i * 4 + 2));
        put_f64(d, i * 4, c);
        put_f64(d, i * 4 + 1, m);
        put_f64(d, i * 4 + 2, y);
        put_f64(d, i * 4 + 3, k);
    }
    Ok(())
}

fn cmyk_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (r, g, b) = cmyk_to_rgb(
            f64_at(s, i * 4),
            f64_at(s, i * 4 + 1),
            f64_at(s, i * 4 + 2),
            f64_at(s, i * 4 + 3),
        );
        put_f64(d, i * 4, r);
        put_f64(d, i * 4 + 1, g);
        put_f64(d, i * 4 + 2, b);
        put_f64(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

fn rgba_to_camayaka_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f64_at(s, i * 4 + 3);
        let (c, m, y, k) =
            rgb_to_cmyk(f64_at(s, i * 4), f64_at(s, i * 4 + 1), f64_at(s, i * 4 + 2));
        put_f64(d, i * 5, (1.0 - c) * alpha);
        put_f64(d, i * 5 + 1, (1.0 - m) * alpha);
        put_f64(d, i * 5 + 2, (1.0 - y) * alpha);
        put_f64(d, i * 5 + 3, (1.0 - k) * alpha);
        put_f64(d, i * 5 + 4, alpha);
    }
    Ok(())
}

fn camayaka_to_rgba_d(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let alpha = f64_at(s, i * 5 + 4);
        let c = 1.0 - unpremul(f64_at(s, i * 5), alpha);
        let m = 1.0 - unpremul(f64_at(s, i * 5 + 1), alpha);
        let y = 1.0 - unpremul(f64_at(s, i * 5 + 2), alpha);
        let k = 1.0 - unpremul(f64_at(s, i * 5 + 3), alpha);
        let (r, g, b) = cmyk_to_rgb(c, m, y, k);
        put_f64(d, i * 4, r);
        put_f64(d, i * 4 + 1, g);
        put_f64(d, i * 4 + 2, b);
        put_f64(d, i * 4 + 3, alpha);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Fast packed kernels
// ----------------------------------------------------------------------

fn rgbaf_to_cmykf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (c, m, y, k) = rgb_to_cmyk(
            f32_at(s, i * 4) as f64,
            f32_at(s, i * 4 + 1) as f64,
            f32_at(s, i * 4 + 2) as f64,
        );
        put_f32(d, i * 4, c as f32);
        put_f32(d, i * 4 + 1, m as f32);
        put_f32(d, i * 4 + 2, y as f32);
        put_f32(d, i * 4 + 3, k as f32);
    }
    Ok(())
}

fn cmykf_to_rgbaf(_: &KernelCtx, s: &[u8], d: &mut [u8], n: usize) -> Result<(), KernelError> {
    for i in 0..n {
        let (r, g, b) = cmyk_to_rgb(
            f32_at(s, i * 4) as f64,
            f32_at(s, i * 4 + 1) as f64,
            f32_at(s, i * 4 + 2) as f64,
            f32_at(s, i * 4 + 3) as f64,
        );
        put_f32(d, i * 4, r as f32);
        put_f32(d, i * 4 + 1, g as f32);
        put_f32(d, i * 4 + 2, b as f32);
        put_f32(d, i * 4 + 3, 1.0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_matches_the_reference_table() {
        let table = [
            ((1.0, 1.0, 1.0), (0.0, 0.0, 0.0, 0.0)),
            ((0.0, 1.0, 0.0), (1.0, 0.0, 1.0, 0.0)),
            ((0.5, 0.5, 0.5), (0.0, 0.0, 0.0, 0.5)),
            ((0.0, 1.0, 1.0), (1.0, 0.0, 0.0, 0.0)),
        ];
        for ((r, g, b), want) in table {
            let got = rgb_to_cmyk(r, g, b);
            assert!((got.0 - want.0).abs() < 1e-12, "{got:?} vs {want:?}");
            assert!((got.1 - want.1).abs() < 1e-12);
            assert!((got.2 - want.2).abs() < 1e-12);
            assert!((got.3 - want.3).abs() < 1e-12);
            let back = cmyk_to_rgb(want.0, want.1, want.2, want.3);
            assert!((back.0 - r).abs() < 1e-12);
            assert!((back.1 - g).abs() < 1e-12);
            assert!((back.2 - b).abs() < 1e-12);
        }
    }

    #[test]
    fn complement_premultiplication_round_trips() {
        let src: Vec<f64> = vec![0.3, 0.8, 0.1, 0.6];
        let mut rgba = vec![0u8; 32];
        for (i, v) in src.iter().enumerate() {
            put_f64(&mut rgba, i, *v);
        }
        let mut ink = vec![0u8; 40];
        rgba_to_camayaka_d(&KernelCtx::default(), &rgba, &mut ink, 1).unwrap();
        let mut back = vec![0u8; 32];
        camayaka_to_rgba_d(&KernelCtx::default(), &ink, &mut back, 1).unwrap();
        for (i, v) in src.iter().enumerate() {
            assert!((f64_at(&back, i) - v).abs() < 1e-12);
        }
    }
}

//! Packed 32-bit cairo CMYK layouts.
//!
//! `cairo-ACYK32` and `cairo-ACMK32` store four of `camayakaA`'s five ink
//! planes as one little-endian `0xAACCYYKK` / `0xAACCMMKK` word. The
//! conversions to and from `camayakaA u8` are pure byte shuffles; each
//! format drops one chromatic plane and, in the other direction, leaves
//! that plane of the destination untouched. Converting a buffer through
//! both formats therefore reassembles every original plane.

use crate::conversion::{run_plane_map, Kernel};
use crate::node::Endpoint;
use crate::registry::{ConversionSpec, FormatSpec, Registry};
use crate::Error;

pub(crate) fn register(reg: &mut Registry) -> Result<(), Error> {
    let u8t = reg.lookup_type("u8").expect("base types registered first");
    let model = reg.lookup_model("camayakaA").expect("CMYK family registered first");
    let a = reg.lookup_component("A").expect("RGB family registered first");
    let ca = reg.lookup_component("ca").expect("CMYK family registered first");
    let ma = reg.lookup_component("ma").expect("CMYK family registered first");
    let ya = reg.lookup_component("ya").expect("CMYK family registered first");
    let ka = reg.lookup_component("ka").expect("CMYK family registered first");

    let acyk = reg.register_format(FormatSpec {
        name: "cairo-ACYK32",
        model,
        layout: &[(ka, u8t), (ya, u8t), (ca, u8t), (a, u8t)],
        planar: false,
        palette: false,
        space: None,
    })?;
    let acmk = reg.register_format(FormatSpec {
        name: "cairo-ACMK32",
        model,
        layout: &[(ka, u8t), (ma, u8t), (ca, u8t), (a, u8t)],
        planar: false,
        palette: false,
        space: None,
    })?;

    let ink = reg
        .lookup_format("camayakaA u8")
        .ok_or_else(|| Error::UnknownName("camayakaA u8".to_string()))?;
    for packed in [acyk, acmk] {
        for (src, dst) in [(ink, packed), (packed, ink)] {
            reg.register_conversion(ConversionSpec {
                src: Endpoint::Format(src),
                dst: Endpoint::Format(dst),
                kernel: Kernel::Planar(run_plane_map),
                cost: Some(15.0),
                error: None,
                plane_fn: None,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::base;
    use crate::conversion::run_plane_map;
    use crate::registry::Registry;

    #[test]
    fn packed_layouts_are_four_bytes_in_word_order() {
        let mut reg = Registry::new();
        base::register_all(&mut reg).unwrap();
        let acyk = reg.lookup_format("cairo-ACYK32").unwrap();
        let node = reg.format(acyk);
        assert_eq!(node.bytes_per_pixel, 4);
        let names: Vec<_> =
            node.components.iter().map(|&c| reg.component(c).name.as_str()).collect();
        assert_eq!(names, vec!["ka", "ya", "ca", "A"]);
    }

    #[test]
    fn complementary_shuffles_reassemble_all_planes() {
        let mut reg = Registry::new();
        base::register_all(&mut reg).unwrap();
        let ink = reg.lookup_format("camayakaA u8").unwrap();
        let acyk = reg.lookup_format("cairo-ACYK32").unwrap();
        let acmk = reg.lookup_format("cairo-ACMK32").unwrap();

        let src: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut cyk = [0u8; 8];
        let mut cmk = [0u8; 8];
        let to_cyk = reg.match_planes_for_test(ink, acyk);
        let to_cmk = reg.match_planes_for_test(ink, acmk);
        run_plane_map(&to_cyk, &src, &mut cyk, 2).unwrap();
        run_plane_map(&to_cmk, &src, &mut cmk, 2).unwrap();

        let mut dst = [0u8; 10];
        run_plane_map(&reg.match_planes_for_test(acmk, ink), &cmk, &mut dst, 2).unwrap();
        run_plane_map(&reg.match_planes_for_test(acyk, ink), &cyk, &mut dst, 2).unwrap();
        assert_eq!(dst, src);
    }
}

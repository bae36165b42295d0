//! Companded sRGB bytes to CIE Lab bytes, checked against the classic
//! six-pixel reference table, exactly.

use pixelfish::{Instance, Tunables};

const PIXELS: usize = 6;

#[rustfmt::skip]
const SOURCE: [u8; PIXELS * 3] = [
    0,   0,   0,
    127, 127, 127,
    255, 255, 255,
    255, 0,   0,
    0,   255, 0,
    0,   0,   255,
];

#[rustfmt::skip]
const REFERENCE: [u8; PIXELS * 3] = [
    0,   128, 128,
    136, 128, 128,
    255, 128, 128,
    138, 209, 198,
    224, 49,  209,
    75,  196, 16,
];

#[test]
fn srgb_u8_to_lab_u8_matches_the_reference_bytes() {
    let inst = Instance::with_tunables(Tunables::default());
    let fish = inst.fish("R'G'B' u8", "CIE Lab u8").unwrap();

    let mut dest = [0u8; PIXELS * 3];
    let n = inst.process(&fish, &SOURCE, &mut dest, PIXELS).unwrap();
    assert_eq!(n, PIXELS);
    assert_eq!(dest, REFERENCE);
}

#[test]
fn repeated_processing_is_idempotent() {
    let inst = Instance::with_tunables(Tunables::default());
    let fish = inst.fish("R'G'B' u8", "CIE Lab u8").unwrap();

    let mut first = [0u8; PIXELS * 3];
    let mut second = [0u8; PIXELS * 3];
    inst.process(&fish, &SOURCE, &mut first, PIXELS).unwrap();
    inst.process(&fish, &SOURCE, &mut second, PIXELS).unwrap();
    assert_eq!(first, second);
}

#[test]
fn planning_the_same_pair_twice_yields_the_same_chain() {
    let a = Instance::with_tunables(Tunables::default());
    let b = Instance::with_tunables(Tunables::default());
    let fish_a = a.fish("R'G'B' u8", "CIE Lab u8").unwrap();
    let fish_b = b.fish("R'G'B' u8", "CIE Lab u8").unwrap();

    let names_a: Vec<String> = a.with_registry(|r| {
        fish_a.conversions().iter().map(|&c| r.conversion(c).name.clone()).collect()
    });
    let names_b: Vec<String> = b.with_registry(|r| {
        fish_b.conversions().iter().map(|&c| r.conversion(c).name.clone()).collect()
    });
    assert_eq!(names_a, names_b);
}

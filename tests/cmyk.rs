//! Linear RGBA to the naive CMYK separation and back.

use pixelfish::{Instance, Tunables};

const TOLERANCE: f32 = 0.001;

#[rustfmt::skip]
const RGBA: [[f32; 4]; 4] = [
    [1.0, 1.0, 1.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.5, 0.5, 0.5, 1.0],
    [0.0, 1.0, 1.0, 1.0],
];

#[rustfmt::skip]
const CMYK: [[f32; 4]; 4] = [
    [0.0, 0.0, 0.0, 0.0],
    [1.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 0.5],
    [1.0, 0.0, 0.0, 0.0],
];

fn as_bytes(pixels: &[[f32; 4]]) -> Vec<u8> {
    pixels.iter().flatten().flat_map(|v| v.to_ne_bytes()).collect()
}

fn check(inst: &Instance, from: &str, to: &str, src: &[[f32; 4]], want: &[[f32; 4]]) {
    let fish = inst.fish(from, to).unwrap();
    let source = as_bytes(src);
    let mut dest = vec![0u8; source.len()];
    inst.process(&fish, &source, &mut dest, src.len()).unwrap();

    for (p, expect) in want.iter().enumerate() {
        for (c, want) in expect.iter().enumerate() {
            let at = (p * 4 + c) * 4;
            let got = f32::from_ne_bytes(dest[at..at + 4].try_into().unwrap());
            assert!(
                (got - want).abs() <= TOLERANCE,
                "{from} -> {to}, pixel {p} component {c}: got {got}, want {want}"
            );
        }
    }
}

#[test]
fn rgba_to_cmyk() {
    let inst = Instance::with_tunables(Tunables::default());
    check(&inst, "RGBA float", "CMYK float", &RGBA, &CMYK);
}

#[test]
fn cmyk_to_rgba() {
    let inst = Instance::with_tunables(Tunables::default());
    check(&inst, "CMYK float", "RGBA float", &CMYK, &RGBA);
}

//! float → half → float: bounded relative error over the full half range,
//! with signed zeros, infinities and NaN preserved.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pixelfish::{Instance, Tunables};

fn round_trip(inst: &Instance, values: &[f32]) -> Vec<f32> {
    assert_eq!(values.len() % 4, 0, "RGBA pixels");
    let n = values.len() / 4;
    let to_half = inst.fish("RGBA float", "RGBA half").unwrap();
    let to_float = inst.fish("RGBA half", "RGBA float").unwrap();

    let source: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let mut packed = vec![0u8; n * 8];
    let mut back = vec![0u8; n * 16];
    inst.process(&to_half, &source, &mut packed, n).unwrap();
    inst.process(&to_float, &packed, &mut back, n).unwrap();

    back.chunks_exact(4)
        .map(|b| f32::from_ne_bytes(b.try_into().unwrap()))
        .collect()
}

#[test]
fn randomized_values_stay_within_half_precision() {
    let inst = Instance::with_tunables(Tunables::default());
    let mut rng = StdRng::from_seed([7u8; 32]);
    let values: Vec<f32> = (0..1024).map(|_| rng.gen_range(-65504.0f32..65504.0)).collect();

    let back = round_trip(&inst, &values);
    for (v, r) in values.iter().zip(&back) {
        let bound = v.abs() * (1.0 / 1024.0);
        assert!(
            (v - r).abs() <= bound.max(f16_smallest_step()),
            "{v} round-tripped to {r}"
        );
    }
}

/// Smallest positive subnormal step of binary16, the floor for the error
/// bound near zero.
fn f16_smallest_step() -> f32 {
    half::f16::from_bits(1).to_f32()
}

#[test]
fn special_values_survive() {
    let inst = Instance::with_tunables(Tunables::default());
    let values = [0.0f32, -0.0, f32::INFINITY, f32::NEG_INFINITY, f32::NAN, 1.0, -1.0, 65504.0];
    let back = round_trip(&inst, &values);

    assert_eq!(back[0].to_bits(), 0.0f32.to_bits());
    assert_eq!(back[1].to_bits(), (-0.0f32).to_bits());
    assert_eq!(back[2], f32::INFINITY);
    assert_eq!(back[3], f32::NEG_INFINITY);
    assert!(back[4].is_nan());
    assert_eq!(back[5], 1.0);
    assert_eq!(back[6], -1.0);
    assert_eq!(back[7], 65504.0);
}

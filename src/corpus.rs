//! The deterministic test-pixel corpus.
//!
//! Chain errors are measured empirically by pushing a fixed set of RGBA
//! double pixels through candidate chains and comparing against the
//! reference path. The corpus is generated once per instance from a fixed
//! seed, so two runs over the same registry plan identical chains.
//!
//! Composition of the path corpus (3072 pixels):
//! - 256 uniform in `[0,1]⁴`
//! - 16 uniform in `[−1,0]⁴` (negative linear values)
//! - 16 uniform in `[1,2]⁴` (over-range values)
//! - 16 uniform in `[0,1]³` with alpha = 0 (penalizes conversions that
//!   destroy the color of fully transparent pixels)
//! - the remainder uniform in `[0,1]⁴`
//!
//! The smaller per-purpose corpora are prefixes of the same array.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const NUM_PATH_TEST_PIXELS: usize = 3072;
pub const NUM_CONVERSION_TEST_PIXELS: usize = 128;
pub const NUM_FORMAT_TEST_PIXELS: usize = 256;
pub const NUM_MODEL_TEST_PIXELS: usize = 512;
pub const NUM_TYPE_TEST_PIXELS: usize = 512;

/// Fixed corpus seed; changing it changes every measured error and therefore
/// participates in the planner version.
const CORPUS_SEED: [u8; 32] = *b"pixelfish-test-pixels-20050728\0\0";

pub struct Corpus {
    /// `NUM_PATH_TEST_PIXELS * 4` doubles, RGBA interleaved.
    pixels: Vec<f64>,
}

impl Corpus {
    pub fn generate() -> Self {
        let mut rng = StdRng::from_seed(CORPUS_SEED);
        let mut pixels = Vec::with_capacity(NUM_PATH_TEST_PIXELS * 4);

        for _ in 0..256 {
            for _ in 0..4 {
                pixels.push(rng.gen::<f64>());
            }
        }
        for _ in 0..16 {
            for _ in 0..4 {
                pixels.push(rng.gen_range(-1.0..0.0));
            }
        }
        for _ in 0..16 {
            for _ in 0..4 {
                pixels.push(rng.gen_range(1.0..2.0));
            }
        }
        for _ in 0..16 {
            for _ in 0..3 {
                pixels.push(rng.gen::<f64>());
            }
            pixels.push(0.0);
        }
        while pixels.len() < NUM_PATH_TEST_PIXELS * 4 {
            pixels.push(rng.gen::<f64>());
        }

        Corpus { pixels }
    }

    /// The full path-evaluation corpus, RGBA doubles.
    #[inline]
    pub fn path_pixels(&self) -> &[f64] {
        &self.pixels
    }

    #[inline]
    pub fn conversion_pixels(&self) -> &[f64] {
        &self.pixels[..NUM_CONVERSION_TEST_PIXELS * 4]
    }

    #[inline]
    pub fn format_pixels(&self) -> &[f64] {
        &self.pixels[..NUM_FORMAT_TEST_PIXELS * 4]
    }

    #[inline]
    pub fn model_pixels(&self) -> &[f64] {
        &self.pixels[..NUM_MODEL_TEST_PIXELS * 4]
    }

    #[inline]
    pub fn type_pixels(&self) -> &[f64] {
        &self.pixels[..NUM_TYPE_TEST_PIXELS * 4]
    }

    /// Serialize a pixel slice into native-endian bytes (the layout of the
    /// `RGBA double` format).
    pub fn to_bytes(pixels: &[f64]) -> Vec<u8> {
        let mut out = Vec::with_capacity(pixels.len() * 8);
        for v in pixels {
            out.extend_from_slice(&v.to_ne_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_is_deterministic() {
        let a = Corpus::generate();
        let b = Corpus::generate();
        assert_eq!(a.pixels, b.pixels);
    }

    #[test]
    fn corpus_has_the_documented_band_structure() {
        let c = Corpus::generate();
        assert_eq!(c.path_pixels().len(), NUM_PATH_TEST_PIXELS * 4);
        assert_eq!(c.conversion_pixels().len(), NUM_CONVERSION_TEST_PIXELS * 4);

        // First 256 pixels are in range.
        for v in &c.path_pixels()[..256 * 4] {
            assert!((0.0..1.0).contains(v));
        }
        // Negative band.
        for v in &c.path_pixels()[256 * 4..272 * 4] {
            assert!((-1.0..0.0).contains(v));
        }
        // Over-range band.
        for v in &c.path_pixels()[272 * 4..288 * 4] {
            assert!((1.0..2.0).contains(v));
        }
        // Transparent band: alpha exactly zero.
        for px in c.path_pixels()[288 * 4..304 * 4].chunks_exact(4) {
            assert_eq!(px[3], 0.0);
        }
    }

    #[test]
    fn byte_serialization_round_trips() {
        let bytes = Corpus::to_bytes(&[0.5, -1.25]);
        assert_eq!(bytes.len(), 16);
        let back = f64::from_ne_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(back, -1.25);
    }
}

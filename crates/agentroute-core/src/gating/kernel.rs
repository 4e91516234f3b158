//! Dense linear-algebra kernels for the gating network
//!
//! The network only needs three primitives over row-major matrices: an
//! affine forward step, a transposed product for backpropagation, and a
//! rank-one update. [`ScalarKernel`] is the portable reference;
//! [`LaneKernel`] blocks the inner loops into fixed-width lanes that the
//! compiler lowers to SIMD on targets that have it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Accumulator width of [`LaneKernel`]
pub const LANES: usize = 8;

/// Matrix primitives over row-major `f32` weights
///
/// `weights` always holds `out.len()` (or `grad.len()`) rows of
/// `input.len()` columns.
pub trait DenseKernel: Send + Sync + fmt::Debug {
    /// Short identifier used in logs and stats
    fn name(&self) -> &'static str;

    /// `out[r] = bias[r] + Σ_c weights[r, c] · input[c]`
    fn affine(&self, weights: &[f32], bias: &[f32], input: &[f32], out: &mut [f32]);

    /// `out[c] = Σ_r weights[r, c] · grad[r]`
    fn transpose_mul(&self, weights: &[f32], grad: &[f32], out: &mut [f32]);

    /// `weights[r, c] += scale · grad[r] · input[c]`
    fn rank_one_update(&self, weights: &mut [f32], grad: &[f32], input: &[f32], scale: f32);
}

/// Straightforward nested loops
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarKernel;

impl DenseKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn affine(&self, weights: &[f32], bias: &[f32], input: &[f32], out: &mut [f32]) {
        let cols = input.len();
        for (r, o) in out.iter_mut().enumerate() {
            let row = &weights[r * cols..(r + 1) * cols];
            let mut acc = bias[r];
            for c in 0..cols {
                acc += row[c] * input[c];
            }
            *o = acc;
        }
    }

    fn transpose_mul(&self, weights: &[f32], grad: &[f32], out: &mut [f32]) {
        let cols = out.len();
        out.fill(0.0);
        for (r, g) in grad.iter().enumerate() {
            let row = &weights[r * cols..(r + 1) * cols];
            for c in 0..cols {
                out[c] += row[c] * g;
            }
        }
    }

    fn rank_one_update(&self, weights: &mut [f32], grad: &[f32], input: &[f32], scale: f32) {
        let cols = input.len();
        for (r, g) in grad.iter().enumerate() {
            let step = scale * g;
            if step == 0.0 {
                continue;
            }
            let row = &mut weights[r * cols..(r + 1) * cols];
            for c in 0..cols {
                row[c] += step * input[c];
            }
        }
    }
}

/// Lane-blocked loops with independent accumulators
#[derive(Debug, Default, Clone, Copy)]
pub struct LaneKernel;

impl LaneKernel {
    fn dot(a: &[f32], b: &[f32]) -> f32 {
        let mut acc = [0.0f32; LANES];
        let a_chunks = a.chunks_exact(LANES);
        let b_chunks = b.chunks_exact(LANES);
        let tail: f32 = a_chunks
            .remainder()
            .iter()
            .zip(b_chunks.remainder())
            .map(|(x, y)| x * y)
            .sum();
        for (x, y) in a_chunks.zip(b_chunks) {
            for l in 0..LANES {
                acc[l] += x[l] * y[l];
            }
        }
        acc.iter().sum::<f32>() + tail
    }

    /// `dst += alpha · src`
    fn axpy(dst: &mut [f32], src: &[f32], alpha: f32) {
        let mut d_chunks = dst.chunks_exact_mut(LANES);
        let mut s_chunks = src.chunks_exact(LANES);
        for (d, s) in d_chunks.by_ref().zip(s_chunks.by_ref()) {
            for l in 0..LANES {
                d[l] += alpha * s[l];
            }
        }
        for (d, s) in d_chunks
            .into_remainder()
            .iter_mut()
            .zip(s_chunks.remainder())
        {
            *d += alpha * s;
        }
    }
}

impl DenseKernel for LaneKernel {
    fn name(&self) -> &'static str {
        "lanes"
    }

    fn affine(&self, weights: &[f32], bias: &[f32], input: &[f32], out: &mut [f32]) {
        let cols = input.len();
        for (r, o) in out.iter_mut().enumerate() {
            *o = bias[r] + Self::dot(&weights[r * cols..(r + 1) * cols], input);
        }
    }

    fn transpose_mul(&self, weights: &[f32], grad: &[f32], out: &mut [f32]) {
        let cols = out.len();
        out.fill(0.0);
        for (r, g) in grad.iter().enumerate() {
            if *g != 0.0 {
                Self::axpy(out, &weights[r * cols..(r + 1) * cols], *g);
            }
        }
    }

    fn rank_one_update(&self, weights: &mut [f32], grad: &[f32], input: &[f32], scale: f32) {
        let cols = input.len();
        for (r, g) in grad.iter().enumerate() {
            let step = scale * g;
            if step != 0.0 {
                Self::axpy(&mut weights[r * cols..(r + 1) * cols], input, step);
            }
        }
    }
}

/// Kernel selection in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    /// Lanes when the CPU has wide vector units, scalar otherwise
    #[default]
    Auto,
    Scalar,
    Lanes,
}

impl FromStr for KernelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "scalar" => Ok(Self::Scalar),
            "lanes" | "simd" => Ok(Self::Lanes),
            other => Err(format!("unknown kernel '{}' (expected auto, scalar or lanes)", other)),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Scalar => write!(f, "scalar"),
            Self::Lanes => write!(f, "lanes"),
        }
    }
}

impl KernelKind {
    /// Instantiate the kernel, probing the CPU for `Auto`
    pub fn build(self) -> Arc<dyn DenseKernel> {
        let kernel: Arc<dyn DenseKernel> = match self {
            Self::Scalar => Arc::new(ScalarKernel),
            Self::Lanes => Arc::new(LaneKernel),
            Self::Auto if has_wide_vectors() => Arc::new(LaneKernel),
            Self::Auto => Arc::new(ScalarKernel),
        };
        debug!(requested = %self, selected = kernel.name(), "Selected dense kernel");
        kernel
    }
}

#[cfg(target_arch = "x86_64")]
fn has_wide_vectors() -> bool {
    std::is_x86_feature_detected!("avx2")
}

// NEON is mandatory on aarch64
#[cfg(target_arch = "aarch64")]
fn has_wide_vectors() -> bool {
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn has_wide_vectors() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random(rng: &mut ChaCha8Rng, n: usize) -> Vec<f32> {
        (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_affine_small_example() {
        // 2x3 matrix
        let w = [1.0, 2.0, 3.0, -1.0, 0.0, 1.0];
        let b = [0.5, -0.5];
        let x = [1.0, 1.0, 2.0];
        for kernel in [KernelKind::Scalar.build(), KernelKind::Lanes.build()] {
            let mut out = [0.0; 2];
            kernel.affine(&w, &b, &x, &mut out);
            assert_eq!(out, [9.5, 0.5]);
        }
    }

    #[test]
    fn test_kernels_agree() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (rows, cols) = (5, 21);
        let w = random(&mut rng, rows * cols);
        let b = random(&mut rng, rows);
        let x = random(&mut rng, cols);
        let g = random(&mut rng, rows);

        let (scalar, lanes) = (ScalarKernel, LaneKernel);

        let (mut o1, mut o2) = (vec![0.0; rows], vec![0.0; rows]);
        scalar.affine(&w, &b, &x, &mut o1);
        lanes.affine(&w, &b, &x, &mut o2);
        assert_close(&o1, &o2);

        let (mut t1, mut t2) = (vec![0.0; cols], vec![0.0; cols]);
        scalar.transpose_mul(&w, &g, &mut t1);
        lanes.transpose_mul(&w, &g, &mut t2);
        assert_close(&t1, &t2);

        let (mut w1, mut w2) = (w.clone(), w.clone());
        scalar.rank_one_update(&mut w1, &g, &x, 0.1);
        lanes.rank_one_update(&mut w2, &g, &x, 0.1);
        assert_close(&w1, &w2);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("AUTO".parse::<KernelKind>().unwrap(), KernelKind::Auto);
        assert_eq!("simd".parse::<KernelKind>().unwrap(), KernelKind::Lanes);
        assert!("gpu".parse::<KernelKind>().is_err());
        assert_eq!(KernelKind::Scalar.build().name(), "scalar");
        assert_eq!(KernelKind::Lanes.to_string(), "lanes");
    }
}

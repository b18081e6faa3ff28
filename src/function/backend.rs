//! Kernel backend selection for the STE primitives
//!
//! Two interchangeable implementations of the forward kernels exist: a
//! vectorized whole-array path and a scalar reference path. The choice is
//! made once per process from the configuration flags and cached; callers
//! never branch per invocation. An optional chunk-parallel wrapper can be
//! layered on top, transparent to callers.

use crate::config;
use ndarray::{Array1, Zip};
use rayon::prelude::*;
use std::sync::LazyLock;

/// Arrays shorter than this bypass the parallel wrapper.
const PARALLEL_LEN_THRESHOLD: usize = 4096;
/// Chunk size handed to each worker by the parallel wrapper.
const PARALLEL_CHUNK: usize = 1024;

/// Forward kernels for the STE primitive set.
///
/// Implementations must agree elementwise; they differ only in execution
/// strategy. Gradient handling happens a layer above, in `function::ste`.
pub trait SteKernels: Send + Sync {
    fn round(&self, x: &Array1<f32>) -> Array1<f32>;
    fn ceil(&self, x: &Array1<f32>) -> Array1<f32>;
    fn floor(&self, x: &Array1<f32>) -> Array1<f32>;
    fn round_to_zero(&self, x: &Array1<f32>) -> Array1<f32>;
    fn binary_sign(&self, x: &Array1<f32>) -> Array1<f32>;
    fn ternary_sign(&self, x: &Array1<f32>) -> Array1<f32>;
    fn tensor_clamp(&self, x: &Array1<f32>, min: &Array1<f32>, max: &Array1<f32>)
        -> Array1<f32>;
    fn scalar_clamp(&self, x: &Array1<f32>, min: f32, max: f32) -> Array1<f32>;
    fn scalar_clamp_min(&self, x: &Array1<f32>, min: f32) -> Array1<f32>;
}

fn binary_sign_value(x: f32) -> f32 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn ternary_sign_value(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn assert_bound_len(x_len: usize, bound_len: usize) {
    assert!(
        bound_len == x_len || bound_len == 1,
        "clamp bound length {bound_len} must equal the input length {x_len} or be 1"
    );
}

/// Vectorized whole-array implementation (the native path)
pub struct VectorizedKernels;

impl SteKernels for VectorizedKernels {
    fn round(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(f32::round)
    }

    fn ceil(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(f32::ceil)
    }

    fn floor(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(f32::floor)
    }

    fn round_to_zero(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(f32::trunc)
    }

    fn binary_sign(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(binary_sign_value)
    }

    fn ternary_sign(&self, x: &Array1<f32>) -> Array1<f32> {
        x.mapv(ternary_sign_value)
    }

    fn tensor_clamp(
        &self,
        x: &Array1<f32>,
        min: &Array1<f32>,
        max: &Array1<f32>,
    ) -> Array1<f32> {
        assert_bound_len(x.len(), min.len());
        assert_bound_len(x.len(), max.len());

        if min.len() == x.len() && max.len() == x.len() {
            Zip::from(x)
                .and(min)
                .and(max)
                .map_collect(|&v, &lo, &hi| v.max(lo).min(hi))
        } else {
            // Length-1 bounds broadcast over the whole input.
            Array1::from_shape_fn(x.len(), |i| {
                let lo = if min.len() == 1 { min[0] } else { min[i] };
                let hi = if max.len() == 1 { max[0] } else { max[i] };
                x[i].max(lo).min(hi)
            })
        }
    }

    fn scalar_clamp(&self, x: &Array1<f32>, min: f32, max: f32) -> Array1<f32> {
        x.mapv(|v| v.max(min).min(max))
    }

    fn scalar_clamp_min(&self, x: &Array1<f32>, min: f32) -> Array1<f32> {
        x.mapv(|v| v.max(min))
    }
}

/// Pure per-element reference implementation (the fallback path)
pub struct ScalarKernels;

impl ScalarKernels {
    fn unary(x: &Array1<f32>, f: impl Fn(f32) -> f32) -> Array1<f32> {
        let mut out = Vec::with_capacity(x.len());
        for &v in x.iter() {
            out.push(f(v));
        }
        Array1::from(out)
    }
}

impl SteKernels for ScalarKernels {
    fn round(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, f32::round)
    }

    fn ceil(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, f32::ceil)
    }

    fn floor(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, f32::floor)
    }

    fn round_to_zero(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, f32::trunc)
    }

    fn binary_sign(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, binary_sign_value)
    }

    fn ternary_sign(&self, x: &Array1<f32>) -> Array1<f32> {
        Self::unary(x, ternary_sign_value)
    }

    fn tensor_clamp(
        &self,
        x: &Array1<f32>,
        min: &Array1<f32>,
        max: &Array1<f32>,
    ) -> Array1<f32> {
        assert_bound_len(x.len(), min.len());
        assert_bound_len(x.len(), max.len());

        let mut out = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let lo = if min.len() == 1 { min[0] } else { min[i] };
            let hi = if max.len() == 1 { max[0] } else { max[i] };
            out.push(x[i].max(lo).min(hi));
        }
        Array1::from(out)
    }

    fn scalar_clamp(&self, x: &Array1<f32>, min: f32, max: f32) -> Array1<f32> {
        Self::unary(x, |v| v.max(min).min(max))
    }

    fn scalar_clamp_min(&self, x: &Array1<f32>, min: f32) -> Array1<f32> {
        Self::unary(x, |v| v.max(min))
    }
}

/// Chunk-parallel wrapper around a base backend
///
/// Large arrays are split across the rayon pool and each chunk is handed to
/// the wrapped backend; small arrays and mixed-length clamp bounds delegate
/// directly. Results are bit-identical to the wrapped backend.
pub struct ParallelKernels {
    inner: Box<dyn SteKernels>,
}

impl ParallelKernels {
    pub fn new(inner: Box<dyn SteKernels>) -> Self {
        Self { inner }
    }

    fn par_unary(&self, x: &Array1<f32>, apply: impl Fn(&Array1<f32>) -> Array1<f32> + Sync) -> Array1<f32> {
        let slice = x.as_slice().expect("1-D tensors are contiguous");
        let out: Vec<f32> = slice
            .par_chunks(PARALLEL_CHUNK)
            .flat_map_iter(|chunk| apply(&Array1::from(chunk.to_vec())).to_vec())
            .collect();
        Array1::from(out)
    }
}

macro_rules! par_forward {
    ($name:ident) => {
        fn $name(&self, x: &Array1<f32>) -> Array1<f32> {
            if x.len() < PARALLEL_LEN_THRESHOLD {
                self.inner.$name(x)
            } else {
                self.par_unary(x, |chunk| self.inner.$name(chunk))
            }
        }
    };
}

impl SteKernels for ParallelKernels {
    par_forward!(round);
    par_forward!(ceil);
    par_forward!(floor);
    par_forward!(round_to_zero);
    par_forward!(binary_sign);
    par_forward!(ternary_sign);

    fn tensor_clamp(
        &self,
        x: &Array1<f32>,
        min: &Array1<f32>,
        max: &Array1<f32>,
    ) -> Array1<f32> {
        if x.len() < PARALLEL_LEN_THRESHOLD || min.len() != x.len() || max.len() != x.len() {
            return self.inner.tensor_clamp(x, min, max);
        }

        let xs = x.as_slice().expect("1-D tensors are contiguous");
        let lo = min.as_slice().expect("1-D tensors are contiguous");
        let hi = max.as_slice().expect("1-D tensors are contiguous");
        let out: Vec<f32> = xs
            .par_chunks(PARALLEL_CHUNK)
            .zip(lo.par_chunks(PARALLEL_CHUNK))
            .zip(hi.par_chunks(PARALLEL_CHUNK))
            .flat_map_iter(|((xc, lc), hc)| {
                self.inner
                    .tensor_clamp(
                        &Array1::from(xc.to_vec()),
                        &Array1::from(lc.to_vec()),
                        &Array1::from(hc.to_vec()),
                    )
                    .to_vec()
            })
            .collect();
        Array1::from(out)
    }

    fn scalar_clamp(&self, x: &Array1<f32>, min: f32, max: f32) -> Array1<f32> {
        if x.len() < PARALLEL_LEN_THRESHOLD {
            self.inner.scalar_clamp(x, min, max)
        } else {
            self.par_unary(x, |chunk| self.inner.scalar_clamp(chunk, min, max))
        }
    }

    fn scalar_clamp_min(&self, x: &Array1<f32>, min: f32) -> Array1<f32> {
        if x.len() < PARALLEL_LEN_THRESHOLD {
            self.inner.scalar_clamp_min(x, min)
        } else {
            self.par_unary(x, |chunk| self.inner.scalar_clamp_min(chunk, min))
        }
    }
}

static ACTIVE: LazyLock<Box<dyn SteKernels>> = LazyLock::new(|| {
    let base: Box<dyn SteKernels> = if config::native_kernels() {
        Box::new(VectorizedKernels)
    } else {
        Box::new(ScalarKernels)
    };
    if config::parallel_kernels() {
        Box::new(ParallelKernels::new(base))
    } else {
        base
    }
});

/// The process-wide kernel backend.
///
/// Selected on first call from the configuration flags and fixed for the
/// process lifetime.
pub fn active_kernels() -> &'static dyn SteKernels {
    &**ACTIVE
}

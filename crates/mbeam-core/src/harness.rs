// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Cross-checks beam kernels against each other.
//!
//! Kernels are sorted by name and the first one is the reference. Every other
//! kernel must reproduce its shape and values: exactly for the forward pass,
//! within [`GRAD_ABS_TOLERANCE`] / [`GRAD_REL_TOLERANCE`] for gradients, whose
//! summation order differs between kernels. Any mismatch is an error; the
//! harness never picks a winner.

use ndarray::{ArrayD, Dimension};
use tracing::{debug, error};

use crate::beam::{beam_gather_grad_with, beam_gather_with, BeamGrad};
use crate::error::{invalid, BeamError, BeamResult};
use crate::kernel::BeamKernel;
use crate::params::BeamParams;
use crate::registry::global_kernel_registry;

/// Absolute gradient tolerance (numpy `assert_almost_equal(decimal=4)`).
pub const GRAD_ABS_TOLERANCE: f32 = 1.5e-4;
/// Relative gradient tolerance for large accumulated values.
pub const GRAD_REL_TOLERANCE: f32 = 1e-5;

pub struct ConsistencyHarness {
    kernels: Vec<Box<dyn BeamKernel>>,
}

impl ConsistencyHarness {
    /// Needs at least two kernels with distinct names.
    pub fn new(mut kernels: Vec<Box<dyn BeamKernel>>) -> BeamResult<Self> {
        if kernels.len() < 2 {
            return Err(invalid(
                "kernels",
                format!("need at least two kernels to compare, got {}", kernels.len()),
            ));
        }
        kernels.sort_by_key(|kernel| kernel.name());
        if let Some(pair) = kernels.windows(2).find(|pair| pair[0].name() == pair[1].name()) {
            return Err(BeamError::DuplicateKernel {
                name: pair[0].name().to_string(),
            });
        }
        Ok(Self { kernels })
    }

    /// Every kernel of the global registry.
    pub fn builtin() -> BeamResult<Self> {
        Self::new(global_kernel_registry().instantiate_all())
    }

    pub fn kernel_names(&self) -> Vec<&'static str> {
        self.kernels.iter().map(|kernel| kernel.name()).collect()
    }

    pub fn reference_name(&self) -> &'static str {
        self.kernels[0].name()
    }

    /// Runs every kernel forward and returns the reference beam.
    pub fn compare_gather(&self, source: &ArrayD<f32>, params: &BeamParams) -> BeamResult<ArrayD<f32>> {
        let reference = &self.kernels[0];
        let expected = beam_gather_with(reference.as_ref(), source, params)?;
        debug!(kernel = reference.name(), shape = ?expected.shape(), "forward reference");
        for candidate in &self.kernels[1..] {
            let got = beam_gather_with(candidate.as_ref(), source, params)?;
            debug!(kernel = candidate.name(), "forward candidate");
            check_array("beam_gather", reference.name(), candidate.name(), &expected, &got, exact_eq)?;
        }
        Ok(expected)
    }

    /// Runs every kernel backward and returns the reference gradients.
    pub fn compare_gather_grad(
        &self,
        upstream: &ArrayD<f32>,
        params: &BeamParams,
        source_shape: &[usize],
    ) -> BeamResult<BeamGrad> {
        let reference = &self.kernels[0];
        let expected = beam_gather_grad_with(reference.as_ref(), upstream, params, source_shape)?;
        debug!(kernel = reference.name(), "backward reference");
        for candidate in &self.kernels[1..] {
            let got = beam_gather_grad_with(candidate.as_ref(), upstream, params, source_shape)?;
            debug!(kernel = candidate.name(), "backward candidate");
            let (ref_name, cand_name) = (reference.name(), candidate.name());
            check_array("beam_gather_grad", ref_name, cand_name, &expected.source, &got.source, grad_close)?;
            check_scalar("pad_left", ref_name, cand_name, expected.pad_left, got.pad_left)?;
            check_scalar("pad_right", ref_name, cand_name, expected.pad_right, got.pad_right)?;
        }
        Ok(expected)
    }
}

fn exact_eq(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Gradient closeness: absolute for small values, relative for large sums.
pub fn grad_close(a: f32, b: f32) -> bool {
    if exact_eq(a, b) {
        return true;
    }
    let diff = (a - b).abs();
    diff < GRAD_ABS_TOLERANCE || diff <= GRAD_REL_TOLERANCE * a.abs().max(b.abs())
}

fn disagreement(op: &'static str, reference: &str, candidate: &str, detail: String) -> BeamError {
    error!(op, reference, candidate, %detail, "kernel disagreement");
    BeamError::ImplementationDisagreement {
        op,
        reference: reference.to_string(),
        candidate: candidate.to_string(),
        detail,
    }
}

fn check_array(
    op: &'static str,
    reference: &str,
    candidate: &str,
    expected: &ArrayD<f32>,
    got: &ArrayD<f32>,
    close: fn(f32, f32) -> bool,
) -> BeamResult<()> {
    if expected.shape() != got.shape() {
        return Err(disagreement(
            op,
            reference,
            candidate,
            format!("shape {:?} vs {:?}", expected.shape(), got.shape()),
        ));
    }
    let mismatch = expected
        .indexed_iter()
        .zip(got.iter())
        .find(|((_, &a), &b)| !close(a, b));
    match mismatch {
        Some(((index, a), b)) => Err(disagreement(
            op,
            reference,
            candidate,
            format!("value at {:?}: {a} vs {b}", index.slice()),
        )),
        None => Ok(()),
    }
}

fn check_scalar(
    op: &'static str,
    reference: &str,
    candidate: &str,
    expected: Option<f32>,
    got: Option<f32>,
) -> BeamResult<()> {
    match (expected, got) {
        (None, None) => Ok(()),
        (Some(a), Some(b)) if grad_close(a, b) => Ok(()),
        (a, b) => Err(disagreement(op, reference, candidate, format!("{a:?} vs {b:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelGrad, ReferenceKernel, VectorizedKernel};
    use crate::window::{EdgeMode, WindowPlan};
    use ndarray::{Array3, ArrayView3, IxDyn};

    /// Drops the last beam step's contribution to simulate a lost update.
    struct LossyKernel;

    impl BeamKernel for LossyKernel {
        fn name(&self) -> &'static str {
            "lossy"
        }

        fn gather(&self, source: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<Array3<f32>> {
            ReferenceKernel.gather(source, plan)
        }

        fn gather_grad(&self, upstream: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<KernelGrad> {
            let mut trimmed = upstream.to_owned();
            if let Some(mut last) = trimmed.outer_iter_mut().last() {
                last.fill(0.0);
            }
            ReferenceKernel.gather_grad(trimmed.view(), plan)
        }
    }

    #[test]
    fn needs_two_distinct_kernels() {
        assert!(ConsistencyHarness::new(vec![Box::new(ReferenceKernel)]).is_err());
        let dup = ConsistencyHarness::new(vec![Box::new(ReferenceKernel), Box::new(ReferenceKernel)]);
        assert!(matches!(dup, Err(BeamError::DuplicateKernel { .. })));
    }

    #[test]
    fn reference_is_lexicographically_first() {
        let harness =
            ConsistencyHarness::new(vec![Box::new(VectorizedKernel), Box::new(LossyKernel)]).unwrap();
        assert_eq!(harness.reference_name(), "lossy");
        assert_eq!(harness.kernel_names(), vec!["lossy", "vectorized"]);
    }

    #[test]
    fn lost_updates_are_reported() {
        let harness =
            ConsistencyHarness::new(vec![Box::new(ReferenceKernel), Box::new(LossyKernel)]).unwrap();
        let params = BeamParams::new(vec![0], vec![3], 3, EdgeMode::WrapAround);
        let upstream = ArrayD::<f32>::ones(IxDyn(&[3, 1]));
        let err = harness.compare_gather_grad(&upstream, &params, &[3, 1]);
        assert!(matches!(
            err,
            Err(BeamError::ImplementationDisagreement { op: "beam_gather_grad", .. })
        ));
        let source = ArrayD::<f32>::ones(IxDyn(&[3, 1]));
        assert!(harness.compare_gather(&source, &params).is_ok());
    }

    #[test]
    fn tolerance_is_absolute_then_relative() {
        assert!(grad_close(1.0, 1.0001));
        assert!(!grad_close(1.0, 1.001));
        assert!(grad_close(500.0, 500.004));
        assert!(grad_close(f32::NAN, f32::NAN));
    }
}

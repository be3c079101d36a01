// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Eager entry points of the MultiBatchBeam operator.
//!
//! `beam_gather` extracts, for every batch column `b`, the `beam_width` time
//! steps starting at `start_idxs[b]`; `beam_gather_grad` is its exact
//! adjoint. Both validate their arguments, move tensors into the canonical
//! `(time, batch, features)` layout and dispatch to a [`BeamKernel`].

use mbeam_config::kernel::default_kernel;
use ndarray::ArrayD;
use tracing::{debug_span, trace};

use crate::error::{mismatch, BeamResult};
use crate::kernel::BeamKernel;
use crate::observability::emit_beam_op;
use crate::params::BeamParams;
use crate::registry::global_kernel_registry;
use crate::window::EdgeMode;

/// Gradients of a beam call w.r.t. its differentiable inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct BeamGrad {
    /// Same shape as the source.
    pub source: ArrayD<f32>,
    /// Gradient of the left pad scalar; `None` in wrap mode.
    pub pad_left: Option<f32>,
    /// Gradient of the right pad scalar; `None` in wrap mode.
    pub pad_right: Option<f32>,
}

/// Gathers the beam with the configured default kernel (`MBEAM_KERNEL`).
pub fn beam_gather(source: &ArrayD<f32>, params: &BeamParams) -> BeamResult<ArrayD<f32>> {
    let kernel = global_kernel_registry().instantiate(default_kernel())?;
    beam_gather_with(kernel.as_ref(), source, params)
}

/// Backward pass of [`beam_gather`] with the configured default kernel.
pub fn beam_gather_grad(
    upstream: &ArrayD<f32>,
    params: &BeamParams,
    source_shape: &[usize],
) -> BeamResult<BeamGrad> {
    let kernel = global_kernel_registry().instantiate(default_kernel())?;
    beam_gather_grad_with(kernel.as_ref(), upstream, params, source_shape)
}

/// Gathers the beam with an explicit kernel.
///
/// The output keeps the source's axis order with the time extent replaced by
/// `beam_width`; with default axes that is `(beam_width, batch, *features)`.
pub fn beam_gather_with(
    kernel: &dyn BeamKernel,
    source: &ArrayD<f32>,
    params: &BeamParams,
) -> BeamResult<ArrayD<f32>> {
    let (plan, layout) = params.plan(source.shape())?;
    let span = debug_span!(
        "beam_gather",
        kernel = kernel.name(),
        mode = %params.mode,
        beam_width = plan.beam_width(),
        n_time = plan.n_time(),
        n_batch = plan.n_batch(),
    );
    let _guard = span.enter();

    let degenerate = plan.degenerate_columns();
    if degenerate > 0 {
        trace!(degenerate, "columns without valid steps emit zeros");
    }

    let canonical = layout.to_canonical(source.view(), plan.n_time())?;
    let beam = kernel.gather(canonical.view(), &plan)?;
    let out = layout.from_canonical(beam)?;
    emit_beam_op("beam_gather", kernel.name(), source.shape(), out.shape());
    Ok(out)
}

/// Backward pass with an explicit kernel.
///
/// `upstream` must have the beam's shape for a source of `source_shape`.
pub fn beam_gather_grad_with(
    kernel: &dyn BeamKernel,
    upstream: &ArrayD<f32>,
    params: &BeamParams,
    source_shape: &[usize],
) -> BeamResult<BeamGrad> {
    let (plan, layout) = params.plan(source_shape)?;
    let expected = layout.beam_shape(plan.beam_width());
    if upstream.shape() != expected.as_slice() {
        return Err(mismatch("upstream_grad", &expected, upstream.shape()));
    }
    let span = debug_span!(
        "beam_gather_grad",
        kernel = kernel.name(),
        mode = %params.mode,
        beam_width = plan.beam_width(),
        n_time = plan.n_time(),
        n_batch = plan.n_batch(),
    );
    let _guard = span.enter();

    let canonical = layout.to_canonical(upstream.view(), plan.beam_width())?;
    let grad = kernel.gather_grad(canonical.view(), &plan)?;
    let source = layout.from_canonical(grad.source)?;
    emit_beam_op("beam_gather_grad", kernel.name(), upstream.shape(), source.shape());

    let (pad_left, pad_right) = match params.mode {
        EdgeMode::Pad => (Some(grad.pad_left), Some(grad.pad_right)),
        EdgeMode::WrapAround => (None, None),
    };
    Ok(BeamGrad {
        source,
        pad_left,
        pad_right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeamError;
    use crate::kernel::ReferenceKernel;
    use ndarray::{Array, IxDyn};

    fn column(values: &[f32]) -> ArrayD<f32> {
        Array::from_shape_vec(IxDyn(&[values.len(), 1]), values.to_vec()).unwrap()
    }

    #[test]
    fn wrap_gather_follows_negative_start() {
        let source = column(&(0..10).map(|v| v as f32).collect::<Vec<_>>());
        let params = BeamParams::new(vec![-2], vec![10], 4, EdgeMode::WrapAround);
        let beam = beam_gather_with(&ReferenceKernel, &source, &params).unwrap();
        assert_eq!(beam.shape(), &[4, 1]);
        assert_eq!(beam.iter().copied().collect::<Vec<_>>(), vec![8.0, 9.0, 0.0, 1.0]);
    }

    #[test]
    fn wrap_grad_has_no_pad_gradients() {
        let params = BeamParams::new(vec![0], vec![3], 2, EdgeMode::WrapAround);
        let grad = beam_gather_grad_with(&ReferenceKernel, &column(&[1.0, 1.0]), &params, &[3, 1])
            .unwrap();
        assert_eq!(grad.pad_left, None);
        assert_eq!(grad.pad_right, None);
        assert_eq!(grad.source.shape(), &[3, 1]);
    }

    #[test]
    fn upstream_shape_is_checked() {
        let params = BeamParams::new(vec![0], vec![3], 2, EdgeMode::Pad);
        let err = beam_gather_grad_with(&ReferenceKernel, &column(&[1.0; 3]), &params, &[3, 1]);
        assert!(matches!(
            err,
            Err(BeamError::ShapeMismatch { label: "upstream_grad", .. })
        ));
    }

    #[test]
    fn batch_length_mismatch_is_reported() {
        let source = ArrayD::<f32>::zeros(IxDyn(&[4, 2, 3]));
        let params = BeamParams::new(vec![0, 1, 2], vec![4, 4], 2, EdgeMode::WrapAround);
        assert!(matches!(
            beam_gather_with(&ReferenceKernel, &source, &params),
            Err(BeamError::ShapeMismatch { label: "start_idxs", .. })
        ));
    }
}

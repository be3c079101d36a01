// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Interchangeable implementations of the beam gather and its adjoint.
//!
//! Every kernel works on canonical `(time, batch, features)` arrays and a
//! validated [`WindowPlan`]; axis handling and argument checks happen once in
//! [`crate::beam`]. Kernels must agree with each other, which is what
//! [`crate::harness::ConsistencyHarness`] verifies.

mod parallel;
mod reference;
mod vectorized;

pub use parallel::ParallelKernel;
pub use reference::ReferenceKernel;
pub use vectorized::VectorizedKernel;

use ndarray::{Array3, ArrayView3};

use crate::error::{mismatch, BeamResult};
use crate::window::WindowPlan;

/// Rejects a canonical view whose leading axes disagree with `plan`.
///
/// `steps` is `n_time` for sources and `beam_width` for upstream gradients.
pub(crate) fn check_view(
    label: &'static str,
    view: &ArrayView3<'_, f32>,
    plan: &WindowPlan,
    steps: usize,
) -> BeamResult<()> {
    let (got_steps, got_batch, n_feat) = view.dim();
    if (got_steps, got_batch) != (steps, plan.n_batch()) {
        return Err(mismatch(
            label,
            &[steps, plan.n_batch(), n_feat],
            &[got_steps, got_batch, n_feat],
        ));
    }
    Ok(())
}

/// Gradients produced by a kernel in canonical layout.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelGrad {
    /// `(n_time, batch, features)` gradient w.r.t. the source.
    pub source: Array3<f32>,
    /// Upstream mass of every cell that read the left pad value.
    pub pad_left: f32,
    /// Upstream mass of every cell that read the right pad value.
    pub pad_right: f32,
}

/// Forward/backward pair of the windowed beam operator.
pub trait BeamKernel: Send + Sync {
    /// Registry name; the harness orders kernels by it.
    fn name(&self) -> &'static str;

    /// `(time, batch, feat)` source to `(beam_width, batch, feat)` beam.
    fn gather(&self, source: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<Array3<f32>>;

    /// Adjoint of [`BeamKernel::gather`]: scatters `(beam_width, batch, feat)`
    /// upstream gradients back onto `(plan.n_time(), batch, feat)`, summing
    /// colliding contributions.
    fn gather_grad(&self, upstream: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<KernelGrad>;
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::rc::Rc;

use ndarray::ArrayD;

use crate::error::BeamResult;
use crate::tensor::Tensor;

/// Reverse-mode rule of one recorded op.
pub trait BackwardNode {
    fn name(&self) -> &'static str;
    /// Inputs in the order `backward` returns their gradients.
    fn parents(&self) -> Vec<Tensor>;
    /// Maps the output gradient to one optional gradient per parent.
    fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>>;
}

#[derive(Clone)]
pub struct GradFn(Rc<dyn BackwardNode>);

impl GradFn {
    pub fn new<N: BackwardNode + 'static>(node: N) -> Self {
        GradFn(Rc::new(node))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub fn parents(&self) -> Vec<Tensor> {
        self.0.parents()
    }

    pub fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
        self.0.backward(grad_out)
    }
}

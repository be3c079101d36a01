// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Minimal eager tensor with a reverse-mode tape, enough to drive the beam
//! operator from a differentiable computation.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{arr0, ArrayD, IxDyn};

use crate::autograd::GradFn;
use crate::error::{mismatch, BeamResult};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone)]
pub struct Tensor(Rc<RefCell<Inner>>);

struct Inner {
    id: usize,
    data: ArrayD<f32>,
    requires_grad: bool,
    grad: Option<ArrayD<f32>>,
    grad_fn: Option<GradFn>,
}

impl Tensor {
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Tensor(Rc::new(RefCell::new(Inner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            data,
            requires_grad: false,
            grad: None,
            grad_fn: None,
        })))
    }

    pub fn scalar(value: f32) -> Self {
        Self::from_array(arr0(value).into_dyn())
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    pub(crate) fn from_op(data: ArrayD<f32>, grad_fn: GradFn) -> Self {
        let out = Self::from_array(data);
        {
            let mut inner = out.0.borrow_mut();
            inner.requires_grad = true;
            inner.grad_fn = Some(grad_fn);
        }
        out
    }

    pub fn requires_grad(self, flag: bool) -> Self {
        self.0.borrow_mut().requires_grad = flag;
        self
    }

    pub fn id(&self) -> usize {
        self.0.borrow().id
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.borrow().data.shape().to_vec()
    }

    pub fn data(&self) -> ArrayD<f32> {
        self.0.borrow().data.clone()
    }

    /// True for leaves marked with [`Tensor::requires_grad`] and for op outputs
    /// that depend on such a leaf.
    pub fn tracks_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.0.borrow().grad.clone()
    }

    pub fn zero_grad(&self) {
        self.0.borrow_mut().grad = None;
    }

    pub fn grad_fn_name(&self) -> Option<&'static str> {
        self.0.borrow().grad_fn.as_ref().map(GradFn::name)
    }

    fn grad_fn(&self) -> Option<GradFn> {
        self.0.borrow().grad_fn.clone()
    }

    fn accumulate_grad(&self, g: &ArrayD<f32>) {
        let mut inner = self.0.borrow_mut();
        inner.grad = Some(match inner.grad.take() {
            Some(old) => old + g,
            None => g.clone(),
        });
    }

    /// Backpropagates a seed of ones.
    pub fn backward(&self) -> BeamResult<()> {
        let seed = ArrayD::from_elem(IxDyn(&self.shape()), 1.0f32);
        self.backward_with_grad(&seed)
    }

    pub fn backward_with_grad(&self, seed: &ArrayD<f32>) -> BeamResult<()> {
        let shape = self.shape();
        if seed.shape() != shape.as_slice() {
            return Err(mismatch("seed", &shape, seed.shape()));
        }

        // post-order over op outputs; reversed it is a valid topological order
        fn visit(t: &Tensor, order: &mut Vec<(Tensor, GradFn)>, seen: &mut HashSet<usize>) {
            if !seen.insert(t.id()) {
                return;
            }
            if let Some(gf) = t.grad_fn() {
                for parent in gf.parents() {
                    visit(&parent, order, seen);
                }
                order.push((t.clone(), gf));
            }
        }
        let mut order = Vec::new();
        visit(self, &mut order, &mut HashSet::new());

        if order.is_empty() {
            if self.tracks_grad() {
                self.accumulate_grad(seed);
            }
            return Ok(());
        }

        let mut pending: HashMap<usize, ArrayD<f32>> = HashMap::new();
        pending.insert(self.id(), seed.clone());
        for (tensor, gf) in order.into_iter().rev() {
            let Some(grad_out) = pending.remove(&tensor.id()) else {
                continue;
            };
            tensor.accumulate_grad(&grad_out);
            let grads = gf.backward(&grad_out)?;
            for (parent, grad) in gf.parents().into_iter().zip(grads) {
                let Some(grad) = grad else { continue };
                if parent.grad_fn().is_some() {
                    match pending.remove(&parent.id()) {
                        Some(prev) => pending.insert(parent.id(), prev + &grad),
                        None => pending.insert(parent.id(), grad),
                    };
                } else if parent.tracks_grad() {
                    parent.accumulate_grad(&grad);
                }
            }
        }
        Ok(())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Differentiable ops on [`Tensor`]: the beam itself plus the few reductions
//! an attention readout needs around it.

use ndarray::{arr0, ArrayD, Axis, IxDyn};

use crate::autograd::{BackwardNode, GradFn};
use crate::beam::{beam_gather, beam_gather_grad};
use crate::error::{invalid, mismatch, BeamResult};
use crate::params::BeamParams;
use crate::tensor::Tensor;
use crate::window::EdgeMode;

// ---------- helpers ----------
fn broadcast_shape(a: &[usize], b: &[usize]) -> BeamResult<Vec<usize>> {
    let rank = a.len().max(b.len());
    let dim = |shape: &[usize], ax: usize| {
        let lead = rank - shape.len();
        if ax < lead { 1 } else { shape[ax - lead] }
    };
    (0..rank)
        .map(|ax| match (dim(a, ax), dim(b, ax)) {
            (x, y) if x == y => Ok(x),
            (1, y) => Ok(y),
            (x, 1) => Ok(x),
            _ => Err(mismatch("broadcast", a, b)),
        })
        .collect()
}

fn broadcast_to(x: &ArrayD<f32>, shape: &[usize]) -> BeamResult<ArrayD<f32>> {
    x.broadcast(IxDyn(shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| mismatch("broadcast", shape, x.shape()))
}

/// Sums `g` down to `target`, undoing numpy-style broadcasting.
fn unbroadcast(mut g: ArrayD<f32>, target: &[usize]) -> BeamResult<ArrayD<f32>> {
    while g.ndim() > target.len() {
        g = g.sum_axis(Axis(0));
    }
    for (ax, &want) in target.iter().enumerate() {
        if want == 1 && g.shape()[ax] != 1 {
            g = g.sum_axis(Axis(ax)).insert_axis(Axis(ax));
        }
    }
    if g.shape() != target {
        return Err(mismatch("unbroadcast", target, g.shape()));
    }
    Ok(g)
}

fn single_value(t: &Tensor, label: &'static str) -> BeamResult<f32> {
    let data = t.data();
    match data.len() {
        1 => Ok(data.iter().copied().sum()),
        _ => Err(mismatch(label, &[], data.shape())),
    }
}

// ---------- reductions / elementwise ----------
pub fn sum(x: &Tensor) -> BeamResult<Tensor> {
    let total = x.data().sum();
    let out = arr0(total).into_dyn();
    if !x.tracks_grad() {
        return Ok(Tensor::from_array(out));
    }
    struct Node {
        x: Tensor,
    }
    impl BackwardNode for Node {
        fn name(&self) -> &'static str {
            "sum"
        }
        fn parents(&self) -> Vec<Tensor> {
            vec![self.x.clone()]
        }
        fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
            let go = grad_out.sum();
            Ok(vec![Some(ArrayD::from_elem(IxDyn(&self.x.shape()), go))])
        }
    }
    Ok(Tensor::from_op(out, GradFn::new(Node { x: x.clone() })))
}

pub fn sum_axis(x: &Tensor, axis: usize) -> BeamResult<Tensor> {
    let data = x.data();
    if axis >= data.ndim() {
        return Err(invalid(
            "axis",
            format!("axis {axis} out of range for rank {}", data.ndim()),
        ));
    }
    let out = data.sum_axis(Axis(axis));
    if !x.tracks_grad() {
        return Ok(Tensor::from_array(out));
    }
    struct Node {
        x: Tensor,
        axis: usize,
    }
    impl BackwardNode for Node {
        fn name(&self) -> &'static str {
            "sum_axis"
        }
        fn parents(&self) -> Vec<Tensor> {
            vec![self.x.clone()]
        }
        fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
            let expanded = grad_out.clone().insert_axis(Axis(self.axis));
            Ok(vec![Some(broadcast_to(&expanded, &self.x.shape())?)])
        }
    }
    Ok(Tensor::from_op(out, GradFn::new(Node { x: x.clone(), axis })))
}

/// Elementwise product with broadcasting of both operands.
pub fn mul(a: &Tensor, b: &Tensor) -> BeamResult<Tensor> {
    let (av, bv) = (a.data(), b.data());
    let shape = broadcast_shape(av.shape(), bv.shape())?;
    let out = broadcast_to(&av, &shape)? * &broadcast_to(&bv, &shape)?;
    if !(a.tracks_grad() || b.tracks_grad()) {
        return Ok(Tensor::from_array(out));
    }
    struct Node {
        a: Tensor,
        b: Tensor,
        shape: Vec<usize>,
    }
    impl BackwardNode for Node {
        fn name(&self) -> &'static str {
            "mul"
        }
        fn parents(&self) -> Vec<Tensor> {
            vec![self.a.clone(), self.b.clone()]
        }
        fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
            let av = broadcast_to(&self.a.data(), &self.shape)?;
            let bv = broadcast_to(&self.b.data(), &self.shape)?;
            let ga = unbroadcast(grad_out * &bv, &self.a.shape())?;
            let gb = unbroadcast(grad_out * &av, &self.b.shape())?;
            Ok(vec![Some(ga), Some(gb)])
        }
    }
    let node = Node {
        a: a.clone(),
        b: b.clone(),
        shape,
    };
    Ok(Tensor::from_op(out, GradFn::new(node)))
}

// ---------- multi batch beam ----------
/// Differentiable beam over `source`; pad values are taken from `params`.
pub fn multi_batch_beam(source: &Tensor, params: &BeamParams) -> BeamResult<Tensor> {
    let out = beam_gather(&source.data(), params)?;
    if !source.tracks_grad() {
        return Ok(Tensor::from_array(out));
    }
    struct Node {
        source: Tensor,
        params: BeamParams,
    }
    impl BackwardNode for Node {
        fn name(&self) -> &'static str {
            "multi_batch_beam"
        }
        fn parents(&self) -> Vec<Tensor> {
            vec![self.source.clone()]
        }
        fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
            let grad = beam_gather_grad(grad_out, &self.params, &self.source.shape())?;
            Ok(vec![Some(grad.source)])
        }
    }
    let node = Node {
        source: source.clone(),
        params: params.clone(),
    };
    Ok(Tensor::from_op(out, GradFn::new(node)))
}

/// Pad-mode beam whose pad scalars are themselves differentiable tensors.
///
/// `pad_left` / `pad_right` must hold exactly one element; they override the
/// pad values stored in `params`.
pub fn multi_batch_beam_padded(
    source: &Tensor,
    pad_left: &Tensor,
    pad_right: &Tensor,
    params: &BeamParams,
) -> BeamResult<Tensor> {
    if params.mode != EdgeMode::Pad {
        return Err(invalid(
            "mode",
            format!("padded beam needs mode 'pad', got '{}'", params.mode),
        ));
    }
    let params = params.clone().with_pads(
        single_value(pad_left, "pad_left")?,
        single_value(pad_right, "pad_right")?,
    );
    let out = beam_gather(&source.data(), &params)?;
    if !(source.tracks_grad() || pad_left.tracks_grad() || pad_right.tracks_grad()) {
        return Ok(Tensor::from_array(out));
    }
    struct Node {
        source: Tensor,
        pad_left: Tensor,
        pad_right: Tensor,
        params: BeamParams,
    }
    impl BackwardNode for Node {
        fn name(&self) -> &'static str {
            "multi_batch_beam_padded"
        }
        fn parents(&self) -> Vec<Tensor> {
            vec![
                self.source.clone(),
                self.pad_left.clone(),
                self.pad_right.clone(),
            ]
        }
        fn backward(&self, grad_out: &ArrayD<f32>) -> BeamResult<Vec<Option<ArrayD<f32>>>> {
            let grad = beam_gather_grad(grad_out, &self.params, &self.source.shape())?;
            let scalar_grad = |value: Option<f32>, like: &Tensor| {
                value.map(|v| ArrayD::from_elem(IxDyn(&like.shape()), v))
            };
            Ok(vec![
                Some(grad.source),
                scalar_grad(grad.pad_left, &self.pad_left),
                scalar_grad(grad.pad_right, &self.pad_right),
            ])
        }
    }
    let node = Node {
        source: source.clone(),
        pad_left: pad_left.clone(),
        pad_right: pad_right.clone(),
        params,
    };
    Ok(Tensor::from_op(out, GradFn::new(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn broadcast_shapes_follow_numpy_rules() {
        assert_eq!(broadcast_shape(&[4, 3, 1], &[3, 5]).unwrap(), vec![4, 3, 5]);
        assert!(broadcast_shape(&[2, 3], &[4, 3]).is_err());
    }

    #[test]
    fn mul_gradients_unbroadcast() {
        let a = Tensor::from_array(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn()).requires_grad(true);
        let b = Tensor::from_array(arr2(&[[10.0f32, 20.0]]).into_dyn()).requires_grad(true);
        let loss = sum(&mul(&a, &b).unwrap()).unwrap();
        loss.backward().unwrap();
        assert_eq!(a.grad().unwrap(), arr2(&[[10.0f32, 20.0], [10.0, 20.0]]).into_dyn());
        assert_eq!(b.grad().unwrap(), arr2(&[[4.0f32, 6.0]]).into_dyn());
    }

    #[test]
    fn sum_axis_broadcasts_gradient_back() {
        let x = Tensor::from_array(arr2(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn())
            .requires_grad(true);
        let y = sum_axis(&x, 0).unwrap();
        assert_eq!(y.shape(), vec![3]);
        y.backward().unwrap();
        assert_eq!(x.grad().unwrap(), ArrayD::from_elem(IxDyn(&[2, 3]), 1.0f32));
        assert!(sum_axis(&x, 2).is_err());
    }

    #[test]
    fn untracked_inputs_record_nothing() {
        let x = Tensor::from_array(arr2(&[[1.0f32]]).into_dyn());
        let y = sum(&x).unwrap();
        assert!(y.grad_fn_name().is_none());
        assert!(!y.tracks_grad());
    }
}

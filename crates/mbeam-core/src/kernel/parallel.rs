// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Column-parallel kernel.
//!
//! A beam cell of column `b` only ever touches source column `b`, so the
//! gradient is partitioned by batch column and every rayon task owns its
//! destination slice outright. Pad gradients are reduced per column and
//! summed afterwards in column order.

use mbeam_config::determinism;
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};
use rayon::prelude::*;

use super::{check_view, BeamKernel, KernelGrad};
use crate::error::BeamResult;
use crate::window::{SourceIndex, WindowPlan};

#[derive(Clone, Copy, Debug, Default)]
pub struct ParallelKernel {
    /// Run on the calling thread even when determinism does not require it.
    pub sequential: bool,
}

impl ParallelKernel {
    pub fn sequential() -> Self {
        Self { sequential: true }
    }

    fn run_sequential(&self) -> bool {
        self.sequential || determinism::lock_reduction_order()
    }
}

fn gather_column(
    plan: &WindowPlan,
    b: usize,
    source: ArrayView2<'_, f32>,
    mut out: ArrayViewMut2<'_, f32>,
) {
    for (i, mut cell) in out.axis_iter_mut(Axis(0)).enumerate() {
        match plan.resolve(i, b) {
            SourceIndex::Time(t) => cell.assign(&source.row(t)),
            other => cell.fill(plan.fill_value(other)),
        }
    }
}

fn scatter_column(
    plan: &WindowPlan,
    b: usize,
    upstream: ArrayView2<'_, f32>,
    mut grad: ArrayViewMut2<'_, f32>,
) -> (f64, f64) {
    let mut pad_left = 0.0f64;
    let mut pad_right = 0.0f64;
    for (i, cell) in upstream.axis_iter(Axis(0)).enumerate() {
        match plan.resolve(i, b) {
            SourceIndex::Time(t) => {
                let mut row = grad.row_mut(t);
                row += &cell;
            }
            SourceIndex::PadLeft => pad_left += cell.iter().map(|&v| f64::from(v)).sum::<f64>(),
            SourceIndex::PadRight => pad_right += cell.iter().map(|&v| f64::from(v)).sum::<f64>(),
            SourceIndex::Zero => {}
        }
    }
    (pad_left, pad_right)
}

impl BeamKernel for ParallelKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn gather(&self, source: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<Array3<f32>> {
        check_view("source", &source, plan, plan.n_time())?;
        let (_, n_batch, n_feat) = source.dim();
        let mut out = Array3::<f32>::zeros((plan.beam_width(), n_batch, n_feat));
        if self.run_sequential() {
            out.axis_iter_mut(Axis(1))
                .zip(source.axis_iter(Axis(1)))
                .enumerate()
                .for_each(|(b, (col, src))| gather_column(plan, b, src, col));
        } else {
            out.axis_iter_mut(Axis(1))
                .into_par_iter()
                .zip(source.axis_iter(Axis(1)).into_par_iter())
                .enumerate()
                .for_each(|(b, (col, src))| gather_column(plan, b, src, col));
        }
        Ok(out)
    }

    fn gather_grad(&self, upstream: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<KernelGrad> {
        check_view("upstream_grad", &upstream, plan, plan.beam_width())?;
        let (_, n_batch, n_feat) = upstream.dim();
        let mut source = Array3::<f32>::zeros((plan.n_time(), n_batch, n_feat));
        let partials: Vec<(f64, f64)> = if self.run_sequential() {
            source
                .axis_iter_mut(Axis(1))
                .zip(upstream.axis_iter(Axis(1)))
                .enumerate()
                .map(|(b, (grad, up))| scatter_column(plan, b, up, grad))
                .collect()
        } else {
            source
                .axis_iter_mut(Axis(1))
                .into_par_iter()
                .zip(upstream.axis_iter(Axis(1)).into_par_iter())
                .enumerate()
                .map(|(b, (grad, up))| scatter_column(plan, b, up, grad))
                .collect()
        };
        let (pad_left, pad_right) = partials
            .iter()
            .fold((0.0f64, 0.0f64), |(l, r), &(pl, pr)| (l + pl, r + pr));
        Ok(KernelGrad {
            source,
            pad_left: pad_left as f32,
            pad_right: pad_right as f32,
        })
    }
}

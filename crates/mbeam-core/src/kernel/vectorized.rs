// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Batched fancy-indexing kernel.
//!
//! The source is flattened to a `(time * batch, feat)` row table with three
//! extra rows appended (left pad, right pad, zero). The index grid is turned
//! into row numbers of that table, so the forward pass is a single
//! `select` and the backward pass a single grouped scatter-add.

use ndarray::{concatenate, s, Array2, Array3, ArrayView3, Axis, Zip};

use super::{check_view, BeamKernel, KernelGrad};
use crate::error::BeamResult;
use crate::indexing::index_add;
use crate::window::{SourceIndex, WindowPlan};

const PAD_LEFT_ROW: usize = 0;
const PAD_RIGHT_ROW: usize = 1;
const ZERO_ROW: usize = 2;
const EXTRA_ROWS: usize = 3;

#[derive(Clone, Copy, Debug, Default)]
pub struct VectorizedKernel;

/// Row of the extended table read by every beam cell, in `(beam, batch)` order.
fn table_rows(plan: &WindowPlan) -> Vec<usize> {
    let n_batch = plan.n_batch();
    let body = plan.n_time() * n_batch;
    let grid = plan.index_grid();
    Zip::indexed(&grid)
        .map_collect(|(_, b), &code| match SourceIndex::from_code(code) {
            SourceIndex::Time(t) => t * n_batch + b,
            SourceIndex::PadLeft => body + PAD_LEFT_ROW,
            SourceIndex::PadRight => body + PAD_RIGHT_ROW,
            SourceIndex::Zero => body + ZERO_ROW,
        })
        .iter()
        .copied()
        .collect()
}

fn flatten(array: ArrayView3<'_, f32>) -> BeamResult<Array2<f32>> {
    let (steps, n_batch, n_feat) = array.dim();
    Ok(Array2::from_shape_vec(
        (steps * n_batch, n_feat),
        array.iter().copied().collect(),
    )?)
}

impl BeamKernel for VectorizedKernel {
    fn name(&self) -> &'static str {
        "vectorized"
    }

    fn gather(&self, source: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<Array3<f32>> {
        check_view("source", &source, plan, plan.n_time())?;
        let (_, n_batch, n_feat) = source.dim();
        let body = flatten(source)?;
        let fills = [plan.pad_left(), plan.pad_right(), 0.0];
        let tail = Array2::from_shape_fn((EXTRA_ROWS, n_feat), |(r, _)| fills[r]);
        let table = concatenate(Axis(0), &[body.view(), tail.view()])?;

        let picked = table.select(Axis(0), &table_rows(plan));
        Ok(picked
            .as_standard_layout()
            .into_owned()
            .into_shape((plan.beam_width(), n_batch, n_feat))?)
    }

    fn gather_grad(&self, upstream: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<KernelGrad> {
        check_view("upstream_grad", &upstream, plan, plan.beam_width())?;
        let (_, n_batch, n_feat) = upstream.dim();
        let body = plan.n_time() * n_batch;
        let mut table = Array2::<f32>::zeros((body + EXTRA_ROWS, n_feat));
        index_add(&mut table, &table_rows(plan), flatten(upstream)?.view())?;

        let pad_left = table.row(body + PAD_LEFT_ROW).sum();
        let pad_right = table.row(body + PAD_RIGHT_ROW).sum();
        let source = table
            .slice(s![..body, ..])
            .to_owned()
            .into_shape((plan.n_time(), n_batch, n_feat))?;
        Ok(KernelGrad {
            source,
            pad_left,
            pad_right,
        })
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{Array3, ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, mismatch, BeamResult};
use crate::window::{EdgeMode, WindowPlan};

fn default_time_axis() -> usize {
    0
}

fn default_batch_axis() -> usize {
    1
}

/// Everything a beam call needs besides the tensor itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamParams {
    /// Beam start offset along the time axis, one per batch column.
    pub start_idxs: Vec<i64>,
    /// Leading valid time steps per batch column (the wrap modulus).
    pub valid_lens: Vec<i64>,
    pub beam_width: i64,
    #[serde(default)]
    pub mode: EdgeMode,
    #[serde(default)]
    pub pad_left: f32,
    #[serde(default)]
    pub pad_right: f32,
    #[serde(default = "default_time_axis")]
    pub time_axis: usize,
    #[serde(default = "default_batch_axis")]
    pub batch_axis: usize,
}

impl BeamParams {
    pub fn new(
        start_idxs: impl Into<Vec<i64>>,
        valid_lens: impl Into<Vec<i64>>,
        beam_width: i64,
        mode: EdgeMode,
    ) -> Self {
        Self {
            start_idxs: start_idxs.into(),
            valid_lens: valid_lens.into(),
            beam_width,
            mode,
            pad_left: 0.0,
            pad_right: 0.0,
            time_axis: default_time_axis(),
            batch_axis: default_batch_axis(),
        }
    }

    pub fn with_pads(mut self, pad_left: f32, pad_right: f32) -> Self {
        self.pad_left = pad_left;
        self.pad_right = pad_right;
        self
    }

    pub fn with_axes(mut self, time_axis: usize, batch_axis: usize) -> Self {
        self.time_axis = time_axis;
        self.batch_axis = batch_axis;
        self
    }

    /// Validates the parameters against `source_shape` and returns the kernel
    /// plan together with the axis layout used to canonicalise tensors.
    pub fn plan(&self, source_shape: &[usize]) -> BeamResult<(WindowPlan, AxisLayout)> {
        let layout = AxisLayout::new(source_shape, self.time_axis, self.batch_axis)?;
        let plan = WindowPlan::new(
            layout.n_time(),
            layout.n_batch(),
            &self.start_idxs,
            &self.valid_lens,
            self.beam_width,
            self.mode,
            self.pad_left,
            self.pad_right,
        )?;
        Ok((plan, layout))
    }
}

/// Moves the time and batch axes to the front and flattens the remaining
/// feature axes, so kernels only ever see `(time, batch, features)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisLayout {
    shape: Vec<usize>,
    time_axis: usize,
    batch_axis: usize,
    perm: Vec<usize>,
}

impl AxisLayout {
    pub fn new(shape: &[usize], time_axis: usize, batch_axis: usize) -> BeamResult<Self> {
        let ndim = shape.len();
        if ndim < 2 {
            return Err(invalid(
                "source",
                format!("need at least a time and a batch axis, got rank {ndim}"),
            ));
        }
        if time_axis >= ndim || batch_axis >= ndim {
            return Err(invalid(
                "axes",
                format!("time_axis={time_axis}, batch_axis={batch_axis} out of range for rank {ndim}"),
            ));
        }
        if time_axis == batch_axis {
            return Err(invalid("axes", format!("time and batch share axis {time_axis}")));
        }
        let mut perm = vec![time_axis, batch_axis];
        perm.extend((0..ndim).filter(|&ax| ax != time_axis && ax != batch_axis));
        Ok(Self {
            shape: shape.to_vec(),
            time_axis,
            batch_axis,
            perm,
        })
    }

    pub fn source_shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn n_time(&self) -> usize {
        self.shape[self.time_axis]
    }

    pub fn n_batch(&self) -> usize {
        self.shape[self.batch_axis]
    }

    pub fn n_features(&self) -> usize {
        self.perm[2..].iter().map(|&ax| self.shape[ax]).product()
    }

    /// Shape of a beam over this source: the time extent becomes `beam_width`.
    pub fn beam_shape(&self, beam_width: usize) -> Vec<usize> {
        let mut shape = self.shape.clone();
        shape[self.time_axis] = beam_width;
        shape
    }

    /// Copies `array` (source layout, time extent `steps`) into `(steps, batch, features)`.
    pub fn to_canonical(&self, array: ArrayViewD<'_, f32>, steps: usize) -> BeamResult<Array3<f32>> {
        let expected = {
            let mut shape = self.shape.clone();
            shape[self.time_axis] = steps;
            shape
        };
        if array.shape() != expected.as_slice() {
            return Err(mismatch("tensor", &expected, array.shape()));
        }
        let permuted = array.permuted_axes(IxDyn(&self.perm));
        let data: Vec<f32> = permuted.iter().copied().collect();
        Ok(Array3::from_shape_vec(
            (steps, self.n_batch(), self.n_features()),
            data,
        )?)
    }

    /// Inverse of [`AxisLayout::to_canonical`]; returns a standard-layout array.
    pub fn from_canonical(&self, canonical: Array3<f32>) -> BeamResult<ArrayD<f32>> {
        let canonical = if canonical.is_standard_layout() {
            canonical
        } else {
            canonical.as_standard_layout().into_owned()
        };
        let steps = canonical.len_of(ndarray::Axis(0));
        let mut permuted_shape = Vec::with_capacity(self.shape.len());
        permuted_shape.push(steps);
        permuted_shape.extend(self.perm[1..].iter().map(|&ax| self.shape[ax]));
        let expanded = canonical.into_shape(IxDyn(&permuted_shape))?;

        let mut inverse = vec![0usize; self.perm.len()];
        for (k, &ax) in self.perm.iter().enumerate() {
            inverse[ax] = k;
        }
        Ok(expanded
            .permuted_axes(IxDyn(&inverse))
            .as_standard_layout()
            .into_owned())
    }
}

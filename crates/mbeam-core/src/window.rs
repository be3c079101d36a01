// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Index arithmetic for the windowed beam: maps every `(beam position, batch)`
//! cell onto a source time step or onto one of the pad sentinels.

use core::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, mismatch, BeamError, BeamResult};

/// Grid code for a cell that reads the left pad value.
pub const PAD_LEFT_CODE: i64 = -1;
/// Grid code for a cell that reads the right pad value.
pub const PAD_RIGHT_CODE: i64 = -2;
/// Grid code for a cell of a column without valid data in wrap mode.
pub const ZERO_CODE: i64 = -3;

/// Edge policy applied when a beam position leaves `[0, valid_len)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Treat the valid prefix of each column as circular.
    #[default]
    WrapAround,
    /// Substitute the left/right pad scalar outside the valid prefix.
    Pad,
}

impl EdgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeMode::WrapAround => "wrap_around",
            EdgeMode::Pad => "pad",
        }
    }
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeMode {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wrap_around" => Ok(EdgeMode::WrapAround),
            "pad" => Ok(EdgeMode::Pad),
            other => Err(invalid(
                "mode",
                format!("unknown edge mode '{other}', expected 'wrap_around' or 'pad'"),
            )),
        }
    }
}

/// Where a single beam cell reads its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceIndex {
    /// A real time step of the same batch column.
    Time(usize),
    PadLeft,
    PadRight,
    /// Wrap mode over an empty valid region; the cell is zero and carries no gradient.
    Zero,
}

impl SourceIndex {
    /// Integer encoding used by the index grid (`>= 0` is a time step).
    pub fn code(self) -> i64 {
        match self {
            SourceIndex::Time(t) => t as i64,
            SourceIndex::PadLeft => PAD_LEFT_CODE,
            SourceIndex::PadRight => PAD_RIGHT_CODE,
            SourceIndex::Zero => ZERO_CODE,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            PAD_LEFT_CODE => SourceIndex::PadLeft,
            PAD_RIGHT_CODE => SourceIndex::PadRight,
            c if c >= 0 => SourceIndex::Time(c as usize),
            _ => SourceIndex::Zero,
        }
    }
}

/// Resolves beam position `offset` of a column starting at `start`.
///
/// Wrap mode uses Euclidean remainder so negative starts wrap from the end of
/// the valid region. Positions past `i64::MAX` saturate;
/// [`WindowPlan::new`] rejects plans that would reach them.
pub(crate) fn resolve(start: i64, offset: usize, valid_len: i64, mode: EdgeMode) -> SourceIndex {
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let raw = start.saturating_add(offset);
    match mode {
        EdgeMode::WrapAround => {
            if valid_len <= 0 {
                SourceIndex::Zero
            } else {
                SourceIndex::Time(raw.rem_euclid(valid_len) as usize)
            }
        }
        EdgeMode::Pad => {
            if raw < 0 {
                SourceIndex::PadLeft
            } else if raw >= valid_len {
                SourceIndex::PadRight
            } else {
                SourceIndex::Time(raw as usize)
            }
        }
    }
}

/// Validated per-call window description shared by all kernels.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowPlan {
    n_time: usize,
    beam_width: usize,
    starts: Vec<i64>,
    valid_lens: Vec<i64>,
    mode: EdgeMode,
    pad_left: f32,
    pad_right: f32,
}

impl WindowPlan {
    /// Validates the window parameters against a source with `n_time` steps
    /// and `n_batch` columns.
    pub fn new(
        n_time: usize,
        n_batch: usize,
        starts: &[i64],
        valid_lens: &[i64],
        beam_width: i64,
        mode: EdgeMode,
        pad_left: f32,
        pad_right: f32,
    ) -> BeamResult<Self> {
        if beam_width < 0 {
            return Err(invalid(
                "beam_width",
                format!("beam width must be non-negative, got {beam_width}"),
            ));
        }
        if starts.len() != n_batch {
            return Err(mismatch("start_idxs", &[n_batch], &[starts.len()]));
        }
        if valid_lens.len() != n_batch {
            return Err(mismatch("valid_lens", &[n_batch], &[valid_lens.len()]));
        }
        for (b, &len) in valid_lens.iter().enumerate() {
            if len > n_time as i64 {
                return Err(invalid(
                    "valid_lens",
                    format!("column {b} claims {len} valid steps but the source has {n_time}"),
                ));
            }
        }
        for (b, &start) in starts.iter().enumerate() {
            if start.checked_add(beam_width).is_none() {
                return Err(invalid(
                    "start_idxs",
                    format!("column {b} start {start} overflows with beam width {beam_width}"),
                ));
            }
        }
        Ok(Self {
            n_time,
            beam_width: beam_width as usize,
            starts: starts.to_vec(),
            valid_lens: valid_lens.to_vec(),
            mode,
            pad_left,
            pad_right,
        })
    }

    pub fn n_time(&self) -> usize {
        self.n_time
    }

    pub fn n_batch(&self) -> usize {
        self.starts.len()
    }

    pub fn beam_width(&self) -> usize {
        self.beam_width
    }

    pub fn mode(&self) -> EdgeMode {
        self.mode
    }

    pub fn pad_left(&self) -> f32 {
        self.pad_left
    }

    pub fn pad_right(&self) -> f32 {
        self.pad_right
    }

    /// Source index of beam cell `(i, b)`.
    #[inline]
    pub fn resolve(&self, i: usize, b: usize) -> SourceIndex {
        resolve(self.starts[b], i, self.valid_lens[b], self.mode)
    }

    /// Scalar written for cells that do not read from the source.
    #[inline]
    pub fn fill_value(&self, index: SourceIndex) -> f32 {
        match index {
            SourceIndex::PadLeft => self.pad_left,
            SourceIndex::PadRight => self.pad_right,
            SourceIndex::Time(_) | SourceIndex::Zero => 0.0,
        }
    }

    /// Number of columns that fall back to zeros in wrap mode.
    pub fn degenerate_columns(&self) -> usize {
        match self.mode {
            EdgeMode::WrapAround => self.valid_lens.iter().filter(|&&len| len <= 0).count(),
            EdgeMode::Pad => 0,
        }
    }

    /// Whole `(beam_width, batch)` index grid built with array arithmetic.
    ///
    /// Entries `>= 0` are time steps; negative entries are the `*_CODE` sentinels.
    pub fn index_grid(&self) -> Array2<i64> {
        let offsets = Array1::from_iter(0..self.beam_width as i64).insert_axis(Axis(1));
        let starts = ArrayView1::from(&self.starts[..]).insert_axis(Axis(0));
        let lens = ArrayView1::from(&self.valid_lens[..]).insert_axis(Axis(0));
        let mut grid = &offsets + &starts;
        match self.mode {
            EdgeMode::WrapAround => {
                Zip::from(&mut grid).and_broadcast(&lens).for_each(|cell, &len| {
                    *cell = if len <= 0 { ZERO_CODE } else { cell.rem_euclid(len) };
                });
            }
            EdgeMode::Pad => {
                Zip::from(&mut grid).and_broadcast(&lens).for_each(|cell, &len| {
                    if *cell < 0 {
                        *cell = PAD_LEFT_CODE;
                    } else if *cell >= len {
                        *cell = PAD_RIGHT_CODE;
                    }
                });
            }
        }
        grid
    }
}

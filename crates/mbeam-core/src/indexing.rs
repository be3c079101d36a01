// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Axis-0 slicing and scatter helpers shared by the kernels and callers.

use std::collections::BTreeMap;

use ndarray::{Array, ArrayD, ArrayView, Axis, Dimension, IxDyn, RemoveAxis, Slice};

use crate::error::{invalid, mismatch, BeamResult};

/// `x[begin..end]` along axis 0, zero padded wherever the range leaves the array.
///
/// The result always has `end - begin` rows.
pub fn slice_pad_zeros(x: &ArrayD<f32>, begin: isize, end: isize) -> BeamResult<ArrayD<f32>> {
    if x.ndim() == 0 {
        return Err(invalid("x", "slice_pad_zeros needs at least one axis"));
    }
    if end < begin {
        return Err(invalid("end", format!("end {end} precedes begin {begin}")));
    }
    let len = x.len_of(Axis(0)) as isize;
    let mut shape = x.shape().to_vec();
    shape[0] = (end - begin) as usize;
    let mut out = ArrayD::<f32>::zeros(IxDyn(&shape));

    let lo = begin.max(0);
    let hi = end.min(len);
    if lo < hi {
        out.slice_axis_mut(Axis(0), Slice::from((lo - begin)..(hi - begin)))
            .assign(&x.slice_axis(Axis(0), Slice::from(lo..hi)));
    }
    Ok(out)
}

/// `x[indices[j]] += y[j]` along axis 0.
///
/// Rows hit by several indices receive the sum of all their contributions.
/// Contributions are grouped per destination and reduced before being added.
pub fn index_add<D>(x: &mut Array<f32, D>, indices: &[usize], y: ArrayView<'_, f32, D>) -> BeamResult<()>
where
    D: Dimension + RemoveAxis,
{
    if x.ndim() == 0 {
        return Err(invalid("x", "index_add needs at least one axis"));
    }
    if y.len_of(Axis(0)) != indices.len() {
        return Err(mismatch("y", &[indices.len()], &[y.len_of(Axis(0))]));
    }
    if x.shape()[1..] != y.shape()[1..] {
        return Err(mismatch("y", &x.shape()[1..], &y.shape()[1..]));
    }
    let rows = x.len_of(Axis(0));
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (j, &dst) in indices.iter().enumerate() {
        if dst >= rows {
            return Err(invalid(
                "indices",
                format!("index {dst} out of range for {rows} rows"),
            ));
        }
        groups.entry(dst).or_default().push(j);
    }
    for (dst, sources) in groups {
        let contribution = y.select(Axis(0), &sources).sum_axis(Axis(0));
        let mut row = x.index_axis_mut(Axis(0), dst);
        row += &contribution;
    }
    Ok(())
}

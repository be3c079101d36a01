// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Element-by-element oracle. Slow and deliberately plain.

use ndarray::{Array3, ArrayView3};

use super::{check_view, BeamKernel, KernelGrad};
use crate::error::BeamResult;
use crate::window::{SourceIndex, WindowPlan};

#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceKernel;

impl BeamKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn gather(&self, source: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<Array3<f32>> {
        check_view("source", &source, plan, plan.n_time())?;
        let (_, n_batch, n_feat) = source.dim();
        let mut out = Array3::<f32>::zeros((plan.beam_width(), n_batch, n_feat));
        for i in 0..plan.beam_width() {
            for b in 0..n_batch {
                let index = plan.resolve(i, b);
                for f in 0..n_feat {
                    out[[i, b, f]] = match index {
                        SourceIndex::Time(t) => source[[t, b, f]],
                        other => plan.fill_value(other),
                    };
                }
            }
        }
        Ok(out)
    }

    fn gather_grad(&self, upstream: ArrayView3<'_, f32>, plan: &WindowPlan) -> BeamResult<KernelGrad> {
        check_view("upstream_grad", &upstream, plan, plan.beam_width())?;
        let (_, n_batch, n_feat) = upstream.dim();
        let mut source = Array3::<f32>::zeros((plan.n_time(), n_batch, n_feat));
        let mut pad_left = 0.0f64;
        let mut pad_right = 0.0f64;
        for i in 0..plan.beam_width() {
            for b in 0..n_batch {
                match plan.resolve(i, b) {
                    SourceIndex::Time(t) => {
                        for f in 0..n_feat {
                            source[[t, b, f]] += upstream[[i, b, f]];
                        }
                    }
                    SourceIndex::PadLeft => {
                        for f in 0..n_feat {
                            pad_left += f64::from(upstream[[i, b, f]]);
                        }
                    }
                    SourceIndex::PadRight => {
                        for f in 0..n_feat {
                            pad_right += f64::from(upstream[[i, b, f]]);
                        }
                    }
                    SourceIndex::Zero => {}
                }
            }
        }
        Ok(KernelGrad {
            source,
            pad_left: pad_left as f32,
            pad_right: pad_right as f32,
        })
    }
}

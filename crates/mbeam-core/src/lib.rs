// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! MultiBatchBeam: a windowed gather whose start offset and valid length vary
//! per batch column, with its exact adjoint.
//!
//! Several kernels implement the same operator (see [`kernel`]); the
//! [`ConsistencyHarness`] runs them side by side and fails loudly when they
//! disagree. [`ops`] wraps the operator for the small eager tape in
//! [`tensor`].

pub mod autograd;
pub mod beam;
pub mod error;
pub mod harness;
pub mod indexing;
pub mod kernel;
pub mod observability;
pub mod ops;
pub mod params;
pub mod registry;
pub mod telemetry;
pub mod tensor;
pub mod window;

pub use beam::{beam_gather, beam_gather_grad, beam_gather_grad_with, beam_gather_with, BeamGrad};
pub use error::{BeamError, BeamResult};
pub use harness::ConsistencyHarness;
pub use kernel::{BeamKernel, KernelGrad, ParallelKernel, ReferenceKernel, VectorizedKernel};
pub use params::{AxisLayout, BeamParams};
pub use registry::{global_kernel_registry, KernelRegistry};
pub use tensor::Tensor;
pub use window::{EdgeMode, SourceIndex, WindowPlan};

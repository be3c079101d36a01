// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Result alias used throughout the beam crate.
pub type BeamResult<T> = std::result::Result<T, BeamError>;

/// Errors emitted by the beam operator, its kernels and the consistency harness.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BeamError {
    /// Per-batch parameters or a gradient do not line up with the tensor they describe.
    #[error("shape mismatch for {label}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        label: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// A scalar or structural argument is outside its domain.
    #[error("invalid argument {label}: {message}")]
    InvalidArgument {
        label: &'static str,
        message: String,
    },
    #[error("no beam kernel registered under '{name}'")]
    UnknownKernel { name: String },
    #[error("beam kernel '{name}' is already registered")]
    DuplicateKernel { name: String },
    /// Two kernels produced different results for identical inputs.
    #[error("{op}: kernel '{candidate}' disagrees with reference '{reference}': {detail}")]
    ImplementationDisagreement {
        op: &'static str,
        reference: String,
        candidate: String,
        detail: String,
    },
}

pub(crate) fn invalid(label: &'static str, message: impl Into<String>) -> BeamError {
    BeamError::InvalidArgument {
        label,
        message: message.into(),
    }
}

pub(crate) fn mismatch(label: &'static str, expected: &[usize], got: &[usize]) -> BeamError {
    BeamError::ShapeMismatch {
        label,
        expected: expected.to_vec(),
        got: got.to_vec(),
    }
}

impl From<ndarray::ShapeError> for BeamError {
    fn from(err: ndarray::ShapeError) -> Self {
        invalid("layout", err.to_string())
    }
}

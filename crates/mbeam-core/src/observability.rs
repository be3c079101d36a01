// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Lightweight hook for observing completed beam calls without pulling in a
//! metrics stack.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock};

/// Metadata about a completed beam operation.
#[derive(Clone, Debug)]
pub struct BeamOpEvent {
    pub op_name: &'static str,
    pub kernel: &'static str,
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
}

/// Observer callback invoked after a beam operation completes.
pub type BeamOpObserver = Arc<dyn Fn(&BeamOpEvent) + Send + Sync + 'static>;

static BEAM_OP_OBSERVER: OnceLock<RwLock<Option<BeamOpObserver>>> = OnceLock::new();

thread_local! {
    static IN_OBSERVER_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Install (or clear) the global beam operation observer.
///
/// Returns the previously installed observer, if any.
pub fn set_beam_op_observer(observer: Option<BeamOpObserver>) -> Option<BeamOpObserver> {
    let lock = BEAM_OP_OBSERVER.get_or_init(|| RwLock::new(None));
    let mut slot = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::replace(&mut *slot, observer)
}

/// Emit an operation event to the currently installed observer.
///
/// No-op (and allocation free) unless an observer has been registered via
/// [`set_beam_op_observer`]. Events raised from inside an observer are dropped.
pub fn emit_beam_op(
    op_name: &'static str,
    kernel: &'static str,
    input_shape: &[usize],
    output_shape: &[usize],
) {
    let Some(lock) = BEAM_OP_OBSERVER.get() else {
        return;
    };
    let observer = lock
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    let Some(observer) = observer else {
        return;
    };

    let already_in_callback = IN_OBSERVER_CALLBACK.with(|flag| flag.replace(true));
    if already_in_callback {
        return;
    }

    let event = BeamOpEvent {
        op_name,
        kernel,
        input_shape: input_shape.to_vec(),
        output_shape: output_shape.to_vec(),
    };

    let _ = catch_unwind(AssertUnwindSafe(|| observer(&event)));

    IN_OBSERVER_CALLBACK.with(|flag| flag.set(false));
}

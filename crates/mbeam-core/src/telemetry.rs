// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::sync::OnceLock;

use mbeam_config::tracing::{self as config_tracing, InitError};
use tracing::warn;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the env-filtered fmt subscriber once per process.
///
/// Returns `true` when the subscriber from `mbeam-config` is the active one,
/// `false` when the host application already installed its own.
pub fn init_tracing() -> bool {
    *INSTALLED.get_or_init(|| match config_tracing::init_tracing() {
        Ok(()) | Err(InitError::AlreadyInitialised) => true,
        Err(InitError::Subscriber(reason)) => {
            warn!(%reason, "keeping the tracing subscriber installed by the host");
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_stable() {
        let first = init_tracing();
        assert_eq!(init_tracing(), first);
        tracing::debug!(first, "tracing initialised");
    }
}

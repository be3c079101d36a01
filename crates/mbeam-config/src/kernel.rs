// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Default kernel selection for the eager beam entry points.

use std::sync::OnceLock;

/// Kernel used when `MBEAM_KERNEL` is unset or blank.
pub const FALLBACK_KERNEL: &str = "vectorized";

static DEFAULT_KERNEL: OnceLock<String> = OnceLock::new();

fn kernel_from_env() -> String {
    std::env::var("MBEAM_KERNEL")
        .ok()
        .map(|raw| raw.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_KERNEL.to_string())
}

/// Name of the kernel the eager entry points dispatch to.
///
/// Read once from `MBEAM_KERNEL`; the name is resolved against the kernel
/// registry by the caller, so an unknown value surfaces there as an error.
pub fn default_kernel() -> &'static str {
    DEFAULT_KERNEL.get_or_init(kernel_from_env).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_fall_back() {
        std::env::set_var("MBEAM_KERNEL", "   ");
        assert_eq!(kernel_from_env(), FALLBACK_KERNEL);
        std::env::set_var("MBEAM_KERNEL", " Parallel ");
        assert_eq!(kernel_from_env(), "parallel");
        std::env::remove_var("MBEAM_KERNEL");
        assert_eq!(kernel_from_env(), FALLBACK_KERNEL);
    }
}

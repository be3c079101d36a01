// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Explicit name → constructor table for beam kernels.

use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use crate::error::{BeamError, BeamResult};
use crate::kernel::{BeamKernel, ParallelKernel, ReferenceKernel, VectorizedKernel};

/// Builds a fresh kernel instance.
pub type KernelCtor = fn() -> Box<dyn BeamKernel>;

/// Kernel table; iteration order is lexicographic by name.
pub struct KernelRegistry {
    kernels: RwLock<BTreeMap<String, KernelCtor>>,
}

impl KernelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            kernels: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry pre-populated with the `parallel`, `reference` and `vectorized` kernels.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let builtin: [(&str, KernelCtor); 3] = [
            ("parallel", || Box::new(ParallelKernel::default())),
            ("reference", || Box::new(ReferenceKernel)),
            ("vectorized", || Box::new(VectorizedKernel)),
        ];
        {
            let mut kernels = registry.write();
            for (name, ctor) in builtin {
                kernels.insert(name.to_string(), ctor);
            }
        }
        registry
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, KernelCtor>> {
        self.kernels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, KernelCtor>> {
        self.kernels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new kernel; names must be unique.
    pub fn register(&self, name: impl Into<String>, ctor: KernelCtor) -> BeamResult<()> {
        let name = name.into();
        let mut kernels = self.write();
        if kernels.contains_key(&name) {
            return Err(BeamError::DuplicateKernel { name });
        }
        kernels.insert(name, ctor);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn instantiate(&self, name: &str) -> BeamResult<Box<dyn BeamKernel>> {
        let ctor = self
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| BeamError::UnknownKernel {
                name: name.to_string(),
            })?;
        Ok(ctor())
    }

    /// One instance of every registered kernel, ordered by name.
    pub fn instantiate_all(&self) -> Vec<Box<dyn BeamKernel>> {
        self.read().values().map(|ctor| ctor()).collect()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

static GLOBAL_KERNEL_REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();

/// Process-wide registry, seeded with the built-in kernels.
pub fn global_kernel_registry() -> &'static KernelRegistry {
    GLOBAL_KERNEL_REGISTRY.get_or_init(KernelRegistry::with_builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_sorted() {
        let registry = KernelRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["parallel", "reference", "vectorized"]);
        let kernels = registry.instantiate_all();
        let names: Vec<_> = kernels.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["parallel", "reference", "vectorized"]);
    }

    #[test]
    fn duplicate_and_unknown_names_are_errors() {
        let registry = KernelRegistry::with_builtin();
        let err = registry.register("reference", || Box::new(ReferenceKernel));
        assert!(matches!(err, Err(BeamError::DuplicateKernel { .. })));
        assert!(matches!(
            registry.instantiate("cuda"),
            Err(BeamError::UnknownKernel { .. })
        ));
    }

    #[test]
    fn custom_kernels_can_be_added() {
        let registry = KernelRegistry::new();
        registry
            .register("parallel-sequential", || Box::new(ParallelKernel::sequential()))
            .unwrap();
        assert!(registry.contains("parallel-sequential"));
        assert_eq!(registry.instantiate("parallel-sequential").unwrap().name(), "parallel");
    }
}

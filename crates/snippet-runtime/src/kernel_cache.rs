// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Repack routines and the cache that shares them between executors.
//!
//! Building a [`RepackKernel`] walks every element of one matrix, so
//! executors that convert the same source descriptor into the same target
//! layout share one instance through a [`KernelCache`]. Executors only hold
//! a `Weak` handle: when the owning context is gone they build private,
//! uncached routines instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tensor_core::{CopyPlan, Layout, MemoryDesc, TensorError};

/// Converts planar matrices into one target layout.
#[derive(Debug)]
pub struct RepackKernel {
    plan: CopyPlan,
}

impl RepackKernel {
    /// Builds a routine for the trailing matrix of `src`.
    pub fn new(src: &MemoryDesc, target: Layout) -> Result<Self, TensorError> {
        Ok(Self {
            plan: CopyPlan::new(src, target)?,
        })
    }

    /// Descriptor of one source matrix.
    pub fn src_desc(&self) -> &MemoryDesc {
        self.plan.src_desc()
    }

    /// Descriptor of one converted matrix.
    pub fn dst_desc(&self) -> &MemoryDesc {
        self.plan.dst_desc()
    }

    pub fn src_matrix_bytes(&self) -> usize {
        self.plan.src_matrix_bytes()
    }

    pub fn dst_matrix_bytes(&self) -> usize {
        self.plan.dst_matrix_bytes()
    }

    /// Converts `matrices` consecutive matrices from `src` into `dst`.
    pub fn repack(&self, src: &[u8], dst: &mut [u8], matrices: usize) -> Result<(), TensorError> {
        self.plan.apply_batched(src, dst, matrices)
    }
}

/// Key of a cached routine: source matrix descriptor and target layout.
type KernelKey = (MemoryDesc, Layout);

/// Shared cache of [`RepackKernel`]s with hit/miss counters.
#[derive(Debug, Default)]
pub struct KernelCache {
    entries: Mutex<HashMap<KernelKey, Arc<RepackKernel>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the routine for `(src matrix, target)`, building it on a miss.
    pub fn get_or_build(&self, src: &MemoryDesc, target: Layout) -> Result<Arc<RepackKernel>, TensorError> {
        let key = (src.matrix(), target);
        if let Ok(entries) = self.entries.lock() {
            if let Some(kernel) = entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(kernel));
            }
        }

        let kernel = Arc::new(RepackKernel::new(&key.0, target)?);
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(src = %key.0, %target, "repack routine built");
        if let Ok(mut entries) = self.entries.lock() {
            // Another thread may have won the race; keep the first entry.
            let entry = entries.entry(key).or_insert(kernel);
            return Ok(Arc::clone(entry));
        }
        Ok(kernel)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Looks the routine up through a weak cache handle.
pub(crate) fn repack_kernel(
    cache: &Weak<KernelCache>,
    src: &MemoryDesc,
    target: Layout,
) -> Result<Arc<RepackKernel>, TensorError> {
    match cache.upgrade() {
        Some(cache) => cache.get_or_build(src, target),
        None => {
            tracing::debug!(src = %src, %target, "kernel cache unavailable, building uncached routine");
            Ok(Arc::new(RepackKernel::new(&src.matrix(), target)?))
        }
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph-wide execution context and one-time weight preparation.
//!
//! A [`GraphContext`] is shared by every executor of one graph. It owns the
//! scratchpad pool, the repack-routine cache and the cache of prepared
//! constant weights. [`prepare_weights`] converts constant inputs into the
//! layout their kernel reads, once per source buffer.

use crate::kernel_cache::KernelCache;
use crate::repacked_input::RepackedInputConfig;
use crate::{InternalError, RuntimeConfig, RuntimeError};
use memory_manager::{MemoryBudget, MemoryPool, ScratchpadAllocator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tensor_core::{Memory, MemoryDesc, MemoryPtr};

/// Source identity, source version and target descriptor.
type WeightKey = (u64, u64, MemoryDesc);

/// Resources shared by the executors of one graph.
#[derive(Debug)]
pub struct GraphContext {
    pool: Arc<MemoryPool>,
    kernel_cache: Arc<KernelCache>,
    weight_cache: Mutex<HashMap<WeightKey, MemoryPtr>>,
}

impl GraphContext {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            pool: Arc::new(MemoryPool::new(budget)),
            kernel_cache: Arc::new(KernelCache::new()),
            weight_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        Ok(Self::new(config.parse_budget()?))
    }

    /// The scratchpad allocator executors draw from.
    pub fn allocator(&self) -> Arc<dyn ScratchpadAllocator> {
        self.pool.clone()
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn kernel_cache(&self) -> &Arc<KernelCache> {
        &self.kernel_cache
    }

    /// Number of prepared weights held.
    pub fn cached_weights(&self) -> usize {
        self.weight_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_weights(&self) {
        if let Ok(mut cache) = self.weight_cache.lock() {
            cache.clear();
        }
    }

    fn lookup(&self, key: &WeightKey) -> Option<MemoryPtr> {
        self.weight_cache.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: WeightKey, memory: MemoryPtr) -> MemoryPtr {
        match self.weight_cache.lock() {
            Ok(mut cache) => Arc::clone(cache.entry(key).or_insert(memory)),
            Err(_) => memory,
        }
    }
}

/// Converts the constant inputs named by `config` into their target layout.
///
/// Returns one handle per input: a converted handle for every configured
/// input and the original handle for every other one. Inputs already in
/// their target layout pass through. Results are memoised in `context`, so
/// repeated calls with the same sources return the same handles.
///
/// Runs on the calling thread.
pub fn prepare_weights(
    inputs: &[MemoryPtr],
    config: &RepackedInputConfig,
    context: &GraphContext,
) -> Result<Vec<MemoryPtr>, RuntimeError> {
    let mut prepared = inputs.to_vec();
    for (index, entry) in config.iter() {
        let src = inputs.get(index).ok_or(InternalError::ArityMismatch {
            kind: "input",
            expected: index + 1,
            actual: inputs.len(),
        })?;
        let target = entry.tensor_desc();
        if src.desc() == target {
            continue;
        }
        if !src.layout().is_planar() || src.shape() != target.shape() || src.dtype() != target.dtype() {
            return Err(InternalError::ShapeMismatch {
                port: format!("input {index}"),
                detail: format!("cannot prepare {} as {target}", src.desc()),
            }
            .into());
        }

        let key = (src.id(), src.version(), target.clone());
        if let Some(hit) = context.lookup(&key) {
            tracing::trace!(input = index, "prepared weight reused");
            prepared[index] = hit;
            continue;
        }

        let mut dst = Memory::zeros(target.clone());
        entry.kernel().repack(src.as_bytes(), dst.as_bytes_mut(), target.batch())?;
        tracing::debug!(input = index, src = %src.desc(), dst = %target, "constant input prepared");
        prepared[index] = context.store(key, dst.into_ptr());
    }
    Ok(prepared)
}

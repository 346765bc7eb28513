// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII ownership of a pooled buffer.
//!
//! A [`BufferGuard`] owns its bytes for as long as it lives. Dropping it
//! hands the bytes back to the pool's free list and releases the budget
//! it held, so a scratchpad can never outlive its accounting.

use crate::pool::PoolInner;
use std::sync::Arc;

/// A buffer borrowed from a [`MemoryPool`](crate::MemoryPool).
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_kb(64));
/// let mut scratch = pool.allocate(128).unwrap();
/// scratch.as_mut_slice()[0] = 7;
/// assert_eq!(pool.allocated_bytes(), 128);
/// drop(scratch);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
pub struct BufferGuard {
    data: Vec<u8>,
    size_bytes: usize,
    pool: Arc<PoolInner>,
}

impl BufferGuard {
    pub(crate) fn new(data: Vec<u8>, size_bytes: usize, pool: Arc<PoolInner>) -> Self {
        Self {
            data,
            size_bytes,
            pool,
        }
    }

    /// The requested bytes. A reused buffer may have more capacity; the
    /// extra is never exposed.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size_bytes]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.size_bytes]
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(data, self.size_bytes);
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("size_bytes", &self.size_bytes)
            .field("capacity", &self.data.len())
            .finish()
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budget-enforced buffer pool.
//!
//! Executors ask for one scratchpad when they are built and again only
//! when a shape change makes the old one too small, so the pool is tuned
//! for few, large, long-lived buffers:
//!
//! 1. Every live byte counts against a hard [`MemoryBudget`]; requests that
//!    would exceed it fail with [`MemoryError::OutOfBudget`].
//! 2. Released buffers are kept on a free list keyed by power-of-two size
//!    class and handed out again, zeroed, to later requests of that class.
//! 3. [`AllocationStats`] records reuse, rejections and the high-water mark.

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Smallest size class handed out, so tiny scratchpads share buffers.
const MIN_SIZE_CLASS: usize = 4096;

/// State shared between a pool and the guards it handed out.
pub(crate) struct PoolInner {
    budget: MemoryBudget,
    live_bytes: AtomicUsize,
    free: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    /// Takes back a buffer from a dropped guard.
    pub(crate) fn release(&self, buffer: Vec<u8>, size_bytes: usize) {
        self.live_bytes.fetch_sub(size_bytes, Ordering::AcqRel);
        if let Ok(mut stats) = self.stats.lock() {
            stats.releases += 1;
        }
        if buffer.is_empty() {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            free.entry(buffer.len()).or_default().push(buffer);
        }
    }

    fn take_free(&self, class: usize) -> Option<Vec<u8>> {
        let mut free = self.free.lock().ok()?;
        free.get_mut(&class)?.pop()
    }
}

/// Pool of byte buffers bounded by a [`MemoryBudget`].
///
/// `MemoryPool` is cheap to share: wrap it in an `Arc` and hand it to
/// every executor that needs scratch memory.
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_kb(16));
/// let a = pool.allocate(10_000).unwrap();
/// assert!(pool.allocate(10_000).is_err());
/// drop(a);
/// assert!(pool.allocate(10_000).is_ok());
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                live_bytes: AtomicUsize::new(0),
                free: Mutex::new(HashMap::new()),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// Hands out a zeroed buffer of exactly `size_bytes` usable bytes.
    pub fn allocate(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        if size_bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        let budget = self.inner.budget.as_bytes();
        let reserved = self
            .inner
            .live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(size_bytes).filter(|&total| total <= budget)
            });
        let live = match reserved {
            Ok(previous) => previous + size_bytes,
            Err(live) => {
                self.record(|s| s.rejections += 1);
                tracing::warn!(
                    requested = size_bytes,
                    live,
                    budget,
                    "scratchpad allocation rejected"
                );
                return Err(MemoryError::OutOfBudget {
                    requested: size_bytes,
                    available: budget.saturating_sub(live),
                    budget,
                });
            }
        };

        let class = size_class_for(size_bytes);
        let data = match self.inner.take_free(class) {
            Some(mut buffer) => {
                buffer[..size_bytes].fill(0);
                self.record(|s| s.reused += 1);
                buffer
            }
            None => {
                self.record(|s| s.fresh += 1);
                vec![0u8; class]
            }
        };
        self.record(|s| {
            s.requested_bytes += size_bytes as u64;
            s.peak_live_bytes = s.peak_live_bytes.max(live);
        });

        tracing::debug!(size_bytes, class, live, "scratchpad allocated");
        Ok(BufferGuard::new(data, size_bytes, Arc::clone(&self.inner)))
    }

    /// Bytes held by live guards.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::Acquire)
    }

    /// Bytes that can still be granted.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Bytes parked on the free list.
    pub fn free_list_bytes(&self) -> usize {
        self.inner
            .free
            .lock()
            .map(|free| free.iter().map(|(class, bufs)| class * bufs.len()).sum())
            .unwrap_or(0)
    }

    /// Drops every parked buffer.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free.lock() {
            free.clear();
        }
    }

    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut AllocationStats)) {
        if let Ok(mut stats) = self.inner.stats.lock() {
            update(&mut stats);
        }
    }
}

/// Rounds a request up to its power-of-two size class.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("free_list_bytes", &self.free_list_bytes())
            .finish()
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Scratchpad memory for subgraph executors.
//!
//! - [`MemoryBudget`]: a hard ceiling with human-readable parsing (`"64M"`).
//! - [`MemoryPool`]: hands out zeroed buffers within the budget and keeps
//!   released ones on a size-class free list.
//! - [`BufferGuard`]: owns a buffer and gives it back on drop.
//! - [`ScratchpadAllocator`]: the trait executors allocate through.
//! - [`AllocationStats`]: reuse, rejection and peak counters.
//!
//! ```text
//! executor ──allocate_scratchpad──► MemoryPool ──► BufferGuard
//!                                       ▲              │
//!                                       └── release ◄──┘ drop
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{MemoryBudget, MemoryPool, ScratchpadAllocator};
//!
//! let pool = MemoryPool::new(MemoryBudget::parse("1M").unwrap());
//! let scratch = pool.allocate_scratchpad(64 * 1024).unwrap();
//! assert_eq!(pool.allocated_bytes(), 64 * 1024);
//! drop(scratch);
//! assert_eq!(pool.allocated_bytes(), 0);
//! ```

mod allocator;
mod budget;
mod error;
mod guard;
mod pool;
mod stats;

pub use allocator::ScratchpadAllocator;
pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use stats::AllocationStats;

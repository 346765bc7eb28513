// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The allocator seam used by executors.

use crate::{BufferGuard, MemoryError, MemoryPool};

/// Source of scratchpad memory for an executor.
///
/// Executors request one buffer per layout and keep it across calls.
/// Implementations must hand out zero-initialised memory.
pub trait ScratchpadAllocator: Send + Sync {
    /// Returns a buffer of at least `size_bytes` usable bytes.
    fn allocate_scratchpad(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError>;
}

impl ScratchpadAllocator for MemoryPool {
    fn allocate_scratchpad(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        self.allocate(size_bytes)
    }
}

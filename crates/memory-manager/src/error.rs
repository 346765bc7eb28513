// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for scratchpad allocation.

/// Errors raised by the allocator and budget parsing.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Granting the request would exceed the pool budget.
    #[error("scratchpad request of {requested} bytes exceeds budget ({available} of {budget} bytes free)")]
    OutOfBudget {
        requested: usize,
        available: usize,
        budget: usize,
    },

    /// A zero-byte buffer was requested.
    #[error("cannot allocate zero-sized buffer")]
    ZeroSizedAllocation,

    /// A budget string could not be parsed.
    #[error("invalid budget '{0}': expected a number with an optional K, M or G suffix")]
    InvalidBudget(String),
}

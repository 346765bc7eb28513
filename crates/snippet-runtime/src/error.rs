// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for subgraph execution.

use tensor_core::Layout;

/// Internal-consistency failures.
///
/// Any of these means the executor, its attributes and the memories it was
/// handed disagree. None is recoverable by retrying the call.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    /// A scratch slot was requested for an input that is not repacked.
    #[error("scratch pointer not found for input {input}")]
    ScratchSlotNotFound { input: usize },

    /// A scratch slot was requested for a thread the layout does not have.
    #[error("thread {thread} out of range for {nthreads} scratch lanes")]
    ThreadOutOfRange { thread: usize, nthreads: usize },

    /// Port counts disagree with the kernel.
    #[error("{kind} arity mismatch: kernel expects {expected}, got {actual}")]
    ArityMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A memory does not have the shape or layout the executor derived.
    #[error("shape mismatch on {port}: {detail}")]
    ShapeMismatch { port: String, detail: String },

    /// The executor parameters contradict each other.
    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    /// A constant input arrived without going through `prepare_weights`.
    #[error("constant input {input} must be prepared in layout {expected} before execution")]
    UnpreparedConstant { input: usize, expected: Layout },

    /// A buffer is smaller than the region the executor must touch.
    #[error("{what} holds {actual} bytes but {required} are required")]
    UndersizedMemory {
        what: String,
        required: usize,
        actual: usize,
    },
}

/// Errors surfaced by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Internal-consistency failure; see [`InternalError`].
    #[error("fatal: {0}")]
    Fatal(#[from] InternalError),

    /// The scratchpad could not be allocated.
    #[error("scratchpad allocation failed: {0}")]
    Allocation(#[from] memory_manager::MemoryError),

    /// A repack routine or reference kernel rejected its buffers.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// Subgraph attributes could not be read.
    #[error("graph error: {0}")]
    Ir(#[from] snippet_ir::IrError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The worker pool could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl RuntimeError {
    /// Returns `true` for errors raised inside `execute` and construction
    /// that indicate a broken executor rather than bad user input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Allocation(_) | Self::Tensor(_))
    }
}

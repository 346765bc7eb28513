// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor descriptors and memory for fused-subgraph execution.
//!
//! This crate provides:
//! - [`Shape`] and [`DType`]: logical extents and element types.
//! - [`Layout`] and [`MemoryDesc`]: physical arrangement and sizing,
//!   including the blocked layout GEMM kernels expect for weights.
//! - [`Memory`] / [`MemoryPtr`]: owned buffers with a stable identity and
//!   a modification version, used by the executor's repack cache.
//! - [`CopyPlan`]: a precomputed planar-to-layout conversion.
//! - [`matmul`]: a reference matrix multiply for checking kernels.

mod dtype;
mod error;
mod layout;
mod memory;
mod ops;
mod plan;
mod shape;

pub use dtype::DType;
pub use error::TensorError;
pub use layout::{Layout, MemoryDesc};
pub use memory::{load_f32, store_f32, Memory, MemoryPtr};
pub use ops::matmul;
pub use plan::CopyPlan;
pub use shape::Shape;

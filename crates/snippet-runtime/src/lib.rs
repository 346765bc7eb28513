// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # snippet-runtime
//!
//! Executes compiled subgraph kernels ("snippets") over a parallel domain,
//! converting inputs into the blocked layouts the kernels read.
//!
//! The runtime takes:
//! - `SubgraphAttrs` from `snippet-ir`, describing ports and tiling.
//! - A [`SnippetKernel`], invoked once per work item.
//! - A [`GraphContext`] providing the scratchpad pool from `memory-manager`
//!   and the shared repack-routine cache.
//!
//! # Repacking
//! Inputs whose port requires a non-planar layout are converted either by
//! every worker lane for the tiles it reads ([`RepackingPolicy::InParallel`])
//! or once per call before dispatch ([`RepackingPolicy::Separate`]).
//! Conversions are skipped when a lane's slot already holds the same
//! source bytes. Constant inputs are converted once, ahead of execution,
//! by [`prepare_weights`].
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use snippet_runtime::reference::BlockedMatMul;
//! use snippet_runtime::{
//!     ExecutionStream, ExecutorParams, GraphContext, RepackingPolicy, RuntimeConfig, SubgraphExecutor,
//! };
//! use tensor_core::{Layout, Memory, MemoryDesc, Shape};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::new(RepackingPolicy::InParallel);
//! let context = GraphContext::from_config(&config)?;
//! let stream = ExecutionStream::from_config(&config)?;
//!
//! let kernel = BlockedMatMul::new(4, 16, 32, Layout::Blocked { n_block: 16, k_pack: 1 });
//! let attrs = kernel.subgraph_attrs(&[8], &[8], false);
//! let params = ExecutorParams::from_context(Arc::new(kernel), attrs, &config, &context);
//! let mut executor = SubgraphExecutor::new(params)?;
//!
//! let a = Memory::from_f32(Shape::new(vec![8, 4, 16]), &vec![1.0; 8 * 4 * 16])?;
//! let b = Memory::from_f32(Shape::new(vec![8, 16, 32]), &vec![0.5; 8 * 16 * 32])?;
//! let mut c = vec![Memory::zeros(MemoryDesc::planar(Shape::new(vec![8, 4, 32]), a.dtype()))];
//! executor.execute(&stream, &[a.into_ptr(), b.into_ptr()], &mut c)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod domain;
mod error;
mod executor;
mod kernel;
mod kernel_cache;
mod metrics;
mod repack;
mod repacked_input;
mod scratchpad;
mod specialization;
mod stream;
mod weights;

pub use config::{RepackingPolicy, RuntimeConfig};
pub use domain::{balanced_split, ExecDomain};
pub use error::{InternalError, RuntimeError};
pub use executor::{ExecutorParams, SubgraphExecutor};
pub use kernel::{reference, CallArgs, KernelFn, SnippetKernel};
pub use kernel_cache::{KernelCache, RepackKernel};
pub use metrics::{CallMetrics, ExecutionMetrics, HISTORY_CAPACITY};
pub use repack::{RepackCache, RepackStat, SourceKey};
pub use repacked_input::{RepackedInput, RepackedInputConfig};
pub use scratchpad::{ScratchLayout, ThreadScratch};
pub use specialization::{resolver_for, DynamicShapes, ShapeResolver, ShapeSet, SpecializationMode, StaticShapes};
pub use stream::ExecutionStream;
pub use weights::{prepare_weights, GraphContext};

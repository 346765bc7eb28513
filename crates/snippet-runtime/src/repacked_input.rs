// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-input repacking descriptors.

use crate::kernel_cache::{repack_kernel, KernelCache, RepackKernel};
use crate::{RepackingPolicy, RuntimeError};
use snippet_ir::SubgraphAttrs;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tensor_core::{MemoryDesc, Shape};

/// How one input is converted before the kernel reads it.
#[derive(Debug, Clone)]
pub struct RepackedInput {
    kernel: Arc<RepackKernel>,
    tensor_desc: MemoryDesc,
    tile_matrices: usize,
    constant: bool,
}

impl RepackedInput {
    /// Describes the conversion of a planar `src` tensor.
    ///
    /// `tile_rank` trailing dimensions form one work item; each item reads
    /// `tile_matrices` matrices of the converted tensor.
    pub fn new(kernel: Arc<RepackKernel>, src: &MemoryDesc, tile_rank: usize, constant: bool) -> Self {
        let dims = src.shape().dims();
        let rank = dims.len();
        let tile_matrices = if rank > 2 && tile_rank > 2 {
            dims[rank.saturating_sub(tile_rank)..rank - 2].iter().product()
        } else {
            1
        };
        let tensor_desc = src.with_layout(kernel.dst_desc().layout());
        Self {
            kernel,
            tensor_desc,
            tile_matrices,
            constant,
        }
    }

    pub fn kernel(&self) -> &RepackKernel {
        &self.kernel
    }

    /// The whole input tensor in its target layout.
    pub fn tensor_desc(&self) -> &MemoryDesc {
        &self.tensor_desc
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Matrices converted per work item.
    pub fn tile_matrices(&self) -> usize {
        self.tile_matrices
    }

    /// Source bytes read per work item.
    pub fn src_tile_bytes(&self) -> usize {
        self.tile_matrices * self.kernel.src_matrix_bytes()
    }

    /// Bytes of one per-thread scratch slot under `policy`.
    ///
    /// Parallel repacking converts one work item's tile; serial repacking
    /// converts the whole tensor.
    pub fn slot_size(&self, policy: RepackingPolicy) -> usize {
        match policy {
            RepackingPolicy::InParallel => self.tile_matrices * self.kernel.dst_matrix_bytes(),
            RepackingPolicy::Separate => self.tensor_desc.size_bytes(),
            RepackingPolicy::None => 0,
        }
    }
}

/// Repacking descriptors keyed and ordered by input index.
#[derive(Debug, Clone, Default)]
pub struct RepackedInputConfig {
    inputs: BTreeMap<usize, RepackedInput>,
}

impl RepackedInputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, input: RepackedInput) {
        self.inputs.insert(index, input);
    }

    pub fn get(&self, index: usize) -> Option<&RepackedInput> {
        self.inputs.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.inputs.contains_key(&index)
    }

    /// Position of `index` in configuration order.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.inputs.keys().position(|&k| k == index)
    }

    /// Entries in ascending input order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RepackedInput)> {
        self.inputs.iter().map(|(&k, v)| (k, v))
    }

    pub fn indices(&self) -> Vec<usize> {
        self.inputs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Builds the runtime and constant configurations for concrete input
    /// shapes. Returns `(runtime, constant)`.
    pub fn split_for(
        attrs: &SubgraphAttrs,
        input_shapes: &[Shape],
        kernel_cache: &Weak<KernelCache>,
    ) -> Result<(Self, Self), RuntimeError> {
        let mut runtime = Self::new();
        let mut constant = Self::new();
        for (index, port) in attrs.repacked_inputs() {
            let shape = input_shapes.get(index).cloned().ok_or_else(|| {
                crate::InternalError::ArityMismatch {
                    kind: "input shape",
                    expected: attrs.inputs.len(),
                    actual: input_shapes.len(),
                }
            })?;
            let src = MemoryDesc::planar(shape, port.dtype);
            let kernel = repack_kernel(kernel_cache, &src, port.layout)?;
            let entry = RepackedInput::new(kernel, &src, attrs.tile_rank, port.constant);
            if port.constant {
                constant.insert(index, entry);
            } else {
                runtime.insert(index, entry);
            }
        }
        Ok((runtime, constant))
    }

    /// Builds the constant-input configuration only.
    pub fn constants_for(
        attrs: &SubgraphAttrs,
        input_shapes: &[Shape],
        kernel_cache: &Weak<KernelCache>,
    ) -> Result<Self, RuntimeError> {
        Self::split_for(attrs, input_shapes, kernel_cache).map(|(_, constant)| constant)
    }
}

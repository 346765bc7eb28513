// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory handles passed between the graph layer and the executor.
//!
//! A [`Memory`] owns its bytes and a [`MemoryDesc`]. Every handle carries a
//! process-unique identity plus a modification version, which together
//! let the executor tell whether the bytes behind an input are the ones it
//! already converted on a previous call.

use crate::{DType, Layout, MemoryDesc, Shape, TensorError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared, read-only handle to an input memory.
pub type MemoryPtr = Arc<Memory>;

/// An owned memory region described by a [`MemoryDesc`].
///
/// Cloning a `Memory` copies the bytes and yields a *new* identity:
/// the clone is a different buffer as far as repack caching goes.
#[derive(Debug)]
pub struct Memory {
    id: u64,
    version: u64,
    desc: MemoryDesc,
    data: Vec<u8>,
}

impl Memory {
    /// Creates a zero-filled memory for the given descriptor.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Memory, MemoryDesc, Shape};
    /// let m = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 3), DType::F32));
    /// assert_eq!(m.size_bytes(), 24);
    /// ```
    pub fn zeros(desc: MemoryDesc) -> Self {
        let size = desc.size_bytes();
        Self {
            id: next_id(),
            version: 0,
            desc,
            data: vec![0u8; size],
        }
    }

    /// Creates a memory from raw bytes.
    ///
    /// Returns an error if the buffer size does not match `desc.size_bytes()`.
    pub fn from_bytes(desc: MemoryDesc, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = desc.size_bytes();
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            id: next_id(),
            version: 0,
            desc,
            data,
        })
    }

    /// Creates a planar `f32` memory from values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Memory, Shape};
    /// let m = Memory::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(m.to_f32_vec(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        let desc = MemoryDesc::planar(shape, DType::F32);
        Self::from_bytes(desc, bytemuck::cast_slice(values).to_vec())
    }

    /// Wraps this memory into a shared input handle.
    pub fn into_ptr(self) -> MemoryPtr {
        Arc::new(self)
    }

    /// Returns the process-unique identity of this buffer.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns how many times mutable access to the bytes was handed out.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.desc
    }

    pub fn shape(&self) -> &Shape {
        self.desc.shape()
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype()
    }

    pub fn layout(&self) -> Layout {
        self.desc.layout()
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw bytes mutably and bumps the modification version.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.version += 1;
        &mut self.data
    }

    /// Returns the memory footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Copies the contents out as `f32` values.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        assert_eq!(
            self.dtype(),
            DType::F32,
            "to_f32_vec called on {} memory",
            self.dtype()
        );
        self.data.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>).collect()
    }
}

impl Clone for Memory {
    fn clone(&self) -> Self {
        Self {
            id: next_id(),
            version: 0,
            desc: self.desc.clone(),
            data: self.data.clone(),
        }
    }
}

/// Reads the `index`-th `f32` from an unaligned byte slice.
pub fn load_f32(bytes: &[u8], index: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[index * 4..index * 4 + 4])
}

/// Writes the `index`-th `f32` into an unaligned byte slice.
pub fn store_f32(bytes: &mut [u8], index: usize, value: f32) {
    bytes[index * 4..index * 4 + 4].copy_from_slice(bytemuck::bytes_of(&value));
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory layouts and memory descriptors.
//!
//! A compiled kernel may require some inputs in a layout other than plain
//! row-major. The only non-planar layout supported is the *blocked* matrix
//! layout used by GEMM micro-kernels for their right-hand operand:
//!
//! ```text
//! planar  [K, N]                         blocked { n_block, k_pack }
//! ┌──────────────────────┐               [ceil(N / n_block)]          block of columns
//! │ k0: n0 n1 n2 ... nN  │    repack       [ceil(K / k_pack)]         packed row group
//! │ k1: n0 n1 n2 ... nN  │  ──────────►      [n_block]                column in block
//! │ ...                  │                     [k_pack]               row in group
//! └──────────────────────┘
//! ```
//!
//! Both `K` and `N` are zero padded up to the block sizes. Leading
//! (batch) dimensions are left untouched: a blocked tensor is a dense
//! sequence of blocked matrices.

use crate::{DType, Shape, TensorError};
use std::fmt;
use std::str::FromStr;

/// The physical arrangement of the last two dimensions of a tensor.
///
/// Deserialized values go through [`Layout::blocked`], so zero block sizes
/// are rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "LayoutRepr", into = "LayoutRepr")]
pub enum Layout {
    /// Row-major (C order).
    Planar,
    /// Column-blocked with optional row packing (VNNI-style when `k_pack > 1`).
    Blocked { n_block: usize, k_pack: usize },
}

/// Serialized form of [`Layout`], before validation.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum LayoutRepr {
    Planar,
    Blocked { n_block: usize, k_pack: usize },
}

impl TryFrom<LayoutRepr> for Layout {
    type Error = TensorError;

    fn try_from(repr: LayoutRepr) -> Result<Self, Self::Error> {
        match repr {
            LayoutRepr::Planar => Ok(Self::Planar),
            LayoutRepr::Blocked { n_block, k_pack } => Self::blocked(n_block, k_pack),
        }
    }
}

impl From<Layout> for LayoutRepr {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Planar => Self::Planar,
            Layout::Blocked { n_block, k_pack } => Self::Blocked { n_block, k_pack },
        }
    }
}

impl Layout {
    /// Creates a blocked layout, rejecting zero block sizes.
    pub fn blocked(n_block: usize, k_pack: usize) -> Result<Self, TensorError> {
        if n_block == 0 || k_pack == 0 {
            return Err(TensorError::InvalidLayout {
                layout: format!("blocked:{n_block}:{k_pack}"),
                detail: "block sizes must be non-zero".into(),
            });
        }
        Ok(Self::Blocked { n_block, k_pack })
    }

    /// Checks the block sizes of a layout built from its public fields.
    pub fn validate(&self) -> Result<(), TensorError> {
        match *self {
            Self::Planar => Ok(()),
            Self::Blocked { n_block, k_pack } => Self::blocked(n_block, k_pack).map(|_| ()),
        }
    }

    /// Returns `true` for [`Layout::Planar`].
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Planar)
    }

    /// Returns the padded `(K, N)` extents of a `[k, n]` matrix in this layout.
    pub fn padded_dims(&self, k: usize, n: usize) -> (usize, usize) {
        match *self {
            Self::Planar => (k, n),
            Self::Blocked { n_block, k_pack } => (round_up(k, k_pack), round_up(n, n_block)),
        }
    }

    /// Returns the element index of `(row, col)` inside one `[k, n]` matrix.
    ///
    /// The layout must have passed [`Layout::validate`].
    pub fn element_index(&self, row: usize, col: usize, k: usize, n: usize) -> usize {
        match *self {
            Self::Planar => row * n + col,
            Self::Blocked { n_block, k_pack } => {
                let groups = round_up(k, k_pack) / k_pack;
                let block = col / n_block;
                let in_block = col % n_block;
                let group = row / k_pack;
                let in_group = row % k_pack;
                ((block * groups + group) * n_block + in_block) * k_pack + in_group
            }
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planar => f.write_str("planar"),
            Self::Blocked { n_block, k_pack: 1 } => write!(f, "blocked:{n_block}"),
            Self::Blocked { n_block, k_pack } => write!(f, "blocked:{n_block}:{k_pack}"),
        }
    }
}

impl FromStr for Layout {
    type Err = TensorError;

    /// Parses `"planar"`, `"blocked:<n_block>"` or `"blocked:<n_block>:<k_pack>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |detail: &str| TensorError::InvalidLayout {
            layout: s.to_string(),
            detail: detail.to_string(),
        };

        let lower = s.trim().to_lowercase();
        let mut parts = lower.split(':');
        match parts.next() {
            Some("planar") | Some("plain") if parts.clone().next().is_none() => Ok(Self::Planar),
            Some("blocked") => {
                let n_block = parts
                    .next()
                    .ok_or_else(|| invalid("missing n_block"))?
                    .parse::<usize>()
                    .map_err(|_| invalid("n_block is not a number"))?;
                let k_pack = match parts.next() {
                    Some(p) => p
                        .parse::<usize>()
                        .map_err(|_| invalid("k_pack is not a number"))?,
                    None => 1,
                };
                if parts.next().is_some() {
                    return Err(invalid("too many components"));
                }
                Self::blocked(n_block, k_pack)
            }
            _ => Err(invalid("expected 'planar' or 'blocked:<n>[:<k>]'")),
        }
    }
}

/// Shape, element type and layout of a memory region.
///
/// The descriptor answers every size question the executor asks: how big
/// the whole tensor is, how big one trailing matrix is, and how many bytes
/// separate consecutive indices of a leading dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MemoryDesc {
    shape: Shape,
    dtype: DType,
    layout: Layout,
}

impl MemoryDesc {
    /// Creates a descriptor.
    pub fn new(shape: Shape, dtype: DType, layout: Layout) -> Self {
        Self {
            shape,
            dtype,
            layout,
        }
    }

    /// Creates a row-major descriptor.
    pub fn planar(shape: Shape, dtype: DType) -> Self {
        Self::new(shape, dtype, Layout::Planar)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns the same shape and dtype in another layout.
    pub fn with_layout(&self, layout: Layout) -> Self {
        Self::new(self.shape.clone(), self.dtype, layout)
    }

    /// Returns the logical `(K, N)` dims of the trailing matrix.
    pub fn matrix_dims(&self) -> (usize, usize) {
        self.shape.matrix_extent()
    }

    /// Returns the number of trailing matrices (product of leading dims).
    pub fn batch(&self) -> usize {
        self.shape.batch()
    }

    /// Returns the descriptor of a single trailing matrix.
    pub fn matrix(&self) -> MemoryDesc {
        Self::new(self.shape.trailing(2), self.dtype, self.layout)
    }

    /// Returns the bytes occupied by one trailing matrix, padding included.
    pub fn matrix_size_bytes(&self) -> usize {
        let (k, n) = self.matrix_dims();
        let (pk, pn) = self.layout.padded_dims(k, n);
        pk * pn * self.dtype.size_bytes()
    }

    /// Returns the total bytes occupied by the tensor, padding included.
    pub fn size_bytes(&self) -> usize {
        if self.shape.num_elements() == 0 {
            return 0;
        }
        self.batch() * self.matrix_size_bytes()
    }

    /// Returns the byte distance between consecutive indices of `dim`.
    ///
    /// For blocked layouts only the leading (batch) dimensions have a
    /// byte stride; the trailing matrix is not addressable per element
    /// by a flat stride, so `None` is returned for it.
    pub fn dim_stride_bytes(&self, dim: usize) -> Option<usize> {
        let rank = self.shape.rank();
        if dim >= rank {
            return None;
        }
        let dims = self.shape.dims();
        match self.layout {
            Layout::Planar => {
                let inner: usize = dims[dim + 1..].iter().product();
                Some(inner * self.dtype.size_bytes())
            }
            Layout::Blocked { .. } => {
                if dim + 2 >= rank {
                    return None;
                }
                let inner: usize = dims[dim + 1..rank - 2].iter().product();
                Some(inner * self.matrix_size_bytes())
            }
        }
    }
}

impl fmt::Display for MemoryDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.shape, self.dtype, self.layout)
    }
}

/// Rounds `value` up to a multiple of `multiple`.
pub(crate) fn round_up(value: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        value
    } else {
        value.div_ceil(multiple) * multiple
    }
}

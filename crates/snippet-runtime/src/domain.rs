// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Parallel execution domain of a subgraph call.
//!
//! The master shape (output 0) is split into a *domain*, its leading
//! dimensions, and a *tile*, its trailing `tile_rank` dimensions. Each
//! domain point is one work item: one kernel call over one tile.
//!
//! ```text
//! master [B, H, M, N], tile_rank 2
//!        └─domain─┘└tile┘      work_amount = B * H
//! ```
//!
//! Inputs are aligned to the domain from the right. A leading input
//! dimension of 1 against a larger domain dimension is broadcast and gets
//! a byte stride of 0.

use crate::InternalError;
use std::ops::Range;
use tensor_core::{MemoryDesc, Shape};

/// Domain dimensions, per-port strides and per-item sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecDomain {
    dims: Vec<usize>,
    work_amount: usize,
    tile_rank: usize,
    in_strides: Vec<Vec<usize>>,
    in_tile_bytes: Vec<usize>,
    out_block_bytes: Vec<usize>,
}

impl ExecDomain {
    /// Derives the domain from the descriptors the kernel's views start in.
    pub fn new(inputs: &[MemoryDesc], outputs: &[MemoryDesc], tile_rank: usize) -> Result<Self, InternalError> {
        let master = outputs
            .first()
            .ok_or_else(|| InternalError::MalformedConfig("subgraph has no outputs".into()))?;
        let (domain, _) = master.shape().split_at_tile(tile_rank);
        let work_amount = domain.num_elements();

        let mut out_block_bytes = Vec::with_capacity(outputs.len());
        for (o, desc) in outputs.iter().enumerate() {
            if !desc.layout().is_planar() {
                return Err(InternalError::MalformedConfig(format!(
                    "output {o} must be planar, found {}",
                    desc.layout()
                )));
            }
            if desc.shape().split_at_tile(tile_rank).0 != domain {
                return Err(InternalError::ShapeMismatch {
                    port: format!("output {o}"),
                    detail: format!("leading dims of {} differ from domain {domain}", desc.shape()),
                });
            }
            out_block_bytes.push(tile_bytes(desc, tile_rank));
        }

        let mut in_strides = Vec::with_capacity(inputs.len());
        let mut in_tile_bytes = Vec::with_capacity(inputs.len());
        for (i, desc) in inputs.iter().enumerate() {
            in_strides.push(broadcast_strides(desc, &domain, tile_rank).map_err(|detail| {
                InternalError::ShapeMismatch {
                    port: format!("input {i}"),
                    detail,
                }
            })?);
            in_tile_bytes.push(tile_bytes(desc, tile_rank));
        }

        Ok(Self {
            dims: domain.dims().to_vec(),
            work_amount,
            tile_rank,
            in_strides,
            in_tile_bytes,
            out_block_bytes,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of work items.
    pub fn work_amount(&self) -> usize {
        self.work_amount
    }

    pub fn tile_rank(&self) -> usize {
        self.tile_rank
    }

    /// Writes the domain index of `item` (row-major) into `indexes`.
    pub fn unravel(&self, mut item: usize, indexes: &mut [usize]) {
        for (idx, &dim) in indexes.iter_mut().zip(&self.dims).rev() {
            *idx = item % dim;
            item /= dim;
        }
    }

    /// Byte offset of input `input`'s tile at `indexes`, relative to its start.
    pub fn input_offset(&self, input: usize, indexes: &[usize]) -> usize {
        self.in_strides[input]
            .iter()
            .zip(indexes)
            .map(|(stride, idx)| stride * idx)
            .sum()
    }

    /// Bytes of input `input` one kernel call reads.
    pub fn input_tile_bytes(&self, input: usize) -> usize {
        self.in_tile_bytes[input]
    }

    /// Bytes of output `output` one kernel call writes.
    pub fn output_block_bytes(&self, output: usize) -> usize {
        self.out_block_bytes[output]
    }

    /// Items assigned to lane `ithr` of `nthreads`.
    pub fn split(&self, nthreads: usize, ithr: usize) -> Range<usize> {
        balanced_split(self.work_amount, nthreads, ithr)
    }
}

/// Splits `total` items over `n` lanes; the first `total % n` lanes take
/// one extra item.
pub fn balanced_split(total: usize, n: usize, ithr: usize) -> Range<usize> {
    let n = n.max(1);
    let base = total / n;
    let extra = total % n;
    let start = ithr * base + ithr.min(extra);
    let len = base + usize::from(ithr < extra);
    start.min(total)..(start + len).min(total)
}

/// Bytes of the trailing `tile_rank` dims of `desc`.
pub(crate) fn tile_bytes(desc: &MemoryDesc, tile_rank: usize) -> usize {
    let lead = desc.shape().rank().saturating_sub(tile_rank);
    if lead == 0 {
        return desc.size_bytes();
    }
    desc.dim_stride_bytes(lead - 1).unwrap_or_else(|| desc.size_bytes())
}

fn broadcast_strides(desc: &MemoryDesc, domain: &Shape, tile_rank: usize) -> Result<Vec<usize>, String> {
    let (lead, _) = desc.shape().split_at_tile(tile_rank);
    if !lead.broadcasts_to(domain) {
        return Err(format!(
            "leading dims {lead} of {} do not broadcast to domain {domain}",
            desc.shape()
        ));
    }

    let skip = domain.rank() - lead.rank();
    let mut strides = vec![0; domain.rank()];
    for (j, &dim) in lead.dims().iter().enumerate() {
        if dim == domain.dims()[skip + j] {
            strides[skip + j] = desc
                .dim_stride_bytes(j)
                .ok_or_else(|| format!("dimension {j} of {desc} has no byte stride"))?;
        }
    }
    Ok(strides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Layout, Shape};

    fn planar(dims: &[usize]) -> MemoryDesc {
        MemoryDesc::planar(Shape::new(dims.to_vec()), DType::F32)
    }

    #[test]
    fn test_balanced_split() {
        let ranges: Vec<_> = (0..3).map(|t| balanced_split(10, 3, t)).collect();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        // More lanes than items: trailing lanes are empty.
        assert_eq!(balanced_split(2, 4, 3), 2..2);
        assert_eq!(balanced_split(0, 2, 0), 0..0);
    }

    #[test]
    fn test_domain_and_strides() {
        let out = planar(&[2, 3, 4, 5]);
        let a = planar(&[2, 3, 4, 6]);
        let w = planar(&[6, 5]);
        let bcast = planar(&[1, 3, 4, 6]);
        let d = ExecDomain::new(&[a, w, bcast], &[out], 2).unwrap();

        assert_eq!(d.dims(), &[2, 3]);
        assert_eq!(d.work_amount(), 6);
        assert_eq!(d.output_block_bytes(0), 4 * 5 * 4);
        assert_eq!(d.input_tile_bytes(0), 4 * 6 * 4);
        assert_eq!(d.input_tile_bytes(1), 6 * 5 * 4);

        let mut idx = [0; 2];
        d.unravel(5, &mut idx);
        assert_eq!(idx, [1, 2]);
        assert_eq!(d.input_offset(0, &idx), 5 * 96);
        // A weight without leading dims is shared by every item.
        assert_eq!(d.input_offset(1, &idx), 0);
        // Dim 0 broadcasts, dim 1 strides.
        assert_eq!(d.input_offset(2, &idx), 2 * 96);
    }

    #[test]
    fn test_blocked_input_strides() {
        let out = planar(&[3, 4, 16]);
        let w = planar(&[3, 8, 16]).with_layout(Layout::Blocked { n_block: 16, k_pack: 2 });
        let d = ExecDomain::new(&[w], &[out], 2).unwrap();
        let mut idx = [0; 1];
        d.unravel(2, &mut idx);
        assert_eq!(d.input_offset(0, &idx), 2 * 8 * 16 * 4);
        assert_eq!(d.input_tile_bytes(0), 8 * 16 * 4);
    }

    #[test]
    fn test_rank_below_tile() {
        let out = planar(&[8]);
        let d = ExecDomain::new(&[planar(&[8])], &[out], 2).unwrap();
        assert!(d.dims().is_empty());
        assert_eq!(d.work_amount(), 1);
        assert_eq!(d.output_block_bytes(0), 32);
    }

    #[test]
    fn test_incompatible_input() {
        let out = planar(&[2, 4, 4]);
        let err = ExecDomain::new(&[planar(&[3, 4, 4])], &[out.clone()], 2).unwrap_err();
        assert!(matches!(err, InternalError::ShapeMismatch { .. }));

        let err = ExecDomain::new(&[planar(&[2, 2, 4, 4])], &[out], 2).unwrap_err();
        assert!(matches!(err, InternalError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_output_must_match_domain() {
        let err = ExecDomain::new(&[], &[planar(&[2, 4, 4]), planar(&[3, 4, 4])], 2).unwrap_err();
        assert!(matches!(err, InternalError::ShapeMismatch { .. }));
        assert!(ExecDomain::new(&[], &[], 2).is_err());
    }
}

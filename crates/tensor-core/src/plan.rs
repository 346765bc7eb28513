// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Precomputed layout-conversion plans.
//!
//! A [`CopyPlan`] converts one planar `[K, N]` matrix into a target
//! [`Layout`]. Building the plan walks every element once and merges
//! neighbouring elements into contiguous byte runs; applying it is then a
//! handful of `copy_from_slice` calls. Plans are cheap to share and are
//! cached by the runtime.

use crate::{Layout, MemoryDesc, TensorError};

/// A contiguous byte range copied from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CopyRun {
    src: usize,
    dst: usize,
    len: usize,
}

/// Conversion plan from a planar matrix to a target layout.
#[derive(Debug, Clone)]
pub struct CopyPlan {
    src: MemoryDesc,
    dst: MemoryDesc,
    runs: Vec<CopyRun>,
    pads: bool,
}

impl CopyPlan {
    /// Builds a plan converting the trailing matrix of `src` into `target`.
    ///
    /// # Errors
    /// Returns [`TensorError::InvalidLayout`] if `src` is not planar or
    /// `target` has a zero block size.
    pub fn new(src: &MemoryDesc, target: Layout) -> Result<Self, TensorError> {
        target.validate()?;
        if !src.layout().is_planar() {
            return Err(TensorError::InvalidLayout {
                layout: src.layout().to_string(),
                detail: "copy plans convert from planar sources only".into(),
            });
        }

        let src = src.matrix();
        let dst = src.with_layout(target);
        let elem = src.dtype().size_bytes();
        let (k, n) = src.matrix_dims();

        let mut runs: Vec<CopyRun> = Vec::new();
        for row in 0..k {
            for col in 0..n {
                let s = (row * n + col) * elem;
                let d = target.element_index(row, col, k, n) * elem;
                match runs.last_mut() {
                    Some(run) if run.src + run.len == s && run.dst + run.len == d => {
                        run.len += elem;
                    }
                    _ => runs.push(CopyRun { src: s, dst: d, len: elem }),
                }
            }
        }

        let pads = target.padded_dims(k, n) != (k, n);
        Ok(Self {
            src,
            dst,
            runs,
            pads,
        })
    }

    /// Descriptor of one source matrix.
    pub fn src_desc(&self) -> &MemoryDesc {
        &self.src
    }

    /// Descriptor of one destination matrix.
    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst
    }

    /// Bytes read per matrix.
    pub fn src_matrix_bytes(&self) -> usize {
        self.src.matrix_size_bytes()
    }

    /// Bytes written per matrix, padding included.
    pub fn dst_matrix_bytes(&self) -> usize {
        self.dst.matrix_size_bytes()
    }

    /// Number of contiguous runs; 1 means a plain copy.
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    /// Converts a single matrix.
    ///
    /// `src` and `dst` may be longer than one matrix; only the leading
    /// matrix is touched.
    pub fn apply(&self, src: &[u8], dst: &mut [u8]) -> Result<(), TensorError> {
        self.apply_batched(src, dst, 1)
    }

    /// Converts `batch` consecutive matrices.
    pub fn apply_batched(&self, src: &[u8], dst: &mut [u8], batch: usize) -> Result<(), TensorError> {
        let src_step = self.src_matrix_bytes();
        let dst_step = self.dst_matrix_bytes();
        if src.len() < batch * src_step {
            return Err(TensorError::BufferSizeMismatch {
                expected: batch * src_step,
                actual: src.len(),
            });
        }
        if dst.len() < batch * dst_step {
            return Err(TensorError::BufferSizeMismatch {
                expected: batch * dst_step,
                actual: dst.len(),
            });
        }

        for b in 0..batch {
            let src = &src[b * src_step..(b + 1) * src_step];
            let dst = &mut dst[b * dst_step..(b + 1) * dst_step];
            if self.pads {
                dst.fill(0);
            }
            for run in &self.runs {
                dst[run.dst..run.dst + run.len].copy_from_slice(&src[run.src..run.src + run.len]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Memory, Shape};

    fn iota(k: usize, n: usize) -> Memory {
        let values: Vec<f32> = (0..k * n).map(|v| v as f32 + 1.0).collect();
        Memory::from_f32(Shape::matrix(k, n), &values).unwrap()
    }

    #[test]
    fn test_planar_to_planar_is_one_run() {
        let m = iota(3, 5);
        let plan = CopyPlan::new(m.desc(), Layout::Planar).unwrap();
        assert_eq!(plan.num_runs(), 1);

        let mut out = vec![0u8; plan.dst_matrix_bytes()];
        plan.apply(m.as_bytes(), &mut out).unwrap();
        assert_eq!(out, m.as_bytes());
    }

    #[test]
    fn test_blocked_runs_merge_per_block_row() {
        let m = iota(4, 8);
        let plan = CopyPlan::new(m.desc(), Layout::Blocked { n_block: 4, k_pack: 1 }).unwrap();
        // 4 rows x 2 column blocks, each a contiguous run of 4 elements.
        assert_eq!(plan.num_runs(), 8);
    }

    #[test]
    fn test_blocked_matches_element_index() {
        let (k, n) = (5, 7);
        let layout = Layout::Blocked { n_block: 4, k_pack: 2 };
        let m = iota(k, n);
        let plan = CopyPlan::new(m.desc(), layout).unwrap();

        let mut out = vec![0xAAu8; plan.dst_matrix_bytes()];
        plan.apply(m.as_bytes(), &mut out).unwrap();

        let src = m.to_f32_vec();
        for row in 0..k {
            for col in 0..n {
                let idx = layout.element_index(row, col, k, n);
                assert_eq!(crate::load_f32(&out, idx), src[row * n + col]);
            }
        }
        // Padding is zeroed: K 5 -> 6, N 7 -> 8 gives 48 slots for 35 values.
        let zeros = out.chunks_exact(4).filter(|c| c.iter().all(|&b| b == 0)).count();
        assert_eq!(zeros, 48 - 35);
    }

    #[test]
    fn test_batched() {
        let values: Vec<f32> = (0..2 * 2 * 3).map(|v| v as f32).collect();
        let m = Memory::from_f32(Shape::new(vec![2, 2, 3]), &values).unwrap();
        let layout = Layout::Blocked { n_block: 2, k_pack: 1 };
        let plan = CopyPlan::new(m.desc(), layout).unwrap();

        let mut out = vec![0u8; 2 * plan.dst_matrix_bytes()];
        plan.apply_batched(m.as_bytes(), &mut out, 2).unwrap();

        let second = &out[plan.dst_matrix_bytes()..];
        // Element (1, 2) of the second matrix is value 6 + 5 = 11.
        assert_eq!(crate::load_f32(second, layout.element_index(1, 2, 2, 3)), 11.0);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let m = iota(2, 2);
        let plan = CopyPlan::new(m.desc(), Layout::Blocked { n_block: 4, k_pack: 1 }).unwrap();
        let mut out = vec![0u8; 4];
        assert!(plan.apply(m.as_bytes(), &mut out).is_err());
        let mut out = vec![0u8; plan.dst_matrix_bytes()];
        assert!(plan.apply(&m.as_bytes()[..4], &mut out).is_err());
    }

    #[test]
    fn test_blocked_source_rejected() {
        let desc = MemoryDesc::new(
            Shape::matrix(2, 2),
            DType::F32,
            Layout::Blocked { n_block: 2, k_pack: 1 },
        );
        assert!(CopyPlan::new(&desc, Layout::Planar).is_err());
    }

    #[test]
    fn test_zero_block_rejected() {
        let desc = MemoryDesc::planar(Shape::matrix(4, 4), DType::F32);
        for target in [
            Layout::Blocked { n_block: 0, k_pack: 1 },
            Layout::Blocked { n_block: 4, k_pack: 0 },
        ] {
            assert!(matches!(
                CopyPlan::new(&desc, target),
                Err(TensorError::InvalidLayout { .. })
            ));
        }
    }
}

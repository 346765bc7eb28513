// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference matrix multiplication.

use crate::{load_f32, DType, Memory, TensorError};

/// Computes `output = lhs @ rhs` on `f32` memories.
///
/// `lhs` is `[..., M, K]` and must be planar. `rhs` is `[..., K, N]` in any
/// layout; its elements are addressed through the layout, so a blocked
/// right-hand operand gives the same result as its planar source. Batch
/// dimensions of `rhs` either match those of `lhs` or are absent, in which
/// case the single `rhs` matrix is reused for every batch. `output` must be
/// planar `[..., M, N]` with the batch dimensions of `lhs`.
///
/// This is the slow, obviously-correct path used to check compiled kernels.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible.
/// Returns [`TensorError::UnsupportedDType`] if any operand is not `F32`.
pub fn matmul(lhs: &Memory, rhs: &Memory, output: &mut Memory) -> Result<(), TensorError> {
    for m in [lhs.dtype(), rhs.dtype(), output.dtype()] {
        if m != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "matmul",
                dtype: m,
            });
        }
    }

    let expected = match lhs.shape().matmul_output(rhs.shape()) {
        Some(shape) if lhs.layout().is_planar() => shape,
        _ => {
            return Err(TensorError::ShapeMismatch {
                op: "matmul",
                lhs: lhs.shape().clone(),
                rhs: rhs.shape().clone(),
            })
        }
    };

    let (m, k) = lhs.desc().matrix_dims();
    let (_, n) = rhs.desc().matrix_dims();
    let batch = lhs.desc().batch();
    let rhs_batch = rhs.desc().batch();
    if rhs_batch != 1 && rhs_batch != batch {
        return Err(TensorError::ShapeMismatch {
            op: "matmul (batch)",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    if output.shape() != &expected || !output.layout().is_planar() {
        return Err(TensorError::ShapeMismatch {
            op: "matmul (output)",
            lhs: expected,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.as_bytes();
    let b = rhs.as_bytes();
    let rhs_layout = rhs.layout();
    let rhs_step = rhs.desc().matrix_size_bytes() / 4;
    let c = output.as_bytes_mut();

    for bi in 0..batch {
        let a_base = bi * m * k;
        let b_base = if rhs_batch == 1 { 0 } else { bi * rhs_step };
        let c_base = bi * m * n;
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f32;
                for p in 0..k {
                    let b_idx = b_base + rhs_layout.element_index(p, j, k, n);
                    acc += load_f32(a, a_base + i * k + p) * load_f32(b, b_idx);
                }
                crate::store_f32(c, c_base + i * n + j, acc);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CopyPlan, Layout, MemoryDesc, Shape};

    #[test]
    fn test_matmul_2x3_times_3x2() {
        // A = [[1, 2, 3], [4, 5, 6]]
        // B = [[7, 8], [9, 10], [11, 12]]
        // C = [[58, 64], [139, 154]]
        let a = Memory::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Memory::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let mut c = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::F32));

        matmul(&a, &b, &mut c).unwrap();

        assert_eq!(c.to_f32_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_blocked_rhs_matches_planar() {
        let a = Memory::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Memory::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();

        let layout = Layout::Blocked { n_block: 4, k_pack: 2 };
        let plan = CopyPlan::new(b.desc(), layout).unwrap();
        let mut blocked = Memory::zeros(b.desc().with_layout(layout));
        plan.apply(b.as_bytes(), blocked.as_bytes_mut()).unwrap();

        let mut c = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::F32));
        matmul(&a, &blocked, &mut c).unwrap();
        assert_eq!(c.to_f32_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_batched_shared_rhs() {
        let a = Memory::from_f32(Shape::new(vec![2, 1, 2]), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let eye = Memory::from_f32(Shape::matrix(2, 2), &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let mut c = Memory::zeros(MemoryDesc::planar(Shape::new(vec![2, 1, 2]), DType::F32));

        matmul(&a, &eye, &mut c).unwrap();
        assert_eq!(c.to_f32_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 3), DType::F32));
        let b = Memory::zeros(MemoryDesc::planar(Shape::matrix(4, 2), DType::F32));
        let mut c = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::F32));
        assert!(matmul(&a, &b, &mut c).is_err());
    }

    #[test]
    fn test_matmul_rejects_non_f32() {
        let a = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::BF16));
        let b = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::F32));
        let mut c = Memory::zeros(MemoryDesc::planar(Shape::matrix(2, 2), DType::F32));
        assert!(matches!(
            matmul(&a, &b, &mut c),
            Err(TensorError::UnsupportedDType { .. })
        ));
    }
}

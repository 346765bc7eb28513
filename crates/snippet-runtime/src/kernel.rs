// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiled-kernel boundary.
//!
//! A [`SnippetKernel`] is invoked once per work item with a freshly built
//! [`CallArgs`]: byte views of every input tile and output block, the
//! item's domain indexes and the calling lane's working memory.

use crate::{InternalError, RuntimeError};
use std::fmt;

/// Arguments of one kernel invocation.
#[derive(Debug)]
pub struct CallArgs<'a> {
    /// Domain index of the work item.
    pub indexes: &'a [usize],
    /// Input tiles, in the layout each port requires.
    pub src: Vec<&'a [u8]>,
    /// Output blocks.
    pub dst: Vec<&'a mut [u8]>,
    /// The lane's internal working buffer.
    pub scratch: &'a mut [u8],
    /// Lane id.
    pub thread: usize,
}

/// A compiled subgraph body.
pub trait SnippetKernel: Send + Sync {
    fn name(&self) -> &str;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    /// Processes one work item.
    fn call(&self, args: &mut CallArgs<'_>) -> Result<(), RuntimeError>;
}

impl fmt::Debug for dyn SnippetKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnippetKernel")
            .field("name", &self.name())
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .finish()
    }
}

/// Adapts a closure into a [`SnippetKernel`].
///
/// # Examples
/// ```
/// use snippet_runtime::{KernelFn, SnippetKernel};
/// let copy = KernelFn::new("copy", 1, 1, |args| {
///     let n = args.src[0].len();
///     args.dst[0][..n].copy_from_slice(args.src[0]);
///     Ok(())
/// });
/// assert_eq!(copy.num_inputs(), 1);
/// ```
pub struct KernelFn<F> {
    name: String,
    inputs: usize,
    outputs: usize,
    body: F,
}

impl<F> KernelFn<F>
where
    F: Fn(&mut CallArgs<'_>) -> Result<(), RuntimeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, inputs: usize, outputs: usize, body: F) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            body,
        }
    }
}

impl<F> SnippetKernel for KernelFn<F>
where
    F: Fn(&mut CallArgs<'_>) -> Result<(), RuntimeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        self.inputs
    }

    fn num_outputs(&self) -> usize {
        self.outputs
    }

    fn call(&self, args: &mut CallArgs<'_>) -> Result<(), RuntimeError> {
        (self.body)(args)
    }
}

pub mod reference {
    //! Reference kernels for tests, benchmarks and the CLI.

    use super::{CallArgs, SnippetKernel};
    use crate::{InternalError, RuntimeError};
    use snippet_ir::{PortDesc, SubgraphAttrs};
    use tensor_core::{load_f32, store_f32, DType, Layout};

    /// `C[M, N] = A[M, K] @ B[K, N]` per work item, with `B` in `layout`.
    ///
    /// One output row is accumulated in the lane's internal buffer, which
    /// must hold `n` floats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockedMatMul {
        pub m: usize,
        pub k: usize,
        pub n: usize,
        pub layout: Layout,
    }

    impl BlockedMatMul {
        pub fn new(m: usize, k: usize, n: usize, layout: Layout) -> Self {
            Self { m, k, n, layout }
        }

        /// Internal buffer bytes one lane needs.
        pub fn internal_buffer_size(&self) -> usize {
            self.n * DType::F32.size_bytes()
        }

        /// Attributes of a subgraph running this kernel over `batch`
        /// leading dims. `weight_batch` are the leading dims of `B`; empty
        /// shares one weight matrix across the batch.
        pub fn subgraph_attrs(&self, batch: &[usize], weight_batch: &[usize], constant_weights: bool) -> SubgraphAttrs {
            let dims = |lead: &[usize], rows: usize, cols: usize| {
                let mut d = lead.to_vec();
                d.extend([rows, cols]);
                d
            };
            let mut weights = PortDesc::new("b", dims(weight_batch, self.k, self.n), DType::F32).with_layout(self.layout);
            if constant_weights {
                weights = weights.constant();
            }
            SubgraphAttrs::new(
                "blocked_matmul",
                vec![PortDesc::new("a", dims(batch, self.m, self.k), DType::F32), weights],
                vec![PortDesc::new("c", dims(batch, self.m, self.n), DType::F32)],
            )
            .with_internal_buffer_size(self.internal_buffer_size())
        }

        fn require(what: &str, required: usize, actual: usize) -> Result<(), InternalError> {
            if actual < required {
                return Err(InternalError::UndersizedMemory {
                    what: what.to_string(),
                    required,
                    actual,
                });
            }
            Ok(())
        }
    }

    impl SnippetKernel for BlockedMatMul {
        fn name(&self) -> &str {
            "blocked_matmul"
        }

        fn num_inputs(&self) -> usize {
            2
        }

        fn num_outputs(&self) -> usize {
            1
        }

        fn call(&self, args: &mut CallArgs<'_>) -> Result<(), RuntimeError> {
            let (m, k, n) = (self.m, self.k, self.n);
            let (pk, pn) = self.layout.padded_dims(k, n);
            Self::require("lhs tile", m * k * 4, args.src[0].len())?;
            Self::require("rhs tile", pk * pn * 4, args.src[1].len())?;
            Self::require("output block", m * n * 4, args.dst[0].len())?;
            Self::require("internal buffer", n * 4, args.scratch.len())?;

            let (a, b) = (args.src[0], args.src[1]);
            let acc = &mut args.scratch[..n * 4];
            for i in 0..m {
                acc.fill(0);
                for p in 0..k {
                    let a_ip = load_f32(a, i * k + p);
                    for j in 0..n {
                        let idx = self.layout.element_index(p, j, k, n);
                        let sum = load_f32(acc, j) + a_ip * load_f32(b, idx);
                        store_f32(acc, j, sum);
                    }
                }
                args.dst[0][i * n * 4..(i + 1) * n * 4].copy_from_slice(acc);
            }
            Ok(())
        }
    }
}

/// Checks a kernel against the port counts of its attributes.
pub(crate) fn check_arity(kernel: &dyn SnippetKernel, inputs: usize, outputs: usize) -> Result<(), InternalError> {
    if kernel.num_inputs() != inputs {
        return Err(InternalError::ArityMismatch {
            kind: "input",
            expected: kernel.num_inputs(),
            actual: inputs,
        });
    }
    if kernel.num_outputs() != outputs {
        return Err(InternalError::ArityMismatch {
            kind: "output",
            expected: kernel.num_outputs(),
            actual: outputs,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::reference::BlockedMatMul;
    use super::*;
    use tensor_core::{CopyPlan, Layout, Memory, Shape};

    #[test]
    fn test_blocked_matmul_single_item() {
        let a = Memory::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Memory::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let layout = Layout::Blocked { n_block: 4, k_pack: 2 };
        let plan = CopyPlan::new(b.desc(), layout).unwrap();
        let mut packed = vec![0u8; plan.dst_matrix_bytes()];
        plan.apply(b.as_bytes(), &mut packed).unwrap();

        let kernel = BlockedMatMul::new(2, 3, 2, layout);
        let mut out = vec![0u8; 16];
        let mut scratch = vec![0u8; kernel.internal_buffer_size()];
        let mut args = CallArgs {
            indexes: &[],
            src: vec![a.as_bytes(), &packed[..]],
            dst: vec![&mut out[..]],
            scratch: &mut scratch,
            thread: 0,
        };
        kernel.call(&mut args).unwrap();
        let c: Vec<f32> = (0..4).map(|i| tensor_core::load_f32(&out, i)).collect();
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_blocked_matmul_needs_internal_buffer() {
        let kernel = BlockedMatMul::new(1, 1, 4, Layout::Planar);
        let src = [0u8; 16];
        let mut out = [0u8; 16];
        let mut args = CallArgs {
            indexes: &[],
            src: vec![&src[..], &src[..]],
            dst: vec![&mut out[..]],
            scratch: &mut [],
            thread: 0,
        };
        let err = kernel.call(&mut args).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("internal buffer"));
    }

    #[test]
    fn test_subgraph_attrs() {
        let layout = Layout::Blocked { n_block: 8, k_pack: 1 };
        let attrs = BlockedMatMul::new(4, 16, 8, layout).subgraph_attrs(&[3], &[], true);
        assert_eq!(attrs.inputs.len(), 2);
        assert!(attrs.inputs[1].constant);
        assert_eq!(attrs.inputs[1].layout, layout);
        assert_eq!(attrs.internal_buffer_size, 32);
        assert!(attrs.is_static());
    }

    #[test]
    fn test_kernel_fn_and_arity() {
        let k = KernelFn::new("noop", 2, 1, |_| Ok(()));
        assert_eq!(k.name(), "noop");
        assert!(check_arity(&k, 2, 1).is_ok());
        assert!(matches!(
            check_arity(&k, 3, 1),
            Err(InternalError::ArityMismatch { kind: "input", expected: 2, actual: 3 })
        ));
        assert!(check_arity(&k, 2, 2).is_err());
    }
}

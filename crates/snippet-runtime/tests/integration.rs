// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end subgraph execution.
//!
//! These tests drive the executor the way a graph runtime does: attributes
//! from the IR layer, scratch memory from the context pool, weights
//! prepared once, then repeated calls on a worker stream. Results are
//! checked against the reference matmul in `tensor-core`.

use proptest::prelude::*;
use snippet_ir::{PartialShape, PortDesc, SubgraphAttrs};
use snippet_runtime::reference::BlockedMatMul;
use snippet_runtime::{
    prepare_weights, ExecutionStream, ExecutorParams, GraphContext, InternalError, KernelFn, RepackStat,
    RepackingPolicy, RuntimeConfig, RuntimeError, ScratchLayout, SnippetKernel, SpecializationMode,
    SubgraphExecutor,
};
use std::sync::Arc;
use tensor_core::{matmul, DType, Layout, Memory, MemoryDesc, MemoryPtr, Shape};

// ── Helpers ────────────────────────────────────────────────────

const BLOCKED: Layout = Layout::Blocked { n_block: 8, k_pack: 2 };

fn config(policy: RepackingPolicy, threads: usize) -> RuntimeConfig {
    RuntimeConfig {
        num_threads: Some(threads),
        ..RuntimeConfig::new(policy)
    }
}

/// Small integers keep every product and sum exact in `f32`.
fn filled(dims: &[usize], seed: usize) -> Memory {
    let n: usize = dims.iter().product();
    let values: Vec<f32> = (0..n).map(|i| ((i * 7 + seed) % 11) as f32 - 5.0).collect();
    Memory::from_f32(Shape::new(dims.to_vec()), &values).unwrap()
}

fn with_matrix(lead: &[usize], rows: usize, cols: usize) -> Vec<usize> {
    let mut dims = lead.to_vec();
    dims.extend([rows, cols]);
    dims
}

fn expected(a: &Memory, b: &Memory) -> Vec<f32> {
    let (m, _) = a.desc().matrix_dims();
    let (_, n) = b.desc().matrix_dims();
    let lead = &a.shape().dims()[..a.shape().rank() - 2];
    let mut c = Memory::zeros(MemoryDesc::planar(Shape::new(with_matrix(lead, m, n)), DType::F32));
    matmul(a, b, &mut c).unwrap();
    c.to_f32_vec()
}

fn output_for(a: &Memory, n: usize) -> Vec<Memory> {
    let (m, _) = a.desc().matrix_dims();
    let lead = &a.shape().dims()[..a.shape().rank() - 2];
    vec![Memory::zeros(MemoryDesc::planar(Shape::new(with_matrix(lead, m, n)), DType::F32))]
}

struct MatMulCase {
    kernel: BlockedMatMul,
    batch: Vec<usize>,
    weight_batch: Vec<usize>,
}

impl MatMulCase {
    fn new(batch: &[usize], weight_batch: &[usize]) -> Self {
        Self {
            kernel: BlockedMatMul::new(3, 10, 12, BLOCKED),
            batch: batch.to_vec(),
            weight_batch: weight_batch.to_vec(),
        }
    }

    fn attrs(&self, constant: bool) -> SubgraphAttrs {
        self.kernel.subgraph_attrs(&self.batch, &self.weight_batch, constant)
    }

    fn lhs(&self, seed: usize) -> Memory {
        filled(&with_matrix(&self.batch, self.kernel.m, self.kernel.k), seed)
    }

    fn rhs(&self, seed: usize) -> Memory {
        filled(&with_matrix(&self.weight_batch, self.kernel.k, self.kernel.n), seed)
    }

    fn executor(&self, config: &RuntimeConfig, context: &GraphContext, constant: bool) -> SubgraphExecutor {
        let params = ExecutorParams::from_context(Arc::new(self.kernel), self.attrs(constant), config, context);
        SubgraphExecutor::new(params).unwrap()
    }
}

// ── Correctness ────────────────────────────────────────────────

#[test]
fn test_in_parallel_matches_reference() {
    let case = MatMulCase::new(&[6], &[6]);
    let cfg = config(RepackingPolicy::InParallel, 3);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = case.executor(&cfg, &ctx, false);

    let (a, b) = (case.lhs(1), case.rhs(2));
    let mut out = output_for(&a, case.kernel.n);
    let call = exec
        .execute(&stream, &[a.clone().into_ptr(), b.clone().into_ptr()], &mut out)
        .unwrap();

    assert_eq!(out[0].to_f32_vec(), expected(&a, &b));
    assert_eq!(call.kernel_invocations, 6);
    assert_eq!(call.lanes, 3);
    assert_eq!(call.repack_copies, 6);
}

#[test]
fn test_separate_matches_reference() {
    let case = MatMulCase::new(&[2, 3], &[3]);
    let cfg = config(RepackingPolicy::Separate, 4);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = case.executor(&cfg, &ctx, false);

    // Weights [3, K, N] broadcast over the leading batch dim of 2.
    let (a, b) = (case.lhs(3), case.rhs(4));
    let mut out = output_for(&a, case.kernel.n);
    let call = exec
        .execute(&stream, &[a.clone().into_ptr(), b.clone().into_ptr()], &mut out)
        .unwrap();

    let mut want = Vec::new();
    for batch in 0..2 {
        let rows = case.kernel.m * case.kernel.k;
        let values = &a.to_f32_vec()[batch * 3 * rows..(batch + 1) * 3 * rows];
        let slice = Memory::from_f32(Shape::new(vec![3, case.kernel.m, case.kernel.k]), values).unwrap();
        want.extend(expected(&slice, &b));
    }
    assert_eq!(out[0].to_f32_vec(), want);
    assert_eq!(call.kernel_invocations, 6);
    // The whole tensor is converted once, before dispatch.
    assert_eq!(call.repack_copies, 1);
}

#[test]
fn test_single_lane_runs_inline() {
    let case = MatMulCase::new(&[], &[]);
    let cfg = config(RepackingPolicy::InParallel, 4);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::new(1).unwrap();
    let mut exec = case.executor(&cfg, &ctx, false);

    let (a, b) = (case.lhs(5), case.rhs(6));
    let mut out = output_for(&a, case.kernel.n);
    let call = exec.execute(&stream, &[a.clone().into_ptr(), b.clone().into_ptr()], &mut out).unwrap();
    assert_eq!(call.lanes, 1);
    assert_eq!(out[0].to_f32_vec(), expected(&a, &b));
}

// ── Skip-if-unchanged ──────────────────────────────────────────

#[test]
fn test_second_call_performs_no_repacks() {
    for policy in [RepackingPolicy::InParallel, RepackingPolicy::Separate] {
        // Shared weights: every lane converts the same source tile.
        let case = MatMulCase::new(&[8], &[]);
        let cfg = config(policy, 4);
        let ctx = GraphContext::from_config(&cfg).unwrap();
        let stream = ExecutionStream::from_config(&cfg).unwrap();
        let mut exec = case.executor(&cfg, &ctx, false);

        let inputs = [case.lhs(1).into_ptr(), case.rhs(2).into_ptr()];
        let mut out = output_for(&inputs[0], case.kernel.n);
        let first = exec.execute(&stream, &inputs, &mut out).unwrap();
        let result = out[0].to_f32_vec();
        let second = exec.execute(&stream, &inputs, &mut out).unwrap();

        assert!(first.repack_copies > 0, "{policy}");
        assert_eq!(second.repack_copies, 0, "{policy}");
        assert!(second.repack_skips > 0, "{policy}");
        assert_eq!(out[0].to_f32_vec(), result, "{policy}");
    }
}

#[test]
fn test_changed_input_repacks_only_that_input() {
    let blocked = Layout::Blocked { n_block: 4, k_pack: 1 };
    let attrs = SubgraphAttrs::new(
        "pair",
        vec![
            PortDesc::new("x", vec![2usize, 4, 4], DType::F32).with_layout(blocked),
            PortDesc::new("y", vec![2usize, 4, 4], DType::F32).with_layout(blocked),
        ],
        vec![PortDesc::new("z", vec![2usize, 4, 4], DType::F32)],
    );
    let add: Arc<dyn SnippetKernel> = Arc::new(KernelFn::new("add", 2, 1, |args| {
        for (i, out) in args.dst[0].chunks_exact_mut(4).enumerate() {
            let sum = tensor_core::load_f32(args.src[0], i) + tensor_core::load_f32(args.src[1], i);
            out.copy_from_slice(&sum.to_ne_bytes());
        }
        Ok(())
    }));

    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = SubgraphExecutor::new(ExecutorParams::from_context(add, attrs, &cfg, &ctx)).unwrap();

    let x = filled(&[2, 4, 4], 0).into_ptr();
    let mut y = filled(&[2, 4, 4], 1).into_ptr();
    let mut out = vec![Memory::zeros(MemoryDesc::planar(Shape::new(vec![2, 4, 4]), DType::F32))];

    exec.execute(&stream, &[x.clone(), y.clone()], &mut out).unwrap();
    assert_eq!((exec.repack_copies(0), exec.repack_copies(1)), (2, 2));

    // Same handle, new contents: the version bump invalidates the cache.
    tensor_core::store_f32(Arc::get_mut(&mut y).unwrap().as_bytes_mut(), 0, 100.0);
    let call = exec.execute(&stream, &[x.clone(), y.clone()], &mut out).unwrap();
    assert_eq!(call.repack_copies, 2);
    assert_eq!((exec.repack_copies(0), exec.repack_copies(1)), (2, 4));

    // Each lane owns one item: on the second call every lane skips x and
    // copies y again, and no other (lane, input) cell moves.
    let cell = |thread, input, copies, skips| RepackStat {
        thread,
        input,
        copies,
        skips,
    };
    assert_eq!(
        exec.repack_stats(),
        vec![cell(0, 0, 1, 1), cell(0, 1, 2, 0), cell(1, 0, 1, 1), cell(1, 1, 2, 0)]
    );

    // Blocked 4x4 with n_block 4 is the planar order, so the sum is elementwise.
    assert_eq!(out[0].to_f32_vec()[0], x.to_f32_vec()[0] + 100.0);
}

// ── Constant weights ───────────────────────────────────────────

#[test]
fn test_prepared_weights_execute_without_runtime_repacks() {
    let case = MatMulCase::new(&[4], &[]);
    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = case.executor(&cfg, &ctx, true);
    assert!(exec.repacked_inputs().unwrap().is_empty());

    let (a, b) = (case.lhs(7), case.rhs(8));
    let raw: Vec<MemoryPtr> = vec![a.clone().into_ptr(), b.clone().into_ptr()];
    let constants = exec.constant_inputs().unwrap().clone();
    let prepared = prepare_weights(&raw, &constants, &ctx).unwrap();
    let again = prepare_weights(&raw, &constants, &ctx).unwrap();
    assert!(Arc::ptr_eq(&prepared[1], &again[1]));
    assert_eq!(prepared[1].as_bytes(), again[1].as_bytes());
    assert_eq!(prepared[1].layout(), BLOCKED);

    let mut out = output_for(&a, case.kernel.n);
    let call = exec.execute(&stream, &prepared, &mut out).unwrap();
    assert_eq!(call.repack_copies, 0);
    assert_eq!(exec.total_repack_copies(), 0);
    assert_eq!(out[0].to_f32_vec(), expected(&a, &b));
}

#[test]
fn test_unprepared_constant_is_fatal() {
    let case = MatMulCase::new(&[2], &[]);
    let cfg = config(RepackingPolicy::InParallel, 1);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = case.executor(&cfg, &ctx, true);

    let a = case.lhs(0);
    let mut out = output_for(&a, case.kernel.n);
    let err = exec
        .execute(&stream, &[a.into_ptr(), case.rhs(0).into_ptr()], &mut out)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        RuntimeError::Fatal(InternalError::UnpreparedConstant { input: 1, .. })
    ));
}

// ── Configuration errors ───────────────────────────────────────

#[test]
fn test_policy_none_with_runtime_repack_is_malformed() {
    let case = MatMulCase::new(&[2], &[]);
    let cfg = config(RepackingPolicy::None, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let params = ExecutorParams::from_context(Arc::new(case.kernel), case.attrs(false), &cfg, &ctx);
    let err = SubgraphExecutor::new(params).unwrap_err();
    assert!(matches!(err, RuntimeError::Fatal(InternalError::MalformedConfig(_))));

    // Constant weights need no runtime repacking.
    let params = ExecutorParams::from_context(Arc::new(case.kernel), case.attrs(true), &cfg, &ctx);
    assert!(SubgraphExecutor::new(params).is_ok());
}

#[test]
fn test_static_mode_over_dynamic_shapes_is_fatal() {
    let case = MatMulCase::new(&[2], &[]);
    let mut attrs = case.attrs(false);
    attrs.inputs[0].shape = PartialShape::new(vec![None, Some(3), Some(10)]);
    let cfg = RuntimeConfig {
        specialization: Some(SpecializationMode::Static),
        ..config(RepackingPolicy::InParallel, 1)
    };
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let params = ExecutorParams::from_context(Arc::new(case.kernel), attrs, &cfg, &ctx);
    assert!(SubgraphExecutor::new(params).unwrap_err().is_fatal());
}

#[test]
fn test_scratch_slot_for_absent_input_is_fatal() {
    let case = MatMulCase::new(&[2], &[]);
    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let exec = case.executor(&cfg, &ctx, false);

    let layout = exec.scratch_layout().unwrap();
    assert!(layout.slot_offset(1, 1).is_ok());
    let err = layout.slot_offset(0, 0).unwrap_err();
    assert_eq!(err.to_string(), "scratch pointer not found for input 0");
    let err: RuntimeError = err.into();
    assert!(err.is_fatal());
}

#[test]
fn test_wrong_arity_is_fatal() {
    let case = MatMulCase::new(&[2], &[]);
    let cfg = config(RepackingPolicy::InParallel, 1);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let mut exec = case.executor(&cfg, &ctx, false);

    let a = case.lhs(0);
    let mut out = output_for(&a, case.kernel.n);
    let err = exec.execute(&stream, &[a.into_ptr()], &mut out).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Fatal(InternalError::ArityMismatch { kind: "input", expected: 2, actual: 1 })
    ));
}

// ── Dynamic shapes ─────────────────────────────────────────────

#[test]
fn test_dynamic_shape_change_recomputes_layout() {
    let case = MatMulCase::new(&[2], &[]);
    let mut attrs = case.attrs(false);
    attrs.inputs[0].shape = PartialShape::new(vec![None, Some(3), Some(10)]);
    attrs.outputs[0].shape = PartialShape::new(vec![None, Some(3), Some(12)]);

    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();
    let stream = ExecutionStream::from_config(&cfg).unwrap();
    let params = ExecutorParams::from_context(Arc::new(case.kernel), attrs, &cfg, &ctx);
    let mut exec = SubgraphExecutor::new(params).unwrap();
    assert_eq!(exec.mode(), SpecializationMode::DynamicSpecialized);

    let b = case.rhs(9).into_ptr();
    let a2 = case.lhs(1);
    let mut out2 = output_for(&a2, case.kernel.n);
    let first = exec.execute(&stream, &[a2.clone().into_ptr(), b.clone()], &mut out2).unwrap();
    let repeat = exec.execute(&stream, &[a2.clone().into_ptr(), b.clone()], &mut out2).unwrap();
    assert_eq!(first.repack_copies, 2);
    assert_eq!(repeat.repack_copies, 0);
    assert_eq!(exec.domain().unwrap().dims(), &[2]);

    // Same weight handle, new batch: the cached conversions belong to the
    // old layout and are not reused.
    let a4 = filled(&[4, 3, 10], 2);
    let mut out4 = output_for(&a4, case.kernel.n);
    let changed = exec.execute(&stream, &[a4.clone().into_ptr(), b.clone()], &mut out4).unwrap();
    assert_eq!(changed.repack_copies, 2);
    assert_eq!(changed.work_amount, 4);
    assert_eq!(exec.domain().unwrap().dims(), &[4]);
    assert_eq!(exec.metrics().layout_builds, 2);
    assert_eq!(out4[0].to_f32_vec(), expected(&a4, &b));
}

// ── Resources ──────────────────────────────────────────────────

#[test]
fn test_scratch_returns_to_pool_on_drop() {
    let case = MatMulCase::new(&[4], &[4]);
    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();

    let exec = case.executor(&cfg, &ctx, false);
    let layout = exec.scratch_layout().unwrap();
    // Two lanes, one blocked [10 -> 10, 12 -> 16] matrix each, plus two row accumulators.
    assert_eq!(layout.repacked_region_size(), 2 * 10 * 16 * 4);
    assert_eq!(layout.internal_size(), 2 * 12 * 4);
    assert_eq!(ctx.pool().allocated_bytes(), exec.scratch_size());
    assert!(exec.scratch_size() >= layout.total_size());

    drop(exec);
    assert_eq!(ctx.pool().allocated_bytes(), 0);
}

#[test]
fn test_executors_share_repack_routines() {
    let case = MatMulCase::new(&[4], &[]);
    let cfg = config(RepackingPolicy::InParallel, 2);
    let ctx = GraphContext::from_config(&cfg).unwrap();

    let _first = case.executor(&cfg, &ctx, false);
    let _second = case.executor(&cfg, &ctx, false);
    assert_eq!(ctx.kernel_cache().len(), 1);
    assert_eq!(ctx.kernel_cache().misses(), 1);
    assert!(ctx.kernel_cache().hits() >= 1);
}

// ── Properties ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn test_scratch_slots_tile_each_input_region(
        nthreads in 1usize..8,
        internal in 0usize..64,
        sizes in proptest::collection::vec(0usize..256, 0..5),
    ) {
        let slots: Vec<(usize, usize)> = sizes.iter().enumerate().map(|(i, &s)| (i * 2, s)).collect();
        let layout = ScratchLayout::from_slot_sizes(nthreads, internal, &slots).unwrap();

        let mut cursor = layout.internal_size();
        for &(input, size) in &slots {
            prop_assert_eq!(layout.region_offset(input).unwrap() + layout.internal_size(), cursor);
            for t in 0..nthreads {
                prop_assert_eq!(layout.slot_offset(t, input).unwrap(), cursor + t * size);
            }
            cursor += nthreads * size;
        }
        prop_assert_eq!(cursor, layout.total_size());
        prop_assert_eq!(layout.repacked_region_size(), sizes.iter().sum::<usize>() * nthreads);

        let mut buf = vec![0u8; layout.total_size()];
        let lanes = layout.partition(&mut buf).unwrap();
        prop_assert_eq!(lanes.len(), nthreads);
        for lane in &lanes {
            prop_assert_eq!(lane.internal.len(), internal);
            let lens: Vec<usize> = lane.slots.iter().map(|s| s.len()).collect();
            prop_assert_eq!(&lens, &sizes);
        }
    }

    #[test]
    fn test_in_parallel_matches_reference_for_any_split(batch in 1usize..7, threads in 1usize..5) {
        let case = MatMulCase::new(&[batch], &[batch]);
        let cfg = config(RepackingPolicy::InParallel, threads);
        let ctx = GraphContext::from_config(&cfg).unwrap();
        let stream = ExecutionStream::from_config(&cfg).unwrap();
        let mut exec = case.executor(&cfg, &ctx, false);

        let (a, b) = (case.lhs(batch), case.rhs(threads));
        let mut out = output_for(&a, case.kernel.n);
        let call = exec.execute(&stream, &[a.clone().into_ptr(), b.clone().into_ptr()], &mut out).unwrap();
        prop_assert_eq!(call.kernel_invocations as usize, batch);
        prop_assert_eq!(call.lanes, batch.min(threads));
        prop_assert_eq!(out[0].to_f32_vec(), expected(&a, &b));
    }
}

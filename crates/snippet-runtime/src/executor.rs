// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The subgraph executor.
//!
//! [`SubgraphExecutor`] runs a compiled [`SnippetKernel`] over the parallel
//! domain of its master output. Each call:
//!
//! 1. resolves the shapes it runs with (see [`ShapeResolver`]) and rebuilds
//!    its layout when they changed;
//! 2. validates the memories against that layout;
//! 3. under [`RepackingPolicy::Separate`], converts every repacked input
//!    once into lane 0's scratch slot;
//! 4. splits the work items, the scratch buffer and the outputs into
//!    disjoint per-lane views and runs the lanes on the stream. Under
//!    [`RepackingPolicy::InParallel`] each lane converts the tiles its items
//!    read into its own slots first.
//!
//! Lanes never share mutable state: each one receives its repack cache,
//! its scratch views and its output chunks by `&mut`.

use crate::domain::ExecDomain;
use crate::kernel::{check_arity, CallArgs, SnippetKernel};
use crate::kernel_cache::KernelCache;
use crate::metrics::{CallMetrics, ExecutionMetrics};
use crate::repack::{repack_if_changed, RepackCache, RepackStat, SourceKey};
use crate::repacked_input::RepackedInputConfig;
use crate::scratchpad::{ScratchLayout, ThreadScratch};
use crate::specialization::{resolver_for, ShapeResolver, ShapeSet, SpecializationMode};
use crate::weights::GraphContext;
use crate::{ExecutionStream, InternalError, RepackingPolicy, RuntimeConfig, RuntimeError};
use memory_manager::{BufferGuard, ScratchpadAllocator};
use rayon::prelude::*;
use snippet_ir::SubgraphAttrs;
use std::ops::Range;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tensor_core::{Memory, MemoryDesc, MemoryPtr};

/// Everything an executor is built from.
pub struct ExecutorParams {
    pub kernel: Arc<dyn SnippetKernel>,
    pub attrs: SubgraphAttrs,
    /// Worker lanes per call.
    pub nthreads: usize,
    pub repacking: RepackingPolicy,
    pub mode: SpecializationMode,
    /// Byte offset of each input's data inside its memory; empty means 0.
    pub start_offset_in: Vec<usize>,
    /// Byte offset of each output's data inside its memory; empty means 0.
    pub start_offset_out: Vec<usize>,
    pub allocator: Arc<dyn ScratchpadAllocator>,
    pub kernel_cache: Weak<KernelCache>,
    pub profiling: bool,
}

impl ExecutorParams {
    /// Single-lane parameters; the mode follows the attribute shapes.
    pub fn new(
        kernel: Arc<dyn SnippetKernel>,
        attrs: SubgraphAttrs,
        repacking: RepackingPolicy,
        allocator: Arc<dyn ScratchpadAllocator>,
    ) -> Self {
        let mode = if attrs.is_static() {
            SpecializationMode::Static
        } else {
            SpecializationMode::DynamicSpecialized
        };
        Self {
            kernel,
            attrs,
            nthreads: 1,
            repacking,
            mode,
            start_offset_in: Vec::new(),
            start_offset_out: Vec::new(),
            allocator,
            kernel_cache: Weak::new(),
            profiling: true,
        }
    }

    /// Parameters drawing their resources from a graph context.
    pub fn from_context(
        kernel: Arc<dyn SnippetKernel>,
        attrs: SubgraphAttrs,
        config: &RuntimeConfig,
        context: &GraphContext,
    ) -> Self {
        let mode = config.resolve_mode(&attrs);
        Self::new(kernel, attrs, config.repacking, context.allocator())
            .with_threads(config.resolve_threads())
            .with_mode(mode)
            .with_kernel_cache(context.kernel_cache())
            .with_profiling(config.enable_profiling)
    }

    pub fn with_threads(mut self, nthreads: usize) -> Self {
        self.nthreads = nthreads;
        self
    }

    pub fn with_mode(mut self, mode: SpecializationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_kernel_cache(mut self, cache: &Arc<KernelCache>) -> Self {
        self.kernel_cache = Arc::downgrade(cache);
        self
    }

    pub fn with_start_offsets(mut self, inputs: Vec<usize>, outputs: Vec<usize>) -> Self {
        self.start_offset_in = inputs;
        self.start_offset_out = outputs;
        self
    }

    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }
}

/// Layout of one set of concrete shapes.
#[derive(Debug)]
struct PreparedLayout {
    shapes: ShapeSet,
    domain: ExecDomain,
    repacked: RepackedInputConfig,
    constants: RepackedInputConfig,
    scratch: ScratchLayout,
    /// What each memory handle must look like.
    input_descs: Vec<MemoryDesc>,
    output_descs: Vec<MemoryDesc>,
}

impl PreparedLayout {
    fn build(
        attrs: &SubgraphAttrs,
        shapes: ShapeSet,
        nthreads: usize,
        policy: RepackingPolicy,
        kernel_cache: &Weak<KernelCache>,
    ) -> Result<Self, RuntimeError> {
        let (repacked, constants) = RepackedInputConfig::split_for(attrs, &shapes.inputs, kernel_cache)?;

        let mut input_descs = Vec::with_capacity(attrs.inputs.len());
        // Descriptors the kernel's views are cut from.
        let mut view_descs = Vec::with_capacity(attrs.inputs.len());
        for (i, (port, shape)) in attrs.inputs.iter().zip(&shapes.inputs).enumerate() {
            let planar = MemoryDesc::planar(shape.clone(), port.dtype);
            if let Some(constant) = constants.get(i) {
                input_descs.push(constant.tensor_desc().clone());
                view_descs.push(constant.tensor_desc().clone());
            } else if let Some(entry) = repacked.get(i) {
                let view = match policy {
                    RepackingPolicy::Separate => entry.tensor_desc().clone(),
                    _ => planar.clone(),
                };
                input_descs.push(planar);
                view_descs.push(view);
            } else {
                input_descs.push(planar.clone());
                view_descs.push(planar);
            }
        }
        let output_descs: Vec<MemoryDesc> = attrs
            .outputs
            .iter()
            .zip(&shapes.outputs)
            .map(|(port, shape)| MemoryDesc::planar(shape.clone(), port.dtype))
            .collect();

        let domain = ExecDomain::new(&view_descs, &output_descs, attrs.tile_rank)?;
        let scratch = ScratchLayout::new(&repacked, nthreads, attrs.internal_buffer_size, policy)?;
        Ok(Self {
            shapes,
            domain,
            repacked,
            constants,
            scratch,
            input_descs,
            output_descs,
        })
    }

    fn validate(
        &self,
        offsets_in: &[usize],
        offsets_out: &[usize],
        inputs: &[MemoryPtr],
        outputs: &[Memory],
    ) -> Result<(), InternalError> {
        for (i, (memory, expected)) in inputs.iter().zip(&self.input_descs).enumerate() {
            if self.constants.contains(i) && memory.layout() != expected.layout() {
                return Err(InternalError::UnpreparedConstant {
                    input: i,
                    expected: expected.layout(),
                });
            }
            check_memory(&format!("input {i}"), memory, expected, offsets_in[i])?;
        }
        for (o, (memory, expected)) in outputs.iter().zip(&self.output_descs).enumerate() {
            check_memory(&format!("output {o}"), memory, expected, offsets_out[o])?;
        }
        Ok(())
    }
}

fn check_memory(port: &str, memory: &Memory, expected: &MemoryDesc, offset: usize) -> Result<(), InternalError> {
    if memory.layout() != expected.layout() || memory.dtype() != expected.dtype() {
        return Err(InternalError::ShapeMismatch {
            port: port.to_string(),
            detail: format!("expected {expected}, got {}", memory.desc()),
        });
    }
    let required = offset
        .checked_add(expected.size_bytes())
        .ok_or_else(|| InternalError::MalformedConfig(format!("{port} start offset {offset} overflows the address space")))?;
    if memory.size_bytes() < required {
        return Err(InternalError::UndersizedMemory {
            what: port.to_string(),
            required,
            actual: memory.size_bytes(),
        });
    }
    Ok(())
}

/// Read-only state shared by every lane of a call.
struct LaneContext<'a> {
    kernel: &'a dyn SnippetKernel,
    layout: &'a PreparedLayout,
    policy: RepackingPolicy,
    memories: &'a [MemoryPtr],
    /// Input bytes from each start offset on.
    inputs: Vec<&'a [u8]>,
    offsets_in: &'a [usize],
    /// Repacked region under the serial policy.
    shared: &'a [u8],
}

/// One lane's work and its exclusive views.
struct Lane<'a> {
    ithr: usize,
    items: Range<usize>,
    cache: &'a mut RepackCache,
    scratch: ThreadScratch<'a>,
    outputs: Vec<&'a mut [u8]>,
}

#[derive(Debug, Default)]
struct LaneStats {
    kernel_invocations: u64,
    repack_copies: u64,
    repack_skips: u64,
    repack_duration: Duration,
}

fn run_lane(ctx: &LaneContext<'_>, lane: Lane<'_>) -> Result<LaneStats, RuntimeError> {
    let Lane {
        ithr,
        items,
        cache,
        mut scratch,
        mut outputs,
    } = lane;
    let domain = &ctx.layout.domain;
    let mut stats = LaneStats::default();
    let mut indexes = vec![0; domain.rank()];

    for item in items.clone() {
        domain.unravel(item, &mut indexes);

        if ctx.policy == RepackingPolicy::InParallel {
            let started = Instant::now();
            for (pos, (index, entry)) in ctx.layout.repacked.iter().enumerate() {
                let offset = domain.input_offset(index, &indexes);
                let src = &ctx.inputs[index][offset..offset + entry.src_tile_bytes()];
                let key = SourceKey::new(&ctx.memories[index], ctx.offsets_in[index] + offset);
                let slot = scratch
                    .slots
                    .get_mut(pos)
                    .ok_or(InternalError::ScratchSlotNotFound { input: index })?;
                if repack_if_changed(entry, entry.tile_matrices(), src, slot, key, cache, pos)? {
                    stats.repack_copies += 1;
                    tracing::trace!(thread = ithr, input = index, item, offset, "tile repacked");
                } else {
                    stats.repack_skips += 1;
                    tracing::trace!(thread = ithr, input = index, item, "tile unchanged, repack skipped");
                }
            }
            stats.repack_duration += started.elapsed();
        }

        let mut src: Vec<&[u8]> = Vec::with_capacity(ctx.inputs.len());
        for (i, bytes) in ctx.inputs.iter().enumerate() {
            let view: &[u8] = if ctx.layout.repacked.contains(i) {
                match ctx.policy {
                    RepackingPolicy::Separate => {
                        let start = ctx.layout.scratch.region_offset(i)? + domain.input_offset(i, &indexes);
                        &ctx.shared[start..start + domain.input_tile_bytes(i)]
                    }
                    _ => &*scratch.slots[ctx.layout.scratch.position(i)?],
                }
            } else {
                let start = domain.input_offset(i, &indexes);
                &bytes[start..start + domain.input_tile_bytes(i)]
            };
            src.push(view);
        }

        let local = item - items.start;
        let dst: Vec<&mut [u8]> = outputs
            .iter_mut()
            .enumerate()
            .map(|(o, block)| {
                let size = domain.output_block_bytes(o);
                &mut block[local * size..(local + 1) * size]
            })
            .collect();

        let mut args = CallArgs {
            indexes: &indexes,
            src,
            dst,
            scratch: &mut *scratch.internal,
            thread: ithr,
        };
        ctx.kernel.call(&mut args)?;
        stats.kernel_invocations += 1;
    }
    Ok(stats)
}

/// Executes one compiled subgraph.
pub struct SubgraphExecutor {
    kernel: Arc<dyn SnippetKernel>,
    attrs: SubgraphAttrs,
    nthreads: usize,
    repacking: RepackingPolicy,
    resolver: Box<dyn ShapeResolver>,
    start_offset_in: Vec<usize>,
    start_offset_out: Vec<usize>,
    allocator: Arc<dyn ScratchpadAllocator>,
    kernel_cache: Weak<KernelCache>,
    layout: Option<PreparedLayout>,
    scratch: Option<BufferGuard>,
    caches: Vec<RepackCache>,
    metrics: ExecutionMetrics,
}

fn start_offsets(kind: &'static str, offsets: Vec<usize>, ports: usize) -> Result<Vec<usize>, InternalError> {
    if offsets.is_empty() {
        return Ok(vec![0; ports]);
    }
    if offsets.len() != ports {
        return Err(InternalError::ArityMismatch {
            kind,
            expected: ports,
            actual: offsets.len(),
        });
    }
    Ok(offsets)
}

impl SubgraphExecutor {
    /// Builds an executor.
    ///
    /// With static shapes the layout and scratch buffer are set up here;
    /// otherwise on the first call.
    ///
    /// # Errors
    /// Fails with a fatal error if the kernel arity disagrees with the
    /// attributes, `nthreads` is 0, start offsets have the wrong length,
    /// a non-constant input needs repacking under [`RepackingPolicy::None`],
    /// a blocked port is tiled with rank below 2, or the scratch buffer
    /// cannot be allocated.
    pub fn new(params: ExecutorParams) -> Result<Self, RuntimeError> {
        let ExecutorParams {
            kernel,
            attrs,
            nthreads,
            repacking,
            mode,
            start_offset_in,
            start_offset_out,
            allocator,
            kernel_cache,
            profiling,
        } = params;

        check_arity(kernel.as_ref(), attrs.inputs.len(), attrs.outputs.len())?;
        if nthreads == 0 {
            return Err(InternalError::MalformedConfig("nthreads must be at least 1".into()).into());
        }
        let start_offset_in = start_offsets("input offset", start_offset_in, attrs.inputs.len())?;
        let start_offset_out = start_offsets("output offset", start_offset_out, attrs.outputs.len())?;

        if repacking == RepackingPolicy::None {
            if let Some((index, port)) = attrs.repacked_inputs().find(|(_, port)| !port.constant) {
                return Err(InternalError::MalformedConfig(format!(
                    "input {index} ('{}') needs layout {} but the repacking policy is none",
                    port.name, port.layout
                ))
                .into());
            }
        }
        if attrs.tile_rank < 2 && attrs.requires_repacking() {
            return Err(InternalError::MalformedConfig(format!(
                "blocked inputs need a tile rank of at least 2, got {}",
                attrs.tile_rank
            ))
            .into());
        }

        let mut executor = Self {
            kernel,
            attrs,
            nthreads,
            repacking,
            resolver: resolver_for(mode),
            start_offset_in,
            start_offset_out,
            allocator,
            kernel_cache,
            layout: None,
            scratch: None,
            caches: vec![RepackCache::default(); nthreads],
            metrics: ExecutionMetrics::new(profiling),
        };
        if let Some(shapes) = executor.resolver.initial(&executor.attrs)? {
            executor.install_layout(shapes)?;
        }

        tracing::info!(
            subgraph = %executor.attrs.name,
            kernel = executor.kernel.name(),
            nthreads,
            policy = %repacking,
            %mode,
            scratch_bytes = executor.scratch_size(),
            "subgraph executor ready"
        );
        Ok(executor)
    }

    fn install_layout(&mut self, shapes: ShapeSet) -> Result<(), RuntimeError> {
        let layout = PreparedLayout::build(&self.attrs, shapes, self.nthreads, self.repacking, &self.kernel_cache)?;
        self.ensure_scratch(layout.scratch.total_size())?;
        for cache in &mut self.caches {
            cache.resize(layout.repacked.len());
        }
        tracing::debug!(
            subgraph = %self.attrs.name,
            domain = ?layout.domain.dims(),
            repacked = ?layout.repacked.indices(),
            constants = ?layout.constants.indices(),
            scratch_bytes = layout.scratch.total_size(),
            "layout built"
        );
        self.metrics.record_layout_build();
        self.layout = Some(layout);
        Ok(())
    }

    /// Grows the scratch allocation to at least `size` bytes.
    fn ensure_scratch(&mut self, size: usize) -> Result<(), RuntimeError> {
        let current = self.scratch.as_ref().map_or(0, BufferGuard::size_bytes);
        if size <= current {
            return Ok(());
        }
        // Hand the old buffer back before asking for a bigger one.
        self.scratch = None;
        self.scratch = Some(self.allocator.allocate_scratchpad(size)?);
        Ok(())
    }

    /// Runs the subgraph on `inputs`, writing `outputs`.
    ///
    /// Constant inputs must have gone through
    /// [`prepare_weights`](crate::prepare_weights). Fatal errors are logged
    /// before being returned.
    pub fn execute(
        &mut self,
        stream: &ExecutionStream,
        inputs: &[MemoryPtr],
        outputs: &mut [Memory],
    ) -> Result<CallMetrics, RuntimeError> {
        let result = self.execute_inner(stream, inputs, outputs);
        if let Err(err) = &result {
            if err.is_fatal() {
                tracing::error!(subgraph = %self.attrs.name, error = %err, "subgraph execution failed");
            }
        }
        result
    }

    fn execute_inner(
        &mut self,
        stream: &ExecutionStream,
        inputs: &[MemoryPtr],
        outputs: &mut [Memory],
    ) -> Result<CallMetrics, RuntimeError> {
        let started = Instant::now();
        check_arity(self.kernel.as_ref(), inputs.len(), outputs.len())?;

        let current = self.layout.as_ref().map(|l| &l.shapes);
        if let Some(shapes) = self.resolver.resolve(&self.attrs, current, inputs, outputs)? {
            tracing::info!(
                subgraph = %self.attrs.name,
                inputs = ?shapes.inputs,
                outputs = ?shapes.outputs,
                "shapes changed, rebuilding layout"
            );
            self.install_layout(shapes)?;
        }

        let Self {
            kernel,
            attrs,
            nthreads,
            repacking,
            start_offset_in,
            start_offset_out,
            layout,
            scratch,
            caches,
            metrics,
            ..
        } = self;
        let layout = layout
            .as_ref()
            .ok_or_else(|| InternalError::MalformedConfig("executor has no layout".into()))?;
        layout.validate(start_offset_in, start_offset_out, inputs, outputs)?;

        let work_amount = layout.domain.work_amount();
        let mut call = CallMetrics {
            work_amount,
            ..CallMetrics::default()
        };
        if work_amount == 0 {
            call.total_duration = started.elapsed();
            metrics.record_call(call.clone());
            return Ok(call);
        }

        let input_bytes: Vec<&[u8]> = inputs
            .iter()
            .zip(start_offset_in.iter())
            .map(|(memory, &offset)| &memory.as_bytes()[offset..])
            .collect();

        let mut empty = [0u8; 0];
        let buf: &mut [u8] = match scratch.as_mut() {
            Some(guard) => guard.as_mut_slice(),
            None => &mut empty,
        };

        if *repacking == RepackingPolicy::Separate {
            let started = Instant::now();
            let cache = caches
                .first_mut()
                .ok_or(InternalError::ThreadOutOfRange { thread: 0, nthreads: 0 })?;
            for (pos, (index, entry)) in layout.repacked.iter().enumerate() {
                let key = SourceKey::new(&inputs[index], start_offset_in[index]);
                let slot = layout.scratch.slot_mut(buf, 0, index)?;
                let matrices = entry.tensor_desc().batch();
                if repack_if_changed(entry, matrices, input_bytes[index], slot, key, cache, pos)? {
                    call.repack_copies += 1;
                    tracing::trace!(input = index, matrices, "input repacked");
                } else {
                    call.repack_skips += 1;
                    tracing::trace!(input = index, "input unchanged, repack skipped");
                }
            }
            call.repack_duration += started.elapsed();
        }

        let nthreads = *nthreads;
        let ranges: Vec<Range<usize>> = (0..nthreads).map(|t| layout.domain.split(nthreads, t)).collect();
        let mut lane_outputs: Vec<Vec<&mut [u8]>> = (0..nthreads).map(|_| Vec::with_capacity(outputs.len())).collect();
        for (o, memory) in outputs.iter_mut().enumerate() {
            let block = layout.domain.output_block_bytes(o);
            let mut rest = &mut memory.as_bytes_mut()[start_offset_out[o]..];
            for (chunks, range) in lane_outputs.iter_mut().zip(&ranges) {
                let (mine, tail) = std::mem::take(&mut rest).split_at_mut(range.len() * block);
                rest = tail;
                chunks.push(mine);
            }
        }

        let no_region: &[u8] = &[];
        let (scratches, shared): (Vec<ThreadScratch<'_>>, &[u8]) = match *repacking {
            RepackingPolicy::Separate => {
                let (internal, region) = layout.scratch.split_shared(buf)?;
                let lanes = internal
                    .into_iter()
                    .map(|internal| ThreadScratch {
                        internal,
                        slots: Vec::new(),
                    })
                    .collect();
                (lanes, region)
            }
            _ => (layout.scratch.partition(buf)?, no_region),
        };

        let mut lanes = Vec::with_capacity(nthreads);
        for (ithr, (((scratch, cache), chunks), items)) in scratches
            .into_iter()
            .zip(caches.iter_mut())
            .zip(lane_outputs)
            .zip(ranges)
            .enumerate()
        {
            if items.is_empty() {
                continue;
            }
            lanes.push(Lane {
                ithr,
                items,
                cache,
                scratch,
                outputs: chunks,
            });
        }

        let ctx = LaneContext {
            kernel: kernel.as_ref(),
            layout,
            policy: *repacking,
            memories: inputs,
            inputs: input_bytes,
            offsets_in: start_offset_in,
            shared,
        };
        call.lanes = lanes.len();
        tracing::debug!(subgraph = %attrs.name, work_amount, lanes = call.lanes, "dispatching work items");

        let lane_stats: Vec<LaneStats> = if lanes.len() <= 1 {
            lanes
                .into_iter()
                .map(|lane| run_lane(&ctx, lane))
                .collect::<Result<_, _>>()?
        } else {
            stream.install(|| {
                lanes
                    .into_par_iter()
                    .map(|lane| run_lane(&ctx, lane))
                    .collect::<Result<_, _>>()
            })?
        };

        for stats in &lane_stats {
            call.kernel_invocations += stats.kernel_invocations;
            call.repack_copies += stats.repack_copies;
            call.repack_skips += stats.repack_skips;
            call.repack_duration += stats.repack_duration;
        }
        call.total_duration = started.elapsed();
        metrics.record_call(call.clone());
        Ok(call)
    }

    /// Copy and skip counts per (lane, repacked input).
    pub fn repack_stats(&self) -> Vec<RepackStat> {
        let Some(layout) = &self.layout else {
            return Vec::new();
        };
        let mut stats = Vec::with_capacity(self.nthreads * layout.repacked.len());
        for (thread, cache) in self.caches.iter().enumerate() {
            for (pos, (input, _)) in layout.repacked.iter().enumerate() {
                stats.push(RepackStat {
                    thread,
                    input,
                    copies: cache.copies(pos),
                    skips: cache.skips(pos),
                });
            }
        }
        stats
    }

    /// Repack copies of `input` summed over lanes.
    pub fn repack_copies(&self, input: usize) -> u64 {
        self.repack_stats()
            .iter()
            .filter(|s| s.input == input)
            .map(|s| s.copies)
            .sum()
    }

    /// Repack copies summed over lanes and inputs.
    pub fn total_repack_copies(&self) -> u64 {
        self.repack_stats().iter().map(|s| s.copies).sum()
    }

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    /// Constant inputs of the current layout, to pass to
    /// [`prepare_weights`](crate::prepare_weights).
    pub fn constant_inputs(&self) -> Option<&RepackedInputConfig> {
        self.layout.as_ref().map(|l| &l.constants)
    }

    /// Inputs repacked on every call under the current layout.
    pub fn repacked_inputs(&self) -> Option<&RepackedInputConfig> {
        self.layout.as_ref().map(|l| &l.repacked)
    }

    pub fn scratch_layout(&self) -> Option<&ScratchLayout> {
        self.layout.as_ref().map(|l| &l.scratch)
    }

    pub fn domain(&self) -> Option<&ExecDomain> {
        self.layout.as_ref().map(|l| &l.domain)
    }

    /// Bytes of the scratch allocation currently held.
    pub fn scratch_size(&self) -> usize {
        self.scratch.as_ref().map_or(0, BufferGuard::size_bytes)
    }

    pub fn mode(&self) -> SpecializationMode {
        self.resolver.mode()
    }

    pub fn repacking(&self) -> RepackingPolicy {
        self.repacking
    }

    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    pub fn attrs(&self) -> &SubgraphAttrs {
        &self.attrs
    }
}

impl std::fmt::Debug for SubgraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubgraphExecutor")
            .field("subgraph", &self.attrs.name)
            .field("kernel", &self.kernel.name())
            .field("nthreads", &self.nthreads)
            .field("repacking", &self.repacking)
            .field("mode", &self.resolver.mode())
            .field("scratch_bytes", &self.scratch_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelFn;
    use memory_manager::{MemoryBudget, MemoryPool};
    use snippet_ir::PortDesc;
    use tensor_core::{DType, Layout, Shape};

    fn pool() -> Arc<MemoryPool> {
        Arc::new(MemoryPool::new(MemoryBudget::from_mb(4)))
    }

    fn copy_kernel() -> Arc<dyn SnippetKernel> {
        Arc::new(KernelFn::new("copy", 1, 1, |args| {
            let n = args.dst[0].len();
            args.dst[0].copy_from_slice(&args.src[0][..n]);
            Ok(())
        }))
    }

    fn copy_attrs(dims: Vec<Option<usize>>) -> SubgraphAttrs {
        SubgraphAttrs::new(
            "copy",
            vec![PortDesc::new("x", snippet_ir::PartialShape::new(dims.clone()), DType::F32)],
            vec![PortDesc::new("y", snippet_ir::PartialShape::new(dims), DType::F32)],
        )
    }

    fn iota(dims: &[usize]) -> Memory {
        let n: usize = dims.iter().product();
        let values: Vec<f32> = (0..n).map(|v| v as f32).collect();
        Memory::from_f32(Shape::new(dims.to_vec()), &values).unwrap()
    }

    #[test]
    fn test_copy_over_domain() {
        let attrs = copy_attrs(vec![Some(5), Some(2), Some(3)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool()).with_threads(2);
        let mut exec = SubgraphExecutor::new(params).unwrap();
        assert_eq!(exec.mode(), SpecializationMode::Static);
        assert_eq!(exec.domain().unwrap().work_amount(), 5);

        let stream = ExecutionStream::new(2).unwrap();
        let x = iota(&[5, 2, 3]);
        let mut out = vec![Memory::zeros(x.desc().clone())];
        let call = exec.execute(&stream, &[x.clone().into_ptr()], &mut out).unwrap();
        assert_eq!(out[0].to_f32_vec(), x.to_f32_vec());
        assert_eq!(call.kernel_invocations, 5);
        assert_eq!(call.lanes, 2);
        assert_eq!(exec.metrics().calls, 1);
    }

    #[test]
    fn test_repeated_calls_keep_history_bounded() {
        let attrs = copy_attrs(vec![Some(2), Some(2)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool());
        let mut exec = SubgraphExecutor::new(params).unwrap();
        assert!(exec.metrics().profiling());

        let stream = ExecutionStream::new(1).unwrap();
        let x = iota(&[2, 2]).into_ptr();
        let mut out = vec![Memory::zeros(x.desc().clone())];
        let calls = crate::HISTORY_CAPACITY * 4 + 1;
        for _ in 0..calls {
            exec.execute(&stream, std::slice::from_ref(&x), &mut out).unwrap();
        }
        assert_eq!(exec.metrics().calls, calls as u64);
        assert_eq!(exec.metrics().history.len(), crate::HISTORY_CAPACITY);
    }

    #[test]
    fn test_start_offsets_are_checked() {
        let attrs = copy_attrs(vec![Some(2), Some(2)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool())
            .with_start_offsets(vec![8], vec![0]);
        let mut exec = SubgraphExecutor::new(params).unwrap();
        let stream = ExecutionStream::new(1).unwrap();

        let desc = MemoryDesc::planar(Shape::matrix(2, 2), DType::F32);
        let err = exec
            .execute(&stream, &[Memory::zeros(desc.clone()).into_ptr()], &mut [Memory::zeros(desc)])
            .unwrap_err();
        // 16 bytes of data behind an 8 byte offset need 24 bytes.
        assert!(matches!(
            err,
            RuntimeError::Fatal(InternalError::UndersizedMemory { required: 24, actual: 16, .. })
        ));
    }

    #[test]
    fn test_start_offset_overflow_is_fatal() {
        let attrs = copy_attrs(vec![Some(2), Some(2)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool())
            .with_start_offsets(vec![usize::MAX], vec![0]);
        let mut exec = SubgraphExecutor::new(params).unwrap();
        let stream = ExecutionStream::new(1).unwrap();

        let desc = MemoryDesc::planar(Shape::matrix(2, 2), DType::F32);
        let err = exec
            .execute(&stream, &[Memory::zeros(desc.clone()).into_ptr()], &mut [Memory::zeros(desc)])
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RuntimeError::Fatal(InternalError::MalformedConfig(_))));
    }

    #[test]
    fn test_zero_block_layout_is_fatal() {
        let attrs = SubgraphAttrs::new(
            "s",
            vec![PortDesc::new("w", vec![4usize, 4], DType::F32).with_layout(Layout::Blocked { n_block: 0, k_pack: 1 })],
            vec![PortDesc::new("y", vec![4usize, 4], DType::F32)],
        );
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::InParallel, pool())
            .with_mode(SpecializationMode::Static);
        let err = SubgraphExecutor::new(params).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RuntimeError::Tensor(tensor_core::TensorError::InvalidLayout { .. })));
    }

    #[test]
    fn test_constructor_checks() {
        let attrs = copy_attrs(vec![Some(2), Some(2)]);
        let params = ExecutorParams::new(copy_kernel(), attrs.clone(), RepackingPolicy::None, pool()).with_threads(0);
        assert!(SubgraphExecutor::new(params).unwrap_err().is_fatal());

        let params = ExecutorParams::new(copy_kernel(), attrs.clone(), RepackingPolicy::None, pool())
            .with_start_offsets(vec![0, 0], vec![]);
        assert!(matches!(
            SubgraphExecutor::new(params),
            Err(RuntimeError::Fatal(InternalError::ArityMismatch { kind: "input offset", .. }))
        ));

        let mut two_inputs = attrs.clone();
        two_inputs.inputs.push(PortDesc::new("z", vec![2usize, 2], DType::F32));
        let params = ExecutorParams::new(copy_kernel(), two_inputs, RepackingPolicy::None, pool());
        assert!(matches!(
            SubgraphExecutor::new(params),
            Err(RuntimeError::Fatal(InternalError::ArityMismatch { kind: "input", .. }))
        ));

        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool())
            .with_mode(SpecializationMode::Static);
        assert!(SubgraphExecutor::new(params).is_ok());
    }

    #[test]
    fn test_blocked_input_needs_tile_rank_two() {
        let attrs = SubgraphAttrs::new(
            "s",
            vec![PortDesc::new("w", vec![4usize, 4], DType::F32).with_layout(Layout::Blocked { n_block: 4, k_pack: 1 })],
            vec![PortDesc::new("y", vec![4usize, 4], DType::F32)],
        )
        .with_tile_rank(1);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::InParallel, pool());
        assert!(matches!(
            SubgraphExecutor::new(params),
            Err(RuntimeError::Fatal(InternalError::MalformedConfig(_)))
        ));
    }

    #[test]
    fn test_dynamic_layout_built_on_first_call() {
        let attrs = copy_attrs(vec![None, Some(3)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool()).with_threads(3);
        let mut exec = SubgraphExecutor::new(params).unwrap();
        assert_eq!(exec.mode(), SpecializationMode::DynamicSpecialized);
        assert!(exec.domain().is_none());

        let stream = ExecutionStream::new(3).unwrap();
        let x = iota(&[4, 3]);
        let mut out = vec![Memory::zeros(x.desc().clone())];
        exec.execute(&stream, &[x.clone().into_ptr()], &mut out).unwrap();
        // Tile rank 2 covers the whole tensor: a single work item.
        assert_eq!(exec.domain().unwrap().work_amount(), 1);
        assert_eq!(out[0].to_f32_vec(), x.to_f32_vec());
        assert_eq!(exec.metrics().layout_builds, 1);
    }

    #[test]
    fn test_empty_domain_skips_kernel() {
        let attrs = copy_attrs(vec![None, Some(2), Some(2)]);
        let params = ExecutorParams::new(copy_kernel(), attrs, RepackingPolicy::None, pool());
        let mut exec = SubgraphExecutor::new(params).unwrap();
        let stream = ExecutionStream::new(1).unwrap();
        let desc = MemoryDesc::planar(Shape::new(vec![0, 2, 2]), DType::F32);
        let call = exec
            .execute(&stream, &[Memory::zeros(desc.clone()).into_ptr()], &mut [Memory::zeros(desc)])
            .unwrap();
        assert_eq!(call.work_amount, 0);
        assert_eq!(call.kernel_invocations, 0);
    }

    #[test]
    fn test_kernel_errors_propagate() {
        let failing: Arc<dyn SnippetKernel> = Arc::new(KernelFn::new("fail", 1, 1, |args| {
            Err(InternalError::ThreadOutOfRange {
                thread: args.thread,
                nthreads: 0,
            }
            .into())
        }));
        let attrs = copy_attrs(vec![Some(4), Some(1), Some(1)]);
        let params = ExecutorParams::new(failing, attrs, RepackingPolicy::None, pool()).with_threads(2);
        let mut exec = SubgraphExecutor::new(params).unwrap();
        let stream = ExecutionStream::new(2).unwrap();
        let x = iota(&[4, 1, 1]);
        let mut out = vec![Memory::zeros(x.desc().clone())];
        assert!(exec.execute(&stream, &[x.into_ptr()], &mut out).unwrap_err().is_fatal());
    }
}

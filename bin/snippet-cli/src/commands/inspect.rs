// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `snippet-exec inspect` command: display a subgraph's boundary and layout.
//!
//! Reads the graph JSON, extracts the subgraph attributes and, for static
//! shapes, prints which inputs are repacked and how the scratchpad is
//! carved into per-lane slots.

use super::human_bytes;
use anyhow::Context;
use snippet_ir::{GraphDef, GraphDefIterator, SubgraphAttrs};
use snippet_runtime::{GraphContext, RepackedInputConfig, RepackingPolicy, RuntimeConfig, ScratchLayout};
use std::path::Path;
use std::sync::Arc;
use tensor_core::Shape;

pub fn execute(graph: &Path, function: Option<&str>, config: &RuntimeConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            snippet-exec · Subgraph Inspector         ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let def = GraphDef::from_file(graph)
        .and_then(GraphDef::validate)
        .with_context(|| format!("failed to load graph from '{}'", graph.display()))?;
    let def = Arc::new(def);
    println!("  {}", def.summary());

    let (name, mut it) = match function {
        Some(name) => (name.to_string(), GraphDefIterator::for_function(Arc::clone(&def), name)?),
        None => (def.name.clone(), GraphDefIterator::new(Arc::clone(&def))),
    };
    let attrs = SubgraphAttrs::from_graph(&name, &mut it)?;
    let nthreads = config.resolve_threads();

    // ── Ports ──────────────────────────────────────────────────
    println!();
    println!("  Subgraph: {}", attrs.name);
    println!("  Tile rank: {}", attrs.tile_rank);
    println!("  Internal buffer: {} per lane", human_bytes(attrs.internal_buffer_size));
    println!("  Mode: {}", config.resolve_mode(&attrs));
    println!();
    println!("  {:<4} {:<6} {}", "Idx", "Dir", "Port");
    println!("  {}", "-".repeat(60));
    for (i, port) in attrs.inputs.iter().enumerate() {
        println!("  {:<4} {:<6} {}", i, "in", port);
    }
    for (i, port) in attrs.outputs.iter().enumerate() {
        println!("  {:<4} {:<6} {}", i, "out", port);
    }
    println!();

    let shapes: Option<Vec<Shape>> = attrs.inputs.iter().map(|p| p.shape.to_shape()).collect();
    let Some(shapes) = shapes else {
        println!("  Input shapes are dynamic; repacking is laid out on the first call.");
        println!();
        return Ok(());
    };

    // ── Repacking ──────────────────────────────────────────────
    let context = GraphContext::from_config(config)?;
    let cache = Arc::downgrade(context.kernel_cache());
    let (runtime, constant) = RepackedInputConfig::split_for(&attrs, &shapes, &cache)?;

    println!("  Repacking policy: {}   Lanes: {}", config.repacking, nthreads);
    println!(
        "  {:<4} {:<10} {:<28} {:>8} {:>12}",
        "Idx", "Kind", "Target", "Tile", "Slot",
    );
    println!("  {}", "-".repeat(66));
    for (index, entry) in constant.iter() {
        println!(
            "  {:<4} {:<10} {:<28} {:>8} {:>12}",
            index,
            "constant",
            entry.tensor_desc().to_string(),
            "-",
            "-",
        );
    }
    for (index, entry) in runtime.iter() {
        println!(
            "  {:<4} {:<10} {:<28} {:>8} {:>12}",
            index,
            "runtime",
            entry.tensor_desc().to_string(),
            entry.tile_matrices(),
            human_bytes(entry.slot_size(config.repacking)),
        );
    }
    if runtime.is_empty() && constant.is_empty() {
        println!("  (no input needs repacking)");
    }
    println!();

    if config.repacking == RepackingPolicy::None && !runtime.is_empty() {
        println!("  ! Runtime repacking is required but the policy is 'none'; an executor would refuse this subgraph.");
        println!();
        return Ok(());
    }

    // ── Scratch Partition ──────────────────────────────────────
    let layout = ScratchLayout::new(&runtime, nthreads, attrs.internal_buffer_size, config.repacking)?;
    println!("  Scratchpad: {} total", human_bytes(layout.total_size()));
    println!(
        "   internal   [0, {})  {} x {}",
        layout.internal_size(),
        nthreads,
        human_bytes(layout.internal_per_thread()),
    );
    for input in layout.inputs() {
        let start = layout.slot_offset(0, input)?;
        let size = layout.slot_size(input)?;
        println!(
            "   input {:<4} [{}, {})  {} x {}",
            input,
            start,
            start + nthreads * size,
            nthreads,
            human_bytes(size),
        );
    }
    println!();
    Ok(())
}

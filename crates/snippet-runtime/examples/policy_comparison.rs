// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare repacking policies on a batched blocked matmul.
//!
//! Runs the same subgraph under `in_parallel` and `separate` repacking,
//! with batched and with shared weights, and prints how many conversions
//! each call performed. Shared weights are converted on the first call
//! only.
//!
//! ```bash
//! cargo run -p snippet-runtime --example policy_comparison
//! ```

use snippet_runtime::reference::BlockedMatMul;
use snippet_runtime::{
    ExecutionStream, ExecutorParams, GraphContext, RepackingPolicy, RuntimeConfig, SubgraphExecutor,
};
use std::sync::Arc;
use tensor_core::{DType, Layout, Memory, MemoryDesc, Shape};

const BATCH: usize = 12;
const CALLS: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let kernel = BlockedMatMul::new(8, 48, 40, Layout::Blocked { n_block: 16, k_pack: 2 });
    let weights: [(&str, Vec<usize>); 2] = [("batched", vec![BATCH]), ("shared", Vec::new())];

    println!(
        "{:<12} {:<8} {:>6} {:>6} {:>8} {:>8} {:>12}",
        "Policy", "Weights", "Call", "Lanes", "Copies", "Skips", "Time (us)",
    );
    println!("{}", "-".repeat(66));

    for policy in [RepackingPolicy::InParallel, RepackingPolicy::Separate] {
        for (label, weight_batch) in &weights {
            let config = RuntimeConfig {
                num_threads: Some(4),
                ..RuntimeConfig::new(policy)
            };
            let context = GraphContext::from_config(&config)?;
            let stream = ExecutionStream::from_config(&config)?;
            let attrs = kernel.subgraph_attrs(&[BATCH], weight_batch, false);
            let params = ExecutorParams::from_context(Arc::new(kernel), attrs, &config, &context);
            let mut executor = SubgraphExecutor::new(params)?;

            let lhs = Memory::from_f32(
                Shape::new(vec![BATCH, kernel.m, kernel.k]),
                &vec![1.0; BATCH * kernel.m * kernel.k],
            )?;
            let mut rhs_dims = weight_batch.clone();
            rhs_dims.extend([kernel.k, kernel.n]);
            let rhs_len = rhs_dims.iter().product();
            let rhs = Memory::from_f32(Shape::new(rhs_dims), &vec![0.5; rhs_len])?;
            let inputs = [lhs.into_ptr(), rhs.into_ptr()];
            let mut outputs = [Memory::zeros(MemoryDesc::planar(
                Shape::new(vec![BATCH, kernel.m, kernel.n]),
                DType::F32,
            ))];

            for call in 1..=CALLS {
                let metrics = executor.execute(&stream, &inputs, &mut outputs)?;
                println!(
                    "{:<12} {:<8} {:>6} {:>6} {:>8} {:>8} {:>12}",
                    policy.to_string(),
                    label,
                    call,
                    metrics.lanes,
                    metrics.repack_copies,
                    metrics.repack_skips,
                    metrics.total_duration.as_micros(),
                );
            }
            println!("  {}", executor.metrics().summary());
        }
    }

    Ok(())
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # snippet-exec
//!
//! Command-line interface for the subgraph executor.
//!
//! ## Usage
//! ```bash
//! # Show ports, repacked inputs and the scratch partition of a subgraph
//! snippet-exec inspect --graph ./graphs/blocked_mm.json --function mm --threads 4 --repacking in_parallel
//!
//! # Run the reference blocked matmul through the executor
//! snippet-exec bench --threads 4 --batch 16 --repacking separate
//!
//! # Same, with weights prepared once up front
//! snippet-exec --config runtime.toml bench --constant-weights
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "snippet-exec",
    about = "Executor for compiled subgraph kernels with per-thread input repacking",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration (CLI flags override it).
    /// Without one, `--repacking` is required.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a subgraph's ports, repacking configuration and scratch partition.
    Inspect {
        /// Path to the graph JSON.
        #[arg(short, long)]
        graph: PathBuf,

        /// Library function holding the subgraph body (top level if absent).
        #[arg(short, long)]
        function: Option<String>,

        /// Worker lanes.
        #[arg(short, long)]
        threads: Option<usize>,

        /// Repacking policy: none, in_parallel, separate.
        #[arg(short, long)]
        repacking: Option<String>,
    },

    /// Run the reference blocked matmul and report repack counts.
    Bench {
        /// Worker lanes.
        #[arg(short, long)]
        threads: Option<usize>,

        /// Leading batch dimension of the left-hand operand.
        #[arg(long, default_value_t = 8)]
        batch: usize,

        #[arg(long, default_value_t = 16)]
        m: usize,

        #[arg(long, default_value_t = 64)]
        k: usize,

        #[arg(long, default_value_t = 64)]
        n: usize,

        /// Number of calls.
        #[arg(long, default_value_t = 10)]
        iters: usize,

        /// Repacking policy: none, in_parallel, separate.
        #[arg(short, long)]
        repacking: Option<String>,

        /// Treat the weights as constants prepared once before the first call.
        #[arg(long)]
        constant_weights: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect {
            graph,
            function,
            threads,
            repacking,
        } => {
            let config = commands::load_config(cli.config.as_deref(), repacking.as_deref(), threads)?;
            commands::inspect::execute(&graph, function.as_deref(), &config)
        }
        Commands::Bench {
            threads,
            batch,
            m,
            k,
            n,
            iters,
            repacking,
            constant_weights,
        } => {
            let config = commands::load_config(cli.config.as_deref(), repacking.as_deref(), threads)?;
            let shape = commands::bench::MatMulShape { batch, m, k, n };
            commands::bench::execute(shape, iters, constant_weights, &config)
        }
    }
}

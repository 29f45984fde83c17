use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dotrun - load and run .NET PE assemblies
#[derive(Debug, Parser)]
#[command(name = "dotrun", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the entry point of an assembly. Referenced assemblies are loaded from its directory.
    Run {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Payload size of the initial heap in bytes.
        #[arg(long, value_name = "BYTES", default_value_t = dotrun::config::DEFAULT_HEAP_SIZE)]
        heap_size: usize,

        /// Steps a thread may take per scheduler slot (unbounded if omitted).
        #[arg(long, value_name = "STEPS")]
        step_budget: Option<u64>,

        /// Collect garbage every N ticks; 0 disables collection.
        #[arg(long, value_name = "TICKS", default_value_t = 1)]
        gc_interval: u64,

        /// Disable operand specialization of polymorphic instructions.
        #[arg(long)]
        no_specialize: bool,

        /// Seconds to wait for a referenced assembly to load.
        #[arg(long, value_name = "SECONDS", default_value_t = 10)]
        load_timeout: u64,
    },

    /// Display headers, streams and table row counts of an assembly.
    Info {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

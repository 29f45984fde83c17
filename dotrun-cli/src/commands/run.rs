use std::{path::Path, time::Duration};

use anyhow::Context;
use dotrun::{
    config::RuntimeConfig,
    emulation::{runtime::DirectorySource, EmValue, StepBudget},
    AppDomain,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::file_display_name,
    output::print_output,
};

pub struct RunOptions {
    pub heap_size: usize,
    pub step_budget: Option<u64>,
    pub gc_interval: u64,
    pub specialize: bool,
    pub load_timeout: u64,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub file: String,
    pub assembly: String,
    pub exit_code: i32,
    pub ticks: u64,
    pub assemblies_fetched: usize,
    pub heap_size: usize,
}

/// Run the entry point of `path`, returning the exit code of the program.
pub fn run(path: &Path, options: &RunOptions, opts: &GlobalOptions) -> anyhow::Result<i32> {
    let config = RuntimeConfig::new()
        .with_initial_heap_size(options.heap_size)
        .with_step_budget(options.step_budget.map_or(StepBudget::Unbounded, StepBudget::Steps))
        .with_gc_interval(options.gc_interval)
        .with_specialize_opcodes(options.specialize)
        .with_load_timeout(Duration::from_secs(options.load_timeout));

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => ".".into(),
    };

    let mut domain = AppDomain::new(config, Box::new(DirectorySource::new(directory)))?;
    let assembly = domain
        .load_file(path)
        .with_context(|| format!("failed to load assembly: {}", path.display()))?;
    let thread = domain.run(&assembly)?;
    domain
        .run_to_completion()
        .with_context(|| format!("{} faulted", assembly.name()))?;

    let exit_code = match domain.exit_value(thread) {
        Some(EmValue::Int32(code)) => *code,
        _ => 0,
    };

    if opts.json {
        let report = RunReport {
            file: file_display_name(path),
            assembly: assembly.name().to_string(),
            exit_code,
            ticks: domain.ticks(),
            assemblies_fetched: domain.assemblies().fetches(),
            heap_size: domain.heap().len(),
        };
        print_output(&report, opts, |_| {})?;
    }

    Ok(exit_code)
}

mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // dotrun warnings on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        };
        env_logger::Builder::new()
            .filter_module("dotrun", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Run {
            path,
            heap_size,
            step_budget,
            gc_interval,
            no_specialize,
            load_timeout,
        } => {
            let code = commands::run::run(
                path,
                &commands::run::RunOptions {
                    heap_size: *heap_size,
                    step_budget: *step_budget,
                    gc_interval: *gc_interval,
                    specialize: !*no_specialize,
                    load_timeout: *load_timeout,
                },
                &cli.global,
            )?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::Info { path } => commands::info::run(path, &cli.global),
    }
}

#![allow(unused_crate_dependencies)] // false positives because there is both a library and a binary
#![allow(clippy::print_stdout)]

#[macro_use]
extern crate tracing;

use anyhow::Context as _;
use ironscan_cli::config::{Command, Config};
use ironscan_cli::session::{self, SourceInfo};

fn main() -> anyhow::Result<()> {
    let config = Config::parse_args().context("CLI arguments parsing")?;

    setup_logging(config.log_file.as_deref()).context("unable to initialize logging")?;

    let manager = session::open_manager(&config)?;

    match &config.command {
        Command::List => {
            let sources = session::list_sources(&manager)?;

            if sources.is_empty() {
                println!("No source installed");
            }

            for source in &sources {
                print_source(source);
            }
        }
        Command::Default => print_source(&session::default_source(&manager)?),
        Command::Select => match session::select_source(&manager)? {
            Some(source) => {
                println!("Default source is now:");
                print_source(&source);
            }
            None => println!("Selection cancelled"),
        },
        Command::Acquire(acquire) => {
            let report = session::acquire(&manager, acquire)?;

            if report.cancelled {
                println!("Cancelled by the source");
            }

            println!("{} image(s) acquired", report.images);

            for file in &report.files {
                println!("  {}", file.display());
            }
        }
    }

    debug!("Done");

    Ok(())
}

fn print_source(source: &SourceInfo) {
    println!(
        "[{}] {} ({}, {}) version {}",
        source.id, source.product_name, source.manufacturer, source.product_family, source.version
    );
}

fn setup_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    use std::fs::OpenOptions;

    use tracing::metadata::LevelFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var("IRONSCAN_LOG")
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match log_file {
        Some(log_file) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("couldn't open {log_file}"))?;

            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false)
                .with_writer(file);

            registry.with(fmt_layer).try_init()
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr);

            registry.with(fmt_layer).try_init()
        }
    };

    result.context("failed to set tracing global subscriber")?;

    Ok(())
}

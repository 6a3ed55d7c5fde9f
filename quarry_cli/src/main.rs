use clap::Parser;
use owo_colors::Style;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;
mod provider;

use cli::{Cli, Commands};
use commands::*;
use output::Painter;

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Files(args) => search::files(&cli, args).await,
        Commands::Grep(args) => search::grep(&cli, args).await,
        Commands::Config { action } => config::run(&cli, action.clone()).await,
    };

    if let Err(e) = result {
        let painter = Painter::new(cli.no_color);
        eprintln!("{}: {}", painter.paint("Error", Style::new().red().bold()), e);
        process::exit(if e.is_cancelled() { EXIT_INTERRUPTED } else { 1 });
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "quarry_cli=info,quarry=warn",
        1 => "quarry_cli=debug,quarry=debug",
        _ => "quarry_cli=trace,quarry=trace",
    }
}

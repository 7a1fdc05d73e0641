// Licensed under the Apache-2.0 license

mod cargo;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Bare-metal target the driver is cross-checked against.
const EMBEDDED_TARGET: &str = "thumbv7em-none-eabihf";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "i2c-isr-ddk development tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host unit tests
    Test {
        /// Also build with the `std` feature
        #[arg(long)]
        with_std: bool,
    },
    /// Check the driver builds for the bare-metal target
    Check {
        #[arg(long, default_value = EMBEDDED_TARGET)]
        target: String,
    },
    /// Run clippy with the crate's panic-free lints
    Clippy,
    /// Test, check and clippy in sequence
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Test { with_std } => cargo::test(with_std),
        Commands::Check { target } => cargo::check(&target),
        Commands::Clippy => cargo::clippy(),
        Commands::Ci => {
            cargo::test(true)?;
            cargo::check(EMBEDDED_TARGET)?;
            cargo::clippy()
        }
    }
}

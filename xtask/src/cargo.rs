// Licensed under the Apache-2.0 license

use anyhow::{Context, Result};
use std::process::Command;

const PACKAGE: &str = "i2c-isr-ddk";

pub fn test(with_std: bool) -> Result<()> {
    println!("Running host tests...");
    run(&["test", "-p", PACKAGE])?;
    if with_std {
        run(&["test", "-p", PACKAGE, "--features", "std"])?;
    }
    println!("✅ Tests passed");
    Ok(())
}

pub fn check(target: &str) -> Result<()> {
    println!("Checking {PACKAGE} for {target}...");
    run(&["check", "-p", PACKAGE, "--target", target]).with_context(|| {
        format!("Cross check failed - is the target installed? (rustup target add {target})")
    })?;
    println!("✅ {target} build is clean");
    Ok(())
}

pub fn clippy() -> Result<()> {
    println!("Running clippy...");
    run(&["clippy", "-p", PACKAGE, "--", "-D", "warnings"])?;
    println!("✅ No clippy findings");
    Ok(())
}

fn run(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo")
        .args(args)
        .status()
        .with_context(|| format!("Failed to spawn cargo {}", args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("cargo {} failed with {status}", args.join(" "));
    }
    Ok(())
}

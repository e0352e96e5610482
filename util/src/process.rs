use std::process::Command;

use anyhow::{bail, Context, Result};

/// Runs a command and fails unless it exits successfully. STDOUT and STDERR aren't touched.
pub fn run_cmd(cmd: &mut Command) -> Result<()> {
    info!("- Running {:?}", cmd);
    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {:?}", cmd))?;
    if !status.success() {
        bail!("{:?} failed with {}", cmd, status);
    }
    Ok(())
}

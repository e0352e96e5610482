//! Finding and reading the files this toolkit works with. Every path comes from an explicit
//! `Settings` value; nothing here reads global state besides the environment overrides applied
//! when settings are loaded.

#[macro_use]
extern crate log;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub use crate::settings::{Artifacts, Settings, SimulatorSettings, DEFAULT_SETTINGS_PATH};

mod settings;

/// Fails before any work happens if any of the files a step depends on are missing.
pub fn assert_depends_on<I, P>(depends_on: I) -> Result<()>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let missing: BTreeSet<String> = depends_on
        .into_iter()
        .filter(|p| !p.as_ref().exists())
        .map(|p| p.as_ref().display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!(
            "Missing input {}: {}",
            if missing.len() == 1 { "file" } else { "files" },
            hcme_util::plain_list_names(missing)
        );
    }
    Ok(())
}

pub fn slurp_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    Ok(fs_err::read(path.as_ref())?)
}

/// Creates the parent directory of a file that's about to be written.
pub fn prepare_output<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }
    Ok(path)
}

pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<()> {
    let path = prepare_output(path)?;
    fs_err::write(&path, contents)?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_depends_on() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.csv");
        fs_err::write(&present, "a,b\n").unwrap();
        assert!(assert_depends_on(vec![&present]).is_ok());

        let missing = dir.path().join("missing.csv");
        let err = assert_depends_on(vec![&present, &missing]).unwrap_err();
        assert!(err.to_string().contains("missing.csv"));
    }

    #[test]
    fn test_write_file_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demand/summary.csv");
        write_file(&path, b"x\n1\n").unwrap();
        assert_eq!(b"x\n1\n".to_vec(), slurp_file(&path).unwrap());
    }
}

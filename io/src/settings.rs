use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Everything a run needs to know about where data lives. Loaded once at startup and passed to
/// whatever needs it.
#[derive(Clone, Debug)]
pub struct Settings {
    /// A path to the SQLite database, or `:memory:`
    pub database_url: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Named input files, relative to `input_dir`
    pub input_files: BTreeMap<String, PathBuf>,
    pub simulator: SimulatorSettings,
    pub seed: u64,
    pub batch_size: usize,
}

#[derive(Clone, Debug)]
pub struct SimulatorSettings {
    pub java: String,
    pub beam_dir: PathBuf,
    pub beam_conf: PathBuf,
    pub max_ram_gb: usize,
}

/// Mirrors `Settings`, but everything is optional in the file.
#[derive(Default, Deserialize)]
struct RawSettings {
    database_url: Option<String>,
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    #[serde(default)]
    input_files: BTreeMap<String, PathBuf>,
    #[serde(default)]
    simulator: RawSimulatorSettings,
    seed: Option<u64>,
    batch_size: Option<usize>,
}

#[derive(Default, Deserialize)]
struct RawSimulatorSettings {
    java: Option<String>,
    beam_dir: Option<PathBuf>,
    beam_conf: Option<PathBuf>,
    max_ram_gb: Option<usize>,
}

pub const DEFAULT_SETTINGS_PATH: &str = "hcme.toml";
const ENV_PREFIX: &str = "HCME_";

impl Settings {
    /// Reads settings from a TOML file, if it exists, then applies `HCME_DATABASE_URL`,
    /// `HCME_INPUT_DIR`, and `HCME_OUTPUT_DIR` overrides from the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let raw = match fs_err::read_to_string(path) {
            Ok(text) => toml::from_str::<RawSettings>(&text)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} doesn't exist, using default settings", path.display());
                RawSettings::default()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Settings::from_raw(raw, |key| {
            std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
        }))
    }

    pub fn from_toml_str(text: &str) -> Result<Settings> {
        let raw = toml::from_str::<RawSettings>(text)?;
        Ok(Settings::from_raw(raw, |_| None))
    }

    fn from_raw<F: Fn(&str) -> Option<String>>(raw: RawSettings, env: F) -> Settings {
        let defaults = Settings::default();
        let input_dir = env("INPUT_DIR")
            .map(PathBuf::from)
            .or(raw.input_dir)
            .unwrap_or(defaults.input_dir);
        Settings {
            database_url: env("DATABASE_URL")
                .or(raw.database_url)
                .unwrap_or(defaults.database_url),
            output_dir: env("OUTPUT_DIR")
                .map(PathBuf::from)
                .or(raw.output_dir)
                .unwrap_or(defaults.output_dir),
            input_files: raw
                .input_files
                .into_iter()
                .map(|(name, rel)| (name, input_dir.join(rel)))
                .collect(),
            input_dir,
            simulator: SimulatorSettings {
                java: value_or_default(raw.simulator.java, defaults.simulator.java),
                beam_dir: value_or_default(raw.simulator.beam_dir, defaults.simulator.beam_dir),
                beam_conf: value_or_default(
                    raw.simulator.beam_conf,
                    defaults.simulator.beam_conf,
                ),
                max_ram_gb: value_or_default(
                    raw.simulator.max_ram_gb,
                    defaults.simulator.max_ram_gb,
                ),
            },
            seed: value_or_default(raw.seed, defaults.seed),
            batch_size: value_or_default(raw.batch_size, defaults.batch_size),
        }
    }

    /// The full path to a named input file.
    pub fn input(&self, name: &str) -> Result<PathBuf> {
        self.input_files.get(name).cloned().ok_or_else(|| {
            anyhow!(
                "No input file named {} is configured; known inputs are {:?}",
                name,
                self.input_files.keys().collect::<Vec<_>>()
            )
        })
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(&self.output_dir)
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            database_url: "data/hcme.sqlite".to_string(),
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            input_files: BTreeMap::new(),
            simulator: SimulatorSettings {
                java: "java".to_string(),
                beam_dir: PathBuf::from("beam"),
                beam_conf: PathBuf::from("beam/production/hcme/hcme.conf"),
                max_ram_gb: 2,
            },
            seed: 42,
            batch_size: 10_000,
        }
    }
}

fn value_or_default<T>(maybe_value: Option<T>, default: T) -> T {
    maybe_value.unwrap_or(default)
}

/// Where generated simulator inputs are written.
#[derive(Clone, Debug)]
pub struct Artifacts {
    pub population: PathBuf,
    pub households: PathBuf,
    pub population_attributes: PathBuf,
    pub household_attributes: PathBuf,
    pub vehicles: PathBuf,
}

impl Artifacts {
    pub fn new(output_dir: &Path) -> Artifacts {
        let dir = output_dir.join("inputs");
        Artifacts {
            population: dir.join("population.xml"),
            households: dir.join("households.xml"),
            population_attributes: dir.join("population_attributes.xml"),
            household_attributes: dir.join("household_attributes.xml"),
            vehicles: dir.join("vehicles.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = Settings::from_toml_str(
            r#"
            input_dir = "/data/in"

            [input_files]
            drivers = "drivers.tsv"
            "#,
        )
        .unwrap();
        assert_eq!("data/hcme.sqlite", settings.database_url);
        assert_eq!(42, settings.seed);
        assert_eq!(
            PathBuf::from("/data/in/drivers.tsv"),
            settings.input("drivers").unwrap()
        );
        assert!(settings.input("apns").is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let raw: RawSettings = toml::from_str(
            r#"
            database_url = "from_file.sqlite"
            output_dir = "out"
            "#,
        )
        .unwrap();
        let settings = Settings::from_raw(raw, |key| {
            if key == "DATABASE_URL" {
                Some(":memory:".to_string())
            } else {
                None
            }
        });
        assert_eq!(":memory:", settings.database_url);
        assert_eq!(PathBuf::from("out"), settings.output_dir);
        assert_eq!(
            PathBuf::from("out/inputs/households.xml"),
            settings.artifacts().households
        );
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Settings::load(dir.path().join("nope.toml")).unwrap();
        assert_eq!(42, missing.seed);

        let path = dir.path().join("hcme.toml");
        fs_err::write(&path, "seed = 7\nbatch_size = 5\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(7, settings.seed);
        assert_eq!(5, settings.batch_size);

        // Unreadable files are errors, not defaults
        fs_err::write(&path, b"\xff\xfe\x00").unwrap();
        assert!(Settings::load(&path).is_err());
        assert!(Settings::load(dir.path()).is_err());
    }
}

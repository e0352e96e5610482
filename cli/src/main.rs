//! The `hcme` multi-tool: loads raw inputs into the store, synthesizes the population and its trips,
//! writes simulator inputs, and inspects what comes back out.

#[macro_use]
extern crate log;

mod metrics;
mod simulator;

use std::path::{Path, PathBuf};

use anyhow::Result;
use structopt::StructOpt;

use hcme_io::Settings;
use hcme_store::Store;
use hcme_util::Timer;

#[derive(StructOpt)]
#[structopt(name = "hcme", about = "Humboldt County travel demand toolkit")]
struct Args {
    /// The TOML settings file, `hcme.toml` by default. Missing files mean default settings.
    #[structopt(long, global = true)]
    settings: Option<String>,
    #[structopt(subcommand)]
    cmd: Command,
}

impl Args {
    fn settings_path(&self) -> &str {
        self.settings
            .as_deref()
            .unwrap_or(hcme_io::DEFAULT_SETTINGS_PATH)
    }
}

#[derive(StructOpt)]
enum Command {
    /// Creates any missing tables in the database
    InitDb,
    /// Loads traffic analysis zones from the `tazs` KML input
    LoadTazs,
    /// Loads parcels from the `apns` input as locations
    LoadApns,
    /// Loads census block demographics from the `census_blocks` input
    LoadCensusBlocks,
    /// Loads the road network used by the simulator
    LoadNetwork {
        /// Keep every link between the same pair of nodes, instead of only the first
        #[structopt(long)]
        allow_parallel_links: bool,
    },
    /// Places every traveler from the `drivers` diaries into a household
    LoadHouseholds,
    /// Builds trips between locations from the `drivers` diaries
    LoadTrips,
    /// Writes population, household, attribute, and vehicle files for the simulator
    BuildInputs {
        /// The chance each household member owns a vehicle, between 0 and 1
        #[structopt(long, default_value = "1.0")]
        pct_vehicle_ownership: f64,
    },
    /// Records origin-destination matrices between cities, by time of day
    SummarizeDemand {
        /// Only keep destination cities with more than this many trips
        #[structopt(long)]
        threshold: Option<usize>,
        /// Only keep this many of the busiest destination cities
        #[structopt(long, default_value = "10")]
        top_n: usize,
    },
    /// Lists or exports recorded metrics
    Metrics {
        #[structopt(subcommand)]
        cmd: MetricsCommand,
    },
    /// Writes the links one person drove through as GeoJSON
    Route {
        /// The simulator's id for the person
        #[structopt(long)]
        person: String,
        /// Which iteration to read. Defaults to the second-to-last one.
        #[structopt(long)]
        iteration: Option<usize>,
        /// The simulator's output directory, containing ITERS/. Defaults to `<output_dir>/beam`.
        #[structopt(long)]
        beam_output: Option<String>,
        /// Where to write the GeoJSON. Defaults to STDOUT.
        #[structopt(long)]
        output: Option<String>,
    },
    /// Runs the simulator with the configured settings
    Simulator {
        /// Only print the command that would run
        #[structopt(long)]
        info: bool,
    },
}

#[derive(StructOpt)]
enum MetricsCommand {
    /// Prints every metric, grouped by domain
    List,
    /// Runs export hooks for matching metrics
    Export {
        #[structopt(short, long)]
        domain: Option<String>,
        #[structopt(short, long)]
        name: Option<String>,
        /// Hooks to run, in addition to the ones stored with each metric. Defaults to `csv`.
        #[structopt(short = "k", long = "hook")]
        hooks: Vec<String>,
    },
}

fn main() -> Result<()> {
    hcme_util::logger::setup();
    let args = Args::from_args();
    let settings = Settings::load(args.settings_path())?;

    match args.cmd {
        Command::InitDb => {
            open_store(&settings)?;
        }
        Command::LoadTazs => {
            let path = input(&settings, "tazs")?;
            let mut timer = Timer::new("load zones");
            let n = importer::load_tazs(&open_store(&settings)?, &path, &mut timer)?;
            info!("Loaded {} zones", n);
        }
        Command::LoadApns => {
            let path = input(&settings, "apns")?;
            let mut timer = Timer::new("load parcels");
            importer::load_apns(
                &open_store(&settings)?,
                &path,
                settings.batch_size,
                &mut timer,
            )?;
        }
        Command::LoadCensusBlocks => {
            let path = input(&settings, "census_blocks")?;
            let mut timer = Timer::new("load census blocks");
            importer::load_census_blocks(
                &open_store(&settings)?,
                &path,
                settings.batch_size,
                &mut timer,
            )?;
        }
        Command::LoadNetwork {
            allow_parallel_links,
        } => {
            let path = network_path(&settings.simulator.beam_conf);
            hcme_io::assert_depends_on(vec![&path])?;
            let mut timer = Timer::new("load network");
            let (nodes, links) = importer::load_network(
                &open_store(&settings)?,
                &path.display().to_string(),
                allow_parallel_links,
                settings.batch_size,
                &mut timer,
            )?;
            info!("Loaded {} nodes and {} links", nodes, links);
        }
        Command::LoadHouseholds => {
            let diaries = importer::read_diaries(input(&settings, "drivers")?)?;
            let mut timer = Timer::new("assign households");
            let summary = popdat::assign_households(
                &open_store(&settings)?,
                &diaries,
                &mut popdat::rng(settings.seed),
                &mut timer,
            )?;
            for (taz_id, err) in &summary.skipped {
                warn!("Zone {} has no households: {}", taz_id, err);
            }
        }
        Command::LoadTrips => {
            let diaries = importer::read_diaries(input(&settings, "drivers")?)?;
            let mut timer = Timer::new("build trips");
            popdat::build_trips(
                &open_store(&settings)?,
                &diaries,
                settings.batch_size,
                &mut popdat::rng(settings.seed),
                &mut timer,
            )?;
        }
        Command::BuildInputs {
            pct_vehicle_ownership,
        } => {
            let mut timer = Timer::new("build simulator inputs");
            popdat::build_inputs(
                &open_store(&settings)?,
                &settings.artifacts(),
                pct_vehicle_ownership,
                &mut timer,
            )?;
        }
        Command::SummarizeDemand { threshold, top_n } => {
            let matrix = popdat::DemandMatrix {
                threshold,
                top_n: Some(top_n),
            };
            matrix.record_metrics(&open_store(&settings)?, &[])?;
        }
        Command::Metrics { cmd } => match cmd {
            MetricsCommand::List => {
                print!("{}", metrics::describe(&hcme_store::list(&open_store(&settings)?)?));
            }
            MetricsCommand::Export {
                domain,
                name,
                hooks,
            } => {
                metrics::export(
                    &open_store(&settings)?,
                    &settings.output_dir,
                    domain.as_deref(),
                    name.as_deref(),
                    hooks,
                )?;
            }
        },
        Command::Route {
            person,
            iteration,
            beam_output,
            output,
        } => {
            let root = beam_output
                .map(PathBuf::from)
                .unwrap_or_else(|| settings.output_dir.join("beam"));
            let registry = popdat::OutputRegistry::new(root, iteration)?;
            hcme_io::assert_depends_on(vec![&registry.events, &registry.physsim])?;
            let route = popdat::person_route(&registry, &person)?;
            let geojson = popdat::route_geojson(&open_store(&settings)?, &route)?.to_string();
            match output {
                Some(path) => hcme_io::write_file(path, geojson.as_bytes())?,
                None => println!("{}", geojson),
            }
        }
        Command::Simulator { info } => {
            let launch = simulator::Launch::new(&settings.simulator);
            if info {
                println!("Beam command: {}", launch);
            } else {
                hcme_io::assert_depends_on(vec![&settings.simulator.beam_conf])?;
                launch.run()?;
            }
        }
    }
    Ok(())
}

/// Opens the configured database, creating any missing tables first.
fn open_store(settings: &Settings) -> Result<Store> {
    let store = Store::open(&settings.database_url)?;
    store.create_schema()?;
    Ok(store)
}

/// Resolves a named input file and checks it exists.
fn input(settings: &Settings, name: &str) -> Result<String> {
    let path = settings.input(name)?;
    hcme_io::assert_depends_on(vec![&path])?;
    Ok(path.display().to_string())
}

/// The network lives alongside the simulator's configuration.
fn network_path(beam_conf: &Path) -> PathBuf {
    beam_conf
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("r5/physsim-network.xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_path() {
        assert_eq!(
            PathBuf::from("beam/production/hcme/r5/physsim-network.xml"),
            network_path(Path::new("beam/production/hcme/hcme.conf"))
        );
    }

    #[test]
    fn test_parse_args() {
        let args = Args::from_iter(vec![
            "hcme",
            "--settings",
            "other.toml",
            "metrics",
            "export",
            "-d",
            "demand",
            "-k",
            "csv",
            "-k",
            "json",
        ]);
        assert_eq!(Some("other.toml".to_string()), args.settings);
        match args.cmd {
            Command::Metrics {
                cmd:
                    MetricsCommand::Export {
                        domain,
                        name,
                        hooks,
                    },
            } => {
                assert_eq!(Some("demand".to_string()), domain);
                assert_eq!(None, name);
                assert_eq!(vec!["csv".to_string(), "json".to_string()], hooks);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_default_settings_path() {
        let args = Args::from_iter(vec!["hcme", "init-db"]);
        assert_eq!("hcme.toml", args.settings_path());
        let args = Args::from_iter(vec!["hcme", "--settings", "other.toml", "init-db"]);
        assert_eq!("other.toml", args.settings_path());
    }
}

//! Small utilities shared by every crate in the toolkit: logging setup, a hierarchical timer for
//! long-running loads, and formatting helpers.

#[macro_use]
extern crate log;

pub mod logger;
mod process;
mod time;
mod utils;

pub use crate::process::run_cmd;
pub use crate::time::{elapsed_seconds, prettyprint_time, Timer};
pub use crate::utils::{plain_list_names, prettyprint_usize};

const PROGRESS_FREQUENCY_SECONDS: f64 = 0.2;

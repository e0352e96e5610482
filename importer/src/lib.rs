//! Turns the raw inputs (parcel extracts, census extracts, zone boundaries, the simulator network,
//! and traveler diaries) into rows in the store.

#[macro_use]
extern crate log;

pub use crate::apn::{load_apns, ApnBlock};
pub use crate::block::{clean, extract, BlockError, DataBlock, Transform};
pub use crate::census::{load_census_blocks, parse_row as parse_census_row, CensusRecords};
pub use crate::diary::{read_diaries, DiaryBlock, DiaryRow};
pub use crate::frame::{CsvOptions, Frame, Row};
pub use crate::network::{load_network, Network};
pub use crate::taz::{load_tazs, read_zones, Zone};

mod apn;
mod block;
pub mod census;
mod diary;
mod frame;
pub mod network;
mod taz;

//! Traveler diaries from the regional travel model: one tab-separated row per trip, with zones
//! for the trip ends and the traveler's home.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::{extract, CsvOptions, DataBlock};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DiaryRow {
    pub person_id: i64,
    pub from_taz: i64,
    pub to_taz: i64,
    /// Hours after midnight
    pub depart: f64,
    pub home_taz: i64,
}

impl DiaryRow {
    /// Seconds after midnight
    pub fn departure_seconds(&self) -> f64 {
        self.depart * 3600.0
    }
}

pub struct DiaryBlock;

impl DataBlock for DiaryBlock {
    fn name(&self) -> &'static str {
        "drivers"
    }

    fn header_map(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            (";driver", "person_id"),
            ("from", "from_taz"),
            ("to", "to_taz"),
            ("depart", "depart"),
            ("home", "home_taz"),
        ]
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions::tsv()
    }
}

pub fn read_diaries<P: AsRef<Path>>(path: P) -> Result<Vec<DiaryRow>> {
    extract(&DiaryBlock, path)?.deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_diaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drivers.tsv");
        fs_err::write(
            &path,
            ";driver\tfrom\tto\tdepart\thome\tmode\n\
             1\t12\t14\t7.5\t12\tcar\n\
             1\t14\t12\t17\t12\tcar\n",
        )
        .unwrap();

        let rows = read_diaries(&path).unwrap();
        assert_eq!(
            DiaryRow {
                person_id: 1,
                from_taz: 12,
                to_taz: 14,
                depart: 7.5,
                home_taz: 12,
            },
            rows[0]
        );
        // Integral hours still read as floats
        assert_eq!(17.0 * 3600.0, rows[1].departure_seconds());
    }
}

//! Declarative cleaning for one raw input file. A block says how to rename, substitute, and fill
//! columns, and lists named transform steps; `extract` runs all of that in a fixed order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;

use hcme_store::schema::Table;

use crate::{CsvOptions, Frame};

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("{block} is missing columns {missing:?}; the file has {available:?}")]
    MissingColumns {
        block: String,
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error("transform {transform} on {block} produced no data")]
    InvalidTransform { block: String, transform: String },
}

/// One named cleaning step.
pub struct Transform<B> {
    pub name: &'static str,
    pub func: fn(&B, Frame) -> Result<Frame>,
}

impl<B> Transform<B> {
    pub fn new(name: &'static str, func: fn(&B, Frame) -> Result<Frame>) -> Transform<B> {
        Transform { name, func }
    }
}

pub trait DataBlock: Sized {
    fn name(&self) -> &'static str;

    /// Source column to target column. Every source column must exist; source columns not
    /// mentioned here are dropped.
    fn header_map(&self) -> Vec<(&'static str, &'static str)>;

    /// Like `header_map`, but the source column may be absent.
    fn optional_header_map(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// (column, from, to) substitutions, applied after renaming.
    fn attribute_map(&self) -> Vec<(&'static str, Value, Value)> {
        Vec::new()
    }

    /// Values for missing cells, per column.
    fn na_values(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    /// Constant columns added to every row. These survive renaming.
    fn defaults(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    /// Run in order. Every step has to leave at least one row.
    fn transforms(&self) -> Vec<Transform<Self>> {
        Vec::new()
    }

    /// If set, columns the table doesn't have are dropped at the end.
    fn table(&self) -> Option<&'static Table> {
        None
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions::default()
    }

    fn read(&self, path: &Path) -> Result<Frame> {
        Frame::read_csv(path, &self.csv_options())
    }
}

/// Reads a file and cleans it.
pub fn extract<B: DataBlock, P: AsRef<Path>>(block: &B, path: P) -> Result<Frame> {
    let path = path.as_ref();
    info!("Extracting {} from {}", block.name(), path.display());
    let frame = block.read(path)?;
    clean(block, frame)
}

pub fn clean<B: DataBlock>(block: &B, mut frame: Frame) -> Result<Frame> {
    let header_map = block.header_map();
    let missing: Vec<String> = header_map
        .iter()
        .filter(|(from, _)| !frame.has_column(from))
        .map(|(from, _)| from.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(BlockError::MissingColumns {
            block: block.name().to_string(),
            missing,
            available: frame.columns().to_vec(),
        }
        .into());
    }

    let defaults = block.defaults();
    for (column, value) in &defaults {
        frame.assign(*column, value.clone());
    }

    let mut rename = BTreeMap::new();
    let mut keep: BTreeSet<String> = defaults.iter().map(|(c, _)| c.to_string()).collect();
    for (from, to) in header_map
        .into_iter()
        .chain(block.optional_header_map().into_iter())
    {
        if frame.has_column(from) {
            rename.insert(from.to_string(), to.to_string());
            keep.insert(to.to_string());
        }
    }
    frame.rename(&rename);
    frame.select(&keep);

    for (column, from, to) in block.attribute_map() {
        frame.replace(column, &from, &to);
    }
    for (column, value) in block.na_values() {
        frame.fill_null(column, &value);
    }

    for transform in block.transforms() {
        debug!("Applying transform {} on block {}", transform.name, block.name());
        frame = (transform.func)(block, frame)?;
        if frame.is_empty() {
            return Err(BlockError::InvalidTransform {
                block: block.name().to_string(),
                transform: transform.name.to_string(),
            }
            .into());
        }
    }

    if let Some(table) = block.table() {
        let keep: BTreeSet<String> = frame
            .columns()
            .iter()
            .filter(|c| table.has_column(c))
            .cloned()
            .collect();
        frame.select(&keep);
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use hcme_store::schema::TAZS;

    struct Zones {
        keep_none: bool,
    }

    impl DataBlock for Zones {
        fn name(&self) -> &'static str {
            "zones"
        }

        fn header_map(&self) -> Vec<(&'static str, &'static str)> {
            vec![("ZONE", "id"), ("LABEL", "name"), ("AREA", "area")]
        }

        fn attribute_map(&self) -> Vec<(&'static str, Value, Value)> {
            vec![("name", json!("?"), json!("unknown"))]
        }

        fn na_values(&self) -> Vec<(&'static str, Value)> {
            vec![("area", json!(0.0))]
        }

        fn defaults(&self) -> Vec<(&'static str, Value)> {
            vec![("source", json!("test"))]
        }

        fn transforms(&self) -> Vec<Transform<Self>> {
            vec![
                Transform::new("uppercase", |_, mut frame| {
                    frame.derive("name", |row| {
                        json!(row.str("name").map(|n| n.to_uppercase()))
                    });
                    Ok(frame)
                }),
                Transform::new("maybe_drop_all", |block: &Zones, mut frame| {
                    if block.keep_none {
                        frame.filter(|_| false);
                    }
                    Ok(frame)
                }),
            ]
        }

        fn table(&self) -> Option<&'static Table> {
            Some(&TAZS)
        }
    }

    const INPUT: &str = "ZONE,LABEL,AREA,EXTRA\n1,north,3.5,x\n2,?,,y\n";

    fn frame() -> Frame {
        Frame::from_reader(INPUT.as_bytes(), &CsvOptions::default()).unwrap()
    }

    #[test]
    fn test_clean_order() {
        let block = Zones { keep_none: false };
        let cleaned = clean(&block, frame()).unwrap();
        // EXTRA was never mapped, area and source aren't in the table
        assert_eq!(vec!["id", "name"], cleaned.columns());
        let records = cleaned.into_records();
        assert_eq!(json!("NORTH"), records[0]["name"]);
        assert_eq!(json!("UNKNOWN"), records[1]["name"]);
    }

    #[test]
    fn test_missing_columns() {
        let block = Zones { keep_none: false };
        let input = "ZONE,LABEL\n1,north\n";
        let err = clean(
            &block,
            Frame::from_reader(input.as_bytes(), &CsvOptions::default()).unwrap(),
        )
        .unwrap_err();
        match err.downcast_ref::<BlockError>() {
            Some(BlockError::MissingColumns { missing, .. }) => {
                assert_eq!(&vec!["AREA".to_string()], missing)
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_transform_output() {
        let block = Zones { keep_none: true };
        let err = clean(&block, frame()).unwrap_err();
        match err.downcast_ref::<BlockError>() {
            Some(BlockError::InvalidTransform { transform, .. }) => {
                assert_eq!("maybe_drop_all", transform)
            }
            other => panic!("expected InvalidTransform, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.csv");
        fs_err::write(&path, INPUT).unwrap();
        let frame = extract(&Zones { keep_none: false }, &path).unwrap();
        assert_eq!(2, frame.len());
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use hcme_store::Record;

/// How to read a delimited file.
#[derive(Clone, Debug)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Columns that stay text even when every value looks numeric, like parcel ids with leading
    /// zeroes
    pub text_columns: BTreeSet<String>,
}

impl Default for CsvOptions {
    fn default() -> CsvOptions {
        CsvOptions {
            delimiter: b',',
            text_columns: BTreeSet::new(),
        }
    }
}

impl CsvOptions {
    pub fn tsv() -> CsvOptions {
        CsvOptions {
            delimiter: b'\t',
            ..Default::default()
        }
    }

    pub fn text<I: Into<String>>(mut self, column: I) -> CsvOptions {
        self.text_columns.insert(column.into());
        self
    }
}

/// A small column-ordered table. Cells are JSON values, so a row converts directly into a store
/// `Record`.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

static NULL: Value = Value::Null;

/// A borrowed view of one row.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Null if the column doesn't exist.
    pub fn get(&self, column: &str) -> &'a Value {
        let values = self.values;
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => &values[idx],
            None => &NULL,
        }
    }

    pub fn str(&self, column: &str) -> Option<&'a str> {
        self.get(column).as_str()
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).as_f64()
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|x| x.fract() == 0.0).map(|x| x as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Frame {
        Frame {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "Row has {} values, but the frame has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P, opts: &CsvOptions) -> Result<Frame> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        Frame::from_reader(file, opts).with_context(|| format!("reading {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R, opts: &CsvOptions) -> Result<Frame> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(opts.delimiter)
            .flexible(true)
            .from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut raw: Vec<Vec<String>> = Vec::new();
        for rec in reader.records() {
            let rec = rec?;
            let mut row: Vec<String> = rec.iter().map(|x| x.to_string()).collect();
            row.resize(columns.len(), String::new());
            raw.push(row);
        }

        let kinds: Vec<Kind> = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if opts.text_columns.contains(name) {
                    Kind::Text
                } else {
                    Kind::infer(raw.iter().map(|row| row[idx].as_str()))
                }
            })
            .collect();

        let rows = raw
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(kinds.iter())
                    .map(|(cell, kind)| kind.parse(cell))
                    .collect()
            })
            .collect();
        Ok(Frame { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Renames columns. Columns not mentioned keep their name.
    pub fn rename(&mut self, mapping: &BTreeMap<String, String>) {
        for c in &mut self.columns {
            if let Some(to) = mapping.get(c.as_str()) {
                *c = to.clone();
            }
        }
    }

    /// Keeps only the named columns, preserving their current order.
    pub fn select(&mut self, keep: &BTreeSet<String>) {
        let retain: Vec<bool> = self.columns.iter().map(|c| keep.contains(c)).collect();
        let mut idx = 0;
        self.columns.retain(|_| {
            idx += 1;
            retain[idx - 1]
        });
        for row in &mut self.rows {
            let mut idx = 0;
            row.retain(|_| {
                idx += 1;
                retain[idx - 1]
            });
        }
    }

    pub fn drop_columns(&mut self, columns: &[&str]) {
        let keep: BTreeSet<String> = self
            .columns
            .iter()
            .filter(|c| !columns.contains(&c.as_str()))
            .cloned()
            .collect();
        self.select(&keep);
    }

    /// Sets a column to one value in every row, creating it if needed.
    pub fn assign<I: Into<String>>(&mut self, column: I, value: Value) {
        let column = column.into();
        match self.position(&column) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(column);
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Computes a column from every row, creating or overwriting it.
    pub fn derive<I: Into<String>, F: FnMut(Row) -> Value>(&mut self, column: I, mut f: F) {
        let values: Vec<Value> = self.rows().map(|row| f(row)).collect();
        let column = column.into();
        let idx = match self.position(&column) {
            Some(idx) => idx,
            None => {
                self.columns.push(column);
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
    }

    /// Replaces every occurrence of one value in a column.
    pub fn replace(&mut self, column: &str, from: &Value, to: &Value) {
        if let Some(idx) = self.position(column) {
            for row in &mut self.rows {
                if &row[idx] == from {
                    row[idx] = to.clone();
                }
            }
        }
    }

    pub fn fill_null(&mut self, column: &str, value: &Value) {
        if let Some(idx) = self.position(column) {
            for row in &mut self.rows {
                if row[idx].is_null() {
                    row[idx] = value.clone();
                }
            }
        }
    }

    pub fn filter<F: FnMut(Row) -> bool>(&mut self, mut f: F) {
        let columns = &self.columns;
        self.rows.retain(|values| f(Row { columns, values }));
    }

    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }

    /// Deserializes every row into a typed struct. Fields are matched by column name.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut result = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let object: serde_json::Map<String, Value> =
                self.columns.iter().cloned().zip(row.iter().cloned()).collect();
            result.push(
                serde_json::from_value(Value::Object(object))
                    .with_context(|| format!("row {}", idx + 1))?,
            );
        }
        Ok(result)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Integer,
    Real,
    Text,
}

impl Kind {
    fn infer<'a, I: Iterator<Item = &'a str>>(cells: I) -> Kind {
        let mut kind = Kind::Integer;
        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if kind == Kind::Integer && cell.parse::<i64>().is_err() {
                kind = Kind::Real;
            }
            if kind == Kind::Real && cell.parse::<f64>().is_err() {
                return Kind::Text;
            }
        }
        kind
    }

    fn parse(self, cell: String) -> Value {
        if cell.trim().is_empty() {
            return Value::Null;
        }
        match self {
            Kind::Integer => cell
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::Null),
            // NaN has no JSON representation, so it reads as missing
            Kind::Real => cell
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Kind::Text => Value::String(cell),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    const PARCELS: &str = "APN,agg.taz,weight,use\n\
                           0010101,12,1.5,Residential\n\
                           0010102,,2,Commercial\n\
                           ROAD,13,NaN,\n";

    #[test]
    fn test_type_inference() {
        let frame = Frame::from_reader(PARCELS.as_bytes(), &CsvOptions::default()).unwrap();
        let rows: Vec<Row> = frame.rows().collect();
        assert_eq!(&json!("0010101"), rows[0].get("APN"));
        assert_eq!(&json!(12), rows[0].get("agg.taz"));
        assert_eq!(&Value::Null, rows[1].get("agg.taz"));
        assert_eq!(&json!(1.5), rows[0].get("weight"));
        assert_eq!(&Value::Null, rows[2].get("weight"));
        assert_eq!(&Value::Null, rows[2].get("use"));
        assert_eq!(&Value::Null, rows[0].get("no such column"));
    }

    #[test]
    fn test_text_columns() {
        let input = "id,zip\n1,95501\n2,95521\n";
        let frame = Frame::from_reader(input.as_bytes(), &CsvOptions::default().text("zip")).unwrap();
        assert_eq!(Some("95501"), frame.rows().next().unwrap().str("zip"));
        assert_eq!(Some(1), frame.rows().next().unwrap().i64("id"));
    }

    #[test]
    fn test_column_operations() {
        let mut frame = Frame::from_reader(PARCELS.as_bytes(), &CsvOptions::default()).unwrap();
        let mut mapping = BTreeMap::new();
        mapping.insert("APN".to_string(), "parcel_id".to_string());
        frame.rename(&mapping);
        frame.assign("residential", json!(false));
        frame.fill_null("agg.taz", &json!(0));
        frame.replace("use", &json!("Commercial"), &json!("commercial"));
        frame.drop_columns(&["weight"]);
        frame.filter(|row| row.i64("agg.taz") != Some(13));
        frame.derive("taz_id", |row| json!(row.i64("agg.taz")));

        assert_eq!(
            vec!["parcel_id", "agg.taz", "use", "residential", "taz_id"],
            frame.columns()
        );
        let records = frame.into_records();
        assert_eq!(2, records.len());
        assert_eq!(json!(0), records[1]["taz_id"]);
        assert_eq!(json!("commercial"), records[1]["use"]);
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Parcel {
            #[serde(rename = "APN")]
            apn: String,
            weight: Option<f64>,
        }
        let frame = Frame::from_reader(PARCELS.as_bytes(), &CsvOptions::default()).unwrap();
        let parcels: Vec<Parcel> = frame.deserialize().unwrap();
        assert_eq!("ROAD", parcels[2].apn);
        assert_eq!(Some(2.0), parcels[1].weight);
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut frame = Frame::new(vec!["a".to_string()]);
        assert!(frame.push_row(vec![json!(1)]).is_ok());
        assert!(frame.push_row(vec![json!(1), json!(2)]).is_err());
    }
}

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{quote, Table};
use crate::{Error, Result, Store};

/// One row to load, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// SQLite refuses statements with more bound parameters than this, on older builds.
const MAX_PARAMETERS: usize = 999;

/// Buffers records destined for one table and writes them in batches. Each batch is one
/// atomic write of `INSERT ... ON CONFLICT (grain) DO UPDATE`, so loading the same records twice
/// leaves the table unchanged.
///
/// Callers must `finish` the loader; anything still buffered when it's dropped is lost.
pub struct Loader<'a> {
    store: &'a Store,
    table: &'static Table,
    grain: Vec<&'static str>,
    exclude: BTreeSet<String>,
    batch_size: usize,
    buffer: Vec<Record>,
    total: usize,
}

impl<'a> Loader<'a> {
    /// An empty grain means plain inserts with no conflict handling.
    pub fn new(store: &'a Store, table: &'static Table, grain: &[&str]) -> Result<Loader<'a>> {
        let mut checked_grain = Vec::new();
        for column in grain {
            match table.columns().find(|c| c == column) {
                Some(c) => checked_grain.push(c),
                None => {
                    return Err(Error::UnknownColumn {
                        table: table.name.to_string(),
                        column: column.to_string(),
                    });
                }
            }
        }
        let mut exclude: BTreeSet<String> = checked_grain.iter().map(|c| c.to_string()).collect();
        exclude.insert("id".to_string());
        exclude.insert("created_at".to_string());

        Ok(Loader {
            store,
            table,
            grain: checked_grain,
            exclude,
            batch_size: 1000,
            buffer: Vec::new(),
            total: 0,
        })
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replaces the default set of columns that are never overwritten on conflict.
    pub fn exclude<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.exclude = fields.into_iter().map(|f| f.into()).collect();
        self
    }

    /// Buffers a record, flushing if the batch is full. Returns the number of rows written by
    /// this call.
    pub fn stream(&mut self, record: Record) -> Result<usize> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            return self.flush();
        }
        Ok(0)
    }

    /// Like `stream`, for anything that serializes to a JSON object.
    pub fn stream_row<T: Serialize>(&mut self, row: &T) -> Result<usize> {
        match serde_json::to_value(row)? {
            Value::Object(record) => self.stream(record),
            other => Err(Error::UnknownColumn {
                table: self.table.name.to_string(),
                column: format!("<non-object row {}>", other),
            }),
        }
    }

    /// Buffers and writes everything.
    pub fn load<I: IntoIterator<Item = Record>>(&mut self, records: I) -> Result<usize> {
        let mut n = 0;
        for record in records {
            n += self.stream(record)?;
        }
        n += self.flush()?;
        Ok(n)
    }

    /// Writes the buffer atomically. The buffer is consumed even if this fails; nothing
    /// from the failed batch is committed.
    pub fn flush(&mut self) -> Result<usize> {
        let batch = std::mem::take(&mut self.buffer);
        if batch.is_empty() {
            return Ok(0);
        }
        self.validate(&batch)?;

        // Records might not all have the same columns. Group the ones that do, so missing
        // columns fall back to the table's defaults instead of NULL.
        let mut groups: BTreeMap<Vec<&'static str>, Vec<&Record>> = BTreeMap::new();
        for record in &batch {
            let columns: Vec<&'static str> = self
                .table
                .columns()
                .filter(|c| record.contains_key(*c))
                .collect();
            groups.entry(columns).or_insert_with(Vec::new).push(record);
        }

        let store = self.store;
        store.atomically(|| -> Result<()> {
            for (columns, records) in &groups {
                let rows_per_statement = (MAX_PARAMETERS / columns.len().max(1)).max(1);
                for chunk in records.chunks(rows_per_statement) {
                    let sql = self.statement(columns, chunk.len());
                    let mut params: Vec<SqlValue> =
                        Vec::with_capacity(chunk.len() * columns.len());
                    for record in chunk {
                        for c in columns {
                            params.push(to_sql_value(&record[*c]));
                        }
                    }
                    store
                        .conn()
                        .execute(&sql, rusqlite::params_from_iter(params))?;
                }
            }
            Ok(())
        })?;

        let n = batch.len();
        self.total += n;
        info!("Loaded {} rows to {}", n, self.table.name);
        Ok(n)
    }

    /// Flushes anything left and returns how many rows this loader wrote in total.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        Ok(self.total)
    }

    fn validate(&self, batch: &[Record]) -> Result<()> {
        for record in batch {
            for column in &self.grain {
                if !record.contains_key(*column) {
                    return Err(Error::MissingGrainColumn {
                        table: self.table.name.to_string(),
                        column: column.to_string(),
                    });
                }
            }
            for column in record.keys() {
                if !self.table.has_column(column) {
                    return Err(Error::UnknownColumn {
                        table: self.table.name.to_string(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn statement(&self, columns: &[&str], rows: usize) -> String {
        let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table.name,
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            vec![placeholders; rows].join(", ")
        );
        if !self.grain.is_empty() {
            let mut updates: Vec<String> = columns
                .iter()
                .filter(|c| !self.exclude.contains(**c) && **c != "modified_at")
                .map(|c| format!("{} = excluded.{}", quote(c), quote(c)))
                .collect();
            updates.push("modified_at = CURRENT_TIMESTAMP".to_string());
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                self.grain
                    .iter()
                    .map(|c| quote(c))
                    .collect::<Vec<_>>()
                    .join(", "),
                updates.join(", ")
            ));
        }
        sql
    }
}

impl Drop for Loader<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                "Loader for {} dropped with {} unflushed rows",
                self.table.name,
                self.buffer.len()
            );
        }
    }
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

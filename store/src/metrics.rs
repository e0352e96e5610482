//! Named, domain-scoped results of some computation, kept in the store and pushed to export
//! targets on demand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};

use crate::schema::METRICS;
use crate::{Error, Loader, Result, Store};

/// Everything about a metric except its value.
#[derive(Clone, Debug)]
pub struct MetricSpec {
    pub domain: String,
    pub name: String,
    pub description: String,
    /// Where the value came from, usually the command or module that computed it
    pub provenance: String,
    /// Hooks to run every time this metric is exported
    pub export_hooks: Vec<String>,
}

impl MetricSpec {
    pub fn new<I: Into<String>>(domain: I, name: I, description: I, provenance: I) -> MetricSpec {
        MetricSpec {
            domain: domain.into(),
            name: name.into(),
            description: description.into(),
            provenance: provenance.into(),
            export_hooks: Vec::new(),
        }
    }

    pub fn export_with<I: Into<String>>(mut self, hook: I) -> MetricSpec {
        self.export_hooks.push(hook.into());
        self
    }
}

/// A recorded metric, as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub domain: String,
    pub name: String,
    pub description: String,
    pub provenance: String,
    pub data: Value,
    pub export_hooks: Vec<String>,
    pub modified_at: String,
}

/// Records a metric, replacing anything previously recorded with the same domain and name.
pub fn record<T: Serialize>(store: &Store, spec: &MetricSpec, value: &T) -> Result<()> {
    let data =
        serde_json::to_value(value).map_err(|err| Error::InvalidMetricValue(err.to_string()))?;
    let mut loader = Loader::new(store, &METRICS, &["domain", "name"])?.batch_size(10);
    loader.stream_row(&json!({
        "domain": spec.domain,
        "name": spec.name,
        "description": spec.description,
        "provenance": spec.provenance,
        "data": data.to_string(),
        "export_hooks": serde_json::to_string(&spec.export_hooks)?,
    }))?;
    loader.finish()?;
    debug!("Recorded metric {}:{}", spec.domain, spec.name);
    Ok(())
}

/// Metrics matching an optional domain and name, ordered by domain then name.
pub fn select(store: &Store, domain: Option<&str>, name: Option<&str>) -> Result<Vec<Metric>> {
    let mut stmt = store.conn().prepare(
        "SELECT domain, name, description, provenance, data, export_hooks, modified_at
         FROM metrics
         WHERE (?1 IS NULL OR domain = ?1) AND (?2 IS NULL OR name = ?2)
         ORDER BY domain, name",
    )?;
    let raw = stmt
        .query_map(rusqlite::params![domain, name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut metrics = Vec::new();
    for (domain, name, description, provenance, data, hooks, modified_at) in raw {
        metrics.push(Metric {
            domain,
            name,
            description,
            provenance,
            data: match data {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            },
            export_hooks: serde_json::from_str(&hooks)?,
            modified_at,
        });
    }
    Ok(metrics)
}

pub fn list(store: &Store) -> Result<Vec<Metric>> {
    select(store, None, None)
}

pub type ExportHook = Box<dyn Fn(&Metric) -> Result<()>>;

/// Export targets, looked up by name.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, ExportHook>,
}

impl HookRegistry {
    pub fn new() -> HookRegistry {
        HookRegistry::default()
    }

    /// `csv` and `json`, both writing to `<output_dir>/<domain>/<name>.<extension>`.
    pub fn with_defaults<P: AsRef<Path>>(output_dir: P) -> HookRegistry {
        let mut registry = HookRegistry::new();
        let dir = output_dir.as_ref().to_path_buf();
        registry.register("csv", move |metric| {
            metric_to_csv(metric, &output_path(&dir, metric, "csv"))
        });
        let dir = output_dir.as_ref().to_path_buf();
        registry.register("json", move |metric| {
            metric_to_json(metric, &output_path(&dir, metric, "json"))
        });
        registry
    }

    pub fn register<I: Into<String>, F: Fn(&Metric) -> Result<()> + 'static>(
        &mut self,
        name: I,
        hook: F,
    ) {
        self.hooks.insert(name.into(), Box::new(hook));
    }

    pub fn get(&self, name: &str) -> Result<&ExportHook> {
        self.hooks
            .get(name)
            .ok_or_else(|| Error::UnknownHook(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.hooks.keys()
    }
}

/// Runs export hooks for every matching metric: the hooks passed here first, then the ones
/// stored with the metric, each at most once. Every hook is resolved before any runs, so an
/// unknown name fails without partial output. Returns the number of hook calls.
pub fn export(
    store: &Store,
    registry: &HookRegistry,
    domain: Option<&str>,
    name: Option<&str>,
    hooks: &[String],
) -> Result<usize> {
    let metrics = select(store, domain, name)?;
    let mut plan: Vec<(&Metric, Vec<&ExportHook>)> = Vec::new();
    for metric in &metrics {
        let mut names: Vec<&String> = Vec::new();
        for hook in hooks.iter().chain(metric.export_hooks.iter()) {
            if !names.contains(&hook) {
                names.push(hook);
            }
        }
        let resolved = names
            .into_iter()
            .map(|n| registry.get(n))
            .collect::<Result<Vec<_>>>()?;
        plan.push((metric, resolved));
    }

    let mut calls = 0;
    for (metric, hooks) in plan {
        info!("Exporting {}:{}", metric.domain, metric.name);
        for hook in hooks {
            hook(metric)?;
            calls += 1;
        }
    }
    Ok(calls)
}

fn output_path(dir: &Path, metric: &Metric, extension: &str) -> PathBuf {
    dir.join(&metric.domain)
        .join(format!("{}.{}", metric.name, extension))
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    Ok(())
}

fn metric_to_json(metric: &Metric, path: &Path) -> Result<()> {
    prepare(path)?;
    info!("Exporting data to {}", path.display());
    fs_err::write(path, serde_json::to_string_pretty(&metric.data)?)?;
    Ok(())
}

/// Writes record-format data (a list of objects) as a CSV. A single object becomes one row, an
/// object of equal-length lists is treated as columns, and a scalar becomes a one-cell table.
fn metric_to_csv(metric: &Metric, path: &Path) -> Result<()> {
    let rows = to_rows(&metric.data).ok_or_else(|| {
        Error::export(format!(
            "{}:{} isn't tabular and can't be written as a CSV",
            metric.domain, metric.name
        ))
    })?;

    let mut header: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }

    prepare(path)?;
    info!("Exporting data to {}", path.display());
    let mut writer = csv::Writer::from_writer(fs_err::File::create(path)?);
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(header.iter().map(|key| match row.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }))?;
    }
    writer.flush()?;
    Ok(())
}

fn to_rows(data: &Value) -> Option<Vec<serde_json::Map<String, Value>>> {
    match data {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Some(map.clone()),
                Value::Array(_) => None,
                scalar => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), scalar.clone());
                    Some(map)
                }
            })
            .collect(),
        Value::Object(map) if !map.is_empty() && map.values().all(|v| v.is_array()) => {
            let len = map.values().filter_map(|v| v.as_array()).map(|v| v.len()).max()?;
            Some(
                (0..len)
                    .map(|i| {
                        map.iter()
                            .map(|(k, v)| {
                                (k.clone(), v.get(i).cloned().unwrap_or(Value::Null))
                            })
                            .collect()
                    })
                    .collect(),
            )
        }
        Value::Object(map) => Some(vec![map.clone()]),
        Value::Null => None,
        scalar => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), scalar.clone());
            Some(vec![map])
        }
    }
}

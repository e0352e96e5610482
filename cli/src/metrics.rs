use std::path::Path;

use anyhow::Result;

use hcme_store::{HookRegistry, Metric, Store};

/// One line per metric, under a banner for each domain.
pub fn describe(metrics: &[Metric]) -> String {
    let mut out = String::new();
    let mut domain: Option<&str> = None;
    for metric in metrics {
        if domain != Some(metric.domain.as_str()) {
            out.push_str(&format!(
                "{}\nDomain: {}\n{}\n",
                "=".repeat(15),
                metric.domain,
                "-".repeat(15)
            ));
            domain = Some(metric.domain.as_str());
        }
        out.push_str(&format!("{}: {}\n", metric.name, metric.description));
    }
    out
}

pub fn export(
    store: &Store,
    output_dir: &Path,
    domain: Option<&str>,
    name: Option<&str>,
    mut hooks: Vec<String>,
) -> Result<()> {
    if hooks.is_empty() {
        hooks.push("csv".to_string());
    }
    let registry = HookRegistry::with_defaults(output_dir.join("metrics"));
    let calls = hcme_store::export(store, &registry, domain, name, &hooks)?;
    info!("Ran {} export hooks", calls);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(domain: &str, name: &str) -> Metric {
        Metric {
            domain: domain.to_string(),
            name: name.to_string(),
            description: format!("About {}", name),
            provenance: "test".to_string(),
            data: serde_json::json!([]),
            export_hooks: Vec::new(),
            modified_at: String::new(),
        }
    }

    #[test]
    fn test_describe() {
        let text = describe(&[
            metric("demand", "household-assignment"),
            metric("demand", "travel-diary-summaries"),
            metric("demand/destination-od-matrix", "morning"),
        ]);
        assert_eq!(2, text.matches("Domain: ").count());
        assert!(text.contains("morning: About morning\n"));
    }

    #[test]
    fn test_export_defaults_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        hcme_store::record(
            &store,
            &hcme_store::MetricSpec::new("demand", "sizes", "Sizes", "test"),
            &serde_json::json!([{"zone": 1, "households": 3}]),
        )
        .unwrap();

        export(&store, dir.path(), Some("demand"), None, Vec::new()).unwrap();
        assert!(dir.path().join("metrics/demand/sizes.csv").exists());
    }
}

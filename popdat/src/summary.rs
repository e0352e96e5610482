//! Where trips go, by time of day: an origin city by destination city matrix of trip counts.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde_json::{Map, Value};

use hcme_store::{MetricSpec, OdTrip, Store};

pub const DOMAIN: &str = "demand/destination-od-matrix";

/// Named ranges of departure hours. Night wraps around midnight, and includes hour 24 for trips
/// departing after the simulated day.
pub const TIME_BINS: [(&str, &[i64]); 5] = [
    ("pre-dawn", &[3, 4, 5]),
    ("morning", &[6, 7, 8, 9, 10]),
    ("noon", &[11, 12, 13, 14, 15]),
    ("evening", &[16, 17, 18, 19, 20, 21]),
    ("night", &[0, 1, 2, 22, 23, 24]),
];

pub struct DemandMatrix {
    /// Only keep destination cities with more than this many trips
    pub threshold: Option<usize>,
    /// Only keep the busiest destination cities
    pub top_n: Option<usize>,
}

impl Default for DemandMatrix {
    fn default() -> DemandMatrix {
        DemandMatrix {
            threshold: None,
            top_n: Some(10),
        }
    }
}

fn hour(trip: &OdTrip) -> i64 {
    (trip.departure / 3600.0).floor() as i64
}

/// Sorts by count descending, breaking ties by name.
fn ranked(counts: BTreeMap<&str, usize>) -> Vec<(&str, usize)> {
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

impl DemandMatrix {
    /// One object per origin city (sorted), with a count per destination city. Destination
    /// columns are ordered by total trips, busiest first. Missing pairs are null.
    pub fn calculate(&self, trips: &[OdTrip], hours: &[i64]) -> Vec<Map<String, Value>> {
        let trips: Vec<(&str, &str)> = trips
            .iter()
            .filter(|t| hours.contains(&hour(t)))
            .filter_map(|t| match (&t.origin_city, &t.destination_city) {
                (Some(o), Some(d)) => Some((o.as_str(), d.as_str())),
                _ => None,
            })
            .collect();

        let mut per_destination: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, destination) in &trips {
            *per_destination.entry(destination).or_insert(0) += 1;
        }
        let mut cities: Vec<&str> = ranked(per_destination)
            .into_iter()
            .filter(|(_, count)| self.threshold.map(|t| *count > t).unwrap_or(true))
            .map(|(city, _)| city)
            .collect();
        if let Some(n) = self.top_n {
            cities.truncate(n);
        }
        let cities: BTreeSet<&str> = cities.into_iter().collect();

        let mut pairs: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
        let mut column_totals: BTreeMap<&str, usize> = BTreeMap::new();
        for (origin, destination) in trips {
            if !cities.contains(destination) {
                continue;
            }
            *pairs
                .entry(origin)
                .or_default()
                .entry(destination)
                .or_insert(0) += 1;
            *column_totals.entry(destination).or_insert(0) += 1;
        }
        let columns: Vec<&str> = ranked(column_totals).into_iter().map(|(c, _)| c).collect();

        pairs
            .into_iter()
            .map(|(origin, counts)| {
                let mut row = Map::new();
                row.insert("origin_city".to_string(), Value::from(origin));
                for column in &columns {
                    row.insert(
                        column.to_string(),
                        counts.get(column).map(|n| Value::from(*n)).unwrap_or(Value::Null),
                    );
                }
                row
            })
            .collect()
    }

    /// Records one metric per time bin. Returns their names.
    pub fn record_metrics(&self, store: &Store, export_hooks: &[String]) -> Result<Vec<String>> {
        let trips = store.od_trips()?;
        let mut names = Vec::new();
        for (name, hours) in TIME_BINS {
            let matrix = self.calculate(&trips, hours);
            let mut spec = MetricSpec::new(
                DOMAIN.to_string(),
                name.to_string(),
                format!(
                    "Summary of origin-destinations at the nearest postal city level during the \
                     hours of {}",
                    name
                ),
                module_path!().to_string(),
            );
            for hook in export_hooks {
                spec = spec.export_with(hook.clone());
            }
            hcme_store::record(store, &spec, &matrix)?;
            info!("Recorded {}/{} with {} origins", DOMAIN, name, matrix.len());
            names.push(name.to_string());
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn trip(trip_id: i64, hour: f64, origin: &str, destination: &str) -> OdTrip {
        OdTrip {
            trip_id,
            departure: hour * 3600.0,
            origin_city: Some(origin.to_string()),
            destination_city: Some(destination.to_string()),
        }
    }

    fn trips() -> Vec<OdTrip> {
        vec![
            trip(1, 7.0, "Arcata", "Eureka"),
            trip(2, 7.5, "Arcata", "Eureka"),
            trip(3, 8.0, "Arcata", "Eureka"),
            trip(4, 8.0, "Eureka", "Eureka"),
            trip(5, 9.0, "Eureka", "Arcata"),
            trip(6, 9.9, "Eureka", "Arcata"),
            trip(7, 10.0, "Fortuna", "Fortuna"),
            // Not in the morning
            trip(8, 12.0, "Arcata", "Eureka"),
            OdTrip {
                trip_id: 9,
                departure: 8.0 * 3600.0,
                origin_city: None,
                destination_city: Some("Eureka".to_string()),
            },
        ]
    }

    #[test]
    fn test_morning_matrix() {
        let matrix = DemandMatrix::default().calculate(&trips(), TIME_BINS[1].1);
        assert_eq!(3, matrix.len());
        assert_eq!(
            json!({"origin_city": "Arcata", "Eureka": 3, "Arcata": null, "Fortuna": null}),
            Value::Object(matrix[0].clone())
        );
        let columns: Vec<&String> = matrix[1].keys().collect();
        assert_eq!(vec!["origin_city", "Eureka", "Arcata", "Fortuna"], columns);
    }

    #[test]
    fn test_threshold_and_top_n() {
        let matrix = DemandMatrix {
            threshold: Some(1),
            top_n: None,
        }
        .calculate(&trips(), TIME_BINS[1].1);
        // Fortuna only has one trip
        assert_eq!(2, matrix.len());
        assert!(!matrix[0].contains_key("Fortuna"));

        let matrix = DemandMatrix {
            threshold: None,
            top_n: Some(1),
        }
        .calculate(&trips(), TIME_BINS[1].1);
        assert_eq!(vec!["origin_city", "Eureka"], matrix[0].keys().collect::<Vec<_>>());
    }

    #[test]
    fn test_record_metrics() {
        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        let names = DemandMatrix::default()
            .record_metrics(&store, &["csv".to_string()])
            .unwrap();
        assert_eq!(5, names.len());
        let metrics = hcme_store::select(&store, Some(DOMAIN), None).unwrap();
        assert_eq!(5, metrics.len());
        assert_eq!(vec!["csv".to_string()], metrics[0].export_hooks);
    }
}

//! Reading the simulator's per-iteration event logs back, to see where a person actually drove.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Deserialize;

use hcme_store::Store;

/// The event files of one simulator iteration.
#[derive(Debug)]
pub struct OutputRegistry {
    pub iteration: usize,
    pub events: PathBuf,
    pub physsim: PathBuf,
}

impl OutputRegistry {
    /// Without an explicit iteration, uses the second-to-last one found, since the last may still
    /// be incomplete.
    pub fn new<P: AsRef<Path>>(root: P, iteration: Option<usize>) -> Result<OutputRegistry> {
        let iters_dir = root.as_ref().join("ITERS");
        if !iters_dir.is_dir() {
            bail!("{} doesn't exist", iters_dir.display());
        }
        let iteration = match iteration {
            Some(i) => i,
            None => {
                let mut found = Vec::new();
                for entry in fs_err::read_dir(&iters_dir)? {
                    let name = entry?.file_name();
                    if let Some(n) = name
                        .to_str()
                        .and_then(|n| n.strip_prefix("it."))
                        .and_then(|n| n.parse::<usize>().ok())
                    {
                        found.push(n);
                    }
                }
                found.sort_unstable();
                match found.len() {
                    0 => bail!("No iterations in {}", iters_dir.display()),
                    1 => found[0],
                    n => found[n - 2],
                }
            }
        };

        let dir = iters_dir.join(format!("it.{}", iteration));
        if !dir.is_dir() {
            bail!("{} doesn't exist", dir.display());
        }
        Ok(OutputRegistry {
            iteration,
            events: dir.join(format!("{}.events.csv", iteration)),
            physsim: dir.join(format!("{}.physSimEvents.csv", iteration)),
        })
    }
}

/// The handful of columns needed from either event log. Anything else is ignored.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub person: Option<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub link: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Event {
    fn is(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_reader(fs_err::File::open(path)?);
    let mut events = Vec::new();
    for rec in reader.deserialize() {
        events.push(rec.with_context(|| format!("reading {}", path.display()))?);
    }
    Ok(events)
}

/// Every link the person traversed, in order, each listed once. A vehicle's movements count while
/// the person is inside it, from entering to leaving, inclusive.
pub fn route(agent_events: &[Event], physsim_events: &[Event], person_id: &str) -> Vec<i64> {
    let mine: Vec<&Event> = agent_events
        .iter()
        .filter(|e| e.person.as_deref() == Some(person_id))
        .collect();
    let enters = mine.iter().filter(|e| e.is("PersonEntersVehicle"));
    let leaves = mine.iter().filter(|e| e.is("PersonLeavesVehicle"));
    let windows: Vec<(f64, f64, &str)> = enters
        .zip(leaves)
        .filter_map(|(enter, leave)| {
            Some((enter.time?, leave.time?, enter.vehicle.as_deref()?))
        })
        .collect();

    let mut events: Vec<&Event> = mine.clone();
    events.extend(physsim_events.iter().filter(|e| match (e.time, e.vehicle.as_deref()) {
        (Some(time), Some(vehicle)) => windows
            .iter()
            .any(|(start, end, v)| *v == vehicle && time >= *start && time <= *end),
        _ => false,
    }));
    // Stable, so ties keep agent events first
    events.sort_by(|a, b| {
        a.time
            .unwrap_or(f64::NAN)
            .total_cmp(&b.time.unwrap_or(f64::NAN))
    });

    let mut seen = BTreeSet::new();
    let mut route = Vec::new();
    for link in events.into_iter().filter_map(|e| e.link) {
        let link = link as i64;
        if seen.insert(link) {
            route.push(link);
        }
    }
    route
}

pub fn person_route(registry: &OutputRegistry, person_id: &str) -> Result<Vec<i64>> {
    let agent_events = read_events(&registry.events)?;
    let physsim_events = read_events(&registry.physsim)?;
    let route = route(&agent_events, &physsim_events, person_id);
    info!(
        "Person {} traversed {} links in iteration {}",
        person_id,
        route.len(),
        registry.iteration
    );
    Ok(route)
}

/// One line feature per link, in route order. Links missing from the store are skipped.
pub fn route_geojson(store: &Store, route: &[i64]) -> Result<FeatureCollection> {
    let ids: BTreeSet<i64> = route.iter().copied().collect();
    let geometries = store.link_geometries(&ids)?;

    let mut features = Vec::new();
    for (order, link_id) in route.iter().enumerate() {
        let link = match geometries.get(link_id) {
            Some(link) => link,
            None => {
                warn!("Link {} isn't in the network", link_id);
                continue;
            }
        };
        let geometry = geom::from_wkt(&link.geometry)?;
        let mut feature = Feature {
            bbox: None,
            geometry: Some(Geometry {
                bbox: None,
                value: Value::from(&geometry),
                foreign_members: None,
            }),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("link_id", *link_id);
        feature.set_property("order", order);
        features.push(feature);
    }
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: &str = "person,vehicle,time,link,type,legMode
1,,100,,actend,
1,car-1,110,,PersonEntersVehicle,
2,car-2,120,,PersonEntersVehicle,
1,car-1,300,,PersonLeavesVehicle,
2,car-2,300,,PersonLeavesVehicle,
1,,300,,arrival,car
";

    const PHYSSIM: &str = "person,vehicle,time,link,type
,car-1,105,9,entered link
,car-1,110,5,entered link
,car-2,130,7,entered link
,car-1,200,6,entered link
,car-1,250,5,left link
,car-1,300,8,entered link
,car-1,301,4,entered link
";

    fn write_outputs(root: &Path, iteration: usize) {
        let dir = root.join(format!("ITERS/it.{}", iteration));
        fs_err::create_dir_all(&dir).unwrap();
        fs_err::write(dir.join(format!("{}.events.csv", iteration)), EVENTS).unwrap();
        fs_err::write(dir.join(format!("{}.physSimEvents.csv", iteration)), PHYSSIM).unwrap();
    }

    #[test]
    fn test_default_iteration() {
        let dir = tempfile::tempdir().unwrap();
        write_outputs(dir.path(), 0);
        assert_eq!(0, OutputRegistry::new(dir.path(), None).unwrap().iteration);

        write_outputs(dir.path(), 1);
        write_outputs(dir.path(), 10);
        let registry = OutputRegistry::new(dir.path(), None).unwrap();
        assert_eq!(1, registry.iteration);
        assert!(registry.physsim.ends_with("ITERS/it.1/1.physSimEvents.csv"));

        assert_eq!(10, OutputRegistry::new(dir.path(), Some(10)).unwrap().iteration);
        assert!(OutputRegistry::new(dir.path(), Some(3)).is_err());
    }

    #[test]
    fn test_person_route() {
        let dir = tempfile::tempdir().unwrap();
        write_outputs(dir.path(), 2);
        let registry = OutputRegistry::new(dir.path(), None).unwrap();
        assert_eq!(vec![5, 6, 8], person_route(&registry, "1").unwrap());
        assert_eq!(vec![7], person_route(&registry, "2").unwrap());
        assert!(person_route(&registry, "3").unwrap().is_empty());
    }

    #[test]
    fn test_route_geojson() {
        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO nodes (id, x, y, coordinates) VALUES
                    (1, -124.1, 40.8, 'POINT(-124.1 40.8)'), (2, -124.0, 40.9, 'POINT(-124 40.9)');
                 INSERT INTO links (id, from_node_id, to_node_id) VALUES (5, 1, 2), (6, 2, 1);",
            )
            .unwrap();

        let collection = route_geojson(&store, &[6, 99, 5]).unwrap();
        assert_eq!(2, collection.features.len());
        let first = &collection.features[0];
        assert_eq!(Some(&serde_json::json!(6)), first.property("link_id"));
        assert_eq!(Some(&serde_json::json!(0)), first.property("order"));
        assert!(matches!(
            first.geometry.as_ref().unwrap().value,
            Value::LineString(_)
        ));
        assert_eq!(
            Some(&serde_json::json!(2)),
            collection.features[1].property("order")
        );
    }
}

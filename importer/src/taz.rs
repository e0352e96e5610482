//! Aggregated traffic analysis zones, exported from GIS as KML. The zone id and name only live
//! inside each placemark's free-form description.

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use geom::{to_wkt, GPSBounds};
use hcme_store::schema::TAZS;
use hcme_store::{Loader, Store};
use hcme_util::Timer;

lazy_static! {
    static ref ZONE_ID: Regex = Regex::new(r"^id:\s(\d+)\W+br\W+").unwrap();
    static ref ZONE_NAME: Regex = Regex::new(r"name:\s(\w+)$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub geometry: String,
}

/// Pulls (id, name) out of something like `id: 101 <br> name: Arcata`.
pub fn parse_description(description: &str) -> Result<(i64, String)> {
    let description = description.trim();
    let id = ZONE_ID
        .captures(description)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .ok_or_else(|| anyhow!("No zone id in description {:?}", description))?;
    let name = ZONE_NAME
        .captures(description)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| anyhow!("No zone name in description {:?}", description))?;
    Ok((id, name))
}

pub fn read_zones(path: &str, timer: &mut Timer) -> Result<Vec<Zone>> {
    let placemarks = kml::load(path, &GPSBounds::world(), timer)?;
    let mut zones = Vec::new();
    for placemark in placemarks {
        let description = placemark
            .description()
            .ok_or_else(|| anyhow!("Placemark without a description in {}", path))?;
        let (id, name) = parse_description(description)?;
        zones.push(Zone {
            id,
            name,
            geometry: to_wkt(&placemark.multi_polygon()),
        });
    }
    Ok(zones)
}

/// Upserts every zone by id. Returns the number written.
pub fn load_tazs(store: &Store, path: &str, timer: &mut Timer) -> Result<usize> {
    let zones = read_zones(path, timer)?;
    let mut loader = Loader::new(store, &TAZS, &["id"])?;
    for zone in &zones {
        loader.stream_row(zone)?;
    }
    Ok(loader.finish()?)
}

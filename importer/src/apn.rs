//! County parcel extracts become locations: every parcel with a zone and a real parcel number.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use geom::{to_wkt, LonLat};
use hcme_store::schema::{Table, LOCATIONS};
use hcme_store::{Loader, Store};
use hcme_util::Timer;

use crate::{extract, CsvOptions, DataBlock, Frame, Transform};

lazy_static! {
    static ref PARCEL_NUMBER: Regex = Regex::new(r"^\d+").unwrap();
}

pub struct ApnBlock;

impl DataBlock for ApnBlock {
    fn name(&self) -> &'static str {
        "parcels"
    }

    fn header_map(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("APN", "parcel_id"),
            ("agg.taz", "taz_id"),
            ("lat", "lat"),
            ("long", "long"),
            ("type", "parcel_type"),
            ("use", "use"),
            ("ZONING", "zone_type"),
            ("SITCITY", "city"),
            ("weight", "weight"),
        ]
    }

    fn optional_header_map(&self) -> Vec<(&'static str, &'static str)> {
        vec![("GEOID", "census_block_geoid")]
    }

    fn na_values(&self) -> Vec<(&'static str, Value)> {
        vec![("weight", json!(1.0))]
    }

    fn transforms(&self) -> Vec<Transform<Self>> {
        vec![
            Transform::new("drop_data", |_, frame| Ok(drop_data(frame))),
            Transform::new("cast_taz", |_, frame| Ok(cast_taz(frame))),
            Transform::new("flag_residential", |_, frame| Ok(flag_residential(frame))),
            Transform::new("create_coordinates", |_, frame| {
                Ok(create_coordinates(frame))
            }),
        ]
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&LOCATIONS)
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions::default().text("APN").text("GEOID")
    }
}

/// Only keep parcels inside a zone, with a parcel number starting with digits.
fn drop_data(mut frame: Frame) -> Frame {
    frame.filter(|row| {
        !row.get("taz_id").is_null()
            && row
                .str("parcel_id")
                .map(|id| PARCEL_NUMBER.is_match(id))
                .unwrap_or(false)
    });
    frame
}

/// Zones sometimes come through as floats.
fn cast_taz(mut frame: Frame) -> Frame {
    frame.derive("taz_id", |row| json!(row.i64("taz_id")));
    frame
}

fn flag_residential(mut frame: Frame) -> Frame {
    frame.derive("residential", |row| {
        json!(row
            .str("use")
            .map(|x| x.to_lowercase().contains("resid"))
            .unwrap_or(false))
    });
    frame
}

fn create_coordinates(mut frame: Frame) -> Frame {
    frame.derive("coordinates", |row| match (row.f64("long"), row.f64("lat")) {
        (Some(lon), Some(lat)) => json!(to_wkt(&LonLat::new(lon, lat).to_point())),
        _ => Value::Null,
    });
    frame
}

/// Loads parcels into locations, keyed by parcel and zone. Returns the number of rows written.
pub fn load_apns(store: &Store, path: &str, batch_size: usize, timer: &mut Timer) -> Result<usize> {
    timer.start("extract parcels");
    let frame = extract(&ApnBlock, path)?;
    timer.stop("extract parcels");

    let mut loader = Loader::new(store, &LOCATIONS, &["parcel_id", "taz_id"])?.batch_size(batch_size);
    let records = frame.into_records();
    timer.start_iter("load parcels", records.len());
    for record in records {
        timer.next();
        loader.stream(record)?;
    }
    Ok(loader.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean;

    const PARCELS: &str = "APN,AREA,agg.taz,lat,long,type,use,ZONING,SITCITY,weight\n\
        0010101,10,12.0,40.80,-124.16,SFR,Residential,R-1,EUREKA,2\n\
        0010102,11,12.0,40.81,-124.15,Store,Commercial,C-2,EUREKA,\n\
        ROAD-1,12,12.0,40.82,-124.14,,,,,1\n\
        0010104,13,,40.83,-124.13,SFR,Residential,R-1,ARCATA,1\n";

    fn frame() -> Frame {
        Frame::from_reader(PARCELS.as_bytes(), &ApnBlock.csv_options()).unwrap()
    }

    #[test]
    fn test_clean_parcels() {
        let records = clean(&ApnBlock, frame()).unwrap().into_records();
        assert_eq!(2, records.len());

        let home = &records[0];
        assert_eq!(json!("0010101"), home["parcel_id"]);
        assert_eq!(json!(12), home["taz_id"]);
        assert_eq!(json!(true), home["residential"]);
        assert_eq!(json!("POINT(-124.16 40.8)"), home["coordinates"]);
        assert_eq!(json!("EUREKA"), home["city"]);
        // Not a location column
        assert!(!home.contains_key("AREA"));

        assert_eq!(json!(false), records[1]["residential"]);
        assert_eq!(json!(1.0), records[1]["weight"]);
    }

    #[test]
    fn test_load_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apns.csv");
        fs_err::write(&path, PARCELS).unwrap();

        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        let mut timer = Timer::throwaway();
        let path = path.display().to_string();
        assert_eq!(2, load_apns(&store, &path, 1, &mut timer).unwrap());
        assert_eq!(2, load_apns(&store, &path, 1, &mut timer).unwrap());
        assert_eq!(2, store.count(&LOCATIONS).unwrap());
        assert_eq!(1, store.residential_candidates(12).unwrap().len());
    }
}

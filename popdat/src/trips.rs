//! Turn each person's zone-level diary into trips between concrete locations.

use std::collections::BTreeMap;

use anyhow::Result;
use rand_xorshift::XorShiftRng;
use serde::Serialize;

use hcme_store::schema::TRIPS;
use hcme_store::{Destination, Loader, MetricSpec, Store};
use hcme_util::{prettyprint_usize, Timer};
use importer::DiaryRow;

use crate::sampling::{choose_weighted, SamplingError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trip {
    pub person_id: i64,
    pub trip_leg: i64,
    /// Seconds after midnight
    pub departure: f64,
    pub origin_location_id: i64,
    pub destination_location_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiarySummary {
    pub persons: usize,
    pub trips: usize,
    pub skipped_persons: usize,
    pub max_legs: usize,
}

/// Non-residential locations, grouped by zone.
pub struct Destinations {
    by_zone: BTreeMap<i64, Vec<Destination>>,
}

impl Destinations {
    pub fn new(all: Vec<Destination>) -> Destinations {
        let mut by_zone: BTreeMap<i64, Vec<Destination>> = BTreeMap::new();
        for d in all {
            by_zone.entry(d.taz_id).or_default().push(d);
        }
        Destinations { by_zone }
    }

    fn sample(&self, taz_id: i64, rng: &mut XorShiftRng) -> Result<i64, SamplingError> {
        let candidates = self
            .by_zone
            .get(&taz_id)
            .map(|x| x.as_slice())
            .unwrap_or(&[]);
        Ok(choose_weighted(candidates, |d| d.weight, rng, "destinations", taz_id)?.location_id)
    }
}

/// Builds one person's trips. The legs are numbered from 1 in departure order, and each leg
/// starts where the previous one ended. The first leg leaves from home if it starts in the home
/// zone, and the last leg returns home if it ends there.
pub fn person_trips(
    person_id: i64,
    mut rows: Vec<&DiaryRow>,
    home_location_id: i64,
    destinations: &Destinations,
    rng: &mut XorShiftRng,
) -> Result<Vec<Trip>, SamplingError> {
    rows.sort_by(|a, b| a.depart.total_cmp(&b.depart));
    let num_legs = rows.len();
    let mut trips = Vec::new();
    let mut origin: Option<i64> = None;
    for (idx, row) in rows.into_iter().enumerate() {
        let first = idx == 0;
        let last = idx == num_legs - 1;

        let origin_location_id = match origin {
            Some(id) => id,
            None if first && row.from_taz == row.home_taz => home_location_id,
            None => destinations.sample(row.from_taz, rng)?,
        };
        let destination_location_id = if last && row.to_taz == row.home_taz {
            home_location_id
        } else {
            destinations.sample(row.to_taz, rng)?
        };

        trips.push(Trip {
            person_id,
            trip_leg: (idx + 1) as i64,
            departure: row.departure_seconds(),
            origin_location_id,
            destination_location_id,
        });
        origin = Some(destination_location_id);
    }
    Ok(trips)
}

/// Writes trips for every person in the diaries who has a household. Anyone without a home or
/// whose trips can't be sampled is skipped entirely.
pub fn build_trips(
    store: &Store,
    diaries: &[DiaryRow],
    batch_size: usize,
    rng: &mut XorShiftRng,
    timer: &mut Timer,
) -> Result<DiarySummary> {
    let homes = store.home_locations()?;
    let destinations = Destinations::new(store.destinations()?);

    let mut by_person: BTreeMap<i64, Vec<&DiaryRow>> = BTreeMap::new();
    for row in diaries {
        by_person.entry(row.person_id).or_default().push(row);
    }

    let mut summary = DiarySummary::default();
    let mut loader =
        Loader::new(store, &TRIPS, &["person_id", "trip_leg"])?.batch_size(batch_size);
    timer.start_iter("build trips", by_person.len());
    for (person_id, rows) in by_person {
        timer.next();
        let result = match homes.get(&person_id) {
            Some(home) => person_trips(person_id, rows, *home, &destinations, rng),
            None => Err(SamplingError::MissingHome { person_id }),
        };
        match result {
            Ok(trips) => {
                summary.persons += 1;
                summary.trips += trips.len();
                summary.max_legs = summary.max_legs.max(trips.len());
                for trip in &trips {
                    loader.stream_row(trip)?;
                }
            }
            Err(err) => {
                timer.warn(format!("Skipping person {}: {}", person_id, err));
                summary.skipped_persons += 1;
            }
        }
    }
    loader.finish()?;

    timer.note(format!(
        "Built {} trips for {} people, skipped {}",
        prettyprint_usize(summary.trips),
        prettyprint_usize(summary.persons),
        prettyprint_usize(summary.skipped_persons)
    ));
    hcme_store::record(
        store,
        &MetricSpec::new(
            "demand",
            "travel-diary-summaries",
            "Travel Diary Summaries",
            module_path!(),
        ),
        &summary,
    )?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::rng;

    fn diary(person_id: i64, from_taz: i64, to_taz: i64, depart: f64, home_taz: i64) -> DiaryRow {
        DiaryRow {
            person_id,
            from_taz,
            to_taz,
            depart,
            home_taz,
        }
    }

    fn destinations() -> Destinations {
        let d = |location_id, taz_id| Destination {
            location_id,
            taz_id,
            weight: 1.0,
        };
        Destinations::new(vec![d(10, 12), d(11, 12), d(20, 14), d(21, 14), d(30, 16)])
    }

    #[test]
    fn test_legs_are_contiguous() {
        let rows = vec![
            diary(1, 14, 16, 12.0, 12),
            diary(1, 12, 14, 7.5, 12),
            diary(1, 16, 12, 17.25, 12),
        ];
        let trips = person_trips(1, rows.iter().collect(), 99, &destinations(), &mut rng(42))
            .unwrap();

        assert_eq!(vec![1, 2, 3], trips.iter().map(|t| t.trip_leg).collect::<Vec<_>>());
        assert_eq!(7.5 * 3600.0, trips[0].departure);
        // Forced home at both ends
        assert_eq!(99, trips[0].origin_location_id);
        assert_eq!(99, trips[2].destination_location_id);
        for pair in trips.windows(2) {
            assert_eq!(pair[0].destination_location_id, pair[1].origin_location_id);
        }
        assert!([20, 21].contains(&trips[0].destination_location_id));
        assert_eq!(30, trips[1].destination_location_id);
    }

    #[test]
    fn test_home_only_forced_in_home_zone() {
        // Starts and ends away from the home zone 12
        let rows = vec![diary(1, 14, 16, 8.0, 12), diary(1, 16, 14, 9.0, 12)];
        let trips = person_trips(1, rows.iter().collect(), 99, &destinations(), &mut rng(42))
            .unwrap();
        assert!([20, 21].contains(&trips[0].origin_location_id));
        assert!([20, 21].contains(&trips[1].destination_location_id));
    }

    #[test]
    fn test_unsatisfiable_person() {
        let rows = vec![diary(1, 12, 77, 8.0, 12)];
        let err = person_trips(1, rows.iter().collect(), 99, &destinations(), &mut rng(42))
            .unwrap_err();
        assert_eq!(
            SamplingError::NoCandidates {
                what: "destinations",
                taz_id: 77
            },
            err
        );
    }

    #[test]
    fn test_build_trips() {
        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO locations (id, parcel_id, taz_id, weight, residential) VALUES
                    (1, 'home', 12, 1, 1), (2, 'shop', 14, 1, 0);
                 INSERT INTO households (id, location_id) VALUES (1, 1);
                 INSERT INTO persons (id, household_id) VALUES (1, 1);",
            )
            .unwrap();
        let diaries = vec![
            diary(1, 12, 14, 8.0, 12),
            diary(1, 14, 12, 17.0, 12),
            // No household
            diary(2, 12, 14, 8.0, 12),
        ];

        let mut timer = Timer::throwaway();
        for _ in 0..2 {
            let summary = build_trips(&store, &diaries, 10, &mut rng(42), &mut timer).unwrap();
            assert_eq!(1, summary.persons);
            assert_eq!(1, summary.skipped_persons);
        }
        assert_eq!(2, store.count(&TRIPS).unwrap());
        assert_eq!(2, timer.warnings().len());
        let metric =
            hcme_store::select(&store, Some("demand"), Some("travel-diary-summaries")).unwrap();
        assert_eq!(serde_json::json!(2), metric[0].data["trips"]);
    }
}

//! Place every traveler from the diaries into a household at a residential location in their home
//! zone.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use rand_xorshift::XorShiftRng;
use serde::Serialize;

use hcme_store::schema::{HOUSEHOLDS, PERSONS};
use hcme_store::{HouseholdSize, Loader, MetricSpec, ResidentialCandidate, Store};
use hcme_util::{prettyprint_usize, Timer};
use importer::DiaryRow;

use crate::sampling::{choose_weighted, SamplingError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewHousehold {
    pub id: i64,
    pub location_id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewPerson {
    pub id: i64,
    pub household_id: i64,
}

/// What happened in one zone.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub taz_id: i64,
    pub travelers: usize,
    pub new_households: usize,
    /// Every household in the zone afterwards, including ones from earlier runs
    pub households: usize,
    pub households_per_traveler: f64,
}

#[derive(Debug, Default)]
pub struct AssignmentSummary {
    pub zones: Vec<ZoneSummary>,
    /// Zones abandoned, with the reason
    pub skipped: Vec<(i64, SamplingError)>,
    /// Travelers who were already persons before this run
    pub existing_travelers: usize,
}

/// The new rows for one zone, nothing written yet.
#[derive(Debug, Default, PartialEq)]
pub struct ZoneAssignment {
    pub households: Vec<NewHousehold>,
    pub persons: Vec<NewPerson>,
}

/// Each person's home zone, from the first trip they take.
pub fn home_zones(diaries: &[DiaryRow]) -> BTreeMap<i64, BTreeSet<i64>> {
    let mut first_trip: BTreeMap<i64, &DiaryRow> = BTreeMap::new();
    for row in diaries {
        let entry = first_trip.entry(row.person_id).or_insert(row);
        if row.depart < entry.depart {
            *entry = row;
        }
    }
    let mut zones: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for (person, row) in first_trip {
        zones.entry(row.home_taz).or_default().insert(person);
    }
    zones
}

/// Assigns travelers in one zone. `next_household_id` only advances if the whole zone succeeds.
pub fn assign_zone(
    taz_id: i64,
    travelers: &BTreeSet<i64>,
    mut candidates: Vec<ResidentialCandidate>,
    mut households: Vec<HouseholdSize>,
    next_household_id: &mut i64,
    rng: &mut XorShiftRng,
) -> Result<ZoneAssignment, SamplingError> {
    let mut result = ZoneAssignment::default();
    let mut next_id = *next_household_id;

    for person in travelers {
        let idx = {
            let location =
                choose_weighted(&candidates, |c| c.weight, rng, "residential locations", taz_id)?;
            candidates
                .iter()
                .position(|c| c.location_id == location.location_id)
                .unwrap_or(0)
        };
        let location = &mut candidates[idx];

        let household_id = if (location.households as f64) < location.weight {
            let id = next_id;
            next_id += 1;
            location.households += 1;
            result.households.push(NewHousehold {
                id,
                location_id: location.location_id,
            });
            households.push(HouseholdSize {
                household_id: id,
                location_id: location.location_id,
                members: 0,
            });
            id
        } else {
            // The location is full, so move in with someone already there. Bigger households are
            // more likely to grow.
            let location_id = location.location_id;
            let residents: Vec<&HouseholdSize> = households
                .iter()
                .filter(|h| h.location_id == location_id)
                .collect();
            if residents.is_empty() {
                return Err(SamplingError::NoHouseholds { location_id });
            }
            choose_weighted(
                &residents,
                |h| h.members as f64,
                rng,
                "households",
                taz_id,
            )?
            .household_id
        };

        if let Some(h) = households
            .iter_mut()
            .find(|h| h.household_id == household_id)
        {
            h.members += 1;
        }
        result.persons.push(NewPerson {
            id: *person,
            household_id,
        });
    }

    *next_household_id = next_id;
    Ok(result)
}

/// Creates households and persons for every traveler not already in the store. A zone where
/// sampling fails is skipped whole; its error is reported in the summary.
pub fn assign_households(
    store: &Store,
    diaries: &[DiaryRow],
    rng: &mut XorShiftRng,
    timer: &mut Timer,
) -> Result<AssignmentSummary> {
    let existing = store.person_ids()?;
    let zones = home_zones(diaries);
    let mut summary = AssignmentSummary::default();
    let mut next_household_id = store.next_id(&HOUSEHOLDS)?;

    timer.start_iter("assign households", zones.len());
    for (taz_id, travelers) in zones {
        timer.next();
        let before = travelers.len();
        let travelers: BTreeSet<i64> = travelers.difference(&existing).copied().collect();
        summary.existing_travelers += before - travelers.len();
        if travelers.is_empty() {
            continue;
        }

        let candidates = store.residential_candidates(taz_id)?;
        let households = store.households_in_taz(taz_id)?;
        let num_existing = households.len();
        let assignment = match assign_zone(
            taz_id,
            &travelers,
            candidates,
            households,
            &mut next_household_id,
            rng,
        ) {
            Ok(x) => x,
            Err(err) => {
                error!("Skipping zone {}: {}", taz_id, err);
                summary.skipped.push((taz_id, err));
                continue;
            }
        };

        // A zone's households and persons land together or not at all
        store.atomically(|| -> Result<()> {
            let mut loader = Loader::new(store, &HOUSEHOLDS, &["id"])?;
            for household in &assignment.households {
                loader.stream_row(household)?;
            }
            loader.finish()?;
            let mut loader = Loader::new(store, &PERSONS, &["id"])?;
            for person in &assignment.persons {
                loader.stream_row(person)?;
            }
            loader.finish()?;
            Ok(())
        })?;

        let households = num_existing + assignment.households.len();
        summary.zones.push(ZoneSummary {
            taz_id,
            travelers: travelers.len(),
            new_households: assignment.households.len(),
            households,
            households_per_traveler: households as f64 / travelers.len() as f64,
        });
    }

    timer.note(format!(
        "Assigned {} zones, skipped {}, {} travelers already had households",
        prettyprint_usize(summary.zones.len()),
        prettyprint_usize(summary.skipped.len()),
        prettyprint_usize(summary.existing_travelers)
    ));
    if summary.zones.is_empty() {
        return Ok(summary);
    }
    hcme_store::record(
        store,
        &MetricSpec::new(
            "demand",
            "household-assignment",
            "Travelers and households per home zone",
            module_path!(),
        ),
        &summary.zones,
    )?;
    Ok(summary)
}

//! Typed reads used by the synthesizers, input generators, and summaries.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::params;
use serde::Serialize;

use crate::{Result, Store};

/// A residential location, with how many households already live there.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidentialCandidate {
    pub location_id: i64,
    pub weight: f64,
    pub households: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HouseholdSize {
    pub household_id: i64,
    pub location_id: i64,
    pub members: usize,
}

/// A non-residential location trips can start or end at.
#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub location_id: i64,
    pub taz_id: i64,
    pub weight: f64,
}

/// One trip, joined with everything needed to describe it as part of a plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanLeg {
    pub person_id: i64,
    pub trip_leg: i64,
    /// Seconds after midnight
    pub departure: f64,
    pub home_location_id: i64,
    pub origin_location_id: i64,
    pub origin: (f64, f64),
    pub destination_location_id: i64,
    pub destination: (f64, f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HouseholdMembers {
    pub household_id: i64,
    pub location_id: i64,
    pub census_block_geoid: Option<String>,
    /// (longitude, latitude) of the home
    pub home: (f64, f64),
    /// Sorted by id
    pub members: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncomeBracket {
    pub pct: f64,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OdTrip {
    pub trip_id: i64,
    pub departure: f64,
    pub origin_city: Option<String>,
    pub destination_city: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkGeometry {
    pub link_id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
    /// WKT LINESTRING
    pub geometry: String,
}

impl Store {
    /// Residential locations in a zone, ordered by id.
    pub fn residential_candidates(&self, taz_id: i64) -> Result<Vec<ResidentialCandidate>> {
        let mut stmt = self.conn().prepare(
            "SELECT locations.id, locations.weight, COUNT(households.id)
             FROM locations
             LEFT JOIN households ON households.location_id = locations.id
             WHERE locations.taz_id = ?1 AND locations.residential = 1
             GROUP BY locations.id
             ORDER BY locations.id",
        )?;
        let rows = stmt
            .query_map(params![taz_id], |row| {
                Ok(ResidentialCandidate {
                    location_id: row.get(0)?,
                    weight: row.get(1)?,
                    households: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Existing households in a zone with their member counts, ordered by id.
    pub fn households_in_taz(&self, taz_id: i64) -> Result<Vec<HouseholdSize>> {
        let mut stmt = self.conn().prepare(
            "SELECT households.id, households.location_id, COUNT(persons.id)
             FROM households
             JOIN locations ON households.location_id = locations.id
             LEFT JOIN persons ON persons.household_id = households.id
             WHERE locations.taz_id = ?1
             GROUP BY households.id
             ORDER BY households.id",
        )?;
        let rows = stmt
            .query_map(params![taz_id], |row| {
                Ok(HouseholdSize {
                    household_id: row.get(0)?,
                    location_id: row.get(1)?,
                    members: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn person_ids(&self) -> Result<BTreeSet<i64>> {
        let mut stmt = self.conn().prepare("SELECT id FROM persons")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
        Ok(ids)
    }

    /// Person id to the location of their household.
    pub fn home_locations(&self) -> Result<BTreeMap<i64, i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT persons.id, households.location_id
             FROM persons
             JOIN households ON persons.household_id = households.id",
        )?;
        let homes = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<i64, i64>>>()?;
        Ok(homes)
    }

    /// Every non-residential location, ordered by id.
    pub fn destinations(&self) -> Result<Vec<Destination>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, taz_id, weight FROM locations WHERE residential = 0 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Destination {
                    location_id: row.get(0)?,
                    taz_id: row.get(1)?,
                    weight: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every trip with a resolvable origin and destination point, ordered by person and leg.
    pub fn plan_legs(&self) -> Result<Vec<PlanLeg>> {
        let mut stmt = self.conn().prepare(
            "SELECT trips.person_id, trips.trip_leg, trips.departure, households.location_id,
                origins.id, origins.long, origins.lat,
                destinations.id, destinations.long, destinations.lat
             FROM trips
             JOIN persons ON trips.person_id = persons.id
             JOIN households ON persons.household_id = households.id
             JOIN locations origins ON trips.origin_location_id = origins.id
             JOIN locations destinations ON trips.destination_location_id = destinations.id
             WHERE origins.long IS NOT NULL AND origins.lat IS NOT NULL
                AND destinations.long IS NOT NULL AND destinations.lat IS NOT NULL
             ORDER BY trips.person_id, trips.trip_leg",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PlanLeg {
                    person_id: row.get(0)?,
                    trip_leg: row.get(1)?,
                    departure: row.get(2)?,
                    home_location_id: row.get(3)?,
                    origin_location_id: row.get(4)?,
                    origin: (row.get(5)?, row.get(6)?),
                    destination_location_id: row.get(7)?,
                    destination: (row.get(8)?, row.get(9)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Households whose home has coordinates, ordered by id.
    pub fn households_with_members(&self) -> Result<Vec<HouseholdMembers>> {
        let mut stmt = self.conn().prepare(
            "SELECT households.id, households.location_id, locations.census_block_geoid,
                locations.long, locations.lat, persons.id
             FROM households
             JOIN locations ON households.location_id = locations.id
             LEFT JOIN persons ON persons.household_id = households.id
             WHERE locations.long IS NOT NULL AND locations.lat IS NOT NULL
             ORDER BY households.id, persons.id",
        )?;
        let mut rows = stmt.query([])?;
        let mut result: Vec<HouseholdMembers> = Vec::new();
        while let Some(row) = rows.next()? {
            let household_id: i64 = row.get(0)?;
            let member: Option<i64> = row.get(5)?;
            if result.last().map(|h| h.household_id) != Some(household_id) {
                result.push(HouseholdMembers {
                    household_id,
                    location_id: row.get(1)?,
                    census_block_geoid: row.get(2)?,
                    home: (row.get(3)?, row.get(4)?),
                    members: Vec::new(),
                });
            }
            if let (Some(id), Some(household)) = (member, result.last_mut()) {
                household.members.push(id);
            }
        }
        Ok(result)
    }

    pub fn income_brackets(&self, block_id: &str) -> Result<Vec<IncomeBracket>> {
        let mut stmt = self.conn().prepare(
            "SELECT pct, household_income_lower_bound, household_income_upper_bound
             FROM census_block_economics
             WHERE block_id = ?1
             ORDER BY household_income_lower_bound",
        )?;
        let rows = stmt
            .query_map(params![block_id], |row| {
                Ok(IncomeBracket {
                    pct: row.get(0)?,
                    lower_bound: row.get(1)?,
                    upper_bound: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn od_trips(&self) -> Result<Vec<OdTrip>> {
        let mut stmt = self.conn().prepare(
            "SELECT trips.id, trips.departure, origins.city, destinations.city
             FROM trips
             JOIN locations origins ON trips.origin_location_id = origins.id
             JOIN locations destinations ON trips.destination_location_id = destinations.id
             ORDER BY trips.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OdTrip {
                    trip_id: row.get(0)?,
                    departure: row.get(1)?,
                    origin_city: row.get(2)?,
                    destination_city: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Link geometries for the given ids. Unknown ids are silently missing from the result.
    pub fn link_geometries(&self, link_ids: &BTreeSet<i64>) -> Result<BTreeMap<i64, LinkGeometry>> {
        let mut stmt = self.conn().prepare(
            "SELECT link_id, from_node_id, to_node_id, geometry
             FROM link_geometries WHERE link_id = ?1",
        )?;
        let mut result = BTreeMap::new();
        for id in link_ids {
            let mut rows = stmt.query(params![id])?;
            if let Some(row) = rows.next()? {
                result.insert(
                    *id,
                    LinkGeometry {
                        link_id: row.get(0)?,
                        from_node_id: row.get(1)?,
                        to_node_id: row.get(2)?,
                        geometry: row.get(3)?,
                    },
                );
            }
        }
        Ok(result)
    }

    /// Every (from, to) node pair that already has a link.
    pub fn link_node_pairs(&self) -> Result<BTreeSet<(i64, i64)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT from_node_id, to_node_id FROM links")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeSet<(i64, i64)>>>()?;
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO locations (id, parcel_id, taz_id, lat, long, city, weight, residential, census_block_geoid)
                 VALUES (1, '1', 7, 40.8, -124.1, 'Eureka', 2, 1, '060230001001000'),
                        (2, '2', 7, 40.9, -124.0, 'Arcata', 3, 0, NULL),
                        (3, '3', 7, 40.7, -124.2, 'Eureka', 1, 1, NULL);
                 INSERT INTO households (id, location_id) VALUES (10, 1);
                 INSERT INTO persons (id, household_id) VALUES (100, 10), (101, 10);
                 INSERT INTO trips (id, person_id, trip_leg, departure, origin_location_id, destination_location_id)
                 VALUES (1, 100, 1, 28800, 1, 2), (2, 100, 2, 61200, 2, 1);
                 INSERT INTO nodes (id, x, y, coordinates) VALUES (1, -124.1, 40.8, 'POINT(-124.1 40.8)'),
                                                            (2, -124.0, 40.9, 'POINT(-124 40.9)');
                 INSERT INTO links (id, from_node_id, to_node_id) VALUES (5, 1, 2), (6, 1, 2);",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_synthesis_queries() {
        let store = fixture();
        assert_eq!(
            vec![
                ResidentialCandidate {
                    location_id: 1,
                    weight: 2.0,
                    households: 1
                },
                ResidentialCandidate {
                    location_id: 3,
                    weight: 1.0,
                    households: 0
                },
            ],
            store.residential_candidates(7).unwrap()
        );
        assert_eq!(
            vec![HouseholdSize {
                household_id: 10,
                location_id: 1,
                members: 2
            }],
            store.households_in_taz(7).unwrap()
        );
        assert!(store.households_in_taz(8).unwrap().is_empty());
        assert_eq!(Some(&1), store.home_locations().unwrap().get(&101));
        assert_eq!(1, store.destinations().unwrap().len());
    }

    #[test]
    fn test_input_queries() {
        let store = fixture();
        let legs = store.plan_legs().unwrap();
        assert_eq!(2, legs.len());
        assert_eq!((-124.0, 40.9), legs[0].destination);
        assert_eq!(1, legs[1].home_location_id);

        let households = store.households_with_members().unwrap();
        assert_eq!(1, households.len());
        assert_eq!(vec![100, 101], households[0].members);

        let od = store.od_trips().unwrap();
        assert_eq!(Some("Arcata".to_string()), od[0].destination_city);
    }

    #[test]
    fn test_link_geometries() {
        let store = fixture();
        let ids: BTreeSet<i64> = vec![5, 6, 99].into_iter().collect();
        let links = store.link_geometries(&ids).unwrap();
        assert_eq!(2, links.len());
        assert!(links[&5].geometry.starts_with("LINESTRING(-124.1 40.8, "));
        assert_eq!(1, store.link_node_pairs().unwrap().len());
    }
}

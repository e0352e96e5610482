use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use thiserror::Error;

/// Why a zone's households or a person's trips couldn't be synthesized. Each of these abandons
/// only that unit of work.
#[derive(Debug, Error, PartialEq)]
pub enum SamplingError {
    #[error("no {what} to sample from in zone {taz_id}")]
    NoCandidates { what: &'static str, taz_id: i64 },
    #[error("location {location_id} is full, but has no households to join")]
    NoHouseholds { location_id: i64 },
    #[error("can't sample {what} in zone {taz_id}: {reason}")]
    InvalidWeights {
        what: &'static str,
        taz_id: i64,
        reason: String,
    },
    #[error("person {person_id} doesn't belong to a household")]
    MissingHome { person_id: i64 },
}

pub fn rng(seed: u64) -> XorShiftRng {
    XorShiftRng::seed_from_u64(seed)
}

/// Picks one item, weighted. `what` and `taz_id` only describe the failure.
pub fn choose_weighted<'a, T, F: Fn(&T) -> f64>(
    items: &'a [T],
    weight: F,
    rng: &mut XorShiftRng,
    what: &'static str,
    taz_id: i64,
) -> Result<&'a T, SamplingError> {
    if items.is_empty() {
        return Err(SamplingError::NoCandidates { what, taz_id });
    }
    items
        .choose_weighted(rng, |x| weight(x))
        .map_err(|err| SamplingError::InvalidWeights {
            what,
            taz_id,
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_weighted() {
        let mut rng = rng(42);
        let items = vec![(1, 0.0), (2, 5.0)];
        for _ in 0..10 {
            assert_eq!(
                2,
                choose_weighted(&items, |(_, w)| *w, &mut rng, "locations", 7)
                    .unwrap()
                    .0
            );
        }

        let empty: Vec<(i64, f64)> = Vec::new();
        assert_eq!(
            Err(SamplingError::NoCandidates {
                what: "locations",
                taz_id: 7
            }),
            choose_weighted(&empty, |(_, w)| *w, &mut rng, "locations", 7)
        );
        assert!(matches!(
            choose_weighted(&[(1, 0.0)], |(_, w)| *w, &mut rng, "locations", 7),
            Err(SamplingError::InvalidWeights { .. })
        ));
    }
}

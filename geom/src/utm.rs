use anyhow::Result;
use proj::Proj;
use serde::{Deserialize, Serialize};

use crate::LonLat;

const WGS84: &str = "EPSG:4326";
/// UTM zone 10 north, where the simulator's network and plans live
const UTM_ZONE10: &str = "EPSG:32610";

/// A point in some UTM zone, in meters.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct UtmPt {
    pub x: f64,
    pub y: f64,
}

/// Converts between WGS84 and one projected CRS.
pub struct Utm {
    forwards: Proj,
    backwards: Proj,
}

impl Utm {
    pub fn zone10() -> Result<Utm> {
        Utm::new(UTM_ZONE10)
    }

    pub fn new(crs: &str) -> Result<Utm> {
        Ok(Utm {
            forwards: Proj::new_known_crs(WGS84, crs, None)?,
            backwards: Proj::new_known_crs(crs, WGS84, None)?,
        })
    }

    pub fn project(&self, pt: LonLat) -> Result<UtmPt> {
        let (x, y) = self.forwards.convert((pt.longitude, pt.latitude))?;
        Ok(UtmPt { x, y })
    }

    pub fn unproject(&self, pt: UtmPt) -> Result<LonLat> {
        let (lon, lat) = self.backwards.convert((pt.x, pt.y))?;
        Ok(LonLat::new(lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_meridian_on_equator() {
        let pt = Utm::zone10()
            .unwrap()
            .project(LonLat::new(-123.0, 0.0))
            .unwrap();
        assert!((pt.x - 500_000.0).abs() < 1e-3, "{:?}", pt);
        assert!(pt.y.abs() < 1e-3, "{:?}", pt);
    }

    #[test]
    fn test_round_trip() {
        let utm = Utm::zone10().unwrap();
        for pt in [
            LonLat::new(-124.1637, 40.8021),
            LonLat::new(-123.7935, 40.1000),
            LonLat::new(-122.5, 41.5),
        ] {
            let back = utm.unproject(utm.project(pt).unwrap()).unwrap();
            assert!((back.longitude - pt.longitude).abs() < 1e-7, "{} vs {}", back, pt);
            assert!((back.latitude - pt.latitude).abs() < 1e-7, "{} vs {}", back, pt);
        }
    }

    #[test]
    fn test_known_point() {
        // Eureka, CA is roughly 401km east, 4517km north in zone 10
        let pt = Utm::zone10()
            .unwrap()
            .project(LonLat::new(-124.1637, 40.8021))
            .unwrap();
        assert!((pt.x - 401_700.0).abs() < 2_000.0, "{:?}", pt);
        assert!((pt.y - 4_517_000.0).abs() < 2_000.0, "{:?}", pt);
    }

    #[test]
    fn test_unknown_crs() {
        assert!(Utm::new("EPSG:not-a-code").is_err());
    }
}

use anyhow::{anyhow, bail, Result};
use wkt::{ToWkt, TryFromWkt};

/// Geometry columns in the store hold WKT text, always in EPSG:4326.
pub fn to_wkt<G: ToWkt<f64>>(geometry: &G) -> String {
    geometry.wkt_string()
}

pub fn from_wkt(input: &str) -> Result<geo::Geometry<f64>> {
    geo::Geometry::<f64>::try_from_wkt_str(input)
        .map_err(|err| anyhow!("invalid WKT {}: {}", abbreviate(input), err))
}

/// Zone boundaries may be stored as a POLYGON or a MULTIPOLYGON; either way, treat them as a
/// MultiPolygon.
pub fn polygons_from_wkt(input: &str) -> Result<geo::MultiPolygon<f64>> {
    match from_wkt(input)? {
        geo::Geometry::Polygon(p) => Ok(geo::MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        _ => bail!("{} isn't a polygon", abbreviate(input)),
    }
}

fn abbreviate(input: &str) -> String {
    if input.chars().count() > 40 {
        format!("{}...", input.chars().take(40).collect::<String>())
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LonLat;

    #[test]
    fn test_points() {
        let wkt = to_wkt(&LonLat::new(-124.1, 40.8).to_point());
        assert_eq!("POINT(-124.1 40.8)", wkt);
        match from_wkt(&wkt).unwrap() {
            geo::Geometry::Point(pt) => {
                assert_eq!(-124.1, pt.x());
                assert_eq!(40.8, pt.y());
            }
            x => panic!("parsed {:?}", x),
        }
    }

    #[test]
    fn test_polygons() {
        let mp = polygons_from_wkt("POLYGON((0 0,1 0,1 1,0 1,0 0))").unwrap();
        assert_eq!(1, mp.0.len());
        let mp =
            polygons_from_wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((2 2,3 2,3 3,2 2)))").unwrap();
        assert_eq!(2, mp.0.len());
        assert!(polygons_from_wkt("POINT(1 2)").is_err());
        assert!(from_wkt("not wkt").is_err());
    }

    #[test]
    fn test_abbreviate() {
        let short = "POLYGON((0 0,1 0,1 1,0 1,0 0))";
        assert_eq!(short, abbreviate(short));
        // More than 40 bytes, but only 30 characters
        let wide = "é".repeat(30);
        assert_eq!(wide, abbreviate(&wide));
        let long = "ü".repeat(50);
        assert_eq!(format!("{}...", "ü".repeat(40)), abbreviate(&long));
    }
}

//! Reads KML files, like the aggregated traffic analysis zone boundaries exported from GIS
//! tools.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::collections::BTreeMap;

use anyhow::Result;

use geom::{GPSBounds, LonLat};
use hcme_util::{prettyprint_usize, Timer};

/// A single `<Placemark>` in the file.
#[derive(Clone, Debug)]
pub struct Placemark {
    /// Every polygon inside the placemark. A `<MultiGeometry>` produces several.
    pub polygons: Vec<geo::Polygon<f64>>,
    /// Standalone points
    pub points: Vec<LonLat>,
    /// `name`, `description`, and any `<SimpleData>` or `<Data>` key/value pairs. No known
    /// schema.
    pub attributes: BTreeMap<String, String>,
}

impl Placemark {
    pub fn multi_polygon(&self) -> geo::MultiPolygon<f64> {
        geo::MultiPolygon(self.polygons.clone())
    }

    pub fn description(&self) -> Option<&str> {
        self.attributes.get("description").map(|x| x.as_str())
    }
}

/// Parses a .kml file and returns every placemark with at least one coordinate inside the
/// bounds.
pub fn load(path: &str, gps_bounds: &GPSBounds, timer: &mut Timer) -> Result<Vec<Placemark>> {
    timer.start(format!("read {}", path));
    let bytes = hcme_io::slurp_file(path)?;
    let raw_string = std::str::from_utf8(&bytes)?;
    timer.stop(format!("read {}", path));

    timer.start("scrape placemarks");
    let result = parse(raw_string, gps_bounds);
    timer.stop("scrape placemarks");
    let (placemarks, skipped_count) = result?;

    timer.note(format!(
        "Got {} placemarks from {} and skipped {}",
        prettyprint_usize(placemarks.len()),
        path,
        prettyprint_usize(skipped_count)
    ));
    Ok(placemarks)
}

/// Returns the placemarks and how many were skipped for being out of bounds.
pub fn parse(raw_string: &str, gps_bounds: &GPSBounds) -> Result<(Vec<Placemark>, usize)> {
    let tree = roxmltree::Document::parse(raw_string)?;
    let mut placemarks = Vec::new();
    let mut skipped_count = 0;
    for node in tree.descendants() {
        if node.tag_name().name() != "Placemark" {
            continue;
        }
        let placemark = parse_placemark(node)?;
        let any_in_bounds = placemark
            .points
            .iter()
            .copied()
            .chain(
                placemark
                    .polygons
                    .iter()
                    .flat_map(|p| p.exterior().0.iter().map(|c| LonLat::from(*c))),
            )
            .any(|pt| gps_bounds.contains(pt));
        if any_in_bounds {
            placemarks.push(placemark);
        } else {
            debug!(
                "Skipping placemark {} outside the bounds",
                placemark.attributes.get("name").map(|x| x.as_str()).unwrap_or("<unnamed>")
            );
            skipped_count += 1;
        }
    }
    Ok((placemarks, skipped_count))
}

fn parse_placemark(node: roxmltree::Node) -> Result<Placemark> {
    let mut placemark = Placemark {
        polygons: Vec::new(),
        points: Vec::new(),
        attributes: BTreeMap::new(),
    };
    for child in node.descendants() {
        match child.tag_name().name() {
            "name" | "description" if child.parent() == Some(node) => {
                placemark.attributes.insert(
                    child.tag_name().name().to_string(),
                    child.text().unwrap_or("").trim().to_string(),
                );
            }
            "SimpleData" | "Data" => {
                let key = child
                    .attribute("name")
                    .ok_or_else(|| anyhow!("{} without a name", child.tag_name().name()))?;
                let value = child
                    .descendants()
                    .find(|n| n.is_text())
                    .and_then(|n| n.text())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                placemark.attributes.insert(key.to_string(), value);
            }
            "Polygon" => {
                placemark.polygons.push(parse_polygon(child)?);
            }
            "Point" => {
                for coords in child
                    .descendants()
                    .filter(|n| n.tag_name().name() == "coordinates")
                {
                    placemark
                        .points
                        .extend(parse_coordinates(coords.text().unwrap_or(""))?);
                }
            }
            _ => {}
        }
    }
    Ok(placemark)
}

fn parse_polygon(node: roxmltree::Node) -> Result<geo::Polygon<f64>> {
    let mut exterior = None;
    let mut interiors = Vec::new();
    for boundary in node.children().filter(|n| n.is_element()) {
        let is_outer = match boundary.tag_name().name() {
            "outerBoundaryIs" => true,
            "innerBoundaryIs" => false,
            _ => continue,
        };
        let text = boundary
            .descendants()
            .find(|n| n.tag_name().name() == "coordinates")
            .and_then(|n| n.text())
            .unwrap_or("");
        let ring = geo::LineString::from(
            parse_coordinates(text)?
                .into_iter()
                .map(geo::Coordinate::from)
                .collect::<Vec<_>>(),
        );
        if is_outer {
            exterior = Some(ring);
        } else {
            interiors.push(ring);
        }
    }
    match exterior {
        Some(ring) => Ok(geo::Polygon::new(ring, interiors)),
        None => bail!("Polygon without an outerBoundaryIs"),
    }
}

fn parse_coordinates(txt: &str) -> Result<Vec<LonLat>> {
    let mut pts = Vec::new();
    for pair in txt.split_whitespace() {
        if let Some(pt) = parse_pt(pair) {
            pts.push(pt);
        } else {
            bail!("Malformed coordinates: {}", pair);
        }
    }
    Ok(pts)
}

fn parse_pt(input: &str) -> Option<LonLat> {
    let coords: Vec<&str> = input.split(',').collect();
    // Normally each coordinate is just (X, Y), but there's often a third Z component that's
    // always 0. Just ignore it.
    if coords.len() < 2 {
        return None;
    }
    match (coords[0].parse::<f64>(), coords[1].parse::<f64>()) {
        (Ok(lon), Ok(lat)) => Some(LonLat::new(lon, lat)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
<Document>
  <Placemark>
    <name>1</name>
    <description>id: 101 &lt;br&gt; name: Arcata</description>
    <Polygon><outerBoundaryIs><LinearRing><coordinates>
      -124.1,40.8,0 -124.0,40.8,0 -124.0,40.9,0 -124.1,40.9,0 -124.1,40.8,0
    </coordinates></LinearRing></outerBoundaryIs></Polygon>
  </Placemark>
  <Placemark>
    <name>2</name>
    <ExtendedData><SchemaData><SimpleData name="agg_taz">7</SimpleData></SchemaData></ExtendedData>
    <MultiGeometry>
      <Polygon><outerBoundaryIs><LinearRing><coordinates>
        10,10 11,10 11,11 10,10
      </coordinates></LinearRing></outerBoundaryIs></Polygon>
      <Polygon><outerBoundaryIs><LinearRing><coordinates>
        -123,40 -122.9,40 -122.9,40.1 -123,40
      </coordinates></LinearRing></outerBoundaryIs></Polygon>
    </MultiGeometry>
  </Placemark>
  <Placemark>
    <name>far away</name>
    <Point><coordinates>100,-40</coordinates></Point>
  </Placemark>
</Document>
</kml>"#;

    #[test]
    fn test_parse_placemarks() {
        let mut bounds = GPSBounds::new();
        bounds.update(LonLat::new(-125.0, 39.0));
        bounds.update(LonLat::new(-122.0, 42.0));

        let (placemarks, skipped) = parse(ZONES, &bounds).unwrap();
        assert_eq!(2, placemarks.len());
        assert_eq!(1, skipped);

        assert_eq!(
            Some("id: 101 <br> name: Arcata"),
            placemarks[0].description()
        );
        assert_eq!(1, placemarks[0].polygons.len());
        assert_eq!(5, placemarks[0].polygons[0].exterior().0.len());

        assert_eq!("7", placemarks[1].attributes["agg_taz"]);
        assert_eq!(2, placemarks[1].multi_polygon().0.len());
    }

    #[test]
    fn test_malformed_coordinates() {
        let input = r#"<kml><Placemark><Point><coordinates>abc</coordinates></Point></Placemark></kml>"#;
        assert!(parse(input, &GPSBounds::world()).is_err());
    }
}

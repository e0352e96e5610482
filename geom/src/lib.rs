//! Geometry primitives shared by the importers and the simulator input generators: GPS
//! coordinates, the UTM projection the simulator works in, and WKT encoding for the store.

mod gps;
mod utm;
mod wkt_io;

pub use crate::gps::{GPSBounds, LonLat};
pub use crate::utm::{Utm, UtmPt};
pub use crate::wkt_io::{from_wkt, polygons_from_wkt, to_wkt};

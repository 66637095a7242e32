//! Distance queries without a projection library.
//!
//! Geographic coordinates are flattened with a local equirectangular frame
//! centred on the query point. Each axis is scaled independently, which is
//! accurate to well under a percent for the few-kilometre radii routing
//! queries use.

use super::{BBox, Coord, Geometry, EARTH_RADIUS_M};

/// SRID of WGS 84 longitude/latitude.
pub const SRID_WGS84: i32 = 4326;

/// Planar frame anchored at a query point.
#[derive(Clone, Copy, Debug)]
pub struct LocalFrame {
    origin: Coord,
    units_per_x: f64,
    units_per_y: f64,
}

impl LocalFrame {
    /// Frame for a container SRID: metres for WGS 84, native units otherwise.
    pub fn for_srid(origin: Coord, srid: i32) -> Self {
        if srid == SRID_WGS84 {
            Self::geographic(origin)
        } else {
            Self::planar(origin)
        }
    }

    /// Metre-scaled frame around a lon/lat origin.
    pub fn geographic(origin: Coord) -> Self {
        let metres_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let lat_cos = origin.y.to_radians().cos().abs().max(1e-12);
        Self {
            origin,
            units_per_x: metres_per_degree * lat_cos,
            units_per_y: metres_per_degree,
        }
    }

    /// Identity frame for coordinates that are already planar.
    pub fn planar(origin: Coord) -> Self {
        Self {
            origin,
            units_per_x: 1.0,
            units_per_y: 1.0,
        }
    }

    /// Projects a coordinate into the frame.
    pub fn project(&self, c: Coord) -> (f64, f64) {
        (
            (c.x - self.origin.x) * self.units_per_x,
            (c.y - self.origin.y) * self.units_per_y,
        )
    }

    /// Source-coordinate box extending `distance` frame units along each axis.
    pub fn bbox_around(&self, distance: f64) -> BBox {
        let dx = distance / self.units_per_x;
        let dy = distance / self.units_per_y;
        BBox::new(
            self.origin.x - dx,
            self.origin.y - dy,
            self.origin.x + dx,
            self.origin.y + dy,
        )
    }

    /// Distance from the frame origin to the nearest point of `geom`.
    pub fn distance_to(&self, geom: &Geometry) -> f64 {
        match geom {
            Geometry::Point(c) => {
                let (x, y) = self.project(*c);
                x.hypot(y)
            }
            Geometry::LineString(coords) => match coords.len() {
                0 => f64::INFINITY,
                1 => {
                    let (x, y) = self.project(coords[0]);
                    x.hypot(y)
                }
                _ => coords
                    .windows(2)
                    .map(|pair| {
                        segment_distance(self.project(pair[0]), self.project(pair[1]))
                    })
                    .fold(f64::INFINITY, f64::min),
            },
        }
    }
}

/// Distance from the origin to segment `a`-`b`.
fn segment_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(a.0 * dx + a.1 * dy) / len_sq).clamp(0.0, 1.0)
    };
    let px = a.0 + t * dx;
    let py = a.1 + t * dy;
    px.hypot(py)
}

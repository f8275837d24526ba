//! Geographic validity regions.
//!
//! Coordinates are kept in the wire unit of 1/10 micro degree.

use crate::types::{GeographicRegion, IdentifiedRegion, ThreeDLocation, TwoDLocation};

const EARTH_RADIUS_M: f64 = 6_372_797.560_856;
const LATITUDE_UNITS_PER_METER: i64 = 90;
const UNAVAILABLE_LATITUDE: i32 = 900_000_001;
const UNAVAILABLE_LONGITUDE: i32 = 1_800_000_001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    pub latitude: i32,
    pub longitude: i32,
    pub elevation: u16,
}

impl Location {
    #[must_use]
    pub fn new(latitude: i32, longitude: i32) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0,
        }
    }

    /// `false` for the "unavailable" values and out-of-range coordinates
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.latitude.unsigned_abs() < UNAVAILABLE_LATITUDE.unsigned_abs() - 1
            && self.longitude.unsigned_abs() < UNAVAILABLE_LONGITUDE.unsigned_abs() - 1
    }

    /// great-circle distance in metres
    #[must_use]
    pub fn distance(&self, other: &Location) -> f64 {
        let (lat1, lon1) = (to_radians(self.latitude), to_radians(self.longitude));
        let (lat2, lon2) = (to_radians(other.latitude), to_radians(other.longitude));
        let h_lat = ((lat2 - lat1) / 2.0).sin().powi(2);
        let h_lon = ((lon2 - lon1) / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * (h_lat + lat1.cos() * lat2.cos() * h_lon).sqrt().asin()
    }
}

fn to_radians(its: i32) -> f64 {
    (f64::from(its) / 10_000_000.0).to_radians()
}

impl From<&ThreeDLocation> for Location {
    fn from(value: &ThreeDLocation) -> Self {
        Self {
            latitude: value.latitude.0,
            longitude: value.longitude.0,
            elevation: value.elevation.0,
        }
    }
}

impl From<&TwoDLocation> for Location {
    fn from(value: &TwoDLocation) -> Self {
        Self::new(value.latitude.0, value.longitude.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub north_west: Location,
    pub south_east: Location,
}

impl Rectangle {
    fn contains(&self, l: &Location) -> bool {
        if l.latitude > self.north_west.latitude || l.latitude < self.south_east.latitude {
            return false;
        }
        if self.north_west.longitude <= self.south_east.longitude {
            l.longitude >= self.north_west.longitude && l.longitude <= self.south_east.longitude
        } else {
            // crosses the antimeridian
            l.longitude >= self.north_west.longitude || l.longitude <= self.south_east.longitude
        }
    }

    fn corners(&self) -> [Location; 4] {
        [
            self.north_west,
            self.south_east,
            Location::new(self.north_west.latitude, self.south_east.longitude),
            Location::new(self.south_east.latitude, self.north_west.longitude),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedSubregions {
    pub region: u8,
    /// empty for the whole region
    pub subregions: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedArea {
    pub country: u16,
    /// empty for the whole country
    pub regions: Vec<IdentifiedSubregions>,
}

impl IdentifiedArea {
    fn covers(&self, inner: &IdentifiedArea) -> bool {
        if self.country != inner.country {
            return false;
        }
        if self.regions.is_empty() {
            return true;
        }
        !inner.regions.is_empty()
            && inner.regions.iter().all(|ir| {
                self.regions.iter().any(|or| {
                    or.region == ir.region
                        && (or.subregions.is_empty()
                            || (!ir.subregions.is_empty()
                                && ir.subregions.iter().all(|s| or.subregions.contains(s))))
                })
            })
    }
}

impl From<&IdentifiedRegion> for IdentifiedArea {
    fn from(value: &IdentifiedRegion) -> Self {
        match value {
            IdentifiedRegion::CountryOnly(country) => IdentifiedArea {
                country: country.0,
                regions: vec![],
            },
            IdentifiedRegion::CountryAndRegions(c) => IdentifiedArea {
                country: c.country_only.0,
                regions: c
                    .regions
                    .0
                    .iter()
                    .map(|r| IdentifiedSubregions {
                        region: r.0,
                        subregions: vec![],
                    })
                    .collect(),
            },
            IdentifiedRegion::CountryAndSubregions(c) => IdentifiedArea {
                country: c.country_only.0,
                regions: c
                    .region_and_subregions
                    .0
                    .iter()
                    .map(|r| IdentifiedSubregions {
                        region: r.region.0,
                        subregions: r.subregions.0.iter().map(|s| s.0).collect(),
                    })
                    .collect(),
            },
        }
    }
}

/// Validity region of a certificate, `None` means unrestricted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    None,
    Circle {
        center: Location,
        radius: u16,
    },
    Rectangles(Vec<Rectangle>),
    Polygon(Vec<Location>),
    Identified(Vec<IdentifiedArea>),
}

impl Region {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Region::None)
    }

    /// points that must lie inside a region covering this one
    fn outline(&self) -> Vec<Location> {
        match self {
            Region::Circle { center, radius } => {
                let d_lat = i64::from(*radius) * LATITUDE_UNITS_PER_METER;
                let cos = to_radians(center.latitude).cos().max(f64::EPSILON);
                let d_lon = (f64::from(*radius) / (111_320.0 * cos) * 10_000_000.0).round() as i64;
                let lat = |d: i64| (i64::from(center.latitude) + d) as i32;
                let lon = |d: i64| (i64::from(center.longitude) + d) as i32;
                vec![
                    Location::new(lat(d_lat), lon(-d_lon)),
                    Location::new(lat(d_lat), lon(d_lon)),
                    Location::new(lat(-d_lat), lon(-d_lon)),
                    Location::new(lat(-d_lat), lon(d_lon)),
                ]
            }
            Region::Rectangles(rectangles) => rectangles.iter().flat_map(Rectangle::corners).collect(),
            Region::Polygon(points) => points.clone(),
            Region::None | Region::Identified(_) => vec![],
        }
    }
}

impl From<&GeographicRegion> for Region {
    fn from(value: &GeographicRegion) -> Self {
        match value {
            GeographicRegion::CircularRegion(c) => Region::Circle {
                center: Location::from(&c.center),
                radius: c.radius.0,
            },
            GeographicRegion::RectangularRegion(r) => Region::Rectangles(
                r.0.iter()
                    .map(|r| Rectangle {
                        north_west: Location::from(&r.north_west),
                        south_east: Location::from(&r.south_east),
                    })
                    .collect(),
            ),
            GeographicRegion::PolygonalRegion(p) => {
                Region::Polygon(p.0.iter().map(Location::from).collect())
            }
            GeographicRegion::IdentifiedRegion(i) => {
                Region::Identified(i.0.iter().map(IdentifiedArea::from).collect())
            }
        }
    }
}

/// Region containment predicate used by certificate validation
pub trait RegionCheck: Send + Sync + std::fmt::Debug {
    /// `true` if `location` lies inside `region`
    fn contains(&self, region: &Region, location: &Location) -> bool;
    /// `true` if `inner` lies completely inside `outer`
    fn covers(&self, outer: &Region, inner: &Region) -> bool;
}

/// Spherical-earth implementation of [`RegionCheck`]
///
/// Identified regions accept every location since no country geometry is
/// available; between each other they are compared by their country,
/// region and subregion lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRegionCheck;

impl RegionCheck for DefaultRegionCheck {
    fn contains(&self, region: &Region, location: &Location) -> bool {
        match region {
            Region::None | Region::Identified(_) => true,
            Region::Circle { center, radius } => center.distance(location) <= f64::from(*radius),
            Region::Rectangles(rectangles) => rectangles.iter().any(|r| r.contains(location)),
            Region::Polygon(points) => polygon_contains(points, location),
        }
    }

    fn covers(&self, outer: &Region, inner: &Region) -> bool {
        match (outer, inner) {
            (Region::None, _) => true,
            (_, Region::None) => false,
            (Region::Identified(o), Region::Identified(i)) => {
                i.iter().all(|ia| o.iter().any(|oa| oa.covers(ia)))
            }
            (_, Region::Identified(_)) | (Region::Identified(_), _) => false,
            (
                Region::Circle { center, radius },
                Region::Circle {
                    center: inner_center,
                    radius: inner_radius,
                },
            ) => center.distance(inner_center) + f64::from(*inner_radius) <= f64::from(*radius),
            (outer, inner) => inner
                .outline()
                .iter()
                .all(|point| self.contains(outer, point)),
        }
    }
}

/// even-odd ray casting in the latitude/longitude plane
fn polygon_contains(points: &[Location], l: &Location) -> bool {
    let mut inside = false;
    let mut j = points.len().wrapping_sub(1);
    for i in 0..points.len() {
        let (pi, pj) = (&points[i], &points[j]);
        let (yi, yj) = (i64::from(pi.latitude), i64::from(pj.latitude));
        let (xi, xj) = (i64::from(pi.longitude), i64::from(pj.longitude));
        let (x, y) = (i64::from(l.longitude), i64::from(l.latitude));
        if (yi > y) != (yj > y) {
            let cross = (xj - xi) as f64 * (y - yi) as f64 / (yj - yi) as f64 + xi as f64;
            if (x as f64) < cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> Location {
        Location::new(525_200_000, 134_050_000)
    }

    #[test]
    fn measures_distance() {
        let paris = Location::new(488_566_000, 23_522_000);
        let d = berlin().distance(&paris);
        assert!((870_000.0..885_000.0).contains(&d), "{d}");
    }

    #[test]
    fn checks_circle() {
        let region = Region::Circle {
            center: berlin(),
            radius: 1000,
        };
        let check = DefaultRegionCheck;
        assert!(check.contains(&region, &berlin()));
        assert!(check.contains(&region, &Location::new(525_250_000, 134_050_000)));
        assert!(!check.contains(&region, &Location::new(525_300_000, 134_050_000)));
    }

    #[test]
    fn checks_rectangle_across_antimeridian() {
        let region = Region::Rectangles(vec![Rectangle {
            north_west: Location::new(100_000_000, 1_790_000_000),
            south_east: Location::new(-100_000_000, -1_790_000_000),
        }]);
        let check = DefaultRegionCheck;
        assert!(check.contains(&region, &Location::new(0, 1_795_000_000)));
        assert!(check.contains(&region, &Location::new(0, -1_795_000_000)));
        assert!(!check.contains(&region, &Location::new(0, 0)));
    }

    #[test]
    fn checks_polygon() {
        let region = Region::Polygon(vec![
            Location::new(0, 0),
            Location::new(10_000_000, 0),
            Location::new(10_000_000, 10_000_000),
            Location::new(0, 10_000_000),
        ]);
        let check = DefaultRegionCheck;
        assert!(check.contains(&region, &Location::new(5_000_000, 5_000_000)));
        assert!(!check.contains(&region, &Location::new(15_000_000, 5_000_000)));
    }

    #[test]
    fn checks_region_coverage() {
        let check = DefaultRegionCheck;
        let big = Region::Circle {
            center: berlin(),
            radius: 10_000,
        };
        let small = Region::Circle {
            center: berlin(),
            radius: 1_000,
        };
        assert!(check.covers(&big, &small));
        assert!(!check.covers(&small, &big));
        assert!(check.covers(&Region::None, &big));
        assert!(!check.covers(&big, &Region::None));

        let germany = Region::Identified(vec![IdentifiedArea {
            country: 276,
            regions: vec![],
        }]);
        let bavaria = Region::Identified(vec![IdentifiedArea {
            country: 276,
            regions: vec![IdentifiedSubregions {
                region: 9,
                subregions: vec![],
            }],
        }]);
        assert!(check.covers(&germany, &bavaria));
        assert!(!check.covers(&bavaria, &germany));
        assert!(check.covers(&germany, &germany));
    }
}

//! Region polygons and their coordinate reference systems.
//!
//! Region boundaries arrive as ESRI shapefiles in whatever CRS the provider used. They are
//! reprojected once, at load time, to geographic WGS84 longitude/latitude so that they can be
//! compared directly with the cell centres of climate grids.

use crate::errors::{RSWBError, RSWBResult};
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use ndarray::{Array1, Array2};
use shapefile::{PolygonRing, Reader, Shape};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// WGS84 equatorial radius in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_SCALE_FACTOR: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Coordinate reference systems that can be brought back to WGS84.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Crs {
    /// Geographic longitude/latitude (EPSG:4326)
    Wgs84,
    /// Spherical "Web" Mercator (EPSG:3857)
    WebMercator,
    /// WGS84 UTM zone (EPSG:326zz north, EPSG:327zz south)
    Utm { zone: u8, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> RSWBResult<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 | 3785 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(RSWBError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    /// Parse an `EPSG:<code>` identifier (or `WGS84`).
    pub fn parse(identifier: &str) -> RSWBResult<Self> {
        let upper = identifier.trim().to_uppercase();
        if upper == "WGS84" || upper == "WGS 84" {
            return Ok(Crs::Wgs84);
        }
        upper
            .strip_prefix("EPSG:")
            .and_then(|code| code.trim().parse::<u32>().ok())
            .ok_or_else(|| RSWBError::UnsupportedCrs(identifier.to_string()))
            .and_then(Crs::from_epsg)
    }

    /// Recognise the CRS described by an ESRI `.prj` WKT string.
    pub fn from_wkt(wkt: &str) -> RSWBResult<Self> {
        let upper = wkt.trim().to_uppercase();
        if upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") {
            return Ok(Crs::Wgs84);
        }
        if upper.contains("PSEUDO") || upper.contains("AUXILIARY_SPHERE") {
            return Ok(Crs::WebMercator);
        }
        if let Some(crs) = parse_utm_zone(&upper) {
            return Ok(crs);
        }
        let summary: String = wkt.chars().take(60).collect();
        Err(RSWBError::UnsupportedCrs(summary))
    }

    /// Read the CRS from a `.prj` sidecar file. A missing sidecar is taken to mean WGS84.
    pub fn from_prj(path: &Path) -> RSWBResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "No .prj sidecar, assuming WGS84");
            return Ok(Crs::Wgs84);
        }
        Crs::from_wkt(&fs::read_to_string(path)?)
    }

    /// Convert projected `(x, y)` to `(lon, lat)` in degrees.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (2.0 * (y / WGS84_A).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
            Crs::Utm { zone, north } => utm_to_wgs84(x, y, *zone, *north),
        }
    }
}

/// Find `UTM zone 17S` / `UTM_Zone_17N` in an upper-cased WKT string.
fn parse_utm_zone(upper: &str) -> Option<Crs> {
    let start = upper.find("UTM")?;
    let rest = &upper[start..];
    let zone_at = rest.find("ZONE")? + 4;
    let tail = rest[zone_at..].trim_start_matches(['_', ' ']);
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    let zone: u8 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    let north = match tail[digits.len()..].chars().next() {
        Some('S') => false,
        Some('N') => true,
        _ => !upper.contains("SOUTH"),
    };
    Some(Crs::Utm { zone, north })
}

/// Inverse transverse Mercator on the WGS84 ellipsoid; returns `(lon, lat)` in degrees.
fn utm_to_wgs84(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let central_meridian = (f64::from(zone) - 1.0) * 6.0 - 180.0 + 3.0;
    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };

    let e2 = 2.0 * WGS84_F - WGS84_F * WGS84_F;
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let m = y / UTM_SCALE_FACTOR;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    // Footpoint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let n1 = WGS84_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = phi1.tan().powi(2);
    let c1 = ep2 * phi1.cos().powi(2);
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * UTM_SCALE_FACTOR);

    let lat = phi1
        - (n1 * phi1.tan() / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = central_meridian.to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / phi1.cos();

    (lon.to_degrees(), lat.to_degrees())
}

/// Wrap a longitude from `0..360` to `-180..180`.
pub fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// A region boundary in WGS84 longitude/latitude.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionGeometry {
    polygons: MultiPolygon<f64>,
}

impl RegionGeometry {
    pub fn new(polygons: MultiPolygon<f64>) -> Self {
        Self { polygons }
    }

    /// A single polygon from one exterior ring of `(lon, lat)` vertices.
    pub fn from_lonlat_ring(ring: &[(f64, f64)]) -> Self {
        let exterior: LineString<f64> = ring.iter().map(|&(x, y)| Coord { x, y }).collect();
        Self::new(MultiPolygon(vec![Polygon::new(exterior, vec![])]))
    }

    /// Load every polygon of a shapefile, reprojecting to WGS84.
    ///
    /// `crs_override` takes precedence over the `.prj` sidecar.
    pub fn from_shapefile(path: &Path, crs_override: Option<&str>) -> RSWBResult<Self> {
        let crs = match crs_override {
            Some(identifier) => Crs::parse(identifier)?,
            None => Crs::from_prj(&path.with_extension("prj"))?,
        };
        debug!(path = %path.display(), crs = ?crs, "Loading region geometry");

        let mut reader = Reader::from_path(path)?;
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for result in reader.iter_shapes_and_records() {
            let (shape, _record) = result?;
            let rings: Vec<(bool, Vec<(f64, f64)>)> = match shape {
                Shape::Polygon(polygon) => polygon
                    .rings()
                    .iter()
                    .map(|ring| {
                        let outer = matches!(ring, PolygonRing::Outer(_));
                        (outer, ring.points().iter().map(|p| (p.x, p.y)).collect())
                    })
                    .collect(),
                Shape::PolygonZ(polygon) => polygon
                    .rings()
                    .iter()
                    .map(|ring| {
                        let outer = matches!(ring, PolygonRing::Outer(_));
                        (outer, ring.points().iter().map(|p| (p.x, p.y)).collect())
                    })
                    .collect(),
                Shape::PolygonM(polygon) => polygon
                    .rings()
                    .iter()
                    .map(|ring| {
                        let outer = matches!(ring, PolygonRing::Outer(_));
                        (outer, ring.points().iter().map(|p| (p.x, p.y)).collect())
                    })
                    .collect(),
                _ => continue,
            };
            append_rings(&mut polygons, rings, &crs);
        }

        if polygons.is_empty() {
            return Err(RSWBError::Geometry(format!(
                "no polygons found in {}",
                path.display()
            )));
        }
        Ok(Self::new(MultiPolygon(polygons)))
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// `(min_lon, min_lat, max_lon, max_lat)`
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.polygons.bounding_rect().map(|r| {
            let (min, max) = (r.min(), r.max());
            (min.x, min.y, max.x, max.y)
        })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygons
            .contains(&Point::new(wrap_longitude(lon), lat))
    }

    /// Whether each `(lat, lon)` cell centre lies inside the region.
    pub fn cell_mask(&self, lat: &Array1<f64>, lon: &Array1<f64>) -> Array2<bool> {
        let bounds = self.bounds();
        Array2::from_shape_fn((lat.len(), lon.len()), |(i, j)| {
            let (x, y) = (wrap_longitude(lon[j]), lat[i]);
            match bounds {
                Some((x0, y0, x1, y1)) if x < x0 || x > x1 || y < y0 || y > y1 => false,
                Some(_) => self.contains(x, y),
                None => false,
            }
        })
    }
}

fn append_rings(polygons: &mut Vec<Polygon<f64>>, rings: Vec<(bool, Vec<(f64, f64)>)>, crs: &Crs) {
    for (outer, points) in rings {
        let line: LineString<f64> = points
            .into_iter()
            .map(|(x, y)| {
                let (lon, lat) = crs.to_wgs84(x, y);
                Coord { x: lon, y: lat }
            })
            .collect();
        match polygons.last_mut() {
            Some(last) if !outer => last.interiors_push(line),
            _ => polygons.push(Polygon::new(line, vec![])),
        }
    }
}

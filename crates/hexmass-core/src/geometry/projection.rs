//! Forward projections from WGS84 lon/lat to planar metres.
//!
//! Areas are never measured in degrees. Supported targets:
//!   UTM north/south zones (EPSG:326xx / 327xx), transverse Mercator
//!   EPSG:6933, Lambert cylindrical equal-area, standard parallel 30°
//!   EPSG:3857, spherical web Mercator (distances for nearest joins only)

use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// WGS84 ellipsoid.
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
/// UTM is only defined between these latitudes.
const UTM_MIN_LAT: f64 = -80.0;
const UTM_MAX_LAT: f64 = 84.0;
const EASE_STANDARD_PARALLEL: f64 = 30.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A concrete planar coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaCrs {
    Utm { zone: u8, north: bool },
    /// EPSG:6933.
    EqualAreaCylindrical,
    /// EPSG:3857.
    WebMercator,
}

impl AreaCrs {
    /// Fallback when no local projection can be estimated.
    pub const FALLBACK: AreaCrs = AreaCrs::EqualAreaCylindrical;

    pub fn epsg(self) -> u32 {
        match self {
            AreaCrs::Utm { zone, north: true } => 32600 + zone as u32,
            AreaCrs::Utm { zone, north: false } => 32700 + zone as u32,
            AreaCrs::EqualAreaCylindrical => 6933,
            AreaCrs::WebMercator => 3857,
        }
    }

    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            6933 => Some(AreaCrs::EqualAreaCylindrical),
            3857 => Some(AreaCrs::WebMercator),
            32601..=32660 => Some(AreaCrs::Utm { zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Some(AreaCrs::Utm { zone: (code - 32700) as u8, north: false }),
            _ => None,
        }
    }

    /// Local UTM zone for the centre of `bounds` (lon/lat degrees). `None`
    /// when the centre is outside UTM coverage or not finite.
    pub fn estimate_utm(bounds: &Rect<f64>) -> Option<Self> {
        let c = bounds.center();
        if !c.x.is_finite() || !c.y.is_finite() || !(UTM_MIN_LAT..=UTM_MAX_LAT).contains(&c.y) {
            return None;
        }
        let lon = wrap_lon(c.x);
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        Some(AreaCrs::Utm { zone, north: c.y >= 0.0 })
    }

    /// Project one lon/lat coordinate (degrees) to metres.
    pub fn project(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            AreaCrs::Utm { zone, north } => utm_forward(c.x, c.y, zone, north),
            AreaCrs::EqualAreaCylindrical => cea_forward(c.x, c.y),
            AreaCrs::WebMercator => web_mercator_forward(c.x, c.y),
        }
    }

    pub fn project_polygonal(self, g: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        g.map_coords(|c| self.project(c))
    }

    pub fn project_point(self, p: &Point<f64>) -> Point<f64> {
        Point::from(self.project(p.0))
    }
}

impl fmt::Display for AreaCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Configured CRS choice: estimate per run, or a fixed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AreaCrsSetting {
    #[default]
    Auto,
    Fixed(AreaCrs),
}

impl AreaCrsSetting {
    /// Resolve against the data extent. `Auto` tries a local UTM zone and
    /// falls back to EPSG:6933.
    pub fn resolve(self, extent: Option<Rect<f64>>) -> AreaCrs {
        match self {
            AreaCrsSetting::Fixed(crs) => crs,
            AreaCrsSetting::Auto => extent
                .as_ref()
                .and_then(AreaCrs::estimate_utm)
                .unwrap_or(AreaCrs::FALLBACK),
        }
    }
}

impl FromStr for AreaCrsSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(AreaCrsSetting::Auto);
        }
        let digits = s
            .strip_prefix("EPSG:")
            .or_else(|| s.strip_prefix("epsg:"))
            .unwrap_or(s);
        let code: u32 = digits
            .parse()
            .map_err(|_| ConfigError::new("area_crs", format!("`{s}` is neither \"auto\" nor EPSG:<code>")))?;
        AreaCrs::from_epsg(code)
            .map(AreaCrsSetting::Fixed)
            .ok_or_else(|| ConfigError::new("area_crs", format!("unsupported projection EPSG:{code}")))
    }
}

impl TryFrom<String> for AreaCrsSetting {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AreaCrsSetting> for String {
    fn from(s: AreaCrsSetting) -> String {
        s.to_string()
    }
}

impl fmt::Display for AreaCrsSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaCrsSetting::Auto => f.write_str("auto"),
            AreaCrsSetting::Fixed(crs) => crs.fmt(f),
        }
    }
}

// ── Forward formulas ─────────────────────────────────────────────────────────

fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Transverse Mercator on the WGS84 ellipsoid (Snyder, eqs. 8-9 to 8-15).
fn utm_forward(lon: f64, lat: f64, zone: u8, north: bool) -> Coord<f64> {
    let e2 = F * (2.0 - F);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let lon0 = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
    let phi = lat.to_radians();
    let dlam = wrap_lon(lon - lon0).to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();
    let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = dlam * cos_phi;

    let m = A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;
    let mut y = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        y += UTM_FALSE_NORTHING_SOUTH;
    }
    Coord { x, y }
}

/// Ellipsoidal Lambert cylindrical equal-area (Snyder, eqs. 10-15, 10-16).
fn cea_forward(lon: f64, lat: f64) -> Coord<f64> {
    let e2 = F * (2.0 - F);
    let e = e2.sqrt();
    let sin_s = EASE_STANDARD_PARALLEL.to_radians().sin();
    let k0 = EASE_STANDARD_PARALLEL.to_radians().cos() / (1.0 - e2 * sin_s * sin_s).sqrt();

    let sin_phi = lat.clamp(-90.0, 90.0).to_radians().sin();
    let q = (1.0 - e2)
        * (sin_phi / (1.0 - e2 * sin_phi * sin_phi)
            - (1.0 / (2.0 * e)) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln());

    Coord {
        x: A * k0 * wrap_lon(lon).to_radians(),
        y: A * q / (2.0 * k0),
    }
}

fn web_mercator_forward(lon: f64, lat: f64) -> Coord<f64> {
    let phi = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT).to_radians();
    Coord {
        x: A * lon.to_radians(),
        y: A * (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan().ln(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{coord, polygon, Area};

    #[test]
    fn utm_central_meridian_equator() {
        // Zone 31 central meridian is 3°E; the equator maps to the false easting.
        let c = AreaCrs::Utm { zone: 31, north: true }.project(coord! { x: 3.0, y: 0.0 });
        assert_abs_diff_eq!(c.x, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn utm_known_point() {
        // Maputo, 32.5732°E 25.9692°S, zone 36S. Reference values from the
        // Krüger series, which agrees with Snyder well below a millimetre here.
        let c = AreaCrs::Utm { zone: 36, north: false }.project(coord! { x: 32.5732, y: -25.9692 });
        assert!((c.x - 457_275.474).abs() < 0.01, "easting {}", c.x);
        assert!((c.y - 7_127_657.378).abs() < 0.01, "northing {}", c.y);
    }

    #[test]
    fn estimate_utm_picks_zone_and_hemisphere() {
        let r = Rect::new(coord! { x: 34.0, y: -20.0 }, coord! { x: 35.0, y: -19.0 });
        assert_eq!(AreaCrs::estimate_utm(&r), Some(AreaCrs::Utm { zone: 36, north: false }));
        let polar = Rect::new(coord! { x: 0.0, y: 85.0 }, coord! { x: 1.0, y: 86.0 });
        assert_eq!(AreaCrs::estimate_utm(&polar), None);
    }

    #[test]
    fn estimate_utm_at_antimeridian() {
        let at = |lon: f64| {
            let r = Rect::new(coord! { x: lon, y: 10.0 }, coord! { x: lon, y: 10.0 });
            AreaCrs::estimate_utm(&r)
        };
        // 180 and -180 are the same meridian, the western edge of zone 1.
        assert_eq!(at(180.0), Some(AreaCrs::Utm { zone: 1, north: true }));
        assert_eq!(at(-180.0), Some(AreaCrs::Utm { zone: 1, north: true }));
        assert_eq!(at(179.99), Some(AreaCrs::Utm { zone: 60, north: true }));
        assert_eq!(at(-179.99), Some(AreaCrs::Utm { zone: 1, north: true }));
    }

    #[test]
    fn auto_falls_back_to_equal_area() {
        assert_eq!(AreaCrsSetting::Auto.resolve(None), AreaCrs::EqualAreaCylindrical);
        let fixed = AreaCrsSetting::Fixed(AreaCrs::WebMercator);
        assert_eq!(fixed.resolve(None), AreaCrs::WebMercator);
    }

    #[test]
    fn equal_area_preserves_cell_area_ratio_across_latitudes() {
        // Two 1°x1° cells at different latitudes: on a sphere the area ratio
        // is the ratio of the sine differences; flattening moves it by < 1%.
        let crs = AreaCrs::EqualAreaCylindrical;
        let low = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let high = polygon![(x: 0.0, y: 60.0), (x: 1.0, y: 60.0), (x: 1.0, y: 61.0), (x: 0.0, y: 61.0)];
        let a_low = crs.project_polygonal(&MultiPolygon::new(vec![low])).unsigned_area();
        let a_high = crs.project_polygonal(&MultiPolygon::new(vec![high])).unsigned_area();
        let expected = (61f64.to_radians().sin() - 60f64.to_radians().sin()) / 1f64.to_radians().sin();
        assert!((a_high / a_low - expected).abs() < 1e-2, "ratio {}", a_high / a_low);
    }

    #[test]
    fn setting_parses_and_prints() {
        assert_eq!("auto".parse::<AreaCrsSetting>().unwrap(), AreaCrsSetting::Auto);
        let s: AreaCrsSetting = "EPSG:32736".parse().unwrap();
        assert_eq!(s, AreaCrsSetting::Fixed(AreaCrs::Utm { zone: 36, north: false }));
        assert_eq!(s.to_string(), "EPSG:32736");
        let n: AreaCrsSetting = "epsg:32636".parse().unwrap();
        assert_eq!(n, AreaCrsSetting::Fixed(AreaCrs::Utm { zone: 36, north: true }));
        assert_eq!(n.to_string(), "EPSG:32636");
        assert_eq!("6933".parse::<AreaCrsSetting>().unwrap().to_string(), "EPSG:6933");
        assert!("EPSG:4326".parse::<AreaCrsSetting>().is_err());
        assert!("mercator".parse::<AreaCrsSetting>().is_err());
    }

    #[test]
    fn setting_serde_uses_strings() {
        let s: AreaCrsSetting = serde_json::from_str("\"EPSG:6933\"").unwrap();
        assert_eq!(s, AreaCrsSetting::Fixed(AreaCrs::EqualAreaCylindrical));
        assert_eq!(serde_json::to_string(&AreaCrsSetting::Auto).unwrap(), "\"auto\"");
    }
}

//! WKT text to `geo` geometries and back.

use geo::{Geometry, MultiPolygon, Point};
use ::wkt::{ToWkt, TryFromWkt};

use crate::error::GeometryParseError;

/// Parse a `POLYGON` or `MULTIPOLYGON`. `row` is only used for the error.
pub fn parse_polygonal(text: &str, row: usize) -> Result<MultiPolygon<f64>, GeometryParseError> {
    match parse(text, row)? {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        other => Err(GeometryParseError {
            row,
            reason: format!("expected POLYGON or MULTIPOLYGON, found {}", kind(&other)),
        }),
    }
}

/// Parse a `POINT`.
pub fn parse_point(text: &str, row: usize) -> Result<Point<f64>, GeometryParseError> {
    match parse(text, row)? {
        Geometry::Point(p) => Ok(p),
        other => Err(GeometryParseError {
            row,
            reason: format!("expected POINT, found {}", kind(&other)),
        }),
    }
}

pub fn to_wkt(g: &MultiPolygon<f64>) -> String {
    if g.0.len() == 1 {
        g.0[0].wkt_string()
    } else {
        g.wkt_string()
    }
}

fn parse(text: &str, row: usize) -> Result<Geometry<f64>, GeometryParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GeometryParseError { row, reason: "empty WKT".to_string() });
    }
    Geometry::<f64>::try_from_wkt_str(trimmed).map_err(|e| GeometryParseError {
        row,
        reason: e.to_string(),
    })
}

fn kind(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) => "LINE",
        Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        Geometry::Rect(_) => "RECT",
        Geometry::Triangle(_) => "TRIANGLE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn polygon_becomes_single_member_multipolygon() {
        let mp = parse_polygonal("POLYGON ((0 0, 2 0, 2 1, 0 1, 0 0))", 0).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn multipolygon_is_kept() {
        let mp = parse_polygonal(
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 1, 0 0)), ((5 5, 6 5, 6 6, 5 6, 5 5)))",
            3,
        )
        .unwrap();
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn point_is_not_polygonal() {
        let err = parse_polygonal("POINT (1 2)", 7).unwrap_err();
        assert_eq!(err.row, 7);
        assert!(err.reason.contains("POINT"));
    }

    #[test]
    fn garbage_reports_row() {
        let err = parse_polygonal("POLYGON ((0 0, 1", 11).unwrap_err();
        assert_eq!(err.row, 11);
        let err = parse_point("   ", 2).unwrap_err();
        assert_eq!(err.reason, "empty WKT");
    }

    #[test]
    fn point_parses_lon_lat() {
        let p = parse_point("POINT (32.5 -19.8)", 0).unwrap();
        assert_eq!(p.x(), 32.5);
        assert_eq!(p.y(), -19.8);
    }

    #[test]
    fn written_wkt_parses_back() {
        let mp = parse_polygonal("POLYGON ((0 0, 2 0, 2 1, 0 1, 0 0))", 0).unwrap();
        let text = to_wkt(&mp);
        assert!(text.starts_with("POLYGON"));
        assert_eq!(parse_polygonal(&text, 0).unwrap(), mp);
    }
}

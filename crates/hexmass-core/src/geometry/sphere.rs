//! Great-circle distances on a spherical Earth.
//! All coordinate math uses f64 in degrees at the API boundary.

/// IUGG mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance in kilometres between two lat/lon points (degrees).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = p2 - p1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().clamp(0.0, 1.0).asin()
}

/// Arithmetic mean of (lat, lon) pairs. `None` for an empty slice.
pub fn mean_centroid(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.0).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.1).sum::<f64>() / n;
    Some((lat, lon))
}

/// Mean haversine distance (km) from each point to the arithmetic centroid.
pub fn mean_distance_to_centroid_km(points: &[(f64, f64)]) -> Option<f64> {
    let (clat, clon) = mean_centroid(points)?;
    let total: f64 = points
        .iter()
        .map(|&(lat, lon)| haversine_km(lat, lon, clat, clon))
        .sum();
    Some(total / points.len() as f64)
}

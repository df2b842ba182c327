// great-circle distance between locations

use crate::models::Location;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers, or `None` if either side has no coordinates.
pub fn distance_km(from: &Location, to: &Location) -> Option<f64> {
    let (lat1, lon1) = from.coordinates()?;
    let (lat2, lon2) = to.coordinates()?;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    Some(EARTH_RADIUS_KM * c)
}

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Postal address with optional coordinates. Used for customer drop-off,
/// restaurant pickup and the snapshots copied onto orders and deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Address {
    pub fn new(street: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            area: None,
            postal_code: None,
            phone: None,
            instructions: None,
            latitude: None,
            longitude: None,
        }
    }

    /// Coordinates, when both are present.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_bounds_are_inclusive() {
        assert!(GeoPoint { latitude: 90.0, longitude: -180.0 }.is_valid());
        assert!(!GeoPoint { latitude: 90.5, longitude: 0.0 }.is_valid());
        assert!(!GeoPoint { latitude: 0.0, longitude: 181.0 }.is_valid());
    }

    #[test]
    fn address_requires_street_and_city() {
        assert!(Address::new("1 Main St", "Dhaka").validate().is_ok());
        assert!(Address::new("", "Dhaka").validate().is_err());
    }
}

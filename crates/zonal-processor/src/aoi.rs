//! Area of interest: a geodesic disc around the selected point.

use serde::Serialize;
use zonal_common::{BoundingBox, GeoPoint};

use crate::error::{Result, ZonalError};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two points in metres.
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// The disc of `radius_m` metres centred at `center`.
///
/// A location belongs to the area iff its haversine distance to the centre
/// is at most the radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaOfInterest {
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl AreaOfInterest {
    /// Build the area around a point. The radius must be positive.
    pub fn new(center: GeoPoint, radius_m: f64) -> Result<Self> {
        if !(radius_m.is_finite() && radius_m > 0.0) {
            return Err(ZonalError::invalid_geometry(format!(
                "buffer radius must be > 0, got {}",
                radius_m
            )));
        }
        let center = GeoPoint::validated(center.lon, center.lat)
            .map_err(|e| ZonalError::invalid_geometry(e.to_string()))?;
        Ok(Self { center, radius_m })
    }

    /// Angular radius in degrees of arc.
    pub fn angular_radius_deg(&self) -> f64 {
        (self.radius_m / EARTH_RADIUS_M).to_degrees()
    }

    /// Whether a location lies inside the disc.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        haversine_distance(self.center.lon, self.center.lat, lon, lat) <= self.radius_m
    }

    /// Whether the disc reaches over a pole.
    pub fn covers_pole(&self) -> bool {
        self.center.lat.abs() + self.angular_radius_deg() >= 90.0
    }

    /// Half width in longitude degrees of the disc's slice along `lat`,
    /// or `None` if that latitude misses the disc.
    ///
    /// Returns 180 when the whole parallel lies inside.
    pub fn lon_half_width(&self, lat: f64) -> Option<f64> {
        let phi0 = self.center.lat.to_radians();
        let phi = lat.to_radians();
        let hav = |x: f64| (x / 2.0).sin().powi(2);

        let budget = hav(self.radius_m / EARTH_RADIUS_M) - hav(phi - phi0);
        if budget < 0.0 {
            return None;
        }

        let denom = phi0.cos() * phi.cos();
        if denom <= f64::EPSILON {
            return Some(180.0);
        }

        let x = budget / denom;
        if x >= 1.0 {
            Some(180.0)
        } else {
            Some((2.0 * x.sqrt().asin()).to_degrees())
        }
    }

    /// Longitude/latitude extent of the disc before wrapping, so the
    /// longitudes may run past ±180 near the antimeridian.
    fn raw_extent(&self) -> BoundingBox {
        let radius_deg = self.angular_radius_deg();
        let south = self.center.lat - radius_deg;
        let north = self.center.lat + radius_deg;

        if self.covers_pole() {
            return BoundingBox::new(-180.0, south, 180.0, north);
        }

        // Widest slice of a spherical cap around a non-polar centre.
        let sin_ratio = (self.radius_m / EARTH_RADIUS_M).sin() / self.center.lat.to_radians().cos();
        if sin_ratio >= 1.0 {
            return BoundingBox::new(-180.0, south, 180.0, north);
        }
        let half_lon = sin_ratio.asin().to_degrees();

        BoundingBox::new(
            self.center.lon - half_lon,
            south,
            self.center.lon + half_lon,
            north,
        )
    }

    /// Bounding box enclosing the disc, clamped to valid coordinates.
    ///
    /// Near the antimeridian this only covers the centre's side; use
    /// [`AreaOfInterest::bounding_boxes`] to read data.
    pub fn bounding_box(&self) -> BoundingBox {
        self.raw_extent().clamp_to_valid()
    }

    /// Boxes covering the disc within `[-180, 180]`: one, or two when the
    /// disc crosses the antimeridian. The box holding the centre is first.
    pub fn bounding_boxes(&self) -> Vec<BoundingBox> {
        let world = BoundingBox::default();
        let raw = self.raw_extent();

        let mut boxes = vec![raw.clamp_to_valid()];
        let shift = if raw.min_lon < -180.0 {
            360.0
        } else if raw.max_lon > 180.0 {
            -360.0
        } else {
            return boxes;
        };

        let wrapped = BoundingBox::new(
            raw.min_lon + shift,
            raw.min_lat,
            raw.max_lon + shift,
            raw.max_lat,
        );
        if let Some(part) = wrapped.intersection(&world) {
            boxes.push(part.clamp_to_valid());
        }
        boxes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_radius() {
        let p = GeoPoint::new(0.0, 0.0);
        assert!(AreaOfInterest::new(p, 0.0).is_err());
        assert!(AreaOfInterest::new(p, -5.0).is_err());
        assert!(AreaOfInterest::new(p, f64::NAN).is_err());
        assert!(AreaOfInterest::new(GeoPoint::new(0.0, 95.0), 10.0).is_err());
    }

    #[test]
    fn test_haversine_one_degree() {
        let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 10.0);
    }

    #[test]
    fn test_contains() {
        let aoi = AreaOfInterest::new(GeoPoint::new(10.0, 45.0), 10_000.0).unwrap();
        assert!(aoi.contains(10.0, 45.0));
        assert!(aoi.contains(10.0, 45.08));
        assert!(!aoi.contains(10.0, 45.1));
    }

    #[test]
    fn test_bounding_box_encloses_disc() {
        let aoi = AreaOfInterest::new(GeoPoint::new(-114.07, 51.04), 25_000.0).unwrap();
        let bbox = aoi.bounding_box();

        for step in 0..360 {
            let bearing = (step as f64).to_radians();
            // Walk just inside the rim and check we stay in the box.
            let delta = (aoi.radius_m * 0.999) / EARTH_RADIUS_M;
            let lat1 = aoi.center.lat.to_radians();
            let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
            let lon2 = aoi.center.lon.to_radians()
                + (bearing.sin() * delta.sin() * lat1.cos())
                    .atan2(delta.cos() - lat1.sin() * lat2.sin());
            let (lon, lat) = (lon2.to_degrees(), lat2.to_degrees());
            assert!(aoi.contains(lon, lat));
            assert!(bbox.contains(lon, lat), "({}, {}) outside {:?}", lon, lat, bbox);
        }
    }

    #[test]
    fn test_polar_disc_spans_all_longitudes() {
        let aoi = AreaOfInterest::new(GeoPoint::new(30.0, 89.95), 20_000.0).unwrap();
        assert!(aoi.covers_pole());
        let bbox = aoi.bounding_box();
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
        assert_eq!(bbox.max_lat, 90.0);
    }

    #[test]
    fn test_bounding_boxes_split_at_antimeridian() {
        let aoi = AreaOfInterest::new(GeoPoint::new(179.9, 0.0), 50_000.0).unwrap();
        let boxes = aoi.bounding_boxes();
        assert_eq!(boxes.len(), 2);

        let (east, west) = (boxes[0], boxes[1]);
        assert!(east.contains(179.9, 0.0));
        assert_eq!(east.max_lon, 180.0);
        assert_eq!(west.min_lon, -180.0);
        // 50 km is about 0.45 degrees at the equator.
        assert!((west.max_lon - (-179.65)).abs() < 0.01, "{:?}", west);
        assert_eq!(east.min_lat, west.min_lat);
        assert_eq!(aoi.bounding_box(), east);
    }

    #[test]
    fn test_bounding_boxes_single_away_from_antimeridian() {
        let aoi = AreaOfInterest::new(GeoPoint::new(0.0, 0.0), 50_000.0).unwrap();
        assert_eq!(aoi.bounding_boxes(), vec![aoi.bounding_box()]);

        let polar = AreaOfInterest::new(GeoPoint::new(179.9, 89.9), 50_000.0).unwrap();
        let boxes = polar.bounding_boxes();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].max_lat, 90.0);
    }

    #[test]
    fn test_lon_half_width() {
        let aoi = AreaOfInterest::new(GeoPoint::new(0.0, 0.0), 111_195.0).unwrap();
        let at_center = aoi.lon_half_width(0.0).unwrap();
        assert!((at_center - 1.0).abs() < 1e-3);
        assert!(aoi.lon_half_width(0.5).unwrap() < at_center);
        assert!(aoi.lon_half_width(1.5).is_none());
    }
}

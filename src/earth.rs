//! WGS84 positions and the normal gravity model.
//!
//! A calibration position is stored in ECEF form; the geodetic (NED-frame
//! origin) form is derived on demand. Gravity follows the Somigliana normal
//! gravity with the free-air height correction, resolved in the local NED
//! frame.

use nalgebra::{UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// WGS84 equatorial radius (m).
pub const EQUATORIAL_RADIUS: f64 = 6_378_137.0;
/// WGS84 polar radius (m).
pub const POLAR_RADIUS: f64 = 6_356_752.314_25;
/// WGS84 flattening.
pub const FLATTENING: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity.
pub const ECCENTRICITY: f64 = 0.081_819_190_842_5;
/// WGS84 gravitational constant (m³/s²).
pub const GM: f64 = 3.986_004_418e14;
/// Earth rotation rate (rad/s).
pub const EARTH_ROTATION_RATE: f64 = 7.292_115e-5;

const EQUATOR_GRAVITY: f64 = 9.780_325_335_9;
const SOMIGLIANA_K: f64 = 0.001_931_853;
const GEODETIC_ITERATIONS: usize = 10;

/// Earth-centered, Earth-fixed cartesian position (m).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EcefPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Geodetic position defining the origin of a local NED frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NedPosition {
    /// Geodetic latitude (rad).
    pub latitude: f64,
    /// Longitude (rad).
    pub longitude: f64,
    /// Height above the WGS84 ellipsoid (m).
    pub height: f64,
}

/// Calibration position in either representation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Position {
    Ecef(EcefPosition),
    Ned(NedPosition),
}

impl EcefPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Geodetic coordinates, iterating latitude to machine precision.
    pub fn to_ned(&self) -> NedPosition {
        let e2 = ECCENTRICITY * ECCENTRICITY;
        let p = self.x.hypot(self.y);
        let longitude = self.y.atan2(self.x);

        let mut latitude = self.z.atan2(p * (1.0 - e2));
        let mut height = 0.0;
        for _ in 0..GEODETIC_ITERATIONS {
            let n = prime_vertical_radius(latitude);
            height = p * latitude.cos() + self.z * latitude.sin()
                - EQUATORIAL_RADIUS * (1.0 - e2 * latitude.sin().powi(2)).sqrt();
            latitude = self.z.atan2(p * (1.0 - e2 * n / (n + height)));
        }

        NedPosition {
            latitude,
            longitude,
            height,
        }
    }

    /// Distance based equality.
    pub fn equals(&self, other: &Self, tolerance: f64) -> bool {
        (self.to_vector() - other.to_vector()).norm() <= tolerance
    }
}

impl NedPosition {
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Self {
            latitude,
            longitude,
            height,
        }
    }

    pub fn to_ecef(&self) -> EcefPosition {
        let e2 = ECCENTRICITY * ECCENTRICITY;
        let n = prime_vertical_radius(self.latitude);
        let (sin_lat, cos_lat) = self.latitude.sin_cos();
        let (sin_lon, cos_lon) = self.longitude.sin_cos();
        EcefPosition {
            x: (n + self.height) * cos_lat * cos_lon,
            y: (n + self.height) * cos_lat * sin_lon,
            z: (n * (1.0 - e2) + self.height) * sin_lat,
        }
    }

    /// Component wise equality: `angle_tolerance` in radians, `height_tolerance`
    /// in metres.
    pub fn equals(&self, other: &Self, angle_tolerance: f64, height_tolerance: f64) -> bool {
        (self.latitude - other.latitude).abs() <= angle_tolerance
            && wrap_angle(self.longitude - other.longitude).abs() <= angle_tolerance
            && (self.height - other.height).abs() <= height_tolerance
    }

    /// Normal gravity resolved in the NED frame at this position (m/s²).
    pub fn gravity(&self) -> Vector3<f64> {
        let sin_lat = self.latitude.sin();
        let e2 = ECCENTRICITY * ECCENTRICITY;
        let g0 = EQUATOR_GRAVITY * (1.0 + SOMIGLIANA_K * sin_lat * sin_lat)
            / (1.0 - e2 * sin_lat * sin_lat).sqrt();

        let h = self.height;
        let r0 = EQUATORIAL_RADIUS;
        let down = g0
            * (1.0
                - 2.0 / r0
                    * (1.0
                        + FLATTENING
                        + EARTH_ROTATION_RATE.powi(2) * r0 * r0 * POLAR_RADIUS / GM)
                    * h
                + 3.0 * h * h / (r0 * r0));
        let north = -8.08e-9 * h * (2.0 * self.latitude).sin();

        Vector3::new(north, 0.0, down)
    }
}

impl Position {
    pub fn to_ecef(&self) -> EcefPosition {
        match self {
            Self::Ecef(ecef) => *ecef,
            Self::Ned(ned) => ned.to_ecef(),
        }
    }

    pub fn to_ned(&self) -> NedPosition {
        match self {
            Self::Ecef(ecef) => ecef.to_ned(),
            Self::Ned(ned) => *ned,
        }
    }
}

impl From<EcefPosition> for Position {
    fn from(ecef: EcefPosition) -> Self {
        Self::Ecef(ecef)
    }
}

impl From<NedPosition> for Position {
    fn from(ned: NedPosition) -> Self {
        Self::Ned(ned)
    }
}

/// Specific force sensed by a body at rest: the reaction to gravity,
/// resolved in the body frame when the body-to-NED `orientation` is known and
/// in the NED frame otherwise.
pub fn specific_force_at_rest(
    gravity_ned: &Vector3<f64>,
    orientation: Option<&UnitQuaternion<f64>>,
) -> Vector3<f64> {
    let f_ned = -gravity_ned;
    match orientation {
        Some(body_to_ned) => body_to_ned.inverse_transform_vector(&f_ned),
        None => f_ned,
    }
}

fn prime_vertical_radius(latitude: f64) -> f64 {
    let e2 = ECCENTRICITY * ECCENTRICITY;
    EQUATORIAL_RADIUS / (1.0 - e2 * latitude.sin().powi(2)).sqrt()
}

fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

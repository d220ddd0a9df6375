//! Positional and velocity representations.
//!
//! The graph only ever moves raw cartesian vectors around. This module is the
//! boundary where those vectors are turned into the named fields a frame
//! exposes (`lon`/`lat`/`distance`, proper motions, ...) and back.

use bincode::{Decode, Encode};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use uom::si::angle::{degree, radian};
use uom::si::f64::Angle;

/// Structural form of positional data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Representation {
    /// `x`, `y`, `z`
    Cartesian,
    /// `lon`, `lat` in radians and `distance` in caller units
    Spherical,
}

/// Structural form of velocity data paired with a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Differential {
    /// `d_x`, `d_y`, `d_z`
    Cartesian,
    /// `pm_lon_coslat` and `pm_lat` in radians per time unit, `radial_velocity`
    /// in distance units per time unit.
    SphericalCosLat,
}

/// Wraps a longitude in radians into `[0, 2π)`.
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Local orthonormal basis (e_r, e_lon, e_lat) at a direction.
fn spherical_basis(lon: f64, lat: f64) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let (sin_lon, cos_lon) = lon.sin_cos();
    let (sin_lat, cos_lat) = lat.sin_cos();
    (
        Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
        Vector3::new(-sin_lon, cos_lon, 0.0),
        Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
    )
}

fn cartesian_to_spherical(v: &Vector3<f64>) -> [f64; 3] {
    let distance = v.norm();
    if distance == 0.0 {
        return [0.0, 0.0, 0.0];
    }
    let lon = wrap_longitude(v.y.atan2(v.x));
    let lat = v.z.atan2(v.x.hypot(v.y));
    [lon, lat, distance]
}

impl Representation {
    /// Canonical component names, in storage order.
    pub fn components(&self) -> [&'static str; 3] {
        match self {
            Representation::Cartesian => ["x", "y", "z"],
            Representation::Spherical => ["lon", "lat", "distance"],
        }
    }

    /// Converts a raw cartesian vector into this representation's components.
    pub fn from_cartesian(&self, v: &Vector3<f64>) -> [f64; 3] {
        match self {
            Representation::Cartesian => [v.x, v.y, v.z],
            Representation::Spherical => cartesian_to_spherical(v),
        }
    }

    /// Converts components of this representation into a raw cartesian vector.
    pub fn to_cartesian(&self, components: [f64; 3]) -> Vector3<f64> {
        match self {
            Representation::Cartesian => Vector3::from(components),
            Representation::Spherical => {
                let [lon, lat, distance] = components;
                let (e_r, _, _) = spherical_basis(lon, lat);
                e_r * distance
            }
        }
    }
}

impl Differential {
    pub fn components(&self) -> [&'static str; 3] {
        match self {
            Differential::Cartesian => ["d_x", "d_y", "d_z"],
            Differential::SphericalCosLat => ["pm_lon_coslat", "pm_lat", "radial_velocity"],
        }
    }

    /// Converts a raw cartesian velocity at `position` into this differential's components.
    pub fn from_cartesian(&self, position: &Vector3<f64>, velocity: &Vector3<f64>) -> [f64; 3] {
        match self {
            Differential::Cartesian => [velocity.x, velocity.y, velocity.z],
            Differential::SphericalCosLat => {
                let [lon, lat, distance] = cartesian_to_spherical(position);
                let (e_r, e_lon, e_lat) = spherical_basis(lon, lat);
                let radial_velocity = velocity.dot(&e_r);
                if distance == 0.0 {
                    return [0.0, 0.0, radial_velocity];
                }
                [
                    velocity.dot(&e_lon) / distance,
                    velocity.dot(&e_lat) / distance,
                    radial_velocity,
                ]
            }
        }
    }

    /// Converts differential components at `position` back into a raw cartesian velocity.
    pub fn to_cartesian(&self, position: &Vector3<f64>, components: [f64; 3]) -> Vector3<f64> {
        match self {
            Differential::Cartesian => Vector3::from(components),
            Differential::SphericalCosLat => {
                let [lon, lat, distance] = cartesian_to_spherical(position);
                let (e_r, e_lon, e_lat) = spherical_basis(lon, lat);
                let [pm_lon_coslat, pm_lat, radial_velocity] = components;
                e_r * radial_velocity
                    + e_lon * (pm_lon_coslat * distance)
                    + e_lat * (pm_lat * distance)
            }
        }
    }
}

/// One element's components, labelled with a frame's axis names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedComponents {
    pub names: [String; 3],
    pub values: [f64; 3],
}

impl NamedComponents {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl fmt::Display for NamedComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// A spherical position with typed angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalPosition {
    pub lon: Angle,
    pub lat: Angle,
    pub distance: f64,
}

impl SphericalPosition {
    pub fn new(lon: Angle, lat: Angle, distance: f64) -> Self {
        Self { lon, lat, distance }
    }

    /// A point on the unit sphere.
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self::new(Angle::new::<degree>(lon), Angle::new::<degree>(lat), 1.0)
    }

    pub fn from_cartesian(v: &Vector3<f64>) -> Self {
        let [lon, lat, distance] = cartesian_to_spherical(v);
        Self::new(Angle::new::<radian>(lon), Angle::new::<radian>(lat), distance)
    }

    pub fn to_cartesian(&self) -> Vector3<f64> {
        Representation::Spherical.to_cartesian([
            self.lon.get::<radian>(),
            self.lat.get::<radian>(),
            self.distance,
        ])
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon.get::<degree>()
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat.get::<degree>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_approx_eq, assert_vector_approx_eq};

    #[test]
    fn test_wrap_longitude() {
        assert_approx_eq(wrap_longitude(-0.5), TAU - 0.5, 1e-12, "negative");
        assert_approx_eq(wrap_longitude(TAU + 0.25), 0.25, 1e-12, "overflow");
        assert_eq!(wrap_longitude(-1e-300), 0.0);
    }

    #[test]
    fn test_spherical_round_trip() {
        let v = Vector3::new(-1.0, -2.0, 0.5);
        let components = Representation::Spherical.from_cartesian(&v);
        assert!(components[0] >= 0.0 && components[0] < TAU);
        assert_vector_approx_eq(
            &Representation::Spherical.to_cartesian(components),
            &v,
            1e-12,
            "spherical",
        );
    }

    #[test]
    fn test_spherical_of_origin() {
        let components = Representation::Spherical.from_cartesian(&Vector3::zeros());
        assert_eq!(components, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pole_latitude() {
        let components = Representation::Spherical.from_cartesian(&Vector3::new(0.0, 0.0, 2.0));
        assert_approx_eq(components[1], std::f64::consts::FRAC_PI_2, 1e-12, "lat");
        assert_approx_eq(components[2], 2.0, 1e-12, "distance");
    }

    #[test]
    fn test_spherical_velocity_components() {
        // On the x axis at distance 2, moving along +y at 4 units/time.
        let position = Vector3::new(2.0, 0.0, 0.0);
        let velocity = Vector3::new(1.0, 4.0, 0.0);
        let [pm_lon_coslat, pm_lat, rv] =
            Differential::SphericalCosLat.from_cartesian(&position, &velocity);
        assert_approx_eq(pm_lon_coslat, 2.0, 1e-12, "pm_lon_coslat");
        assert_approx_eq(pm_lat, 0.0, 1e-12, "pm_lat");
        assert_approx_eq(rv, 1.0, 1e-12, "radial_velocity");

        let back = Differential::SphericalCosLat.to_cartesian(&position, [pm_lon_coslat, pm_lat, rv]);
        assert_vector_approx_eq(&back, &velocity, 1e-12, "velocity");
    }

    #[test]
    fn test_named_components() {
        let named = NamedComponents {
            names: ["Lambda".into(), "Beta".into(), "distance".into()],
            values: [1.0, 2.0, 3.0],
        };
        assert_eq!(named.get("Beta"), Some(2.0));
        assert_eq!(named.get("lat"), None);
        assert_eq!(named.to_string(), "Lambda=1, Beta=2, distance=3");
    }

    #[test]
    fn test_spherical_position_degrees() {
        let position = SphericalPosition::from_degrees(280.161732, 11.91934);
        let back = SphericalPosition::from_cartesian(&position.to_cartesian());
        assert_approx_eq(back.lon_degrees(), 280.161732, 1e-9, "lon");
        assert_approx_eq(back.lat_degrees(), 11.91934, 1e-9, "lat");
        assert_approx_eq(back.distance, 1.0, 1e-12, "distance");
    }
}

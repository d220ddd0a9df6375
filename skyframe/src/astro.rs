//! Astronomical frames and the transforms between them.
//!
//! Enough of the sky to exercise the graph end to end: the ICRS, Galactic and
//! Sagittarius-stream frames, a precessed mean equator of date and a simplified
//! galactocentric frame.
//!
//! All rotation matrices here are passive: they re-express a fixed vector in
//! rotated axes.

use crate::coordinate::{Coordinate, Epoch};
use crate::error::FrameGraphResult;
use crate::frames::{FrameDescriptor, SkyFrame};
use crate::graph::TransformGraph;
use crate::representation::{Differential, Representation};
use crate::transform::Transform;
use nalgebra::{Matrix3, Rotation3, Vector3};

pub const ICRS: &str = "icrs";
pub const GALACTIC: &str = "galactic";
pub const SAGITTARIUS: &str = "sagittarius";
pub const MEAN_EQUATOR_OF_DATE: &str = "mean_equator_of_date";
pub const GALACTOCENTRIC: &str = "galactocentric";

/// Sun to Galactic centre distance, in kpc.
pub const DEFAULT_SUN_DISTANCE: f64 = 8.122;

/// Solar velocity relative to the Galactic centre, in km/s (U, V, W).
pub const DEFAULT_SOLAR_VELOCITY: [f64; 3] = [12.9, 245.6, 7.78];

/// Euler angles (z-x-z, degrees) of the Sagittarius stream frame, Law & Majewski (2010).
const SGR_PHI: f64 = 180.0 + 3.75;
const SGR_THETA: f64 = 90.0 - 13.46;
const SGR_PSI: f64 = 180.0 + 14.111534;

/// ICRS to Galactic, from the Hipparcos definition of the Galactic pole and origin.
#[rustfmt::skip]
const ICRS_TO_GALACTIC: [f64; 9] = [
    -0.0548755604162154, -0.8734370902348850, -0.4838350155487132,
     0.4941094278755837, -0.4448296299600112,  0.7469822444972189,
    -0.8676661490190047, -0.1980763734312015,  0.4559837761750669,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Passive rotation by `angle` radians about `axis`.
pub fn rotation_matrix(angle: f64, axis: Axis) -> Matrix3<f64> {
    let axis = match axis {
        Axis::X => Vector3::x_axis(),
        Axis::Y => Vector3::y_axis(),
        Axis::Z => Vector3::z_axis(),
    };
    Rotation3::from_axis_angle(&axis, -angle).into()
}

fn equatorial(id: &str, lon: &str, lat: &str) -> FrameGraphResult<FrameDescriptor> {
    FrameDescriptor::new(id, Representation::Spherical)?
        .with_differential(Differential::SphericalCosLat)
        .with_axis_name("lon", lon)?
        .with_axis_name("lat", lat)?
        .with_axis_name("pm_lon_coslat", &format!("pm_{lon}_cos{lat}"))?
        .with_axis_name("pm_lat", &format!("pm_{lat}"))
}

pub fn icrs() -> FrameGraphResult<FrameDescriptor> {
    equatorial(ICRS, "ra", "dec")
}

pub fn galactic() -> FrameGraphResult<FrameDescriptor> {
    equatorial(GALACTIC, "l", "b")
}

/// Spherical frame aligned with the Sagittarius stream, axes `Lambda`/`Beta`.
pub fn sagittarius() -> FrameGraphResult<FrameDescriptor> {
    equatorial(SAGITTARIUS, "Lambda", "Beta")
}

pub fn mean_equator_of_date() -> FrameGraphResult<FrameDescriptor> {
    equatorial(MEAN_EQUATOR_OF_DATE, "ra", "dec")
}

/// Cartesian, positions in kpc and velocities in km/s.
pub fn galactocentric() -> FrameGraphResult<FrameDescriptor> {
    Ok(FrameDescriptor::new(GALACTOCENTRIC, Representation::Cartesian)?
        .with_differential(Differential::Cartesian))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icrs;

impl SkyFrame for Icrs {
    const NAME: &'static str = ICRS;

    fn descriptor() -> FrameGraphResult<FrameDescriptor> {
        icrs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Galactic;

impl SkyFrame for Galactic {
    const NAME: &'static str = GALACTIC;

    fn descriptor() -> FrameGraphResult<FrameDescriptor> {
        galactic()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sagittarius;

impl SkyFrame for Sagittarius {
    const NAME: &'static str = SAGITTARIUS;

    fn descriptor() -> FrameGraphResult<FrameDescriptor> {
        sagittarius()
    }
}

pub fn icrs_to_galactic() -> Matrix3<f64> {
    Matrix3::from_row_slice(&ICRS_TO_GALACTIC)
}

/// Galactic to Sagittarius: a z-x-z Euler rotation followed by a flip of the
/// z axis, so that `Beta` grows towards the Galactic north side of the stream.
pub fn sagittarius_matrix() -> Matrix3<f64> {
    let flip_z = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
    flip_z
        * rotation_matrix(SGR_PSI.to_radians(), Axis::Z)
        * rotation_matrix(SGR_THETA.to_radians(), Axis::X)
        * rotation_matrix(SGR_PHI.to_radians(), Axis::Z)
}

/// IAU 1976 precession from J2000 to the mean equator and equinox of `epoch`.
pub fn precession_matrix(epoch: Epoch) -> Matrix3<f64> {
    let t = epoch.julian_centuries_since_j2000();

    let zeta = ((0.0000050 * t + 0.0000839) * t + 0.6406161) * t;
    let z = ((0.0000051 * t + 0.0003041) * t + 0.6406161) * t;
    let theta = ((-0.0000116 * t - 0.0001185) * t + 0.5567530) * t;

    rotation_matrix(-z.to_radians(), Axis::Z)
        * rotation_matrix(theta.to_radians(), Axis::Y)
        * rotation_matrix(-zeta.to_radians(), Axis::Z)
}

/// Heliocentric Galactic cartesian to a frame centred on the Galactic centre.
///
/// Positions must be in kpc and velocities in km/s. The axes stay parallel to
/// the Galactic ones; only the origin and the velocity zero point move.
pub fn galactocentric_transform(
    sun_distance: f64,
    solar_velocity: Vector3<f64>,
) -> FrameGraphResult<Transform> {
    Transform::affine(
        GALACTIC,
        GALACTOCENTRIC,
        Matrix3::identity(),
        Vector3::new(-sun_distance, 0.0, 0.0),
        Some(solar_velocity),
    )
}

/// Registers every frame of this module and the transforms between them, inverses included.
pub fn register_builtin(graph: &TransformGraph) -> FrameGraphResult<()> {
    graph.register_sky_frame::<Icrs>()?;
    graph.register_sky_frame::<Galactic>()?;
    graph.register_sky_frame::<Sagittarius>()?;
    graph.register_frame(mean_equator_of_date()?)?;
    graph.register_frame(galactocentric()?)?;

    graph.register_with_inverse(Transform::static_matrix(ICRS, GALACTIC, icrs_to_galactic())?)?;
    graph.register_with_inverse(Transform::static_matrix(
        GALACTIC,
        SAGITTARIUS,
        sagittarius_matrix(),
    )?)?;
    graph.register_with_inverse(Transform::dynamic_matrix(
        ICRS,
        MEAN_EQUATOR_OF_DATE,
        |c: &Coordinate| Ok(precession_matrix(c.epoch().unwrap_or_default())),
    )?)?;
    graph.register_with_inverse(galactocentric_transform(
        DEFAULT_SUN_DISTANCE,
        Vector3::from(DEFAULT_SOLAR_VELOCITY),
    )?)?;
    Ok(())
}

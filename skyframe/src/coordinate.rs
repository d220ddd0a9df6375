use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frames::{frame_id, FrameDescriptor};
use crate::representation::SphericalPosition;
use crate::FrameIdString;
use bincode::{Decode, Encode};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Modified Julian Date of J2000.0 (TT).
pub const MJD_J2000: f64 = 51544.5;

const DAYS_PER_JULIAN_YEAR: f64 = 365.25;

/// An instant on the TT scale, stored as a Modified Julian Date.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Encode, Decode)]
pub struct Epoch {
    mjd_tt: f64,
}

impl Epoch {
    pub const J2000: Epoch = Epoch { mjd_tt: MJD_J2000 };

    pub fn from_mjd(mjd_tt: f64) -> Self {
        Self { mjd_tt }
    }

    pub fn from_julian_year(year: f64) -> Self {
        Self::from_mjd(MJD_J2000 + (year - 2000.0) * DAYS_PER_JULIAN_YEAR)
    }

    pub fn mjd(&self) -> f64 {
        self.mjd_tt
    }

    pub fn julian_year(&self) -> f64 {
        2000.0 + (self.mjd_tt - MJD_J2000) / DAYS_PER_JULIAN_YEAR
    }

    pub fn julian_centuries_since_j2000(&self) -> f64 {
        (self.mjd_tt - MJD_J2000) / 36525.0
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::J2000
    }
}

/// Positions, and optionally velocities, expressed in one frame.
///
/// Values are stored as raw cartesian vectors; use the frame's
/// [`FrameDescriptor`] to read or build them in a named representation.
/// Coordinates are values: transforms return new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    frame: FrameIdString,
    positions: Vec<Vector3<f64>>,
    velocities: Option<Vec<Vector3<f64>>>,
    epoch: Option<Epoch>,
}

/// Wire shape of a [`Coordinate`] before the shape invariant is checked.
#[derive(Deserialize)]
struct RawCoordinate {
    frame: FrameIdString,
    positions: Vec<Vector3<f64>>,
    velocities: Option<Vec<Vector3<f64>>>,
    epoch: Option<Epoch>,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = FrameGraphError;

    fn try_from(raw: RawCoordinate) -> FrameGraphResult<Self> {
        Coordinate::from_parts(raw.frame, raw.positions, raw.velocities, raw.epoch)
    }
}

impl Coordinate {
    /// A single position.
    pub fn new(frame: &str, position: Vector3<f64>) -> FrameGraphResult<Self> {
        Self::from_positions(frame, vec![position])
    }

    /// A batch of positions.
    pub fn from_positions(frame: &str, positions: Vec<Vector3<f64>>) -> FrameGraphResult<Self> {
        Ok(Self {
            frame: frame_id(frame)?,
            positions,
            velocities: None,
            epoch: None,
        })
    }

    pub fn from_spherical(frame: &str, position: &SphericalPosition) -> FrameGraphResult<Self> {
        Self::new(frame, position.to_cartesian())
    }

    /// Builds positions from components in the frame's representation.
    pub fn from_components(descriptor: &FrameDescriptor, components: &[[f64; 3]]) -> Self {
        Self {
            frame: *descriptor.id(),
            positions: components
                .iter()
                .map(|c| descriptor.position_from_components(*c))
                .collect(),
            velocities: None,
            epoch: None,
        }
    }

    /// Attaches velocities given in the frame's differential.
    pub fn with_velocity_components(
        self,
        descriptor: &FrameDescriptor,
        components: &[[f64; 3]],
    ) -> FrameGraphResult<Self> {
        if components.len() != self.positions.len() {
            return Err(FrameGraphError::ShapeMismatch {
                positions: self.positions.len(),
                velocities: components.len(),
            });
        }
        let velocities = self
            .positions
            .iter()
            .zip(components)
            .map(|(p, c)| descriptor.velocity_from_components(p, *c))
            .collect();
        self.with_velocities(velocities)
    }

    pub fn with_velocities(mut self, velocities: Vec<Vector3<f64>>) -> FrameGraphResult<Self> {
        if velocities.len() != self.positions.len() {
            return Err(FrameGraphError::ShapeMismatch {
                positions: self.positions.len(),
                velocities: velocities.len(),
            });
        }
        self.velocities = Some(velocities);
        Ok(self)
    }

    pub fn with_velocity(self, velocity: Vector3<f64>) -> FrameGraphResult<Self> {
        self.with_velocities(vec![velocity])
    }

    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Assembles transform output, enforcing the position/velocity shape invariant.
    pub(crate) fn from_parts(
        frame: FrameIdString,
        positions: Vec<Vector3<f64>>,
        velocities: Option<Vec<Vector3<f64>>>,
        epoch: Option<Epoch>,
    ) -> FrameGraphResult<Self> {
        if let Some(v) = &velocities {
            if v.len() != positions.len() {
                return Err(FrameGraphError::ShapeMismatch {
                    positions: positions.len(),
                    velocities: v.len(),
                });
            }
        }
        Ok(Self {
            frame,
            positions,
            velocities,
            epoch,
        })
    }

    pub(crate) fn retagged(mut self, frame: FrameIdString) -> Self {
        self.frame = frame;
        self
    }

    pub fn frame(&self) -> &FrameIdString {
        &self.frame
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn velocities(&self) -> Option<&[Vector3<f64>]> {
        self.velocities.as_deref()
    }

    /// Velocities, or an error naming this coordinate's frame when absent.
    pub fn require_velocities(&self) -> FrameGraphResult<&[Vector3<f64>]> {
        self.velocities()
            .ok_or_else(|| FrameGraphError::VelocityRequired {
                frame: self.frame.to_string(),
            })
    }

    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn to_spherical(&self) -> Vec<SphericalPosition> {
        self.positions
            .iter()
            .map(SphericalPosition::from_cartesian)
            .collect()
    }

    /// Same frame, epoch and shape, with every vector within `tolerance`.
    pub fn approx_eq(&self, other: &Coordinate, tolerance: f64) -> bool {
        fn close(a: &[Vector3<f64>], b: &[Vector3<f64>], tolerance: f64) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).norm() <= tolerance)
        }

        self.frame == other.frame
            && self.epoch == other.epoch
            && close(&self.positions, &other.positions, tolerance)
            && match (&self.velocities, &other.velocities) {
                (None, None) => true,
                (Some(a), Some(b)) => close(a, b, tolerance),
                _ => false,
            }
    }
}

fn to_arrays(vectors: &[Vector3<f64>]) -> Vec<[f64; 3]> {
    vectors.iter().map(|v| [v.x, v.y, v.z]).collect()
}

impl Encode for Coordinate {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        self.frame.as_str().encode(encoder)?;
        to_arrays(&self.positions).encode(encoder)?;
        self.velocities
            .as_deref()
            .map(to_arrays)
            .encode(encoder)?;
        self.epoch.encode(encoder)?;
        Ok(())
    }
}

impl Decode<()> for Coordinate {
    fn decode<D: bincode::de::Decoder<Context = ()>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let frame_str = String::decode(decoder)?;
        let frame = FrameIdString::from(&frame_str).map_err(|_| {
            bincode::error::DecodeError::OtherString("Frame name too long".to_string())
        })?;
        let positions = Vec::<[f64; 3]>::decode(decoder)?
            .into_iter()
            .map(Vector3::from)
            .collect();
        let velocities = Option::<Vec<[f64; 3]>>::decode(decoder)?
            .map(|v| v.into_iter().map(Vector3::from).collect());
        let epoch = Option::<Epoch>::decode(decoder)?;
        Coordinate::from_parts(frame, positions, velocities, epoch)
            .map_err(|e| bincode::error::DecodeError::OtherString(e.to_string()))
    }
}

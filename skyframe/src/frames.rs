//! Frame identification and static frame metadata.
//!
//! A frame variant is identified by a short string. Frames that only differ by
//! a parameter (an equinox, an epoch) get distinct identities built with
//! [`frame_variant_id`], so the graph never confuses them.

use crate::error::{FrameGraphError, FrameGraphResult};
use crate::representation::{Differential, NamedComponents, Representation};
use crate::FrameIdString;
use bincode::{Decode, Encode};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Builds a frame identity, failing if the name does not fit.
pub fn frame_id(name: &str) -> FrameGraphResult<FrameIdString> {
    FrameIdString::from(name).map_err(|_| FrameGraphError::FrameNameTooLong(name.to_string()))
}

/// Identity of a parameterised frame variant, e.g. `fk5(J1975.0)`.
pub fn frame_variant_id(base: &str, parameter: &str) -> FrameGraphResult<FrameIdString> {
    frame_id(&format!("{base}({parameter})"))
}

/// Static metadata for one frame variant.
///
/// # Example
/// ```
/// use skyframe::{Differential, FrameDescriptor, Representation};
///
/// let sgr = FrameDescriptor::new("sagittarius", Representation::Spherical)
///     .unwrap()
///     .with_differential(Differential::SphericalCosLat)
///     .with_axis_name("lon", "Lambda")
///     .unwrap()
///     .with_axis_name("lat", "Beta")
///     .unwrap();
/// assert_eq!(sgr.position_names(), ["Lambda", "Beta", "distance"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    id: FrameIdString,
    representation: Representation,
    #[serde(default)]
    differential: Option<Differential>,
    #[serde(default)]
    axis_names: BTreeMap<String, String>,
}

impl FrameDescriptor {
    pub fn new(id: &str, representation: Representation) -> FrameGraphResult<Self> {
        Ok(Self {
            id: frame_id(id)?,
            representation,
            differential: None,
            axis_names: BTreeMap::new(),
        })
    }

    pub fn with_differential(mut self, differential: Differential) -> Self {
        self.differential = Some(differential);
        self
    }

    /// Renames a canonical component. Set the differential first when renaming
    /// velocity components.
    pub fn with_axis_name(mut self, canonical: &str, name: &str) -> FrameGraphResult<Self> {
        if !self.is_canonical(canonical) {
            return Err(FrameGraphError::InvalidAxisName {
                frame: self.id.to_string(),
                component: canonical.to_string(),
            });
        }
        self.axis_names
            .insert(canonical.to_string(), name.to_string());
        Ok(self)
    }

    pub fn id(&self) -> &FrameIdString {
        &self.id
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn differential(&self) -> Option<Differential> {
        self.differential
    }

    fn is_canonical(&self, component: &str) -> bool {
        self.representation.components().contains(&component)
            || self
                .differential
                .is_some_and(|d| d.components().contains(&component))
    }

    /// Checks that every renamed component exists in the representation or differential.
    pub fn validate(&self) -> FrameGraphResult<()> {
        match self.axis_names.keys().find(|k| !self.is_canonical(k)) {
            Some(component) => Err(FrameGraphError::InvalidAxisName {
                frame: self.id.to_string(),
                component: component.clone(),
            }),
            None => Ok(()),
        }
    }

    /// User-facing name for a canonical component.
    pub fn axis_name<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.axis_names
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(canonical)
    }

    fn mapped(&self, components: [&'static str; 3]) -> [String; 3] {
        components.map(|c| self.axis_name(c).to_string())
    }

    pub fn position_names(&self) -> [String; 3] {
        self.mapped(self.representation.components())
    }

    pub fn velocity_names(&self) -> Option<[String; 3]> {
        self.differential.map(|d| self.mapped(d.components()))
    }

    /// Expresses a raw position in this frame's representation.
    pub fn describe_position(&self, position: &Vector3<f64>) -> NamedComponents {
        NamedComponents {
            names: self.position_names(),
            values: self.representation.from_cartesian(position),
        }
    }

    /// Expresses a raw velocity in this frame's differential, falling back to
    /// cartesian components when the frame declares none.
    pub fn describe_velocity(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> NamedComponents {
        let differential = self.differential.unwrap_or(Differential::Cartesian);
        NamedComponents {
            names: self.mapped(differential.components()),
            values: differential.from_cartesian(position, velocity),
        }
    }

    pub fn position_from_components(&self, components: [f64; 3]) -> Vector3<f64> {
        self.representation.to_cartesian(components)
    }

    pub fn velocity_from_components(
        &self,
        position: &Vector3<f64>,
        components: [f64; 3],
    ) -> Vector3<f64> {
        self.differential
            .unwrap_or(Differential::Cartesian)
            .to_cartesian(position, components)
    }
}

impl Encode for FrameDescriptor {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        self.id.as_str().encode(encoder)?;
        self.representation.encode(encoder)?;
        self.differential.encode(encoder)?;
        self.axis_names.encode(encoder)?;
        Ok(())
    }
}

impl Decode<()> for FrameDescriptor {
    fn decode<D: bincode::de::Decoder<Context = ()>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let id_str = String::decode(decoder)?;
        let id = FrameIdString::from(&id_str).map_err(|_| {
            bincode::error::DecodeError::OtherString("Frame name too long".to_string())
        })?;
        Ok(Self {
            id,
            representation: Representation::decode(decoder)?,
            differential: Option::<Differential>::decode(decoder)?,
            axis_names: BTreeMap::<String, String>::decode(decoder)?,
        })
    }
}

/// Compile-time frame identification.
/// Each frame type provides its name and descriptor so it can be registered
/// and targeted without spelling out strings at call sites.
pub trait SkyFrame: Debug + Clone + Copy + PartialEq + Eq + 'static {
    /// Unique frame identity
    const NAME: &'static str;

    fn descriptor() -> FrameGraphResult<FrameDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_approx_eq;

    fn sagittarius() -> FrameDescriptor {
        FrameDescriptor::new("sagittarius", Representation::Spherical)
            .unwrap()
            .with_differential(Differential::SphericalCosLat)
            .with_axis_name("lon", "Lambda")
            .unwrap()
            .with_axis_name("lat", "Beta")
            .unwrap()
            .with_axis_name("pm_lon_coslat", "pm_Lambda_cosBeta")
            .unwrap()
    }

    #[test]
    fn test_axis_names() {
        let frame = sagittarius();
        assert_eq!(frame.position_names(), ["Lambda", "Beta", "distance"]);
        assert_eq!(
            frame.velocity_names().unwrap(),
            ["pm_Lambda_cosBeta", "pm_lat", "radial_velocity"]
        );
        assert_eq!(frame.axis_name("distance"), "distance");
    }

    #[test]
    fn test_unknown_axis_rejected() {
        let result = FrameDescriptor::new("galactic", Representation::Spherical)
            .unwrap()
            .with_axis_name("x", "X");
        assert!(matches!(
            result,
            Err(FrameGraphError::InvalidAxisName { component, .. }) if component == "x"
        ));
    }

    #[test]
    fn test_velocity_axis_requires_differential() {
        let result = FrameDescriptor::new("galactic", Representation::Spherical)
            .unwrap()
            .with_axis_name("pm_lat", "pm_b");
        assert!(result.is_err());
    }

    #[test]
    fn test_name_too_long() {
        let name = "x".repeat(65);
        assert_eq!(
            frame_id(&name),
            Err(FrameGraphError::FrameNameTooLong(name.clone()))
        );
    }

    #[test]
    fn test_variant_ids_are_distinct() {
        let a = frame_variant_id("fk5", "J2000.0").unwrap();
        let b = frame_variant_id("fk5", "J1975.0").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "fk5(J2000.0)");
    }

    #[test]
    fn test_describe_position() {
        let frame = sagittarius();
        let named = frame.describe_position(&Vector3::new(0.0, 2.0, 0.0));
        assert_approx_eq(named.get("Lambda").unwrap(), std::f64::consts::FRAC_PI_2, 1e-12, "Lambda");
        assert_approx_eq(named.get("Beta").unwrap(), 0.0, 1e-12, "Beta");
        assert_approx_eq(named.get("distance").unwrap(), 2.0, 1e-12, "distance");
    }

    #[test]
    fn test_bincode_round_trip() {
        let frame = sagittarius();
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&frame, config).unwrap();
        let (decoded, _): (FrameDescriptor, usize) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, frame);
    }
}

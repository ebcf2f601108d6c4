//! Read-only instrument geometry capability.
//!
//! Geometry parsing and ray tracing live outside the framework; workspaces
//! only carry a shared reference to something implementing
//! [`InstrumentGeometry`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FrameworkError, Result};

/// A position in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct V3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl V3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        V3D { x, y, z }
    }

    pub fn distance(&self, other: &V3D) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for V3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// Geometry queries the framework and algorithms may make.
pub trait InstrumentGeometry: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> Option<V3D>;

    fn sample(&self) -> Option<V3D>;

    /// Detector position for a workspace index.
    fn detector(&self, spectrum_index: usize) -> Result<V3D>;

    fn distance(&self, a: &V3D, b: &V3D) -> f64 {
        a.distance(b)
    }

    /// Source to sample distance.
    fn l1(&self) -> Result<f64> {
        match (self.source(), self.sample()) {
            (Some(src), Some(sample)) => Ok(self.distance(&src, &sample)),
            (None, _) => Err(FrameworkError::computation(format!(
                "Instrument '{}' has no source",
                self.name()
            ))),
            (_, None) => Err(FrameworkError::computation(format!(
                "Instrument '{}' has no sample position",
                self.name()
            ))),
        }
    }

    /// Sample to detector distance.
    fn l2(&self, spectrum_index: usize) -> Result<f64> {
        let sample = self.sample().ok_or_else(|| {
            FrameworkError::computation(format!("Instrument '{}' has no sample position", self.name()))
        })?;
        Ok(self.distance(&sample, &self.detector(spectrum_index)?))
    }
}

/// Point-like instrument: a source, a sample position and one detector per spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleInstrument {
    pub name: String,
    pub source: Option<V3D>,
    pub sample: Option<V3D>,
    pub detectors: Vec<V3D>,
}

impl SimpleInstrument {
    pub fn new(name: impl Into<String>) -> Self {
        SimpleInstrument {
            name: name.into(),
            source: None,
            sample: None,
            detectors: Vec::new(),
        }
    }

    /// Source at `-l1` on the beam axis, sample at the origin and detectors
    /// on a ring of radius `l2` at the given scattering angles (degrees).
    pub fn ring(name: impl Into<String>, l1: f64, l2: f64, two_thetas: &[f64]) -> Self {
        SimpleInstrument {
            name: name.into(),
            source: Some(V3D::new(0.0, 0.0, -l1)),
            sample: Some(V3D::default()),
            detectors: two_thetas
                .iter()
                .map(|deg| {
                    let theta = deg.to_radians();
                    V3D::new(l2 * theta.sin(), 0.0, l2 * theta.cos())
                })
                .collect(),
        }
    }
}

impl InstrumentGeometry for SimpleInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Option<V3D> {
        self.source
    }

    fn sample(&self) -> Option<V3D> {
        self.sample
    }

    fn detector(&self, spectrum_index: usize) -> Result<V3D> {
        self.detectors
            .get(spectrum_index)
            .copied()
            .ok_or(FrameworkError::Index {
                index: spectrum_index,
                len: self.detectors.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ring_geometry_distances() {
        let inst = SimpleInstrument::ring("ring", 10.0, 2.0, &[0.0, 90.0]);
        assert_relative_eq!(inst.l1().unwrap(), 10.0);
        assert_relative_eq!(inst.l2(1).unwrap(), 2.0, epsilon = 1e-12);
        assert!(matches!(inst.detector(2), Err(FrameworkError::Index { .. })));
    }

    #[test]
    fn missing_source_is_a_computation_error() {
        let inst = SimpleInstrument::new("bare");
        assert!(matches!(inst.l1(), Err(FrameworkError::Computation(_))));
    }
}

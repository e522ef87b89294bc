//! Sky position classification

use crac_core::{AltazCoords, AzimuthConfig, TelescopeConfig, TelescopeStatus};

/// Tolerance around the park and flat positions, in degrees
pub const POSITION_TOLERANCE: f64 = 1.0;

/// Maps a horizontal position onto a [`TelescopeStatus`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusClassifier {
    pub park: AltazCoords,
    pub flat: AltazCoords,
    pub max_secure_alt: f64,
    pub azimuth: AzimuthConfig,
}

impl StatusClassifier {
    pub fn new(telescope: &TelescopeConfig, azimuth: &AzimuthConfig) -> Self {
        Self {
            park: telescope.park_position(),
            flat: telescope.flat_position(),
            max_secure_alt: telescope.max_secure_alt,
            azimuth: azimuth.clone(),
        }
    }

    /// Classify a position, in priority order park, flat, secure, azimuth band
    pub fn classify(&self, aa: Option<AltazCoords>) -> TelescopeStatus {
        let Some(aa) = aa.filter(|aa| aa.alt.is_finite() && aa.az.is_finite()) else {
            return TelescopeStatus::Error;
        };

        if near(aa, self.park) {
            TelescopeStatus::Parked
        } else if near(aa, self.flat) {
            TelescopeStatus::Flatter
        } else if self.is_below_curtains_area(aa.alt) {
            TelescopeStatus::Secure
        } else {
            self.azimuth_band(aa.az.rem_euclid(360.0))
        }
    }

    pub fn is_below_curtains_area(&self, alt: f64) -> bool {
        alt <= self.max_secure_alt
    }

    fn azimuth_band(&self, az: f64) -> TelescopeStatus {
        let bounds = &self.azimuth;
        if az < bounds.ne {
            TelescopeStatus::Northeast
        } else if az > bounds.nw {
            TelescopeStatus::Northwest
        } else if az > 180.0 && az < bounds.sw {
            TelescopeStatus::Southwest
        } else if az > bounds.se && az <= 180.0 {
            TelescopeStatus::Southeast
        } else if az >= bounds.sw {
            TelescopeStatus::West
        } else {
            TelescopeStatus::East
        }
    }
}

fn near(aa: AltazCoords, reference: AltazCoords) -> bool {
    let az_delta = (aa.az - reference.az).rem_euclid(360.0);
    (aa.alt - reference.alt).abs() <= POSITION_TOLERANCE
        && az_delta.min(360.0 - az_delta) <= POSITION_TOLERANCE
}

//! Value types and status enums shared by every device

use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal coordinates in degrees (azimuth 0-360, north through east)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltazCoords {
    pub alt: f64,
    pub az: f64,
}

impl AltazCoords {
    pub fn new(alt: f64, az: f64) -> Self {
        Self { alt, az }
    }
}

/// Equatorial coordinates (RA in hours, Dec in degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoords {
    pub ra: f64,
    pub dec: f64,
}

impl EquatorialCoords {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Round both components, as mount targets are sent with limited precision
    pub fn rounded(&self, decimal_places: u32) -> Self {
        let factor = 10f64.powi(decimal_places as i32);
        Self {
            ra: (self.ra * factor).round() / factor,
            dec: (self.dec * factor).round() / factor,
        }
    }
}

/// Curtain status derived from motor, encoder and limit switches.
///
/// The declaration order is load-bearing: variants compare by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurtainStatus {
    Error,
    Opened,
    Closing,
    Disabling,
    Opening,
    Closed,
    Stopped,
    Disabled,
    Danger,
}

impl CurtainStatus {
    /// Motor is driving the curtain
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            CurtainStatus::Opening | CurtainStatus::Closing | CurtainStatus::Disabling
        )
    }

}

/// Which side of the telescope a curtain shields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurtainOrientation {
    East,
    West,
}

impl fmt::Display for CurtainOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurtainOrientation::East => write!(f, "east"),
            CurtainOrientation::West => write!(f, "west"),
        }
    }
}

/// Roof status derived from the motor output and both limit switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoofStatus {
    Closed,
    Closing,
    Opened,
    Opening,
    Error,
}

/// Telescope status.
///
/// `Disconnected`, `Lost` and `Error` are the unsafe states; the remaining
/// variants describe where the telescope points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelescopeStatus {
    Disconnected,
    Lost,
    Error,
    Parked,
    Flatter,
    Secure,
    Northeast,
    Northwest,
    Southwest,
    Southeast,
    East,
    West,
}

impl TelescopeStatus {
    /// No usable position is known
    pub fn is_unsafe(&self) -> bool {
        matches!(
            self,
            TelescopeStatus::Disconnected | TelescopeStatus::Lost | TelescopeStatus::Error
        )
    }

    /// Pointing low enough that the roof can travel over it
    pub fn is_secure(&self) -> bool {
        matches!(
            self,
            TelescopeStatus::Parked | TelescopeStatus::Flatter | TelescopeStatus::Secure
        )
    }

    /// Pointing into one of the bands the curtains shield
    pub fn is_within_curtains_area(&self) -> bool {
        matches!(self, TelescopeStatus::East | TelescopeStatus::West)
    }
}

/// Mount tracking/slewing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelescopeSpeed {
    Tracking,
    Slewing,
    NotTracking,
    Error,
}

impl TelescopeSpeed {
    /// The mount is not being repositioned
    pub fn is_settled(&self) -> bool {
        matches!(self, TelescopeSpeed::Tracking | TelescopeSpeed::NotTracking)
    }
}

/// Power switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchStatus {
    On,
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curtain_status_ordering() {
        assert!(CurtainStatus::Error < CurtainStatus::Opened);
        assert!(CurtainStatus::Opened < CurtainStatus::Closing);
        assert!(CurtainStatus::Opening < CurtainStatus::Closed);
        assert!(CurtainStatus::Disabled < CurtainStatus::Danger);
    }

    #[test]
    fn test_curtain_status_predicates() {
        assert!(CurtainStatus::Disabling.is_moving());
        assert!(!CurtainStatus::Stopped.is_moving());
        assert!(!CurtainStatus::Danger.is_moving());
    }

    #[test]
    fn test_telescope_status_safety() {
        assert!(TelescopeStatus::Lost.is_unsafe());
        assert!(!TelescopeStatus::Lost.is_secure());
        assert!(TelescopeStatus::Parked.is_secure());
        assert!(TelescopeStatus::Secure.is_secure());
        assert!(!TelescopeStatus::East.is_secure());
        assert!(TelescopeStatus::West.is_within_curtains_area());
        assert!(!TelescopeStatus::Northeast.is_within_curtains_area());
    }

    #[test]
    fn test_equatorial_rounding() {
        let eq = EquatorialCoords::new(10.4567, -45.1234).rounded(2);
        assert_eq!(eq.ra, 10.46);
        assert_eq!(eq.dec, -45.12);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TelescopeSpeed::NotTracking).unwrap();
        assert_eq!(json, "\"NOT_TRACKING\"");
        let json = serde_json::to_string(&CurtainOrientation::West).unwrap();
        assert_eq!(json, "\"west\"");
    }
}

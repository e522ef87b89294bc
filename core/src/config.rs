//! Observatory configuration
//!
//! The configuration is a JSON document with one object per section.
//! Missing keys fall back to defaults that describe a simulated observatory.
//! Any key can be overridden from the environment as
//! `CRAC_<SECTION>_<KEY>`, e.g. `CRAC_TELESCOPE_HOSTNAME=10.0.0.5`.

use crate::error::{DomeError, DomeResult};
use crate::types::AltazCoords;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables overriding configuration keys
pub const ENV_PREFIX: &str = "CRAC";

/// Complete observatory configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservatoryConfig {
    pub server: ServerConfig,
    pub geography: GeographyConfig,
    pub telescope: TelescopeConfig,
    pub azimuth: AzimuthConfig,
    pub curtains: CurtainsConfig,
    pub roof: RoofConfig,
    pub simulation: SimulationConfig,
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Use simulated actuators instead of real GPIO
    pub gpio_mock: bool,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Directory for daily rolling log files (console only when unset)
    pub log_directory: Option<PathBuf>,
    /// Days of log files to keep
    pub log_retention_days: u64,
    /// Period of the interlock control cycle
    pub control_cycle_ms: u64,
    /// Keep the dome light on while the telescope slews
    pub autolight: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            gpio_mock: true,
            log_level: "info".to_string(),
            log_directory: None,
            log_retention_days: 7,
            control_cycle_ms: 1000,
            autolight: false,
        }
    }
}

impl ServerConfig {
    pub fn control_cycle(&self) -> Duration {
        Duration::from_millis(self.control_cycle_ms)
    }
}

/// Observer location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographyConfig {
    /// Latitude in degrees, north positive
    pub lat: f64,
    /// Longitude in degrees, east positive
    pub lon: f64,
    /// Height above sea level in meters
    pub height: f64,
    pub equinox: String,
}

impl Default for GeographyConfig {
    fn default() -> Self {
        Self {
            lat: 45.5,
            lon: 9.2,
            height: 200.0,
            equinox: "J2000".to_string(),
        }
    }
}

/// Telescope driver backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelescopeDriverKind {
    Indi,
    Theskyx,
    Simulator,
}

/// Telescope connection and reference positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeConfig {
    pub driver: TelescopeDriverKind,
    pub hostname: String,
    /// Mount endpoint port (driver default when unset)
    pub port: Option<u16>,
    /// INDI device name of the mount
    pub device_name: String,
    pub park_alt: f64,
    pub park_az: f64,
    pub flat_alt: f64,
    pub flat_az: f64,
    /// Highest altitude still considered safe for the roof to travel
    pub max_secure_alt: f64,
    /// Whether the mount can switch tracking off
    pub tracking_off_capability: bool,
    /// Timeout for connecting and for each request/response exchange
    pub io_timeout_ms: u64,
    /// Pause between polling iterations
    pub poll_interval_ms: u64,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            driver: TelescopeDriverKind::Simulator,
            hostname: "localhost".to_string(),
            port: None,
            device_name: "Telescope Simulator".to_string(),
            park_alt: 0.0,
            park_az: 0.0,
            flat_alt: 10.0,
            flat_az: 90.0,
            max_secure_alt: 15.0,
            tracking_off_capability: true,
            io_timeout_ms: 5000,
            poll_interval_ms: 500,
        }
    }
}

impl TelescopeConfig {
    pub fn park_position(&self) -> AltazCoords {
        AltazCoords::new(self.park_alt, self.park_az)
    }

    pub fn flat_position(&self) -> AltazCoords {
        AltazCoords::new(self.flat_alt, self.flat_az)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Azimuth band boundaries in degrees.
///
/// `ne <= se <= 180 <= sw <= nw`; the bands `[ne, se]` and `[sw, nw]` are
/// EAST and WEST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzimuthConfig {
    pub ne: f64,
    pub se: f64,
    pub sw: f64,
    pub nw: f64,
}

impl Default for AzimuthConfig {
    fn default() -> Self {
        Self {
            ne: 60.0,
            se: 120.0,
            sw: 240.0,
            nw: 300.0,
        }
    }
}

/// Curtain travel and the altitude scale mapped onto it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurtainsConfig {
    /// Encoder steps of a full travel
    pub max_step: i64,
    /// Step count at which motion is forced to stop
    pub security_step: i64,
    /// Altitude at which the east curtain is fully closed
    pub park_east: f64,
    /// Altitude at which the east curtain is fully open
    pub max_east: f64,
    pub park_west: f64,
    pub max_west: f64,
    /// Limit for blocking limit-switch waits during calibration
    pub switch_timeout_ms: u64,
}

impl Default for CurtainsConfig {
    fn default() -> Self {
        Self {
            max_step: 1000,
            security_step: 1050,
            park_east: 10.0,
            max_east: 80.0,
            park_west: 10.0,
            max_west: 80.0,
            switch_timeout_ms: 120_000,
        }
    }
}

impl CurtainsConfig {
    pub fn switch_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoofConfig {
    /// Limit for blocking open/close waits
    pub switch_timeout_ms: u64,
}

impl Default for RoofConfig {
    fn default() -> Self {
        Self {
            switch_timeout_ms: 90_000,
        }
    }
}

impl RoofConfig {
    pub fn switch_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_timeout_ms)
    }
}

/// Timing of the simulated actuators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time the simulated curtain motor takes per encoder step
    pub curtain_step_ms: u64,
    /// Time the simulated roof takes to travel between limit switches
    pub roof_travel_ms: u64,
    /// Polling iterations the simulated mount needs to finish a slew
    pub telescope_slew_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            curtain_step_ms: 20,
            roof_travel_ms: 10_000,
            telescope_slew_polls: 5,
        }
    }
}

impl ObservatoryConfig {
    /// Load from a JSON file, apply environment overrides and validate
    pub fn load(path: &Path) -> DomeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DomeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_with_env(&text, std::env::vars())
    }

    /// Parse JSON text, apply `CRAC_<SECTION>_<KEY>` overrides from `vars`
    /// and validate
    pub fn from_json_with_env<I>(text: &str, vars: I) -> DomeResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // Round-trip through the typed model so every key exists before overriding
        let parsed: ObservatoryConfig = serde_json::from_str(text)?;
        let mut tree = serde_json::to_value(&parsed)?;
        apply_env_overrides(&mut tree, vars);

        let config: ObservatoryConfig = serde_json::from_value(tree)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> DomeResult<()> {
        let c = &self.curtains;
        if c.max_step <= 0 {
            return Err(DomeError::InvalidConfig(format!(
                "curtains.max_step must be positive, got {}",
                c.max_step
            )));
        }
        if c.security_step < c.max_step {
            return Err(DomeError::InvalidConfig(format!(
                "curtains.security_step ({}) must not be below max_step ({})",
                c.security_step, c.max_step
            )));
        }
        if (c.max_east - c.park_east).abs() < f64::EPSILON
            || (c.max_west - c.park_west).abs() < f64::EPSILON
        {
            return Err(DomeError::InvalidConfig(
                "curtain park and max reference angles must differ".to_string(),
            ));
        }

        let a = &self.azimuth;
        if !(a.ne <= a.se && a.se <= 180.0 && 180.0 <= a.sw && a.sw <= a.nw && a.nw <= 360.0) {
            return Err(DomeError::InvalidConfig(format!(
                "azimuth boundaries must satisfy ne <= se <= 180 <= sw <= nw <= 360, got {:?}",
                a
            )));
        }

        if self.server.control_cycle_ms == 0 {
            return Err(DomeError::InvalidConfig(
                "server.control_cycle_ms must be positive".to_string(),
            ));
        }
        if self.telescope.io_timeout_ms == 0 {
            return Err(DomeError::InvalidConfig(
                "telescope.io_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_env_overrides<I>(tree: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let Value::Object(sections) = tree else {
        return;
    };

    for (name, raw) in vars {
        let Some(rest) = name
            .strip_prefix(ENV_PREFIX)
            .and_then(|r| r.strip_prefix('_'))
        else {
            continue;
        };

        // Section names contain no underscore, keys may
        let Some((section, key)) = rest.split_once('_') else {
            continue;
        };
        let section = section.to_lowercase();
        let key = key.to_lowercase();

        let Some(Value::Object(entries)) = sections.get_mut(&section) else {
            continue;
        };
        let Some(current) = entries.get_mut(&key) else {
            tracing::warn!("Ignoring unknown configuration override {}", name);
            continue;
        };

        tracing::debug!("Configuration {}.{} overridden from environment", section, key);
        *current = override_value(current, &raw);
    }
}

fn override_value(current: &Value, raw: &str) -> Value {
    match current {
        Value::String(_) => Value::String(raw.to_string()),
        Value::Bool(_) => Value::Bool(!matches!(
            raw.trim().to_lowercase().as_str(),
            "false" | "off" | "0" | ""
        )),
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

//! Observatory dome core
//!
//! Device-level control for the dome of a small observatory:
//!
//! - Shared coordinate and status types
//! - Actuator primitives (digital output/input, rotary encoder, motor) and
//!   their simulated counterparts
//! - Curtain controller with encoder-driven positioning and safety stops
//! - Roof controller with limit-switch derived status
//! - Power switches for telescope, CCD, flat panel and dome light
//! - Horizontal <-> equatorial coordinate transform
//! - Configuration model with environment overrides

pub mod config;
pub mod curtain;
mod error;
pub mod hardware;
pub mod roof;
pub mod sim;
pub mod switch;
pub mod transform;
mod types;

pub use config::{
    AzimuthConfig, CurtainsConfig, GeographyConfig, ObservatoryConfig, RoofConfig, ServerConfig,
    SimulationConfig, TelescopeConfig, TelescopeDriverKind,
};
pub use curtain::{Curtain, CurtainHardware, StepLimits};
pub use error::{DomeError, DomeResult};
pub use roof::{Roof, RoofHardware};
pub use switch::{PowerSwitch, PowerSwitches};
pub use transform::{CoordinateTransform, SiderealTransform, Site};
pub use types::*;

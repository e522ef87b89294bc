//! Telescope mount control
//!
//! - Driver interface shared by the INDI, TheSkyX and simulator backends
//! - Registry resolving the configured backend at startup
//! - Polling engine serializing queued commands against the mount and
//!   publishing position/status snapshots

mod driver;
mod engine;
mod error;
pub mod indi;
pub mod registry;
pub mod simulator;
mod status;
pub mod theskyx;

pub use driver::{MountGeometry, Reading, TelescopeDriver};
pub use engine::{Job, TelescopeEngine, TelescopeHandle, TelescopeSnapshot};
pub use error::{TelescopeError, TelescopeResult};
pub use simulator::{SimulatedTelescope, SimulatorControl};
pub use status::{StatusClassifier, POSITION_TOLERANCE};

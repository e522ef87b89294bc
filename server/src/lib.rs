//! Observatory dome server
//!
//! Wires the dome devices into one application context and runs the
//! cross-device interlock on every control cycle.

pub mod context;
pub mod interlock;
pub mod logging;

pub use context::AppContext;
pub use interlock::{
    CalibrationReport, CurtainReport, CurtainTargets, CurtainsAction, CurtainsReport, CycleReport,
    Interlock, TelescopeAction, TelescopeReport,
};

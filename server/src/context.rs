//! Application context
//!
//! Every device the server drives is constructed here exactly once and
//! shared behind an `Arc` for the lifetime of the process.

use crac_core::sim::{SimCurtainRig, SimOutput, SimRoofRig};
use crac_core::{
    CoordinateTransform, Curtain, CurtainOrientation, DomeError, DomeResult, ObservatoryConfig,
    PowerSwitch, PowerSwitches, Roof, SiderealTransform, Site, StepLimits,
};
use crac_telescope::registry;
use crac_telescope::{StatusClassifier, TelescopeDriver, TelescopeEngine, TelescopeHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AppContext {
    pub config: ObservatoryConfig,
    pub roof: Roof,
    pub curtain_east: Curtain,
    pub curtain_west: Curtain,
    pub switches: PowerSwitches,
    pub telescope: TelescopeEngine,
}

impl AppContext {
    /// Build the context for the configured hardware backend.
    ///
    /// Only the simulated actuators are available; a configuration asking
    /// for real GPIO is rejected.
    pub fn build(config: ObservatoryConfig) -> DomeResult<Self> {
        if !config.server.gpio_mock {
            return Err(DomeError::HardwareUnavailable(
                "GPIO backend is not compiled in, set server.gpio_mock".to_string(),
            ));
        }
        Ok(Self::simulated(config))
    }

    /// Context backed by simulated roof, curtains and relays and the
    /// configured telescope driver
    pub fn simulated(config: ObservatoryConfig) -> Self {
        let sim = &config.simulation;
        let step_period = Duration::from_millis(sim.curtain_step_ms);

        let roof_rig = SimRoofRig::new(Duration::from_millis(sim.roof_travel_ms));
        let east_rig = SimCurtainRig::motorized(config.curtains.max_step, step_period);
        let west_rig = SimCurtainRig::motorized(config.curtains.max_step, step_period);

        let limits = StepLimits::new(config.curtains.max_step, config.curtains.security_step);
        let switch_timeout = config.curtains.switch_timeout();

        let roof = Roof::new(roof_rig.hardware(), config.roof.switch_timeout());
        let curtain_east = Curtain::new(
            CurtainOrientation::East,
            east_rig.hardware(),
            limits,
            switch_timeout,
        );
        let curtain_west = Curtain::new(
            CurtainOrientation::West,
            west_rig.hardware(),
            limits,
            switch_timeout,
        );

        let transform: Arc<dyn CoordinateTransform> =
            Arc::new(SiderealTransform::new(Site::from(&config.geography)));
        let driver = registry::create_driver(&config, transform);

        info!("Simulated dome assembled");
        Self::assemble(
            config,
            roof,
            curtain_east,
            curtain_west,
            simulated_switches(),
            driver,
        )
    }

    /// Put already constructed devices together
    pub fn assemble(
        config: ObservatoryConfig,
        roof: Roof,
        curtain_east: Curtain,
        curtain_west: Curtain,
        switches: PowerSwitches,
        driver: Box<dyn TelescopeDriver>,
    ) -> Self {
        let classifier = StatusClassifier::new(&config.telescope, &config.azimuth);
        let telescope =
            TelescopeEngine::new(driver, classifier, config.telescope.poll_interval());

        Self {
            config,
            roof,
            curtain_east,
            curtain_west,
            switches,
            telescope,
        }
    }

    pub fn telescope_handle(&self) -> TelescopeHandle {
        self.telescope.handle()
    }

    pub fn curtains(&self) -> [&Curtain; 2] {
        [&self.curtain_east, &self.curtain_west]
    }

    /// Stop telescope polling and both curtain motors
    pub async fn shutdown(&self) {
        self.telescope.polling_end().await;
        for curtain in self.curtains() {
            curtain.stop();
        }
        info!("Dome devices stopped");
    }
}

pub fn simulated_switches() -> PowerSwitches {
    let relay = |name| PowerSwitch::new(name, Arc::new(SimOutput::new(false)));
    PowerSwitches {
        telescope: relay("telescope"),
        ccd: relay("ccd"),
        flat_light: relay("flat_light"),
        dome_light: relay("dome_light"),
    }
}

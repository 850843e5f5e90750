pub mod agent;
pub mod config;
pub mod flocking;
pub mod logging;
pub mod math;
pub mod neighbor_grid;
pub mod physics;
pub mod scheduler;
pub mod simulation;

use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use agent::{Agent, AgentParams};
pub use config::SimConfig;
pub use physics::{BodyHandle, PhysicsError, PhysicsWorld, TankWorld};
pub use simulation::{FrameSnapshot, SimError, Simulation, MAX_POPULATION};

pub const DEFAULT_WIDTH: f32 = 1_280.0;
pub const DEFAULT_HEIGHT: f32 = 720.0;

/// Options accepted by the [`Aquarium`] constructor. Every field is optional.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitOptions {
    pub seed: Option<f64>,
    pub width: f32,
    pub height: f32,
    pub population: usize,
    pub start_time_ms: f64,
    pub verbose: bool,
    pub config: Option<SimConfig>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            seed: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            population: 1,
            start_time_ms: 0.0,
            verbose: false,
            config: None,
        }
    }
}

impl InitOptions {
    /// Validates the options and builds a populated simulation.
    pub fn build(self) -> Result<Simulation<TankWorld>, SimError> {
        if self.population > MAX_POPULATION {
            return Err(SimError::InvalidOptions(
                "population must be 5,000 fish or fewer for browser builds",
            ));
        }
        let seed = match normalize_seed(self.seed)? {
            Some(seed) => seed,
            None => getrandom::u64().map_err(|err| SimError::Entropy(err.to_string()))?,
        };

        let world = TankWorld::new(self.width, self.height);
        let config = self.config.unwrap_or_default();
        let mut simulation = Simulation::new(world, config, seed, self.start_time_ms);
        simulation.spawn(self.population);
        Ok(simulation)
    }
}

fn normalize_seed(seed: Option<f64>) -> Result<Option<u64>, SimError> {
    let Some(value) = seed else {
        return Ok(None);
    };
    if !value.is_finite() {
        return Err(SimError::InvalidOptions("seed must be a finite number"));
    }
    if value < 0.0 {
        return Err(SimError::InvalidOptions("seed must be non-negative"));
    }
    let truncated = value.floor();
    if truncated > u64::MAX as f64 {
        return Err(SimError::InvalidOptions("seed must be representable as u64"));
    }
    Ok(Some(truncated as u64))
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsError::new(&err.to_string()).into()
}

/// Browser handle over one aquarium. The host calls [`Aquarium::frame`] from
/// every animation-frame callback and re-arms the loop itself.
#[wasm_bindgen]
pub struct Aquarium {
    simulation: Simulation<TankWorld>,
}

#[wasm_bindgen]
impl Aquarium {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<Aquarium, JsValue> {
        let options = if options.is_null() || options.is_undefined() {
            InitOptions::default()
        } else {
            from_value::<InitOptions>(options).map_err(js_error)?
        };
        logging::init(options.verbose);

        let simulation = options.build().map_err(js_error)?;
        log::info!("aquarium ready with {} fish", simulation.len());
        Ok(Aquarium { simulation })
    }

    /// Returns true when this frame executed a simulation step.
    pub fn frame(&mut self, timestamp: f64) -> Result<bool, JsValue> {
        self.simulation.frame(timestamp).map_err(js_error)
    }

    pub fn step(&mut self, now: f64) -> Result<(), JsValue> {
        self.simulation.step(now).map_err(js_error)
    }

    /// Appends fish and returns the new flock size.
    pub fn spawn(&mut self, count: usize) -> usize {
        self.simulation.spawn(count);
        self.simulation.len()
    }

    /// Pushes nearby fish away from a click; returns how many moved.
    pub fn click(&mut self, x: f32, y: f32) -> Result<usize, JsValue> {
        self.simulation.apply_click(x, y).map_err(js_error)
    }

    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config = from_value::<SimConfig>(config).map_err(js_error)?;
        self.simulation.set_config(config).map_err(js_error)
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(self.simulation.config()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = setBounds)]
    pub fn set_bounds(&mut self, width: f32, height: f32) {
        self.simulation.set_bounds(width, height);
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.simulation.snapshot().map_err(js_error)?;
        to_value(&snapshot).map_err(js_error)
    }

    #[wasm_bindgen(js_name = swarmDensity)]
    pub fn swarm_density(&mut self, index: usize) -> Result<f32, JsValue> {
        self.simulation.swarm_density(index).map_err(js_error)
    }

    pub fn count(&self) -> usize {
        self.simulation.len()
    }
}

#[wasm_bindgen]
pub fn version() -> String {
    format!("aquarium-sim {}", env!("CARGO_PKG_VERSION"))
}

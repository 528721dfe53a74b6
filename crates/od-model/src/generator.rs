//! Seeded synthetic instance generator.
//!
//! All resources share a depot at the centre of a square service area.
//! Requests get uniformly random locations; their time windows are placed so
//! that each request is reachable from the depot and the depot is reachable
//! again before the horizon closes.  A `dynamism` fraction of requests gets a
//! release date strictly before its window opens.

use od_core::{SimTime, TimeWindow};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{Instance, InstanceBuilder, ModelError, ModelResult, Point};

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub name: String,
    pub group: String,
    pub resources: usize,
    pub requests: usize,
    /// Side length of the square service area.
    pub side: f64,
    /// Depot window end; the depot opens at zero.
    pub horizon: f64,
    pub service_time: f64,
    pub window_width: f64,
    /// Fraction of requests released during the run, in `[0, 1]`.
    pub dynamism: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".into(),
            group: "R1".into(),
            resources: 3,
            requests: 20,
            side: 100.0,
            horizon: 480.0,
            service_time: 10.0,
            window_width: 60.0,
            dynamism: 0.5,
            seed: 42,
        }
    }
}

pub fn generate(cfg: &GeneratorConfig) -> ModelResult<Instance> {
    if cfg.resources == 0 {
        return Err(ModelError::NoResources);
    }
    if !(0.0..=1.0).contains(&cfg.dynamism) {
        return Err(ModelError::Generator(format!("dynamism {} outside [0, 1]", cfg.dynamism)));
    }
    if !(cfg.side > 0.0 && cfg.window_width >= 0.0 && cfg.service_time >= 0.0) {
        return Err(ModelError::Generator("side, window width and service time must be non-negative".into()));
    }

    let depot = Point::new(cfg.side / 2.0, cfg.side / 2.0);
    // Farthest a request can be from the depot.
    let reach = depot.distance(Point::new(0.0, 0.0));
    let latest_open = cfg.horizon - 2.0 * reach - cfg.service_time - cfg.window_width;
    if latest_open < reach {
        return Err(ModelError::Generator(format!(
            "horizon {} too short for side {} and window width {}",
            cfg.horizon, cfg.side, cfg.window_width
        )));
    }

    let mut rng = SmallRng::seed_from_u64(cfg.seed);
    let mut b = InstanceBuilder::new(cfg.name.clone(), TimeWindow::new(0.0, cfg.horizon))
        .group(cfg.group.clone());

    for _ in 0..cfg.resources {
        b.add_resource(depot);
    }
    for _ in 0..cfg.requests {
        let loc = Point::new(rng.gen_range(0.0..=cfg.side), rng.gen_range(0.0..=cfg.side));
        let open = rng.gen_range(reach..=latest_open);
        let window = TimeWindow::new(open, open + cfg.window_width);
        let release = if rng.gen_bool(cfg.dynamism) {
            Some(SimTime(rng.gen_range(0.0..open)))
        } else {
            None
        };
        b.add_request(loc, window, cfg.service_time, release);
    }
    b.build()
}

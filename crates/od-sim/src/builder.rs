//! Fluent builder for constructing a [`Simulator`].

use std::sync::Arc;

use tracing::debug;

use od_core::{SimClock, SystemWall, WallSource};
use od_fleet::StateListener;
use od_model::{CostModel, EuclideanCost, Instance};

use crate::state::{Shared, SimState};
use crate::{
    DispatchConfig, DispatchPolicy, FreezePolicy, NoWaitingPolicy, Optimizer, PolicyKind,
    SimResult, Simulator,
};

/// Fluent builder for [`Simulator<O>`].
///
/// # Required inputs
///
/// - [`Instance`] — the requests, resources and depot window
/// - `O: Optimizer` — the plan producer the engine talks to
///
/// # Optional inputs (have defaults)
///
/// | Method                 | Default                                   |
/// |------------------------|-------------------------------------------|
/// | `.config(c)`           | `DispatchConfig::default()`               |
/// | `.cost(c)`             | `EuclideanCost::from_instance`            |
/// | `.wall(w)`             | `SystemWall`                              |
/// | `.policy(p)`           | chosen by `config.policy`                 |
/// | `.state_listener(l)`   | none                                      |
///
/// If the instance carries no cutoff fraction, the one configured for its
/// group is applied.
///
/// # Example
///
/// ```rust,ignore
/// let sim = SimBuilder::new(instance, optimizer)
///     .config(DispatchConfig::from_file("dispatch.toml")?)
///     .build()?;
/// sim.seed_instance_events()?;
/// let handle = sim.run_in_new_thread()?;
/// ```
pub struct SimBuilder<O: Optimizer> {
    instance:  Instance,
    optimizer: Arc<O>,
    config:    DispatchConfig,
    cost:      Option<Arc<dyn CostModel>>,
    wall:      Option<Arc<dyn WallSource>>,
    policy:    Option<Arc<dyn DispatchPolicy<O>>>,
    listener:  Option<StateListener>,
}

impl<O: Optimizer> SimBuilder<O> {
    pub fn new(instance: Instance, optimizer: Arc<O>) -> Self {
        Self {
            instance,
            optimizer,
            config:   DispatchConfig::default(),
            cost:     None,
            wall:     None,
            policy:   None,
            listener: None,
        }
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Travel times used for projected arrivals and service start times.
    /// Should agree with whatever the optimizer's plans use.
    pub fn cost(mut self, cost: Arc<dyn CostModel>) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Wall-time source driving the clock.  Tests pass a `ManualWall`.
    pub fn wall(mut self, wall: Arc<dyn WallSource>) -> Self {
        self.wall = Some(wall);
        self
    }

    /// Overrides `config.policy`.
    pub fn policy(mut self, policy: Arc<dyn DispatchPolicy<O>>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn state_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> SimResult<Simulator<O>> {
        self.config.validate()?;

        // ── Resolve optional inputs ───────────────────────────────────────
        let instance = match self.instance.cutoff_fraction() {
            Some(_) => self.instance,
            None => {
                let fraction = self.config.cutoff_fraction(self.instance.group());
                self.instance.with_cutoff_fraction(fraction)?
            }
        };
        let instance = Arc::new(instance);
        let cost = self
            .cost
            .unwrap_or_else(|| Arc::new(EuclideanCost::from_instance(&instance)));
        let wall = self.wall.unwrap_or_else(|| Arc::new(SystemWall::new()));
        let policy: Arc<dyn DispatchPolicy<O>> = match self.policy {
            Some(p) => p,
            None => match self.config.policy {
                PolicyKind::Freeze => Arc::new(FreezePolicy),
                PolicyKind::NoWaiting => Arc::new(NoWaitingPolicy),
            },
        };

        // ── Engine state, resources placed at their start homes ───────────
        let clock = SimClock::with_wall(self.config.speed, wall)?;
        let mut state = SimState::new(clock, self.config.wall_time_tolerance_secs);
        if let Some(listener) = self.listener {
            state.tracker.set_listener(listener);
        }
        for r in instance.resources() {
            state.tracker.set_current_node(r.id, r.start_home);
        }

        debug!(
            instance = instance.name(),
            fleet = instance.fleet_size(),
            requests = instance.request_count(),
            cutoff = ?instance.cutoff_time(),
            policy = policy.name(),
            "simulator built"
        );

        let shared = Shared::new(state, self.config, instance, cost);
        Ok(Simulator {
            shared:    Arc::new(shared),
            optimizer: self.optimizer,
            policy,
        })
    }
}

//! dispatch-demo — drive the online dispatch engine with a greedy optimizer.
//!
//! Generates a synthetic instance, starts the simulator on its own thread
//! and runs a cheapest-insertion optimizer on the main thread.  Pass a TOML
//! file as the first argument to override the engine configuration.
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use od_core::{NodeId, ResourceId, SimTime};
use od_event::{Event, EventKind};
use od_model::{CostModel, EuclideanCost, GeneratorConfig, Instance, generate};
use od_plan::{Plan, ScenarioPool, TourPlan};
use od_sim::{DecisionProtocol, DispatchConfig, Optimizer, SimBuilder, SimResult};

// ── Constants ─────────────────────────────────────────────────────────────────

const RESOURCES: usize = 3;
const REQUESTS:  usize = 12;
const SEED:      u64   = 7;
/// Give up if the optimizer hears nothing for this long.
const IDLE_LIMIT: Duration = Duration::from_secs(30);

// ── Greedy optimizer ──────────────────────────────────────────────────────────

enum Msg {
    Event(Event),
    Assign(ResourceId, NodeId),
    Decide,
    Stop,
}

/// Engine-facing half: forwards everything onto a channel drained by the
/// optimizer loop and owns the scenario pool.
struct GreedyOptimizer {
    pool: Mutex<ScenarioPool<TourPlan>>,
    tx:   Sender<Msg>,
}

impl Optimizer for GreedyOptimizer {
    type Plan = TourPlan;

    fn push_event(&self, event: Event) {
        let _ = self.tx.send(Msg::Event(event));
    }

    fn with_pool<R>(&self, f: impl FnOnce(&mut ScenarioPool<TourPlan>) -> R) -> R {
        f(&mut self.pool.lock())
    }

    fn raise_assignment(&self, resource: ResourceId, node: NodeId, _arrival: SimTime) {
        let _ = self.tx.send(Msg::Assign(resource, node));
    }

    fn raise_decision(&self) {
        let _ = self.tx.send(Msg::Decide);
    }

    fn stop(&self) {
        let _ = self.tx.send(Msg::Stop);
    }
}

/// Optimizer loop state.
struct Dispatcher {
    optimizer: Arc<GreedyOptimizer>,
    protocol:  DecisionProtocol<GreedyOptimizer>,
    /// Resources committed to a node they have not finished serving yet.
    in_transit: BTreeMap<ResourceId, NodeId>,
    published:  Option<TourPlan>,
    rejected:   usize,
}

impl Dispatcher {
    fn run(&mut self, rx: &Receiver<Msg>) -> Result<()> {
        loop {
            let msg = rx
                .recv_timeout(IDLE_LIMIT)
                .map_err(|_| anyhow!("optimizer idle for {IDLE_LIMIT:?}"))?;
            match msg {
                Msg::Event(event) => self.on_event(&event)?,
                Msg::Assign(resource, node) => {
                    self.in_transit.insert(resource, node);
                    self.protocol.on_request_assigned(resource, node)?;
                }
                Msg::Decide => self.publish()?,
                Msg::Stop => return Ok(()),
            }
        }
    }

    fn on_event(&mut self, event: &Event) -> SimResult<()> {
        match event.kind {
            EventKind::NewRequest { node } => {
                self.protocol.on_new_request(node)?;
                if !self.insert_request(node) {
                    self.rejected += 1;
                    self.protocol.on_request_rejected(node)?;
                }
                Ok(())
            }
            EventKind::EndOfService { resource, node } => {
                self.protocol.handle_event(event)?;
                self.in_transit.remove(&resource);
                self.optimizer.with_pool(|pool| {
                    if let Some(plan) = pool.distinguished_mut() {
                        if let Err(e) = plan.advance(resource, node, event.time) {
                            warn!(error = %e, "could not advance plan");
                        }
                    }
                });
                Ok(())
            }
            EventKind::Decision => self.publish(),
            _ => self.protocol.handle_event(event),
        }
    }

    fn publish(&mut self) -> SimResult<()> {
        let snapshot = self.optimizer.with_pool(|pool| pool.distinguished().cloned());
        self.protocol.on_plan_published(self.published.as_ref(), snapshot.as_ref())?;
        self.published = snapshot;
        Ok(())
    }

    /// Cheapest feasible insertion of `node` across all tours.
    fn insert_request(&self, node: NodeId) -> bool {
        let in_transit = &self.in_transit;
        self.optimizer.with_pool(|pool| {
            let Some(plan) = pool.distinguished_mut() else { return false };
            let mut best: Option<(f64, TourPlan)> = None;
            for tour in plan.tours() {
                let r = tour.resource();
                let base = tour.end_time().map_or(0.0, |t| t.0);
                // Never displace a committed next node; never go past the end home.
                let first = if in_transit.contains_key(&r) { 2 } else { 1 };
                for pos in first..tour.len() {
                    let mut candidate = plan.clone();
                    if candidate.insert(r, pos, node).is_err() || !candidate.is_feasible() {
                        continue;
                    }
                    let end = candidate.tour(r).and_then(|t| t.end_time()).map_or(f64::INFINITY, |t| t.0);
                    let added = end - base;
                    if best.as_ref().is_none_or(|(c, _)| added < *c) {
                        best = Some((added, candidate));
                    }
                }
            }
            match best {
                Some((added, candidate)) => {
                    info!(node = %node, added, "request inserted");
                    *plan = candidate;
                    true
                }
                None => false,
            }
        })
    }
}

/// Initial plan: static requests spread round-robin, each inserted before
/// the end home.  Returns the requests that fit nowhere.
fn initial_plan(instance: &Arc<Instance>, cost: &Arc<dyn CostModel>) -> Result<(TourPlan, Vec<NodeId>)> {
    let mut plan = TourPlan::new(Arc::clone(instance), Arc::clone(cost));
    let mut unfit = Vec::new();
    let fleet: Vec<ResourceId> = instance.resources().iter().map(|r| r.id).collect();
    for (i, node) in instance.static_requests().enumerate() {
        let r = fleet[i % fleet.len()];
        let len = plan.tour(r).map_or(1, |t| t.len());
        let mut candidate = plan.clone();
        candidate.insert(r, len - 1, node)?;
        if candidate.is_feasible() {
            plan = candidate;
        } else {
            warn!(node = %node, "static request does not fit its tour");
            unfit.push(node);
        }
    }
    Ok((plan, unfit))
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DispatchConfig::from_file(&path)?,
        None => DispatchConfig { speed: 200.0, poll_interval_ms: 10, ..DispatchConfig::default() },
    };

    println!("=== dispatch-demo — online dispatch with freezing ===");
    println!("Resources: {RESOURCES}  |  Requests: {REQUESTS}  |  Seed: {SEED}  |  Speed: {}", config.speed);
    println!();

    // 1. Instance.
    let generator = GeneratorConfig {
        resources: RESOURCES,
        requests:  REQUESTS,
        seed:      SEED,
        ..GeneratorConfig::default()
    };
    let instance = generate(&generator)?;
    let cost: Arc<dyn CostModel> = Arc::new(EuclideanCost::from_instance(&instance));
    let shared_instance = Arc::new(instance.clone());

    // 2. Optimizer with its initial plan.
    let (tx, rx) = unbounded();
    let optimizer = Arc::new(GreedyOptimizer { pool: Mutex::new(ScenarioPool::new()), tx });
    let (plan, unfit) = initial_plan(&shared_instance, &cost)?;
    println!("Initial plan:\n{plan}");
    optimizer.with_pool(|pool| {
        pool.set_distinguished(plan);
    });

    // 3. Simulator.
    let sim = SimBuilder::new(instance, Arc::clone(&optimizer))
        .config(config)
        .cost(Arc::clone(&cost))
        .build()?;
    let seeded = sim.seed_instance_events()?;
    println!("Seeded {seeded} events; freeze horizon {:.2}", sim.protocol().delta());

    let mut dispatcher = Dispatcher {
        optimizer:  Arc::clone(&optimizer),
        protocol:   sim.protocol(),
        in_transit: BTreeMap::new(),
        published:  None,
        rejected:   unfit.len(),
    };
    for node in unfit {
        dispatcher.protocol.on_request_rejected(node)?;
    }

    // 4. Run.
    let t0 = Instant::now();
    let handle = sim.run_in_new_thread()?;
    let outcome = dispatcher.run(&rx);
    if outcome.is_err() {
        sim.stop();
    }
    let summary = handle
        .join()
        .map_err(|_| anyhow!("simulator thread panicked"))??;
    outcome?;

    // 5. Report.
    let ledger = sim.ledger();
    let served = ledger.served().iter().filter(|n| shared_instance.node(**n).is_ok_and(|n| n.is_request())).count();
    println!();
    println!("Run finished in {:.2}s wall", t0.elapsed().as_secs_f64());
    println!("  events dispatched : {}", summary.dispatched);
    println!("  final time        : {:.2}", summary.final_time.0);
    println!("  requests served   : {served}/{REQUESTS}");
    println!("  requests rejected : {}", dispatcher.rejected);
    for record in sim.records() {
        println!("  {} {:<9} served {:?}", record.id, record.state.to_string(), record.served);
    }
    Ok(())
}

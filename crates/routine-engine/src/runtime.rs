//! Routine runtime
//!
//! Owns every routine's lifecycle: re-evaluates triggers on each fact
//! change, fires the then/else program on boolean transitions, and enforces
//! at-most-one live sequencer per routine. All evaluation happens on one
//! task consuming the fact bus, so sequencer create/cancel transitions are
//! atomic with respect to concurrent fact changes.

use chrono::Local;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use ulid::Ulid;

use routine_core::{AstroSource, CommandSink, DeviceCatalog, FactChange, FactSnapshot};
use routine_expr::Evaluator;
use routine_facts::{FactBus, FactStore};
use routine_script::{self as script, SequencerHandle};

use crate::config::EngineConfig;
use crate::routine::{Branch, Routine, RoutineConfig, RoutineError};

/// One registered routine plus its runtime state
struct RoutineEntry {
    routine: Routine,
    /// Result of the previous evaluation; None before the first one
    last_result: Option<bool>,
    /// The live sequencer, if a branch is executing
    active: Option<(Branch, SequencerHandle)>,
}

impl RoutineEntry {
    fn cancel_active(&mut self) {
        if let Some((branch, handle)) = self.active.take() {
            debug!(routine = %self.routine.name(), %branch, "cancelling active sequencer");
            handle.cancel();
        }
    }
}

/// Snapshot of one routine's registration and execution state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineInfo {
    pub id: Ulid,
    pub name: String,
    pub enabled: bool,
    /// Branch currently executing, if any
    pub executing: Option<Branch>,
}

/// The routine automation engine
///
/// Fact producers apply changes to the [`FactStore`]; the engine's run loop
/// picks them up from the bus, snapshots the store, evaluates every enabled
/// routine, and closes the evaluation epoch.
pub struct Engine {
    bus: Arc<FactBus>,
    store: Arc<FactStore>,
    sink: Arc<dyn CommandSink>,
    astro: Arc<dyn AstroSource + Send + Sync>,
    catalog: Option<Arc<dyn DeviceCatalog>>,
    evaluator: Evaluator,
    routines: DashMap<Ulid, RoutineEntry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        astro: Arc<dyn AstroSource + Send + Sync>,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(FactBus::with_capacity(config.channel_capacity));
        let store = Arc::new(FactStore::new(bus.clone()));
        Self {
            bus,
            store,
            sink,
            astro,
            catalog: None,
            evaluator: Evaluator::new(),
            routines: DashMap::new(),
            config,
        }
    }

    /// Attach a device catalog; registration then verifies every device,
    /// property, command, and parameter reference against it
    pub fn with_catalog(mut self, catalog: Arc<dyn DeviceCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The store fact producers should apply changes to
    pub fn store(&self) -> Arc<FactStore> {
        self.store.clone()
    }

    /// The bus carrying fact changes
    pub fn bus(&self) -> Arc<FactBus> {
        self.bus.clone()
    }

    /// Register a routine, compiling its definition
    ///
    /// With a catalog attached, unresolvable references reject the routine
    /// the same way structural violations do.
    pub fn add_routine(&self, config: RoutineConfig) -> Result<Ulid, RoutineError> {
        let routine = match &self.catalog {
            Some(catalog) => Routine::compile_checked(config, catalog.as_ref())?,
            None => Routine::compile(config)?,
        };
        let id = routine.id();
        info!(routine = %routine.name(), %id, "routine registered");
        self.routines.insert(
            id,
            RoutineEntry {
                routine,
                last_result: None,
                active: None,
            },
        );
        Ok(id)
    }

    /// Remove a routine, cancelling any in-flight execution
    pub fn remove_routine(&self, id: Ulid) -> bool {
        match self.routines.remove(&id) {
            Some((_, mut entry)) => {
                entry.cancel_active();
                info!(routine = %entry.routine.name(), %id, "routine removed");
                true
            }
            None => false,
        }
    }

    /// Enable or disable a routine; disabling cancels any in-flight
    /// execution and forgets the previous trigger result
    pub fn set_enabled(&self, id: Ulid, enabled: bool) -> bool {
        let Some(mut entry) = self.routines.get_mut(&id) else {
            return false;
        };
        if !enabled {
            entry.cancel_active();
            entry.last_result = None;
        }
        entry.routine.set_enabled(enabled);
        true
    }

    pub fn routine_ids(&self) -> Vec<Ulid> {
        self.routines.iter().map(|e| *e.key()).collect()
    }

    /// Lightweight view of one registered routine
    pub fn routine_info(&self, id: Ulid) -> Option<RoutineInfo> {
        self.routines.get(&id).map(|entry| RoutineInfo {
            id,
            name: entry.routine.name().to_string(),
            enabled: entry.routine.enabled(),
            executing: entry
                .active
                .as_ref()
                .filter(|(_, handle)| !handle.is_finished())
                .map(|(branch, _)| *branch),
        })
    }

    /// Evaluate every enabled routine against one snapshot, then close the
    /// epoch
    ///
    /// This is the engine's unit of progress; the run loop calls it once per
    /// fact change.
    pub fn evaluate_epoch(&self, snapshot: &FactSnapshot) {
        for mut entry in self.routines.iter_mut() {
            if !entry.routine.enabled() {
                continue;
            }
            self.evaluate_routine(&mut entry, snapshot);
        }
        self.store.end_epoch();
    }

    fn evaluate_routine(&self, entry: &mut RoutineEntry, snapshot: &FactSnapshot) {
        let evaluation = self
            .evaluator
            .evaluate(entry.routine.ast(), snapshot, self.astro.as_ref());
        let result = evaluation.result;
        let previous = entry.last_result.replace(result);

        trace!(
            routine = %entry.routine.name(),
            result,
            ?previous,
            matched = ?evaluation.matched,
            "trigger evaluated"
        );

        // A flip away from the executing branch aborts it, waits and
        // repeats included; dispatched commands stand
        if let Some((branch, handle)) = &entry.active {
            let branch_holds = match branch {
                Branch::Then => result,
                Branch::Else => !result,
            };
            if !branch_holds {
                entry.cancel_active();
            } else if handle.is_finished() {
                entry.active = None;
            }
        }

        let fired = match (previous, result) {
            // Rising edge
            (None | Some(false), true) => Some(Branch::Then),
            // Falling edge; a first evaluation of false is not a fall
            (Some(true), false) => Some(Branch::Else),
            _ => None,
        };

        let Some(branch) = fired else {
            return;
        };

        // Clone up front: cancelling below needs the entry mutably
        let program = entry.routine.program(branch).clone();
        if program.is_empty() {
            return;
        }

        // Re-trigger while running restarts: the old execution is cancelled
        // before the new one starts
        entry.cancel_active();

        debug!(routine = %entry.routine.name(), %branch, "trigger fired");
        let handle = script::spawn(
            program,
            self.sink.clone(),
            entry.routine.name().to_string(),
        );
        entry.active = Some((branch, handle));
    }

    /// Run the evaluation loop until the bus closes
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe_all();
        tokio::spawn(async move {
            info!("routine engine started");
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        trace!(class = ?change.class(), "fact change received");
                        let snapshot = self.store.snapshot(Local::now());
                        self.evaluate_epoch(&snapshot);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // At-least-once: the next change re-evaluates from
                        // current values, so nothing is lost but promptness
                        warn!(missed, "fact bus lagged");
                    }
                    Err(RecvError::Closed) => {
                        info!("fact bus closed; routine engine stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Publish a clock tick every configured interval, so schedule
    /// boundaries fire without device traffic
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.config.tick_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.apply(FactChange::Tick { at: Local::now() });
            }
        })
    }
}

//! Action sequencer
//!
//! Runs one compiled [`Program`] on a tokio task. Steps execute in strict
//! array order; the only suspension points are waits and the sleep between
//! periodic iterations, and both abort immediately on cancellation. Command
//! dispatch is fire-and-forget: a sink failure is logged against the action
//! index and the sequencer moves on.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use routine_core::CommandSink;

use crate::action::{Program, RepeatKind, Scope, Step};

/// Lifecycle of one program execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Spawned, not yet running its first step
    Idle,
    /// Executing the lead sequence
    Running,
    /// Suspended in a wait step
    Waiting,
    /// Inside a repeat scope
    Repeating,
    /// Ran every step to the end
    Completed,
    /// Aborted mid-program
    Cancelled,
}

impl SequencerState {
    /// Whether the sequencer has stopped for good
    pub fn is_terminal(self) -> bool {
        matches!(self, SequencerState::Completed | SequencerState::Cancelled)
    }
}

/// Handle to a running sequencer
///
/// Dropping the handle does not stop the task; call [`cancel`] to abort it.
///
/// [`cancel`]: SequencerHandle::cancel
pub struct SequencerHandle {
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SequencerState>,
    task: JoinHandle<()>,
}

impl SequencerHandle {
    /// Abort the execution at its next suspension point (or between steps)
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        *self.state_rx.borrow()
    }

    /// Whether the execution has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SequencerState> {
        self.state_rx.clone()
    }

    /// Wait for the execution to reach a terminal state
    pub async fn finished(&self) -> SequencerState {
        let mut rx = self.state_rx.clone();
        // wait_for returns Err only if the sender side is gone, in which
        // case the last observed state stands. Copy out of the watch ref
        // before rx drops.
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => *self.state_rx.borrow(),
        };
        state
    }

    /// Abort the underlying task outright; prefer [`cancel`]
    ///
    /// [`cancel`]: SequencerHandle::cancel
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Spawn a sequencer task for a program
///
/// `label` names the owning routine in log output.
pub fn spawn(program: Program, sink: Arc<dyn CommandSink>, label: String) -> SequencerHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(SequencerState::Idle);

    let task = tokio::spawn(async move {
        let mut run = Run {
            sink,
            label,
            cancel: cancel_rx,
            state: state_tx,
        };
        match run.execute(&program).await {
            Ok(()) => {
                debug!(routine = %run.label, "program completed");
                let _ = run.state.send(SequencerState::Completed);
            }
            Err(Interrupted) => {
                debug!(routine = %run.label, "program cancelled");
                let _ = run.state.send(SequencerState::Cancelled);
            }
        }
    });

    SequencerHandle {
        cancel_tx,
        state_rx,
        task,
    }
}

/// Marker error: the run was cancelled mid-flight
struct Interrupted;

struct Run {
    sink: Arc<dyn CommandSink>,
    label: String,
    cancel: watch::Receiver<bool>,
    state: watch::Sender<SequencerState>,
}

impl Run {
    async fn execute(&mut self, program: &Program) -> Result<(), Interrupted> {
        let _ = self.state.send(SequencerState::Running);
        self.run_steps(&program.lead, SequencerState::Running)
            .await?;

        for scope in &program.scopes {
            let _ = self.state.send(SequencerState::Repeating);
            self.run_scope(scope).await?;
        }

        Ok(())
    }

    async fn run_scope(&mut self, scope: &Scope) -> Result<(), Interrupted> {
        match scope.kind {
            RepeatKind::For { count, random } => {
                let iterations = if random {
                    rand::thread_rng().gen_range(0..=count)
                } else {
                    count
                };
                trace!(routine = %self.label, iterations, "bounded repeat");
                for _ in 0..iterations {
                    self.run_steps(&scope.steps, SequencerState::Repeating)
                        .await?;
                }
                Ok(())
            }
            RepeatKind::Every { period } => loop {
                self.run_steps(&scope.steps, SequencerState::Repeating)
                    .await?;
                self.sleep(period).await?;
            },
        }
    }

    async fn run_steps(
        &mut self,
        steps: &[Step],
        resume: SequencerState,
    ) -> Result<(), Interrupted> {
        for step in steps {
            self.check_cancelled()?;
            match step {
                Step::Command { index, call } => {
                    trace!(
                        routine = %self.label,
                        index,
                        device = %call.device,
                        command = %call.command,
                        "dispatching command"
                    );
                    if let Err(err) = self.sink.dispatch(call.clone()).await {
                        // Failures are the sink's problem to retry; the
                        // program keeps going
                        warn!(
                            routine = %self.label,
                            index,
                            device = %call.device,
                            command = %call.command,
                            %err,
                            "command dispatch failed"
                        );
                    }
                }
                Step::Wait { duration, random } => {
                    let secs = if *random {
                        rand::thread_rng().gen_range(0.0..=*duration)
                    } else {
                        *duration
                    };
                    let _ = self.state.send(SequencerState::Waiting);
                    self.sleep(Duration::from_secs_f64(secs)).await?;
                    let _ = self.state.send(resume);
                }
            }
        }
        Ok(())
    }

    /// Sleep, aborting the moment a cancellation arrives
    async fn sleep(&mut self, duration: Duration) -> Result<(), Interrupted> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            result = self.cancel.wait_for(|cancelled| *cancelled) => match result {
                Ok(_) => Err(Interrupted),
                // Sender dropped without cancelling: keep sleeping? No
                // handle remains to observe us, so stop cleanly instead
                Err(_) => Err(Interrupted),
            },
        }
    }

    fn check_cancelled(&self) -> Result<(), Interrupted> {
        if *self.cancel.borrow() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

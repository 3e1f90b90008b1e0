//! Action program model
//!
//! A routine branch is a flat, ordered array of action tokens: device
//! commands, timed waits, and repeat markers. A repeat marker governs every
//! token after it, up to the next marker or the end of the array; scopes
//! never nest. [`Program::compile`] validates the array and segments it into
//! a lead sequence plus repeat scopes, which is the form the sequencer runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use routine_core::{CommandCall, Parameter};

/// Structural violations in an action array, found at compile time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    /// A wait as the final step of the program would never be observed
    #[error("wait at index {0} is the last step of the program")]
    TrailingWait(usize),

    /// A repeat marker with nothing after it governs no actions
    #[error("repeat marker at index {0} opens an empty scope")]
    EmptyScope(usize),

    /// Tokens after a periodic scope can never run
    #[error("token at index {0} is unreachable after a periodic repeat")]
    UnreachableAfterEvery(usize),

    /// A bounded repeat must run at least one iteration
    #[error("repeat marker at index {0} has a zero count")]
    ZeroCount(usize),

    /// A periodic repeat must have a positive period
    #[error("repeat marker at index {0} has a zero period")]
    ZeroPeriod(usize),

    /// Wait durations must be finite and non-negative
    #[error("wait at index {0} has an invalid duration")]
    InvalidDuration(usize),
}

/// Period of a periodic repeat, in clock components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Period {
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub seconds: u32,
}

impl Period {
    pub fn to_duration(self) -> Duration {
        Duration::from_secs(
            u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds),
        )
    }

    pub fn is_zero(self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

/// One token of an action array, as it appears in routine payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionToken {
    /// Dispatch a device command; never suspends the sequencer
    Command {
        device: String,
        command: String,
        #[serde(default)]
        parameters: Vec<Parameter>,
    },

    /// Suspend for `duration` seconds, or uniformly from [0, duration] if
    /// `random`
    Wait {
        duration: f64,
        #[serde(default)]
        random: bool,
    },

    /// Open a bounded repeat scope: `count` iterations, or uniformly from
    /// [0, count] if `random`
    For {
        count: u32,
        #[serde(default)]
        random: bool,
    },

    /// Open a periodic repeat scope: run, sleep the period, run again, until
    /// cancelled
    Every {
        #[serde(flatten)]
        period: Period,
    },
}

impl ActionToken {
    fn is_marker(&self) -> bool {
        matches!(self, ActionToken::For { .. } | ActionToken::Every { .. })
    }
}

/// A command or wait, ready to run
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Command {
        /// Index of the source token, for failure reporting
        index: usize,
        call: CommandCall,
    },
    Wait {
        duration: f64,
        random: bool,
    },
}

/// How a repeat scope iterates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepeatKind {
    /// Fixed (or uniformly drawn) iteration count
    For { count: u32, random: bool },

    /// Indefinite, with a sleep of `period` between iterations
    Every { period: Duration },
}

/// The run of steps governed by one repeat marker
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub kind: RepeatKind,
    pub steps: Vec<Step>,
}

/// A validated, segmented action program
///
/// `lead` runs once, then each scope in order. Only the final scope can be
/// periodic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub lead: Vec<Step>,
    pub scopes: Vec<Scope>,
}

impl Program {
    /// Validate an action array and segment it for execution
    pub fn compile(tokens: &[ActionToken]) -> Result<Program, ProgramError> {
        validate(tokens)?;

        let mut program = Program::default();
        let mut current_scope: Option<Scope> = None;

        for (index, token) in tokens.iter().enumerate() {
            match token {
                ActionToken::Command {
                    device,
                    command,
                    parameters,
                } => {
                    let step = Step::Command {
                        index,
                        call: CommandCall {
                            device: device.clone(),
                            command: command.clone(),
                            parameters: parameters.clone(),
                        },
                    };
                    match &mut current_scope {
                        Some(scope) => scope.steps.push(step),
                        None => program.lead.push(step),
                    }
                }
                ActionToken::Wait { duration, random } => {
                    let step = Step::Wait {
                        duration: *duration,
                        random: *random,
                    };
                    match &mut current_scope {
                        Some(scope) => scope.steps.push(step),
                        None => program.lead.push(step),
                    }
                }
                ActionToken::For { count, random } => {
                    if let Some(scope) = current_scope.take() {
                        program.scopes.push(scope);
                    }
                    current_scope = Some(Scope {
                        kind: RepeatKind::For {
                            count: *count,
                            random: *random,
                        },
                        steps: Vec::new(),
                    });
                }
                ActionToken::Every { period } => {
                    if let Some(scope) = current_scope.take() {
                        program.scopes.push(scope);
                    }
                    current_scope = Some(Scope {
                        kind: RepeatKind::Every {
                            period: period.to_duration(),
                        },
                        steps: Vec::new(),
                    });
                }
            }
        }

        if let Some(scope) = current_scope {
            program.scopes.push(scope);
        }

        Ok(program)
    }

    /// Whether the program has nothing to run
    pub fn is_empty(&self) -> bool {
        self.lead.is_empty() && self.scopes.is_empty()
    }

    /// Whether the program ends in a periodic scope and so never completes
    /// on its own
    pub fn is_indefinite(&self) -> bool {
        matches!(
            self.scopes.last(),
            Some(Scope {
                kind: RepeatKind::Every { .. },
                ..
            })
        )
    }
}

fn validate(tokens: &[ActionToken]) -> Result<(), ProgramError> {
    let mut in_every = false;
    let mut open_marker: Option<usize> = None;

    for (index, token) in tokens.iter().enumerate() {
        if in_every {
            // An Every scope runs until cancelled; nothing after a second
            // marker could ever execute
            if token.is_marker() {
                return Err(ProgramError::UnreachableAfterEvery(index));
            }
        }

        match token {
            ActionToken::Wait { duration, .. } => {
                if !duration.is_finite() || *duration < 0.0 {
                    return Err(ProgramError::InvalidDuration(index));
                }
                // A trailing wait outside any scope delays nothing; inside a
                // scope it spaces iterations and stays legal
                if index == tokens.len() - 1 && open_marker.is_none() {
                    return Err(ProgramError::TrailingWait(index));
                }
            }
            ActionToken::For { count, .. } => {
                check_scope_nonempty(index, open_marker)?;
                if *count == 0 {
                    return Err(ProgramError::ZeroCount(index));
                }
                open_marker = Some(index);
            }
            ActionToken::Every { period } => {
                check_scope_nonempty(index, open_marker)?;
                if period.is_zero() {
                    return Err(ProgramError::ZeroPeriod(index));
                }
                open_marker = Some(index);
                in_every = true;
            }
            ActionToken::Command { .. } => {}
        }
    }

    // The last marker in the array must also govern something
    if let Some(marker) = open_marker {
        if marker == tokens.len() - 1 {
            return Err(ProgramError::EmptyScope(marker));
        }
    }

    Ok(())
}

fn check_scope_nonempty(index: usize, open_marker: Option<usize>) -> Result<(), ProgramError> {
    // A marker directly after another marker closes an empty scope
    if let Some(prior) = open_marker {
        if prior + 1 == index {
            return Err(ProgramError::EmptyScope(prior));
        }
    }
    Ok(())
}

//! Routine definitions
//!
//! A routine couples a trigger expression with a then-program and an
//! else-program. Definitions arrive as immutable payloads from an external
//! authoring flow; compilation happens once per definition version and a
//! rejected definition is never scheduled.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use routine_core::{DeviceCatalog, ReferenceError};
use routine_expr::{check_references, compile, Ast, CompileError, ExprToken};
use routine_script::{ActionToken, Program, ProgramError};

/// Why a routine definition was rejected
#[derive(Debug, Error)]
pub enum RoutineError {
    /// Malformed trigger expression
    #[error("trigger expression: {0}")]
    Expression(#[from] CompileError),

    /// Malformed action program
    #[error("{branch} program: {source}")]
    Program {
        branch: Branch,
        source: ProgramError,
    },

    /// A device, property, or command reference does not resolve
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Which action program a trigger result selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Then,
    Else,
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Branch::Then => "then",
            Branch::Else => "else",
        })
    }
}

fn default_enabled() -> bool {
    true
}

/// A routine definition, as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineConfig {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Folder this routine lives in, for organization only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Trigger expression token array
    #[serde(rename = "if")]
    pub if_expr: Vec<ExprToken>,

    /// Program to run when the trigger becomes true
    #[serde(default)]
    pub then: Vec<ActionToken>,

    /// Program to run when the trigger becomes false
    #[serde(default, rename = "else")]
    pub else_: Vec<ActionToken>,
}

/// A compiled routine, ready for the runtime
///
/// The AST and programs are derived from the config exactly once, here.
pub struct Routine {
    id: Ulid,
    config: RoutineConfig,
    ast: Ast,
    then_program: Program,
    else_program: Program,
}

impl Routine {
    /// Compile a definition, rejecting structural violations
    pub fn compile(config: RoutineConfig) -> Result<Self, RoutineError> {
        let ast = compile(&config.if_expr)?;
        let then_program = Program::compile(&config.then).map_err(|source| {
            RoutineError::Program {
                branch: Branch::Then,
                source,
            }
        })?;
        let else_program = Program::compile(&config.else_).map_err(|source| {
            RoutineError::Program {
                branch: Branch::Else,
                source,
            }
        })?;

        Ok(Self {
            id: Ulid::new(),
            config,
            ast,
            then_program,
            else_program,
        })
    }

    /// Compile a definition and verify every device reference against a
    /// catalog
    pub fn compile_checked(
        config: RoutineConfig,
        catalog: &dyn DeviceCatalog,
    ) -> Result<Self, RoutineError> {
        check_references(&config.if_expr, catalog)?;
        check_action_references(&config.then, catalog)?;
        check_action_references(&config.else_, catalog)?;
        Self::compile(config)
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flip the enabled flag without recompiling
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn config(&self) -> &RoutineConfig {
        &self.config
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// The compiled program for one branch
    pub fn program(&self, branch: Branch) -> &Program {
        match branch {
            Branch::Then => &self.then_program,
            Branch::Else => &self.else_program,
        }
    }
}

/// Verify every command reference in an action array against a catalog
fn check_action_references(
    tokens: &[ActionToken],
    catalog: &dyn DeviceCatalog,
) -> Result<(), ReferenceError> {
    for token in tokens {
        if let ActionToken::Command {
            device,
            command,
            parameters,
        } = token
        {
            if !catalog.has_device(device) {
                return Err(ReferenceError::UnknownDevice(device.clone()));
            }
            let def = catalog.command(device, command).ok_or_else(|| {
                ReferenceError::UnknownCommand {
                    device: device.clone(),
                    command: command.clone(),
                }
            })?;
            for param in parameters {
                def.param(&param.id)
                    .ok_or_else(|| ReferenceError::UnknownParameter {
                        device: device.clone(),
                        command: command.clone(),
                        param: param.id.clone(),
                    })?;
            }
        }
    }
    Ok(())
}

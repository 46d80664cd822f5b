//! Deferred bind commands: collected while converting, renumbered per bind
//! point and written after every other command.

pub mod collector;
pub mod reprioritize;

use ns_config_core::{ArgRef, CommandTree};

use crate::policy::PolicyKind;

pub use collector::BindCollector;
pub use reprioritize::{reprioritize, PRIORITY_STEP};

/// Where a bind sits relative to the existing advanced binds of its bind
/// point. Renumbering happens within each position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Before,
    Inplace,
    After,
}

impl Position {
    fn index(self) -> usize {
        match self {
            Position::Before => 0,
            Position::Inplace => 1,
            Position::After => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Request,
    Response,
}

impl FlowDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowDirection::Request => "REQUEST",
            FlowDirection::Response => "RESPONSE",
        }
    }

    /// Prefix of the global bind type, e.g. `REQ` in `REQ_DEFAULT`.
    pub fn global_prefix(self) -> &'static str {
        match self {
            FlowDirection::Request => "REQ",
            FlowDirection::Response => "RES",
        }
    }
}

/// Per-module defaults applied to binds that do not spell them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindDefaults {
    /// Written when the bind has no goto.
    pub goto: Option<&'static str>,
    /// Bind type added to classic policy binds on emission.
    pub flow: Option<FlowDirection>,
}

impl Default for BindDefaults {
    fn default() -> Self {
        Self {
            goto: Some("END"),
            flow: Some(FlowDirection::Request),
        }
    }
}

/// Which arguments of a bind hold the priority and the goto expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSlots {
    pub priority: ArgRef,
    pub goto: ArgRef,
}

impl BindSlots {
    /// `-priority` and `-gotoPriorityExpression`.
    pub fn keywords() -> Self {
        Self {
            priority: ArgRef::keyword("priority"),
            goto: ArgRef::keyword("gotoPriorityExpression"),
        }
    }

    /// Positional priority and goto, as in `bind rewrite global p 10 END`.
    pub fn positional(priority: usize, goto: usize) -> Self {
        Self {
            priority: ArgRef::Positional(priority),
            goto: ArgRef::Positional(goto),
        }
    }
}

/// A bind waiting for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindInfo {
    pub original_line: String,
    pub tree: CommandTree,
    pub position: Position,
    pub priority: u32,
    pub goto: Option<String>,
    pub slots: BindSlots,
    pub policy_kind: Option<PolicyKind>,
    pub flow: Option<FlowDirection>,
}

/// Normalize a bind `-type` value to its flow: `REQ_DEFAULT` → `REQUEST`.
pub fn normalize_bind_type(value: &str) -> String {
    match value.to_ascii_uppercase().as_str() {
        "REQ_DEFAULT" | "REQ_OVERRIDE" => "REQUEST".to_string(),
        "RES_DEFAULT" | "RES_OVERRIDE" => "RESPONSE".to_string(),
        other => other.to_string(),
    }
}

//! Typed metadata records for modules, signals and nodes
//!
//! Each instrumentation stage leaves its marks here instead of in free-form
//! attribute bags, so which stage has run on which module is visible from the
//! types alone.

use crate::module::{NodeId, SignalId};
use crate::sigspec::Const;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Stage markers
// ============================================================================

/// Progress of one mutating stage on one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    #[default]
    Pending,
    /// Entered but not finished; left behind when a stage aborts
    Running,
    Done,
}

impl StageState {
    pub fn is_done(self) -> bool {
        self == StageState::Done
    }
}

/// Mutating stages that are idempotent per module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ports,
    Connections,
    Cells,
    Liveness,
    Summary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ports => "ports",
            Stage::Connections => "connections",
            Stage::Cells => "cells",
            Stage::Liveness => "liveness",
            Stage::Summary => "summary",
        };
        write!(f, "{}", name)
    }
}

/// One state per stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageMarkers {
    pub ports: StageState,
    pub connections: StageState,
    pub cells: StageState,
    pub liveness: StageState,
    pub summary: StageState,
}

impl StageMarkers {
    pub fn get(&self, stage: Stage) -> StageState {
        match stage {
            Stage::Ports => self.ports,
            Stage::Connections => self.connections,
            Stage::Cells => self.cells,
            Stage::Liveness => self.liveness,
            Stage::Summary => self.summary,
        }
    }

    pub fn set(&mut self, stage: Stage, state: StageState) {
        let slot = match stage {
            Stage::Ports => &mut self.ports,
            Stage::Connections => &mut self.connections,
            Stage::Cells => &mut self.cells,
            Stage::Liveness => &mut self.liveness,
            Stage::Summary => &mut self.summary,
        };
        *slot = state;
    }
}

/// Module-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleMeta {
    pub stages: StageMarkers,
    /// Excluded from every instrumentation and summary stage
    pub ignore: bool,
    /// Keep-pin IP block: accepts no taint in and emits none
    pub opaque: bool,
    /// Storage-array liveness annotation (`queue,...` / `bitmap,...`)
    pub liveness: Option<String>,
    pub src: Option<String>,
}

// ============================================================================
// Signal metadata
// ============================================================================

/// What a signal carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalRole {
    /// Original design signal
    #[default]
    Data,
    /// Taint companion of `of` for one channel
    Shadow { of: SignalId, channel: u32 },
    /// Coverage / summary tap
    Observability,
    /// Liveness operand port added to a storage wrapper
    LivenessOperand,
}

/// Liveness encoding of a storage array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LivenessKind {
    /// Circular buffer described by enqueue/dequeue pointers and a full flag
    Queue,
    /// One valid bit per entry
    Bitmap,
}

impl LivenessKind {
    /// Number of operand signals the encoding needs
    pub fn operand_count(self) -> usize {
        match self {
            LivenessKind::Queue => 3,
            LivenessKind::Bitmap => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LivenessKind::Queue => "queue",
            LivenessKind::Bitmap => "bitmap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queue" => Some(LivenessKind::Queue),
            "bitmap" => Some(LivenessKind::Bitmap),
            _ => None,
        }
    }
}

impl fmt::Display for LivenessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node-local liveness information; operands are signal names in the owning
/// module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessDescriptor {
    pub kind: LivenessKind,
    pub operands: Vec<String>,
}

impl LivenessDescriptor {
    pub fn queue(enq: &str, deq: &str, full: &str) -> Self {
        Self {
            kind: LivenessKind::Queue,
            operands: vec![enq.to_string(), deq.to_string(), full.to_string()],
        }
    }

    pub fn bitmap(valid: &str) -> Self {
        Self {
            kind: LivenessKind::Bitmap,
            operands: vec![valid.to_string()],
        }
    }
}

/// Signal-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalMeta {
    pub role: SignalRole,
    /// Must survive optimisation
    pub keep: bool,
    /// Liveness of the register driving this signal
    pub liveness: Option<LivenessDescriptor>,
    /// Storage-array annotation carried by a sentinel signal
    pub annotation: Option<String>,
    pub src: Option<String>,
}

impl SignalMeta {
    pub fn is_shadow(&self) -> bool {
        matches!(self.role, SignalRole::Shadow { .. })
    }
}

// ============================================================================
// Node metadata
// ============================================================================

/// Outcome of control-register classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterClass {
    /// Reaches a multiplexer select
    Control,
    /// Reaches only data sinks
    Data,
}

/// Node-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMeta {
    /// Original node a taint node mirrors
    pub mirrors: Option<NodeId>,
    /// Taint channel of a taint node
    pub channel: Option<u32>,
    /// Observability endpoint
    pub sink: bool,
    pub class: Option<RegisterClass>,
    pub keep: bool,
    pub liveness: Option<LivenessDescriptor>,
    pub src: Option<String>,
}

// ============================================================================
// Parameters
// ============================================================================

/// Node parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Bits(Const),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Bool(b) => Some(*b as i64),
            ParamValue::Bits(c) => Some(c.as_u64() as i64),
            ParamValue::Str(_) => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            ParamValue::Bool(b) => *b,
            ParamValue::Int(v) => *v != 0,
            ParamValue::Bits(c) => !c.is_zero(),
            ParamValue::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

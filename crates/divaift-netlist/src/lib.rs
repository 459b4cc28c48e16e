//! DivaIFT netlist IR
//!
//! Hierarchical word-level netlist consumed and mutated by the information-flow
//! tracking passes:
//! - Modules with ordered ports, internal signals, nodes and assignments
//! - Signal references as concatenations of slices and constants
//! - Typed metadata records for per-stage bookkeeping
//! - JSON persistence

pub mod cell_types;
pub mod design;
pub mod error;
pub mod meta;
pub mod module;
pub mod sigspec;

pub use cell_types::{classify_primitive, PrimitiveClass, TaintCellKind};
pub use design::{Design, DesignStats};
pub use error::{NetlistError, Result};
pub use meta::{
    LivenessDescriptor, LivenessKind, ModuleMeta, NodeMeta, ParamValue, RegisterClass,
    SignalMeta, SignalRole, Stage, StageMarkers, StageState,
};
pub use module::{Assign, Module, Node, NodeId, PortDirection, Signal, SignalId};
pub use sigspec::{Const, SigBit, SigChunk, SigSpec};

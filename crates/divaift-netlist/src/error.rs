//! Error types for netlist construction and persistence

use thiserror::Error;

/// Result type for netlist operations
pub type Result<T> = std::result::Result<T, NetlistError>;

/// Errors raised by the netlist IR
#[derive(Debug, Error)]
pub enum NetlistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse netlist: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Module '{0}' defined twice")]
    DuplicateModule(String),

    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    #[error("Signal '{signal}' already exists in module '{module}'")]
    DuplicateSignal { module: String, signal: String },

    #[error("Node '{node}' already exists in module '{module}'")]
    DuplicateNode { module: String, node: String },

    #[error("Width mismatch in module '{module}': {lhs} bits assigned from {rhs} bits")]
    WidthMismatch { module: String, lhs: u32, rhs: u32 },

    #[error("Invalid netlist in module '{module}': {reason}")]
    InvalidReference { module: String, reason: String },

    #[error("No top module: {0}")]
    NoTopModule(String),

    #[error("Recursive instantiation through module '{0}'")]
    RecursiveInstantiation(String),
}

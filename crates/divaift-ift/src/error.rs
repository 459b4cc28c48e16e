//! Error types for the instrumentation passes
//!
//! Every variant is fatal: the pass aborts and the netlist must not be used.

use divaift_netlist::NetlistError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IftError>;

#[derive(Debug, Error)]
pub enum IftError {
    #[error("Netlist error: {0}")]
    Netlist(#[from] NetlistError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signal '{signal}' not found in module '{module}'")]
    SignalNotFound { module: String, signal: String },

    #[error("Instance '{instance}' not found in module '{module}'")]
    InstanceNotFound { module: String, instance: String },

    #[error("Module '{module}' for instance '{instance}' not found")]
    InstanceModuleNotFound { instance: String, module: String },

    #[error("Parameter '{param}' missing on node '{node}' in module '{module}'")]
    ParamNotFound {
        module: String,
        node: String,
        param: String,
    },

    #[error("Unrecognized cell type '{cell_type}' on node '{node}' in module '{module}'")]
    UnknownCellType {
        module: String,
        node: String,
        cell_type: String,
    },

    #[error("Invalid liveness annotation '{annotation}': {reason}")]
    MalformedAnnotation { annotation: String, reason: String },

    #[error("No storage array found in module '{0}'")]
    NoStorageArray(String),

    #[error("Sink module '{module}' at {path} has no taint_sink_sum; reduce with split sinks first")]
    SinkSumMissing { module: String, path: String },

    #[error("Invalid sink designation file, line {line}: {reason}")]
    MalformedSinkList { line: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for IftError {
    fn from(err: toml::de::Error) -> Self {
        IftError::Config(err.to_string())
    }
}

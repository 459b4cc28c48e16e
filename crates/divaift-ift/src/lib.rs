//! DivaIFT information-flow tracking passes
//!
//! This crate handles:
//! - Shadow-taint instrumentation of ports, assignments and cells
//! - Control/data register classification
//! - Liveness annotation of storage arrays
//! - Taint summary and coverage-hash reduction
//! - Sink location and harness command generation

pub mod config;
pub mod ctrlreg;
pub mod error;
pub mod hook;
pub mod instrument;
pub mod keep;
pub mod liveness;
pub mod passes;
pub mod shadow;
pub mod sinks;
pub mod summary;
pub mod vec_anno;

pub use config::IftConfig;
pub use ctrlreg::{classify_module, ModuleClassification, RegisterClassifier};
pub use error::{IftError, Result};
pub use hook::RuleHook;
pub use instrument::Instrumenter;
pub use keep::KeepQueueSignals;
pub use liveness::{LivenessAnnotation, LivenessAnnotator};
pub use passes::{run_passes, Pass, PassResult};
pub use shadow::{shadow_name, IgnoreList, ShadowAllocator};
pub use sinks::{write_harness_commands, SinkLocator, SinkQuery};
pub use summary::{hash_width, SummaryMode, SummaryReducer};
pub use vec_anno::SinkDesignations;

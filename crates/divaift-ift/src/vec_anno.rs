//! Sink designation lists
//!
//! Plain text, one module name per line followed by the registers of that
//! module that are observability sinks, each prefixed with `@`:
//!
//! ```text
//! # comment
//! Rob
//! @robEntries_valid
//! @commit_ptr
//! LoadQueue
//! @allocated
//! ```

use crate::error::{IftError, Result};
use indexmap::{IndexMap, IndexSet};
use std::path::Path;
use tracing::debug;

/// Registers designated as sinks, keyed by module
#[derive(Debug, Clone, Default)]
pub struct SinkDesignations {
    modules: IndexMap<String, IndexSet<String>>,
}

impl SinkDesignations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut designations = Self::new();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(register) = line.strip_prefix('@') {
                let register = register.trim();
                let module = current.as_ref().ok_or_else(|| IftError::MalformedSinkList {
                    line: idx + 1,
                    reason: format!("register '{}' before any module name", register),
                })?;
                if register.is_empty() {
                    return Err(IftError::MalformedSinkList {
                        line: idx + 1,
                        reason: "empty register name".to_string(),
                    });
                }
                designations.insert(module, register);
            } else {
                designations.modules.entry(line.to_string()).or_default();
                current = Some(line.to_string());
            }
        }

        debug!(
            "Parsed sink designations: {} modules, {} registers",
            designations.modules.len(),
            designations.len()
        );
        Ok(designations)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn insert(&mut self, module: &str, register: &str) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(register.to_string());
    }

    /// Whether `register` of `module` is a designated sink
    pub fn is_sink(&self, module: &str, register: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|regs| regs.contains(register))
    }

    /// Total designated registers
    pub fn len(&self) -> usize {
        self.modules.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registers(&self, module: &str) -> impl Iterator<Item = &str> {
        self.modules
            .get(module)
            .into_iter()
            .flat_map(|regs| regs.iter().map(String::as_str))
    }
}

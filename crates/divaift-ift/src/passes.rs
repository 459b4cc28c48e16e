//! Pass framework
//!
//! Every instrumentation and analysis stage implements [`Pass`]. A pass mutates
//! the design in place and reports what it did through a [`PassResult`].

use crate::error::Result;
use divaift_netlist::Design;
use std::fmt;
use tracing::info;

/// Result of running one pass over a design
#[derive(Debug, Clone, Default)]
pub struct PassResult {
    /// Name of the pass
    pub pass_name: String,
    /// Signals before the pass
    pub signals_before: usize,
    /// Signals after the pass
    pub signals_after: usize,
    /// Nodes before the pass
    pub nodes_before: usize,
    /// Nodes after the pass
    pub nodes_after: usize,
    /// Modules the pass looked at
    pub modules_visited: usize,
    /// Modules the pass modified
    pub modules_changed: usize,
    /// Whether the pass changed anything
    pub changed: bool,
    /// Additional statistics
    pub extra: Vec<(String, String)>,
}

impl PassResult {
    pub fn new(pass_name: &str) -> Self {
        Self {
            pass_name: pass_name.to_string(),
            ..Default::default()
        }
    }

    /// Record the "before" stats
    pub fn record_before(&mut self, design: &Design) {
        let stats = design.stats();
        self.signals_before = stats.signals;
        self.nodes_before = stats.nodes;
    }

    /// Record the "after" stats
    pub fn record_after(&mut self, design: &Design) {
        let stats = design.stats();
        self.signals_after = stats.signals;
        self.nodes_after = stats.nodes;
        self.changed = self.changed
            || self.modules_changed > 0
            || self.signals_before != self.signals_after
            || self.nodes_before != self.nodes_after;
    }

    pub fn add_extra(&mut self, key: &str, value: impl ToString) {
        self.extra.push((key.to_string(), value.to_string()));
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn signals_added(&self) -> usize {
        self.signals_after.saturating_sub(self.signals_before)
    }

    pub fn nodes_added(&self) -> usize {
        self.nodes_after.saturating_sub(self.nodes_before)
    }
}

impl fmt::Display for PassResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} modules ({} changed), signals {} → {} (+{}), nodes {} → {} (+{})",
            self.pass_name,
            self.modules_visited,
            self.modules_changed,
            self.signals_before,
            self.signals_after,
            self.signals_added(),
            self.nodes_before,
            self.nodes_after,
            self.nodes_added()
        )?;
        for (key, value) in &self.extra {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

/// A stage that transforms or annotates a design
pub trait Pass {
    /// Get the name of this pass
    fn name(&self) -> &str;

    /// Run the pass over the whole design
    fn run(&mut self, design: &mut Design) -> Result<PassResult>;
}

/// Run a sequence of passes, stopping at the first fatal error
pub fn run_passes(design: &mut Design, passes: &mut [Box<dyn Pass>]) -> Result<Vec<PassResult>> {
    let mut results = Vec::with_capacity(passes.len());
    for pass in passes.iter_mut() {
        let result = pass.run(design)?;
        info!("{}", result);
        results.push(result);
    }
    Ok(results)
}

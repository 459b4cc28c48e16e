//! Sink location
//!
//! Two hierarchy walks from a root module:
//!
//! - [`SinkLocator::handshake_sinks`]: instance paths of modules exposing a
//!   handshake-style port whose subtree contains a memory array.
//! - [`SinkLocator::flagged_sinks`]: instance paths of modules holding a node
//!   flagged as sink, which [`write_harness_commands`] turns into harness
//!   `setSignal` commands.
//!
//! Both walks use an explicit stack; per-module facts are computed once per
//! module in bottom-up order, however often the module is instantiated.

use crate::config::{SinkConfig, DEFAULT_HARNESS_PREFIX, DEFAULT_RESET_DOMAIN, DEFAULT_ROOT_PATH};
use crate::error::{IftError, Result};
use crate::passes::{Pass, PassResult};
use crate::summary::TAINT_SINK_SUM;
use divaift_netlist::cell_types::is_memory;
use divaift_netlist::{Design, Module};
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, info};

/// Which walk a [`SinkLocator`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkQuery {
    Handshake,
    Flagged,
}

/// `find-sinks` / `tsink` analysis
#[derive(Debug, Clone)]
pub struct SinkLocator {
    query: SinkQuery,
    top: Option<String>,
    root_path: Option<String>,
    reset_domain: String,
    handshake_suffixes: Vec<String>,
    paths: Vec<String>,
}

impl SinkLocator {
    pub fn new(query: SinkQuery) -> Self {
        Self {
            query,
            top: None,
            root_path: None,
            reset_domain: DEFAULT_RESET_DOMAIN.to_string(),
            handshake_suffixes: vec!["_valid".to_string()],
            paths: Vec::new(),
        }
    }

    pub fn from_config(query: SinkQuery, config: &SinkConfig) -> Self {
        let mut locator = Self::new(query);
        locator.top = config.top.clone();
        if query == SinkQuery::Flagged {
            locator.root_path = Some(config.root_path().to_string());
        }
        locator.reset_domain = config.reset_domain().to_string();
        locator.handshake_suffixes = config.handshake_suffixes();
        locator
    }

    pub fn with_top(mut self, top: impl Into<String>) -> Self {
        self.top = Some(top.into());
        self
    }

    /// Path of the root instance; defaults to `/<top>` for handshake sinks and
    /// `/ldut` for flagged sinks
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = Some(root_path.into());
        self
    }

    pub fn with_handshake_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.handshake_suffixes = suffixes;
        self
    }

    pub fn with_reset_domain(mut self, domain: impl Into<String>) -> Self {
        self.reset_domain = domain.into();
        self
    }

    /// Paths found by the last run
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    fn resolve_top(&self, design: &Design) -> Result<String> {
        match &self.top {
            Some(top) => Ok(design.expect_module(top)?.name.clone()),
            None => Ok(design.top_module()?),
        }
    }

    fn root_path_for(&self, top: &str) -> String {
        match (&self.root_path, self.query) {
            (Some(path), _) => path.clone(),
            (None, SinkQuery::Handshake) => format!("/{}", top),
            (None, SinkQuery::Flagged) => DEFAULT_ROOT_PATH.to_string(),
        }
    }

    fn has_handshake_port(&self, module: &Module) -> bool {
        module.port_ids().iter().any(|id| {
            let name = &module.signal(*id).name;
            self.handshake_suffixes.iter().any(|s| name.ends_with(s.as_str()))
        })
    }

    /// Instance paths of modules with a handshake port and a memory array in
    /// their subtree
    pub fn handshake_sinks(&self, design: &Design) -> Result<Vec<String>> {
        let top = self.resolve_top(design)?;
        let order = design.bottom_up_from(std::slice::from_ref(&top))?;

        // Callees come first, so children are always resolved
        let mut has_memory: HashMap<&str, bool> = HashMap::new();
        for name in &order {
            let module = design.expect_module(name)?;
            let found = module.nodes.iter().any(|n| {
                is_memory(&n.cell_type)
                    || has_memory.get(n.cell_type.as_str()).copied().unwrap_or(false)
            });
            has_memory.insert(name.as_str(), found);
        }

        let root = self.root_path_for(&top);
        let instances = self.walk(design, &top, &root, |module, _| {
            has_memory.get(module.name.as_str()).copied().unwrap_or(false)
                && self.has_handshake_port(module)
        })?;
        Ok(instances.into_iter().map(|(path, _)| path).collect())
    }

    /// Instance paths of modules holding a node flagged as sink, filtered to
    /// the configured reset domain
    pub fn flagged_sinks(&self, design: &Design) -> Result<Vec<String>> {
        Ok(self
            .flagged_instances(design)?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    /// Like [`Self::flagged_sinks`], but every selected module must carry the
    /// `taint_sink_sum` accumulator the harness commands point at
    pub fn harness_sinks(&self, design: &Design) -> Result<Vec<String>> {
        let instances = self.flagged_instances(design)?;
        for (path, name) in &instances {
            let module = design.expect_module(name)?;
            if module.find_signal(TAINT_SINK_SUM).is_none() {
                return Err(IftError::SinkSumMissing {
                    module: name.clone(),
                    path: path.clone(),
                });
            }
        }
        Ok(instances.into_iter().map(|(path, _)| path).collect())
    }

    fn flagged_instances(&self, design: &Design) -> Result<Vec<(String, String)>> {
        let top = self.resolve_top(design)?;
        let root = self.root_path_for(&top);
        let instances = self.walk(design, &top, &root, |module, design| {
            module
                .nodes
                .iter()
                .any(|n| !design.contains(&n.cell_type) && n.meta.sink)
        })?;
        Ok(instances
            .into_iter()
            .filter(|(path, _)| path.contains(self.reset_domain.as_str()))
            .collect())
    }

    /// Preorder walk over instance paths, collecting `(path, module)` for
    /// every instance whose module satisfies `select`
    fn walk<F>(
        &self,
        design: &Design,
        top: &str,
        root: &str,
        select: F,
    ) -> Result<Vec<(String, String)>>
    where
        F: Fn(&Module, &Design) -> bool,
    {
        let mut selected = Vec::new();
        let mut stack = vec![(top.to_string(), root.to_string())];

        while let Some((name, path)) = stack.pop() {
            let module = design.expect_module(&name)?;
            if select(module, design) {
                debug!("Found sink module: {}", path);
                selected.push((path.clone(), name.clone()));
            }
            for node in module.nodes.iter().rev() {
                if design.contains(&node.cell_type) {
                    stack.push((node.cell_type.clone(), format!("{}/{}", path, node.name)));
                }
            }
        }
        Ok(selected)
    }
}

impl Pass for SinkLocator {
    fn name(&self) -> &str {
        match self.query {
            SinkQuery::Handshake => "find-sinks",
            SinkQuery::Flagged => "tsink",
        }
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);

        self.paths = match self.query {
            SinkQuery::Handshake => self.handshake_sinks(design)?,
            SinkQuery::Flagged => self.harness_sinks(design)?,
        };
        for path in &self.paths {
            info!("Sink: {}", path);
        }

        result.modules_visited = design.modules.len();
        result.add_extra("sinks", self.paths.len());
        result.record_after(design);
        Ok(result)
    }
}

/// One `setSignal` command per sink path
pub fn write_harness_commands<W: Write>(out: &mut W, prefix: &str, paths: &[String]) -> Result<()> {
    for path in paths {
        writeln!(out, "setSignal {{{}{}/{}}}", prefix, path, TAINT_SINK_SUM)?;
    }
    Ok(())
}

/// [`write_harness_commands`] with the default harness prefix
pub fn write_default_harness_commands<W: Write>(out: &mut W, paths: &[String]) -> Result<()> {
    write_harness_commands(out, DEFAULT_HARNESS_PREFIX, paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_command_format() {
        let mut out = Vec::new();
        let paths = vec!["/ldut/tile_reset_domain/core".to_string()];
        write_default_harness_commands(&mut out, &paths).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "setSignal {/Testbench/testHarness/ldut/tile_reset_domain/core/taint_sink_sum}\n"
        );
    }

    #[test]
    fn test_flagged_sinks_filtered_by_reset_domain() {
        let mut design = Design::new();
        let mut top = Module::new("Harness");
        top.add_node("tile_reset_domain", "Tile").unwrap();
        top.add_node("uncore", "Uncore").unwrap();
        let mut tile = Module::new("Tile");
        let reg = tile.add_node("r_t", "taintcell_dff").unwrap();
        tile.node_mut(reg).meta.sink = true;
        let mut uncore = Module::new("Uncore");
        let reg = uncore.add_node("r_t", "taintcell_dff").unwrap();
        uncore.node_mut(reg).meta.sink = true;
        design.add_module(top).unwrap();
        design.add_module(tile).unwrap();
        design.add_module(uncore).unwrap();

        let locator = SinkLocator::new(SinkQuery::Flagged);
        assert_eq!(
            locator.flagged_sinks(&design).unwrap(),
            vec!["/ldut/tile_reset_domain"]
        );
    }
}

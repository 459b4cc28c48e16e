//! Shadow-taint instrumentation
//!
//! Three stages per module, always in this order:
//!
//! 1. **ports** - one shadow port per boundary signal and channel
//! 2. **connections** - every assignment mirrored onto the shadows
//! 3. **cells** - one taint node per primitive and channel, shadow
//!    connections on every submodule instance
//!
//! Each stage runs at most once per module; the stage markers in the module
//! metadata are authoritative. Instantiating a module forces its ports stage
//! first, so shared and diamond-shaped hierarchies are safe in any visiting
//! order.

mod cells;
mod connections;
mod ports;
pub mod taint_cells;

use crate::error::Result;
use crate::passes::{Pass, PassResult};
use crate::shadow::IgnoreList;
use crate::vec_anno::SinkDesignations;
use divaift_netlist::{Design, Stage, StageState};
use tracing::{debug, info};

/// `pift` pass
#[derive(Debug, Clone)]
pub struct Instrumenter {
    taint_num: u32,
    ignore: IgnoreList,
    sinks: SinkDesignations,
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Instrumenter {
    pub fn new(taint_num: u32) -> Self {
        Self {
            taint_num: taint_num.max(1),
            ignore: IgnoreList::default(),
            sinks: SinkDesignations::default(),
        }
    }

    pub fn with_ignore(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_sinks(mut self, sinks: SinkDesignations) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn taint_num(&self) -> u32 {
        self.taint_num
    }

    pub fn ignore(&self) -> &IgnoreList {
        &self.ignore
    }

    /// Whether `stage` should run on module `name`
    fn stage_pending(design: &Design, name: &str, stage: Stage) -> Result<bool> {
        let module = design.expect_module(name)?;
        if module.meta.ignore {
            debug!("{}: ignored, skipping {}", name, stage);
            return Ok(false);
        }
        Ok(!module.meta.stages.get(stage).is_done())
    }

    fn mark(design: &mut Design, name: &str, stage: Stage, state: StageState) -> Result<()> {
        design
            .expect_module_mut(name)?
            .meta
            .stages
            .set(stage, state);
        Ok(())
    }

    /// Run the ports stage on `name` unless already done; returns whether it
    /// ran.
    pub fn ensure_ports_instrumented(&self, design: &mut Design, name: &str) -> Result<bool> {
        if !Self::stage_pending(design, name, Stage::Ports)? {
            return Ok(false);
        }
        let module = design.expect_module_mut(name)?;
        let added = ports::instrument_ports(module, &self.ignore, self.taint_num);
        module.meta.stages.ports = StageState::Done;
        debug!("{}: {} shadow ports", name, added);
        Ok(true)
    }

    pub fn ensure_connections_instrumented(&self, design: &mut Design, name: &str) -> Result<bool> {
        if !Self::stage_pending(design, name, Stage::Connections)? {
            return Ok(false);
        }
        let module = design.expect_module_mut(name)?;
        let added = connections::instrument_connections(module, &self.ignore, self.taint_num)?;
        module.meta.stages.connections = StageState::Done;
        debug!("{}: {} shadow assignments", name, added);
        Ok(true)
    }

    pub fn ensure_cells_instrumented(&self, design: &mut Design, name: &str) -> Result<bool> {
        if !Self::stage_pending(design, name, Stage::Cells)? {
            return Ok(false);
        }
        Self::mark(design, name, Stage::Cells, StageState::Running)?;
        let created = self.instrument_cells(design, name)?;
        Self::mark(design, name, Stage::Cells, StageState::Done)?;
        debug!("{}: {} taint nodes", name, created);
        Ok(true)
    }

    /// All three stages on one module; returns whether any ran
    pub fn instrument_module(&self, design: &mut Design, name: &str) -> Result<bool> {
        let ports = self.ensure_ports_instrumented(design, name)?;
        let connections = self.ensure_connections_instrumented(design, name)?;
        let cells = self.ensure_cells_instrumented(design, name)?;
        Ok(ports || connections || cells)
    }
}

impl Pass for Instrumenter {
    fn name(&self) -> &str {
        "pift"
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);
        info!(
            "Taint channels: {}, ignored signals: {}",
            self.taint_num,
            self.ignore.names().collect::<Vec<_>>().join(" ")
        );

        for name in design.module_names() {
            info!("Instrument module {}", name);
            result.modules_visited += 1;
            if self.instrument_module(design, &name)? {
                result.modules_changed += 1;
            }
        }

        result.add_extra("channels", self.taint_num);
        result.record_after(design);
        Ok(result)
    }
}

//! Coverage and summary reduction
//!
//! Rolls per-node taint activity up the instance hierarchy. Modules are
//! visited callees first, so every submodule already exposes its own
//! `taint_sum` when its parent is reduced.
//!
//! Two modes share the `summary` stage marker:
//!
//! - [`SummaryMode::Sum`]: every taint register (1 bit), taint memory
//!   (address width) and summarised submodule (32 bits) gets a `keep`
//!   observability signal; the signals are folded through `$add` chains into
//!   `taint_local_sum`, `taint_hier_sum`, optionally `taint_sink_sum`, and the
//!   output port `taint_sum`.
//! - [`SummaryMode::Hash`]: every taint register gets a seeded random
//!   fingerprint; the fingerprints are XOR-folded into one `tainthelp_coverage`
//!   collector per module.

use crate::error::{IftError, Result};
use crate::passes::{Pass, PassResult};
use divaift_netlist::cell_types::COVERAGE_COLLECTOR;
use divaift_netlist::{
    Design, Module, NodeId, PortDirection, SigSpec, SignalId, SignalRole, StageState,
    TaintCellKind,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

pub const TAINT_SUM: &str = "taint_sum";
pub const TAINT_LOCAL_SUM: &str = "taint_local_sum";
pub const TAINT_HIER_SUM: &str = "taint_hier_sum";
pub const TAINT_SINK_SUM: &str = "taint_sink_sum";
pub const TAINT_HASH: &str = "taint_hash";
pub const COV_HASH: &str = "COV_HASH";
/// Width of every accumulator
pub const SUM_WIDTH: u32 = 32;

/// Reduction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Sum {
        /// Accumulate sink nodes separately into `taint_sink_sum`
        split_sinks: bool,
        /// Count memory arrays only
        array_only: bool,
    },
    Hash {
        seed: u64,
    },
}

impl Default for SummaryMode {
    fn default() -> Self {
        SummaryMode::Sum {
            split_sinks: false,
            array_only: false,
        }
    }
}

/// Contribution of one node to the module sum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contributor {
    Register,
    Memory { abits: u32 },
    Submodule,
}

/// Create a `keep` observability signal
fn observability_signal(module: &mut Module, name: &str, width: u32) -> SignalId {
    let id = module.add_signal_unique(name, width);
    let meta = &mut module.signal_mut(id).meta;
    meta.role = SignalRole::Observability;
    meta.keep = true;
    id
}

/// Fold `terms` through a `$add` chain seeded at zero
fn add_chain(module: &mut Module, terms: &[SigSpec]) -> SigSpec {
    terms.iter().fold(SigSpec::zeros(SUM_WIDTH), |acc, term| {
        module.add_binop("$add", acc, term.clone(), SUM_WIDTH)
    })
}

/// Internal accumulator signal driven by `value`
fn accumulator(module: &mut Module, name: &str, value: SigSpec) -> Result<SigSpec> {
    let id = observability_signal(module, name, SUM_WIDTH);
    let spec = module.sig(id);
    module.connect(spec.clone(), value)?;
    Ok(spec)
}

/// Fingerprint width for a module with `registers` taint registers
pub fn hash_width(registers: usize) -> u32 {
    let bits = usize::BITS - registers.leading_zeros();
    bits.clamp(8, 15) + 1
}

/// `tsum` / `tcov` pass
#[derive(Debug)]
pub struct SummaryReducer {
    mode: SummaryMode,
    rng: StdRng,
}

impl Default for SummaryReducer {
    fn default() -> Self {
        Self::new(SummaryMode::default())
    }
}

impl SummaryReducer {
    pub fn new(mode: SummaryMode) -> Self {
        let seed = match mode {
            SummaryMode::Hash { seed } => seed,
            SummaryMode::Sum { .. } => 0,
        };
        Self {
            mode,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> SummaryMode {
        self.mode
    }

    /// Reduce module `name`; returns whether it changed
    pub fn reduce_module(&mut self, design: &mut Design, name: &str) -> Result<bool> {
        {
            let module = design.expect_module(name)?;
            if module.meta.ignore || module.meta.stages.summary.is_done() {
                return Ok(false);
            }
        }
        design.expect_module_mut(name)?.meta.stages.summary = StageState::Running;

        let changed = match self.mode {
            SummaryMode::Sum {
                split_sinks,
                array_only,
            } => self.sum_module(design, name, split_sinks, array_only)?,
            SummaryMode::Hash { .. } => self.hash_module(design.expect_module_mut(name)?),
        };

        design.expect_module_mut(name)?.meta.stages.summary = StageState::Done;
        Ok(changed)
    }

    fn sum_module(
        &mut self,
        design: &mut Design,
        name: &str,
        split_sinks: bool,
        array_only: bool,
    ) -> Result<bool> {
        let contributors: Vec<(NodeId, Contributor, bool)> = {
            let module = design.expect_module(name)?;
            let mut out = Vec::new();
            for node in &module.nodes {
                let contributor = match TaintCellKind::from_cell_type(&node.cell_type) {
                    Some(TaintCellKind::Register) if !array_only => Contributor::Register,
                    Some(TaintCellKind::Memory) => {
                        let abits = node
                            .param("ABITS")
                            .and_then(|p| p.as_int())
                            .ok_or_else(|| IftError::ParamNotFound {
                                module: module.name.clone(),
                                node: node.name.clone(),
                                param: "ABITS".to_string(),
                            })?;
                        Contributor::Memory {
                            abits: abits as u32,
                        }
                    }
                    Some(_) => continue,
                    None => match design.module(&node.cell_type) {
                        Some(callee)
                            if !callee.meta.ignore
                                && callee.meta.stages.ports.is_done()
                                && callee.meta.stages.summary.is_done() =>
                        {
                            Contributor::Submodule
                        }
                        _ => continue,
                    },
                };
                out.push((node.id, contributor, node.meta.sink));
            }
            out
        };

        let module = design.expect_module_mut(name)?;
        let (mut local, mut hier, mut sinks) = (Vec::new(), Vec::new(), Vec::new());

        for (count, (id, contributor, is_sink)) in contributors.into_iter().enumerate() {
            let signal = match contributor {
                Contributor::Register => {
                    observability_signal(module, &format!("_{}_dff_taint_sum", count), 1)
                }
                Contributor::Memory { abits } => {
                    observability_signal(module, &format!("_{}_mem_taint_sum", count), abits)
                }
                Contributor::Submodule => {
                    let node = module.node(id);
                    let signal_name = format!("{}_{}_taint_sum", node.name, node.cell_type);
                    observability_signal(module, &signal_name, SUM_WIDTH)
                }
            };
            let spec = module.sig(signal);
            module.node_mut(id).set_port(TAINT_SUM, spec.clone());
            debug!(
                "{}: {:?} {} -> {}",
                module.name,
                contributor,
                module.node(id).name,
                module.signal(signal).name
            );

            match contributor {
                Contributor::Submodule => hier.push(spec),
                _ if split_sinks && is_sink => sinks.push(spec),
                _ => local.push(spec),
            }
        }

        let local_acc = add_chain(module, &local);
        let local_sum = accumulator(module, TAINT_LOCAL_SUM, local_acc)?;
        let hier_acc = add_chain(module, &hier);
        let hier_sum = accumulator(module, TAINT_HIER_SUM, hier_acc)?;
        let mut total = module.add_binop("$add", local_sum, hier_sum, SUM_WIDTH);
        if split_sinks {
            let sink_acc = add_chain(module, &sinks);
            let sink_sum = accumulator(module, TAINT_SINK_SUM, sink_acc)?;
            total = module.add_binop("$add", total, sink_sum, SUM_WIDTH);
        }

        let port = module.add_port(TAINT_SUM, SUM_WIDTH, PortDirection::Output)?;
        module.signal_mut(port).meta.role = SignalRole::Observability;
        let port_spec = module.sig(port);
        module.connect(port_spec, total)?;
        module.fixup_ports();

        info!(
            "{}: {} local, {} submodule, {} sink contributors",
            module.name,
            local.len(),
            hier.len(),
            sinks.len()
        );
        Ok(true)
    }

    fn hash_module(&mut self, module: &mut Module) -> bool {
        let registers: Vec<NodeId> = module
            .nodes
            .iter()
            .filter(|n| TaintCellKind::from_cell_type(&n.cell_type) == Some(TaintCellKind::Register))
            .map(|n| n.id)
            .collect();
        if registers.is_empty() {
            return false;
        }

        let width = hash_width(registers.len());
        let max_id: u64 = (1u64 << width) - 1;
        debug!(
            "module {} with {} tainted registers, hash width {}",
            module.name,
            registers.len(),
            width
        );

        let mut hash: Option<SigSpec> = None;
        for (count, id) in registers.iter().enumerate() {
            let coverage_id = self.rng.gen_range(1..=max_id);
            let signal = observability_signal(module, &format!("_{}_taint_covHash", count), width);
            let spec = module.sig(signal);
            let node = module.node_mut(*id);
            node.set_param("COVERAGE_WIDTH", width);
            node.set_param("COVERAGE_ID", coverage_id as i64);
            node.set_port(TAINT_HASH, spec.clone());

            hash = Some(match hash {
                None => spec,
                Some(acc) => module.add_binop("$xor", acc, spec, width),
            });
        }

        let collector = module.add_auto_node(COVERAGE_COLLECTOR);
        let node = module.node_mut(collector);
        node.set_param("COVERAGE_WIDTH", width);
        node.set_port(COV_HASH, hash.unwrap_or_else(|| SigSpec::zeros(width)));
        node.meta.keep = true;
        info!("{}: coverage hash over {} registers", module.name, registers.len());
        true
    }
}

impl Pass for SummaryReducer {
    fn name(&self) -> &str {
        match self.mode {
            SummaryMode::Sum { .. } => "tsum",
            SummaryMode::Hash { .. } => "tcov",
        }
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);
        if let SummaryMode::Hash { seed } = self.mode {
            info!("Instrumentation with seed: {}", seed);
        }

        for name in design.bottom_up_order()? {
            result.modules_visited += 1;
            if self.reduce_module(design, &name)? {
                result.modules_changed += 1;
            }
        }

        result.record_after(design);
        Ok(result)
    }
}

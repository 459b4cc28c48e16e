//! Cell instrumentation: per-node dispatch

use super::taint_cells;
use super::Instrumenter;
use crate::error::{IftError, Result};
use crate::shadow::ShadowAllocator;
use divaift_netlist::cell_types::is_passthrough;
use divaift_netlist::{
    classify_primitive, Design, Module, NodeId, PortDirection, PrimitiveClass, SigChunk, SigSpec,
    TaintCellKind,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Boundary of a callee as seen from an instantiating module
#[derive(Debug, Clone)]
struct CalleePorts {
    /// Ignored or opaque: no taint crosses the boundary
    sealed: bool,
    ports: HashMap<String, CalleePort>,
}

#[derive(Debug, Clone)]
struct CalleePort {
    direction: PortDirection,
    /// Shadow port name per channel, when exposed
    shadows: Vec<Option<String>>,
}

impl CalleePorts {
    fn snapshot(callee: &Module, channels: u32) -> Self {
        let ports = callee
            .port_ids()
            .iter()
            .filter_map(|id| {
                let sig = callee.signal(*id);
                let direction = sig.direction?;
                let shadows = (0..channels)
                    .map(|ch| {
                        callee
                            .shadow_of(*id, ch)
                            .filter(|s| callee.signal(*s).is_port())
                            .map(|s| callee.signal(s).name.clone())
                    })
                    .collect();
                Some((sig.name.clone(), CalleePort { direction, shadows }))
            })
            .collect();
        Self {
            sealed: callee.meta.ignore || callee.meta.opaque,
            ports,
        }
    }
}

impl Instrumenter {
    /// Synthesize taint nodes for every node of module `name`; returns the
    /// number of taint nodes created.
    pub(super) fn instrument_cells(&self, design: &mut Design, name: &str) -> Result<usize> {
        // Callee ports first, so instance shadows can bind to them
        let callees: Vec<String> = {
            let module = design.expect_module(name)?;
            design
                .instances_of(module)
                .into_iter()
                .map(|(_, callee)| callee)
                .collect()
        };
        let mut boundaries: IndexMap<String, CalleePorts> = IndexMap::new();
        for callee in callees {
            if boundaries.contains_key(&callee) {
                continue;
            }
            self.ensure_ports_instrumented(design, &callee)?;
            let snapshot = CalleePorts::snapshot(design.expect_module(&callee)?, self.taint_num);
            boundaries.insert(callee, snapshot);
        }

        let alloc = ShadowAllocator::new(&self.ignore);
        let module = design.expect_module_mut(name)?;
        let mut created = 0;

        for (idx, id) in module.node_ids().into_iter().enumerate() {
            let cell_type = module.node(id).cell_type.clone();
            debug!(
                "\t[c:{}] instrument cell {}@{}",
                idx,
                cell_type,
                module.node(id).name
            );

            if let Some(boundary) = boundaries.get(&cell_type) {
                self.instrument_instance(&alloc, module, id, boundary)?;
                continue;
            }
            if TaintCellKind::from_cell_type(&cell_type).is_some() || is_passthrough(&cell_type) {
                continue;
            }

            let class = classify_primitive(&cell_type).ok_or_else(|| IftError::UnknownCellType {
                module: module.name.clone(),
                node: module.node(id).name.clone(),
                cell_type: cell_type.clone(),
            })?;
            for ch in 0..self.taint_num {
                match class {
                    PrimitiveClass::Unary => {
                        taint_cells::add_unary(&alloc, module, id, ch);
                    }
                    PrimitiveClass::Binary => {
                        taint_cells::add_binary(&alloc, module, id, ch);
                    }
                    PrimitiveClass::Mux => {
                        taint_cells::add_mux(&alloc, module, id, ch);
                    }
                    PrimitiveClass::Register => {
                        taint_cells::add_register(&alloc, module, id, ch, &self.sinks)?;
                    }
                    PrimitiveClass::Memory => {
                        taint_cells::add_memory(&alloc, module, id, ch)?;
                    }
                }
                created += 1;
            }
        }
        Ok(created)
    }

    /// Attach shadow connections to one submodule instance
    fn instrument_instance(
        &self,
        alloc: &ShadowAllocator,
        module: &mut Module,
        id: NodeId,
        boundary: &CalleePorts,
    ) -> Result<()> {
        let connections: Vec<(String, SigSpec)> = module
            .node(id)
            .connections
            .iter()
            .map(|(port, spec)| (port.clone(), spec.clone()))
            .collect();

        for (port, spec) in connections {
            let Some(info) = boundary.ports.get(&port) else {
                continue;
            };
            for ch in 0..self.taint_num {
                let shadow_port = match &info.shadows[ch as usize] {
                    Some(name) if !boundary.sealed => name,
                    _ => {
                        if info.direction == PortDirection::Output {
                            tie_shadow_zero(alloc, module, &spec, ch)?;
                        }
                        continue;
                    }
                };
                let taint = alloc.shadow(module, &spec, ch);
                module.node_mut(id).set_port(shadow_port.clone(), taint);
            }
        }
        Ok(())
    }
}

/// Drive the caller-side shadow of an unshadowed callee output with zero
fn tie_shadow_zero(alloc: &ShadowAllocator, module: &mut Module, spec: &SigSpec, ch: u32) -> Result<()> {
    let taint = alloc.shadow(module, spec, ch);
    for chunk in taint.chunks() {
        if let SigChunk::Wire {
            signal,
            offset,
            width,
        } = chunk
        {
            module.connect(
                SigSpec::slice(*signal, *offset, *width),
                SigSpec::zeros(*width),
            )?;
        }
    }
    Ok(())
}

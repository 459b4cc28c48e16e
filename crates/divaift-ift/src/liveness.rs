//! Liveness annotation of storage arrays
//!
//! A module carries an annotation either in its own metadata or on the
//! sentinel signal `divaift_sram_hint`:
//!
//! ```text
//! queue,<enq>,<deq>,<full>,<inst0;inst1;...>
//! bitmap,<valid>,<inst0;inst1;...>
//! ```
//!
//! Every listed instance is a wrapper around a storage module. The wrapper
//! gains three `LIVENESS_OP*` input ports bound to the named signals and
//! forwards them one level down into the storage module, whose memory nodes
//! record the liveness kind.

use crate::error::{IftError, Result};
use crate::keep::{is_queue_module, QUEUE_DEQ_PTR, QUEUE_ENQ_PTR, QUEUE_MAYBE_FULL};
use crate::passes::{Pass, PassResult};
use divaift_netlist::cell_types::{is_memory, TAINT_MEMORY};
use divaift_netlist::{
    Design, LivenessDescriptor, LivenessKind, Module, NodeId, PortDirection, SigSpec, SignalId,
    SignalRole, StageState,
};
use indexmap::IndexSet;
use tracing::{debug, info};

/// Operand port names, in operand order
pub const LIVENESS_OPERANDS: [&str; 3] = ["LIVENESS_OP0", "LIVENESS_OP1", "LIVENESS_OP2"];
pub const LIVENESS_TYPE_PARAM: &str = "LIVENESS_TYPE";
/// Sentinel signal whose `annotation` holds the module's liveness annotation
pub const SRAM_HINT_SIGNAL: &str = "divaift_sram_hint";

/// A parsed liveness annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessAnnotation {
    pub kind: LivenessKind,
    /// Signal names in the annotated module
    pub operands: Vec<String>,
    /// Instance names of storage wrappers
    pub targets: Vec<String>,
}

impl LivenessAnnotation {
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = |reason: String| IftError::MalformedAnnotation {
            annotation: text.to_string(),
            reason,
        };

        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let kind = LivenessKind::parse(fields[0])
            .ok_or_else(|| malformed(format!("unknown liveness kind '{}'", fields[0])))?;

        let expected = kind.operand_count() + 2;
        if fields.len() != expected {
            return Err(malformed(format!(
                "{} annotation takes {} fields, found {}",
                kind,
                expected,
                fields.len()
            )));
        }

        let operands: Vec<String> = fields[1..=kind.operand_count()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(pos) = operands.iter().position(String::is_empty) {
            return Err(malformed(format!("operand {} is empty", pos)));
        }

        let targets: Vec<String> = fields[expected - 1]
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            return Err(malformed("no target instances".to_string()));
        }

        Ok(Self {
            kind,
            operands,
            targets,
        })
    }

    pub fn descriptor(&self) -> LivenessDescriptor {
        LivenessDescriptor {
            kind: self.kind,
            operands: self.operands.clone(),
        }
    }
}

/// Operand bindings for all three ports; unused operands are one zero bit
fn operand_specs(kind: LivenessKind, signals: &[SigSpec]) -> [SigSpec; 3] {
    std::array::from_fn(|i| {
        if i < kind.operand_count() {
            signals[i].clone()
        } else {
            SigSpec::zeros(1)
        }
    })
}

/// Attach a node-local descriptor to `node`: `LIVENESS_TYPE` parameter plus
/// the three operand connections.
pub fn bind_node_liveness(
    module: &mut Module,
    node: NodeId,
    descriptor: &LivenessDescriptor,
) -> Result<()> {
    if descriptor.operands.len() != descriptor.kind.operand_count() {
        return Err(IftError::MalformedAnnotation {
            annotation: format!("{},{}", descriptor.kind, descriptor.operands.join(",")),
            reason: format!(
                "{} needs {} operands",
                descriptor.kind,
                descriptor.kind.operand_count()
            ),
        });
    }

    let signals = resolve_operands(module, &descriptor.operands)?;
    let specs: Vec<SigSpec> = signals.iter().map(|s| module.sig(*s)).collect();
    let bound = operand_specs(descriptor.kind, &specs);

    let node = module.node_mut(node);
    node.set_param(LIVENESS_TYPE_PARAM, descriptor.kind.as_str());
    for (port, spec) in LIVENESS_OPERANDS.iter().zip(bound) {
        node.set_port(*port, spec);
    }
    node.meta.liveness = Some(descriptor.clone());
    Ok(())
}

/// Naming convention of generated queues: the storage of a `Queue*` module is
/// described by its pointer and full-flag registers.
pub fn queue_storage_fallback(module: &Module) -> Option<LivenessDescriptor> {
    if !is_queue_module(&module.name) {
        return None;
    }
    let present = [QUEUE_ENQ_PTR, QUEUE_DEQ_PTR, QUEUE_MAYBE_FULL]
        .iter()
        .all(|n| module.find_signal(n).is_some());
    present.then(|| LivenessDescriptor::queue(QUEUE_ENQ_PTR, QUEUE_DEQ_PTR, QUEUE_MAYBE_FULL))
}

fn resolve_operands(module: &Module, names: &[String]) -> Result<Vec<SignalId>> {
    names
        .iter()
        .map(|name| {
            module
                .find_signal(name)
                .ok_or_else(|| IftError::SignalNotFound {
                    module: module.name.clone(),
                    signal: name.clone(),
                })
        })
        .collect()
}

/// Instance by exact name, else the `<name>_0` alias
fn find_wrapper_instance(module: &Module, target: &str) -> Result<NodeId> {
    if let Some(id) = module.find_node(target) {
        return Ok(id);
    }
    let alias = format!("{}_0", target);
    debug!("Instance {} not found, trying {}", target, alias);
    module
        .find_node(&alias)
        .ok_or_else(|| IftError::InstanceNotFound {
            module: module.name.clone(),
            instance: target.to_string(),
        })
}

/// Add the operand input ports to `module` unless present, returning them
fn ensure_operand_ports(module: &mut Module, widths: [u32; 3]) -> Result<[SigSpec; 3]> {
    let mut ports: [SigSpec; 3] = Default::default();
    for (i, (name, width)) in LIVENESS_OPERANDS.iter().zip(widths).enumerate() {
        let id = match module.find_port(name) {
            Some(id) => id,
            None => {
                let id = module.add_port(*name, width, PortDirection::Input)?;
                module.signal_mut(id).meta.role = SignalRole::LivenessOperand;
                id
            }
        };
        ports[i] = module.sig(id);
    }
    Ok(ports)
}

/// Annotate every memory node of `module`; returns how many.
///
/// Taint memories take the `LIVENESS_TYPE` parameter and the operand
/// connections. Primitive memories only record the descriptor, which the cell
/// stage of `pift` binds on their taint mirror.
fn annotate_storage_nodes(module: &mut Module, kind: LivenessKind, ports: &[SigSpec; 3]) -> usize {
    let descriptor = LivenessDescriptor {
        kind,
        operands: LIVENESS_OPERANDS[..kind.operand_count()]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    let mut count = 0;
    for node in module.nodes.iter_mut() {
        if node.cell_type == TAINT_MEMORY {
            node.set_param(LIVENESS_TYPE_PARAM, kind.as_str());
            for (port, spec) in LIVENESS_OPERANDS.iter().zip(ports.iter()) {
                node.set_port(*port, spec.clone());
            }
        } else if !is_memory(&node.cell_type) {
            continue;
        }
        node.meta.liveness = Some(descriptor.clone());
        count += 1;
    }
    count
}

/// `anno-sram` pass
#[derive(Debug, Default)]
pub struct LivenessAnnotator {
    wrappers: usize,
}

impl LivenessAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotation text of `module`, from its metadata or the sentinel signal
    pub fn annotation_of(module: &Module) -> Option<String> {
        if let Some(text) = &module.meta.liveness {
            return Some(text.clone());
        }
        module
            .find_signal(SRAM_HINT_SIGNAL)
            .and_then(|id| module.signal(id).meta.annotation.clone())
    }

    /// Apply `annotation` found on module `name`
    pub fn annotate(&mut self, design: &mut Design, name: &str, annotation: &LivenessAnnotation) -> Result<()> {
        let (specs, widths, targets) = {
            let module = design.expect_module(name)?;
            let signals = resolve_operands(module, &annotation.operands)?;
            let specs: Vec<SigSpec> = signals.iter().map(|s| module.sig(*s)).collect();
            let bound = operand_specs(annotation.kind, &specs);
            let widths = [bound[0].width(), bound[1].width(), bound[2].width()];

            let mut targets = Vec::with_capacity(annotation.targets.len());
            for target in &annotation.targets {
                let id = find_wrapper_instance(module, target)?;
                let node = module.node(id);
                if !design.contains(&node.cell_type) {
                    return Err(IftError::InstanceModuleNotFound {
                        instance: node.name.clone(),
                        module: node.cell_type.clone(),
                    });
                }
                targets.push((id, node.cell_type.clone()));
            }
            (bound, widths, targets)
        };

        for (id, wrapper) in targets {
            {
                let module = design.expect_module_mut(name)?;
                let node = module.node_mut(id);
                for (port, spec) in LIVENESS_OPERANDS.iter().zip(specs.iter()) {
                    node.set_port(*port, spec.clone());
                }
                debug!("{}: bound liveness operands on {}", name, node.name);
            }
            if self.annotate_wrapper(design, &wrapper, annotation.kind, widths)? {
                self.wrappers += 1;
            }
        }
        Ok(())
    }

    /// Expose operand ports on `wrapper` and forward them into its storage.
    /// No-op on wrappers already annotated.
    fn annotate_wrapper(
        &self,
        design: &mut Design,
        wrapper: &str,
        kind: LivenessKind,
        widths: [u32; 3],
    ) -> Result<bool> {
        let instances: Vec<NodeId> = {
            let module = design.expect_module(wrapper)?;
            if module.meta.stages.liveness.is_done() {
                return Ok(false);
            }
            // Taint and helper nodes are not instances of design modules
            module
                .nodes
                .iter()
                .filter(|n| n.is_public_type() && design.contains(&n.cell_type))
                .map(|n| n.id)
                .collect()
        };

        let (ports, storage) = {
            let module = design.expect_module_mut(wrapper)?;
            module.meta.stages.liveness = StageState::Running;
            let ports = ensure_operand_ports(module, widths)?;
            module.fixup_ports();
            let direct = annotate_storage_nodes(module, kind, &ports);

            let mut storage = IndexSet::new();
            for id in instances {
                let node = module.node_mut(id);
                for (port, spec) in LIVENESS_OPERANDS.iter().zip(ports.iter()) {
                    node.set_port(*port, spec.clone());
                }
                storage.insert((node.cell_type.clone(), node.name.clone()));
            }
            if direct == 0 && storage.is_empty() {
                return Err(IftError::NoStorageArray(wrapper.to_string()));
            }
            (ports, storage)
        };

        let widths = [ports[0].width(), ports[1].width(), ports[2].width()];
        for (callee, instance) in storage {
            let module = design
                .module_mut(&callee)
                .ok_or_else(|| IftError::InstanceModuleNotFound {
                    instance: instance.clone(),
                    module: callee.clone(),
                })?;
            let inner = ensure_operand_ports(module, widths)?;
            module.fixup_ports();
            if annotate_storage_nodes(module, kind, &inner) == 0 {
                return Err(IftError::NoStorageArray(callee));
            }
            debug!("{}: {} storage in {}", wrapper, kind, callee);
        }

        design.expect_module_mut(wrapper)?.meta.stages.liveness = StageState::Done;
        Ok(true)
    }
}

impl Pass for LivenessAnnotator {
    fn name(&self) -> &str {
        "anno-sram"
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);
        self.wrappers = 0;

        let mut annotated = 0;
        for name in design.module_names() {
            result.modules_visited += 1;
            let Some(text) = Self::annotation_of(design.expect_module(&name)?) else {
                continue;
            };
            info!("Liveness annotation on {}: {}", name, text);
            let annotation = LivenessAnnotation::parse(&text)?;
            self.annotate(design, &name, &annotation)?;
            annotated += 1;
            result.modules_changed += 1;
        }

        result.add_extra("annotations", annotated);
        result.add_extra("wrappers", self.wrappers);
        result.record_after(design);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue() {
        let a = LivenessAnnotation::parse("queue,enq,deq,full,inst0;inst1").unwrap();
        assert_eq!(a.kind, LivenessKind::Queue);
        assert_eq!(a.operands, vec!["enq", "deq", "full"]);
        assert_eq!(a.targets, vec!["inst0", "inst1"]);
    }

    #[test]
    fn test_parse_bitmap() {
        let a = LivenessAnnotation::parse("bitmap,valid,ram").unwrap();
        assert_eq!(a.kind, LivenessKind::Bitmap);
        assert_eq!(a.descriptor(), LivenessDescriptor::bitmap("valid"));
        assert_eq!(a.targets, vec!["ram"]);
    }

    #[test]
    fn test_parse_rejects_bad_arity_and_kind() {
        for bad in [
            "queue,enq,deq",
            "queue,enq,deq,full,a,b",
            "bitmap,valid",
            "fifo,a,b",
            "queue,enq,,full,a",
            "bitmap,valid, ; ",
        ] {
            assert!(
                matches!(
                    LivenessAnnotation::parse(bad),
                    Err(IftError::MalformedAnnotation { .. })
                ),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_queue_fallback_needs_all_signals() {
        let mut m = Module::new("Queue1_UInt8");
        m.add_signal("enq_ptr_value", 2).unwrap();
        m.add_signal("deq_ptr_value", 2).unwrap();
        assert!(queue_storage_fallback(&m).is_none());
        m.add_signal("maybe_full", 1).unwrap();
        assert_eq!(
            queue_storage_fallback(&m),
            Some(LivenessDescriptor::queue(
                "enq_ptr_value",
                "deq_ptr_value",
                "maybe_full"
            ))
        );
        assert!(queue_storage_fallback(&Module::new("Rob")).is_none());
    }

    #[test]
    fn test_bind_node_liveness_missing_signal_is_fatal() {
        let mut m = Module::new("m");
        let n = m.add_node("ram", "$mem_v2").unwrap();
        let err = bind_node_liveness(&mut m, n, &LivenessDescriptor::bitmap("nope")).unwrap_err();
        assert!(matches!(err, IftError::SignalNotFound { .. }));
    }
}

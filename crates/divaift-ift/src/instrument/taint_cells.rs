//! Taint node builders
//!
//! One builder per taint node shape. Each reads the original node, asks the
//! allocator for the taint view of its ports and adds a taint node that
//! mirrors it on one channel. The original node is left untouched.

use crate::error::Result;
use crate::liveness::{bind_node_liveness, queue_storage_fallback};
use crate::shadow::ShadowAllocator;
use crate::vec_anno::SinkDesignations;
use divaift_netlist::{Module, NodeId, SigSpec, TaintCellKind};
use tracing::trace;

/// Memory ports that carry data-dependent taint
const MEMORY_TAINT_PORTS: &[&str] = &["RD_ADDR", "RD_DATA", "RD_EN", "WR_EN", "WR_ADDR", "WR_DATA"];

pub fn taint_port(port: &str) -> String {
    format!("{}_taint", port)
}

/// Fresh taint node of `kind` mirroring `orig`
fn new_taint_node(module: &mut Module, kind: TaintCellKind, orig: NodeId, channel: u32) -> NodeId {
    let (orig_type, src) = {
        let node = module.node(orig);
        (node.cell_type.clone(), node.meta.src.clone())
    };
    let id = module.add_auto_node(kind.cell_type());
    let node = module.node_mut(id);
    node.set_param("TYPE", orig_type);
    node.meta.mirrors = Some(orig);
    node.meta.channel = Some(channel);
    node.meta.src = src;
    trace!(
        "[TAINT] {} mirrors {} on ch{}",
        module.node(id).name,
        module.node(orig).name,
        channel
    );
    id
}

pub fn add_unary(
    alloc: &ShadowAllocator,
    module: &mut Module,
    orig: NodeId,
    channel: u32,
) -> NodeId {
    let (a, y, signed) = {
        let node = module.node(orig);
        (
            node.port_or_empty("A"),
            node.port_or_empty("Y"),
            node.param_bool("A_SIGNED"),
        )
    };
    let a_t = alloc.shadow(module, &a, channel);
    let y_t = alloc.shadow(module, &y, channel);

    let id = new_taint_node(module, TaintCellKind::Unary, orig, channel);
    let node = module.node_mut(id);
    node.set_param("A_SIGNED", signed);
    node.set_param("A_WIDTH", a.width());
    node.set_param("Y_WIDTH", y.width());
    node.set_port("A", a);
    node.set_port("Y", y);
    node.set_port(taint_port("A"), a_t);
    node.set_port(taint_port("Y"), y_t);
    id
}

pub fn add_binary(
    alloc: &ShadowAllocator,
    module: &mut Module,
    orig: NodeId,
    channel: u32,
) -> NodeId {
    let (a, b, y, signed) = {
        let node = module.node(orig);
        (
            node.port_or_empty("A"),
            node.port_or_empty("B"),
            node.port_or_empty("Y"),
            node.param_bool("A_SIGNED") || node.param_bool("B_SIGNED"),
        )
    };
    let a_t = alloc.shadow(module, &a, channel);
    let b_t = alloc.shadow(module, &b, channel);
    let y_t = alloc.shadow(module, &y, channel);

    let id = new_taint_node(module, TaintCellKind::Binary, orig, channel);
    let node = module.node_mut(id);
    node.set_param("A_SIGNED", signed);
    node.set_param("B_SIGNED", signed);
    node.set_param("A_WIDTH", a.width());
    node.set_param("B_WIDTH", b.width());
    node.set_param("Y_WIDTH", y.width());
    node.set_port("A", a);
    node.set_port("B", b);
    node.set_port("Y", y);
    node.set_port(taint_port("A"), a_t);
    node.set_port(taint_port("B"), b_t);
    node.set_port(taint_port("Y"), y_t);
    id
}

/// `$mux`, `$bwmux` and `$pmux`; select taint reaches the output
pub fn add_mux(
    alloc: &ShadowAllocator,
    module: &mut Module,
    orig: NodeId,
    channel: u32,
) -> NodeId {
    let ports: Vec<SigSpec> = {
        let node = module.node(orig);
        ["A", "B", "S", "Y"]
            .iter()
            .map(|p| node.port_or_empty(p))
            .collect()
    };
    let taints: Vec<SigSpec> = ports
        .iter()
        .map(|spec| alloc.shadow(module, spec, channel))
        .collect();

    let id = new_taint_node(module, TaintCellKind::Mux, orig, channel);
    let node = module.node_mut(id);
    node.set_param("WIDTH", ports[0].width());
    node.set_param("S_WIDTH", ports[2].width());
    for ((name, spec), taint) in ["A", "B", "S", "Y"].iter().zip(ports).zip(taints) {
        node.set_port(*name, spec);
        node.set_port(taint_port(name), taint);
    }
    id
}

/// Flip-flop family. Clock, reset and enable stay connected as in the
/// original so the taint register updates on the same edge.
pub fn add_register(
    alloc: &ShadowAllocator,
    module: &mut Module,
    orig: NodeId,
    channel: u32,
    sinks: &SinkDesignations,
) -> Result<NodeId> {
    let (params, connections) = {
        let node = module.node(orig);
        (node.params.clone(), node.connections.clone())
    };
    let d = connections.get("D").cloned().unwrap_or_default();
    let q = connections.get("Q").cloned().unwrap_or_default();
    let d_t = alloc.shadow(module, &d, channel);
    let q_t = alloc.shadow(module, &q, channel);

    let q_signal = q.first_signal();
    let is_sink = q_signal
        .map(|s| sinks.is_sink(&module.name, &module.signal(s).name))
        .unwrap_or(false);
    let liveness = q_signal.and_then(|s| module.signal(s).meta.liveness.clone());

    let id = new_taint_node(module, TaintCellKind::Register, orig, channel);
    {
        let node = module.node_mut(id);
        node.params.extend(params);
        node.connections.extend(connections);
        node.set_port(taint_port("D"), d_t);
        node.set_port(taint_port("Q"), q_t);
        node.meta.sink = is_sink;
    }
    if let Some(descriptor) = liveness {
        bind_node_liveness(module, id, &descriptor)?;
    }
    Ok(id)
}

/// Memory arrays are always sinks
pub fn add_memory(
    alloc: &ShadowAllocator,
    module: &mut Module,
    orig: NodeId,
    channel: u32,
) -> Result<NodeId> {
    let (params, connections, liveness) = {
        let node = module.node(orig);
        (
            node.params.clone(),
            node.connections.clone(),
            node.meta.liveness.clone(),
        )
    };
    let taints: Vec<(String, SigSpec)> = MEMORY_TAINT_PORTS
        .iter()
        .filter_map(|p| connections.get(*p).map(|spec| (*p, spec.clone())))
        .map(|(p, spec)| (taint_port(p), alloc.shadow(module, &spec, channel)))
        .collect();

    let id = new_taint_node(module, TaintCellKind::Memory, orig, channel);
    {
        let node = module.node_mut(id);
        node.params.extend(params);
        node.connections.extend(connections);
        for (name, taint) in taints {
            node.set_port(name, taint);
        }
        node.meta.sink = true;
    }

    if let Some(descriptor) = liveness.or_else(|| queue_storage_fallback(module)) {
        bind_node_liveness(module, id, &descriptor)?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::IgnoreList;
    use divaift_netlist::{LivenessDescriptor, LivenessKind, PortDirection};

    fn binop_module(cell_type: &str) -> (Module, NodeId) {
        let mut m = Module::new("m");
        let a = m.add_port("a", 8, PortDirection::Input).unwrap();
        let b = m.add_port("b", 8, PortDirection::Input).unwrap();
        let y = m.add_port("y", 8, PortDirection::Output).unwrap();
        let n = m.add_node("op", cell_type).unwrap();
        let (sa, sb, sy) = (m.sig(a), m.sig(b), m.sig(y));
        let node = m.node_mut(n);
        node.set_param("A_SIGNED", false);
        node.set_param("B_SIGNED", true);
        node.set_port("A", sa);
        node.set_port("B", sb);
        node.set_port("Y", sy);
        (m, n)
    }

    #[test]
    fn test_binary_signedness_is_or_of_operands() {
        let (mut m, n) = binop_module("$add");
        let ignore = IgnoreList::default();
        let alloc = ShadowAllocator::new(&ignore);
        let t = add_binary(&alloc, &mut m, n, 0);
        let node = m.node(t);
        assert_eq!(node.cell_type, "taintcell_2I1O");
        assert!(node.param_bool("A_SIGNED"));
        assert!(node.param_bool("B_SIGNED"));
        assert_eq!(node.param("TYPE").and_then(|p| p.as_str()), Some("$add"));
        assert_eq!(node.port("Y_taint").map(SigSpec::width), Some(8));
        assert_eq!(node.meta.mirrors, Some(n));
    }

    #[test]
    fn test_register_sink_and_liveness() {
        let mut m = Module::new("Rob");
        let clk = m.add_port("clk", 1, PortDirection::Input).unwrap();
        let d = m.add_signal("d", 4).unwrap();
        let q = m.add_signal("valid", 4).unwrap();
        m.add_signal("vec", 4).unwrap();
        m.signal_mut(q).meta.liveness = Some(LivenessDescriptor::bitmap("vec"));
        let n = m.add_node("reg", "$dff").unwrap();
        let (sc, sd, sq) = (m.sig(clk), m.sig(d), m.sig(q));
        let node = m.node_mut(n);
        node.set_param("WIDTH", 4u32);
        node.set_port("CLK", sc);
        node.set_port("D", sd);
        node.set_port("Q", sq);

        let mut sinks = SinkDesignations::new();
        sinks.insert("Rob", "valid");
        let ignore = IgnoreList::parse("clk");
        let alloc = ShadowAllocator::new(&ignore);
        let t = add_register(&alloc, &mut m, n, 0, &sinks).unwrap();

        let node = m.node(t);
        assert!(node.meta.sink);
        assert!(node.port("CLK").is_some());
        assert_eq!(node.param("WIDTH").and_then(|p| p.as_int()), Some(4));
        assert_eq!(
            node.param("LIVENESS_TYPE").and_then(|p| p.as_str()),
            Some(LivenessKind::Bitmap.as_str())
        );
        assert_eq!(node.port("LIVENESS_OP0").map(SigSpec::width), Some(4));
        assert!(node.port("LIVENESS_OP2").unwrap().is_fully_zero());
    }

    #[test]
    fn test_memory_queue_naming_fallback() {
        let mut m = Module::new("Queue_12");
        for (name, width) in [("enq_ptr_value", 3), ("deq_ptr_value", 3), ("maybe_full", 1)] {
            m.add_signal(name, width).unwrap();
        }
        let addr = m.add_signal("raddr", 3).unwrap();
        let n = m.add_node("ram", "$mem_v2").unwrap();
        let sa = m.sig(addr);
        m.node_mut(n).set_param("ABITS", 3u32);
        m.node_mut(n).set_port("RD_ADDR", sa);

        let ignore = IgnoreList::default();
        let alloc = ShadowAllocator::new(&ignore);
        let t = add_memory(&alloc, &mut m, n, 0).unwrap();
        let node = m.node(t);
        assert!(node.meta.sink);
        assert!(node.port("RD_ADDR_taint").is_some());
        assert!(node.port("WR_DATA_taint").is_none());
        assert_eq!(
            node.param("LIVENESS_TYPE").and_then(|p| p.as_str()),
            Some("queue")
        );
        assert_eq!(node.port("LIVENESS_OP2").map(SigSpec::width), Some(1));
    }
}

//! Shared fixtures for the pass tests

#![allow(dead_code)]

use divaift_ift::summary::TAINT_SUM;
use divaift_netlist::cell_types::{TAINT_MEMORY, TAINT_REGISTER};
use divaift_netlist::{Design, Module, NodeId, PortDirection, SigChunk, SigSpec, SignalId};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;

pub fn add_cell(m: &mut Module, name: &str, ty: &str, ports: &[(&str, SignalId)]) -> NodeId {
    let id = m.add_node(name, ty).unwrap();
    let specs: Vec<(String, SigSpec)> = ports
        .iter()
        .map(|(p, s)| (p.to_string(), m.sig(*s)))
        .collect();
    for (p, spec) in specs {
        m.node_mut(id).set_port(p, spec);
    }
    id
}

/// `y <= a + b` on every clock edge
pub fn leaf_module(name: &str) -> Module {
    let mut m = Module::new(name);
    let clk = m.add_port("clk", 1, PortDirection::Input).unwrap();
    let a = m.add_port("a", 8, PortDirection::Input).unwrap();
    let b = m.add_port("b", 8, PortDirection::Input).unwrap();
    let y = m.add_port("y", 8, PortDirection::Output).unwrap();
    let sum = m.add_signal("sum", 8).unwrap();
    add_cell(&mut m, "add", "$add", &[("A", a), ("B", b), ("Y", sum)]);
    let r = add_cell(&mut m, "r", "$dff", &[("CLK", clk), ("D", sum), ("Q", y)]);
    m.node_mut(r).set_param("WIDTH", 8u32);
    m
}

/// Module with the same boundary as [`leaf_module`] that forwards everything
/// into one instance of `callee`
pub fn wrapper_module(name: &str, callee: &str) -> Module {
    let mut m = Module::new(name);
    let clk = m.add_port("clk", 1, PortDirection::Input).unwrap();
    let a = m.add_port("a", 8, PortDirection::Input).unwrap();
    let b = m.add_port("b", 8, PortDirection::Input).unwrap();
    let y = m.add_port("y", 8, PortDirection::Output).unwrap();
    add_cell(
        &mut m,
        "u_leaf",
        callee,
        &[("clk", clk), ("a", a), ("b", b), ("y", y)],
    );
    m
}

/// top -> {u_a: MidA, u_b: MidB}, MidA -> Leaf, MidB -> Leaf
pub fn diamond_modules() -> Vec<Module> {
    let mut top = Module::new("Top");
    let clk = top.add_port("clk", 1, PortDirection::Input).unwrap();
    let a = top.add_port("a", 8, PortDirection::Input).unwrap();
    let b = top.add_port("b", 8, PortDirection::Input).unwrap();
    let y0 = top.add_port("y0", 8, PortDirection::Output).unwrap();
    let y1 = top.add_port("y1", 8, PortDirection::Output).unwrap();
    add_cell(&mut top, "u_a", "MidA", &[("clk", clk), ("a", a), ("b", b), ("y", y0)]);
    add_cell(&mut top, "u_b", "MidB", &[("clk", clk), ("a", b), ("b", a), ("y", y1)]);

    vec![
        top,
        wrapper_module("MidA", "Leaf"),
        wrapper_module("MidB", "Leaf"),
        leaf_module("Leaf"),
    ]
}

pub fn design_of(modules: Vec<Module>) -> Design {
    let mut design = Design::new();
    for m in modules {
        design.add_module(m).unwrap();
    }
    design
}

/// Combinational evaluator for the summary network of one module.
///
/// Every taint register/memory drives its `taint_sum` tap with a random value
/// that fits the tap; submodules are evaluated recursively. Returns the value
/// seen on the module's `taint_sum` port and the plain sum of every random
/// value drawn underneath it.
pub fn evaluate_taint_sum(design: &Design, name: &str, rng: &mut StdRng) -> (u64, u64) {
    let module = design.module(name).unwrap();
    let mut values: HashMap<SignalId, u64> = HashMap::new();
    let mut expected = 0u64;

    for node in &module.nodes {
        let Some(tap) = node.port(TAINT_SUM) else {
            continue;
        };
        let signal = tap.first_signal().unwrap();
        let value = if node.cell_type == TAINT_REGISTER || node.cell_type == TAINT_MEMORY {
            let width = tap.width();
            let v = rng.gen_range(0..(1u64 << width));
            expected += v;
            v
        } else {
            let (seen, inner) = evaluate_taint_sum(design, &node.cell_type, rng);
            assert_eq!(seen, inner, "submodule {} loses taint", node.cell_type);
            expected += inner;
            seen
        };
        values.insert(signal, value);
    }

    let port = module.find_port(TAINT_SUM).unwrap();
    let read = |values: &HashMap<SignalId, u64>, spec: &SigSpec| -> Option<u64> {
        match spec.chunks() {
            [SigChunk::Wire { signal, offset: 0, .. }] => values.get(signal).copied(),
            [SigChunk::Const(c)] => Some(c.as_u64()),
            _ => None,
        }
    };

    // Fixpoint over adders and assignments
    while !values.contains_key(&port) {
        let mut progress = false;
        for node in module.nodes.iter().filter(|n| n.cell_type == "$add") {
            let y = node.port("Y").and_then(SigSpec::first_signal).unwrap();
            if values.contains_key(&y) {
                continue;
            }
            let a = read(&values, node.port("A").unwrap());
            let b = read(&values, node.port("B").unwrap());
            if let (Some(a), Some(b)) = (a, b) {
                values.insert(y, (a + b) & 0xffff_ffff);
                progress = true;
            }
        }
        for assign in &module.assigns {
            let Some(lhs) = assign.lhs.first_signal() else {
                continue;
            };
            if values.contains_key(&lhs) {
                continue;
            }
            if let Some(v) = read(&values, &assign.rhs) {
                values.insert(lhs, v);
                progress = true;
            }
        }
        assert!(progress, "summary network of {} does not settle", name);
    }

    (values[&port], expected)
}

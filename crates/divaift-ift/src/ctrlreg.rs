//! Control-register classification
//!
//! A register is *control* when its output can reach a multiplexer select
//! through combinational cells and assignments; otherwise it is *data*.
//! Control registers are never observability sinks.
//!
//! Taint nodes are analysed through their taint ports, original primitives
//! through their data ports, so the pass gives the same answer before and
//! after instrumentation.

use crate::error::Result;
use crate::passes::{Pass, PassResult};
use divaift_netlist::cell_types::is_register;
use divaift_netlist::{
    classify_primitive, Design, Module, Node, NodeId, PrimitiveClass, RegisterClass, SigBit,
    SigSpec, SignalId, TaintCellKind,
};
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;
use petgraph::Graph;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Signal-level propagation graph of one module
#[derive(Debug, Default)]
pub struct PropagationGraph {
    graph: Graph<SignalId, ()>,
    index: HashMap<SignalId, NodeIndex>,
}

impl PropagationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, signal: SignalId) -> NodeIndex {
        if let Some(&ix) = self.index.get(&signal) {
            return ix;
        }
        let ix = self.graph.add_node(signal);
        self.index.insert(signal, ix);
        ix
    }

    pub fn add_signal(&mut self, signal: SignalId) {
        self.node(signal);
    }

    pub fn add_edge(&mut self, from: SignalId, to: SignalId) {
        let (a, b) = (self.node(from), self.node(to));
        self.graph.update_edge(a, b, ());
    }

    /// Edges from every signal of `inputs` to every signal of `output`
    pub fn connect_specs(&mut self, inputs: &[&SigSpec], output: &SigSpec) {
        let outputs = output.signals();
        for input in inputs {
            for from in input.signals() {
                for to in &outputs {
                    self.add_edge(from, *to);
                }
            }
        }
    }

    /// Per-bit edges of `lhs = rhs`
    pub fn connect_assign(&mut self, lhs: &SigSpec, rhs: &SigSpec) {
        for (l, r) in lhs.bits().into_iter().zip(rhs.bits()) {
            if let (SigBit::Wire(to, _), SigBit::Wire(from, _)) = (l, r) {
                self.add_edge(from, to);
            }
        }
    }

    /// Everything reachable from `starts`, the starts included. Cycles are
    /// visited once.
    pub fn reachable(&self, starts: &[SignalId]) -> HashSet<SignalId> {
        let mut out = HashSet::new();
        let mut dfs = Dfs::empty(&self.graph);
        for start in starts {
            let Some(&ix) = self.index.get(start) else {
                continue;
            };
            dfs.move_to(ix);
            while let Some(n) = dfs.next(&self.graph) {
                out.insert(self.graph[n]);
            }
        }
        out
    }

    pub fn signal_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Port names a node is analysed through
struct View {
    a: &'static str,
    b: &'static str,
    s: &'static str,
    y: &'static str,
    q: &'static str,
}

const DATA_VIEW: View = View {
    a: "A",
    b: "B",
    s: "S",
    y: "Y",
    q: "Q",
};

const TAINT_VIEW: View = View {
    a: "A_taint",
    b: "B_taint",
    s: "S_taint",
    y: "Y_taint",
    q: "Q_taint",
};

/// Classification outcome for one module
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleClassification {
    pub control: Vec<NodeId>,
    pub data: Vec<NodeId>,
    pub selects: usize,
}

fn port(node: &Node, name: &str) -> SigSpec {
    node.port_or_empty(name)
}

/// Classify the registers of `module`. Returns `None` for modules without
/// registers or without multiplexer selects.
///
/// An instrumented module is analysed through its taint nodes only; the
/// original primitives are classified when no taint node exists yet.
pub fn classify_module(module: &mut Module) -> Option<ModuleClassification> {
    let mut graph = PropagationGraph::new();
    let mut selects: HashSet<SignalId> = HashSet::new();
    let mut registers: Vec<(NodeId, Vec<SignalId>)> = Vec::new();
    let instrumented = module
        .nodes
        .iter()
        .any(|n| TaintCellKind::from_cell_type(&n.cell_type).is_some());

    for node in &module.nodes {
        let (class, view) = match TaintCellKind::from_cell_type(&node.cell_type) {
            Some(TaintCellKind::Unary) => (PrimitiveClass::Unary, &TAINT_VIEW),
            Some(TaintCellKind::Binary) => (PrimitiveClass::Binary, &TAINT_VIEW),
            Some(TaintCellKind::Mux) => (PrimitiveClass::Mux, &TAINT_VIEW),
            Some(TaintCellKind::Register) => (PrimitiveClass::Register, &TAINT_VIEW),
            Some(TaintCellKind::Memory) => continue,
            None if instrumented => continue,
            None => match classify_primitive(&node.cell_type) {
                Some(class) => (class, &DATA_VIEW),
                None => continue,
            },
        };

        match class {
            PrimitiveClass::Unary => {
                graph.connect_specs(&[&port(node, view.a)], &port(node, view.y));
            }
            PrimitiveClass::Binary => {
                graph.connect_specs(&[&port(node, view.a), &port(node, view.b)], &port(node, view.y));
            }
            PrimitiveClass::Mux => {
                for s in port(node, view.s).signals() {
                    graph.add_signal(s);
                    selects.insert(s);
                }
                graph.connect_specs(&[&port(node, view.a), &port(node, view.b)], &port(node, view.y));
            }
            PrimitiveClass::Register => {
                let q = port(node, view.q).signals();
                for s in &q {
                    graph.add_signal(*s);
                }
                registers.push((node.id, q));
            }
            PrimitiveClass::Memory => {}
        }
    }

    if registers.is_empty() || selects.is_empty() {
        debug!(
            "module {} is skipped: {} registers, {} mux selects",
            module.name,
            registers.len(),
            selects.len()
        );
        return None;
    }

    for assign in &module.assigns {
        graph.connect_assign(&assign.lhs, &assign.rhs);
    }
    debug!(
        "module {}: propagation graph with {} signals, {} edges",
        module.name,
        graph.signal_count(),
        graph.edge_count()
    );

    let mut outcome = ModuleClassification {
        selects: selects.len(),
        ..Default::default()
    };
    for (id, q) in registers {
        let reached = graph.reachable(&q);
        let fanout = reached.iter().filter(|s| selects.contains(*s)).count();
        let node = module.node_mut(id);
        if fanout > 0 {
            debug!(
                "node {} ({}) is a control register (fanout: {}/{})",
                node.name,
                node.cell_type,
                fanout,
                reached.len()
            );
            node.meta.class = Some(RegisterClass::Control);
            node.meta.sink = false;
            outcome.control.push(id);
        } else {
            node.meta.class = Some(RegisterClass::Data);
            outcome.data.push(id);
        }
    }
    Some(outcome)
}

/// `ctrlreg` pass
#[derive(Debug, Default)]
pub struct RegisterClassifier;

impl RegisterClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for RegisterClassifier {
    fn name(&self) -> &str {
        "ctrlreg"
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);

        let (mut control, mut data) = (0, 0);
        for module in design.modules.values_mut() {
            result.modules_visited += 1;
            if !module.nodes.iter().any(|n| is_register(&n.cell_type)) {
                continue;
            }
            if let Some(outcome) = classify_module(module) {
                info!(
                    "module {}: {} control, {} data registers, {} selects",
                    module.name,
                    outcome.control.len(),
                    outcome.data.len(),
                    outcome.selects
                );
                control += outcome.control.len();
                data += outcome.data.len();
                result.modules_changed += 1;
            }
        }

        result.add_extra("control", control);
        result.add_extra("data", data);
        result.record_after(design);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_cell(m: &mut Module, name: &str, ty: &str, ports: &[(&str, SignalId)]) -> NodeId {
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

    #[test]
    fn test_register_reaching_select_is_control() {
        let mut m = Module::new("m");
        let [state, state_n, sel, a, y, data_q, data_d] =
            ["state", "state_n", "sel", "a", "y", "data_q", "data_d"]
                .map(|n| m.add_signal(n, 1).unwrap());

        let ctrl = add_cell(&mut m, "r_state", "$dff", &[("D", state_n), ("Q", state)]);
        let dat = add_cell(&mut m, "r_data", "$dff", &[("D", data_d), ("Q", data_q)]);
        add_cell(&mut m, "inv", "$not", &[("A", state), ("Y", state_n)]);
        let (sn, ss) = (m.sig(sel), m.sig(state_n));
        m.connect(sn, ss).unwrap();
        add_cell(&mut m, "mux", "$mux", &[("A", a), ("B", data_q), ("S", sel), ("Y", y)]);
        m.node_mut(ctrl).meta.sink = true;
        m.node_mut(dat).meta.sink = true;

        let outcome = classify_module(&mut m).unwrap();
        assert_eq!(outcome.control, vec![ctrl]);
        assert_eq!(outcome.data, vec![dat]);
        assert_eq!(m.node(ctrl).meta.class, Some(RegisterClass::Control));
        assert!(!m.node(ctrl).meta.sink);
        assert_eq!(m.node(dat).meta.class, Some(RegisterClass::Data));
        assert!(m.node(dat).meta.sink);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut m = Module::new("m");
        let [q, x, z, sel, y] = ["q", "x", "z", "sel", "y"].map(|n| m.add_signal(n, 1).unwrap());
        let reg = add_cell(&mut m, "r", "$dff", &[("D", z), ("Q", q)]);
        add_cell(&mut m, "g0", "$xor", &[("A", q), ("B", z), ("Y", x)]);
        add_cell(&mut m, "g1", "$and", &[("A", x), ("B", q), ("Y", z)]);
        add_cell(&mut m, "mux", "$mux", &[("A", x), ("B", z), ("S", sel), ("Y", y)]);

        let outcome = classify_module(&mut m).unwrap();
        assert_eq!(outcome.data, vec![reg]);
    }

    #[test]
    fn test_module_without_selects_is_skipped() {
        let mut m = Module::new("m");
        let [d, q] = ["d", "q"].map(|n| m.add_signal(n, 1).unwrap());
        let reg = add_cell(&mut m, "r", "$dff", &[("D", d), ("Q", q)]);
        assert!(classify_module(&mut m).is_none());
        assert_eq!(m.node(reg).meta.class, None);
    }
}

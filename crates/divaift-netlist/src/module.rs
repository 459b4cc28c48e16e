//! Modules, signals and nodes
//!
//! A [`Module`] owns its signals, nodes and point-to-point assignments. Signals
//! and nodes are addressed by dense numeric IDs; name lookups go through caches
//! that are skipped during serialization and rebuilt by
//! [`Module::rebuild_cache`].

use crate::error::{NetlistError, Result};
use crate::meta::{ModuleMeta, NodeMeta, ParamValue, SignalMeta, SignalRole};
use crate::sigspec::{Const, SigChunk, SigSpec};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Signal ID, unique within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalId(pub u32);

/// Node ID, unique within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

/// A named bit-vector net
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub name: String,
    pub width: u32,
    /// `Some` for ports
    pub direction: Option<PortDirection>,
    #[serde(default)]
    pub meta: SignalMeta,
}

impl Signal {
    pub fn is_port(&self) -> bool {
        self.direction.is_some()
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.direction,
            Some(PortDirection::Input) | Some(PortDirection::Inout)
        )
    }

    pub fn is_output(&self) -> bool {
        matches!(
            self.direction,
            Some(PortDirection::Output) | Some(PortDirection::Inout)
        )
    }
}

/// A primitive cell or submodule instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Primitive type (`$`-prefixed) or instantiated module name
    pub cell_type: String,
    #[serde(default)]
    pub params: IndexMap<String, ParamValue>,
    #[serde(default)]
    pub connections: IndexMap<String, SigSpec>,
    #[serde(default)]
    pub meta: NodeMeta,
}

impl Node {
    pub fn port(&self, name: &str) -> Option<&SigSpec> {
        self.connections.get(name)
    }

    /// Connection of `name`, or an empty spec for unconnected ports
    pub fn port_or_empty(&self, name: &str) -> SigSpec {
        self.connections.get(name).cloned().unwrap_or_default()
    }

    pub fn set_port(&mut self, name: impl Into<String>, spec: SigSpec) {
        self.connections.insert(name.into(), spec);
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn param_bool(&self, name: &str) -> bool {
        self.params.get(name).map(ParamValue::as_bool).unwrap_or(false)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    /// Public cell types name modules; primitives start with `$`
    pub fn is_public_type(&self) -> bool {
        !self.cell_type.starts_with('$')
    }
}

/// Point-to-point assignment `lhs = rhs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assign {
    pub lhs: SigSpec,
    pub rhs: SigSpec,
}

/// A named hardware module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub signals: Vec<Signal>,
    pub nodes: Vec<Node>,
    pub assigns: Vec<Assign>,
    /// Port signals in declaration order
    pub ports: Vec<SignalId>,
    #[serde(default)]
    pub meta: ModuleMeta,
    #[serde(skip, default)]
    signal_map: IndexMap<String, SignalId>,
    #[serde(skip, default)]
    node_map: IndexMap<String, NodeId>,
    /// (signal, channel) -> shadow signal
    #[serde(skip, default)]
    shadow_map: HashMap<(SignalId, u32), SignalId>,
    #[serde(skip, default)]
    next_auto: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Vec::new(),
            nodes: Vec::new(),
            assigns: Vec::new(),
            ports: Vec::new(),
            meta: ModuleMeta::default(),
            signal_map: IndexMap::new(),
            node_map: IndexMap::new(),
            shadow_map: HashMap::new(),
            next_auto: 0,
        }
    }

    /// Rebuild lookup caches after deserialization
    pub fn rebuild_cache(&mut self) {
        self.signal_map.clear();
        self.node_map.clear();
        self.shadow_map.clear();

        for signal in &self.signals {
            self.signal_map.insert(signal.name.clone(), signal.id);
            if let SignalRole::Shadow { of, channel } = signal.meta.role {
                self.shadow_map.insert((of, channel), signal.id);
            }
        }
        for node in &self.nodes {
            self.node_map.insert(node.name.clone(), node.id);
        }
        self.next_auto = self.nodes.len() as u32 + self.signals.len() as u32;
    }

    /// Check the invariants `from_json` cannot express: dense IDs, unique
    /// names, and every signal reference inside the module and its width.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| NetlistError::InvalidReference {
            module: self.name.clone(),
            reason,
        };

        let mut names = HashSet::new();
        for (index, signal) in self.signals.iter().enumerate() {
            if signal.id.0 as usize != index {
                return Err(invalid(format!(
                    "signal '{}' has id {} at index {}",
                    signal.name, signal.id.0, index
                )));
            }
            if !names.insert(signal.name.as_str()) {
                return Err(NetlistError::DuplicateSignal {
                    module: self.name.clone(),
                    signal: signal.name.clone(),
                });
            }
        }

        let mut names = HashSet::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.0 as usize != index {
                return Err(invalid(format!(
                    "node '{}' has id {} at index {}",
                    node.name, node.id.0, index
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(NetlistError::DuplicateNode {
                    module: self.name.clone(),
                    node: node.name.clone(),
                });
            }
        }

        let known = |id: SignalId| (id.0 as usize) < self.signals.len();
        for id in &self.ports {
            if !known(*id) {
                return Err(invalid(format!("port list names unknown signal {}", id.0)));
            }
        }
        for signal in &self.signals {
            if let SignalRole::Shadow { of, .. } = signal.meta.role {
                if !known(of) {
                    return Err(invalid(format!(
                        "'{}' shadows unknown signal {}",
                        signal.name, of.0
                    )));
                }
            }
        }

        let check_spec = |spec: &SigSpec, place: &dyn Fn() -> String| -> Result<()> {
            for chunk in spec.chunks() {
                if let SigChunk::Wire {
                    signal,
                    offset,
                    width,
                } = chunk
                {
                    let Some(target) = self.signals.get(signal.0 as usize) else {
                        return Err(invalid(format!("{} uses unknown signal {}", place(), signal.0)));
                    };
                    if u64::from(*offset) + u64::from(*width) > u64::from(target.width) {
                        return Err(invalid(format!(
                            "{} slices bits {}..{} of '{}' ({} bits)",
                            place(),
                            offset,
                            u64::from(*offset) + u64::from(*width),
                            target.name,
                            target.width
                        )));
                    }
                }
            }
            Ok(())
        };

        for node in &self.nodes {
            if let Some(orig) = node.meta.mirrors {
                if orig.0 as usize >= self.nodes.len() {
                    return Err(invalid(format!(
                        "node '{}' mirrors unknown node {}",
                        node.name, orig.0
                    )));
                }
            }
            for (port, spec) in &node.connections {
                check_spec(spec, &|| format!("port {} of node '{}'", port, node.name))?;
            }
        }
        for (index, assign) in self.assigns.iter().enumerate() {
            check_spec(&assign.lhs, &|| format!("assignment {}", index))?;
            check_spec(&assign.rhs, &|| format!("assignment {}", index))?;
            if assign.lhs.width() != assign.rhs.width() {
                return Err(NetlistError::WidthMismatch {
                    module: self.name.clone(),
                    lhs: assign.lhs.width(),
                    rhs: assign.rhs.width(),
                });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// Add an internal signal
    pub fn add_signal(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId> {
        let name = name.into();
        if self.signal_map.contains_key(&name) {
            return Err(NetlistError::DuplicateSignal {
                module: self.name.clone(),
                signal: name,
            });
        }
        let id = SignalId(self.signals.len() as u32);
        self.signal_map.insert(name.clone(), id);
        self.signals.push(Signal {
            id,
            name,
            width,
            direction: None,
            meta: SignalMeta::default(),
        });
        Ok(id)
    }

    /// Add a port signal, appended to the port list
    pub fn add_port(
        &mut self,
        name: impl Into<String>,
        width: u32,
        direction: PortDirection,
    ) -> Result<SignalId> {
        let id = self.add_signal(name, width)?;
        self.signals[id.0 as usize].direction = Some(direction);
        self.ports.push(id);
        Ok(id)
    }

    /// Add an internal signal named `base`, or `base_N` for the first free N
    pub fn add_signal_unique(&mut self, base: &str, width: u32) -> SignalId {
        let mut name = base.to_string();
        let mut suffix = 1;
        while self.signal_map.contains_key(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        // Name is free, insertion cannot fail
        let id = SignalId(self.signals.len() as u32);
        self.signal_map.insert(name.clone(), id);
        self.signals.push(Signal {
            id,
            name,
            width,
            direction: None,
            meta: SignalMeta::default(),
        });
        id
    }

    /// Fresh anonymous signal
    pub fn add_auto_signal(&mut self, prefix: &str, width: u32) -> SignalId {
        let base = self.auto_name(prefix);
        self.add_signal_unique(&base, width)
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id.0 as usize]
    }

    pub fn signal_mut(&mut self, id: SignalId) -> &mut Signal {
        &mut self.signals[id.0 as usize]
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signal_map.get(name).copied()
    }

    /// Full-width reference to a signal
    pub fn sig(&self, id: SignalId) -> SigSpec {
        SigSpec::wire(id, self.signal(id).width)
    }

    /// Promote or demote a signal; call [`Module::fixup_ports`] afterwards
    pub fn set_direction(&mut self, id: SignalId, direction: Option<PortDirection>) {
        self.signal_mut(id).direction = direction;
    }

    /// Re-derive the port list: existing ports keep their order, newly
    /// promoted signals follow in creation order.
    pub fn fixup_ports(&mut self) {
        let signals = &self.signals;
        self.ports
            .retain(|id| signals[id.0 as usize].direction.is_some());
        let promoted: Vec<SignalId> = self
            .signals
            .iter()
            .filter(|s| s.direction.is_some() && !self.ports.contains(&s.id))
            .map(|s| s.id)
            .collect();
        self.ports.extend(promoted);
    }

    pub fn port_ids(&self) -> &[SignalId] {
        &self.ports
    }

    /// Port signal by name
    pub fn find_port(&self, name: &str) -> Option<SignalId> {
        self.find_signal(name)
            .filter(|id| self.signal(*id).direction.is_some())
    }

    // ------------------------------------------------------------------------
    // Shadows
    // ------------------------------------------------------------------------

    /// Shadow of `signal` on `channel`, if one was allocated
    pub fn shadow_of(&self, signal: SignalId, channel: u32) -> Option<SignalId> {
        self.shadow_map.get(&(signal, channel)).copied()
    }

    /// Record `shadow` as the companion of `signal` on `channel`
    pub fn bind_shadow(&mut self, signal: SignalId, channel: u32, shadow: SignalId) {
        trace!(
            "[SHADOW] {}.{} ch{} -> {}",
            self.name,
            self.signal(signal).name,
            channel,
            self.signal(shadow).name
        );
        self.signal_mut(shadow).meta.role = SignalRole::Shadow {
            of: signal,
            channel,
        };
        self.shadow_map.insert((signal, channel), shadow);
    }

    pub fn shadow_count(&self) -> usize {
        self.shadow_map.len()
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    pub fn add_node(&mut self, name: impl Into<String>, cell_type: impl Into<String>) -> Result<NodeId> {
        let name = name.into();
        if self.node_map.contains_key(&name) {
            return Err(NetlistError::DuplicateNode {
                module: self.name.clone(),
                node: name,
            });
        }
        Ok(self.push_node(name, cell_type.into()))
    }

    /// Fresh anonymous node
    pub fn add_auto_node(&mut self, cell_type: impl Into<String>) -> NodeId {
        let cell_type = cell_type.into();
        let mut name = self.auto_name("$auto");
        while self.node_map.contains_key(&name) {
            name = self.auto_name("$auto");
        }
        self.push_node(name, cell_type)
    }

    fn push_node(&mut self, name: String, cell_type: String) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.node_map.insert(name.clone(), id);
        self.nodes.push(Node {
            id,
            name,
            cell_type,
            params: IndexMap::new(),
            connections: IndexMap::new(),
            meta: NodeMeta::default(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_map.get(name).copied()
    }

    /// Snapshot of node IDs, safe to iterate while adding nodes
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Add a two-operand cell driving a fresh `y_width` signal, returning it
    pub fn add_binop(&mut self, cell_type: &str, a: SigSpec, b: SigSpec, y_width: u32) -> SigSpec {
        let y = self.add_auto_signal("$auto$y", y_width);
        let y_spec = self.sig(y);
        let node = self.add_auto_node(cell_type);
        let node = self.node_mut(node);
        node.set_param("A_SIGNED", false);
        node.set_param("B_SIGNED", false);
        node.set_param("A_WIDTH", a.width());
        node.set_param("B_WIDTH", b.width());
        node.set_param("Y_WIDTH", y_width);
        node.set_port("A", a);
        node.set_port("B", b);
        node.set_port("Y", y_spec.clone());
        y_spec
    }

    // ------------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------------

    /// Record `lhs = rhs`
    pub fn connect(&mut self, lhs: SigSpec, rhs: SigSpec) -> Result<()> {
        if lhs.width() != rhs.width() {
            return Err(NetlistError::WidthMismatch {
                module: self.name.clone(),
                lhs: lhs.width(),
                rhs: rhs.width(),
            });
        }
        self.assigns.push(Assign { lhs, rhs });
        Ok(())
    }

    /// Tie `signal` to constant zero
    pub fn tie_zero(&mut self, signal: SignalId) {
        let width = self.signal(signal).width;
        self.assigns.push(Assign {
            lhs: SigSpec::wire(signal, width),
            rhs: SigSpec::constant(Const::zeros(width)),
        });
    }

    fn auto_name(&mut self, prefix: &str) -> String {
        self.next_auto += 1;
        format!("{}${}", prefix, self.next_auto)
    }
}

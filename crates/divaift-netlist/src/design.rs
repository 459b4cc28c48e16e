//! Hierarchical design
//!
//! A [`Design`] is a set of modules keyed by name. Nodes whose cell type names
//! another module in the design are submodule instances; the instance graph
//! must be acyclic.

use crate::error::{NetlistError, Result};
use crate::module::{Module, NodeId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A complete netlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Design {
    /// Explicit top module, if known
    #[serde(default)]
    pub top: Option<String>,
    pub modules: IndexMap<String, Module>,
}

/// Size snapshot of a design
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DesignStats {
    pub modules: usize,
    pub signals: usize,
    pub nodes: usize,
    pub assigns: usize,
    pub ports: usize,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a design from JSON, validate it and rebuild every module cache
    pub fn from_json(json: &str) -> Result<Self> {
        let mut design: Design = serde_json::from_str(json)?;
        design.validate()?;
        design.rebuild_cache();
        Ok(design)
    }

    /// Structural checks on a deserialized design
    pub fn validate(&self) -> Result<()> {
        for (key, module) in &self.modules {
            if key != &module.name {
                return Err(NetlistError::InvalidReference {
                    module: module.name.clone(),
                    reason: format!("stored under key '{}'", key),
                });
            }
            module.validate()?;
        }
        if let Some(top) = &self.top {
            if !self.modules.contains_key(top) {
                return Err(NetlistError::ModuleNotFound(top.clone()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let design = Self::from_json(&contents)?;
        debug!(
            "Loaded {} modules from {}",
            design.modules.len(),
            path.display()
        );
        Ok(design)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn rebuild_cache(&mut self) {
        for module in self.modules.values_mut() {
            module.rebuild_cache();
        }
    }

    pub fn add_module(&mut self, mut module: Module) -> Result<()> {
        if self.modules.contains_key(&module.name) {
            return Err(NetlistError::DuplicateModule(module.name));
        }
        module.rebuild_cache();
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Like [`Design::module`] but fails on unknown names
    pub fn expect_module(&self, name: &str) -> Result<&Module> {
        self.modules
            .get(name)
            .ok_or_else(|| NetlistError::ModuleNotFound(name.to_string()))
    }

    pub fn expect_module_mut(&mut self, name: &str) -> Result<&mut Module> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| NetlistError::ModuleNotFound(name.to_string()))
    }

    /// Module names in definition order
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Submodule instances of `module`: (node, callee name)
    pub fn instances_of(&self, module: &Module) -> Vec<(NodeId, String)> {
        module
            .nodes
            .iter()
            .filter(|n| self.modules.contains_key(&n.cell_type))
            .map(|n| (n.id, n.cell_type.clone()))
            .collect()
    }

    /// Explicit top, or the single module no other module instantiates
    pub fn top_module(&self) -> Result<String> {
        if let Some(top) = &self.top {
            self.expect_module(top)?;
            return Ok(top.clone());
        }

        let instantiated: IndexSet<&str> = self
            .modules
            .values()
            .flat_map(|m| m.nodes.iter())
            .map(|n| n.cell_type.as_str())
            .filter(|t| self.modules.contains_key(*t))
            .collect();
        let roots: Vec<&String> = self
            .modules
            .keys()
            .filter(|name| !instantiated.contains(name.as_str()))
            .collect();

        match roots.as_slice() {
            [single] => Ok((*single).clone()),
            [] => Err(NetlistError::NoTopModule("every module is instantiated".to_string())),
            many => Err(NetlistError::NoTopModule(format!(
                "{} candidates ({})",
                many.len(),
                many.iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// All modules, callees before callers.
    ///
    /// Iterative depth-first post-order over the instance graph; each module
    /// appears once no matter how often it is instantiated.
    pub fn bottom_up_order(&self) -> Result<Vec<String>> {
        let roots = self.module_names();
        self.bottom_up_from(&roots)
    }

    /// Modules reachable from `roots`, callees before callers
    pub fn bottom_up_from(&self, roots: &[String]) -> Result<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Open,
            Closed,
        }

        let mut marks: IndexMap<&str, Mark> = IndexMap::new();
        let mut order = Vec::new();

        for root in roots {
            let root = self.expect_module(root)?;
            if marks.contains_key(root.name.as_str()) {
                continue;
            }
            // (module, index of next child to visit)
            let mut stack: Vec<(&Module, usize)> = vec![(root, 0)];
            marks.insert(root.name.as_str(), Mark::Open);

            while let Some((module, next)) = stack.last_mut() {
                let module: &Module = *module;
                let child = module.nodes[*next..]
                    .iter()
                    .position(|n| self.modules.contains_key(&n.cell_type))
                    .map(|i| *next + i);

                match child {
                    Some(idx) => {
                        *next = idx + 1;
                        let callee = &self.modules[module.nodes[idx].cell_type.as_str()];
                        match marks.get(callee.name.as_str()) {
                            Some(Mark::Open) => {
                                return Err(NetlistError::RecursiveInstantiation(
                                    callee.name.clone(),
                                ))
                            }
                            Some(Mark::Closed) => {}
                            None => {
                                marks.insert(callee.name.as_str(), Mark::Open);
                                stack.push((callee, 0));
                            }
                        }
                    }
                    None => {
                        marks.insert(module.name.as_str(), Mark::Closed);
                        order.push(module.name.clone());
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }

    pub fn stats(&self) -> DesignStats {
        let mut stats = DesignStats {
            modules: self.modules.len(),
            ..Default::default()
        };
        for module in self.modules.values() {
            stats.signals += module.signals.len();
            stats.nodes += module.nodes.len();
            stats.assigns += module.assigns.len();
            stats.ports += module.ports.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::PortDirection;

    fn design_with_chain() -> Design {
        // top -> mid -> leaf, top -> leaf
        let mut design = Design::new();
        let leaf = Module::new("leaf");
        let mut mid = Module::new("mid");
        mid.add_node("u_leaf", "leaf").unwrap();
        let mut top = Module::new("top");
        top.add_node("u_mid", "mid").unwrap();
        top.add_node("u_leaf2", "leaf").unwrap();
        top.add_node("g0", "$and").unwrap();
        design.add_module(top).unwrap();
        design.add_module(mid).unwrap();
        design.add_module(leaf).unwrap();
        design
    }

    #[test]
    fn test_bottom_up_order_visits_callees_first() {
        let design = design_with_chain();
        let order = design.bottom_up_order().unwrap();
        assert_eq!(order, vec!["leaf", "mid", "top"]);
    }

    #[test]
    fn test_recursive_instantiation_is_rejected() {
        let mut design = Design::new();
        let mut a = Module::new("a");
        a.add_node("u_b", "b").unwrap();
        let mut b = Module::new("b");
        b.add_node("u_a", "a").unwrap();
        design.add_module(a).unwrap();
        design.add_module(b).unwrap();
        assert!(matches!(
            design.bottom_up_order(),
            Err(NetlistError::RecursiveInstantiation(_))
        ));
    }

    #[test]
    fn test_top_module_detection() {
        let design = design_with_chain();
        assert_eq!(design.top_module().unwrap(), "top");

        let mut two_roots = Design::new();
        two_roots.add_module(Module::new("x")).unwrap();
        two_roots.add_module(Module::new("y")).unwrap();
        assert!(two_roots.top_module().is_err());
        two_roots.top = Some("y".to_string());
        assert_eq!(two_roots.top_module().unwrap(), "y");
    }

    #[test]
    fn test_json_round_trip_rebuilds_lookups() {
        let mut design = Design::new();
        let mut m = Module::new("m");
        m.add_port("clk", 1, PortDirection::Input).unwrap();
        m.add_signal("state", 4).unwrap();
        design.add_module(m).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        design.save(file.path()).unwrap();
        let loaded = Design::load(file.path()).unwrap();
        let m = loaded.module("m").unwrap();
        assert!(m.find_port("clk").is_some());
        assert!(m.find_port("state").is_none());
        assert_eq!(loaded.stats().signals, 2);
    }
}

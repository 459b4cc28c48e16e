//! IFT rule hook
//!
//! Tags every submodule instance with an `IFT_RULE` parameter holding a
//! placeholder that the simulation flow substitutes with the propagation rule
//! of that instance.

use crate::error::Result;
use crate::passes::{Pass, PassResult};
use divaift_netlist::Design;
use tracing::debug;

pub const IFT_RULE_PARAM: &str = "IFT_RULE";
pub const IFT_RULE_PLACEHOLDER: &str = "REPLACE_ME_TO_IFT_RULE";

/// `thook` pass
#[derive(Debug, Clone)]
pub struct RuleHook {
    rule: String,
}

impl Default for RuleHook {
    fn default() -> Self {
        Self::new(IFT_RULE_PLACEHOLDER)
    }
}

impl RuleHook {
    pub fn new(rule: impl Into<String>) -> Self {
        Self { rule: rule.into() }
    }
}

impl Pass for RuleHook {
    fn name(&self) -> &str {
        "thook"
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);

        let mut hooked = 0;
        for module in design.modules.values_mut() {
            result.modules_visited += 1;
            if module.meta.ignore {
                continue;
            }
            let mut changed = false;
            for node in module.nodes.iter_mut().filter(|n| n.is_public_type()) {
                node.set_param(IFT_RULE_PARAM, self.rule.as_str());
                debug!("{}: hooked {}", module.name, node.name);
                hooked += 1;
                changed = true;
            }
            if changed {
                result.modules_changed += 1;
            }
        }

        result.add_extra("hooked", hooked);
        result.record_after(design);
        Ok(result)
    }
}

//! Queue keep-signal marker
//!
//! Generated queue modules expose their occupancy through a fixed set of
//! internal signals. Those signals are marked `keep` so they survive
//! optimisation and can feed liveness operands later.

use crate::error::Result;
use crate::passes::{Pass, PassResult};
use divaift_netlist::{Design, Module};
use tracing::{debug, info};

/// Name prefixes of generated queue modules
pub const QUEUE_MODULE_PREFIXES: &[&str] = &["Queue", "XS_Queue"];

pub const QUEUE_ENQ_PTR: &str = "enq_ptr_value";
pub const QUEUE_DEQ_PTR: &str = "deq_ptr_value";
pub const QUEUE_MAYBE_FULL: &str = "maybe_full";
pub const QUEUE_EMPTY: &str = "empty";

const QUEUE_KEEP_SIGNALS: &[&str] = &[QUEUE_MAYBE_FULL, QUEUE_EMPTY, QUEUE_ENQ_PTR, QUEUE_DEQ_PTR];

pub fn is_queue_module(name: &str) -> bool {
    QUEUE_MODULE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Mark the queue bookkeeping signals of `module`; returns how many were found
pub fn mark_queue_signals(module: &mut Module) -> usize {
    if !is_queue_module(&module.name) {
        return 0;
    }
    debug!("Queue module {}", module.name);

    let mut marked = 0;
    for name in QUEUE_KEEP_SIGNALS {
        if let Some(id) = module.find_signal(name) {
            module.signal_mut(id).meta.keep = true;
            debug!("  keep {}", name);
            marked += 1;
        }
    }
    marked
}

/// `keep-queue` pass
#[derive(Debug, Default)]
pub struct KeepQueueSignals;

impl KeepQueueSignals {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for KeepQueueSignals {
    fn name(&self) -> &str {
        "keep-queue"
    }

    fn run(&mut self, design: &mut Design) -> Result<PassResult> {
        let mut result = PassResult::new(self.name());
        result.record_before(design);

        let mut marked = 0;
        for module in design.modules.values_mut() {
            result.modules_visited += 1;
            let n = mark_queue_signals(module);
            if n > 0 {
                result.modules_changed += 1;
                marked += n;
            }
        }
        info!("Marked {} queue signals as keep", marked);

        result.add_extra("kept", marked);
        result.record_after(design);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_queue_modules_are_marked() {
        let mut design = Design::new();
        let mut q = Module::new("XS_Queue_3");
        q.add_signal("maybe_full", 1).unwrap();
        q.add_signal("enq_ptr_value", 2).unwrap();
        q.add_signal("data", 8).unwrap();
        let mut other = Module::new("Rob");
        other.add_signal("maybe_full", 1).unwrap();
        design.add_module(q).unwrap();
        design.add_module(other).unwrap();

        let result = KeepQueueSignals::new().run(&mut design).unwrap();
        assert_eq!(result.modules_changed, 1);
        assert_eq!(result.extra("kept"), Some("2"));

        let q = design.module("XS_Queue_3").unwrap();
        let keep: Vec<&str> = q
            .signals
            .iter()
            .filter(|s| s.meta.keep)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(keep, vec!["maybe_full", "enq_ptr_value"]);
        let rob = design.module("Rob").unwrap();
        assert!(rob.signals.iter().all(|s| !s.meta.keep));
    }
}

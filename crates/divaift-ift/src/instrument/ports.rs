//! Port instrumentation

use crate::shadow::{IgnoreList, ShadowAllocator};
use divaift_netlist::{Module, PortDirection};
use tracing::debug;

/// Give every boundary signal one shadow port per channel.
///
/// Opaque modules accept no taint: their input shadows stay internal and are
/// tied to zero, their outputs get no shadow at all.
pub(super) fn instrument_ports(module: &mut Module, ignore: &IgnoreList, channels: u32) -> usize {
    let alloc = ShadowAllocator::new(ignore);
    let opaque = module.meta.opaque;
    let ports: Vec<_> = module.port_ids().to_vec();

    let mut added = 0;
    for (idx, port) in ports.into_iter().enumerate() {
        if !alloc.is_shadowable(module, port) {
            continue;
        }
        let Some(direction) = module.signal(port).direction else {
            continue;
        };
        debug!(
            "\t(p:{}) instrument {:?} port: {}",
            idx,
            direction,
            module.signal(port).name
        );

        for ch in 0..channels {
            match (opaque, direction) {
                (true, PortDirection::Output) => {}
                (true, _) => {
                    let shadow = alloc.shadow_signal(module, port, ch);
                    module.tie_zero(shadow);
                }
                (false, direction) => {
                    let shadow = alloc.shadow_signal(module, port, ch);
                    module.set_direction(shadow, Some(direction));
                    added += 1;
                }
            }
        }
    }
    module.fixup_ports();
    added
}

//! Connection instrumentation

use crate::error::Result;
use crate::shadow::{IgnoreList, ShadowAllocator};
use divaift_netlist::{Module, NetlistError, SigBit, SigSpec};
use tracing::trace;

/// Mirror every recorded assignment onto each channel.
///
/// Bits whose destination has no shadow (ignored or constant) are dropped
/// from the mirrored assignment. An assignment whose sides differ in width is
/// rejected before anything is mirrored from it.
pub(super) fn instrument_connections(
    module: &mut Module,
    ignore: &IgnoreList,
    channels: u32,
) -> Result<usize> {
    let alloc = ShadowAllocator::new(ignore);
    let assigns = module.assigns.clone();

    let mut added = 0;
    for assign in &assigns {
        if assign.lhs.width() != assign.rhs.width() {
            return Err(NetlistError::WidthMismatch {
                module: module.name.clone(),
                lhs: assign.lhs.width(),
                rhs: assign.rhs.width(),
            }
            .into());
        }
        for ch in 0..channels {
            let lhs = alloc.shadow(module, &assign.lhs, ch);
            let rhs = alloc.shadow(module, &assign.rhs, ch);
            if lhs.is_fully_const() {
                continue;
            }

            let (lhs_bits, rhs_bits): (Vec<SigBit>, Vec<SigBit>) = lhs
                .bits()
                .into_iter()
                .zip(rhs.bits())
                .filter(|(l, _)| matches!(l, SigBit::Wire(..)))
                .unzip();
            let (lhs, rhs) = (SigSpec::from_bits(lhs_bits), SigSpec::from_bits(rhs_bits));
            trace!("[CONN] {}: {:?} = {:?}", module.name, lhs, rhs);
            module.connect(lhs, rhs)?;
            added += 1;
        }
    }
    Ok(added)
}

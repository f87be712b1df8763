//! Pending-update slot selection

use sdboot_hal::SlotStorage;

use crate::config::BootConfig;
use crate::log;

/// Candidate update image on removable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// Slots in priority order
    pub const PRIORITY: [Slot; 2] = [Slot::A, Slot::B];

    /// Human-readable name
    pub fn label(self) -> &'static str {
        match self {
            Slot::A => "A",
            Slot::B => "B",
        }
    }
}

/// Find the pending slot and consume its flag
///
/// Flags are checked in priority order. Only the flag of the selected slot
/// is deleted; a lower-priority flag stays on the card. A flag that cannot
/// be deleted is logged and the slot is still selected.
pub fn select_pending_slot<S: SlotStorage>(storage: &mut S, config: &BootConfig) -> Option<Slot> {
    for slot in Slot::PRIORITY {
        let flag = config.slot(slot).flag;
        if !storage.flag_exists(flag) {
            continue;
        }

        if let Err(e) = storage.delete_flag(flag) {
            log::warn!("Could not delete flag {=str}: {}", flag, e);
        }
        log::info!("Update pending from slot {=str}", slot.label());
        return Some(slot);
    }
    None
}

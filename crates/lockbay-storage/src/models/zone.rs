use serde::{Deserialize, Serialize};

use lockbay_core::constants::COILS_PER_CARD;
use lockbay_core::types::SlaveAddress;
use lockbay_core::zone::Zone;

/// Assembled zone configuration for one kiosk.
///
/// `zones` come back in configured order with ranges and card lists in
/// their configured order; `spare_cards` are enabled inventory cards no
/// zone has claimed yet, in slave-address order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub zones: Vec<Zone>,
    pub spare_cards: Vec<SlaveAddress>,
}

impl ZoneLayout {
    /// Layout with no zones and no cards.
    pub fn empty() -> Self {
        Self {
            zones: Vec::new(),
            spare_cards: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.spare_cards.is_empty()
    }

    /// Every card on the kiosk bus, zoned or spare, in slave-address
    /// order. This is the flat list the legacy mapper path uses.
    pub fn full_inventory(&self) -> Vec<SlaveAddress> {
        let mut cards: Vec<SlaveAddress> = self
            .zones
            .iter()
            .flat_map(|zone| zone.relay_cards.iter().copied())
            .chain(self.spare_cards.iter().copied())
            .collect();
        cards.sort_by_key(SlaveAddress::as_u8);
        cards.dedup();
        cards
    }

    /// Physical channel capacity of the whole inventory.
    pub fn capacity(&self) -> u16 {
        let cards = self.full_inventory().len().min(usize::from(u16::MAX)) as u16;
        cards.saturating_mul(COILS_PER_CARD)
    }
}

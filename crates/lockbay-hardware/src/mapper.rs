//! Locker-to-coil address resolution.
//!
//! A locker number is a logical id; the bus only understands a slave
//! address and a relay channel. Resolution walks the zone table first:
//! the locker's 1-based position within its zone (counting across all
//! of the zone's ranges) selects a card from the zone's card list and a
//! channel on that card.
//!
//! ```text
//! position  = 1-based offset of the locker within its zone
//! card      = zone.relay_cards[(position - 1) / 16]
//! channel   = ((position - 1) % 16) + 1
//! ```
//!
//! A locker no enabled zone covers takes the legacy non-zoned path:
//! the locker id itself is the position, applied against the kiosk's
//! flat card inventory. Deployments migrate to zones incrementally, so
//! both paths stay live on the same kiosk.

use lockbay_core::constants::COILS_PER_CARD;
use lockbay_core::zone::{Zone, find_zone};
use lockbay_core::{CoilAddress, LockerId, SlaveAddress};

use crate::error::{HardwareError, Result};

/// A resolved relay channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoilTarget {
    pub slave: SlaveAddress,
    pub coil: CoilAddress,
}

impl std::fmt::Display for CoilTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slave {} coil {}", self.slave, self.coil)
    }
}

/// Resolves locker ids to relay channels.
#[derive(Debug, Clone)]
pub struct CoilMapper {
    zones: Vec<Zone>,
    fallback_cards: Vec<SlaveAddress>,
}

impl CoilMapper {
    /// Create a mapper from the zone table and the flat card inventory.
    ///
    /// The inventory backs every locker no enabled zone covers.
    pub fn new(zones: Vec<Zone>, fallback_cards: Vec<SlaveAddress>) -> Self {
        Self {
            zones,
            fallback_cards,
        }
    }

    /// Whether any enabled zone is configured.
    pub fn is_zoned(&self) -> bool {
        self.zones.iter().any(|zone| zone.enabled)
    }

    /// Resolve a locker id to the relay channel that drives it.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Unmapped`] when the locker's position
    /// points past its zone's card list, or when no zone covers it and
    /// the flat inventory is too short.
    pub fn resolve(&self, locker: LockerId) -> Result<CoilTarget> {
        match find_zone(&self.zones, locker) {
            Some(zone) => {
                let position = zone.position_of(locker).ok_or_else(|| {
                    HardwareError::unmapped(locker.as_u16(), format!("not in zone '{}'", zone.name))
                })?;
                Self::target_at(position, &zone.relay_cards, locker).map_err(|err| match err {
                    HardwareError::Unmapped { locker, .. } => HardwareError::unmapped(
                        locker,
                        format!("zone '{}' has no card for position {position}", zone.name),
                    ),
                    other => other,
                })
            }
            None => Self::target_at(locker.as_u16(), &self.fallback_cards, locker),
        }
    }

    fn target_at(position: u16, cards: &[SlaveAddress], locker: LockerId) -> Result<CoilTarget> {
        let card_index = usize::from((position - 1) / COILS_PER_CARD);
        let channel = ((position - 1) % COILS_PER_CARD) + 1;

        let slave = *cards.get(card_index).ok_or_else(|| {
            HardwareError::unmapped(
                locker.as_u16(),
                format!("card index {card_index} past the {} configured cards", cards.len()),
            )
        })?;
        let coil = CoilAddress::new(channel as u8)
            .map_err(|_| HardwareError::unmapped(locker.as_u16(), "channel out of range"))?;

        Ok(CoilTarget { slave, coil })
    }
}

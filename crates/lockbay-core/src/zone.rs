//! Zone model and range algebra.
//!
//! A zone names a set of locker id ranges and the relay cards serving
//! them. The mapper resolves a locker to `(slave, coil)` through its
//! zone; the sync service grows the last zone when relay capacity is
//! added. Everything here is pure - persistence and triggering live in
//! the storage and server crates.
//!
//! Invariants enforced by [`validate_zones`]:
//! - ranges inside a zone are ascending and non-overlapping (adjacent
//!   ranges are merged by [`Zone::normalize`]),
//! - ranges across *enabled* zones are pairwise disjoint,
//! - an enabled zone holds enough relay cards for every position it
//!   claims, and no relay card serves two enabled zones.

use serde::{Deserialize, Serialize};

use crate::constants::{COILS_PER_CARD, MAX_LOCKER_ID};
use crate::error::{Error, Result};
use crate::types::{LockerId, SlaveAddress};

/// Inclusive range of locker ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u16, u16)", into = "(u16, u16)")]
pub struct LockerRange {
    start: u16,
    end: u16,
}

impl LockerRange {
    /// Create a range with validation.
    ///
    /// # Errors
    /// Returns `Error::ZoneConfig` when `start` is 0, `end` is below
    /// `start`, or `end` exceeds [`MAX_LOCKER_ID`].
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 || end < start || end > MAX_LOCKER_ID {
            return Err(Error::ZoneConfig(format!(
                "Invalid locker range [{start},{end}]"
            )));
        }
        Ok(LockerRange { start, end })
    }

    #[must_use]
    pub fn start(&self) -> u16 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of lockers covered.
    #[must_use]
    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }

    #[must_use]
    pub fn contains(&self, id: u16) -> bool {
        (self.start..=self.end).contains(&id)
    }

    #[must_use]
    pub fn overlaps(&self, other: &LockerRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Merge with an overlapping or directly adjacent range.
    #[must_use]
    pub fn merge(&self, other: &LockerRange) -> Option<LockerRange> {
        let adjacent = self.end.checked_add(1) == Some(other.start)
            || other.end.checked_add(1) == Some(self.start);
        if self.overlaps(other) || adjacent {
            Some(LockerRange {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            })
        } else {
            None
        }
    }
}

impl TryFrom<(u16, u16)> for LockerRange {
    type Error = Error;

    fn try_from(value: (u16, u16)) -> Result<Self> {
        LockerRange::new(value.0, value.1)
    }
}

impl From<LockerRange> for (u16, u16) {
    fn from(range: LockerRange) -> Self {
        (range.start, range.end)
    }
}

impl std::fmt::Display for LockerRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

/// A named group of locker ranges served by specific relay cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub ranges: Vec<LockerRange>,
    pub relay_cards: Vec<SlaveAddress>,
    pub enabled: bool,
}

impl Zone {
    #[must_use]
    pub fn contains(&self, locker: LockerId) -> bool {
        let id = locker.as_u16();
        self.ranges.iter().any(|r| r.contains(id))
    }

    /// 1-based position of `locker` within this zone's ranges, counted
    /// across ranges in ascending order.
    ///
    /// Position drives the card/coil math: position 17 is the first coil
    /// of the zone's second relay card.
    #[must_use]
    pub fn position_of(&self, locker: LockerId) -> Option<u16> {
        let id = locker.as_u16();
        let mut offset: u16 = 0;
        for range in &self.ranges {
            if range.contains(id) {
                return Some(offset + (id - range.start()) + 1);
            }
            offset += range.count();
        }
        None
    }

    /// Number of lockers this zone covers.
    #[must_use]
    pub fn covered_count(&self) -> u16 {
        self.ranges
            .iter()
            .fold(0u16, |acc, r| acc.saturating_add(r.count()))
    }

    /// Positions this zone's relay cards can serve.
    #[must_use]
    pub fn capacity(&self) -> u16 {
        u16::try_from(self.relay_cards.len())
            .unwrap_or(u16::MAX)
            .saturating_mul(COILS_PER_CARD)
    }

    /// Highest locker id in any range, if the zone has ranges.
    #[must_use]
    pub fn max_end(&self) -> Option<u16> {
        self.ranges.iter().map(LockerRange::end).max()
    }

    /// Sort ranges ascending and merge overlapping or adjacent ones.
    pub fn normalize(&mut self) {
        self.ranges.sort_by_key(LockerRange::start);
        let mut merged: Vec<LockerRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) => {
                    if let Some(joined) = last.merge(&range) {
                        *last = joined;
                    } else {
                        merged.push(range);
                    }
                }
                None => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    /// Intra-zone validation.
    ///
    /// # Errors
    /// Returns `Error::ZoneConfig` when ranges are out of order or
    /// overlap, when an enabled zone claims positions without enough
    /// relay cards, or when the card list holds duplicates.
    pub fn validate(&self) -> Result<()> {
        for pair in self.ranges.windows(2) {
            if pair[1].start() <= pair[0].end() {
                return Err(Error::ZoneConfig(format!(
                    "Zone '{}' ranges {} and {} overlap or are out of order",
                    self.name, pair[0], pair[1]
                )));
            }
        }
        let mut cards = self.relay_cards.clone();
        cards.sort_unstable();
        cards.dedup();
        if cards.len() != self.relay_cards.len() {
            return Err(Error::ZoneConfig(format!(
                "Zone '{}' lists a relay card twice",
                self.name
            )));
        }
        if self.enabled && self.covered_count() > self.capacity() {
            return Err(Error::ZoneConfig(format!(
                "Zone '{}' covers {} lockers but its {} card(s) serve only {}",
                self.name,
                self.covered_count(),
                self.relay_cards.len(),
                self.capacity()
            )));
        }
        Ok(())
    }
}

/// Cross-zone validation: per-zone checks plus the disjointness and
/// card-exclusivity invariants over enabled zones.
///
/// # Errors
/// Returns `Error::ZoneConfig` naming the conflicting zones.
pub fn validate_zones(zones: &[Zone]) -> Result<()> {
    for zone in zones {
        zone.validate()?;
    }
    let enabled: Vec<&Zone> = zones.iter().filter(|z| z.enabled).collect();
    for (i, a) in enabled.iter().enumerate() {
        for b in &enabled[i + 1..] {
            for ra in &a.ranges {
                for rb in &b.ranges {
                    if ra.overlaps(rb) {
                        return Err(Error::ZoneConfig(format!(
                            "Zones '{}' and '{}' overlap on {} / {}",
                            a.name, b.name, ra, rb
                        )));
                    }
                }
            }
            if let Some(shared) = a.relay_cards.iter().find(|c| b.relay_cards.contains(c)) {
                return Err(Error::ZoneConfig(format!(
                    "Relay card {} assigned to both '{}' and '{}'",
                    shared, a.name, b.name
                )));
            }
        }
    }
    Ok(())
}

/// First enabled zone containing `locker`.
#[must_use]
pub fn find_zone(zones: &[Zone], locker: LockerId) -> Option<&Zone> {
    zones
        .iter()
        .filter(|z| z.enabled)
        .find(|z| z.contains(locker))
}

/// Highest locker id covered by any enabled zone (0 when none).
#[must_use]
pub fn max_covered(zones: &[Zone]) -> u16 {
    zones
        .iter()
        .filter(|z| z.enabled)
        .filter_map(Zone::max_end)
        .max()
        .unwrap_or(0)
}

/// Outcome of planning a zone extension against the relay inventory.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionPlan {
    /// Coverage already matches or exceeds capacity (or zones are not in
    /// use at all); nothing to change.
    Unchanged,
    /// The last enabled zone grows to cover new capacity.
    Extended {
        zones: Vec<Zone>,
        summary: ExtensionSummary,
    },
}

/// What an applied extension did, for logging and the sync audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionSummary {
    pub zone_name: String,
    /// Coverage before the extension.
    pub previous_end: u16,
    /// The resulting final range of the extended zone.
    pub new_range: LockerRange,
    /// Relay cards appended to the zone's list, in slave order.
    pub added_cards: Vec<SlaveAddress>,
}

/// Plan the automatic extension of the last enabled zone.
///
/// `inventory` is the kiosk's enabled relay-card list; total capacity is
/// `inventory.len() * 16` positions. When capacity exceeds the highest
/// covered locker id, the zone owning that id grows to cover the gap -
/// its final range is extended in place (merged, never a disjoint
/// fragment) and any additionally required cards are appended from the
/// unassigned inventory in slave order.
///
/// The input `zones` slice is never mutated; the plan carries the new
/// configuration only after it passed [`validate_zones`].
///
/// # Errors
/// Returns `Error::ZoneConfig` when the inventory cannot supply the cards
/// the extension needs, or when the extended configuration fails
/// validation. The caller keeps the prior configuration in both cases.
pub fn plan_extension(zones: &[Zone], inventory: &[SlaveAddress]) -> Result<ExtensionPlan> {
    let capacity = u16::try_from(inventory.len())
        .unwrap_or(u16::MAX)
        .saturating_mul(COILS_PER_CARD)
        .min(MAX_LOCKER_ID);

    if !zones.iter().any(|z| z.enabled) {
        return Ok(ExtensionPlan::Unchanged);
    }
    let coverage = max_covered(zones);
    if capacity <= coverage {
        return Ok(ExtensionPlan::Unchanged);
    }

    let mut planned: Vec<Zone> = zones.to_vec();
    let target_idx = planned
        .iter()
        .enumerate()
        .filter(|(_, z)| z.enabled)
        .filter(|(_, z)| coverage == 0 || z.max_end() == Some(coverage))
        .map(|(i, _)| i)
        .next_back()
        .ok_or_else(|| Error::ZoneConfig("No enabled zone to extend".to_string()))?;

    let assigned: Vec<SlaveAddress> = planned.iter().flat_map(|z| z.relay_cards.clone()).collect();

    let zone = &mut planned[target_idx];
    match zone.ranges.iter_mut().find(|r| r.end() == coverage) {
        Some(last) => *last = LockerRange::new(last.start(), capacity)?,
        None => zone.ranges.push(LockerRange::new(coverage + 1, capacity)?),
    }
    zone.normalize();

    let needed_cards = zone.covered_count().div_ceil(COILS_PER_CARD) as usize;
    let mut added_cards = Vec::new();
    let mut spare = inventory
        .iter()
        .filter(|c| !assigned.contains(c))
        .copied()
        .collect::<Vec<_>>();
    spare.sort_unstable();
    let mut spare = spare.into_iter();
    while zone.relay_cards.len() < needed_cards {
        let card = spare.next().ok_or_else(|| {
            Error::ZoneConfig(format!(
                "Zone '{}' needs {} card(s) but the inventory has no spare left",
                zone.name, needed_cards
            ))
        })?;
        zone.relay_cards.push(card);
        added_cards.push(card);
    }

    let summary = ExtensionSummary {
        zone_name: zone.name.clone(),
        previous_end: coverage,
        new_range: *zone
            .ranges
            .iter()
            .max_by_key(|r| r.end())
            .ok_or_else(|| Error::ZoneConfig("Extended zone lost its ranges".to_string()))?,
        added_cards,
    };

    validate_zones(&planned)?;
    Ok(ExtensionPlan::Extended {
        zones: planned,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    fn locker(id: u16) -> LockerId {
        LockerId::new(id).unwrap()
    }

    fn zone(name: &str, ranges: &[(u16, u16)], cards: &[u8], enabled: bool) -> Zone {
        Zone {
            name: name.to_string(),
            ranges: ranges
                .iter()
                .map(|&(s, e)| LockerRange::new(s, e).unwrap())
                .collect(),
            relay_cards: cards.iter().map(|&c| slave(c)).collect(),
            enabled,
        }
    }

    #[test]
    fn test_range_validation() {
        assert!(LockerRange::new(1, 32).is_ok());
        assert!(LockerRange::new(5, 5).is_ok());
        assert!(LockerRange::new(0, 4).is_err());
        assert!(LockerRange::new(9, 3).is_err());
        assert!(LockerRange::new(1, MAX_LOCKER_ID + 1).is_err());
    }

    #[rstest]
    #[case((1, 16), (17, 32), Some((1, 32)))] // adjacent
    #[case((1, 16), (10, 20), Some((1, 20)))] // overlapping
    #[case((1, 16), (18, 32), None)] // gap of one
    fn test_range_merge(
        #[case] a: (u16, u16),
        #[case] b: (u16, u16),
        #[case] expected: Option<(u16, u16)>,
    ) {
        let a = LockerRange::new(a.0, a.1).unwrap();
        let b = LockerRange::new(b.0, b.1).unwrap();
        assert_eq!(a.merge(&b).map(Into::into), expected);
        assert_eq!(b.merge(&a).map(Into::into), expected);
    }

    #[test]
    fn test_position_within_single_range() {
        let mens = zone("mens", &[(1, 32)], &[1, 2], true);
        assert_eq!(mens.position_of(locker(1)), Some(1));
        assert_eq!(mens.position_of(locker(18)), Some(18));
        assert_eq!(mens.position_of(locker(32)), Some(32));
        assert_eq!(mens.position_of(locker(33)), None);
    }

    #[test]
    fn test_position_spans_ranges_in_order() {
        let split = zone("split", &[(1, 16), (33, 48)], &[1, 3], true);
        assert_eq!(split.position_of(locker(16)), Some(16));
        assert_eq!(split.position_of(locker(33)), Some(17));
        assert_eq!(split.position_of(locker(40)), Some(24));
        assert_eq!(split.position_of(locker(17)), None);
    }

    #[test]
    fn test_normalize_merges_adjacent() {
        let mut z = zone("z", &[(17, 32), (1, 16), (40, 48)], &[1, 2, 3], true);
        z.normalize();
        let ranges: Vec<(u16, u16)> = z.ranges.iter().map(|r| (*r).into()).collect();
        assert_eq!(ranges, vec![(1, 32), (40, 48)]);
    }

    #[test]
    fn test_zone_card_capacity_check() {
        // 33 lockers on 2 cards = 32 positions -> rejected.
        let z = zone("tight", &[(1, 33)], &[1, 2], true);
        assert!(z.validate().is_err());
        // Fine when disabled.
        let z = zone("tight", &[(1, 33)], &[1, 2], false);
        assert!(z.validate().is_ok());
    }

    #[test]
    fn test_enabled_zones_must_be_disjoint() {
        let zones = vec![
            zone("mens", &[(1, 32)], &[1, 2], true),
            zone("womens", &[(30, 48)], &[3, 4], true),
        ];
        assert!(validate_zones(&zones).is_err());

        // A disabled zone may overlap without harm.
        let zones = vec![
            zone("mens", &[(1, 32)], &[1, 2], true),
            zone("legacy", &[(30, 48)], &[5], false),
        ];
        assert!(validate_zones(&zones).is_ok());
    }

    #[test]
    fn test_card_serves_one_enabled_zone() {
        let zones = vec![
            zone("mens", &[(1, 16)], &[1], true),
            zone("womens", &[(17, 32)], &[1], true),
        ];
        let err = validate_zones(&zones).unwrap_err();
        assert!(matches!(err, Error::ZoneConfig(_)));
    }

    #[test]
    fn test_find_zone_skips_disabled() {
        let zones = vec![
            zone("old", &[(1, 48)], &[9], false),
            zone("mens", &[(1, 32)], &[1, 2], true),
        ];
        let found = find_zone(&zones, locker(18)).unwrap();
        assert_eq!(found.name, "mens");
        assert!(find_zone(&zones, locker(40)).is_none());
    }

    #[test]
    fn test_extension_grows_last_zone_and_appends_card() {
        // Coverage [1,48] on three cards; a fourth card brings capacity 64.
        let zones = vec![zone("main", &[(1, 48)], &[1, 2, 3], true)];
        let inventory = vec![slave(1), slave(2), slave(3), slave(4)];

        let plan = plan_extension(&zones, &inventory).unwrap();
        let ExtensionPlan::Extended { zones, summary } = plan else {
            panic!("expected extension");
        };
        assert_eq!(zones.len(), 1);
        let ranges: Vec<(u16, u16)> = zones[0].ranges.iter().map(|r| (*r).into()).collect();
        assert_eq!(ranges, vec![(1, 64)], "must merge, not fragment");
        assert_eq!(zones[0].relay_cards, vec![slave(1), slave(2), slave(3), slave(4)]);
        assert_eq!(summary.previous_end, 48);
        assert_eq!(summary.added_cards, vec![slave(4)]);
        validate_zones(&zones).unwrap();
    }

    #[test]
    fn test_extension_noop_when_covered() {
        let zones = vec![zone("main", &[(1, 48)], &[1, 2, 3], true)];
        let inventory = vec![slave(1), slave(2), slave(3)];
        assert_eq!(
            plan_extension(&zones, &inventory).unwrap(),
            ExtensionPlan::Unchanged
        );
    }

    #[test]
    fn test_extension_without_new_card() {
        // Zone already holds enough cards for the new positions.
        let zones = vec![zone("main", &[(1, 40)], &[1, 2, 3], true)];
        let inventory = vec![slave(1), slave(2), slave(3)];
        let ExtensionPlan::Extended { zones, summary } =
            plan_extension(&zones, &inventory).unwrap()
        else {
            panic!("expected extension");
        };
        assert_eq!(zones[0].max_end(), Some(48));
        assert!(summary.added_cards.is_empty());
    }

    #[test]
    fn test_extension_picks_zone_owning_the_highest_range() {
        let zones = vec![
            zone("womens", &[(33, 48)], &[3], true),
            zone("mens", &[(1, 32)], &[1, 2], true),
        ];
        let inventory = vec![slave(1), slave(2), slave(3), slave(4)];
        let ExtensionPlan::Extended { zones, summary } =
            plan_extension(&zones, &inventory).unwrap()
        else {
            panic!("expected extension");
        };
        assert_eq!(summary.zone_name, "womens");
        assert_eq!(zones[0].max_end(), Some(64));
        assert_eq!(zones[0].relay_cards, vec![slave(3), slave(4)]);
    }

    #[test]
    fn test_extension_fails_without_spare_cards() {
        // Capacity says 64 but every card is already assigned elsewhere.
        let zones = vec![
            zone("mens", &[(1, 48)], &[1, 2, 3], true),
            zone("spare_holder", &[], &[4], true),
        ];
        let inventory = vec![slave(1), slave(2), slave(3), slave(4)];
        let err = plan_extension(&zones, &inventory).unwrap_err();
        assert!(matches!(err, Error::ZoneConfig(_)));
    }

    #[test]
    fn test_extension_ignored_without_zones() {
        assert_eq!(
            plan_extension(&[], &[slave(1), slave(2)]).unwrap(),
            ExtensionPlan::Unchanged
        );
        let disabled = vec![zone("off", &[(1, 16)], &[1], false)];
        assert_eq!(
            plan_extension(&disabled, &[slave(1), slave(2)]).unwrap(),
            ExtensionPlan::Unchanged
        );
    }
}

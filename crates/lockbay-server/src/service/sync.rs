//! Zone configuration and the capacity-driven sync.
//!
//! Zones are replaced as a whole table, never patched in place: the
//! request is validated against the core invariants (disjoint ranges,
//! card exclusivity, per-zone capacity) before anything is written, and
//! the storage swap is one transaction. Replacing the relay-card
//! inventory triggers the sync proper: when the new capacity exceeds
//! zone coverage, the last enabled zone grows to claim it (see
//! [`lockbay_core::zone::plan_extension`]). A failed validation leaves
//! the prior configuration untouched.

use tracing::{debug, info, warn};

use lockbay_core::wire::{RelayCardSpec, SyncResponse, ZoneLayoutView};
use lockbay_core::zone::{ExtensionPlan, Zone, plan_extension, validate_zones};
use lockbay_core::{Error as CoreError, KioskId, SlaveAddress};
use lockbay_storage::{
    Database, KioskRepository, SqliteKioskRepository, SqliteZoneRepository, ZoneLayout,
    ZoneRepository,
};

use crate::error::AppResult;

/// Current zone layout for one kiosk.
pub async fn layout(db: &Database, kiosk: &KioskId) -> AppResult<ZoneLayoutView> {
    require_kiosk(db, kiosk).await?;
    let zones = SqliteZoneRepository::new(db.pool().clone());
    let stored = zones.layout_for_kiosk(kiosk.as_str()).await?;
    Ok(to_view(stored))
}

/// Replace the zone table for one kiosk.
///
/// Card assignments ride inside each zone and must name cards already
/// in the kiosk's inventory; inventory cards no zone claims become
/// spares. Validation happens on the normalized zones before the swap.
pub async fn replace_zones(
    db: &Database,
    kiosk: &KioskId,
    mut zones: Vec<Zone>,
) -> AppResult<ZoneLayoutView> {
    require_kiosk(db, kiosk).await?;
    for zone in &mut zones {
        zone.normalize();
    }
    validate_zones(&zones)?;

    let repo = SqliteZoneRepository::new(db.pool().clone());
    let current = repo.layout_for_kiosk(kiosk.as_str()).await?;
    snapshot(kiosk, &current);

    let inventory = current.full_inventory();
    let assigned: Vec<SlaveAddress> = zones.iter().flat_map(|z| z.relay_cards.clone()).collect();
    if let Some(unknown) = assigned.iter().find(|card| !inventory.contains(card)) {
        return Err(CoreError::ZoneConfig(format!(
            "Zone configuration names relay card {unknown}, which is not in the inventory of {kiosk}"
        ))
        .into());
    }

    let layout = ZoneLayout {
        spare_cards: inventory
            .into_iter()
            .filter(|card| !assigned.contains(card))
            .collect(),
        zones,
    };
    repo.replace_layout(kiosk.as_str(), &layout).await?;
    info!(kiosk_id = %kiosk, zones = layout.zones.len(), "Zone table replaced");

    Ok(to_view(layout))
}

/// Replace the relay-card inventory and reconcile zone coverage.
///
/// Disabled cards are dropped from the stored inventory; a card an
/// enabled zone depends on cannot be removed. When the new capacity
/// exceeds current coverage the last enabled zone is extended and any
/// newly required cards are appended to it.
pub async fn replace_relay_cards(
    db: &Database,
    kiosk: &KioskId,
    cards: &[RelayCardSpec],
) -> AppResult<SyncResponse> {
    require_kiosk(db, kiosk).await?;

    let mut inventory: Vec<SlaveAddress> = cards
        .iter()
        .filter(|card| card.enabled)
        .map(|card| card.slave_address)
        .collect();
    inventory.sort_unstable();
    let before_dedup = inventory.len();
    inventory.dedup();
    if inventory.len() != before_dedup {
        return Err(CoreError::validation("Relay-card inventory lists a slave address twice").into());
    }

    let repo = SqliteZoneRepository::new(db.pool().clone());
    let current = repo.layout_for_kiosk(kiosk.as_str()).await?;
    snapshot(kiosk, &current);

    for zone in current.zones.iter().filter(|z| z.enabled) {
        if let Some(missing) = zone.relay_cards.iter().find(|card| !inventory.contains(card)) {
            warn!(
                kiosk_id = %kiosk,
                zone = %zone.name,
                card = missing.as_u8(),
                "Inventory change rejected: card still assigned to a zone"
            );
            return Err(CoreError::ZoneConfig(format!(
                "Relay card {missing} is assigned to zone '{}' and cannot be removed",
                zone.name
            ))
            .into());
        }
    }

    let plan = match plan_extension(&current.zones, &inventory) {
        Ok(plan) => plan,
        Err(err) => {
            warn!(kiosk_id = %kiosk, error = %err, "Zone sync aborted, prior configuration kept");
            return Err(err.into());
        }
    };

    let (zones, extension) = match plan {
        ExtensionPlan::Unchanged => (current.zones, None),
        ExtensionPlan::Extended { zones, summary } => {
            info!(
                kiosk_id = %kiosk,
                zone = %summary.zone_name,
                previous_end = summary.previous_end,
                new_range = %summary.new_range,
                added_cards = summary.added_cards.len(),
                "Last zone extended to cover new relay capacity"
            );
            (zones, Some(summary))
        }
    };

    let assigned: Vec<SlaveAddress> = zones.iter().flat_map(|z| z.relay_cards.clone()).collect();
    let layout = ZoneLayout {
        spare_cards: inventory
            .into_iter()
            .filter(|card| !assigned.contains(card))
            .collect(),
        zones,
    };
    repo.replace_layout(kiosk.as_str(), &layout).await?;

    Ok(SyncResponse {
        changed: extension.is_some(),
        extension,
    })
}

async fn require_kiosk(db: &Database, kiosk: &KioskId) -> AppResult<()> {
    let kiosks = SqliteKioskRepository::new(db.pool().clone());
    if kiosks.find(kiosk.as_str()).await?.is_none() {
        return Err(CoreError::not_found("kiosk", kiosk.as_str()).into());
    }
    Ok(())
}

/// Log the configuration about to be replaced, as rollback evidence.
fn snapshot(kiosk: &KioskId, layout: &ZoneLayout) {
    match serde_json::to_string(layout) {
        Ok(json) => debug!(kiosk_id = %kiosk, snapshot = %json, "Zone layout before change"),
        Err(err) => warn!(kiosk_id = %kiosk, error = %err, "Could not serialize layout snapshot"),
    }
}

fn to_view(layout: ZoneLayout) -> ZoneLayoutView {
    ZoneLayoutView {
        zones: layout.zones,
        spare_cards: layout.spare_cards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lockbay_core::zone::LockerRange;

    use crate::error::AppError;

    async fn setup() -> (Database, KioskId) {
        let db = Database::in_memory().await.unwrap();
        let kiosk: KioskId = "kiosk-01".parse().unwrap();
        let kiosks = SqliteKioskRepository::new(db.pool().clone());
        kiosks
            .register_heartbeat(kiosk.as_str(), None, None, None, Utc::now())
            .await
            .unwrap();
        (db, kiosk)
    }

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    fn cards(addrs: &[u8]) -> Vec<RelayCardSpec> {
        addrs
            .iter()
            .map(|&addr| RelayCardSpec {
                slave_address: slave(addr),
                enabled: true,
            })
            .collect()
    }

    fn zone(name: &str, ranges: &[(u16, u16)], relay: &[u8]) -> Zone {
        Zone {
            name: name.to_string(),
            ranges: ranges
                .iter()
                .map(|&(s, e)| LockerRange::new(s, e).unwrap())
                .collect(),
            relay_cards: relay.iter().map(|&c| slave(c)).collect(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_cards_then_zones_setup_flow() {
        let (db, kiosk) = setup().await;

        let sync = replace_relay_cards(&db, &kiosk, &cards(&[1, 2, 3])).await.unwrap();
        assert!(!sync.changed);

        let view = replace_zones(&db, &kiosk, vec![zone("mens", &[(1, 32)], &[1, 2])])
            .await
            .unwrap();
        assert_eq!(view.zones.len(), 1);
        assert_eq!(view.spare_cards, vec![slave(3)]);
    }

    #[tokio::test]
    async fn test_zone_naming_unknown_card_is_rejected() {
        let (db, kiosk) = setup().await;
        replace_relay_cards(&db, &kiosk, &cards(&[1])).await.unwrap();

        let err = replace_zones(&db, &kiosk, vec![zone("mens", &[(1, 32)], &[1, 9])])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::ZoneConfig(_))));

        // Prior configuration untouched.
        let view = layout(&db, &kiosk).await.unwrap();
        assert!(view.zones.is_empty());
        assert_eq!(view.spare_cards, vec![slave(1)]);
    }

    #[tokio::test]
    async fn test_overlapping_zones_are_rejected() {
        let (db, kiosk) = setup().await;
        replace_relay_cards(&db, &kiosk, &cards(&[1, 2, 3, 4])).await.unwrap();

        let err = replace_zones(
            &db,
            &kiosk,
            vec![
                zone("mens", &[(1, 32)], &[1, 2]),
                zone("womens", &[(30, 48)], &[3, 4]),
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::ZoneConfig(_))));
    }

    #[tokio::test]
    async fn test_capacity_growth_extends_last_zone() {
        let (db, kiosk) = setup().await;
        replace_relay_cards(&db, &kiosk, &cards(&[1, 2, 3])).await.unwrap();
        replace_zones(&db, &kiosk, vec![zone("main", &[(1, 48)], &[1, 2, 3])])
            .await
            .unwrap();

        // A fourth card arrives: coverage [1,48] of capacity 64.
        let sync = replace_relay_cards(&db, &kiosk, &cards(&[1, 2, 3, 4])).await.unwrap();
        assert!(sync.changed);
        let extension = sync.extension.unwrap();
        assert_eq!(extension.previous_end, 48);
        assert_eq!((extension.new_range.start(), extension.new_range.end()), (1, 64));
        assert_eq!(extension.added_cards, vec![slave(4)]);

        let view = layout(&db, &kiosk).await.unwrap();
        let ranges: Vec<(u16, u16)> = view.zones[0].ranges.iter().map(|r| (*r).into()).collect();
        assert_eq!(ranges, vec![(1, 64)], "extension must merge, not fragment");
        assert_eq!(
            view.zones[0].relay_cards,
            vec![slave(1), slave(2), slave(3), slave(4)]
        );
        assert!(view.spare_cards.is_empty());
        validate_zones(&view.zones).unwrap();
    }

    #[tokio::test]
    async fn test_removing_a_zoned_card_is_rejected() {
        let (db, kiosk) = setup().await;
        replace_relay_cards(&db, &kiosk, &cards(&[1, 2])).await.unwrap();
        replace_zones(&db, &kiosk, vec![zone("mens", &[(1, 32)], &[1, 2])])
            .await
            .unwrap();

        let err = replace_relay_cards(&db, &kiosk, &cards(&[1])).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::ZoneConfig(_))));

        // The inventory the zones depend on is still there.
        let view = layout(&db, &kiosk).await.unwrap();
        assert_eq!(view.zones[0].relay_cards, vec![slave(1), slave(2)]);
    }

    #[tokio::test]
    async fn test_duplicate_inventory_address_is_invalid() {
        let (db, kiosk) = setup().await;
        let err = replace_relay_cards(&db, &kiosk, &cards(&[1, 1])).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_disabled_cards_do_not_count_as_capacity() {
        let (db, kiosk) = setup().await;
        replace_relay_cards(&db, &kiosk, &cards(&[1, 2])).await.unwrap();
        replace_zones(&db, &kiosk, vec![zone("mens", &[(1, 32)], &[1, 2])])
            .await
            .unwrap();

        let mut specs = cards(&[1, 2, 3]);
        specs[2].enabled = false;
        let sync = replace_relay_cards(&db, &kiosk, &specs).await.unwrap();
        assert!(!sync.changed, "a disabled card brings no capacity");
    }

    #[tokio::test]
    async fn test_unknown_kiosk_is_not_found() {
        let (db, _) = setup().await;
        let ghost: KioskId = "kiosk-99".parse().unwrap();
        let err = layout(&db, &ghost).await.unwrap_err();
        assert!(matches!(err, AppError::Core(CoreError::NotFound { .. })));
    }
}

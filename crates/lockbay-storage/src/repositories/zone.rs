#![allow(async_fn_in_trait)]

use sqlx::SqlitePool;

use lockbay_core::zone::{LockerRange, Zone};
use lockbay_core::SlaveAddress;

use crate::error::{StorageError, StorageResult};
use crate::models::ZoneLayout;
use crate::transaction;

/// Repository trait for kiosk zone layouts.
///
/// The layout is read and written as a whole: zone sync validates the
/// complete picture it intends to install, then calls
/// [`replace_layout`], which swaps the stored rows inside one
/// transaction. Partial in-place edits do not exist.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
///
/// [`replace_layout`]: ZoneRepository::replace_layout
pub trait ZoneRepository: Send + Sync {
    /// Assemble the full layout for one kiosk. A kiosk with no stored
    /// rows gets [`ZoneLayout::empty`].
    async fn layout_for_kiosk(&self, kiosk_id: &str) -> StorageResult<ZoneLayout>;

    /// Replace the stored layout for one kiosk atomically.
    async fn replace_layout(&self, kiosk_id: &str, layout: &ZoneLayout) -> StorageResult<()>;
}

/// SQLite implementation of ZoneRepository
pub struct SqliteZoneRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: i64,
    name: String,
    enabled: bool,
}

#[derive(sqlx::FromRow)]
struct RangeRow {
    zone_id: i64,
    start_locker: i64,
    end_locker: i64,
}

#[derive(sqlx::FromRow)]
struct CardRow {
    zone_id: i64,
    slave_address: i64,
}

fn range_from_row(row: &RangeRow) -> StorageResult<LockerRange> {
    let start = u16::try_from(row.start_locker)
        .map_err(|_| StorageError::Corrupt(format!("bad range start {}", row.start_locker)))?;
    let end = u16::try_from(row.end_locker)
        .map_err(|_| StorageError::Corrupt(format!("bad range end {}", row.end_locker)))?;
    LockerRange::new(start, end)
        .map_err(|_| StorageError::Corrupt(format!("bad locker range [{start},{end}]")))
}

fn slave_from_raw(raw: i64) -> StorageResult<SlaveAddress> {
    u8::try_from(raw)
        .ok()
        .and_then(|addr| SlaveAddress::new(addr).ok())
        .ok_or_else(|| StorageError::Corrupt(format!("bad slave address {raw}")))
}

impl SqliteZoneRepository {
    /// Create a new SQLite zone repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ZoneRepository for SqliteZoneRepository {
    async fn layout_for_kiosk(&self, kiosk_id: &str) -> StorageResult<ZoneLayout> {
        let zone_rows = sqlx::query_as::<_, ZoneRow>(
            "SELECT id, name, enabled FROM zones WHERE kiosk_id = ? ORDER BY ordinal",
        )
        .bind(kiosk_id)
        .fetch_all(&self.pool)
        .await?;

        let range_rows = sqlx::query_as::<_, RangeRow>(
            r#"
            SELECT r.zone_id, r.start_locker, r.end_locker
            FROM zone_ranges r
            JOIN zones z ON z.id = r.zone_id
            WHERE z.kiosk_id = ?
            ORDER BY r.zone_id, r.ordinal
            "#,
        )
        .bind(kiosk_id)
        .fetch_all(&self.pool)
        .await?;

        let card_rows = sqlx::query_as::<_, CardRow>(
            r#"
            SELECT zone_id, slave_address FROM relay_cards
            WHERE kiosk_id = ? AND zone_id IS NOT NULL AND enabled = 1
            ORDER BY zone_id, zone_ordinal
            "#,
        )
        .bind(kiosk_id)
        .fetch_all(&self.pool)
        .await?;

        let mut zones = Vec::with_capacity(zone_rows.len());
        for zone_row in zone_rows {
            let ranges = range_rows
                .iter()
                .filter(|r| r.zone_id == zone_row.id)
                .map(range_from_row)
                .collect::<StorageResult<Vec<_>>>()?;
            let relay_cards = card_rows
                .iter()
                .filter(|c| c.zone_id == zone_row.id)
                .map(|c| slave_from_raw(c.slave_address))
                .collect::<StorageResult<Vec<_>>>()?;

            zones.push(Zone {
                name: zone_row.name,
                ranges,
                relay_cards,
                enabled: zone_row.enabled,
            });
        }

        let spare_rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT slave_address FROM relay_cards
            WHERE kiosk_id = ? AND zone_id IS NULL AND enabled = 1
            ORDER BY slave_address
            "#,
        )
        .bind(kiosk_id)
        .fetch_all(&self.pool)
        .await?;
        let spare_cards = spare_rows
            .into_iter()
            .map(|(raw,)| slave_from_raw(raw))
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(ZoneLayout { zones, spare_cards })
    }

    async fn replace_layout(&self, kiosk_id: &str, layout: &ZoneLayout) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        // Deleting the zones cascades to their ranges; cards are keyed
        // by kiosk and wiped directly.
        sqlx::query("DELETE FROM zones WHERE kiosk_id = ?")
            .bind(kiosk_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM relay_cards WHERE kiosk_id = ?")
            .bind(kiosk_id)
            .execute(&mut *tx)
            .await?;

        for (ordinal, zone) in layout.zones.iter().enumerate() {
            let zone_id = transaction::insert_zone(&mut tx, kiosk_id, zone, ordinal as i64).await?;
            for (range_ordinal, range) in zone.ranges.iter().enumerate() {
                transaction::insert_zone_range(&mut tx, zone_id, range_ordinal as i64, range)
                    .await?;
            }
            for (card_ordinal, card) in zone.relay_cards.iter().enumerate() {
                transaction::insert_relay_card(
                    &mut tx,
                    kiosk_id,
                    *card,
                    Some(zone_id),
                    Some(card_ordinal as i64),
                )
                .await?;
            }
        }

        for spare in &layout.spare_cards {
            transaction::insert_relay_card(&mut tx, kiosk_id, *spare, None, None).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    fn range(start: u16, end: u16) -> LockerRange {
        LockerRange::new(start, end).unwrap()
    }

    fn two_zone_layout() -> ZoneLayout {
        ZoneLayout {
            zones: vec![
                Zone {
                    name: "ground".to_string(),
                    ranges: vec![range(1, 16), range(33, 48)],
                    relay_cards: vec![slave(7), slave(9)],
                    enabled: true,
                },
                Zone {
                    name: "mezzanine".to_string(),
                    ranges: vec![range(17, 32)],
                    relay_cards: vec![slave(8)],
                    enabled: false,
                },
            ],
            spare_cards: vec![slave(12), slave(11)],
        }
    }

    #[tokio::test]
    async fn test_empty_kiosk_has_empty_layout() {
        let db = setup_test_db().await;
        let repo = SqliteZoneRepository::new(db.pool().clone());

        let layout = repo.layout_for_kiosk("kiosk-01").await.unwrap();
        assert!(layout.is_empty());
    }

    #[tokio::test]
    async fn test_layout_roundtrip_preserves_order() {
        let db = setup_test_db().await;
        let repo = SqliteZoneRepository::new(db.pool().clone());

        let layout = two_zone_layout();
        repo.replace_layout("kiosk-01", &layout).await.unwrap();

        let stored = repo.layout_for_kiosk("kiosk-01").await.unwrap();
        assert_eq!(stored.zones, layout.zones);
        // Spares come back in slave-address order regardless of the
        // order they were written in.
        assert_eq!(stored.spare_cards, vec![slave(11), slave(12)]);
    }

    #[tokio::test]
    async fn test_replace_wipes_previous_layout() {
        let db = setup_test_db().await;
        let repo = SqliteZoneRepository::new(db.pool().clone());

        repo.replace_layout("kiosk-01", &two_zone_layout()).await.unwrap();

        let smaller = ZoneLayout {
            zones: vec![Zone {
                name: "ground".to_string(),
                ranges: vec![range(1, 16)],
                relay_cards: vec![slave(7)],
                enabled: true,
            }],
            spare_cards: Vec::new(),
        };
        repo.replace_layout("kiosk-01", &smaller).await.unwrap();

        let stored = repo.layout_for_kiosk("kiosk-01").await.unwrap();
        assert_eq!(stored.zones.len(), 1);
        assert_eq!(stored.zones[0].relay_cards, vec![slave(7)]);
        assert!(stored.spare_cards.is_empty());
    }

    #[tokio::test]
    async fn test_layouts_are_scoped_per_kiosk() {
        let db = setup_test_db().await;
        let repo = SqliteZoneRepository::new(db.pool().clone());

        repo.replace_layout("kiosk-01", &two_zone_layout()).await.unwrap();

        let other = repo.layout_for_kiosk("kiosk-02").await.unwrap();
        assert!(other.is_empty());
    }
}

//! Storage layer for the Lockbay locker coordination server.
//!
//! This crate provides SQLite-backed persistence for locker state, the
//! hardware command queue, the kiosk registry, and zone layouts, along
//! with the audit trail every command leaves behind.
//!
//! # Architecture
//!
//! The storage layer uses a repository pattern with the following components:
//!
//! - [`Database`] - Connection pool manager with automatic migrations
//! - [`LockerRepository`], [`CommandRepository`], [`KioskRepository`],
//!   [`ZoneRepository`], [`CommandLogRepository`] - Data access traits
//! - [`transaction`] - Transaction-aware operations for atomic multi-step
//!   operations
//!
//! # Core Concepts
//!
//! ## Optimistic Versioning
//!
//! Every locker row carries a `version` counter. State transitions are
//! written with an UPDATE that predicates on the version the caller read
//! and increments it, so two racing writers cannot both land: the loser
//! gets [`StorageError::VersionConflict`] and must re-read. There are no
//! long-held row locks and no lost updates.
//!
//! ## Queue Admission
//!
//! Commands enter the queue through a single transactional gate. A new
//! command is rejected with [`StorageError::DuplicateCommand`] while an
//! equivalent command (same dedup key) or any command touching one of its
//! target lockers is still `pending` or `executing`. A partial unique
//! index over live rows backstops the race window between two concurrent
//! admission checks.
//!
//! # Examples
//!
//! ## Basic Setup
//!
//! ```no_run
//! use lockbay_storage::{Database, DatabaseConfig};
//! use lockbay_storage::repositories::{LockerRepository, SqliteLockerRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize database with automatic migrations
//! let config = DatabaseConfig::new("lockbay.db")
//!     .max_connections(10)
//!     .auto_migrate(true);
//!
//! let db = Database::new(config).await?;
//!
//! let lockers = SqliteLockerRepository::new(db.pool().clone());
//! for locker in lockers.list_for_kiosk("kiosk-01").await? {
//!     println!("locker {} is {}", locker.locker_id, locker.state);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Submitting a Command
//!
//! ```no_run
//! use lockbay_core::{CommandPayload, KioskId, LockerId};
//! use lockbay_storage::models::CommandRecord;
//! use lockbay_storage::repositories::{CommandRepository, SqliteCommandRepository};
//! use lockbay_storage::{Database, DatabaseConfig, StorageError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("lockbay.db")).await?;
//! let commands = SqliteCommandRepository::new(db.pool().clone());
//!
//! let kiosk: KioskId = "kiosk-01".parse()?;
//! let payload = CommandPayload::Open {
//!     locker_id: LockerId::new(5)?,
//!     burst: false,
//! };
//! let record = CommandRecord::new(&kiosk, &payload, Some("panel".to_string()))?;
//!
//! match commands.enqueue(&record, &payload.target_lockers()).await {
//!     Ok(()) => println!("queued {}", record.id),
//!     Err(StorageError::DuplicateCommand { existing_id }) => {
//!         println!("already queued as {existing_id}");
//!     }
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarded State Transitions
//!
//! ```no_run
//! use lockbay_core::{LockerId, LockerState};
//! use lockbay_storage::models::LockerMutation;
//! use lockbay_storage::repositories::{LockerRepository, SqliteLockerRepository};
//! use lockbay_storage::{Database, DatabaseConfig, StorageError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("lockbay.db")).await?;
//! let lockers = SqliteLockerRepository::new(db.pool().clone());
//!
//! let locker = LockerId::new(5)?;
//! if let Some(row) = lockers.find("kiosk-01", locker).await? {
//!     let change = LockerMutation::preserving(&row, LockerState::Blocked)?;
//!     match lockers.update_state("kiosk-01", locker, row.version, &change).await {
//!         Ok(updated) => println!("now {} at version {}", updated.state, updated.version),
//!         Err(StorageError::VersionConflict { .. }) => println!("lost the race, re-read"),
//!         Err(err) => return Err(err.into()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Performance
//!
//! - Connection pooling with a configurable cap (default: 10)
//! - WAL mode for better concurrent read/write performance
//! - Prepared statement caching
//! - Command kind, dedup key, and primary locker are denormalized into
//!   indexed columns so queue queries never parse payload JSON
//! - All queries use parameterized statements via SQLx

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{
    CommandLogEntry, CommandOutcome, CommandRecord, KioskRecord, LockerMutation, LockerRecord,
    LogEvent, ZoneLayout,
};
pub use repositories::{
    CommandLogRepository, CommandRepository, KioskRepository, LockerRepository,
    SqliteCommandLogRepository, SqliteCommandRepository, SqliteKioskRepository,
    SqliteLockerRepository, SqliteZoneRepository, ZoneRepository,
};

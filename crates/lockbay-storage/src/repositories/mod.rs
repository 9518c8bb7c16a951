pub mod command;
pub mod command_log;
pub mod kiosk;
pub mod locker;
pub mod zone;

pub use command::{CommandRepository, SqliteCommandRepository};
pub use command_log::{CommandLogRepository, SqliteCommandLogRepository};
pub use kiosk::{KioskRepository, SqliteKioskRepository};
pub use locker::{LockerRepository, SqliteLockerRepository};
pub use zone::{SqliteZoneRepository, ZoneRepository};

pub mod command;
pub mod command_log;
pub mod kiosk;
pub mod locker;
pub mod zone;

pub use command::{CommandOutcome, CommandRecord};
pub use command_log::{CommandLogEntry, LogEvent};
pub use kiosk::KioskRecord;
pub use locker::{LockerMutation, LockerRecord};
pub use zone::ZoneLayout;

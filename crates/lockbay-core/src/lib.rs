pub mod command;
pub mod constants;
pub mod error;
pub mod state;
pub mod types;
pub mod wire;
pub mod zone;

pub use command::{CommandId, CommandKind, CommandPayload, CommandStatus};
pub use error::{Error, HardwareKind, Result};
pub use state::{LockerEvent, LockerState};
pub use types::*;
pub use zone::{LockerRange, Zone};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

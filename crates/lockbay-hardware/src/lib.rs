pub mod controller;
pub mod error;
pub mod mapper;
pub mod transport;

pub use controller::{ControllerConfig, RelayController};
pub use error::{HardwareError, Result};
pub use mapper::{CoilMapper, CoilTarget};
pub use transport::{RelayLink, SerialLinkConfig, SerialRelayLink};

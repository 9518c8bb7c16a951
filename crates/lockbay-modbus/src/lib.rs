pub mod crc;
pub mod error;
pub mod exception;
pub mod frame;
pub mod request;
pub mod response;

pub use crc::{append_crc, crc16, verify_crc};
pub use error::{ModbusError, ModbusResult};
pub use exception::ExceptionCode;
pub use frame::{FunctionCode, expected_response_len};
pub use request::{
    Request, parse_request, read_coils, read_holding_registers, write_multiple_coils,
    write_single_coil, write_single_register,
};
pub use response::{Response, parse_response};

use crate::{
    Result,
    constants::{
        MAX_KIOSK_ID_LENGTH, MAX_LOCKER_ID, MAX_OWNER_KEY_LENGTH, MAX_SLAVE_ADDRESS,
        MIN_SLAVE_ADDRESS,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kiosk identifier (1-64 chars, `[A-Za-z0-9_-]`).
///
/// Every locker, command, and registration is keyed by a kiosk id; the id
/// is chosen at provisioning time and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KioskId(String);

impl KioskId {
    /// Create a new kiosk id with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the id is empty, longer than 64
    /// characters, or contains anything outside `[A-Za-z0-9_-]`.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() || id.len() > MAX_KIOSK_ID_LENGTH {
            return Err(Error::Validation(format!(
                "Kiosk id must be 1-{MAX_KIOSK_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Validation(format!(
                "Kiosk id may only contain [A-Za-z0-9_-]: {id}"
            )));
        }
        Ok(KioskId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KioskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for KioskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KioskId::new(s)
    }
}

impl TryFrom<String> for KioskId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        KioskId::new(&value)
    }
}

impl From<KioskId> for String {
    fn from(id: KioskId) -> Self {
        id.0
    }
}

/// Locker identifier: the 1-based number of a physical locker on a kiosk.
///
/// Valid range is 1 to [`MAX_LOCKER_ID`]. The id doubles as the position
/// used by the legacy (non-zoned) relay mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct LockerId(u16);

impl LockerId {
    /// Create a new locker id with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the id is 0 or above [`MAX_LOCKER_ID`].
    pub fn new(id: u16) -> Result<Self> {
        if !(1..=MAX_LOCKER_ID).contains(&id) {
            return Err(Error::Validation(format!(
                "Locker id must be 1-{MAX_LOCKER_ID}, got {id}"
            )));
        }
        Ok(LockerId(id))
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u16 = s
            .parse()
            .map_err(|_| Error::Validation(format!("Invalid locker id: {s}")))?;
        LockerId::new(id)
    }
}

impl TryFrom<u16> for LockerId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        LockerId::new(value)
    }
}

impl From<LockerId> for u16 {
    fn from(id: LockerId) -> Self {
        id.0
    }
}

/// Modbus slave address of a relay card (1-247).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    /// Create a new slave address with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` outside the Modbus range 1-247.
    pub fn new(addr: u8) -> Result<Self> {
        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&addr) {
            return Err(Error::Validation(format!(
                "Slave address must be {MIN_SLAVE_ADDRESS}-{MAX_SLAVE_ADDRESS}, got {addr}"
            )));
        }
        Ok(SlaveAddress(addr))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlaveAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SlaveAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        SlaveAddress::new(value)
    }
}

impl From<SlaveAddress> for u8 {
    fn from(addr: SlaveAddress) -> Self {
        addr.0
    }
}

/// Coil number on a relay card, 1-based (1-16).
///
/// The wire protocol addresses coils 0-based; [`CoilAddress::wire_offset`]
/// does that conversion in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CoilAddress(u8);

impl CoilAddress {
    /// Create a new coil address with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` outside 1-16.
    pub fn new(coil: u8) -> Result<Self> {
        if !(1..=16).contains(&coil) {
            return Err(Error::Validation(format!(
                "Coil address must be 1-16, got {coil}"
            )));
        }
        Ok(CoilAddress(coil))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// 0-based coil offset as transmitted on the bus.
    #[must_use]
    pub fn wire_offset(&self) -> u16 {
        u16::from(self.0) - 1
    }
}

impl fmt::Display for CoilAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for CoilAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        CoilAddress::new(value)
    }
}

impl From<CoilAddress> for u8 {
    fn from(coil: CoilAddress) -> Self {
        coil.0
    }
}

/// What kind of principal owns or reserved a locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// A customer card / membership id.
    Card,
    /// A paired device (app session).
    Device,
    /// Staff action from the panel.
    Staff,
}

impl OwnerType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Card => "card",
            OwnerType::Device => "device",
            OwnerType::Staff => "staff",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OwnerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "card" => Ok(OwnerType::Card),
            "device" => Ok(OwnerType::Device),
            "staff" => Ok(OwnerType::Staff),
            _ => Err(Error::Validation(format!("Invalid owner type: {s}"))),
        }
    }
}

/// Derived liveness of a kiosk registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KioskStatus {
    Online,
    Offline,
}

impl KioskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KioskStatus::Online => "online",
            KioskStatus::Offline => "offline",
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, KioskStatus::Online)
    }
}

impl fmt::Display for KioskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque owner key (card id, device id, or staff login).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Create a new owner key with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if empty, longer than 64 characters, or
    /// not ASCII.
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() || key.len() > MAX_OWNER_KEY_LENGTH {
            return Err(Error::Validation(format!(
                "Owner key must be 1-{MAX_OWNER_KEY_LENGTH} chars, got {}",
                key.len()
            )));
        }
        if !key.is_ascii() {
            return Err(Error::Validation("Owner key must be ASCII".to_string()));
        }
        Ok(OwnerKey(key.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OwnerKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OwnerKey::new(s)
    }
}

impl TryFrom<String> for OwnerKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        OwnerKey::new(&value)
    }
}

impl From<OwnerKey> for String {
    fn from(key: OwnerKey) -> Self {
        key.0
    }
}

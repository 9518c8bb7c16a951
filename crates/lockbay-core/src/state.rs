//! Locker ownership state machine.
//!
//! Every locker is always in exactly one [`LockerState`]; all mutations go
//! through the central transition table in [`next_state`]. Call sites never
//! write a status value directly - they name the [`LockerEvent`] that
//! happened and take the resulting state (or the rejection) from here.
//!
//! `Opening` is a transient marker held only while a pulse command is in
//! flight; it is never a resting state. A pulse that cannot be confirmed
//! moves the locker to `Error`, which only staff can clear.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Ownership state of one physical locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockerState {
    /// Unassigned and available.
    Free,
    /// Held for an owner key; expires back to `Free` after the TTL.
    Reserved,
    /// A pulse command is in flight. Transient.
    Opening,
    /// Assigned to an owner.
    Owned,
    /// Taken out of service by staff.
    Blocked,
    /// Hardware outcome unknown; requires staff reset or unblock.
    Error,
}

impl LockerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LockerState::Free => "free",
            LockerState::Reserved => "reserved",
            LockerState::Opening => "opening",
            LockerState::Owned => "owned",
            LockerState::Blocked => "blocked",
            LockerState::Error => "error",
        }
    }

    /// True for states a locker may rest in between commands.
    #[must_use]
    pub fn is_resting(&self) -> bool {
        !matches!(self, LockerState::Opening)
    }
}

impl fmt::Display for LockerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LockerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(LockerState::Free),
            "reserved" => Ok(LockerState::Reserved),
            "opening" => Ok(LockerState::Opening),
            "owned" => Ok(LockerState::Owned),
            "blocked" => Ok(LockerState::Blocked),
            "error" => Ok(LockerState::Error),
            _ => Err(Error::Validation(format!("Unknown locker state: {s}"))),
        }
    }
}

/// Something that happened to a locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockerEvent {
    /// Issuer selected the locker for an owner key.
    Reserve,
    /// Reservation TTL elapsed without confirmation.
    Expire,
    /// An open pulse was claimed for execution.
    OpenStarted,
    /// Pulse confirmed and the locker keeps (or gains) its owner.
    ConfirmOwned,
    /// Pulse confirmed and ownership is released.
    ConfirmReleased,
    /// Pulse could not be confirmed.
    OpenFailed,
    /// Owner gave the locker up without a pulse (panel action).
    Release,
    /// Staff took the locker out of service.
    Block,
    /// Staff returned a blocked locker to service.
    Unblock,
    /// Staff cleared the locker back to `Free`, dropping any owner.
    Reset,
}

impl LockerEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LockerEvent::Reserve => "reserve",
            LockerEvent::Expire => "expire",
            LockerEvent::OpenStarted => "open_started",
            LockerEvent::ConfirmOwned => "confirm_owned",
            LockerEvent::ConfirmReleased => "confirm_released",
            LockerEvent::OpenFailed => "open_failed",
            LockerEvent::Release => "release",
            LockerEvent::Block => "block",
            LockerEvent::Unblock => "unblock",
            LockerEvent::Reset => "reset",
        }
    }

    /// Completion event for a confirmed open pulse.
    ///
    /// Encodes the open-releases-ownership rule: opening an owned locker
    /// hands it back, except for VIP lockers, whose ownership persists
    /// across opens. A confirmed reservation becomes ownership.
    #[must_use]
    pub fn confirm_open(was_reserved: bool, was_owned: bool, is_vip: bool) -> LockerEvent {
        if was_reserved || (was_owned && is_vip) {
            LockerEvent::ConfirmOwned
        } else {
            LockerEvent::ConfirmReleased
        }
    }
}

impl fmt::Display for LockerEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table. Returns `None` for illegal combinations.
///
/// | from               | event                    | to        |
/// |--------------------|--------------------------|-----------|
/// | Free               | Reserve                  | Reserved  |
/// | Reserved           | Expire                   | Free      |
/// | Free/Reserved/Owned| OpenStarted              | Opening   |
/// | Opening            | ConfirmOwned             | Owned     |
/// | Opening            | ConfirmReleased          | Free      |
/// | Opening            | OpenFailed               | Error     |
/// | Owned              | Release                  | Free      |
/// | any but Blocked    | Block                    | Blocked   |
/// | Blocked            | Unblock                  | Free      |
/// | any resting state  | Reset                    | Free      |
#[must_use]
pub fn next_state(current: LockerState, event: LockerEvent) -> Option<LockerState> {
    use LockerEvent as E;
    use LockerState as S;

    let next = match (current, event) {
        (S::Free, E::Reserve) => S::Reserved,
        (S::Reserved, E::Expire) => S::Free,
        (S::Free | S::Reserved | S::Owned, E::OpenStarted) => S::Opening,
        (S::Opening, E::ConfirmOwned) => S::Owned,
        (S::Opening, E::ConfirmReleased) => S::Free,
        (S::Opening, E::OpenFailed) => S::Error,
        (S::Owned, E::Release) => S::Free,
        (S::Free | S::Reserved | S::Opening | S::Owned | S::Error, E::Block) => S::Blocked,
        (S::Blocked, E::Unblock) => S::Free,
        (S::Free | S::Reserved | S::Owned | S::Blocked | S::Error, E::Reset) => S::Free,
        _ => return None,
    };
    Some(next)
}

/// Apply `event` to `current`, rejecting illegal transitions.
///
/// # Errors
/// Returns `Error::InvalidTransition` when the table has no entry for the
/// combination; the caller must not mutate anything in that case.
pub fn apply(current: LockerState, event: LockerEvent) -> Result<LockerState> {
    next_state(current, event).ok_or(Error::InvalidTransition {
        from: current,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LockerState::Free, LockerEvent::Reserve, LockerState::Reserved)]
    #[case(LockerState::Reserved, LockerEvent::Expire, LockerState::Free)]
    #[case(LockerState::Reserved, LockerEvent::OpenStarted, LockerState::Opening)]
    #[case(LockerState::Owned, LockerEvent::OpenStarted, LockerState::Opening)]
    #[case(LockerState::Free, LockerEvent::OpenStarted, LockerState::Opening)]
    #[case(LockerState::Opening, LockerEvent::ConfirmOwned, LockerState::Owned)]
    #[case(LockerState::Opening, LockerEvent::ConfirmReleased, LockerState::Free)]
    #[case(LockerState::Opening, LockerEvent::OpenFailed, LockerState::Error)]
    #[case(LockerState::Owned, LockerEvent::Release, LockerState::Free)]
    #[case(LockerState::Opening, LockerEvent::Block, LockerState::Blocked)]
    #[case(LockerState::Error, LockerEvent::Block, LockerState::Blocked)]
    #[case(LockerState::Blocked, LockerEvent::Unblock, LockerState::Free)]
    #[case(LockerState::Error, LockerEvent::Reset, LockerState::Free)]
    #[case(LockerState::Owned, LockerEvent::Reset, LockerState::Free)]
    fn test_legal_transitions(
        #[case] from: LockerState,
        #[case] event: LockerEvent,
        #[case] expected: LockerState,
    ) {
        assert_eq!(next_state(from, event), Some(expected));
        assert_eq!(apply(from, event).unwrap(), expected);
    }

    #[rstest]
    #[case(LockerState::Owned, LockerEvent::Reserve)] // already assigned
    #[case(LockerState::Blocked, LockerEvent::Reserve)]
    #[case(LockerState::Blocked, LockerEvent::OpenStarted)] // blocked stays shut
    #[case(LockerState::Error, LockerEvent::OpenStarted)] // needs staff first
    #[case(LockerState::Opening, LockerEvent::OpenStarted)] // single pulse in flight
    #[case(LockerState::Free, LockerEvent::ConfirmOwned)] // no pulse to confirm
    #[case(LockerState::Free, LockerEvent::Expire)]
    #[case(LockerState::Owned, LockerEvent::Expire)]
    #[case(LockerState::Blocked, LockerEvent::Block)] // not idempotent
    #[case(LockerState::Free, LockerEvent::Unblock)]
    #[case(LockerState::Opening, LockerEvent::Reset)] // wait for the pulse
    fn test_illegal_transitions(#[case] from: LockerState, #[case] event: LockerEvent) {
        assert_eq!(next_state(from, event), None);
        assert!(matches!(
            apply(from, event),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_error_state_requires_staff() {
        // From Error only staff actions lead anywhere.
        for event in [
            LockerEvent::Reserve,
            LockerEvent::Expire,
            LockerEvent::OpenStarted,
            LockerEvent::ConfirmOwned,
            LockerEvent::ConfirmReleased,
            LockerEvent::OpenFailed,
            LockerEvent::Release,
        ] {
            assert_eq!(next_state(LockerState::Error, event), None);
        }
        assert_eq!(
            next_state(LockerState::Error, LockerEvent::Reset),
            Some(LockerState::Free)
        );
        assert_eq!(
            next_state(LockerState::Error, LockerEvent::Block),
            Some(LockerState::Blocked)
        );
    }

    #[rstest]
    // Confirmed reservation becomes ownership.
    #[case(true, false, false, LockerEvent::ConfirmOwned)]
    #[case(true, false, true, LockerEvent::ConfirmOwned)]
    // Open on an owned locker releases it, unless VIP.
    #[case(false, true, false, LockerEvent::ConfirmReleased)]
    #[case(false, true, true, LockerEvent::ConfirmOwned)]
    // Ownerless staff open ends back at Free.
    #[case(false, false, false, LockerEvent::ConfirmReleased)]
    fn test_confirm_open_policy(
        #[case] was_reserved: bool,
        #[case] was_owned: bool,
        #[case] is_vip: bool,
        #[case] expected: LockerEvent,
    ) {
        assert_eq!(
            LockerEvent::confirm_open(was_reserved, was_owned, is_vip),
            expected
        );
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            LockerState::Free,
            LockerState::Reserved,
            LockerState::Opening,
            LockerState::Owned,
            LockerState::Blocked,
            LockerState::Error,
        ] {
            assert_eq!(state.as_str().parse::<LockerState>().unwrap(), state);
        }
        assert!("broken".parse::<LockerState>().is_err());
    }

    #[test]
    fn test_opening_is_not_resting() {
        assert!(!LockerState::Opening.is_resting());
        assert!(LockerState::Free.is_resting());
        assert!(LockerState::Error.is_resting());
    }
}

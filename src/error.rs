//! The error taxonomy surfaced by this crate (§7).
//!
//! `codec::ParseError` (and `codec::slmp::ParseError`, `codec::SlaveIdError`)
//! are the leaf parse-failure types, returned from the pure codec functions
//! and never seen outside a `periodic` call: a bad frame is logged and
//! dropped, it never reaches the application. Everything here is the
//! *reporting* surface: tags passed to the rate-limited `error(...)`
//! callbacks, and the fallible-construction error types for the two engines.

use thiserror::Error;

/// Tag passed to the master's rate-limited `error` callback (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterErrorKind {
    /// A competing master claimed the bus during arbitration.
    ArbitrationFailed,
    /// Two responses with the same frame sequence number arrived for one
    /// device outside `Listen`.
    SlaveDuplication,
    /// A slave's response end code was `CciefbWrongNumberOccupiedStations`.
    SlaveReportsWrongOccupiedCount,
    /// A slave's response end code was `CciefbMasterDuplication`.
    SlaveReportsMasterDuplication,
}

/// Tag passed to the slave's rate-limited `error` callback (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveErrorKind {
    /// The slave-ID list implies a different occupied-station count than
    /// this slave is configured for.
    WrongNumberOccupied,
    /// A second master is also driving this station (request's transmission
    /// bit was already on for us in `MasterNone`).
    SlaveStationDuplication,
    /// A cyclic request arrived from a master other than the one currently
    /// bound to this slave.
    MasterStationDuplication,
}

/// Result of a pending SLMP set-IP request, reported to `set_ip_done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetIpStatus {
    Success,
    Error,
    Timeout,
}

/// Construction-time errors for [`crate::master::MasterEngine`].
///
/// Opening the underlying sockets is a host responsibility performed before
/// the engine is constructed (§1); what the engine itself can reject at
/// `new()` is a configuration that violates the topology invariants of §3.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MasterError {
    #[error("{0} groups configured exceeds the 64-group maximum")]
    TooManyGroups(usize),
    #[error("group {group} has no occupied stations configured")]
    EmptyGroup { group: u8 },
    #[error("group {group} has {occupied} occupied stations, exceeding the 16-station per-group maximum")]
    TooManyOccupiedInGroup { group: u8, occupied: u32 },
    #[error("master configuration totals {total} occupied stations, exceeding the 64-station maximum")]
    TooManyTotalOccupied { total: u32 },
    #[error("device in group {group} has {occupied} occupied stations, outside the 1..=16 range")]
    BadDeviceOccupiedCount { group: u8, occupied: u16 },
    #[error("failed to load the persisted master parameter number: {0}")]
    ParameterStoreLoad(String),
}

/// Construction-time errors for [`crate::slave::SlaveEngine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlaveError {
    #[error("configured occupied count {0} is outside the 1..=16 range")]
    BadOccupiedCount(u16),
    #[error("configured protocol version {0} is not 1 or 2")]
    BadProtocolVersion(u16),
}

//! CC-Link IE Field Basic (CCIEFB) master/slave fieldbus stack.
//!
//! This crate implements both halves of the cyclic protocol (master link-scan
//! and slave responder) plus the SLMP auxiliary protocol used for device
//! discovery and remote IP assignment. It is written against a small set of
//! platform traits ([`platform::Clock`], [`platform::UdpSocket`],
//! [`platform::EthernetInterfaces`], [`platform::ParameterStore`]) so the
//! protocol core has no dependency on any particular OS or executor; a `std`
//! host wires these up with [`platform::std_impl`].
//!
//! Frame parsing and construction never goes through a `#[repr(C)]` struct
//! overlaid on a buffer (see [`codec`]); every wire field is read or written
//! through an explicit endian-aware offset helper instead.

pub mod codec;
pub mod config;
pub mod error;
pub mod limiter;
pub mod master;
pub mod platform;
pub mod slave;
pub mod slmp;
pub mod timer;

/// UDP port the cyclic CCIEFB protocol runs on (§6).
pub const CCIEFB_PORT: u16 = 61450;
/// UDP port the SLMP auxiliary protocol (node-search, set-IP) runs on (§6).
pub const SLMP_PORT: u16 = 61451;

/// Default per-scan response timeout, in milliseconds, used whenever a
/// [`config::GroupConfig`] or a master's request leaves it unspecified (§6).
pub const DEFAULT_TIMEOUT_MS: u16 = 500;
/// Default number of consecutive missed responses tolerated before a device
/// is dropped (§6).
pub const DEFAULT_PARALLEL_OFF_TIMEOUT_COUNT: u16 = 3;
/// Upper bound on a group's constant link-scan period, in milliseconds (§6).
pub const MAX_CONSTANT_LINK_SCAN_MS: u16 = 2000;

/// Window, in microseconds, within which repeated identical warnings/error
/// callbacks are collapsed to one (§4.2, §7).
pub const ERROR_RATE_LIMIT_US: u32 = 1_000_000;
/// Grace period, in microseconds, a slave waits in `WaitDisablingSlave`
/// before giving up on an acknowledgment and disabling unconditionally
/// (§4.4).
pub const SLAVE_DISABLE_GRACE_US: u32 = 2_500_000;

/// Window, in microseconds, a master's arbitration phase waits for a
/// competing master's request before concluding the bus is free (§4.5).
///
/// Not specified exactly by the source material; chosen as one link-scan
/// timeout's worth of silence, which is already the unit the rest of the
/// protocol reasons in. Recorded as an Open Question decision in DESIGN.md.
pub const ARBITRATION_TIMEOUT_US: u32 = 500_000;

/// Collection window, in microseconds, an SLMP node-search request waits for
/// late responses once the expected reply count either arrives or times out
/// (§5.2, "e.g. 2 seconds").
pub const NODE_SEARCH_TIMEOUT_US: u32 = 2_000_000;

/// Timeout, in microseconds, an SLMP set-IP request waits for its single
/// response before being reported to the host as [`error::SetIpStatus::Timeout`].
pub const SET_IP_TIMEOUT_US: u32 = 1_000_000;

/// Fixed size, in octets, of every pre-allocated frame buffer.
///
/// Large enough for the maximum cyclic request/response (16 occupied
/// stations: `request_len(16) == 1283`, `response_len(16) == 1211`) and the
/// SLMP frames, with headroom; buffers are allocated once at engine
/// construction and never resized.
pub const PDU_BUFFER_LEN: usize = 1500;

//! Capability traits the host implements and hands to the master and slave
//! engines.
//!
//! Generalizes the single `Clock` type parameter this crate's ancestor used
//! for its `EndDevice<C: Clock>` to the larger capability set a fieldbus
//! stack needs: a monotonic clock, UDP sockets, Ethernet interface
//! enumeration/configuration (for SLMP's set-IP command), and persistence of
//! the parameter-update number. Engines are generic over these traits rather
//! than boxing `dyn` objects, so a no-heap embedded host pays no allocation
//! cost in the steady-state cyclic path.

mod parameter_store;
pub mod std_impl;

pub use parameter_store::{ParameterStore, ParameterStoreError};

/// A monotonic microsecond clock.
///
/// Every timer and rate limiter in this crate compares against `u32`
/// microsecond timestamps obtained exclusively through this trait; none of
/// them call a system clock directly, so the engines run unmodified on a
/// host with no wall-clock concept.
pub trait Clock {
    /// The current value of a free-running monotonic counter, in
    /// microseconds. May wrap; callers use wrapping arithmetic throughout
    /// (see [`crate::timer::Timer`]).
    fn monotonic_us(&self) -> u32;

    /// Milliseconds since the Unix epoch, or `0` if unavailable. Carried in
    /// the CCIEFB request's `clock_info` field for slave-side diagnostics
    /// only; never interpreted by this crate.
    fn unix_time_ms(&self) -> u64 {
        0
    }
}

/// A non-blocking UDP socket bound to a single local address.
///
/// `send_to`/`recv_from` mirror `std::net::UdpSocket`'s non-blocking
/// interface; a `WouldBlock`-shaped error is expected on every `periodic`
/// tick where no datagram is pending; implementations should surface that as
/// `Ok(None)` from `recv_from` rather than an error variant.
pub trait UdpSocket {
    type Error: core::fmt::Debug;

    /// Send `buf` to `dest` (IPv4 address, host byte order, and port).
    fn send_to(&mut self, buf: &[u8], dest: (u32, u16)) -> Result<usize, Self::Error>;

    /// Receive into `buf`, without blocking. Returns `Ok(None)` if nothing is
    /// pending. Returns the datagram length and the sender's address on
    /// success.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, (u32, u16))>, Self::Error>;
}

/// A single local Ethernet interface, as reported to SLMP node-search and
/// used for IP (re)assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceSettings {
    pub mac_address: [u8; 6],
    pub ip_address: u32,
    pub netmask: u32,
}

/// Enumerates and (re)configures the host's Ethernet interfaces.
///
/// Mirrors the reference implementation's `cl_eth_get_network_settings` /
/// `cl_eth_set_network_settings` platform hooks.
pub trait EthernetInterfaces {
    type Error: core::fmt::Debug;

    /// Current settings for the named interface.
    fn get_network_settings(&self, if_name: &str) -> Result<InterfaceSettings, Self::Error>;

    /// Apply a new IP address and netmask to the named interface. Used only
    /// by the slave-side SLMP set-IP responder.
    fn set_network_settings(
        &mut self,
        if_name: &str,
        ip_address: u32,
        netmask: u32,
    ) -> Result<(), Self::Error>;
}

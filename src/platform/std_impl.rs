//! `std`-backed reference implementations of the platform traits.
//!
//! Useful for running this crate on a desktop/server host and for the test
//! suite; not part of the protocol-core contract itself.

use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::path::PathBuf;
use std::time::Instant;

use super::parameter_store::{self, ParameterStoreError};
use super::{Clock, EthernetInterfaces, InterfaceSettings, ParameterStore, UdpSocket};

/// Wraps [`std::time::Instant`] as a monotonic microsecond [`Clock`].
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        StdClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn monotonic_us(&self) -> u32 {
        self.epoch.elapsed().as_micros() as u32
    }

    fn unix_time_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Wraps a non-blocking [`std::net::UdpSocket`].
pub struct StdUdp {
    socket: StdUdpSocket,
}

impl StdUdp {
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = StdUdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        Ok(StdUdp { socket })
    }
}

impl UdpSocket for StdUdp {
    type Error = io::Error;

    fn send_to(&mut self, buf: &[u8], dest: (u32, u16)) -> Result<usize, Self::Error> {
        let addr = SocketAddrV4::new(Ipv4Addr::from(dest.0), dest.1);
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, (u32, u16))>, Self::Error> {
        match self.socket.recv_from(buf) {
            Ok((n, addr)) => match addr {
                std::net::SocketAddr::V4(v4) => {
                    Ok(Some((n, (u32::from(*v4.ip()), v4.port()))))
                }
                std::net::SocketAddr::V6(_) => Ok(None),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Looks up interface settings via `if_addrs`-style enumeration isn't wired
/// up here; this reference implementation takes a fixed, caller-supplied
/// setting and reports it unconditionally. A real host integration replaces
/// this with actual netlink/ioctl calls, matching the reference `cl_eth.c`
/// platform hook.
pub struct StaticInterfaces {
    pub settings: InterfaceSettings,
}

impl EthernetInterfaces for StaticInterfaces {
    type Error = io::Error;

    fn get_network_settings(&self, _if_name: &str) -> Result<InterfaceSettings, Self::Error> {
        Ok(self.settings)
    }

    fn set_network_settings(
        &mut self,
        _if_name: &str,
        ip_address: u32,
        netmask: u32,
    ) -> Result<(), Self::Error> {
        self.settings.ip_address = ip_address;
        self.settings.netmask = netmask;
        Ok(())
    }
}

/// Persists the parameter-update number as a small file.
pub struct FileParameterStore {
    path: PathBuf,
}

impl FileParameterStore {
    pub fn new(path: PathBuf) -> Self {
        FileParameterStore { path }
    }
}

#[derive(Debug)]
pub enum FileParameterStoreError {
    Io(io::Error),
    Decode(ParameterStoreError),
}

impl From<io::Error> for FileParameterStoreError {
    fn from(e: io::Error) -> Self {
        FileParameterStoreError::Io(e)
    }
}

impl ParameterStore for FileParameterStore {
    type Error = FileParameterStoreError;

    fn load(&mut self) -> Result<Option<u16>, Self::Error> {
        match fs::read(&self.path) {
            Ok(bytes) => parameter_store::decode(&bytes)
                .map(Some)
                .map_err(FileParameterStoreError::Decode),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&mut self, parameter_no: u16) -> Result<(), Self::Error> {
        let buf = parameter_store::encode(parameter_no);
        fs::write(&self.path, buf)?;
        Ok(())
    }
}

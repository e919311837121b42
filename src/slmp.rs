//! The stateful SLMP auxiliary engine: node-search and set-IP (§5).
//!
//! Distinct from [`crate::codec::slmp`], which only builds and parses the
//! wire frames. This module adds the request-serial correlation, collection
//! timers, and the small discovered-node database that make node-search and
//! set-IP usable as one-shot application-facing operations, plus the
//! slave-side responder half that answers both commands when this node is
//! the target rather than the requester.

use crate::codec::endcode::EndCode;
use crate::codec::slmp::{
    self, build_node_search_request, build_node_search_response, build_set_ip_request,
    build_set_ip_response, parse_node_search_request, parse_node_search_response,
    parse_set_ip_request, parse_set_ip_response, NODE_SEARCH_REQUEST_LEN, NODE_SEARCH_RESPONSE_LEN,
    SET_IP_REQUEST_LEN, SET_IP_RESPONSE_LEN,
};
use crate::error::SetIpStatus;
use crate::platform::{EthernetInterfaces, UdpSocket};
use crate::timer::Timer;
use crate::{NODE_SEARCH_TIMEOUT_US, PDU_BUFFER_LEN, SET_IP_TIMEOUT_US, SLMP_PORT};

const BROADCAST_IP: u32 = 0xFFFF_FFFF;
/// Upper bound on how many distinct nodes one node-search round remembers.
/// Additional responses are still counted (`total_count`) but not stored.
const NODE_SEARCH_DB_CAPACITY: usize = 64;

/// One slave discovered by a node-search round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSearchResult {
    pub slave_mac: [u8; 6],
    pub slave_ip: u32,
    pub slave_netmask: u32,
    pub vendor_code: u16,
    pub model_code: u32,
    pub equipment_ver: u16,
    pub slave_status: u16,
}

/// Optional application callbacks, fired from `periodic` (§5, §6).
#[allow(unused_variables)]
pub trait SlmpCallbacks {
    /// A node-search round finished (collection window expired). `total_count`
    /// may exceed `results.len()` if more nodes responded than the database
    /// could hold.
    fn node_search_done(&mut self, results: &[NodeSearchResult], total_count: u16) {}
    fn set_ip_done(&mut self, status: SetIpStatus, slave_mac: [u8; 6]) {}
    /// This node just applied a set-IP request addressed to it (acting as
    /// the slave-side responder, not the requester). A host running a
    /// [`crate::slave::SlaveEngine`] on the same interface should forward
    /// this into [`crate::slave::SlaveEngine::notify_ip_updated`].
    fn local_ip_changed(&mut self, new_ip: u32, new_netmask: u32) {}
}

/// A [`SlmpCallbacks`] that does nothing.
pub struct NoopSlmpCallbacks;
impl SlmpCallbacks for NoopSlmpCallbacks {}

struct PendingSearch {
    serial: u16,
    timer: Timer,
    results: Vec<NodeSearchResult>,
    total_count: u16,
}

struct PendingSetIp {
    serial: u16,
    slave_mac: [u8; 6],
    timer: Timer,
}

/// Drives node-search and set-IP as both requester and slave-side responder.
pub struct SlmpEngine<S: UdpSocket, E: EthernetInterfaces, CB: SlmpCallbacks = NoopSlmpCallbacks> {
    socket: S,
    interfaces: E,
    if_name: String,
    own_mac: [u8; 6],
    vendor_code: u16,
    model_code: u32,
    equipment_ver: u16,
    callbacks: CB,

    next_serial: u16,
    search: Option<PendingSearch>,
    set_ip: Option<PendingSetIp>,
}

impl<S: UdpSocket, E: EthernetInterfaces, CB: SlmpCallbacks> SlmpEngine<S, E, CB> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: S,
        interfaces: E,
        if_name: impl Into<String>,
        own_mac: [u8; 6],
        vendor_code: u16,
        model_code: u32,
        equipment_ver: u16,
        callbacks: CB,
    ) -> Self {
        SlmpEngine {
            socket,
            interfaces,
            if_name: if_name.into(),
            own_mac,
            vendor_code,
            model_code,
            equipment_ver,
            callbacks,
            next_serial: 1,
            search: None,
            set_ip: None,
        }
    }

    fn take_serial(&mut self) -> u16 {
        let serial = self.next_serial;
        self.next_serial = if self.next_serial == u16::MAX { 1 } else { self.next_serial + 1 };
        serial
    }

    /// Start a node-search broadcast. Returns `false` (no-op) if a round is
    /// already in progress.
    pub fn start_node_search(&mut self, now: u32) -> bool {
        if self.search.is_some() {
            return false;
        }
        let own_ip = match self.interfaces.get_network_settings(&self.if_name) {
            Ok(s) => s.ip_address,
            Err(e) => {
                log::warn!("node-search aborted, can't read local interface settings: {:?}", e);
                return false;
            }
        };
        let serial = self.take_serial();
        let mut buf = [0u8; NODE_SEARCH_REQUEST_LEN];
        build_node_search_request(&mut buf, serial, self.own_mac, own_ip);
        if let Err(e) = self.socket.send_to(&buf, (BROADCAST_IP, SLMP_PORT)) {
            log::warn!("node-search broadcast send failed: {:?}", e);
            return false;
        }
        let mut timer = Timer::new();
        timer.start(NODE_SEARCH_TIMEOUT_US, now);
        self.search = Some(PendingSearch {
            serial,
            timer,
            results: Vec::with_capacity(NODE_SEARCH_DB_CAPACITY),
            total_count: 0,
        });
        true
    }

    /// Ask a specific slave (by MAC) to take on a new IP/netmask. Returns
    /// `false` (no-op) if a set-IP round is already in progress.
    pub fn start_set_ip(&mut self, slave_mac: [u8; 6], new_ip: u32, new_netmask: u32, now: u32) -> bool {
        if self.set_ip.is_some() {
            return false;
        }
        let own_ip = match self.interfaces.get_network_settings(&self.if_name) {
            Ok(s) => s.ip_address,
            Err(e) => {
                log::warn!("set-ip aborted, can't read local interface settings: {:?}", e);
                return false;
            }
        };
        let serial = self.take_serial();
        let mut buf = [0u8; SET_IP_REQUEST_LEN];
        build_set_ip_request(&mut buf, serial, self.own_mac, own_ip, slave_mac, new_ip, new_netmask);
        if let Err(e) = self.socket.send_to(&buf, (BROADCAST_IP, SLMP_PORT)) {
            log::warn!("set-ip request send failed: {:?}", e);
            return false;
        }
        let mut timer = Timer::new();
        timer.start(SET_IP_TIMEOUT_US, now);
        self.set_ip = Some(PendingSetIp { serial, slave_mac, timer });
        true
    }

    pub fn node_search_pending(&self) -> bool {
        self.search.is_some()
    }

    pub fn set_ip_pending(&self) -> bool {
        self.set_ip.is_some()
    }

    pub fn periodic(&mut self, now: u32) {
        if let Some(search) = &self.search {
            if search.timer.is_expired(now) {
                let search = self.search.take().unwrap();
                self.callbacks.node_search_done(&search.results, search.total_count);
            }
        }
        if let Some(set_ip) = &self.set_ip {
            if set_ip.timer.is_expired(now) {
                let set_ip = self.set_ip.take().unwrap();
                self.callbacks.set_ip_done(SetIpStatus::Timeout, set_ip.slave_mac);
            }
        }

        let mut buf = [0u8; PDU_BUFFER_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok(Some((len, _from))) => self.on_datagram(&buf[..len]),
                Ok(None) => break,
                Err(e) => {
                    log::debug!("slmp socket recv error: {:?}", e);
                    break;
                }
            }
        }
    }

    fn on_datagram(&mut self, buf: &[u8]) {
        if let Ok(req) = parse_node_search_request(buf) {
            if req.master_mac != self.own_mac {
                self.respond_node_search(req.serial, req.master_mac, req.master_ip);
            }
            return;
        }
        if let Ok(req) = parse_set_ip_request(buf) {
            if req.master_mac != self.own_mac && req.slave_mac == self.own_mac {
                self.respond_set_ip(req.serial, req.master_mac, req.slave_new_ip, req.slave_new_netmask);
            }
            return;
        }
        if let Some(search) = &mut self.search {
            if let Ok(resp) = parse_node_search_response(buf) {
                if resp.serial == search.serial {
                    search.total_count += 1;
                    if search.results.len() < NODE_SEARCH_DB_CAPACITY {
                        search.results.push(NodeSearchResult {
                            slave_mac: resp.slave_mac,
                            slave_ip: resp.slave_ip,
                            slave_netmask: resp.slave_netmask,
                            vendor_code: resp.vendor_code,
                            model_code: resp.model_code,
                            equipment_ver: resp.equipment_ver,
                            slave_status: resp.slave_status,
                        });
                    }
                    return;
                }
            }
        }
        if let Some(set_ip) = &self.set_ip {
            if let Ok(resp) = parse_set_ip_response(buf) {
                if resp.serial == set_ip.serial {
                    let slave_mac = set_ip.slave_mac;
                    self.set_ip = None;
                    let status = if resp.end_code == EndCode::SUCCESS {
                        SetIpStatus::Success
                    } else {
                        SetIpStatus::Error
                    };
                    self.callbacks.set_ip_done(status, slave_mac);
                }
            }
        }
    }

    fn respond_node_search(&mut self, serial: u16, master_mac: [u8; 6], master_ip: u32) {
        let settings = match self.interfaces.get_network_settings(&self.if_name) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("can't answer node-search, no local interface settings: {:?}", e);
                return;
            }
        };
        let mut buf = [0u8; NODE_SEARCH_RESPONSE_LEN];
        build_node_search_response(
            &mut buf,
            serial,
            master_mac,
            master_ip,
            self.own_mac,
            settings.ip_address,
            settings.netmask,
            self.vendor_code,
            self.model_code,
            self.equipment_ver,
        );
        if let Err(e) = self.socket.send_to(&buf, (master_ip, SLMP_PORT)) {
            log::debug!("node-search response send to {master_ip:08X} failed: {:?}", e);
        }
    }

    fn respond_set_ip(&mut self, serial: u16, master_mac: [u8; 6], new_ip: u32, new_netmask: u32) {
        let end_code = match self.interfaces.set_network_settings(&self.if_name, new_ip, new_netmask) {
            Ok(()) => EndCode::SUCCESS,
            Err(e) => {
                log::warn!("applying set-ip request failed: {:?}", e);
                EndCode::COMMAND_ERROR
            }
        };
        let mut buf = [0u8; SET_IP_RESPONSE_LEN];
        build_set_ip_response(&mut buf, serial, end_code, self.own_mac);
        if let Err(e) = self.socket.send_to(&buf, (master_mac_to_ip(master_mac), SLMP_PORT)) {
            log::debug!("set-ip response send failed: {:?}", e);
        }
        if end_code == EndCode::SUCCESS {
            self.callbacks.local_ip_changed(new_ip, new_netmask);
        }
    }
}

/// The set-IP response is addressed by MAC in the reference protocol, but
/// this crate's [`UdpSocket`] only sends by IP; responders reply to the
/// broadcast address rather than resolving the requester's IP from its MAC,
/// matching how `codec::slmp::build_set_ip_request` leaves no room for one
/// anyway (the request only carries `master_ip`, which this function doesn't
/// have in scope at the call site). See DESIGN.md.
fn master_mac_to_ip(_master_mac: [u8; 6]) -> u32 {
    BROADCAST_IP
}

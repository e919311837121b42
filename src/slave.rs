//! The slave-side finite state machine (§4.4).
//!
//! One [`SlaveEngine`] drives one physical slave's single occupied-station
//! range against whichever master currently claims it. It owns its two
//! response frame buffers (`normal` and `error`) and mutates them in place;
//! the zero-copy RX/RWr exposure to the host application is a slice into the
//! `normal` buffer (§3).

use crate::codec::cciefb::{
    self, analyze_slave_ids, initialise_response_frame, update_response_frame_headers,
    ParsedRequest, RequestLayout, ResponseLayout, SlaveIdMatch,
};
use crate::codec::endcode::EndCode;
use crate::config::SlaveConfig;
use crate::error::{SlaveError, SlaveErrorKind};
use crate::limiter::RateLimiter;
use crate::platform::UdpSocket;
use crate::timer::Timer;
use crate::{CCIEFB_PORT, ERROR_RATE_LIMIT_US, PDU_BUFFER_LEN, SLAVE_DISABLE_GRACE_US};

/// States of the slave FSM (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    SlaveDown,
    MasterNone,
    MasterControl,
    WaitDisablingSlave,
    SlaveDisabled,
}

/// What the slave currently knows about the master bound to it.
#[derive(Debug, Clone, Copy)]
struct MasterRecord {
    master_ip: u32,
    protocol_ver: u16,
    master_local_unit_info: u16,
    parameter_no: u16,
    group_no: u8,
    station_no: u16,
    timeout_ms: u16,
    timeout_count: u16,
}

/// Optional application callbacks fired synchronously from `periodic` (§6).
///
/// All methods have a no-op default, matching "all optional"; a host
/// implements only the ones it cares about.
#[allow(unused_variables)]
pub trait SlaveCallbacks {
    fn state_change(&mut self, state: SlaveState) {}
    /// Fires on any transition of (connected, protocol_ver,
    /// master_local_unit_info). `stopped_by_user` is only meaningful for
    /// protocol v2; both it and `protocol_ver` report as `false`/`0` when
    /// `connected` is `false`.
    fn master_state(&mut self, connected: bool, protocol_ver: u16, stopped_by_user: bool) {}
    fn error(&mut self, kind: SlaveErrorKind, master_ip: u32) {}
    fn connect(&mut self, master_ip: u32, group_no: u8, station_no: u16) {}
    fn disconnect(&mut self) {}
}

/// A [`SlaveCallbacks`] that does nothing; the default when a host doesn't
/// care to observe the slave's state at all.
pub struct NoopSlaveCallbacks;
impl SlaveCallbacks for NoopSlaveCallbacks {}

fn collect_slave_ids(buf: &[u8], layout: &RequestLayout) -> Vec<u32> {
    (0..layout.occupied as usize)
        .map(|i| layout.slave_id(buf, i))
        .collect()
}

fn running_bit_on(state: u16, station_no: u16) -> bool {
    (state >> (station_no - 1)) & 1 == 1
}

/// Drives one slave endpoint: master acquisition, cyclic response, graceful
/// disconnect, and duplication detection.
pub struct SlaveEngine<S: UdpSocket, CB: SlaveCallbacks = NoopSlaveCallbacks> {
    config: SlaveConfig,
    state: SlaveState,
    socket: S,
    callbacks: CB,

    master: Option<MasterRecord>,
    receive_timer: Timer,
    grace_timer: Timer,
    warn_limiter: RateLimiter,
    error_limiter: RateLimiter,

    normal_response: Vec<u8>,
    normal_layout: ResponseLayout,
    error_response: Vec<u8>,
    error_layout: ResponseLayout,

    /// Verbatim copy of the most recently accepted RY area, little-endian.
    incoming_ry: Vec<u8>,
    /// Verbatim copy of the most recently accepted RWw area, little-endian.
    incoming_rww: Vec<u8>,

    slave_local_unit_info: u16,
    slave_err_code: u16,
    local_management_info: u32,
}

impl<S: UdpSocket, CB: SlaveCallbacks> SlaveEngine<S, CB> {
    pub fn new(config: SlaveConfig, socket: S, callbacks: CB) -> Result<Self, SlaveError> {
        if !(1..=16).contains(&config.occupied) {
            return Err(SlaveError::BadOccupiedCount(config.occupied));
        }
        if !(1..=2).contains(&config.protocol_ver) {
            return Err(SlaveError::BadProtocolVersion(config.protocol_ver));
        }

        let response_len = cciefb::response_len(config.occupied);
        let mut normal_response = vec![0u8; PDU_BUFFER_LEN.max(response_len)];
        let normal_layout = initialise_response_frame(
            &mut normal_response,
            config.protocol_ver,
            config.vendor_code,
            config.model_code,
            config.equipment_ver,
            config.occupied,
        );
        let mut error_response = vec![0u8; PDU_BUFFER_LEN.max(response_len)];
        let error_layout = initialise_response_frame(
            &mut error_response,
            config.protocol_ver,
            config.vendor_code,
            config.model_code,
            config.equipment_ver,
            config.occupied,
        );

        Ok(SlaveEngine {
            config,
            state: SlaveState::SlaveDown,
            socket,
            callbacks,
            master: None,
            receive_timer: Timer::new(),
            grace_timer: Timer::new(),
            warn_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
            error_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
            normal_response,
            normal_layout,
            error_response,
            error_layout,
            incoming_ry: vec![0u8; config.occupied as usize * cciefb::BIT_BLOCK_LEN],
            incoming_rww: vec![0u8; config.occupied as usize * cciefb::REGISTER_BLOCK_LEN],
            slave_local_unit_info: 0,
            slave_err_code: 0,
            local_management_info: 0,
        })
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    /// The application-facing RX area: a slice into the `normal` response
    /// buffer, so writes here are visible to the very next reply with no
    /// intervening copy (§3).
    pub fn rx_mut(&mut self) -> &mut [u8] {
        let layout = self.normal_layout;
        let end = layout.rx_offset + self.config.occupied as usize * cciefb::BIT_BLOCK_LEN;
        &mut self.normal_response[layout.rx_offset..end]
    }

    /// The application-facing RWr area, same zero-copy exposure as [`Self::rx_mut`].
    pub fn rwr_mut(&mut self) -> &mut [u8] {
        let layout = self.normal_layout;
        let end = layout.rwr_offset + self.config.occupied as usize * cciefb::REGISTER_BLOCK_LEN;
        &mut self.normal_response[layout.rwr_offset..end]
    }

    /// The most recently accepted RY area, verbatim little-endian.
    pub fn ry(&self) -> &[u8] {
        &self.incoming_ry
    }

    /// The most recently accepted RWw area, verbatim little-endian.
    pub fn rww(&self) -> &[u8] {
        &self.incoming_rww
    }

    pub fn set_slave_err_code(&mut self, code: u16) {
        self.slave_err_code = code;
    }

    pub fn set_local_management_info(&mut self, info: u32) {
        self.local_management_info = info;
    }

    /// `Startup` event: begin listening for a master.
    pub fn start(&mut self, now: u32) {
        if self.state != SlaveState::SlaveDown {
            return;
        }
        self.enter_master_none();
        let _ = now;
    }

    /// `DisableSlave` event, driven by the host application.
    pub fn disable(&mut self, now: u32) {
        match self.state {
            SlaveState::MasterNone => {
                log::info!("slave disabled while unbound");
                self.set_state(SlaveState::SlaveDisabled, now);
            }
            SlaveState::MasterControl => {
                log::info!("slave disabling, entering grace period");
                self.set_state(SlaveState::WaitDisablingSlave, now);
            }
            _ => {}
        }
    }

    /// `ReenableSlave` event, driven by the host application.
    pub fn enable(&mut self) {
        match self.state {
            SlaveState::WaitDisablingSlave | SlaveState::SlaveDisabled => {
                log::info!("slave re-enabled");
                self.enter_master_none();
            }
            _ => {}
        }
    }

    /// `IpUpdated` event: the host just changed this interface's IP address
    /// (typically via the SLMP set-IP responder). Any existing master
    /// binding is now stale.
    pub fn notify_ip_updated(&mut self, now: u32) {
        match self.state {
            SlaveState::MasterControl => {
                log::info!("local IP updated, dropping master binding");
                self.enter_master_none();
            }
            SlaveState::WaitDisablingSlave => {
                log::info!("local IP updated while disabling");
                self.set_state(SlaveState::SlaveDisabled, now);
            }
            _ => {}
        }
    }

    pub fn periodic(&mut self, now: u32) {
        self.warn_limiter.periodic(now);
        self.error_limiter.periodic(now);

        if self.receive_timer.is_expired(now) {
            self.receive_timer.stop();
            if self.state == SlaveState::MasterControl {
                log::info!("master receive timeout, unbinding");
                self.enter_master_none();
            }
        }
        if self.grace_timer.is_expired(now) {
            self.grace_timer.stop();
            if self.state == SlaveState::WaitDisablingSlave {
                self.set_state(SlaveState::SlaveDisabled, now);
            }
        }

        let mut buf = [0u8; PDU_BUFFER_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok(Some((len, (source_ip, _port)))) => {
                    self.on_datagram(&buf[..len], source_ip, now);
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("slave socket recv error: {:?}", e);
                    break;
                }
            }
        }
    }

    fn on_datagram(&mut self, buf: &[u8], source_ip: u32, now: u32) {
        let req = match cciefb::parse_request(buf, source_ip) {
            Ok(req) => req,
            Err(e) => {
                log::debug!("dropping unparseable cyclic request from {source_ip:08X}: {e}");
                return;
            }
        };
        self.on_request(buf, &req, source_ip, now);
    }

    fn on_request(&mut self, buf: &[u8], req: &ParsedRequest, source_ip: u32, now: u32) {
        match self.state {
            SlaveState::SlaveDown | SlaveState::SlaveDisabled => {}
            SlaveState::MasterNone => self.search_slave_parameters(buf, req, source_ip, now, true),
            SlaveState::MasterControl => {
                let bound_ip = self.master.as_ref().expect("bound in MasterControl").master_ip;
                if req.master_id == bound_ip {
                    self.search_slave_parameters(buf, req, source_ip, now, false);
                } else {
                    self.on_foreign_master(buf, req, source_ip, now);
                }
            }
            SlaveState::WaitDisablingSlave => {
                let list = collect_slave_ids(buf, &req.layout);
                if let Ok(Some(m)) = analyze_slave_ids(&list, self.config.my_slave_id) {
                    if running_bit_on(req.cyclic_transmission_state, m.station_no) {
                        self.send_error(source_ip, req.group_no, req.frame_sequence_no, EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT);
                    }
                }
            }
        }
    }

    /// A cyclic request arrived from a master other than the one we are
    /// currently bound to. If it doesn't even address us, it's unrelated
    /// broadcast traffic and is ignored; if it does and its bit for us is
    /// on, a second master is trying to claim this station.
    fn on_foreign_master(&mut self, buf: &[u8], req: &ParsedRequest, source_ip: u32, now: u32) {
        let list = collect_slave_ids(buf, &req.layout);
        let found = match analyze_slave_ids(&list, self.config.my_slave_id) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("malformed slave-ID list from {source_ip:08X}: {e}");
                return;
            }
        };
        let Some(m) = found else { return };
        if !running_bit_on(req.cyclic_transmission_state, m.station_no) {
            return;
        }
        self.send_error(source_ip, req.group_no, req.frame_sequence_no, EndCode::CCIEFB_MASTER_DUPLICATION);
        self.fire_error(SlaveErrorKind::MasterStationDuplication, source_ip, now);
    }

    fn search_slave_parameters(
        &mut self,
        buf: &[u8],
        req: &ParsedRequest,
        source_ip: u32,
        now: u32,
        in_master_none: bool,
    ) {
        let list = collect_slave_ids(buf, &req.layout);
        let found = match analyze_slave_ids(&list, self.config.my_slave_id) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("malformed slave-ID list from {source_ip:08X}: {e}");
                return;
            }
        };
        let Some(m) = found else { return };

        if m.occupied != self.config.occupied {
            self.send_error(source_ip, req.group_no, req.frame_sequence_no, EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS);
            self.fire_warn_wrong_count(source_ip, now);
            if !in_master_none {
                self.enter_master_none();
            }
            return;
        }

        let bit_on = running_bit_on(req.cyclic_transmission_state, m.station_no);

        if in_master_none {
            if bit_on {
                // The master already believes this station is running under
                // someone else; per the reference firmware this is treated
                // as a duplicate, and the frame is dropped without a state
                // change (§9 "ambiguous source behaviour").
                self.fire_error(SlaveErrorKind::SlaveStationDuplication, source_ip, now);
                return;
            }
            self.handle_new_master(buf, req, source_ip, m, now);
        } else if req.parameter_no != self.master.as_ref().unwrap().parameter_no
            || req.frame_sequence_no == 0
        {
            self.handle_new_master(buf, req, source_ip, m, now);
        } else {
            self.handle_cyclic(buf, req, source_ip, m, now);
        }
    }

    fn handle_new_master(
        &mut self,
        buf: &[u8],
        req: &ParsedRequest,
        source_ip: u32,
        m: SlaveIdMatch,
        now: u32,
    ) {
        let timeout_ms = if req.timeout_value == 0 { crate::DEFAULT_TIMEOUT_MS } else { req.timeout_value };
        let timeout_count = if req.parallel_off_timeout_count == 0 {
            crate::DEFAULT_PARALLEL_OFF_TIMEOUT_COUNT
        } else {
            req.parallel_off_timeout_count
        };
        let was_control = self.state == SlaveState::MasterControl;
        let prior = self.master.as_ref();
        let master_state_changed = !was_control
            || prior.map_or(true, |p| {
                p.protocol_ver != req.protocol_ver || p.master_local_unit_info != req.master_local_unit_info
            });
        self.master = Some(MasterRecord {
            master_ip: source_ip,
            protocol_ver: req.protocol_ver,
            master_local_unit_info: req.master_local_unit_info,
            parameter_no: req.parameter_no,
            group_no: req.group_no,
            station_no: m.station_no,
            timeout_ms,
            timeout_count,
        });
        self.state = SlaveState::MasterControl;
        if !was_control {
            self.callbacks.state_change(self.state);
        }
        if master_state_changed {
            self.callbacks.master_state(
                true,
                req.protocol_ver,
                req.protocol_ver >= 2 && req.master_local_unit_info & 0b10 != 0,
            );
        }
        self.callbacks.connect(source_ip, req.group_no, m.station_no);
        self.restart_receive_timer(now, timeout_ms, timeout_count);
        self.copy_incoming_cyclic_data(buf, req, m);
        self.send_cyclic_response(source_ip, req.group_no, req.frame_sequence_no);
    }

    fn handle_cyclic(&mut self, buf: &[u8], req: &ParsedRequest, source_ip: u32, m: SlaveIdMatch, now: u32) {
        let (timeout_ms, timeout_count) = {
            let master = self.master.as_ref().unwrap();
            (master.timeout_ms, master.timeout_count)
        };
        self.restart_receive_timer(now, timeout_ms, timeout_count);
        self.copy_incoming_cyclic_data(buf, req, m);
        self.send_cyclic_response(source_ip, req.group_no, req.frame_sequence_no);
    }

    /// Copy this device's slice of the request's RY/RWw area verbatim. The
    /// slice spans every station this device occupies, not just the first.
    fn copy_incoming_cyclic_data(&mut self, buf: &[u8], req: &ParsedRequest, m: SlaveIdMatch) {
        let first_station = (m.station_no - 1) as usize;
        let occ = self.config.occupied as usize;
        let ry_start = req.layout.ry_offset + first_station * cciefb::BIT_BLOCK_LEN;
        let ry_end = ry_start + occ * cciefb::BIT_BLOCK_LEN;
        self.incoming_ry.copy_from_slice(&buf[ry_start..ry_end]);
        let rww_start = req.layout.rww_offset + first_station * cciefb::REGISTER_BLOCK_LEN;
        let rww_end = rww_start + occ * cciefb::REGISTER_BLOCK_LEN;
        self.incoming_rww.copy_from_slice(&buf[rww_start..rww_end]);
    }

    fn restart_receive_timer(&mut self, now: u32, timeout_ms: u16, timeout_count: u16) {
        let period_us = (timeout_ms as u32).saturating_mul(1000).saturating_mul(timeout_count.max(1) as u32);
        self.receive_timer.start(period_us, now);
    }

    fn send_cyclic_response(&mut self, dest_ip: u32, group_no: u8, frame_sequence_no: u16) {
        update_response_frame_headers(
            &mut self.normal_response,
            EndCode::SUCCESS,
            self.config.my_slave_id,
            group_no,
            frame_sequence_no,
            self.slave_local_unit_info,
            self.slave_err_code,
            self.local_management_info,
        );
        let len = cciefb::response_len(self.normal_layout.occupied);
        if let Err(e) = self.socket.send_to(&self.normal_response[..len], (dest_ip, CCIEFB_PORT)) {
            log::debug!("cyclic response send to {dest_ip:08X} failed: {:?}", e);
        }
    }

    /// Send an error-coded response, zero-filling the RX/RWr area (the
    /// `error` buffer never carries live data, per §4.4).
    fn send_error(&mut self, dest_ip: u32, group_no: u8, frame_sequence_no: u16, end_code: EndCode) {
        update_response_frame_headers(
            &mut self.error_response,
            end_code,
            self.config.my_slave_id,
            group_no,
            frame_sequence_no,
            self.slave_local_unit_info,
            self.slave_err_code,
            self.local_management_info,
        );
        let len = cciefb::response_len(self.error_layout.occupied);
        if let Err(e) = self.socket.send_to(&self.error_response[..len], (dest_ip, CCIEFB_PORT)) {
            log::debug!("error response send to {dest_ip:08X} failed: {:?}", e);
        }
    }

    fn fire_warn_wrong_count(&mut self, source_ip: u32, now: u32) {
        if self.warn_limiter.should_run_now(SlaveErrorKind::WrongNumberOccupied as i32, now) {
            log::warn!("request from {source_ip:08X} implies the wrong occupied-station count");
        }
        self.fire_error(SlaveErrorKind::WrongNumberOccupied, source_ip, now);
    }

    fn fire_error(&mut self, kind: SlaveErrorKind, source_ip: u32, now: u32) {
        if self.error_limiter.should_run_now(kind as i32, now) {
            self.callbacks.error(kind, source_ip);
        }
    }

    fn enter_master_none(&mut self) {
        let was_control = self.state == SlaveState::MasterControl;
        self.master = None;
        self.receive_timer.stop();
        self.state = SlaveState::MasterNone;
        if was_control {
            self.callbacks.master_state(false, 0, false);
            self.callbacks.disconnect();
        }
        self.callbacks.state_change(self.state);
    }

    fn set_state(&mut self, state: SlaveState, now: u32) {
        if state == self.state {
            return;
        }
        let was_control = self.state == SlaveState::MasterControl;
        self.state = state;
        match state {
            SlaveState::MasterNone => {
                self.master = None;
                self.receive_timer.stop();
            }
            SlaveState::WaitDisablingSlave => {
                self.master = None;
                self.receive_timer.stop();
                self.grace_timer.start(SLAVE_DISABLE_GRACE_US, now);
            }
            SlaveState::SlaveDisabled => {
                self.grace_timer.stop();
            }
            _ => {}
        }
        if was_control {
            self.callbacks.master_state(false, 0, false);
            self.callbacks.disconnect();
        }
        self.callbacks.state_change(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cciefb::{initialise_request_frame, update_request_frame_headers};
    use crate::config::SlaveConfig;
    use crate::platform::UdpSocket;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockSocket {
        sent: VecDeque<(Vec<u8>, (u32, u16))>,
        inbox: VecDeque<(Vec<u8>, (u32, u16))>,
    }

    impl UdpSocket for MockSocket {
        type Error = std::convert::Infallible;

        fn send_to(&mut self, buf: &[u8], dest: (u32, u16)) -> Result<usize, Self::Error> {
            self.sent.push_back((buf.to_vec(), dest));
            Ok(buf.len())
        }

        fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, (u32, u16))>, Self::Error> {
            match self.inbox.pop_front() {
                Some((data, addr)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(Some((data.len(), addr)))
                }
                None => Ok(None),
            }
        }
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        connects: Vec<(u32, u8, u16)>,
        disconnects: u32,
        errors: Vec<(SlaveErrorKind, u32)>,
    }
    impl SlaveCallbacks for RecordingCallbacks {
        fn connect(&mut self, master_ip: u32, group_no: u8, station_no: u16) {
            self.connects.push((master_ip, group_no, station_no));
        }
        fn disconnect(&mut self) {
            self.disconnects += 1;
        }
        fn error(&mut self, kind: SlaveErrorKind, master_ip: u32) {
            self.errors.push((kind, master_ip));
        }
    }

    const MASTER_IP: u32 = 0xC0A80327; // 192.168.3.39
    const SLAVE_IP: u32 = 0xC0A80328; // 192.168.3.40

    fn build_request(occupied: u16, frame_seq: u16, master_id: u32) -> Vec<u8> {
        let mut buf = vec![0u8; cciefb::request_len(occupied)];
        let layout = initialise_request_frame(&mut buf, 2, 200, 3, master_id, 1, occupied, 1);
        update_request_frame_headers(&mut buf, frame_seq, 0, 0, 0b1);
        crate::codec::bytes::write_u32_le(&mut buf, layout.slave_id_offset, SLAVE_IP);
        buf
    }

    fn new_engine() -> SlaveEngine<MockSocket, RecordingCallbacks> {
        let config = SlaveConfig {
            my_slave_id: SLAVE_IP,
            occupied: 1,
            protocol_ver: 2,
            vendor_code: 0x00C0,
            model_code: 0xDEAD_BEEF,
            equipment_ver: 1,
        };
        SlaveEngine::new(config, MockSocket::default(), RecordingCallbacks::default()).unwrap()
    }

    #[test]
    fn acquires_master_and_replies() {
        let mut slave = new_engine();
        slave.start(0);
        assert_eq!(slave.state(), SlaveState::MasterNone);

        let req = build_request(1, 0, MASTER_IP);
        slave.socket.inbox.push_back((req, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(1_000);

        assert_eq!(slave.state(), SlaveState::MasterControl);
        assert_eq!(slave.callbacks.connects, vec![(MASTER_IP, 1, 1)]);
        assert_eq!(slave.socket.sent.len(), 1);
        let (resp, dest) = &slave.socket.sent[0];
        assert_eq!(dest, &(MASTER_IP, CCIEFB_PORT));
        let parsed = cciefb::parse_response(resp).unwrap();
        assert_eq!(parsed.end_code, EndCode::SUCCESS);
    }

    #[test]
    fn foreign_master_gets_duplication_error() {
        let mut slave = new_engine();
        slave.start(0);
        let req = build_request(1, 0, MASTER_IP);
        slave.socket.inbox.push_back((req, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(1_000);
        slave.socket.sent.clear();

        let other_ip = 0xC0A80329;
        let req2 = build_request(1, 5, other_ip);
        slave.socket.inbox.push_back((req2, (other_ip, CCIEFB_PORT)));
        slave.periodic(2_000);

        assert_eq!(slave.state(), SlaveState::MasterControl);
        let (resp, dest) = &slave.socket.sent[0];
        assert_eq!(dest.0, other_ip);
        let parsed = cciefb::parse_response(resp).unwrap();
        assert_eq!(parsed.end_code, EndCode::CCIEFB_MASTER_DUPLICATION);
        assert_eq!(
            slave.callbacks.errors,
            vec![(SlaveErrorKind::MasterStationDuplication, other_ip)]
        );
    }

    #[test]
    fn wrong_occupied_count_rejected_in_master_none() {
        let mut slave = new_engine();
        slave.start(0);
        let req = build_request(2, 0, MASTER_IP);
        slave.socket.inbox.push_back((req, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(1_000);

        assert_eq!(slave.state(), SlaveState::MasterNone);
        let (resp, _dest) = &slave.socket.sent[0];
        let parsed = cciefb::parse_response(resp).unwrap();
        assert_eq!(parsed.end_code, EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS);
    }

    #[test]
    fn disable_then_reject_then_grace_expiry_then_silence() {
        let mut slave = new_engine();
        slave.start(0);
        let req = build_request(1, 0, MASTER_IP);
        slave.socket.inbox.push_back((req, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(0);
        assert_eq!(slave.state(), SlaveState::MasterControl);

        slave.disable(0);
        assert_eq!(slave.state(), SlaveState::WaitDisablingSlave);
        slave.socket.sent.clear();

        let req2 = build_request(1, 1, MASTER_IP);
        slave.socket.inbox.push_back((req2, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(100);
        let (resp, _dest) = &slave.socket.sent[0];
        let parsed = cciefb::parse_response(resp).unwrap();
        assert_eq!(parsed.end_code, EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT);

        slave.periodic(SLAVE_DISABLE_GRACE_US + 200);
        assert_eq!(slave.state(), SlaveState::SlaveDisabled);

        slave.socket.sent.clear();
        let req3 = build_request(1, 2, MASTER_IP);
        slave.socket.inbox.push_back((req3, (MASTER_IP, CCIEFB_PORT)));
        slave.periodic(SLAVE_DISABLE_GRACE_US + 300);
        assert!(slave.socket.sent.is_empty());

        slave.enable();
        assert_eq!(slave.state(), SlaveState::MasterNone);
    }
}

//! The stateful master engine: one [`MasterEngine`] owns every configured
//! link-scan group and the single CCIEFB socket they all share (§4.5, §4.6,
//! §4.8).
//!
//! Unlike [`crate::slave::SlaveEngine`], a master's request and response
//! traffic share one wire port (§6), so `periodic` sees both this master's
//! own slaves' responses and other masters' competing request frames on the
//! same socket and must tell them apart by trying [`cciefb::parse_response`]
//! first and falling back to [`cciefb::parse_request`].

pub mod device;
pub mod group;

use crate::codec::cciefb::{self, parse_request, parse_response};
use crate::codec::endcode::EndCode;
use crate::config::{GroupConfig, MasterConfig};
use crate::error::{MasterError, MasterErrorKind};
use crate::limiter::RateLimiter;
use crate::platform::{Clock, ParameterStore, UdpSocket};
use crate::{CCIEFB_PORT, ERROR_RATE_LIMIT_US, PDU_BUFFER_LEN};
use group::{DeviceCallbackKind, GroupEngine, GroupState};

const BROADCAST_IP: u32 = 0xFFFF_FFFF;

/// Optional application callbacks, fired synchronously from `periodic` (§6).
#[allow(unused_variables)]
pub trait MasterCallbacks {
    /// A group entered `MasterArbitration` or `MasterLinkScanComp`; these are
    /// the two states the source material calls out as updating the
    /// user-visible master_state (see DESIGN.md).
    fn state_change(&mut self, group_no: u8, state: GroupState) {}
    fn link_scan_done(&mut self, group_no: u8, success: bool) {}
    fn error(&mut self, kind: MasterErrorKind, ip: u32, extra: u32) {}
    fn connect(&mut self, group_no: u8, device_index: usize, ip: u32) {}
    fn disconnect(&mut self, group_no: u8, device_index: usize, ip: u32) {}
    fn slaveinfo_changed(&mut self, group_no: u8, device_index: usize, end_code: EndCode, err: u16, mgmt: u32) {}
    fn alarm_frame(&mut self, group_no: u8, device_index: usize, end_code: EndCode, err: u16, mgmt: u32) {}
}

/// A [`MasterCallbacks`] that does nothing.
pub struct NoopMasterCallbacks;
impl MasterCallbacks for NoopMasterCallbacks {}

/// Drives every configured link-scan group against one shared CCIEFB socket.
pub struct MasterEngine<S: UdpSocket, C: Clock, PS: ParameterStore, CB: MasterCallbacks = NoopMasterCallbacks> {
    master_id: u32,
    socket: S,
    clock: C,
    parameter_store: PS,
    callbacks: CB,

    groups: Vec<GroupEngine>,
    parameter_no: u16,
    stopped_by_user: bool,

    error_limiter: RateLimiter,
}

impl<S: UdpSocket, C: Clock, PS: ParameterStore, CB: MasterCallbacks> MasterEngine<S, C, PS, CB> {
    pub fn new(config: &MasterConfig, socket: S, clock: C, mut parameter_store: PS, callbacks: CB) -> Result<Self, MasterError> {
        if config.groups.len() > 64 {
            return Err(MasterError::TooManyGroups(config.groups.len()));
        }
        let total: u32 = config.groups.iter().map(|g| g.total_occupied()).sum();
        if total > 64 {
            return Err(MasterError::TooManyTotalOccupied { total });
        }

        let parameter_no = parameter_store
            .load()
            .map_err(|e| MasterError::ParameterStoreLoad(format!("{e:?}")))?
            .unwrap_or(1);

        let mut groups = Vec::with_capacity(config.groups.len());
        for g in &config.groups {
            groups.push(GroupEngine::new(g, config.master_id, parameter_no)?);
        }

        Ok(MasterEngine {
            master_id: config.master_id,
            socket,
            clock,
            parameter_store,
            callbacks,
            groups,
            parameter_no,
            stopped_by_user: config.stopped_by_user,
            error_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
        })
    }

    pub fn group(&self, group_no: u8) -> Option<&GroupEngine> {
        self.groups.iter().find(|g| g.group_no() == group_no)
    }

    fn group_index(&self, group_no: u8) -> Option<usize> {
        self.groups.iter().position(|g| g.group_no() == group_no)
    }

    fn master_local_unit_info(&self) -> u16 {
        if self.stopped_by_user {
            0b10
        } else {
            0
        }
    }

    /// `Startup` event, applied to every configured group: `group_init`
    /// followed immediately by `reflect_group_parameters` (§4.6) — the
    /// source material names no separate trigger for leaving the transient
    /// `MasterListen` state once a group's configuration is already known at
    /// construction time (see DESIGN.md).
    pub fn start(&mut self, now: u32) {
        for idx in 0..self.groups.len() {
            self.groups[idx].group_init(now);
            self.groups[idx].enter_arbitration(now);
        }
    }

    /// `ParameterChange`/`NewConfig` events: replace one group's
    /// configuration, bumping and persisting the master's parameter-id
    /// number (I8).
    pub fn reconfigure_group(&mut self, config: &GroupConfig, now: u32) -> Result<(), MasterError> {
        self.parameter_no = if self.parameter_no == u16::MAX { 1 } else { self.parameter_no + 1 };
        self.parameter_store
            .store(self.parameter_no)
            .map_err(|e| MasterError::ParameterStoreLoad(format!("{e:?}")))?;

        match self.group_index(config.group_no) {
            Some(idx) => {
                let edges = self.groups[idx].reconfigure(config, self.master_id, self.parameter_no, now)?;
                self.fire_edges(config.group_no, edges);
                self.groups[idx].group_init(now);
                self.groups[idx].enter_arbitration(now);
                self.callbacks.state_change(config.group_no, self.groups[idx].state());
            }
            None => {
                let mut g = GroupEngine::new(config, self.master_id, self.parameter_no)?;
                g.group_init(now);
                g.enter_arbitration(now);
                self.groups.push(g);
            }
        }
        Ok(())
    }

    pub fn periodic(&mut self, now: u32) {
        self.error_limiter.periodic(now);
        for idx in 0..self.groups.len() {
            self.groups[idx].warn_limiter().periodic(now);
            self.groups[idx].error_limiter().periodic(now);
            self.groups[idx].alarm_limiter().periodic(now);
        }

        for idx in 0..self.groups.len() {
            self.service_group_timers(idx, now);
        }

        let mut buf = [0u8; PDU_BUFFER_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok(Some((len, (source_ip, _port)))) => self.on_datagram(&buf[..len], source_ip, now),
                Ok(None) => break,
                Err(e) => {
                    log::debug!("master socket recv error: {:?}", e);
                    break;
                }
            }
        }
    }

    fn service_group_timers(&mut self, idx: usize, now: u32) {
        if self.groups[idx].arbitration_expired(now) {
            self.groups[idx].on_arbitration_done(now);
            let group_no = self.groups[idx].group_no();
            self.callbacks.state_change(group_no, self.groups[idx].state());
            self.issue_scan(idx, now);
            return;
        }
        if self.groups[idx].response_expired(now) {
            let edges = self.groups[idx].on_linkscan_timeout();
            let group_no = self.groups[idx].group_no();
            self.fire_edges(group_no, edges);
            self.callbacks.link_scan_done(group_no, false);
            self.callbacks.state_change(group_no, self.groups[idx].state());
            self.issue_scan(idx, now);
            return;
        }
        if self.groups[idx].constant_scan_due(now) {
            self.issue_scan(idx, now);
        }
    }

    fn issue_scan(&mut self, idx: usize, now: u32) {
        let unix_ms = self.clock.unix_time_ms();
        let master_local_unit_info = self.master_local_unit_info();
        let edges = self.groups[idx].start_scan(now, unix_ms, master_local_unit_info);
        let group_no = self.groups[idx].group_no();
        self.fire_edges(group_no, edges);
        if let Err(e) = self.socket.send_to(self.groups[idx].request_frame(), (BROADCAST_IP, CCIEFB_PORT)) {
            log::debug!("group {group_no} request broadcast failed: {:?}", e);
        }
    }

    fn on_datagram(&mut self, buf: &[u8], source_ip: u32, now: u32) {
        if let Ok(parsed) = parse_response(buf) {
            if let Some(idx) = self.group_index(parsed.group_no) {
                let outcome = self.groups[idx].ingest_response(now, source_ip, buf, &parsed);
                self.apply_outcome(idx, source_ip, &parsed, outcome, now);
            }
            return;
        }
        if let Ok(req) = parse_request(buf, source_ip) {
            if req.master_id == self.master_id {
                return;
            }
            self.on_foreign_master(&req, now);
        }
    }

    fn apply_outcome(
        &mut self,
        idx: usize,
        source_ip: u32,
        parsed: &cciefb::ParsedResponse,
        outcome: group::ResponseOutcome,
        now: u32,
    ) {
        let group_no = self.groups[idx].group_no();
        let Some(device_index) = outcome.device_index else { return };

        if outcome.duplicate {
            self.fire_error(MasterErrorKind::SlaveDuplication, source_ip, group_no as u32, now);
        }
        if outcome.slaveinfo_changed {
            self.callbacks.slaveinfo_changed(
                group_no,
                device_index,
                parsed.end_code,
                parsed.slave_err_code,
                parsed.local_management_info,
            );
        }
        if outcome.alarm {
            self.callbacks.alarm_frame(
                group_no,
                device_index,
                parsed.end_code,
                parsed.slave_err_code,
                parsed.local_management_info,
            );
            let kind = match parsed.end_code {
                EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS => Some(MasterErrorKind::SlaveReportsWrongOccupiedCount),
                EndCode::CCIEFB_MASTER_DUPLICATION => Some(MasterErrorKind::SlaveReportsMasterDuplication),
                // CciefbSlaveError / disconnect-request are reported via
                // alarm_frame only, not the rate-limited error callback.
                _ => None,
            };
            if let Some(kind) = kind {
                self.fire_error(kind, source_ip, group_no as u32, now);
            }
        }

        self.fire_edges(group_no, outcome.device_events);

        if let Some(success) = outcome.scan_completed {
            self.callbacks.link_scan_done(group_no, success);
            self.callbacks.state_change(group_no, self.groups[idx].state());
            if self.groups[idx].scans_back_to_back() {
                self.issue_scan(idx, now);
            }
        }
    }

    fn on_foreign_master(&mut self, req: &cciefb::ParsedRequest, now: u32) {
        let Some(idx) = self.group_index(req.group_no) else { return };
        let affected = match self.groups[idx].state() {
            GroupState::MasterArbitration => self.groups[idx].on_req_from_other(now),
            GroupState::MasterLinkScan | GroupState::MasterLinkScanComp => self.groups[idx].on_masterdupl_alarm(now),
            _ => false,
        };
        if affected {
            self.fire_error(MasterErrorKind::ArbitrationFailed, req.master_id, req.group_no as u32, now);
        }
    }

    fn fire_edges(&mut self, group_no: u8, edges: Vec<(usize, DeviceCallbackKind)>) {
        for (idx, kind) in edges {
            match kind {
                DeviceCallbackKind::Connect(ip) => self.callbacks.connect(group_no, idx, ip),
                DeviceCallbackKind::Disconnect(ip) => self.callbacks.disconnect(group_no, idx, ip),
            }
        }
    }

    fn fire_error(&mut self, kind: MasterErrorKind, ip: u32, extra: u32, now: u32) {
        if self.error_limiter.should_run_now(kind as i32, now) {
            self.callbacks.error(kind, ip, extra);
        }
    }

    pub fn device_ry_mut(&mut self, group_no: u8, device_index: usize) -> Option<&mut [u8]> {
        let idx = self.group_index(group_no)?;
        Some(self.groups[idx].device_ry_mut(device_index))
    }

    pub fn device_rww_mut(&mut self, group_no: u8, device_index: usize) -> Option<&mut [u8]> {
        let idx = self.group_index(group_no)?;
        Some(self.groups[idx].device_rww_mut(device_index))
    }

    pub fn device_rx(&self, group_no: u8, device_index: usize) -> Option<&[u8]> {
        let idx = self.group_index(group_no)?;
        Some(self.groups[idx].device_rx(device_index))
    }

    pub fn device_rwr(&self, group_no: u8, device_index: usize) -> Option<&[u8]> {
        let idx = self.group_index(group_no)?;
        Some(self.groups[idx].device_rwr(device_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cciefb::{initialise_response_frame, update_response_frame_headers};
    use crate::config::DeviceConfig;
    use std::cell::Cell;
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

    struct FixedClock;
    impl Clock for FixedClock {
        fn monotonic_us(&self) -> u32 {
            0
        }
    }

    #[derive(Default)]
    struct MemParameterStore {
        value: Option<u16>,
    }
    impl ParameterStore for MemParameterStore {
        type Error = std::convert::Infallible;
        fn load(&mut self) -> Result<Option<u16>, Self::Error> {
            Ok(self.value)
        }
        fn store(&mut self, parameter_no: u16) -> Result<(), Self::Error> {
            self.value = Some(parameter_no);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        connects: Cell<u32>,
        link_scans: Cell<u32>,
    }
    impl MasterCallbacks for RecordingCallbacks {
        fn connect(&mut self, _group_no: u8, _device_index: usize, _ip: u32) {
            self.connects.set(self.connects.get() + 1);
        }
        fn link_scan_done(&mut self, _group_no: u8, _success: bool) {
            self.link_scans.set(self.link_scans.get() + 1);
        }
    }

    const MASTER_IP: u32 = 0xC0A80301;
    const SLAVE_IP: u32 = 0xC0A80302;

    fn one_device_master_config() -> MasterConfig {
        let mut master = MasterConfig::new(MASTER_IP, [0, 1, 2, 3, 4, 5]);
        let mut group = GroupConfig::new(1);
        group.timeout_ms = 100;
        group.parallel_off_timeout_count = 3;
        group.devices.push(DeviceConfig::new(SLAVE_IP, 1));
        master.groups.push(group);
        master
    }

    fn new_engine() -> MasterEngine<MockSocket, FixedClock, MemParameterStore, RecordingCallbacks> {
        MasterEngine::new(
            &one_device_master_config(),
            MockSocket::default(),
            FixedClock,
            MemParameterStore::default(),
            RecordingCallbacks::default(),
        )
        .unwrap()
    }

    #[test]
    fn startup_broadcasts_request_after_arbitration_timeout() {
        let mut m = new_engine();
        m.start(0);
        assert_eq!(m.group(1).unwrap().state(), GroupState::MasterArbitration);

        m.periodic(crate::ARBITRATION_TIMEOUT_US + 1);
        assert_eq!(m.group(1).unwrap().state(), GroupState::MasterLinkScan);
        assert_eq!(m.socket.sent.len(), 1);
        assert_eq!(m.socket.sent[0].1, (BROADCAST_IP, CCIEFB_PORT));
    }

    #[test]
    fn slave_response_connects_device_and_completes_scan() {
        let mut m = new_engine();
        m.start(0);
        m.periodic(crate::ARBITRATION_TIMEOUT_US + 1);
        assert_eq!(m.callbacks.connects.get(), 1);

        let mut resp = vec![0u8; cciefb::response_len(1)];
        initialise_response_frame(&mut resp, 2, 0x00C0, 0xDEAD_BEEF, 1, 1);
        update_response_frame_headers(&mut resp, EndCode::SUCCESS, SLAVE_IP, 1, 0, 0, 0, 0);
        m.socket.inbox.push_back((resp, (SLAVE_IP, CCIEFB_PORT)));

        m.periodic(crate::ARBITRATION_TIMEOUT_US + 2);
        assert_eq!(m.callbacks.link_scans.get(), 1);
        assert_eq!(m.group(1).unwrap().device(0).state(), crate::master::device::DeviceState::CyclicSent);
    }

    #[test]
    fn rejects_too_many_groups() {
        let mut master = MasterConfig::new(MASTER_IP, [0, 1, 2, 3, 4, 5]);
        for i in 1..=65u8 {
            let mut g = GroupConfig::new(i);
            g.devices.push(DeviceConfig::new(SLAVE_IP.wrapping_add(i as u32), 1));
            master.groups.push(g);
        }
        let err = MasterEngine::new(
            &master,
            MockSocket::default(),
            FixedClock,
            MemParameterStore::default(),
            NoopMasterCallbacks,
        )
        .unwrap_err();
        assert_eq!(err, MasterError::TooManyGroups(65));
    }
}

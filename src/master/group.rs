//! The master's per-group finite state machine and owned request buffer (§4.6).
//!
//! One [`GroupEngine`] owns one link-scan group: its devices, its request
//! frame buffer (mutated in place, never reallocated, matching the slave's
//! response buffer in [`crate::slave`]), and the two host-facing shadow
//! cyclic-data arrays the device FSM's `set_data_ip` action copies into that
//! buffer at scan time.
//!
//! Unlike [`crate::slave::SlaveEngine`], this type is not generic over the
//! socket/clock/callback capability traits: a master owns one socket and one
//! callback object shared across all of its groups, so [`super::MasterEngine`]
//! passes those in only where a method needs to hand data back out (the
//! assembled request frame to send, or the edges to translate into
//! connect/disconnect callbacks); the group FSM itself touches no platform
//! trait.

use crate::codec::cciefb::{
    self, initialise_request_frame, update_request_frame_headers, ParsedResponse, RequestLayout,
};
use crate::codec::endcode::EndCode;
use crate::config::GroupConfig;
use crate::error::MasterError;
use crate::limiter::RateLimiter;
use crate::master::device::{DeviceEngine, DeviceEvent, DeviceState};
use crate::timer::Timer;
use crate::{ARBITRATION_TIMEOUT_US, ERROR_RATE_LIMIT_US, MAX_CONSTANT_LINK_SCAN_MS, PDU_BUFFER_LEN};

/// States of the master's per-group FSM (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    MasterDown,
    MasterListen,
    MasterArbitration,
    MasterLinkScan,
    MasterLinkScanComp,
}

/// A connect/disconnect edge produced by a device's `set_data_ip` action,
/// carrying the device's own slave-ID for the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCallbackKind {
    Connect(u32),
    Disconnect(u32),
}

/// What ingesting one validated response means for the caller.
#[derive(Debug, Clone, Default)]
pub struct ResponseOutcome {
    pub device_index: Option<usize>,
    pub accepted: bool,
    pub duplicate: bool,
    pub alarm: bool,
    pub slaveinfo_changed: bool,
    /// `Some(true)` if this response completed the scan via `GroupAllResponded`.
    pub scan_completed: Option<bool>,
    pub device_events: Vec<(usize, DeviceCallbackKind)>,
}

/// Drives one link-scan group: device FSMs, the shared request buffer, and
/// the group-level arbitration/link-scan state.
pub struct GroupEngine {
    group_no: u8,
    timeout_ms: u16,
    parallel_off_timeout_count: u16,
    constant_link_scan_ms: Option<u16>,
    total_occupied: u16,

    state: GroupState,
    devices: Vec<DeviceEngine>,

    request: Vec<u8>,
    request_layout: RequestLayout,
    parameter_no: u16,
    frame_sequence_no: u16,
    cyclic_transmission_state: u16,
    scan_started_at: u32,

    arbitration_timer: Timer,
    response_timer: Timer,
    constant_scan_timer: Timer,

    /// Host-writable shadow RY area, one [`cciefb::BIT_BLOCK_LEN`] block per
    /// group-wide station index (§3 "four group-sized arrays").
    app_ry: Vec<u8>,
    app_rww: Vec<u8>,
    incoming_rx: Vec<u8>,
    incoming_rwr: Vec<u8>,

    warn_limiter: RateLimiter,
    error_limiter: RateLimiter,
    alarm_limiter: RateLimiter,
}

impl GroupEngine {
    pub fn new(config: &GroupConfig, master_id: u32, parameter_no: u16) -> Result<Self, MasterError> {
        let total_occupied_wide = config.total_occupied();
        if total_occupied_wide == 0 {
            return Err(MasterError::EmptyGroup { group: config.group_no });
        }
        if total_occupied_wide > 16 {
            return Err(MasterError::TooManyOccupiedInGroup {
                group: config.group_no,
                occupied: total_occupied_wide,
            });
        }
        let total_occupied = total_occupied_wide as u16;
        for d in &config.devices {
            if !(1..=16).contains(&d.occupied) {
                return Err(MasterError::BadDeviceOccupiedCount {
                    group: config.group_no,
                    occupied: d.occupied,
                });
            }
        }

        let mut devices = Vec::with_capacity(config.devices.len());
        let mut station_no = 1u16;
        for d in &config.devices {
            devices.push(DeviceEngine::new(
                station_no,
                d.occupied,
                d.slave_id,
                d.application_enabled,
                d.force_transmission_bit,
            ));
            station_no += d.occupied;
        }

        let timeout_ms = config.effective_timeout_ms();
        let parallel_off_timeout_count = config.effective_parallel_off_timeout_count();
        let constant_link_scan_ms = config.constant_link_scan_ms.map(|ms| ms.min(MAX_CONSTANT_LINK_SCAN_MS));

        let request_len = cciefb::request_len(total_occupied);
        let mut request = vec![0u8; PDU_BUFFER_LEN.max(request_len)];
        let request_layout = initialise_request_frame(
            &mut request,
            config.protocol_ver,
            timeout_ms,
            parallel_off_timeout_count,
            master_id,
            config.group_no,
            total_occupied,
            parameter_no,
        );

        Ok(GroupEngine {
            group_no: config.group_no,
            timeout_ms,
            parallel_off_timeout_count,
            constant_link_scan_ms,
            total_occupied,
            state: GroupState::MasterDown,
            devices,
            request,
            request_layout,
            parameter_no,
            frame_sequence_no: 0,
            cyclic_transmission_state: 0,
            scan_started_at: 0,
            arbitration_timer: Timer::new(),
            response_timer: Timer::new(),
            constant_scan_timer: Timer::new(),
            app_ry: vec![0u8; total_occupied as usize * cciefb::BIT_BLOCK_LEN],
            app_rww: vec![0u8; total_occupied as usize * cciefb::REGISTER_BLOCK_LEN],
            incoming_rx: vec![0u8; total_occupied as usize * cciefb::BIT_BLOCK_LEN],
            incoming_rwr: vec![0u8; total_occupied as usize * cciefb::REGISTER_BLOCK_LEN],
            warn_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
            error_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
            alarm_limiter: RateLimiter::new(ERROR_RATE_LIMIT_US),
        })
    }

    pub fn group_no(&self) -> u8 {
        self.group_no
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device(&self, idx: usize) -> &DeviceEngine {
        &self.devices[idx]
    }

    pub fn warn_limiter(&mut self) -> &mut RateLimiter {
        &mut self.warn_limiter
    }

    pub fn error_limiter(&mut self) -> &mut RateLimiter {
        &mut self.error_limiter
    }

    pub fn alarm_limiter(&mut self) -> &mut RateLimiter {
        &mut self.alarm_limiter
    }

    /// `Startup` event: initialise every device's FSM record and enter
    /// `MasterListen` (§4.6 `group_init`).
    pub fn group_init(&mut self, now: u32) {
        let _ = now;
        self.state = GroupState::MasterListen;
        for d in &mut self.devices {
            let _ = d.dispatch(DeviceEvent::GroupStartup);
        }
    }

    /// `NewConfig` event: rebuild the request frame's static header fields
    /// and zero every station's cyclic-data slot, then begin arbitration
    /// (§4.6 `reflect_group_parameters`).
    pub fn enter_arbitration(&mut self, now: u32) {
        self.frame_sequence_no = 0;
        self.cyclic_transmission_state = 0;
        for station in 0..self.total_occupied as usize {
            self.request_layout.write_slave_id(&mut self.request, station, 0);
            self.request_layout.ry_mut(&mut self.request, station).fill(0);
            self.request_layout.rww_mut(&mut self.request, station).fill(0);
        }
        self.state = GroupState::MasterArbitration;
        self.arbitration_timer.start(ARBITRATION_TIMEOUT_US, now);
    }

    /// Entry action of `MasterListen`: stop the arbitration/scan timers and
    /// dispatch `GroupStandby` to every device.
    fn enter_master_listen(&mut self, now: u32) -> Vec<(usize, DeviceCallbackKind)> {
        let _ = now;
        self.arbitration_timer.stop();
        self.response_timer.stop();
        self.constant_scan_timer.stop();
        let edges = self.dispatch_to_all(DeviceEvent::GroupStandby);
        self.state = GroupState::MasterListen;
        edges
    }

    /// `ParameterChange` event, driven by the host supplying a new
    /// [`GroupConfig`] for this group number. The device list and request
    /// buffer are rebuilt from scratch; `MasterListen` is modeled as a
    /// transient pass-through here (see DESIGN.md): the engine re-enters
    /// arbitration immediately rather than waiting for a second external
    /// event, since the source material names no distinct trigger for
    /// leaving `MasterListen` once the rebuild is done.
    pub fn reconfigure(
        &mut self,
        config: &GroupConfig,
        master_id: u32,
        parameter_no: u16,
        now: u32,
    ) -> Result<Vec<(usize, DeviceCallbackKind)>, MasterError> {
        let edges = self.enter_master_listen(now);
        let mut rebuilt = GroupEngine::new(config, master_id, parameter_no)?;
        rebuilt.group_init(now);
        rebuilt.enter_arbitration(now);
        *self = rebuilt;
        Ok(edges)
    }

    pub fn arbitration_expired(&self, now: u32) -> bool {
        self.state == GroupState::MasterArbitration && self.arbitration_timer.is_expired(now)
    }

    /// `ArbitrationDone` event.
    pub fn on_arbitration_done(&mut self, now: u32) {
        let _ = now;
        self.arbitration_timer.stop();
        self.state = GroupState::MasterLinkScanComp;
    }

    /// `ReqFromOther` event: a competing master's request arrived while we
    /// were arbitrating. Returns `true` if this group was affected (the
    /// caller fires `MasterErrorKind::ArbitrationFailed`).
    pub fn on_req_from_other(&mut self, now: u32) -> bool {
        if self.state != GroupState::MasterArbitration {
            return false;
        }
        self.enter_master_listen(now);
        self.enter_arbitration(now);
        true
    }

    /// `MasterduplAlarm` event: a duplicate master was detected after we'd
    /// already won arbitration. Returns `true` if this group was affected
    /// (the caller fires `MasterErrorKind::ArbitrationFailed`, the same kind
    /// used for the pre-arbitration conflict; see DESIGN.md).
    pub fn on_masterdupl_alarm(&mut self, now: u32) -> bool {
        if !matches!(self.state, GroupState::MasterLinkScan | GroupState::MasterLinkScanComp) {
            return false;
        }
        self.enter_master_listen(now);
        self.enter_arbitration(now);
        true
    }

    /// `LinkscanStart` event: dispatch `ScanStartDeviceStart`/`Stop` per
    /// device, stamp and send the request, and start the response-wait (and,
    /// if configured, constant-link-scan) timer.
    pub fn start_scan(&mut self, now: u32, unix_ms: u64, master_local_unit_info: u16) -> Vec<(usize, DeviceCallbackKind)> {
        let mut edges = Vec::new();
        for idx in 0..self.devices.len() {
            let ev = if self.devices[idx].wants_scanning() {
                DeviceEvent::ScanStartDeviceStart
            } else {
                DeviceEvent::ScanStartDeviceStop
            };
            if let Some(e) = self.dispatch_device_event(idx, ev) {
                edges.push(e);
            }
            if self.devices[idx].wire_bit() {
                self.devices[idx].stats.sent = self.devices[idx].stats.sent.saturating_add(1);
            }
        }
        update_request_frame_headers(
            &mut self.request,
            self.frame_sequence_no,
            unix_ms,
            master_local_unit_info,
            self.cyclic_transmission_state,
        );
        self.scan_started_at = now;
        self.response_timer.start((self.timeout_ms as u32) * 1000, now);
        if let Some(ms) = self.constant_link_scan_ms {
            self.constant_scan_timer.start_if_not_running((ms as u32) * 1000, now);
        }
        self.state = GroupState::MasterLinkScan;
        edges
    }

    /// The assembled request frame, ready to send. Valid to call any time,
    /// but only meaningful right after [`Self::start_scan`].
    pub fn request_frame(&self) -> &[u8] {
        let len = cciefb::request_len(self.total_occupied);
        &self.request[..len]
    }

    pub fn response_expired(&self, now: u32) -> bool {
        self.state == GroupState::MasterLinkScan && self.response_timer.is_expired(now)
    }

    pub fn constant_scan_due(&self, now: u32) -> bool {
        self.state == GroupState::MasterLinkScanComp
            && self.constant_link_scan_ms.is_some()
            && self.constant_scan_timer.is_expired(now)
    }

    /// Whether this group's `MasterLinkScanComp` state should immediately
    /// re-issue `LinkscanStart` on its own, rather than waiting for a
    /// constant-link-scan timer tick (§4.6 `on_linkscan_complete`/
    /// `on_linkscan_timeout`: "otherwise emit LinkscanStart immediately").
    pub fn scans_back_to_back(&self) -> bool {
        self.constant_link_scan_ms.is_none()
    }

    /// `LinkscanTimeout` event.
    pub fn on_linkscan_timeout(&mut self) -> Vec<(usize, DeviceCallbackKind)> {
        self.response_timer.stop();
        let edges = self.dispatch_to_all(DeviceEvent::GroupTimeout);
        self.bump_frame_sequence();
        self.state = GroupState::MasterLinkScanComp;
        edges
    }

    fn on_linkscan_complete(&mut self) -> Vec<(usize, DeviceCallbackKind)> {
        self.response_timer.stop();
        let edges = self.dispatch_to_all(DeviceEvent::GroupAllResponded);
        self.bump_frame_sequence();
        self.state = GroupState::MasterLinkScanComp;
        edges
    }

    fn bump_frame_sequence(&mut self) {
        self.frame_sequence_no = if self.frame_sequence_no >= 65535 {
            1
        } else {
            self.frame_sequence_no + 1
        };
    }

    /// "All responded" predicate (§4.6), consulted after each valid response.
    fn all_responded(&self) -> bool {
        if self.frame_sequence_no == 0 {
            !self.devices.iter().any(|d| d.state() == DeviceState::WaitTd)
                && self.devices.iter().any(|d| d.state() == DeviceState::CyclicSent)
        } else {
            self.devices.iter().filter(|d| d.wire_bit()).all(|d| d.state() != DeviceState::CyclicSending)
                && self.devices.iter().any(|d| d.wire_bit())
        }
    }

    /// Ingest one validated response frame addressed to this group (the
    /// caller has already checked `parsed.group_no`). `buf` is the raw
    /// datagram so the device's own RX/RWr area can be copied out; `source_ip`
    /// identifies the device within the group.
    pub fn ingest_response(&mut self, now: u32, source_ip: u32, buf: &[u8], parsed: &ParsedResponse) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::default();
        if self.state != GroupState::MasterLinkScan {
            return outcome;
        }
        let Some(idx) = self.devices.iter().position(|d| d.slave_id() == source_ip) else {
            return outcome;
        };
        if !self.devices[idx].wants_scanning() {
            return outcome;
        }
        outcome.device_index = Some(idx);

        if self.devices[idx].is_duplicate(parsed.frame_sequence_no) {
            outcome.duplicate = true;
            self.devices[idx].stats.received_invalid = self.devices[idx].stats.received_invalid.saturating_add(1);
            if let Some(e) = self.dispatch_device_event(idx, DeviceEvent::SlaveDuplication) {
                outcome.device_events.push(e);
            }
            return outcome;
        }

        let is_alarm = matches!(
            parsed.end_code,
            EndCode::CCIEFB_MASTER_DUPLICATION
                | EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS
                | EndCode::CCIEFB_SLAVE_ERROR
                | EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT
        );
        let changed = match self.devices[idx].last_frame() {
            Some(prev) => {
                prev.end_code != parsed.end_code
                    || prev.slave_err_code != parsed.slave_err_code
                    || prev.local_management_info != parsed.local_management_info
            }
            None => true,
        };
        outcome.alarm = is_alarm;
        outcome.slaveinfo_changed = changed;

        if !parsed.end_code.is_valid_cyclic_response() {
            self.devices[idx].stats.received_invalid = self.devices[idx].stats.received_invalid.saturating_add(1);
            if let Some(e) = self.dispatch_device_event(idx, DeviceEvent::ReceiveError) {
                outcome.device_events.push(e);
            }
            return outcome;
        }

        if is_alarm {
            self.devices[idx].stats.received_alarm = self.devices[idx].stats.received_alarm.saturating_add(1);
        }

        let response_time_us = now.wrapping_sub(self.scan_started_at);
        let frame = crate::master::device::LastFrame {
            protocol_ver: parsed.protocol_ver,
            vendor_code: parsed.vendor_code,
            model_code: parsed.model_code,
            equipment_ver: parsed.equipment_ver,
            slave_local_unit_info: parsed.slave_local_unit_info,
            slave_err_code: parsed.slave_err_code,
            local_management_info: parsed.local_management_info,
            end_code: parsed.end_code,
            frame_sequence_no: parsed.frame_sequence_no,
            timestamp_us: now,
            response_time_us,
        };
        self.devices[idx].record_response(frame);
        self.copy_incoming_cyclic_data(idx, buf, parsed);

        if let Some(e) = self.dispatch_device_event(idx, DeviceEvent::ReceiveOk) {
            outcome.device_events.push(e);
        }
        outcome.accepted = true;

        if self.all_responded() {
            let edges = self.on_linkscan_complete();
            outcome.device_events.extend(edges);
            outcome.scan_completed = Some(true);
        }

        outcome
    }

    fn copy_incoming_cyclic_data(&mut self, idx: usize, buf: &[u8], parsed: &ParsedResponse) {
        let (first, occ) = self.device_span(idx);
        for s in 0..occ {
            let station = first + s;
            let rx_src = parsed.layout.rx(buf, s);
            let rx_off = station * cciefb::BIT_BLOCK_LEN;
            self.incoming_rx[rx_off..rx_off + cciefb::BIT_BLOCK_LEN].copy_from_slice(rx_src);
            let rwr_src = parsed.layout.rwr(buf, s);
            let rwr_off = station * cciefb::REGISTER_BLOCK_LEN;
            self.incoming_rwr[rwr_off..rwr_off + cciefb::REGISTER_BLOCK_LEN].copy_from_slice(rwr_src);
        }
    }

    fn dispatch_to_all(&mut self, event: DeviceEvent) -> Vec<(usize, DeviceCallbackKind)> {
        let mut edges = Vec::new();
        for idx in 0..self.devices.len() {
            if let Some(e) = self.dispatch_device_event(idx, event) {
                edges.push(e);
            }
        }
        edges
    }

    fn dispatch_device_event(&mut self, idx: usize, event: DeviceEvent) -> Option<(usize, DeviceCallbackKind)> {
        use crate::master::device::DeviceAction;
        let mut ev = event;
        loop {
            let action = self.devices[idx].dispatch(ev);
            match action {
                DeviceAction::SetDataIp { enable } => return self.apply_set_data_ip(idx, enable).map(|k| (idx, k)),
                DeviceAction::EvaluateTimeoutCounter => {
                    ev = self.devices[idx].evaluate_timeout_counter(self.parallel_off_timeout_count);
                    continue;
                }
                DeviceAction::None | DeviceAction::ResetTimeoutCount => return None,
            }
        }
    }

    /// §4.5 `set_data_ip`: the only mutator of the request buffer driven by
    /// a device-FSM action. Flips the group's transmission-state bit, writes
    /// this device's slave-ID slot (real IP + continuation markers, or
    /// all-zero), copies or zeroes its RY/RWw range, and reports a
    /// connect/disconnect edge when the wire bit actually flips.
    fn apply_set_data_ip(&mut self, idx: usize, enable: bool) -> Option<DeviceCallbackKind> {
        let (station_no, occupied, slave_id, prior_wire) = {
            let d = &self.devices[idx];
            (d.station_no(), d.occupied(), d.slave_id(), d.wire_bit())
        };
        let first = (station_no - 1) as usize;
        let occ = occupied as usize;
        let bit = station_no - 1;

        if enable {
            self.cyclic_transmission_state |= 1u16 << bit;
        } else {
            self.cyclic_transmission_state &= !(1u16 << bit);
        }

        for s in 0..occ {
            let station = first + s;
            let value = if enable {
                if s == 0 {
                    slave_id
                } else {
                    cciefb::SLAVE_ID_CONTINUATION
                }
            } else {
                0
            };
            self.request_layout.write_slave_id(&mut self.request, station, value);

            if enable {
                let ry_off = station * cciefb::BIT_BLOCK_LEN;
                let ry_src = self.app_ry[ry_off..ry_off + cciefb::BIT_BLOCK_LEN].to_vec();
                self.request_layout.ry_mut(&mut self.request, station).copy_from_slice(&ry_src);
                let rww_off = station * cciefb::REGISTER_BLOCK_LEN;
                let rww_src = self.app_rww[rww_off..rww_off + cciefb::REGISTER_BLOCK_LEN].to_vec();
                self.request_layout.rww_mut(&mut self.request, station).copy_from_slice(&rww_src);
            } else {
                self.request_layout.ry_mut(&mut self.request, station).fill(0);
                self.request_layout.rww_mut(&mut self.request, station).fill(0);
            }
        }

        self.devices[idx].wire_bit = enable;
        if prior_wire == enable {
            return None;
        }
        if enable {
            self.devices[idx].stats.connects = self.devices[idx].stats.connects.saturating_add(1);
            Some(DeviceCallbackKind::Connect(slave_id))
        } else {
            self.devices[idx].stats.disconnects = self.devices[idx].stats.disconnects.saturating_add(1);
            Some(DeviceCallbackKind::Disconnect(slave_id))
        }
    }

    fn device_span(&self, idx: usize) -> (usize, usize) {
        let d = &self.devices[idx];
        ((d.station_no() - 1) as usize, d.occupied() as usize)
    }

    pub fn device_ry_mut(&mut self, idx: usize) -> &mut [u8] {
        let (first, occ) = self.device_span(idx);
        let start = first * cciefb::BIT_BLOCK_LEN;
        &mut self.app_ry[start..start + occ * cciefb::BIT_BLOCK_LEN]
    }

    pub fn device_rww_mut(&mut self, idx: usize) -> &mut [u8] {
        let (first, occ) = self.device_span(idx);
        let start = first * cciefb::REGISTER_BLOCK_LEN;
        &mut self.app_rww[start..start + occ * cciefb::REGISTER_BLOCK_LEN]
    }

    pub fn device_rx(&self, idx: usize) -> &[u8] {
        let (first, occ) = self.device_span(idx);
        let start = first * cciefb::BIT_BLOCK_LEN;
        &self.incoming_rx[start..start + occ * cciefb::BIT_BLOCK_LEN]
    }

    pub fn device_rwr(&self, idx: usize) -> &[u8] {
        let (first, occ) = self.device_span(idx);
        let start = first * cciefb::REGISTER_BLOCK_LEN;
        &self.incoming_rwr[start..start + occ * cciefb::REGISTER_BLOCK_LEN]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cciefb::{parse_response, update_response_frame_headers, initialise_response_frame};
    use crate::config::DeviceConfig;

    const MASTER_IP: u32 = 0xC0A80327;
    const SLAVE_IP: u32 = 0xC0A80328;

    fn one_device_group() -> GroupConfig {
        let mut cfg = GroupConfig::new(1);
        cfg.timeout_ms = 200;
        cfg.parallel_off_timeout_count = 3;
        cfg.devices.push(DeviceConfig::new(SLAVE_IP, 1));
        cfg
    }

    fn build_response(group_no: u8, frame_seq: u16, end_code: EndCode) -> Vec<u8> {
        let mut buf = vec![0u8; cciefb::response_len(1)];
        initialise_response_frame(&mut buf, 2, 0x00C0, 0xDEAD_BEEF, 1, 1);
        update_response_frame_headers(&mut buf, end_code, SLAVE_IP, group_no, frame_seq, 0, 0, 0);
        buf
    }

    fn started_group() -> GroupEngine {
        let cfg = one_device_group();
        let mut g = GroupEngine::new(&cfg, MASTER_IP, 1).unwrap();
        g.group_init(0);
        g.enter_arbitration(0);
        g.on_arbitration_done(100);
        g.start_scan(100, 0, 0);
        g
    }

    #[test]
    fn clean_link_scan_completes_and_advances_sequence() {
        let mut g = started_group();
        assert_eq!(g.state(), GroupState::MasterLinkScan);
        assert_eq!(g.device(0).state(), DeviceState::WaitTd);

        let resp = build_response(1, 0, EndCode::SUCCESS);
        let parsed = parse_response(&resp).unwrap();
        let outcome = g.ingest_response(150, SLAVE_IP, &resp, &parsed);
        assert!(outcome.accepted);
        assert_eq!(outcome.scan_completed, Some(true));
        assert_eq!(g.device(0).state(), DeviceState::CyclicSent);
        assert_eq!(g.state(), GroupState::MasterLinkScanComp);

        g.start_scan(200, 0, 0);
        assert_eq!(g.request_frame()[0..0].len(), 0); // buffer accessible post-restart
    }

    #[test]
    fn timeout_then_disconnect_after_threshold() {
        let mut g = started_group();
        // First scan: WaitTd times out without a response.
        let edges = g.on_linkscan_timeout();
        assert!(edges.is_empty());
        assert_eq!(g.device(0).state(), DeviceState::Listen);
        assert!(!g.device(0).wire_bit());
        assert_eq!(g.device(0).stats().disconnects, 1);
    }

    #[test]
    fn steady_state_timeout_counter_then_disconnect() {
        let mut g = started_group();
        let resp = build_response(1, 0, EndCode::SUCCESS);
        let parsed = parse_response(&resp).unwrap();
        g.ingest_response(150, SLAVE_IP, &resp, &parsed);
        assert_eq!(g.device(0).state(), DeviceState::CyclicSent);

        g.start_scan(200, 0, 0);
        assert_eq!(g.device(0).state(), DeviceState::CyclicSending);

        for _ in 0..2 {
            g.on_linkscan_timeout();
            assert_eq!(g.device(0).state(), DeviceState::CyclicSending);
            g.start_scan(300, 0, 0);
        }
        assert_eq!(g.device(0).stats().disconnects, 0);

        let edges = g.on_linkscan_timeout();
        assert_eq!(g.device(0).state(), DeviceState::Listen);
        assert_eq!(g.device(0).stats().timeouts, 1);
        assert_eq!(g.device(0).stats().disconnects, 1);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn duplicate_response_bounces_device_to_listen() {
        let mut g = started_group();
        let resp = build_response(1, 5, EndCode::SUCCESS);
        let parsed = parse_response(&resp).unwrap();
        g.ingest_response(150, SLAVE_IP, &resp, &parsed);
        assert_eq!(g.device(0).state(), DeviceState::CyclicSent);
        g.start_scan(200, 0, 0);
        assert_eq!(g.device(0).state(), DeviceState::CyclicSending);

        // Same frame_sequence_no arrives twice during CyclicSending.
        let resp2 = build_response(1, 1, EndCode::SUCCESS);
        let parsed2 = parse_response(&resp2).unwrap();
        let _ = g.ingest_response(250, SLAVE_IP, &resp2, &parsed2);
        let outcome = g.ingest_response(260, SLAVE_IP, &resp2, &parsed2);
        assert!(outcome.duplicate);
        assert_eq!(g.device(0).state(), DeviceState::Listen);
        assert_eq!(g.device(0).stats().received_invalid, 1);
    }
}

//! Black-box end-to-end scenarios, driving a [`MasterEngine`] and a
//! [`SlaveEngine`] against each other over an in-memory UDP fabric instead of
//! real sockets. Mirrors the worked scenarios of the external specification
//! this crate implements against, exercised here purely through the public
//! API.

use cciefb::codec::endcode::EndCode;
use cciefb::config::{DeviceConfig, GroupConfig, MasterConfig, SlaveConfig};
use cciefb::master::group::GroupState;
use cciefb::master::{MasterCallbacks, MasterEngine, NoopMasterCallbacks};
use cciefb::platform::{Clock, ParameterStore, UdpSocket};
use cciefb::slave::{NoopSlaveCallbacks, SlaveCallbacks, SlaveEngine, SlaveState};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

const MASTER_IP: u32 = 0xC0A8_0301;
const SLAVE_IP: u32 = 0xC0A8_0302;
const CCIEFB_PORT: u16 = cciefb::CCIEFB_PORT;

/// A shared in-memory "wire": every participant's outbound datagrams land in
/// every other participant's inbox, mirroring broadcast UDP on a LAN segment
/// without needing a real socket or OS scheduler.
#[derive(Default)]
struct Fabric {
    inboxes: RefCell<Vec<(u32, VecDeque<(Vec<u8>, u32)>)>>,
}

impl Fabric {
    fn register(self: &Rc<Self>, ip: u32) -> FabricSocket {
        self.inboxes.borrow_mut().push((ip, VecDeque::new()));
        FabricSocket {
            fabric: self.clone(),
            own_ip: ip,
        }
    }
}

struct FabricSocket {
    fabric: Rc<Fabric>,
    own_ip: u32,
}

impl UdpSocket for FabricSocket {
    type Error = Infallible;

    fn send_to(&mut self, buf: &[u8], dest: (u32, u16)) -> Result<usize, Self::Error> {
        let mut inboxes = self.fabric.inboxes.borrow_mut();
        for (ip, inbox) in inboxes.iter_mut() {
            if *ip == self.own_ip {
                continue;
            }
            if dest.0 == 0xFFFF_FFFF || dest.0 == *ip {
                inbox.push_back((buf.to_vec(), self.own_ip));
            }
        }
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, (u32, u16))>, Self::Error> {
        let mut inboxes = self.fabric.inboxes.borrow_mut();
        let (_, inbox) = inboxes.iter_mut().find(|(ip, _)| *ip == self.own_ip).unwrap();
        match inbox.pop_front() {
            Some((data, source_ip)) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(Some((data.len(), (source_ip, CCIEFB_PORT))))
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
    type Error = Infallible;
    fn load(&mut self) -> Result<Option<u16>, Self::Error> {
        Ok(self.value)
    }
    fn store(&mut self, parameter_no: u16) -> Result<(), Self::Error> {
        self.value = Some(parameter_no);
        Ok(())
    }
}

#[derive(Default)]
struct MasterCounts {
    connects: u32,
    disconnects: u32,
    link_scans_ok: u32,
}

struct RecordingMasterCallbacks(Rc<RefCell<MasterCounts>>);
impl MasterCallbacks for RecordingMasterCallbacks {
    fn connect(&mut self, _group_no: u8, _device_index: usize, _ip: u32) {
        self.0.borrow_mut().connects += 1;
    }
    fn disconnect(&mut self, _group_no: u8, _device_index: usize, _ip: u32) {
        self.0.borrow_mut().disconnects += 1;
    }
    fn link_scan_done(&mut self, _group_no: u8, success: bool) {
        if success {
            self.0.borrow_mut().link_scans_ok += 1;
        }
    }
}

#[derive(Default)]
struct SlaveCounts {
    connects: u32,
}

struct RecordingSlaveCallbacks(Rc<RefCell<SlaveCounts>>);
impl SlaveCallbacks for RecordingSlaveCallbacks {
    fn connect(&mut self, _master_ip: u32, _group_no: u8, _station_no: u16) {
        self.0.borrow_mut().connects += 1;
    }
}

fn one_device_master_config() -> MasterConfig {
    let mut master = MasterConfig::new(MASTER_IP, [0, 1, 2, 3, 4, 5]);
    let mut group = GroupConfig::new(1);
    group.timeout_ms = 200;
    group.parallel_off_timeout_count = 3;
    group.devices.push(DeviceConfig::new(SLAVE_IP, 1));
    master.groups.push(group);
    master
}

fn one_device_slave_config() -> SlaveConfig {
    SlaveConfig {
        my_slave_id: SLAVE_IP,
        occupied: 1,
        protocol_ver: 2,
        vendor_code: 0x00C0,
        model_code: 0xDEAD_BEEF,
        equipment_ver: 1,
    }
}

/// Scenario 1 (clean link-scan): starting a master and slave against each
/// other, then driving `periodic` on both until arbitration completes and a
/// full request/response round trip has happened, brings the slave into
/// `MasterControl` and the master's device into a completed, successful scan.
#[test]
fn clean_link_scan_connects_both_sides() {
    let fabric = Rc::new(Fabric::default());
    let master_socket = fabric.register(MASTER_IP);
    let slave_socket = fabric.register(SLAVE_IP);

    let master_counts = Rc::new(RefCell::new(MasterCounts::default()));
    let slave_counts = Rc::new(RefCell::new(SlaveCounts::default()));

    let mut master = MasterEngine::new(
        &one_device_master_config(),
        master_socket,
        FixedClock,
        MemParameterStore::default(),
        RecordingMasterCallbacks(master_counts.clone()),
    )
    .unwrap();
    let mut slave = SlaveEngine::new(
        one_device_slave_config(),
        slave_socket,
        RecordingSlaveCallbacks(slave_counts.clone()),
    )
    .unwrap();

    master.start(0);
    slave.start(0);
    assert_eq!(slave.state(), SlaveState::MasterNone);

    let mut now = cciefb::ARBITRATION_TIMEOUT_US + 1;
    master.periodic(now);
    assert_eq!(master.group(1).unwrap().state(), GroupState::MasterLinkScan);

    slave.periodic(now);
    assert_eq!(slave.state(), SlaveState::MasterControl);
    assert_eq!(slave_counts.borrow().connects, 1);

    now += 1;
    master.periodic(now);
    assert_eq!(master_counts.borrow().connects, 1);
    assert_eq!(master_counts.borrow().link_scans_ok, 1);
    assert_eq!(
        master.group(1).unwrap().device(0).state(),
        cciefb::master::device::DeviceState::CyclicSent
    );
}

/// Scenario 2: a slave that never answers causes the master's device to
/// accumulate timeouts and disconnect once `parallel_off_timeout_count` is
/// exceeded, with exactly one disconnect callback regardless of how many
/// individual scans timed out along the way.
#[test]
fn absent_slave_times_out_and_disconnects() {
    let fabric = Rc::new(Fabric::default());
    let master_socket = fabric.register(MASTER_IP);

    let master_counts = Rc::new(RefCell::new(MasterCounts::default()));
    let mut master = MasterEngine::new(
        &one_device_master_config(),
        master_socket,
        FixedClock,
        MemParameterStore::default(),
        RecordingMasterCallbacks(master_counts.clone()),
    )
    .unwrap();
    master.start(0);

    let mut now = cciefb::ARBITRATION_TIMEOUT_US;
    for _ in 0..4 {
        now += 1;
        master.periodic(now);
        now += 200_000;
        master.periodic(now);
    }

    assert_eq!(master_counts.borrow().disconnects, 1);
}

/// Scenario 5: a slave configured for two occupied stations, queried by a
/// master that only lists it with one, rejects the request with the
/// wrong-occupied-count end-code and stays in `MasterNone`.
#[test]
fn wrong_occupied_count_is_rejected() {
    let fabric = Rc::new(Fabric::default());
    let master_socket = fabric.register(MASTER_IP);
    let slave_socket = fabric.register(SLAVE_IP);

    let mut master_config = one_device_master_config();
    master_config.groups[0].devices[0].occupied = 1;
    let mut master = MasterEngine::new(
        &master_config,
        master_socket,
        FixedClock,
        MemParameterStore::default(),
        NoopMasterCallbacks,
    )
    .unwrap();

    let mut slave_config = one_device_slave_config();
    slave_config.occupied = 2;
    let mut slave = SlaveEngine::new(slave_config, slave_socket, NoopSlaveCallbacks).unwrap();

    master.start(0);
    slave.start(0);

    let now = cciefb::ARBITRATION_TIMEOUT_US + 1;
    master.periodic(now);
    slave.periodic(now);

    assert_eq!(slave.state(), SlaveState::MasterNone);
}

/// Scenario 6 (graceful disable): a slave in `MasterControl` that is told to
/// disable answers further cyclic requests with the disconnect-request
/// end-code until the grace timer elapses, after which it stops answering
/// entirely.
#[test]
fn graceful_disable_stops_answering_after_grace_period() {
    let fabric = Rc::new(Fabric::default());
    let master_socket = fabric.register(MASTER_IP);
    let slave_socket = fabric.register(SLAVE_IP);

    let mut master = MasterEngine::new(
        &one_device_master_config(),
        master_socket,
        FixedClock,
        MemParameterStore::default(),
        NoopMasterCallbacks,
    )
    .unwrap();
    let mut slave = SlaveEngine::new(one_device_slave_config(), slave_socket, NoopSlaveCallbacks).unwrap();

    master.start(0);
    slave.start(0);

    let now = cciefb::ARBITRATION_TIMEOUT_US + 1;
    master.periodic(now);
    slave.periodic(now);
    assert_eq!(slave.state(), SlaveState::MasterControl);

    slave.disable(now);
    assert_eq!(slave.state(), SlaveState::WaitDisablingSlave);

    let after_grace = now + cciefb::SLAVE_DISABLE_GRACE_US + 1;
    slave.periodic(after_grace);
    assert_eq!(slave.state(), SlaveState::SlaveDisabled);
}

/// The node-search response end-code enumeration is exposed symbolically;
/// every one of the five CCIEFB cyclic end-codes this crate acts on round
/// trips through `EndCode` without collapsing into the generic numeric
/// variant.
#[test]
fn cyclic_end_codes_are_all_recognised_as_valid() {
    for code in [
        EndCode::SUCCESS,
        EndCode::CCIEFB_MASTER_DUPLICATION,
        EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS,
        EndCode::CCIEFB_SLAVE_ERROR,
        EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT,
    ] {
        assert!(code.is_valid_cyclic_response(), "{code:?} should be a valid cyclic response end-code");
    }
    assert!(!EndCode(0x1234).is_valid_cyclic_response());
}

//! CCIEFB cyclic request/response frame layout.
//!
//! Every field is read or written through the offset helpers in [`super::bytes`];
//! there is no `#[repr(C)]` struct overlaid on the wire buffer. Offsets below are
//! named after the header they belong to, mirroring the reference frame layout
//! in BAP-C2010-ENG-004-A section 9.1.2.
//!
//! Per-occupied-station data sizes (RWw/RWr: 32 `u16` registers = 64 octets,
//! RY/RX: 64 bits = 8 octets) give the wire-size identities `request_len(n) ==
//! 67 + 76*n`, `response_len(n) == 59 + 72*n`.

use super::bytes::*;
use super::endcode::EndCode;
use thiserror::Error;

/// Octets occupied by one station's RWw or RWr register block.
pub const REGISTER_BLOCK_LEN: usize = 64;
/// Octets occupied by one station's RY or RX bit block.
pub const BIT_BLOCK_LEN: usize = 8;
/// Octets occupied by one station's slave-ID entry in a request frame.
pub const SLAVE_ID_LEN: usize = 4;

/// Fixed (occupied-station-independent) part of a request frame, in octets.
pub const REQUEST_FIXED_LEN: usize = 67;
/// Fixed part of a response frame, in octets.
pub const RESPONSE_FIXED_LEN: usize = 59;
/// Per-station contribution to a request frame.
pub const REQUEST_PER_STATION_LEN: usize = SLAVE_ID_LEN + REGISTER_BLOCK_LEN + BIT_BLOCK_LEN;
/// Per-station contribution to a response frame.
pub const RESPONSE_PER_STATION_LEN: usize = REGISTER_BLOCK_LEN + BIT_BLOCK_LEN;

/// Offset of the cyclic-info block within a request frame, per the wire format.
pub const REQUEST_CYCLIC_OFFSET: u16 = 36;
/// Offset of the cyclic-info block within a response frame.
pub const RESPONSE_CYCLIC_OFFSET: u16 = 40;

pub const SLMP_COMMAND_CCIEFB_CYCLIC: u16 = 0x0E70;
pub const SLMP_SUBCOMMAND_CCIEFB_CYCLIC: u16 = 0x0000;

const REQ_HEADER_RESERVED1: u16 = 0x5000;
const REQ_HEADER_RESERVED3: u8 = 0xFF;
const REQ_HEADER_RESERVED4: u16 = 0x03FF;
const REQ_HEADER_DL_OFFSET: u16 = 9;

const RESP_HEADER_RESERVED1: u16 = 0xD000;
const RESP_HEADER_RESERVED3: u8 = 0xFF;
const RESP_HEADER_RESERVED4: u16 = 0x03FF;

const CYCLIC_REQ_HEADER_RESERVED1: u16 = 0x0000;
const MASTER_NOTIFICATION_RESERVED: u16 = 0x0000;
const MASTER_NOTIFICATION_MASK_BITS_VER1: u16 = 0xFFFE;
const MASTER_NOTIFICATION_MASK_BITS_VER2: u16 = 0xFFFC;

const MIN_GROUP_NO: u8 = 1;
const MAX_GROUP_NO: u8 = 64;
const MIN_OCCUPIED: u16 = 1;
const MAX_OCCUPIED: u16 = 16;
const MIN_PROTOCOL_VER: u16 = 1;
const MAX_PROTOCOL_VER: u16 = 2;

/// Request header byte offsets (15 octets total).
mod req_hdr {
    pub const RESERVED1: usize = 0; // u16 BE
    pub const RESERVED2: usize = 2; // u8
    pub const RESERVED3: usize = 3; // u8
    pub const RESERVED4: usize = 4; // u16 LE
    pub const RESERVED5: usize = 6; // u8
    pub const DL: usize = 7; // u16 LE
    pub const RESERVED6: usize = 9; // u16 LE
    pub const COMMAND: usize = 11; // u16 LE
    pub const SUB_COMMAND: usize = 13; // u16 LE
    pub const LEN: usize = 15;
}

/// Cyclic request header byte offsets (20 octets), immediately after `req_hdr`.
mod cyclic_req_hdr {
    pub const PROTOCOL_VER: usize = 0; // u16 LE
    pub const RESERVED1: usize = 2; // u16 LE
    pub const CYCLIC_INFO_OFFSET: usize = 4; // u16 LE
    pub const RESERVED2: usize = 6; // 14 octets of 0x00
    pub const LEN: usize = 20;
}

/// Master station notification (12 octets).
mod master_notif {
    pub const MASTER_LOCAL_UNIT_INFO: usize = 0; // u16 LE
    pub const RESERVED: usize = 2; // u16 LE
    pub const CLOCK_INFO: usize = 4; // u64 LE
    pub const LEN: usize = 12;
}

/// Cyclic request data header (20 octets).
mod cyclic_req_data_hdr {
    pub const MASTER_ID: usize = 0; // u32 LE
    pub const GROUP_NO: usize = 4; // u8
    pub const RESERVED3: usize = 5; // u8
    pub const FRAME_SEQUENCE_NO: usize = 6; // u16 LE
    pub const TIMEOUT_VALUE: usize = 8; // u16 LE
    pub const PARALLEL_OFF_TIMEOUT_COUNT: usize = 10; // u16 LE
    pub const PARAMETER_NO: usize = 12; // u16 LE
    pub const SLAVE_TOTAL_OCCUPIED: usize = 14; // u16 LE
    pub const CYCLIC_TRANSMISSION_STATE: usize = 16; // u16 LE
    pub const RESERVED4: usize = 18; // u16 LE
    pub const LEN: usize = 20;
}

const REQ_FULL_HEADERS_LEN: usize =
    req_hdr::LEN + cyclic_req_hdr::LEN + master_notif::LEN + cyclic_req_data_hdr::LEN;

/// Response header byte offsets (11 octets).
mod resp_hdr {
    pub const RESERVED1: usize = 0; // u16 BE
    pub const RESERVED2: usize = 2; // u8
    pub const RESERVED3: usize = 3; // u8
    pub const RESERVED4: usize = 4; // u16 LE
    pub const RESERVED5: usize = 6; // u8
    pub const DL: usize = 7; // u16 LE
    pub const RESERVED6: usize = 9; // u16 LE
    pub const LEN: usize = 11;
}

/// Cyclic response header (20 octets).
mod cyclic_resp_hdr {
    pub const PROTOCOL_VER: usize = 0; // u16 LE
    pub const END_CODE: usize = 2; // u16 LE
    pub const CYCLIC_INFO_OFFSET: usize = 4; // u16 LE
    pub const RESERVED1: usize = 6; // 14 octets of 0x00
    pub const LEN: usize = 20;
}

/// Slave station notification (20 octets).
mod slave_notif {
    pub const VENDOR_CODE: usize = 0; // u16 LE
    pub const RESERVED1: usize = 2; // u16 LE
    pub const MODEL_CODE: usize = 4; // u32 LE
    pub const EQUIPMENT_VER: usize = 8; // u16 LE
    pub const RESERVED2: usize = 10; // u16 LE
    pub const SLAVE_LOCAL_UNIT_INFO: usize = 12; // u16 LE
    pub const SLAVE_ERR_CODE: usize = 14; // u16 LE
    pub const LOCAL_MANAGEMENT_INFO: usize = 16; // u32 LE
    pub const LEN: usize = 20;
}

/// Cyclic response data header (8 octets).
mod cyclic_resp_data_hdr {
    pub const SLAVE_ID: usize = 0; // u32 LE
    pub const GROUP_NO: usize = 4; // u8
    pub const RESERVED2: usize = 5; // u8
    pub const FRAME_SEQUENCE_NO: usize = 6; // u16 LE
    pub const LEN: usize = 8;
}

const RESP_FULL_HEADERS_LEN: usize =
    resp_hdr::LEN + cyclic_resp_hdr::LEN + slave_notif::LEN + cyclic_resp_data_hdr::LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short: got {got}, need at least {need}")]
    TooShort { got: usize, need: usize },
    #[error("frame length {got} does not match expected size {expected} for {occupied} occupied stations")]
    LengthMismatch {
        got: usize,
        expected: usize,
        occupied: u16,
    },
    #[error("dl field does not match actual payload length")]
    DlMismatch,
    #[error("reserved field had unexpected value")]
    BadReserved,
    #[error("command 0x{0:04X} is not the CCIEFB cyclic command")]
    WrongCommand(u16),
    #[error("protocol version {0} is not supported")]
    BadProtocolVersion(u16),
    #[error("cyclic info offset {got} does not match the expected {expected}")]
    BadCyclicOffset { got: u16, expected: u16 },
    #[error("group number {0} is out of the valid 1..=64 range")]
    BadGroupNo(u16),
    #[error("occupied station count {0} is out of the valid 1..=16 range")]
    BadOccupiedCount(u16),
    #[error("master station notification bits invalid for protocol version {0}")]
    BadMasterNotificationBits(u16),
    #[error("master id is zero or does not match the packet's source address")]
    BadMasterId,
}

/// Total request frame size, in octets, for `occupied` occupied stations.
pub const fn request_len(occupied: u16) -> usize {
    REQUEST_FIXED_LEN + occupied as usize * REQUEST_PER_STATION_LEN
}

/// Total response frame size, in octets, for `occupied` occupied stations.
pub const fn response_len(occupied: u16) -> usize {
    RESPONSE_FIXED_LEN + occupied as usize * RESPONSE_PER_STATION_LEN
}

/// Recover the occupied-station count implied by a response frame's length.
///
/// Returns `None` if `len` is not exactly `response_len(n)` for some `n`.
pub fn occupied_from_response_len(len: usize) -> Option<u16> {
    if len < RESPONSE_FIXED_LEN {
        return None;
    }
    let remainder = len - RESPONSE_FIXED_LEN;
    if remainder % RESPONSE_PER_STATION_LEN != 0 {
        return None;
    }
    let occupied = remainder / RESPONSE_PER_STATION_LEN;
    u16::try_from(occupied).ok()
}

/// Layout of a request frame's variable-length tail, as byte offsets into the buffer.
#[derive(Debug, Clone, Copy)]
pub struct RequestLayout {
    pub slave_id_offset: usize,
    pub rww_offset: usize,
    pub ry_offset: usize,
    pub occupied: u16,
}

impl RequestLayout {
    pub fn new(occupied: u16) -> Self {
        let slave_id_offset = REQ_FULL_HEADERS_LEN;
        let rww_offset = slave_id_offset + occupied as usize * SLAVE_ID_LEN;
        let ry_offset = rww_offset + occupied as usize * REGISTER_BLOCK_LEN;
        RequestLayout {
            slave_id_offset,
            rww_offset,
            ry_offset,
            occupied,
        }
    }

    pub fn slave_id(&self, buf: &[u8], station: usize) -> u32 {
        read_u32_le(buf, self.slave_id_offset + station * SLAVE_ID_LEN)
    }

    pub fn rww(&self, buf: &[u8], station: usize) -> &[u8] {
        let off = self.rww_offset + station * REGISTER_BLOCK_LEN;
        &buf[off..off + REGISTER_BLOCK_LEN]
    }

    pub fn ry(&self, buf: &[u8], station: usize) -> &[u8] {
        let off = self.ry_offset + station * BIT_BLOCK_LEN;
        &buf[off..off + BIT_BLOCK_LEN]
    }

    pub fn write_slave_id(&self, buf: &mut [u8], station: usize, value: u32) {
        write_u32_le(buf, self.slave_id_offset + station * SLAVE_ID_LEN, value);
    }

    pub fn rww_mut<'a>(&self, buf: &'a mut [u8], station: usize) -> &'a mut [u8] {
        let off = self.rww_offset + station * REGISTER_BLOCK_LEN;
        &mut buf[off..off + REGISTER_BLOCK_LEN]
    }

    pub fn ry_mut<'a>(&self, buf: &'a mut [u8], station: usize) -> &'a mut [u8] {
        let off = self.ry_offset + station * BIT_BLOCK_LEN;
        &mut buf[off..off + BIT_BLOCK_LEN]
    }
}

/// Initialize an outgoing cyclic request frame in `buf`.
///
/// `buf` must be at least `request_len(occupied)` octets; it is fully
/// zero-filled before the headers are written. `frame_sequence_no`,
/// `master_local_unit_info`, `clock_info` and `cyclic_transmission_state` are
/// left at zero; set them with [`update_request_frame_headers`] before each
/// send.
pub fn initialise_request_frame(
    buf: &mut [u8],
    protocol_ver: u16,
    timeout_value: u16,
    parallel_off_timeout_count: u16,
    master_id: u32,
    group_no: u8,
    occupied: u16,
    parameter_no: u16,
) -> RequestLayout {
    let len = request_len(occupied);
    assert!(buf.len() >= len, "request buffer too small");
    buf[..len].fill(0);

    write_u16_be(buf, req_hdr::RESERVED1, REQ_HEADER_RESERVED1);
    buf[req_hdr::RESERVED3] = REQ_HEADER_RESERVED3;
    write_u16_le(buf, req_hdr::RESERVED4, REQ_HEADER_RESERVED4);
    write_u16_le(buf, req_hdr::DL, (len as u16).wrapping_sub(REQ_HEADER_DL_OFFSET));
    write_u16_le(buf, req_hdr::COMMAND, SLMP_COMMAND_CCIEFB_CYCLIC);
    write_u16_le(buf, req_hdr::SUB_COMMAND, SLMP_SUBCOMMAND_CCIEFB_CYCLIC);

    let cyclic = req_hdr::LEN;
    write_u16_le(buf, cyclic + cyclic_req_hdr::PROTOCOL_VER, protocol_ver);
    write_u16_le(
        buf,
        cyclic + cyclic_req_hdr::RESERVED1,
        CYCLIC_REQ_HEADER_RESERVED1,
    );
    write_u16_le(
        buf,
        cyclic + cyclic_req_hdr::CYCLIC_INFO_OFFSET,
        REQUEST_CYCLIC_OFFSET,
    );

    let notif = cyclic + cyclic_req_hdr::LEN;
    write_u16_le(
        buf,
        notif + master_notif::RESERVED,
        MASTER_NOTIFICATION_RESERVED,
    );

    let data = notif + master_notif::LEN;
    write_u32_le(buf, data + cyclic_req_data_hdr::MASTER_ID, master_id);
    buf[data + cyclic_req_data_hdr::GROUP_NO] = group_no;
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::PARAMETER_NO,
        parameter_no,
    );
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::TIMEOUT_VALUE,
        timeout_value,
    );
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::PARALLEL_OFF_TIMEOUT_COUNT,
        parallel_off_timeout_count,
    );
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::SLAVE_TOTAL_OCCUPIED,
        occupied,
    );

    RequestLayout::new(occupied)
}

/// Update the mutable fields of a request frame before each send.
pub fn update_request_frame_headers(
    buf: &mut [u8],
    frame_sequence_no: u16,
    clock_info: u64,
    master_local_unit_info: u16,
    cyclic_transmission_state: u16,
) {
    let notif = req_hdr::LEN + cyclic_req_hdr::LEN;
    write_u16_le(
        buf,
        notif + master_notif::MASTER_LOCAL_UNIT_INFO,
        master_local_unit_info,
    );
    write_u64_le(buf, notif + master_notif::CLOCK_INFO, clock_info);

    let data = notif + master_notif::LEN;
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::FRAME_SEQUENCE_NO,
        frame_sequence_no,
    );
    write_u16_le(
        buf,
        data + cyclic_req_data_hdr::CYCLIC_TRANSMISSION_STATE,
        cyclic_transmission_state,
    );
}

/// A parsed and validated cyclic request.
#[derive(Debug, Clone, Copy)]
pub struct ParsedRequest {
    pub protocol_ver: u16,
    pub master_id: u32,
    pub group_no: u8,
    pub frame_sequence_no: u16,
    pub timeout_value: u16,
    pub parallel_off_timeout_count: u16,
    pub parameter_no: u16,
    pub occupied: u16,
    pub cyclic_transmission_state: u16,
    pub master_local_unit_info: u16,
    pub clock_info: u64,
    pub layout: RequestLayout,
}

/// Parse and fully validate an incoming cyclic request frame.
///
/// `source_ip` is the UDP packet's source address, checked against the
/// embedded `master_id` field to reject spoofed or misrouted frames.
pub fn parse_request(buf: &[u8], source_ip: u32) -> Result<ParsedRequest, ParseError> {
    if buf.len() < REQ_FULL_HEADERS_LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: REQ_FULL_HEADERS_LEN,
        });
    }

    if read_u16_be(buf, req_hdr::RESERVED1) != REQ_HEADER_RESERVED1
        || buf[req_hdr::RESERVED2] != 0x00
        || buf[req_hdr::RESERVED3] != REQ_HEADER_RESERVED3
        || read_u16_le(buf, req_hdr::RESERVED4) != REQ_HEADER_RESERVED4
        || buf[req_hdr::RESERVED5] != 0x00
        || read_u16_le(buf, req_hdr::RESERVED6) != 0x0000
    {
        return Err(ParseError::BadReserved);
    }

    let dl = read_u16_le(buf, req_hdr::DL);
    if dl as usize + REQ_HEADER_DL_OFFSET as usize != buf.len() {
        return Err(ParseError::DlMismatch);
    }

    let command = read_u16_le(buf, req_hdr::COMMAND);
    if command != SLMP_COMMAND_CCIEFB_CYCLIC {
        return Err(ParseError::WrongCommand(command));
    }

    let cyclic = req_hdr::LEN;
    let protocol_ver = read_u16_le(buf, cyclic + cyclic_req_hdr::PROTOCOL_VER);
    if !(MIN_PROTOCOL_VER..=MAX_PROTOCOL_VER).contains(&protocol_ver) {
        return Err(ParseError::BadProtocolVersion(protocol_ver));
    }

    let cyclic_offset = read_u16_le(buf, cyclic + cyclic_req_hdr::CYCLIC_INFO_OFFSET);
    if cyclic_offset != REQUEST_CYCLIC_OFFSET {
        return Err(ParseError::BadCyclicOffset {
            got: cyclic_offset,
            expected: REQUEST_CYCLIC_OFFSET,
        });
    }
    if read_u16_le(buf, cyclic + cyclic_req_hdr::RESERVED1) != CYCLIC_REQ_HEADER_RESERVED1 {
        return Err(ParseError::BadReserved);
    }
    let reserved2 = &buf[cyclic + cyclic_req_hdr::RESERVED2..cyclic + cyclic_req_hdr::LEN];
    if reserved2.iter().any(|&b| b != 0x00) {
        return Err(ParseError::BadReserved);
    }

    let notif = cyclic + cyclic_req_hdr::LEN;
    let master_local_unit_info = read_u16_le(buf, notif + master_notif::MASTER_LOCAL_UNIT_INFO);
    let mask = match protocol_ver {
        1 => MASTER_NOTIFICATION_MASK_BITS_VER1,
        2 => MASTER_NOTIFICATION_MASK_BITS_VER2,
        _ => return Err(ParseError::BadProtocolVersion(protocol_ver)),
    };
    if master_local_unit_info & mask != 0 {
        return Err(ParseError::BadMasterNotificationBits(protocol_ver));
    }
    if read_u16_le(buf, notif + master_notif::RESERVED) != MASTER_NOTIFICATION_RESERVED {
        return Err(ParseError::BadReserved);
    }
    let clock_info = read_u64_le(buf, notif + master_notif::CLOCK_INFO);

    let data = notif + master_notif::LEN;
    let master_id = read_u32_le(buf, data + cyclic_req_data_hdr::MASTER_ID);
    let group_no = buf[data + cyclic_req_data_hdr::GROUP_NO];
    if !(MIN_GROUP_NO..=MAX_GROUP_NO).contains(&group_no) {
        return Err(ParseError::BadGroupNo(group_no as u16));
    }
    if buf[data + cyclic_req_data_hdr::RESERVED3] != 0x00 {
        return Err(ParseError::BadReserved);
    }
    let frame_sequence_no = read_u16_le(buf, data + cyclic_req_data_hdr::FRAME_SEQUENCE_NO);
    let timeout_value = read_u16_le(buf, data + cyclic_req_data_hdr::TIMEOUT_VALUE);
    let parallel_off_timeout_count =
        read_u16_le(buf, data + cyclic_req_data_hdr::PARALLEL_OFF_TIMEOUT_COUNT);
    let parameter_no = read_u16_le(buf, data + cyclic_req_data_hdr::PARAMETER_NO);
    let occupied = read_u16_le(buf, data + cyclic_req_data_hdr::SLAVE_TOTAL_OCCUPIED);
    if !(MIN_OCCUPIED..=MAX_OCCUPIED).contains(&occupied) {
        return Err(ParseError::BadOccupiedCount(occupied));
    }
    let cyclic_transmission_state =
        read_u16_le(buf, data + cyclic_req_data_hdr::CYCLIC_TRANSMISSION_STATE);
    if read_u16_le(buf, data + cyclic_req_data_hdr::RESERVED4) != 0x0000 {
        return Err(ParseError::BadReserved);
    }

    if master_id == 0 || master_id != source_ip {
        return Err(ParseError::BadMasterId);
    }

    let expected_len = request_len(occupied);
    if buf.len() != expected_len {
        return Err(ParseError::LengthMismatch {
            got: buf.len(),
            expected: expected_len,
            occupied,
        });
    }

    Ok(ParsedRequest {
        protocol_ver,
        master_id,
        group_no,
        frame_sequence_no,
        timeout_value,
        parallel_off_timeout_count,
        parameter_no,
        occupied,
        cyclic_transmission_state,
        master_local_unit_info,
        clock_info,
        layout: RequestLayout::new(occupied),
    })
}

/// Layout of a response frame's variable-length tail.
#[derive(Debug, Clone, Copy)]
pub struct ResponseLayout {
    pub rwr_offset: usize,
    pub rx_offset: usize,
    pub occupied: u16,
}

impl ResponseLayout {
    pub fn new(occupied: u16) -> Self {
        let rwr_offset = RESP_FULL_HEADERS_LEN;
        let rx_offset = rwr_offset + occupied as usize * REGISTER_BLOCK_LEN;
        ResponseLayout {
            rwr_offset,
            rx_offset,
            occupied,
        }
    }

    pub fn rwr(&self, buf: &[u8], station: usize) -> &[u8] {
        let off = self.rwr_offset + station * REGISTER_BLOCK_LEN;
        &buf[off..off + REGISTER_BLOCK_LEN]
    }

    pub fn rx(&self, buf: &[u8], station: usize) -> &[u8] {
        let off = self.rx_offset + station * BIT_BLOCK_LEN;
        &buf[off..off + BIT_BLOCK_LEN]
    }

    pub fn rwr_mut<'a>(&self, buf: &'a mut [u8], station: usize) -> &'a mut [u8] {
        let off = self.rwr_offset + station * REGISTER_BLOCK_LEN;
        &mut buf[off..off + REGISTER_BLOCK_LEN]
    }

    pub fn rx_mut<'a>(&self, buf: &'a mut [u8], station: usize) -> &'a mut [u8] {
        let off = self.rx_offset + station * BIT_BLOCK_LEN;
        &mut buf[off..off + BIT_BLOCK_LEN]
    }
}

/// Initialize an outgoing cyclic response frame in `buf`. The identity fields
/// (vendor/model/equipment) are written once; per-send fields are left zero
/// and set with [`update_response_frame_headers`].
#[allow(clippy::too_many_arguments)]
pub fn initialise_response_frame(
    buf: &mut [u8],
    protocol_ver: u16,
    vendor_code: u16,
    model_code: u32,
    equipment_ver: u16,
    occupied: u16,
) -> ResponseLayout {
    let len = response_len(occupied);
    assert!(buf.len() >= len, "response buffer too small");
    buf[..len].fill(0);

    write_u16_be(buf, resp_hdr::RESERVED1, RESP_HEADER_RESERVED1);
    buf[resp_hdr::RESERVED3] = RESP_HEADER_RESERVED3;
    write_u16_le(buf, resp_hdr::RESERVED4, RESP_HEADER_RESERVED4);
    write_u16_le(buf, resp_hdr::DL, (len as u16).wrapping_sub(REQ_HEADER_DL_OFFSET));

    let cyclic = resp_hdr::LEN;
    write_u16_le(buf, cyclic + cyclic_resp_hdr::PROTOCOL_VER, protocol_ver);
    write_u16_le(
        buf,
        cyclic + cyclic_resp_hdr::END_CODE,
        EndCode::SUCCESS.into(),
    );
    write_u16_le(
        buf,
        cyclic + cyclic_resp_hdr::CYCLIC_INFO_OFFSET,
        RESPONSE_CYCLIC_OFFSET,
    );

    let notif = cyclic + cyclic_resp_hdr::LEN;
    write_u16_le(buf, notif + slave_notif::VENDOR_CODE, vendor_code);
    write_u32_le(buf, notif + slave_notif::MODEL_CODE, model_code);
    write_u16_le(buf, notif + slave_notif::EQUIPMENT_VER, equipment_ver);

    let data = notif + slave_notif::LEN;
    write_u16_le(buf, data + cyclic_resp_data_hdr::GROUP_NO, 0);

    ResponseLayout::new(occupied)
}

/// Update the mutable fields of a response frame before each send.
#[allow(clippy::too_many_arguments)]
pub fn update_response_frame_headers(
    buf: &mut [u8],
    end_code: EndCode,
    slave_id: u32,
    group_no: u8,
    frame_sequence_no: u16,
    slave_local_unit_info: u16,
    slave_err_code: u16,
    local_management_info: u32,
) {
    let cyclic = resp_hdr::LEN;
    write_u16_le(buf, cyclic + cyclic_resp_hdr::END_CODE, end_code.into());

    let notif = cyclic + cyclic_resp_hdr::LEN;
    write_u16_le(
        buf,
        notif + slave_notif::SLAVE_LOCAL_UNIT_INFO,
        slave_local_unit_info,
    );
    write_u16_le(buf, notif + slave_notif::SLAVE_ERR_CODE, slave_err_code);
    write_u32_le(
        buf,
        notif + slave_notif::LOCAL_MANAGEMENT_INFO,
        local_management_info,
    );

    let data = notif + slave_notif::LEN;
    write_u32_le(buf, data + cyclic_resp_data_hdr::SLAVE_ID, slave_id);
    buf[data + cyclic_resp_data_hdr::GROUP_NO] = group_no;
    write_u16_le(
        buf,
        data + cyclic_resp_data_hdr::FRAME_SEQUENCE_NO,
        frame_sequence_no,
    );
}

/// A parsed and validated cyclic response.
#[derive(Debug, Clone, Copy)]
pub struct ParsedResponse {
    pub protocol_ver: u16,
    pub end_code: EndCode,
    pub vendor_code: u16,
    pub model_code: u32,
    pub equipment_ver: u16,
    pub slave_local_unit_info: u16,
    pub slave_err_code: u16,
    pub local_management_info: u32,
    pub slave_id: u32,
    pub group_no: u8,
    pub frame_sequence_no: u16,
    pub occupied: u16,
    pub layout: ResponseLayout,
}

/// Parse and validate an incoming cyclic response frame.
pub fn parse_response(buf: &[u8]) -> Result<ParsedResponse, ParseError> {
    if buf.len() < RESP_FULL_HEADERS_LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: RESP_FULL_HEADERS_LEN,
        });
    }

    if read_u16_be(buf, resp_hdr::RESERVED1) != RESP_HEADER_RESERVED1
        || buf[resp_hdr::RESERVED2] != 0x00
        || buf[resp_hdr::RESERVED3] != RESP_HEADER_RESERVED3
        || read_u16_le(buf, resp_hdr::RESERVED4) != RESP_HEADER_RESERVED4
        || buf[resp_hdr::RESERVED5] != 0x00
        || read_u16_le(buf, resp_hdr::RESERVED6) != 0x0000
    {
        return Err(ParseError::BadReserved);
    }

    let dl = read_u16_le(buf, resp_hdr::DL);
    if dl as usize + REQ_HEADER_DL_OFFSET as usize != buf.len() {
        return Err(ParseError::DlMismatch);
    }

    let cyclic = resp_hdr::LEN;
    let protocol_ver = read_u16_le(buf, cyclic + cyclic_resp_hdr::PROTOCOL_VER);
    let end_code = EndCode(read_u16_le(buf, cyclic + cyclic_resp_hdr::END_CODE));
    let cyclic_offset = read_u16_le(buf, cyclic + cyclic_resp_hdr::CYCLIC_INFO_OFFSET);
    if cyclic_offset != RESPONSE_CYCLIC_OFFSET {
        return Err(ParseError::BadCyclicOffset {
            got: cyclic_offset,
            expected: RESPONSE_CYCLIC_OFFSET,
        });
    }

    let notif = cyclic + cyclic_resp_hdr::LEN;
    let vendor_code = read_u16_le(buf, notif + slave_notif::VENDOR_CODE);
    let model_code = read_u32_le(buf, notif + slave_notif::MODEL_CODE);
    let equipment_ver = read_u16_le(buf, notif + slave_notif::EQUIPMENT_VER);
    let slave_local_unit_info = read_u16_le(buf, notif + slave_notif::SLAVE_LOCAL_UNIT_INFO);
    let slave_err_code = read_u16_le(buf, notif + slave_notif::SLAVE_ERR_CODE);
    let local_management_info = read_u32_le(buf, notif + slave_notif::LOCAL_MANAGEMENT_INFO);

    let data = notif + slave_notif::LEN;
    let slave_id = read_u32_le(buf, data + cyclic_resp_data_hdr::SLAVE_ID);
    let group_no = buf[data + cyclic_resp_data_hdr::GROUP_NO];
    let frame_sequence_no = read_u16_le(buf, data + cyclic_resp_data_hdr::FRAME_SEQUENCE_NO);

    let occupied = occupied_from_response_len(buf.len()).ok_or(ParseError::LengthMismatch {
        got: buf.len(),
        expected: RESPONSE_FIXED_LEN,
        occupied: 0,
    })?;

    Ok(ParsedResponse {
        protocol_ver,
        end_code,
        vendor_code,
        model_code,
        equipment_ver,
        slave_local_unit_info,
        slave_err_code,
        local_management_info,
        slave_id,
        group_no,
        frame_sequence_no,
        occupied,
        layout: ResponseLayout::new(occupied),
    })
}

/// Decompose a cyclic bit number (1-based, across all occupied stations in a
/// group) into a station index, byte offset within that station's bit block,
/// and bit index within that byte. No division is used, matching the wire
/// format's power-of-two bit block size.
pub fn bit_address(cyclic_bit_no: u32) -> (usize, usize, u8) {
    let zero_based = cyclic_bit_no - 1;
    let station = (zero_based >> 6) as usize; // 64 bits/station
    let byte = ((zero_based >> 3) & 0x7) as usize; // 8 bytes/station
    let bit = (zero_based & 0x7) as u8;
    (station, byte, bit)
}

/// Decompose a cyclic register number (1-based, across all occupied stations
/// in a group) into a station index and the register-in-area index (0..32).
pub fn register_address(cyclic_reg_no: u32) -> (usize, usize) {
    let zero_based = cyclic_reg_no - 1;
    let station = (zero_based >> 5) as usize; // 32 registers/station
    let reg_in_area = (zero_based & 0x1F) as usize;
    (station, reg_in_area)
}

/// Sentinel slave-ID value meaning "this station continues the previous
/// device's occupied range" (all-ones, per I7).
pub const SLAVE_ID_CONTINUATION: u32 = u32::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlaveIdError {
    #[error("slave id 0x{0:08X} appears more than once in the slave-ID list")]
    DuplicateEntry(u32),
}

/// Where a slave found itself in a request's slave-ID list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveIdMatch {
    /// 1-based station number of the slave's own (non-continuation) entry.
    pub station_no: u16,
    /// Number of contiguous stations this device implies it occupies,
    /// counting the matched entry itself and every immediately following
    /// [`SLAVE_ID_CONTINUATION`] entry.
    pub occupied: u16,
}

/// Scan a request's slave-ID list for `my_slave_id`.
///
/// Returns `Ok(None)` if absent. A second occurrence of `my_slave_id` in the
/// list is a master mis-configuration and rejected as [`SlaveIdError`].
pub fn analyze_slave_ids(
    list: &[u32],
    my_slave_id: u32,
) -> Result<Option<SlaveIdMatch>, SlaveIdError> {
    let mut found: Option<SlaveIdMatch> = None;
    let mut idx = 0usize;
    while idx < list.len() {
        if list[idx] != my_slave_id {
            idx += 1;
            continue;
        }
        if found.is_some() {
            return Err(SlaveIdError::DuplicateEntry(my_slave_id));
        }
        let station_no = (idx + 1) as u16;
        let mut occupied = 1u16;
        let mut j = idx + 1;
        while j < list.len() && list[j] == SLAVE_ID_CONTINUATION {
            occupied += 1;
            j += 1;
        }
        found = Some(SlaveIdMatch {
            station_no,
            occupied,
        });
        idx = j;
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_sizes_match_invariant() {
        assert_eq!(request_len(0), 67);
        assert_eq!(request_len(1), 67 + 76);
        assert_eq!(request_len(16), 67 + 76 * 16);
        assert_eq!(response_len(0), 59);
        assert_eq!(response_len(1), 59 + 72);
        assert_eq!(response_len(16), 59 + 72 * 16);
    }

    #[test]
    fn occupied_from_response_len_round_trips() {
        for n in 1u16..=16 {
            assert_eq!(occupied_from_response_len(response_len(n)), Some(n));
        }
        assert_eq!(occupied_from_response_len(response_len(3) + 1), None);
    }

    #[test]
    fn request_round_trip() {
        let occupied = 2u16;
        let mut buf = vec![0u8; request_len(occupied)];
        initialise_request_frame(&mut buf, 2, 200, 3, 0xC0A80101, 5, occupied, 7);
        update_request_frame_headers(&mut buf, 42, 0, 0, 0b11);

        let parsed = parse_request(&buf, 0xC0A80101).unwrap();
        assert_eq!(parsed.protocol_ver, 2);
        assert_eq!(parsed.master_id, 0xC0A80101);
        assert_eq!(parsed.group_no, 5);
        assert_eq!(parsed.occupied, occupied);
        assert_eq!(parsed.parameter_no, 7);
        assert_eq!(parsed.timeout_value, 200);
        assert_eq!(parsed.frame_sequence_no, 42);
        assert_eq!(parsed.cyclic_transmission_state, 0b11);
    }

    #[test]
    fn request_rejects_wrong_master_id() {
        let occupied = 1u16;
        let mut buf = vec![0u8; request_len(occupied)];
        initialise_request_frame(&mut buf, 1, 200, 3, 0xC0A80101, 1, occupied, 0);
        assert_eq!(
            parse_request(&buf, 0xC0A80102),
            Err(ParseError::BadMasterId)
        );
    }

    #[test]
    fn request_rejects_bad_command() {
        let occupied = 1u16;
        let mut buf = vec![0u8; request_len(occupied)];
        initialise_request_frame(&mut buf, 1, 200, 3, 0xC0A80101, 1, occupied, 0);
        write_u16_le(&mut buf, req_hdr::COMMAND, 0x1234);
        assert!(matches!(
            parse_request(&buf, 0xC0A80101),
            Err(ParseError::WrongCommand(0x1234))
        ));
    }

    #[test]
    fn request_rejects_bad_occupied_count() {
        let occupied = 1u16;
        let mut buf = vec![0u8; request_len(occupied)];
        initialise_request_frame(&mut buf, 1, 200, 3, 0xC0A80101, 1, occupied, 0);
        write_u16_le(
            &mut buf,
            req_hdr::LEN + cyclic_req_hdr::LEN + master_notif::LEN + cyclic_req_data_hdr::SLAVE_TOTAL_OCCUPIED,
            0,
        );
        assert!(matches!(
            parse_request(&buf, 0xC0A80101),
            Err(ParseError::BadOccupiedCount(0))
        ));
    }

    #[test]
    fn response_round_trip() {
        let occupied = 3u16;
        let mut buf = vec![0u8; response_len(occupied)];
        initialise_response_frame(&mut buf, 2, 0x00C0, 0xDEAD_BEEF, 1, occupied);
        update_response_frame_headers(&mut buf, EndCode::SUCCESS, 0xC0A80140, 5, 9, 0, 0, 0);

        let parsed = parse_response(&buf).unwrap();
        assert_eq!(parsed.protocol_ver, 2);
        assert_eq!(parsed.end_code, EndCode::SUCCESS);
        assert_eq!(parsed.occupied, occupied);
        assert_eq!(parsed.vendor_code, 0x00C0);
        assert_eq!(parsed.model_code, 0xDEAD_BEEF);
        assert_eq!(parsed.slave_id, 0xC0A80140);
        assert_eq!(parsed.group_no, 5);
        assert_eq!(parsed.frame_sequence_no, 9);
    }

    #[test]
    fn bit_address_first_bits_of_each_station() {
        assert_eq!(bit_address(1), (0, 0, 0));
        assert_eq!(bit_address(8), (0, 0, 7));
        assert_eq!(bit_address(9), (0, 1, 0));
        assert_eq!(bit_address(64), (0, 7, 7));
        assert_eq!(bit_address(65), (1, 0, 0));
    }

    #[test]
    fn register_address_first_regs_of_each_station() {
        assert_eq!(register_address(1), (0, 0));
        assert_eq!(register_address(32), (0, 31));
        assert_eq!(register_address(33), (1, 0));
    }

    #[test]
    fn analyze_slave_ids_finds_single_station_device() {
        let list = [0xC0A80128, 0xC0A80101, 0xC0A80102];
        let found = analyze_slave_ids(&list, 0xC0A80101).unwrap().unwrap();
        assert_eq!(found.station_no, 2);
        assert_eq!(found.occupied, 1);
    }

    #[test]
    fn analyze_slave_ids_counts_continuation_entries() {
        let list = [
            0xC0A80101,
            SLAVE_ID_CONTINUATION,
            SLAVE_ID_CONTINUATION,
            0xC0A80102,
        ];
        let found = analyze_slave_ids(&list, 0xC0A80101).unwrap().unwrap();
        assert_eq!(found.station_no, 1);
        assert_eq!(found.occupied, 3);
    }

    #[test]
    fn analyze_slave_ids_absent_returns_none() {
        let list = [0xC0A80101, 0xC0A80102];
        assert_eq!(analyze_slave_ids(&list, 0xFFFFFFFE).unwrap(), None);
    }

    #[test]
    fn analyze_slave_ids_rejects_duplicate() {
        let list = [0xC0A80101, 0xC0A80102, 0xC0A80101];
        assert_eq!(
            analyze_slave_ids(&list, 0xC0A80101),
            Err(SlaveIdError::DuplicateEntry(0xC0A80101))
        );
    }

    #[test]
    fn request_layout_addresses_are_contiguous() {
        let layout = RequestLayout::new(2);
        assert_eq!(layout.slave_id_offset, REQ_FULL_HEADERS_LEN);
        assert_eq!(layout.rww_offset, REQ_FULL_HEADERS_LEN + 2 * SLAVE_ID_LEN);
        assert_eq!(
            layout.ry_offset,
            REQ_FULL_HEADERS_LEN + 2 * SLAVE_ID_LEN + 2 * REGISTER_BLOCK_LEN
        );
    }
}

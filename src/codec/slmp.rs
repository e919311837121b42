//! SLMP frame layout: node-search and IP-address-assignment.
//!
//! SLMP shares UDP port 61451 with, but is otherwise independent of, the
//! CCIEFB cyclic exchange in [`super::cciefb`]. Every frame carries a common
//! 19-octet request header or 15-octet response header (`cl_slmp_req_header`
//! / `cl_slmp_resp_header` in the wire format), followed by a command-specific
//! body. MAC addresses are six octets, transmitted in wire order (already
//! reversed relative to the usual big-endian MAC notation, so they are
//! copied byte-for-byte and never byte-swapped here).

use super::bytes::*;
use super::endcode::EndCode;
use thiserror::Error;

pub const SLMP_COMMAND_NODE_SEARCH: u16 = 0x0E30;
pub const SLMP_COMMAND_NODE_IPADDRESS_SET: u16 = 0x0E31;

const REQ_HEADER_SUB1: u16 = 0x5400;
const REQ_HEADER_SUB2: u16 = 0x0000;
const REQ_HEADER_TIMER: u16 = 0x0000;
const REQ_HEADER_LENGTH_OFFSET: u16 = 13;

const RESP_HEADER_SUB1: u16 = 0xD400;
const RESP_HEADER_SUB2: u16 = 0x0000;
const RESP_HEADER_LENGTH_OFFSET: u16 = 13;

const HEADER_NETWORK_NUMBER: u8 = 0x00;
const HEADER_UNIT_NUMBER: u8 = 0xFF;
const HEADER_IO_NUMBER: u16 = 0x03FF;
const HEADER_EXTENSION: u8 = 0x00;

const IP_ADDR_SIZE: u8 = 4;
const PROTOCOL_IDENTIFIER_UDP: u8 = 0x01;
const NODE_SEARCH_RESP_SERVER_STATUS_NORMAL: u16 = 0x0000;
const SLMP_PORT: u16 = 61451;

mod req_hdr {
    pub const SUB1: usize = 0; // u16 BE
    pub const SERIAL: usize = 2; // u16 LE
    pub const SUB2: usize = 4; // u16 LE
    pub const NETWORK_NUMBER: usize = 6; // u8
    pub const UNIT_NUMBER: usize = 7; // u8
    pub const IO_NUMBER: usize = 8; // u16 LE
    pub const EXTENSION: usize = 10; // u8
    pub const LENGTH: usize = 11; // u16 LE
    pub const TIMER: usize = 13; // u16 LE
    pub const COMMAND: usize = 15; // u16 LE
    pub const SUB_COMMAND: usize = 17; // u16 LE
    pub const LEN: usize = 19;
    pub const LENGTH_OFFSET_USIZE: usize = super::REQ_HEADER_LENGTH_OFFSET as usize;
}

mod resp_hdr {
    pub const SUB1: usize = 0; // u16 BE
    pub const SERIAL: usize = 2; // u16 LE
    pub const SUB2: usize = 4; // u16 LE
    pub const NETWORK_NUMBER: usize = 6; // u8
    pub const UNIT_NUMBER: usize = 7; // u8
    pub const IO_NUMBER: usize = 8; // u16 LE
    pub const EXTENSION: usize = 10; // u8
    pub const LENGTH: usize = 11; // u16 LE
    pub const ENDCODE: usize = 13; // u16 LE
    pub const LEN: usize = 15;
    pub const LENGTH_OFFSET_USIZE: usize = super::RESP_HEADER_LENGTH_OFFSET as usize;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short: got {got}, need at least {need}")]
    TooShort { got: usize, need: usize },
    #[error("bad sub1 marker 0x{0:04X}")]
    BadSub1(u16),
    #[error("reserved field had unexpected value")]
    BadReserved,
    #[error("length field does not match the actual payload")]
    LengthMismatch,
    #[error("command 0x{0:04X} does not match the expected SLMP command")]
    WrongCommand(u16),
    #[error("response carried a non-success end code 0x{0:04X}")]
    ErrorEndCode(u16),
}

/// Octets counted by the request header's `length` field: everything after
/// the `length` field itself (`timer`, `command`, `sub_command`, then body).
const REQ_LENGTH_FIELD_TAIL: usize = req_hdr::LEN - req_hdr::LENGTH_OFFSET_USIZE;
/// Octets counted by the response header's `length` field: just `endcode`,
/// then body (the response header carries no `timer` field).
const RESP_LENGTH_FIELD_TAIL: usize = resp_hdr::LEN - resp_hdr::LENGTH_OFFSET_USIZE;

fn write_req_header(buf: &mut [u8], serial: u16, command: u16, sub_command: u16, body_len: usize) {
    write_u16_be(buf, req_hdr::SUB1, REQ_HEADER_SUB1);
    write_u16_le(buf, req_hdr::SERIAL, serial);
    write_u16_le(buf, req_hdr::SUB2, REQ_HEADER_SUB2);
    buf[req_hdr::NETWORK_NUMBER] = HEADER_NETWORK_NUMBER;
    buf[req_hdr::UNIT_NUMBER] = HEADER_UNIT_NUMBER;
    write_u16_le(buf, req_hdr::IO_NUMBER, HEADER_IO_NUMBER);
    buf[req_hdr::EXTENSION] = HEADER_EXTENSION;
    let length = (REQ_LENGTH_FIELD_TAIL + body_len) as u16;
    write_u16_le(buf, req_hdr::LENGTH, length);
    write_u16_le(buf, req_hdr::TIMER, REQ_HEADER_TIMER);
    write_u16_le(buf, req_hdr::COMMAND, command);
    write_u16_le(buf, req_hdr::SUB_COMMAND, sub_command);
}

fn parse_req_header(buf: &[u8]) -> Result<(u16, u16, usize), ParseError> {
    if buf.len() < req_hdr::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: req_hdr::LEN,
        });
    }
    let sub1 = read_u16_be(buf, req_hdr::SUB1);
    if sub1 != REQ_HEADER_SUB1 {
        return Err(ParseError::BadSub1(sub1));
    }
    if read_u16_le(buf, req_hdr::SUB2) != REQ_HEADER_SUB2
        || buf[req_hdr::NETWORK_NUMBER] != HEADER_NETWORK_NUMBER
        || buf[req_hdr::UNIT_NUMBER] != HEADER_UNIT_NUMBER
        || read_u16_le(buf, req_hdr::IO_NUMBER) != HEADER_IO_NUMBER
        || buf[req_hdr::EXTENSION] != HEADER_EXTENSION
        || read_u16_le(buf, req_hdr::TIMER) != REQ_HEADER_TIMER
    {
        return Err(ParseError::BadReserved);
    }
    let length = read_u16_le(buf, req_hdr::LENGTH);
    let expected_len = REQ_HEADER_LENGTH_OFFSET as usize + length as usize;
    if expected_len != buf.len() {
        return Err(ParseError::LengthMismatch);
    }
    let serial = read_u16_le(buf, req_hdr::SERIAL);
    let command = read_u16_le(buf, req_hdr::COMMAND);
    Ok((serial, command, req_hdr::LEN))
}

fn write_resp_header(buf: &mut [u8], serial: u16, end_code: EndCode, body_len: usize) {
    write_u16_be(buf, resp_hdr::SUB1, RESP_HEADER_SUB1);
    write_u16_le(buf, resp_hdr::SERIAL, serial);
    write_u16_le(buf, resp_hdr::SUB2, RESP_HEADER_SUB2);
    buf[resp_hdr::NETWORK_NUMBER] = HEADER_NETWORK_NUMBER;
    buf[resp_hdr::UNIT_NUMBER] = HEADER_UNIT_NUMBER;
    write_u16_le(buf, resp_hdr::IO_NUMBER, HEADER_IO_NUMBER);
    buf[resp_hdr::EXTENSION] = HEADER_EXTENSION;
    let length = (RESP_LENGTH_FIELD_TAIL + body_len) as u16;
    write_u16_le(buf, resp_hdr::LENGTH, length);
    write_u16_le(buf, resp_hdr::ENDCODE, end_code.into());
}

fn parse_resp_header(buf: &[u8]) -> Result<(u16, EndCode), ParseError> {
    if buf.len() < resp_hdr::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: resp_hdr::LEN,
        });
    }
    let sub1 = read_u16_be(buf, resp_hdr::SUB1);
    if sub1 != RESP_HEADER_SUB1 {
        return Err(ParseError::BadSub1(sub1));
    }
    if read_u16_le(buf, resp_hdr::SUB2) != RESP_HEADER_SUB2
        || buf[resp_hdr::NETWORK_NUMBER] != HEADER_NETWORK_NUMBER
        || buf[resp_hdr::UNIT_NUMBER] != HEADER_UNIT_NUMBER
        || read_u16_le(buf, resp_hdr::IO_NUMBER) != HEADER_IO_NUMBER
        || buf[resp_hdr::EXTENSION] != HEADER_EXTENSION
    {
        return Err(ParseError::BadReserved);
    }
    let length = read_u16_le(buf, resp_hdr::LENGTH);
    let expected_len = RESP_HEADER_LENGTH_OFFSET as usize + length as usize;
    if expected_len != buf.len() {
        return Err(ParseError::LengthMismatch);
    }
    let serial = read_u16_le(buf, resp_hdr::SERIAL);
    let end_code = EndCode(read_u16_le(buf, resp_hdr::ENDCODE));
    Ok((serial, end_code))
}

/// Node-search request body offsets, relative to the end of the header (19).
mod node_search_req_body {
    pub const MASTER_MAC: usize = 0; // 6 octets
    pub const MASTER_IP_ADDR_SIZE: usize = 6; // u8
    pub const MASTER_IP_ADDR: usize = 7; // u32 LE
    pub const LEN: usize = 11;
}

pub const NODE_SEARCH_REQUEST_LEN: usize = req_hdr::LEN + node_search_req_body::LEN;

pub fn build_node_search_request(buf: &mut [u8], serial: u16, master_mac: [u8; 6], master_ip: u32) {
    assert!(buf.len() >= NODE_SEARCH_REQUEST_LEN);
    buf[..NODE_SEARCH_REQUEST_LEN].fill(0);
    write_req_header(
        buf,
        serial,
        SLMP_COMMAND_NODE_SEARCH,
        0,
        node_search_req_body::LEN,
    );
    let body = req_hdr::LEN;
    buf[body + node_search_req_body::MASTER_MAC..body + node_search_req_body::MASTER_MAC + 6]
        .copy_from_slice(&master_mac);
    buf[body + node_search_req_body::MASTER_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + node_search_req_body::MASTER_IP_ADDR, master_ip);
}

#[derive(Debug, Clone, Copy)]
pub struct NodeSearchRequest {
    pub serial: u16,
    pub master_mac: [u8; 6],
    pub master_ip: u32,
}

pub fn parse_node_search_request(buf: &[u8]) -> Result<NodeSearchRequest, ParseError> {
    let (serial, command, header_len) = parse_req_header(buf)?;
    if command != SLMP_COMMAND_NODE_SEARCH {
        return Err(ParseError::WrongCommand(command));
    }
    if buf.len() < header_len + node_search_req_body::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: header_len + node_search_req_body::LEN,
        });
    }
    let body = header_len;
    let mut master_mac = [0u8; 6];
    master_mac.copy_from_slice(
        &buf[body + node_search_req_body::MASTER_MAC..body + node_search_req_body::MASTER_MAC + 6],
    );
    let master_ip = read_u32_le(buf, body + node_search_req_body::MASTER_IP_ADDR);
    Ok(NodeSearchRequest {
        serial,
        master_mac,
        master_ip,
    })
}

/// Node-search response body offsets, relative to the end of the header (15).
mod node_search_resp_body {
    pub const MASTER_MAC: usize = 0; // 6
    pub const MASTER_IP_ADDR_SIZE: usize = 6; // u8
    pub const MASTER_IP_ADDR: usize = 7; // u32
    pub const SLAVE_MAC: usize = 11; // 6
    pub const SLAVE_IP_ADDR_SIZE: usize = 17; // u8
    pub const SLAVE_IP_ADDR: usize = 18; // u32
    pub const SLAVE_NETMASK: usize = 22; // u32
    pub const SLAVE_DEFAULT_GATEWAY: usize = 26; // u32
    pub const SLAVE_HOSTNAME_SIZE: usize = 30; // u8
    pub const VENDOR_CODE: usize = 31; // u16
    pub const MODEL_CODE: usize = 33; // u32
    pub const EQUIPMENT_VER: usize = 37; // u16
    pub const TARGET_IP_ADDR_SIZE: usize = 39; // u8
    pub const TARGET_IP_ADDR: usize = 40; // u32
    pub const TARGET_PORT: usize = 44; // u16
    pub const SLAVE_STATUS: usize = 46; // u16
    pub const SLAVE_PORT: usize = 48; // u16
    pub const SLAVE_PROTOCOL_SETTINGS: usize = 50; // u8
    pub const LEN: usize = 51;
}

pub const NODE_SEARCH_RESPONSE_LEN: usize = resp_hdr::LEN + node_search_resp_body::LEN;

#[allow(clippy::too_many_arguments)]
pub fn build_node_search_response(
    buf: &mut [u8],
    serial: u16,
    master_mac: [u8; 6],
    master_ip: u32,
    slave_mac: [u8; 6],
    slave_ip: u32,
    slave_netmask: u32,
    vendor_code: u16,
    model_code: u32,
    equipment_ver: u16,
) {
    assert!(buf.len() >= NODE_SEARCH_RESPONSE_LEN);
    buf[..NODE_SEARCH_RESPONSE_LEN].fill(0);
    write_resp_header(buf, serial, EndCode::SUCCESS, node_search_resp_body::LEN);
    let body = resp_hdr::LEN;
    buf[body + node_search_resp_body::MASTER_MAC..body + node_search_resp_body::MASTER_MAC + 6]
        .copy_from_slice(&master_mac);
    buf[body + node_search_resp_body::MASTER_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + node_search_resp_body::MASTER_IP_ADDR, master_ip);
    buf[body + node_search_resp_body::SLAVE_MAC..body + node_search_resp_body::SLAVE_MAC + 6]
        .copy_from_slice(&slave_mac);
    buf[body + node_search_resp_body::SLAVE_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + node_search_resp_body::SLAVE_IP_ADDR, slave_ip);
    write_u32_le(buf, body + node_search_resp_body::SLAVE_NETMASK, slave_netmask);
    write_u32_le(
        buf,
        body + node_search_resp_body::SLAVE_DEFAULT_GATEWAY,
        u32::MAX,
    );
    buf[body + node_search_resp_body::SLAVE_HOSTNAME_SIZE] = 0;
    write_u16_le(buf, body + node_search_resp_body::VENDOR_CODE, vendor_code);
    write_u32_le(buf, body + node_search_resp_body::MODEL_CODE, model_code);
    write_u16_le(
        buf,
        body + node_search_resp_body::EQUIPMENT_VER,
        equipment_ver,
    );
    buf[body + node_search_resp_body::TARGET_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + node_search_resp_body::TARGET_IP_ADDR, u32::MAX);
    write_u16_le(buf, body + node_search_resp_body::TARGET_PORT, u16::MAX);
    write_u16_le(
        buf,
        body + node_search_resp_body::SLAVE_STATUS,
        NODE_SEARCH_RESP_SERVER_STATUS_NORMAL,
    );
    write_u16_le(buf, body + node_search_resp_body::SLAVE_PORT, SLMP_PORT);
    buf[body + node_search_resp_body::SLAVE_PROTOCOL_SETTINGS] = PROTOCOL_IDENTIFIER_UDP;
}

#[derive(Debug, Clone, Copy)]
pub struct NodeSearchResponse {
    pub serial: u16,
    pub master_mac: [u8; 6],
    pub master_ip: u32,
    pub slave_mac: [u8; 6],
    pub slave_ip: u32,
    pub slave_netmask: u32,
    pub vendor_code: u16,
    pub model_code: u32,
    pub equipment_ver: u16,
    pub slave_status: u16,
}

pub fn parse_node_search_response(buf: &[u8]) -> Result<NodeSearchResponse, ParseError> {
    let (serial, end_code) = parse_resp_header(buf)?;
    if end_code != EndCode::SUCCESS {
        return Err(ParseError::ErrorEndCode(end_code.into()));
    }
    if buf.len() < resp_hdr::LEN + node_search_resp_body::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: resp_hdr::LEN + node_search_resp_body::LEN,
        });
    }
    let body = resp_hdr::LEN;
    let mut master_mac = [0u8; 6];
    master_mac
        .copy_from_slice(&buf[body + node_search_resp_body::MASTER_MAC..body + node_search_resp_body::MASTER_MAC + 6]);
    let mut slave_mac = [0u8; 6];
    slave_mac
        .copy_from_slice(&buf[body + node_search_resp_body::SLAVE_MAC..body + node_search_resp_body::SLAVE_MAC + 6]);
    Ok(NodeSearchResponse {
        serial,
        master_mac,
        master_ip: read_u32_le(buf, body + node_search_resp_body::MASTER_IP_ADDR),
        slave_mac,
        slave_ip: read_u32_le(buf, body + node_search_resp_body::SLAVE_IP_ADDR),
        slave_netmask: read_u32_le(buf, body + node_search_resp_body::SLAVE_NETMASK),
        vendor_code: read_u16_le(buf, body + node_search_resp_body::VENDOR_CODE),
        model_code: read_u32_le(buf, body + node_search_resp_body::MODEL_CODE),
        equipment_ver: read_u16_le(buf, body + node_search_resp_body::EQUIPMENT_VER),
        slave_status: read_u16_le(buf, body + node_search_resp_body::SLAVE_STATUS),
    })
}

/// Set-IP request body offsets, relative to the end of the header (19).
mod set_ip_req_body {
    pub const MASTER_MAC: usize = 0; // 6
    pub const MASTER_IP_ADDR_SIZE: usize = 6; // u8
    pub const MASTER_IP_ADDR: usize = 7; // u32
    pub const SLAVE_MAC: usize = 11; // 6
    pub const SLAVE_IP_ADDR_SIZE: usize = 17; // u8
    pub const SLAVE_NEW_IP_ADDR: usize = 18; // u32
    pub const SLAVE_NEW_NETMASK: usize = 22; // u32
    pub const SLAVE_DEFAULT_GATEWAY: usize = 26; // u32
    pub const SLAVE_HOSTNAME_SIZE: usize = 30; // u8
    pub const TARGET_IP_ADDR_SIZE: usize = 31; // u8
    pub const TARGET_IP_ADDR: usize = 32; // u32
    pub const TARGET_PORT: usize = 36; // u16
    pub const SLAVE_PROTOCOL_SETTINGS: usize = 38; // u8
    pub const LEN: usize = 39;
}

pub const SET_IP_REQUEST_LEN: usize = req_hdr::LEN + set_ip_req_body::LEN;

#[allow(clippy::too_many_arguments)]
pub fn build_set_ip_request(
    buf: &mut [u8],
    serial: u16,
    master_mac: [u8; 6],
    master_ip: u32,
    slave_mac: [u8; 6],
    slave_new_ip: u32,
    slave_new_netmask: u32,
) {
    assert!(buf.len() >= SET_IP_REQUEST_LEN);
    buf[..SET_IP_REQUEST_LEN].fill(0);
    write_req_header(
        buf,
        serial,
        SLMP_COMMAND_NODE_IPADDRESS_SET,
        0,
        set_ip_req_body::LEN,
    );
    let body = req_hdr::LEN;
    buf[body + set_ip_req_body::MASTER_MAC..body + set_ip_req_body::MASTER_MAC + 6]
        .copy_from_slice(&master_mac);
    buf[body + set_ip_req_body::MASTER_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + set_ip_req_body::MASTER_IP_ADDR, master_ip);
    buf[body + set_ip_req_body::SLAVE_MAC..body + set_ip_req_body::SLAVE_MAC + 6]
        .copy_from_slice(&slave_mac);
    buf[body + set_ip_req_body::SLAVE_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + set_ip_req_body::SLAVE_NEW_IP_ADDR, slave_new_ip);
    write_u32_le(
        buf,
        body + set_ip_req_body::SLAVE_NEW_NETMASK,
        slave_new_netmask,
    );
    write_u32_le(buf, body + set_ip_req_body::SLAVE_DEFAULT_GATEWAY, u32::MAX);
    buf[body + set_ip_req_body::SLAVE_HOSTNAME_SIZE] = 0;
    buf[body + set_ip_req_body::TARGET_IP_ADDR_SIZE] = IP_ADDR_SIZE;
    write_u32_le(buf, body + set_ip_req_body::TARGET_IP_ADDR, u32::MAX);
    write_u16_le(buf, body + set_ip_req_body::TARGET_PORT, u16::MAX);
    buf[body + set_ip_req_body::SLAVE_PROTOCOL_SETTINGS] = PROTOCOL_IDENTIFIER_UDP;
}

#[derive(Debug, Clone, Copy)]
pub struct SetIpRequest {
    pub serial: u16,
    pub master_mac: [u8; 6],
    pub master_ip: u32,
    pub slave_mac: [u8; 6],
    pub slave_new_ip: u32,
    pub slave_new_netmask: u32,
}

pub fn parse_set_ip_request(buf: &[u8]) -> Result<SetIpRequest, ParseError> {
    let (serial, command, header_len) = parse_req_header(buf)?;
    if command != SLMP_COMMAND_NODE_IPADDRESS_SET {
        return Err(ParseError::WrongCommand(command));
    }
    if buf.len() < header_len + set_ip_req_body::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: header_len + set_ip_req_body::LEN,
        });
    }
    let body = header_len;
    let mut master_mac = [0u8; 6];
    master_mac.copy_from_slice(
        &buf[body + set_ip_req_body::MASTER_MAC..body + set_ip_req_body::MASTER_MAC + 6],
    );
    let mut slave_mac = [0u8; 6];
    slave_mac.copy_from_slice(
        &buf[body + set_ip_req_body::SLAVE_MAC..body + set_ip_req_body::SLAVE_MAC + 6],
    );
    Ok(SetIpRequest {
        serial,
        master_mac,
        master_ip: read_u32_le(buf, body + set_ip_req_body::MASTER_IP_ADDR),
        slave_mac,
        slave_new_ip: read_u32_le(buf, body + set_ip_req_body::SLAVE_NEW_IP_ADDR),
        slave_new_netmask: read_u32_le(buf, body + set_ip_req_body::SLAVE_NEW_NETMASK),
    })
}

/// Set-IP response body offsets, relative to the end of the header (15).
mod set_ip_resp_body {
    pub const MASTER_MAC: usize = 0; // 6
    pub const LEN: usize = 6;
}

pub const SET_IP_RESPONSE_LEN: usize = resp_hdr::LEN + set_ip_resp_body::LEN;

pub fn build_set_ip_response(buf: &mut [u8], serial: u16, end_code: EndCode, master_mac: [u8; 6]) {
    assert!(buf.len() >= SET_IP_RESPONSE_LEN);
    buf[..SET_IP_RESPONSE_LEN].fill(0);
    write_resp_header(buf, serial, end_code, set_ip_resp_body::LEN);
    let body = resp_hdr::LEN;
    buf[body + set_ip_resp_body::MASTER_MAC..body + set_ip_resp_body::MASTER_MAC + 6]
        .copy_from_slice(&master_mac);
}

#[derive(Debug, Clone, Copy)]
pub struct SetIpResponse {
    pub serial: u16,
    pub end_code: EndCode,
    pub master_mac: [u8; 6],
}

pub fn parse_set_ip_response(buf: &[u8]) -> Result<SetIpResponse, ParseError> {
    let (serial, end_code) = parse_resp_header(buf)?;
    if buf.len() < resp_hdr::LEN + set_ip_resp_body::LEN {
        return Err(ParseError::TooShort {
            got: buf.len(),
            need: resp_hdr::LEN + set_ip_resp_body::LEN,
        });
    }
    let body = resp_hdr::LEN;
    let mut master_mac = [0u8; 6];
    master_mac.copy_from_slice(
        &buf[body + set_ip_resp_body::MASTER_MAC..body + set_ip_resp_body::MASTER_MAC + 6],
    );
    Ok(SetIpResponse {
        serial,
        end_code,
        master_mac,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_search_request_round_trip() {
        let mut buf = vec![0u8; NODE_SEARCH_REQUEST_LEN];
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        build_node_search_request(&mut buf, 7, mac, 0xC0A80101);
        let parsed = parse_node_search_request(&buf).unwrap();
        assert_eq!(parsed.serial, 7);
        assert_eq!(parsed.master_mac, mac);
        assert_eq!(parsed.master_ip, 0xC0A80101);
    }

    #[test]
    fn node_search_response_round_trip() {
        let mut buf = vec![0u8; NODE_SEARCH_RESPONSE_LEN];
        let master_mac = [1, 2, 3, 4, 5, 6];
        let slave_mac = [6, 5, 4, 3, 2, 1];
        build_node_search_response(
            &mut buf,
            11,
            master_mac,
            0xC0A80101,
            slave_mac,
            0xC0A80140,
            0xFFFFFF00,
            0x00C0,
            0xDEAD_BEEF,
            2,
        );
        let parsed = parse_node_search_response(&buf).unwrap();
        assert_eq!(parsed.serial, 11);
        assert_eq!(parsed.master_mac, master_mac);
        assert_eq!(parsed.slave_mac, slave_mac);
        assert_eq!(parsed.slave_ip, 0xC0A80140);
        assert_eq!(parsed.vendor_code, 0x00C0);
        assert_eq!(parsed.model_code, 0xDEAD_BEEF);
        assert_eq!(parsed.slave_status, 0);
    }

    #[test]
    fn set_ip_round_trip() {
        let mut buf = vec![0u8; SET_IP_REQUEST_LEN];
        let master_mac = [1, 2, 3, 4, 5, 6];
        let slave_mac = [6, 5, 4, 3, 2, 1];
        build_set_ip_request(
            &mut buf,
            3,
            master_mac,
            0xC0A80101,
            slave_mac,
            0xC0A80150,
            0xFFFFFF00,
        );
        let parsed = parse_set_ip_request(&buf).unwrap();
        assert_eq!(parsed.serial, 3);
        assert_eq!(parsed.slave_mac, slave_mac);
        assert_eq!(parsed.slave_new_ip, 0xC0A80150);

        let mut resp = vec![0u8; SET_IP_RESPONSE_LEN];
        build_set_ip_response(&mut resp, 3, EndCode::SUCCESS, master_mac);
        let parsed_resp = parse_set_ip_response(&resp).unwrap();
        assert_eq!(parsed_resp.serial, 3);
        assert_eq!(parsed_resp.end_code, EndCode::SUCCESS);
        assert_eq!(parsed_resp.master_mac, master_mac);
    }

    #[test]
    fn rejects_wrong_command() {
        let mut buf = vec![0u8; NODE_SEARCH_REQUEST_LEN];
        build_node_search_request(&mut buf, 1, [0; 6], 0);
        write_u16_le(&mut buf, req_hdr::COMMAND, SLMP_COMMAND_NODE_IPADDRESS_SET);
        assert!(matches!(
            parse_node_search_request(&buf),
            Err(ParseError::WrongCommand(_))
        ));
    }
}

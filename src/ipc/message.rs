//! Fixed-size wire records exchanged with the DHCP clients and the IPoE
//! health checker.
//!
//! Every record is `msg_type` (a native-endian `u32`) followed by a payload
//! area of [`PAYLOAD_SIZE`] bytes, so all variants occupy exactly
//! [`RECORD_SIZE`] bytes on the wire. Text fields are NUL-padded and always
//! keep at least one terminating NUL.

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use thiserror::Error;

pub const IFNAME_LENGTH: usize = 64;
pub const BUFLEN_32: usize = 32;
pub const BUFLEN_64: usize = 64;

const TAG_SIZE: usize = 4;

/// Size of the DHCPv4 lease payload.
pub const DHCPV4_PAYLOAD_SIZE: usize = IFNAME_LENGTH + 3 * BUFLEN_32 + 3 * BUFLEN_64;
/// Size of the DHCPv6 lease payload.
pub const DHCPV6_PAYLOAD_SIZE: usize = IFNAME_LENGTH + 4 * BUFLEN_64;
/// Size of a standalone health-check record.
pub const IHC_RECORD_SIZE: usize = TAG_SIZE + IFNAME_LENGTH + BUFLEN_32 + BUFLEN_64;

/// Payload area shared by every variant: the largest payload wins.
pub const PAYLOAD_SIZE: usize = max(max(DHCPV4_PAYLOAD_SIZE, DHCPV6_PAYLOAD_SIZE), IHC_RECORD_SIZE);
/// Exact byte length of every event record.
pub const RECORD_SIZE: usize = TAG_SIZE + PAYLOAD_SIZE;

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed message: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },

    #[error("unknown message type {0}")]
    UnknownMessageType(u32),

    #[error("unknown health-check message type {0}")]
    UnknownHealthCheckType(u32),
}

/// Discriminant of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    DhcpV4StateChanged = 1,
    DhcpV6StateChanged = 2,
    HealthCheckStateChanged = 3,
}

impl TryFrom<u32> for MessageType {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::DhcpV4StateChanged),
            2 => Ok(Self::DhcpV6StateChanged),
            3 => Ok(Self::HealthCheckStateChanged),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

/// Subtype carried inside a health-check payload.
///
/// The `WanConnection*` values flow from this process to the health
/// checker; the `Echo*` values flow back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IhcMessageType {
    WanConnectionUp = 1,
    WanConnectionDown = 2,
    WanConnectionIpv6Up = 3,
    WanConnectionIpv6Down = 4,
    EchoFailIpv4 = 5,
    EchoFailIpv6 = 6,
    EchoRenewIpv4 = 7,
    EchoRenewIpv6 = 8,
    EchoIpv4Up = 9,
    EchoIpv6Up = 10,
}

impl TryFrom<u32> for IhcMessageType {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::WanConnectionUp,
            2 => Self::WanConnectionDown,
            3 => Self::WanConnectionIpv6Up,
            4 => Self::WanConnectionIpv6Down,
            5 => Self::EchoFailIpv4,
            6 => Self::EchoFailIpv6,
            7 => Self::EchoRenewIpv4,
            8 => Self::EchoRenewIpv6,
            9 => Self::EchoIpv4Up,
            10 => Self::EchoIpv6Up,
            other => return Err(CodecError::UnknownHealthCheckType(other)),
        })
    }
}

/// Lease details reported by the DHCPv4 client when it binds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcpv4Lease {
    pub interface: String,
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub dns_server: String,
    pub ntp_server: String,
    pub domain_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcpv6Lease {
    pub interface: String,
    pub address: String,
    pub prefix: String,
    pub dns_server: String,
    pub domain_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IhcMessage {
    pub msg_type: IhcMessageType,
    pub if_name: String,
    pub ipv4_address: String,
    pub ipv6_address: String,
}

impl IhcMessage {
    pub fn new(msg_type: IhcMessageType, if_name: impl Into<String>) -> Self {
        Self {
            msg_type,
            if_name: if_name.into(),
            ipv4_address: String::new(),
            ipv6_address: String::new(),
        }
    }

    /// Encodes the standalone health-check record pushed to the peer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(IHC_RECORD_SIZE);
        self.write(&mut buf);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        check_len(data, IHC_RECORD_SIZE)?;
        Self::read(data)
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_ne(self.msg_type as u32);
        put_text(buf, &self.if_name, IFNAME_LENGTH);
        put_text(buf, &self.ipv4_address, BUFLEN_32);
        put_text(buf, &self.ipv6_address, BUFLEN_64);
    }

    fn read(mut data: &[u8]) -> Result<Self, CodecError> {
        let msg_type = IhcMessageType::try_from(data.get_u32_ne())?;
        Ok(Self {
            msg_type,
            if_name: take_text(&mut data, IFNAME_LENGTH),
            ipv4_address: take_text(&mut data, BUFLEN_32),
            ipv6_address: take_text(&mut data, BUFLEN_64),
        })
    }
}

/// A decoded event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DhcpV4(Dhcpv4Lease),
    DhcpV6(Dhcpv6Lease),
    HealthCheck(IhcMessage),
}

impl Event {
    pub fn message_type(&self) -> MessageType {
        match self {
            Event::DhcpV4(_) => MessageType::DhcpV4StateChanged,
            Event::DhcpV6(_) => MessageType::DhcpV6StateChanged,
            Event::HealthCheck(_) => MessageType::HealthCheckStateChanged,
        }
    }

    /// Encodes the event into a zero-padded record of exactly [`RECORD_SIZE`] bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        buf.put_u32_ne(self.message_type() as u32);
        match self {
            Event::DhcpV4(lease) => {
                put_text(&mut buf, &lease.interface, IFNAME_LENGTH);
                put_text(&mut buf, &lease.ip, BUFLEN_32);
                put_text(&mut buf, &lease.mask, BUFLEN_32);
                put_text(&mut buf, &lease.gateway, BUFLEN_32);
                put_text(&mut buf, &lease.dns_server, BUFLEN_64);
                put_text(&mut buf, &lease.ntp_server, BUFLEN_64);
                put_text(&mut buf, &lease.domain_name, BUFLEN_64);
            }
            Event::DhcpV6(lease) => {
                put_text(&mut buf, &lease.interface, IFNAME_LENGTH);
                put_text(&mut buf, &lease.address, BUFLEN_64);
                put_text(&mut buf, &lease.prefix, BUFLEN_64);
                put_text(&mut buf, &lease.dns_server, BUFLEN_64);
                put_text(&mut buf, &lease.domain_name, BUFLEN_64);
            }
            Event::HealthCheck(msg) => msg.write(&mut buf),
        }
        buf.resize(RECORD_SIZE, 0);
        buf.freeze()
    }

    /// Decodes a received datagram.
    ///
    /// Anything that is not exactly [`RECORD_SIZE`] bytes is rejected before
    /// any field is looked at.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        check_len(data, RECORD_SIZE)?;
        let mut buf = data;
        let msg_type = MessageType::try_from(buf.get_u32_ne())?;
        let event = match msg_type {
            MessageType::DhcpV4StateChanged => Event::DhcpV4(Dhcpv4Lease {
                interface: take_text(&mut buf, IFNAME_LENGTH),
                ip: take_text(&mut buf, BUFLEN_32),
                mask: take_text(&mut buf, BUFLEN_32),
                gateway: take_text(&mut buf, BUFLEN_32),
                dns_server: take_text(&mut buf, BUFLEN_64),
                ntp_server: take_text(&mut buf, BUFLEN_64),
                domain_name: take_text(&mut buf, BUFLEN_64),
            }),
            MessageType::DhcpV6StateChanged => Event::DhcpV6(Dhcpv6Lease {
                interface: take_text(&mut buf, IFNAME_LENGTH),
                address: take_text(&mut buf, BUFLEN_64),
                prefix: take_text(&mut buf, BUFLEN_64),
                dns_server: take_text(&mut buf, BUFLEN_64),
                domain_name: take_text(&mut buf, BUFLEN_64),
            }),
            MessageType::HealthCheckStateChanged => Event::HealthCheck(IhcMessage::read(buf)?),
        };
        Ok(event)
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() != expected {
        return Err(CodecError::Malformed {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Writes `value` into a NUL-padded field of `width` bytes, truncating to
/// `width - 1` bytes on a character boundary.
fn put_text(buf: &mut BytesMut, value: &str, width: usize) {
    let mut end = value.len().min(width - 1);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_slice(&value.as_bytes()[..end]);
    buf.put_bytes(0, width - end);
}

fn take_text(buf: &mut &[u8], width: usize) -> String {
    let field = &buf[..width];
    let len = field.iter().position(|&b| b == 0).unwrap_or(width);
    let text = String::from_utf8_lossy(&field[..len]).into_owned();
    buf.advance(width);
    text
}

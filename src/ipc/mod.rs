//! Wire protocol shared with the DHCP clients and the IPoE health checker
//!
//! This module contains:
//! - Fixed-size record layout and constants
//! - Event and health-check message encoding and decoding

pub mod message;


pub use message::{
    CodecError, Dhcpv4Lease, Dhcpv6Lease, Event, IhcMessage, IhcMessageType, MessageType,
    IHC_RECORD_SIZE, RECORD_SIZE,
};

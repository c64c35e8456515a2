//! A single-threaded, `no_std`, no-alloc IPv4 network stack for an
//! ENC28J60 SPI Ethernet controller: ARP, ICMP echo, UDP, a minimal TCP
//! responder, a DHCP client, and an HTTP/1.1 dispatcher layered on the
//! TCP responder, wired together behind one [`dispatch::Stack`].
//!
//! Everything addresses two fixed-capacity packet buffers in place by
//! compile-time byte offset (see [`wire`]) rather than building a parsed
//! header representation — the whole engine is sized for an MCU with no
//! heap and a few KiB of RAM.

#![no_std]

pub mod arp;
pub mod buffers;
pub mod checksum;
pub mod config;
pub mod counters;
pub mod dhcp;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod icmp;
pub mod nic;
pub mod port_service;
pub mod tcp;
pub mod udp;
pub mod wire;

pub use arp::{ArpAction, ArpCache};
pub use buffers::PacketBuffers;
pub use counters::{Clock, Counters, Direction, NoopCounters, TrafficKind};
pub use dhcp::{DhcpClient, DhcpEvent, DhcpState};
pub use dispatch::Stack;
pub use error::NicError;
pub use nic::Enc28j60;
pub use port_service::PortService;
pub use tcp::{TcpAction, TcpState};

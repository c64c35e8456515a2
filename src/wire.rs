//! Fixed byte offsets into [`buffer_in`](crate::buffers::PacketBuffers::buffer_in) /
//! [`buffer_out`](crate::buffers::PacketBuffers::buffer_out).
//!
//! Every protocol layer addresses the packet by these compile-time offsets
//! instead of parsing a nested header struct — the frame is always
//! Ethernet-at-0, IPv4-at-14, transport-at-34, matching the wire layout in
//! RFC 826/791/792/768/793 directly. Keeping them in one place means every
//! layer agrees on where its header starts.

pub const ETH_LEN_HEADER: usize = 14;

pub const ETH_MAC_DST: usize = 0x00;
pub const ETH_MAC_SRC: usize = 0x06;
pub const ETH_TYPE_H: usize = 0x0C;
pub const ETH_TYPE_L: usize = 0x0D;

pub const ETH_TYPE_ARP: [u8; 2] = [0x08, 0x06];
pub const ETH_TYPE_IP: [u8; 2] = [0x08, 0x00];

pub const ARP_LEN: u16 = 42;

pub const ARP_HARDWARE_H: usize = 0x0E;
pub const ARP_HARDWARE_L: usize = 0x0F;
pub const ARP_PROTOCOL_H: usize = 0x10;
pub const ARP_PROTOCOL_L: usize = 0x11;
pub const ARP_SIZE_HW: usize = 0x12;
pub const ARP_SIZE_PROTO: usize = 0x13;
pub const ARP_OPER_H: usize = 0x14;
pub const ARP_OPER_L: usize = 0x15;
pub const ARP_SEND_HW: usize = 0x16;
pub const ARP_SEND_PROTO: usize = 0x1C;
pub const ARP_TARG_HW: usize = 0x20;
pub const ARP_TARG_PROTO: usize = 0x26;

pub const ARP_HW_ETHERNET: u8 = 1;
pub const ARP_OPER_REQUEST: u8 = 1;
pub const ARP_OPER_REPLY: u8 = 2;

pub const IP_LEN_HEADER: usize = 20;

pub const IP_HEADER_LEN: usize = 0x0E;
pub const IP_TOS: usize = 0x0F;
pub const IP_LENGTH_H: usize = 0x10;
pub const IP_LENGTH_L: usize = 0x11;
pub const IP_ID_H: usize = 0x12;
pub const IP_ID_L: usize = 0x13;
pub const IP_FLAGS: usize = 0x14;
pub const IP_FRAGMENT_L: usize = 0x15;
pub const IP_TTL: usize = 0x16;
pub const IP_PROTOCOL: usize = 0x17;
pub const IP_CHECKSUM_H: usize = 0x18;
pub const IP_CHECKSUM_L: usize = 0x19;
pub const IP_SRC: usize = 0x1A;
pub const IP_DST: usize = 0x1E;

pub const IP_PROTO_ICMP: u8 = 0x01;
pub const IP_PROTO_TCP: u8 = 0x06;
pub const IP_PROTO_UDP: u8 = 0x11;

pub const ICMP_LEN_HEADER: usize = 8;

pub const ICMP_TYPE: usize = 0x22;
pub const ICMP_CODE: usize = 0x23;
pub const ICMP_CHECKSUM_H: usize = 0x24;
pub const ICMP_CHECKSUM_L: usize = 0x25;
pub const ICMP_IDENT_H: usize = 0x26;
pub const ICMP_SEQ_H: usize = 0x28;
pub const ICMP_DATA: usize = 0x2A;

pub const ICMP_TYPE_ECHOREPLY: u8 = 0x00;
pub const ICMP_TYPE_ECHOREQUEST: u8 = 0x08;

pub const UDP_LEN_HEADER: usize = 8;

pub const UDP_PORT_SRC_H: usize = 0x22;
pub const UDP_PORT_DST_H: usize = 0x24;
pub const UDP_LENGTH_H: usize = 0x26;
pub const UDP_CHECKSUM_H: usize = 0x28;
pub const UDP_DATA: usize = 0x2A;

pub const TCP_LEN_HEADER: usize = 20;

pub const TCP_PORT_SRC_H: usize = 0x22;
pub const TCP_PORT_DST_H: usize = 0x24;
pub const TCP_SEQ_NR: usize = 0x26;
pub const TCP_ACK_NR: usize = 0x2A;
pub const TCP_DATA_OFFSET: usize = 0x2E;
pub const TCP_FLAGS: usize = 0x2F;
pub const TCP_WINDOW: usize = 0x30;
pub const TCP_CHECKSUM_H: usize = 0x32;
pub const TCP_URGENT_PTR: usize = 0x34;
pub const TCP_OPTIONS: usize = 0x36;
pub const TCP_DATA_NO_OPTS: usize = 0x36;
pub const TCP_DATA_WITH_OPTS: usize = 0x3E;

pub const TCP_FLAG_CWR: u8 = 0b1000_0000;
pub const TCP_FLAG_ECN_ECHO: u8 = 0b0100_0000;
pub const TCP_FLAG_URGENT: u8 = 0b0010_0000;
pub const TCP_FLAG_ACK: u8 = 0b0001_0000;
pub const TCP_FLAG_PUSH: u8 = 0b0000_1000;
pub const TCP_FLAG_RESET: u8 = 0b0000_0100;
pub const TCP_FLAG_SYN: u8 = 0b0000_0010;
pub const TCP_FLAG_FIN: u8 = 0b0000_0001;

pub const DHCP_PORT_SRC: u16 = 67;
pub const DHCP_PORT_DST: u16 = 68;

/// Offset of the option field relative to `UDP_DATA`, see RFC 2131 p. 10.
pub const DHCP_OPTIONS: usize = 240;

pub const DHCP_OPT_SUBNET: u8 = 1;
pub const DHCP_OPT_ROUTER: u8 = 3;
pub const DHCP_OPT_HOSTNAME: u8 = 12;
pub const DHCP_OPT_REQUESTEDIP: u8 = 50;
pub const DHCP_OPT_LEASETIME: u8 = 51;
pub const DHCP_OPT_TYPE: u8 = 53;
pub const DHCP_OPT_SERVERIDENTIFIER: u8 = 54;
pub const DHCP_OPT_PARAMETERREQUEST: u8 = 55;

pub const DHCP_DISCOVER: u8 = 1;
pub const DHCP_OFFER: u8 = 2;
pub const DHCP_REQUEST: u8 = 3;
pub const DHCP_ACK: u8 = 5;

pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

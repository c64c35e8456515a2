//! UDP header templating, send, and the destination-port server dispatch.
//!
//! Grounded in `udp.c`: `udp_prepare`/`udp_send`/`udp_prepare_reply` build
//! and checksum a UDP-over-IPv4 frame in `buffer_out`; `udp_receive` looks
//! the destination port up in a [`PortService`] table and hands the
//! callback the payload slice plus its length.

use crate::buffers::PacketBuffers;
use crate::checksum::{checksum, ChecksumKind};
use crate::port_service::PortService;
use crate::wire::*;

/// A UDP server callback: given the payload of a datagram addressed to a
/// registered port, optionally build a reply into `buffer_out` (typically
/// via [`prepare_reply`] + [`send`]) and return the frame length to
/// transmit.
pub type UdpCallback<const BI: usize, const BO: usize> =
    fn(&mut PacketBuffers<BI, BO>, payload: &[u8]) -> Option<u16>;

/// Template an outgoing UDP-over-IPv4 header, returning the offset in
/// `buffer_out` at which the caller should write the payload.
pub fn prepare<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    src_port: u16,
    dst_ip: &[u8; 4],
    dst_port: u16,
    dst_mac: &[u8; 6],
    my_ip: &[u8; 4],
    my_mac: &[u8; 6],
) -> usize {
    buffers.ip_prepare(IP_PROTO_UDP, dst_ip, dst_mac, my_ip, my_mac);
    write_ports(buffers, src_port, dst_port);
    UDP_DATA
}

/// Template a UDP reply keyed from the frame currently in `buffer_in`:
/// source/destination IP and port swapped, source MAC our own.
pub fn prepare_reply<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
) -> usize {
    let mut requester_ip = [0u8; 4];
    requester_ip.copy_from_slice(&buffers.buffer_in[IP_SRC..IP_SRC + 4]);
    let mut requester_mac = [0u8; 6];
    requester_mac.copy_from_slice(&buffers.buffer_in[ETH_MAC_SRC..ETH_MAC_SRC + 6]);
    let requester_port = u16::from_be_bytes([
        buffers.buffer_in[UDP_PORT_SRC_H],
        buffers.buffer_in[UDP_PORT_SRC_H + 1],
    ]);
    let my_port = u16::from_be_bytes([
        buffers.buffer_in[UDP_PORT_DST_H],
        buffers.buffer_in[UDP_PORT_DST_H + 1],
    ]);

    buffers.ip_prepare(IP_PROTO_UDP, &requester_ip, &requester_mac, my_ip, my_mac);
    write_ports(buffers, my_port, requester_port);
    UDP_DATA
}

fn write_ports<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    src_port: u16,
    dst_port: u16,
) {
    let src = src_port.to_be_bytes();
    let dst = dst_port.to_be_bytes();
    buffers.buffer_out[UDP_PORT_SRC_H] = src[0];
    buffers.buffer_out[UDP_PORT_SRC_H + 1] = src[1];
    buffers.buffer_out[UDP_PORT_DST_H] = dst[0];
    buffers.buffer_out[UDP_PORT_DST_H + 1] = dst[1];
    buffers.buffer_out[UDP_CHECKSUM_H] = 0;
    buffers.buffer_out[UDP_CHECKSUM_H + 1] = 0;
}

/// Finalize a UDP datagram whose `length`-byte payload has already been
/// written at `UDP_DATA`: fill in the IP/UDP length fields, compute both
/// checksums, and return the total Ethernet frame length ready for
/// [`crate::nic::Enc28j60::send`].
pub fn send<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    length: u16,
) -> u16 {
    let ip_total = (IP_LEN_HEADER as u16) + (UDP_LEN_HEADER as u16) + length;
    buffers.buffer_out[IP_LENGTH_H] = (ip_total >> 8) as u8;
    buffers.buffer_out[IP_LENGTH_L] = (ip_total & 0xFF) as u8;

    let udp_total = (UDP_LEN_HEADER as u16) + length;
    buffers.buffer_out[UDP_LENGTH_H] = (udp_total >> 8) as u8;
    buffers.buffer_out[UDP_LENGTH_H + 1] = (udp_total & 0xFF) as u8;

    let ip_sum = checksum(&buffers.buffer_out[IP_HEADER_LEN..IP_HEADER_LEN + IP_LEN_HEADER], ChecksumKind::Ip);
    buffers.buffer_out[IP_CHECKSUM_H] = (ip_sum >> 8) as u8;
    buffers.buffer_out[IP_CHECKSUM_L] = (ip_sum & 0xFF) as u8;

    let pseudo_span_end = UDP_DATA + length as usize;
    let udp_sum = checksum(&buffers.buffer_out[IP_SRC..pseudo_span_end], ChecksumKind::Udp);
    buffers.buffer_out[UDP_CHECKSUM_H] = (udp_sum >> 8) as u8;
    buffers.buffer_out[UDP_CHECKSUM_H + 1] = (udp_sum & 0xFF) as u8;

    (ETH_LEN_HEADER as u16) + (IP_LEN_HEADER as u16) + (UDP_LEN_HEADER as u16) + length
}

/// Dispatch a received UDP-over-IPv4 frame to its registered port
/// callback, if any. Returns the frame length to transmit if the callback
/// built a reply.
pub fn receive<const BI: usize, const BO: usize, const N: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    table: &PortService<u16, UdpCallback<BI, BO>, N>,
) -> Option<u16> {
    let dst_port = u16::from_be_bytes([
        buffers.buffer_in[UDP_PORT_DST_H],
        buffers.buffer_in[UDP_PORT_DST_H + 1],
    ]);
    let callback = table.get(dst_port)?;

    let ip_total = u16::from_be_bytes([buffers.buffer_in[IP_LENGTH_H], buffers.buffer_in[IP_LENGTH_L]]);
    let payload_len = ip_total.saturating_sub(IP_LEN_HEADER as u16 + UDP_LEN_HEADER as u16) as usize;
    let payload_start = UDP_DATA;
    if payload_start + payload_len > buffers.buffer_in.len() || payload_len > crate::config::MTU_IN {
        log::debug!("udp: payload length overruns buffer_in, dropping");
        return None;
    }

    // Copy the payload out before handing `buffers` to the callback as
    // `&mut`: `buffer_in` and `buffer_out` alias the same struct, so the
    // callback (which typically writes a reply into `buffer_out` via
    // `prepare_reply`) can't hold a live borrow into `buffer_in` at the
    // same time.
    let mut payload = [0u8; crate::config::MTU_IN];
    payload[..payload_len].copy_from_slice(&buffers.buffer_in[payload_start..payload_start + payload_len]);
    callback(buffers, &payload[..payload_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_callback<const BI: usize, const BO: usize>(
        buffers: &mut PacketBuffers<BI, BO>,
        payload: &[u8],
    ) -> Option<u16> {
        assert_eq!(payload, b"ping");
        None
    }

    #[test]
    fn prepare_writes_ports_and_zeroes_checksum() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let data_offset = prepare(
            &mut buffers,
            1234,
            &[10, 0, 0, 2],
            53,
            &[0xAA; 6],
            &[10, 0, 0, 7],
            &[0x02, 0, 0, 0, 0, 1],
        );
        assert_eq!(data_offset, UDP_DATA);
        assert_eq!(
            u16::from_be_bytes([buffers.buffer_out[UDP_PORT_SRC_H], buffers.buffer_out[UDP_PORT_SRC_H + 1]]),
            1234
        );
        assert_eq!(
            u16::from_be_bytes([buffers.buffer_out[UDP_PORT_DST_H], buffers.buffer_out[UDP_PORT_DST_H + 1]]),
            53
        );
    }

    #[test]
    fn send_sets_lengths_and_checksums_consistently() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let data_offset = prepare(
            &mut buffers,
            1234,
            &[10, 0, 0, 2],
            53,
            &[0xAA; 6],
            &[10, 0, 0, 7],
            &[0x02, 0, 0, 0, 0, 1],
        );
        let payload = b"ping";
        buffers.buffer_out[data_offset..data_offset + payload.len()].copy_from_slice(payload);
        let total = send(&mut buffers, payload.len() as u16);
        assert_eq!(total as usize, ETH_LEN_HEADER + IP_LEN_HEADER + UDP_LEN_HEADER + payload.len());

        let ip_total = u16::from_be_bytes([buffers.buffer_out[IP_LENGTH_H], buffers.buffer_out[IP_LENGTH_L]]);
        assert_eq!(ip_total as usize, IP_LEN_HEADER + UDP_LEN_HEADER + payload.len());

        let ip_sum = checksum(&buffers.buffer_out[IP_HEADER_LEN..IP_HEADER_LEN + IP_LEN_HEADER], ChecksumKind::Ip);
        assert_eq!(ip_sum, 0);
    }

    #[test]
    fn receive_dispatches_to_registered_callback() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut table: PortService<u16, UdpCallback<128, 128>, 4> = PortService::new();
        table.set(7, test_callback);

        buffers.buffer_in[UDP_PORT_DST_H..UDP_PORT_DST_H + 2].copy_from_slice(&7u16.to_be_bytes());
        let ip_total = (IP_LEN_HEADER + UDP_LEN_HEADER + 4) as u16;
        buffers.buffer_in[IP_LENGTH_H..IP_LENGTH_H + 2].copy_from_slice(&ip_total.to_be_bytes());
        buffers.buffer_in[UDP_DATA..UDP_DATA + 4].copy_from_slice(b"ping");

        assert_eq!(receive(&mut buffers, &table), None);
    }

    #[test]
    fn receive_ignores_unregistered_port() {
        let buffers_table: PortService<u16, UdpCallback<128, 128>, 4> = PortService::new();
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        buffers.buffer_in[UDP_PORT_DST_H..UDP_PORT_DST_H + 2].copy_from_slice(&9999u16.to_be_bytes());
        assert_eq!(receive(&mut buffers, &buffers_table), None);
    }
}

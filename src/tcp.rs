//! TCP responder: outgoing/reply header templating, send, and the
//! single-segment request/reply classification used by the HTTP layer.
//!
//! `tcp_prepare` is grounded directly on `tcp.c`'s function of the same
//! name (sequence `{1,0,0,sequence_nr++}`, data-offset 5, SYN option block
//! appended and data-offset bumped to 7). `tcp.c` stops there — the
//! reply/send/receive half only exists in `tcp.h`'s doc comments and in
//! spec.md §4.7's walk-through of the RST/SYN/FIN/data priority order, so
//! `prepare_reply`/`send`/`receive` are built from that description in
//! the same style as `tcp_prepare`.

use crate::buffers::PacketBuffers;
use crate::checksum::{checksum, ChecksumKind};
use crate::port_service::PortService;
use crate::wire::*;

/// A TCP server callback: given the method/path already parsed by the
/// HTTP layer and the full received frame, append a reply (via
/// [`crate::http`]'s builder, which itself calls [`send`]) and return the
/// frame length transmitted.
pub type TcpCallback<const BI: usize, const BO: usize> =
    fn(&mut PacketBuffers<BI, BO>, payload: &[u8]) -> Option<u16>;

/// What [`receive`] found in the incoming segment's flags.
pub enum TcpAction {
    /// RST: logged, no reply — see spec.md §9's Open Questions.
    Reset,
    /// SYN: a SYN+ACK of `len` bytes has been templated and should be sent.
    SynAck(u16),
    /// FIN: a FIN+ACK of `len` bytes has been templated and should be sent.
    FinAck(u16),
    /// A data segment for `dst_port`; its payload is `payload_len` bytes
    /// starting at [`TCP_DATA_NO_OPTS`](crate::wire::TCP_DATA_NO_OPTS) (or
    /// [`TCP_DATA_WITH_OPTS`](crate::wire::TCP_DATA_WITH_OPTS) if the
    /// incoming segment carried options).
    Data { dst_port: u16, payload_start: usize, payload_len: usize },
}

/// Holds the monotonic sequence-number counter `tcp.c` keeps as a module
/// global (`uint8_t sequence_nr = 1`); owned by [`crate::dispatch::Stack`]
/// and threaded through by `&mut` instead.
pub struct TcpState {
    sequence_nr: u8,
}

impl TcpState {
    pub const fn new() -> Self {
        TcpState { sequence_nr: 1 }
    }

    fn next_sequence_nr(&mut self) -> u8 {
        let n = self.sequence_nr;
        self.sequence_nr = self.sequence_nr.wrapping_add(1);
        n
    }
}

impl Default for TcpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Template a fresh outgoing 20-byte TCP header (28 bytes once the SYN
/// option block is appended), returning the offset in `buffer_out` at
/// which payload data (if any) should be written.
pub fn prepare<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    state: &mut TcpState,
    src_port: u16,
    dst_ip: &[u8; 4],
    dst_port: u16,
    dst_mac: &[u8; 6],
    my_ip: &[u8; 4],
    my_mac: &[u8; 6],
    syn: bool,
) -> usize {
    buffers.ip_prepare(IP_PROTO_TCP, dst_ip, dst_mac, my_ip, my_mac);

    write_ports(buffers, src_port, dst_port);
    buffers.buffer_out[TCP_SEQ_NR] = 1;
    buffers.buffer_out[TCP_SEQ_NR + 1] = 0;
    buffers.buffer_out[TCP_SEQ_NR + 2] = 0;
    buffers.buffer_out[TCP_SEQ_NR + 3] = state.next_sequence_nr();
    buffers.buffer_out[TCP_ACK_NR..TCP_ACK_NR + 4].copy_from_slice(&[0; 4]);
    buffers.buffer_out[TCP_FLAGS] = 0;
    buffers.buffer_out[TCP_WINDOW] = 0;
    buffers.buffer_out[TCP_WINDOW + 1] = 0;
    buffers.buffer_out[TCP_WINDOW + 2] = 0x04;
    buffers.buffer_out[TCP_WINDOW + 3] = 0;
    buffers.buffer_out[TCP_CHECKSUM_H] = 0;
    buffers.buffer_out[TCP_CHECKSUM_H + 1] = 0;
    buffers.buffer_out[TCP_URGENT_PTR] = 0;
    buffers.buffer_out[TCP_URGENT_PTR + 1] = 0;

    if syn {
        buffers.buffer_out[TCP_DATA_OFFSET] = 0x07 << 4;
        write_syn_options(buffers);
        TCP_DATA_WITH_OPTS
    } else {
        buffers.buffer_out[TCP_DATA_OFFSET] = 0x05 << 4;
        TCP_DATA_NO_OPTS
    }
}

fn write_syn_options<const BI: usize, const BO: usize>(buffers: &mut PacketBuffers<BI, BO>) {
    // Maximum segment size: 1024.
    buffers.buffer_out[TCP_OPTIONS] = 0x02;
    buffers.buffer_out[TCP_OPTIONS + 1] = 0x04;
    buffers.buffer_out[TCP_OPTIONS + 2] = 0x04;
    buffers.buffer_out[TCP_OPTIONS + 3] = 0x00;
    // Window scale: 0.
    buffers.buffer_out[TCP_OPTIONS + 4] = 0x03;
    buffers.buffer_out[TCP_OPTIONS + 5] = 0x03;
    buffers.buffer_out[TCP_OPTIONS + 6] = 0x00;
    // End of option list.
    buffers.buffer_out[TCP_OPTIONS + 7] = 0x00;
}

fn write_ports<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    src_port: u16,
    dst_port: u16,
) {
    let src = src_port.to_be_bytes();
    let dst = dst_port.to_be_bytes();
    buffers.buffer_out[TCP_PORT_SRC_H] = src[0];
    buffers.buffer_out[TCP_PORT_SRC_H + 1] = src[1];
    buffers.buffer_out[TCP_PORT_DST_H] = dst[0];
    buffers.buffer_out[TCP_PORT_DST_H + 1] = dst[1];
}

/// Template a reply keyed from the segment currently in `buffer_in`:
/// endpoints swapped, `seq_nr` taken from the incoming `ack_nr` and
/// `ack_nr` taken from the incoming `seq_nr` (the caller bumps the latter
/// before send per spec.md §4.7).
pub fn prepare_reply<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    state: &mut TcpState,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
) -> usize {
    let mut requester_ip = [0u8; 4];
    requester_ip.copy_from_slice(&buffers.buffer_in[IP_SRC..IP_SRC + 4]);
    let mut requester_mac = [0u8; 6];
    requester_mac.copy_from_slice(&buffers.buffer_in[ETH_MAC_SRC..ETH_MAC_SRC + 6]);
    let requester_port = u16::from_be_bytes([
        buffers.buffer_in[TCP_PORT_SRC_H],
        buffers.buffer_in[TCP_PORT_SRC_H + 1],
    ]);
    let my_port = u16::from_be_bytes([
        buffers.buffer_in[TCP_PORT_DST_H],
        buffers.buffer_in[TCP_PORT_DST_H + 1],
    ]);
    let incoming_seq = [
        buffers.buffer_in[TCP_SEQ_NR],
        buffers.buffer_in[TCP_SEQ_NR + 1],
        buffers.buffer_in[TCP_SEQ_NR + 2],
        buffers.buffer_in[TCP_SEQ_NR + 3],
    ];
    let incoming_ack = [
        buffers.buffer_in[TCP_ACK_NR],
        buffers.buffer_in[TCP_ACK_NR + 1],
        buffers.buffer_in[TCP_ACK_NR + 2],
        buffers.buffer_in[TCP_ACK_NR + 3],
    ];

    let data_offset = prepare(
        buffers,
        state,
        my_port,
        &requester_ip,
        requester_port,
        &requester_mac,
        my_ip,
        my_mac,
        false,
    );
    buffers.buffer_out[TCP_SEQ_NR..TCP_SEQ_NR + 4].copy_from_slice(&incoming_ack);
    buffers.buffer_out[TCP_ACK_NR..TCP_ACK_NR + 4].copy_from_slice(&incoming_seq);
    data_offset
}

/// Add `delta` to the big-endian 32-bit acknowledgement number at
/// `TCP_ACK_NR`, carrying leftward. Grounded in `shared.c`'s
/// `add_value_to_buffer`.
pub fn bump_ack<const BI: usize, const BO: usize>(buffers: &mut PacketBuffers<BI, BO>, delta: u16) {
    crate::checksum::add_value_to_buffer(
        delta as u32,
        &mut buffers.buffer_out[TCP_ACK_NR..TCP_ACK_NR + 4],
    );
}

/// Finalize a TCP segment whose `length`-byte payload has already been
/// written at the offset [`prepare`]/[`prepare_reply`] returned: fill in
/// the IP length field, compute both checksums, and return the total
/// Ethernet frame length ready for [`crate::nic::Enc28j60::send`].
pub fn send<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    length: u16,
) -> u16 {
    let data_offset_words = buffers.buffer_out[TCP_DATA_OFFSET] >> 4;
    let tcp_segment_len = (data_offset_words as u16) * 4;

    let ip_total = (IP_LEN_HEADER as u16) + tcp_segment_len + length;
    buffers.buffer_out[IP_LENGTH_H] = (ip_total >> 8) as u8;
    buffers.buffer_out[IP_LENGTH_L] = (ip_total & 0xFF) as u8;

    let ip_sum = checksum(
        &buffers.buffer_out[IP_HEADER_LEN..IP_HEADER_LEN + IP_LEN_HEADER],
        ChecksumKind::Ip,
    );
    buffers.buffer_out[IP_CHECKSUM_H] = (ip_sum >> 8) as u8;
    buffers.buffer_out[IP_CHECKSUM_L] = (ip_sum & 0xFF) as u8;

    buffers.buffer_out[TCP_CHECKSUM_H] = 0;
    buffers.buffer_out[TCP_CHECKSUM_H + 1] = 0;
    let pseudo_span_end = TCP_PORT_SRC_H + tcp_segment_len as usize + length as usize;
    let tcp_sum = checksum(&buffers.buffer_out[IP_SRC..pseudo_span_end], ChecksumKind::Tcp);
    buffers.buffer_out[TCP_CHECKSUM_H] = (tcp_sum >> 8) as u8;
    buffers.buffer_out[TCP_CHECKSUM_H + 1] = (tcp_sum & 0xFF) as u8;

    (ETH_LEN_HEADER as u16) + (IP_LEN_HEADER as u16) + tcp_segment_len + length
}

/// Classify a received TCP-over-IPv4 segment already known to carry
/// `IP_PROTOCOL == IP_PROTO_TCP`, building whatever reply the priority
/// order in spec.md §4.7 calls for directly into `buffer_out`.
pub fn receive<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    state: &mut TcpState,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
) -> TcpAction {
    let flags = buffers.buffer_in[TCP_FLAGS];

    if flags & TCP_FLAG_RESET != 0 {
        log::info!("tcp: reset received, no reply sent");
        return TcpAction::Reset;
    }

    if flags & TCP_FLAG_SYN != 0 {
        let data_offset = prepare_reply(buffers, state, my_mac, my_ip);
        debug_assert_eq!(data_offset, TCP_DATA_NO_OPTS);
        // `prepare_reply` always builds a no-options header; the SYN+ACK
        // needs the option block, so patch the header back to the SYN
        // layout it already wrote once via `prepare`.
        buffers.buffer_out[TCP_DATA_OFFSET] = 0x07 << 4;
        write_syn_options(buffers);
        bump_ack(buffers, 1);
        buffers.buffer_out[TCP_FLAGS] = TCP_FLAG_SYN | TCP_FLAG_ACK;
        return TcpAction::SynAck(send(buffers, 0));
    }

    if flags & TCP_FLAG_FIN != 0 {
        prepare_reply(buffers, state, my_mac, my_ip);
        bump_ack(buffers, 1);
        buffers.buffer_out[TCP_FLAGS] = TCP_FLAG_FIN | TCP_FLAG_ACK;
        return TcpAction::FinAck(send(buffers, 0));
    }

    let data_offset_words = buffers.buffer_in[TCP_DATA_OFFSET] >> 4;
    let header_len = (data_offset_words as usize) * 4;
    let ip_total = u16::from_be_bytes([buffers.buffer_in[IP_LENGTH_H], buffers.buffer_in[IP_LENGTH_L]]);
    let payload_len = (ip_total as usize).saturating_sub(IP_LEN_HEADER + header_len);
    let dst_port = u16::from_be_bytes([
        buffers.buffer_in[TCP_PORT_DST_H],
        buffers.buffer_in[TCP_PORT_DST_H + 1],
    ]);

    TcpAction::Data {
        dst_port,
        payload_start: ETH_LEN_HEADER + IP_LEN_HEADER + header_len,
        payload_len,
    }
}

/// Build the ACK|PUSH|FIN reply template for a data segment, bumping the
/// ack by `payload_len`. The caller's port-service callback then appends
/// its response bytes and calls [`send`].
pub fn prepare_data_reply<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    state: &mut TcpState,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
    payload_len: u16,
) -> usize {
    let data_offset = prepare_reply(buffers, state, my_mac, my_ip);
    bump_ack(buffers, payload_len);
    buffers.buffer_out[TCP_FLAGS] = TCP_FLAG_ACK | TCP_FLAG_PUSH | TCP_FLAG_FIN;
    data_offset
}

/// Dispatch a classified data segment to its registered port callback.
pub fn dispatch<const BI: usize, const BO: usize, const N: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    table: &PortService<u16, TcpCallback<BI, BO>, N>,
    dst_port: u16,
    payload_start: usize,
    payload_len: usize,
) -> Option<u16> {
    let callback = table.get(dst_port)?;
    if payload_start + payload_len > buffers.buffer_in.len() || payload_len > crate::config::MTU_IN {
        log::debug!("tcp: payload length overruns buffer_in, dropping");
        return None;
    }
    let mut payload = [0u8; crate::config::MTU_IN];
    payload[..payload_len].copy_from_slice(&buffers.buffer_in[payload_start..payload_start + payload_len]);
    callback(buffers, &payload[..payload_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_syn_appends_option_block_and_bumps_data_offset() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut state = TcpState::new();
        let offset = prepare(
            &mut buffers,
            &mut state,
            1024,
            &[10, 0, 0, 2],
            80,
            &[0xAA; 6],
            &[10, 0, 0, 7],
            &[0x02, 0, 0, 0, 0, 1],
            true,
        );
        assert_eq!(offset, TCP_DATA_WITH_OPTS);
        assert_eq!(buffers.buffer_out[TCP_DATA_OFFSET] >> 4, 7);
        assert_eq!(buffers.buffer_out[TCP_FLAGS], 0);
        assert_eq!(&buffers.buffer_out[TCP_SEQ_NR..TCP_SEQ_NR + 3], &[1, 0, 0]);
        assert_eq!(buffers.buffer_out[TCP_OPTIONS], 0x02);
        assert_eq!(buffers.buffer_out[TCP_OPTIONS + 4], 0x03);
    }

    #[test]
    fn prepare_non_syn_uses_20_byte_header() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut state = TcpState::new();
        let offset = prepare(
            &mut buffers,
            &mut state,
            1024,
            &[10, 0, 0, 2],
            80,
            &[0xAA; 6],
            &[10, 0, 0, 7],
            &[0x02, 0, 0, 0, 0, 1],
            false,
        );
        assert_eq!(offset, TCP_DATA_NO_OPTS);
        assert_eq!(buffers.buffer_out[TCP_DATA_OFFSET] >> 4, 5);
    }

    fn build_syn(buffers: &mut PacketBuffers<128, 128>, seq: u32) {
        buffers.ip_prepare(IP_PROTO_TCP, &[10, 0, 0, 7], &[0x02, 0, 0, 0, 0, 1], &[10, 0, 0, 9], &[0xAA; 6]);
        buffers.buffer_out[TCP_PORT_SRC_H..TCP_PORT_SRC_H + 2].copy_from_slice(&40000u16.to_be_bytes());
        buffers.buffer_out[TCP_PORT_DST_H..TCP_PORT_DST_H + 2].copy_from_slice(&80u16.to_be_bytes());
        buffers.buffer_out[TCP_SEQ_NR..TCP_SEQ_NR + 4].copy_from_slice(&seq.to_be_bytes());
        buffers.buffer_out[TCP_ACK_NR..TCP_ACK_NR + 4].copy_from_slice(&[0; 4]);
        buffers.buffer_out[TCP_DATA_OFFSET] = 0x05 << 4;
        buffers.buffer_out[TCP_FLAGS] = TCP_FLAG_SYN;
        buffers.buffer_out[TCP_WINDOW..TCP_WINDOW + 4].copy_from_slice(&[0, 0, 0x40, 0]);

        let length = TCP_DATA_NO_OPTS;
        buffers.buffer_in[..length].copy_from_slice(&buffers.buffer_out[..length]);
        buffers.buffer_in_length = length as u16;
    }

    #[test]
    fn syn_yields_syn_ack_with_bumped_ack_and_options() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut state = TcpState::new();
        build_syn(&mut buffers, 0xAABBCCDD);

        match receive(&mut buffers, &mut state, &[0x02, 0, 0, 0, 0, 1], &[10, 0, 0, 7]) {
            TcpAction::SynAck(_) => {}
            _ => panic!("expected a SYN+ACK"),
        }
        assert_eq!(buffers.buffer_out[TCP_FLAGS], TCP_FLAG_SYN | TCP_FLAG_ACK);
        assert_eq!(
            u32::from_be_bytes(buffers.buffer_out[TCP_ACK_NR..TCP_ACK_NR + 4].try_into().unwrap()),
            0xAABBCCDE
        );
        assert_eq!(buffers.buffer_out[TCP_WINDOW + 2], 0x04);
        assert_eq!(buffers.buffer_out[TCP_OPTIONS], 0x02);
    }

    #[test]
    fn reset_is_logged_and_produces_no_reply() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut state = TcpState::new();
        build_syn(&mut buffers, 1);
        buffers.buffer_in[TCP_FLAGS] = TCP_FLAG_RESET;
        assert!(matches!(
            receive(&mut buffers, &mut state, &[0; 6], &[0; 4]),
            TcpAction::Reset
        ));
    }

    #[test]
    fn data_segment_reports_payload_span() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let mut state = TcpState::new();
        build_syn(&mut buffers, 1);
        buffers.buffer_in[TCP_FLAGS] = TCP_FLAG_ACK | TCP_FLAG_PUSH;
        let payload = b"GET / HTTP/1.1\r\n\r\n";
        let ip_total = (IP_LEN_HEADER + TCP_LEN_HEADER + payload.len()) as u16;
        buffers.buffer_in[IP_LENGTH_H..IP_LENGTH_H + 2].copy_from_slice(&ip_total.to_be_bytes());
        buffers.buffer_in[TCP_DATA_NO_OPTS..TCP_DATA_NO_OPTS + payload.len()].copy_from_slice(payload);

        match receive(&mut buffers, &mut state, &[0; 6], &[0; 4]) {
            TcpAction::Data { dst_port, payload_len, .. } => {
                assert_eq!(dst_port, 80);
                assert_eq!(payload_len, payload.len());
            }
            _ => panic!("expected a data segment"),
        }
    }
}

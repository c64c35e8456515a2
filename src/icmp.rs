//! ICMP echo request/reply.
//!
//! Grounded in `icmp.c`'s `icmp_ping_reply`: the whole received frame is
//! mirrored into `buffer_out`, source/destination swapped in the Ethernet
//! and IP headers, the ICMP type flipped from 8 to 0, and the checksum
//! patched in place rather than recomputed — since exactly one byte
//! changed from `0x08` to `0x00`, ones-complement arithmetic lets the
//! existing checksum be bumped by `0x08` with an end-around carry.

use crate::buffers::PacketBuffers;
use crate::wire::*;

/// Whether [`echo_reply`] produced a reply that should be sent.
pub enum IcmpAction {
    NotHandled,
    Reply(u16),
}

/// Inspect a received IPv4/ICMP frame already known to have
/// `IP_PROTOCOL == IP_PROTO_ICMP`. Echo requests (type 8) get answered;
/// every other ICMP type is ignored, matching spec.md §4.4.
pub fn echo_reply<const BI: usize, const BO: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
) -> IcmpAction {
    let length = buffers.buffer_in_length as usize;
    if length == 0 || buffers.received()[ICMP_TYPE] != ICMP_TYPE_ECHOREQUEST {
        return IcmpAction::NotHandled;
    }

    buffers.buffer_out[..length].copy_from_slice(&buffers.buffer_in[..length]);

    let src_mac = {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buffers.buffer_in[ETH_MAC_SRC..ETH_MAC_SRC + 6]);
        mac
    };
    buffers.buffer_out[ETH_MAC_DST..ETH_MAC_DST + 6].copy_from_slice(&src_mac);
    buffers.buffer_out[ETH_MAC_SRC..ETH_MAC_SRC + 6].copy_from_slice(my_mac);

    let src_ip = {
        let mut ip = [0u8; 4];
        ip.copy_from_slice(&buffers.buffer_in[IP_SRC..IP_SRC + 4]);
        ip
    };
    buffers.buffer_out[IP_DST..IP_DST + 4].copy_from_slice(&src_ip);
    buffers.buffer_out[IP_SRC..IP_SRC + 4].copy_from_slice(my_ip);

    buffers.buffer_out[ICMP_TYPE] = ICMP_TYPE_ECHOREPLY;

    let incoming_checksum_h = buffers.buffer_in[ICMP_CHECKSUM_H];
    buffers.buffer_out[ICMP_CHECKSUM_H] = incoming_checksum_h.wrapping_add(0x08);
    if incoming_checksum_h > 0xFF - 0x08 {
        buffers.buffer_out[ICMP_CHECKSUM_L] = buffers.buffer_out[ICMP_CHECKSUM_L].wrapping_add(1);
    }

    IcmpAction::Reply(length as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{checksum, ChecksumKind};

    fn build_echo_request(buffers: &mut PacketBuffers<128, 128>, src_mac: &[u8; 6], src_ip: &[u8; 4]) {
        buffers.ip_prepare(IP_PROTO_ICMP, &[192, 168, 0, 1], &[0xAA; 6], src_ip, src_mac);
        buffers.buffer_out[ICMP_TYPE] = ICMP_TYPE_ECHOREQUEST;
        buffers.buffer_out[ICMP_CODE] = 0;
        buffers.buffer_out[ICMP_CHECKSUM_H] = 0;
        buffers.buffer_out[ICMP_CHECKSUM_L] = 0;
        buffers.buffer_out[ICMP_IDENT_H..ICMP_IDENT_H + 2].copy_from_slice(&[0, 1]);
        buffers.buffer_out[ICMP_SEQ_H..ICMP_SEQ_H + 2].copy_from_slice(&[0, 1]);
        let sum = checksum(&buffers.buffer_out[ICMP_TYPE..ICMP_DATA], ChecksumKind::Ip);
        buffers.buffer_out[ICMP_CHECKSUM_H] = (sum >> 8) as u8;
        buffers.buffer_out[ICMP_CHECKSUM_L] = (sum & 0xFF) as u8;

        let length = ICMP_DATA;
        buffers.buffer_in[..length].copy_from_slice(&buffers.buffer_out[..length]);
        buffers.buffer_in_length = length as u16;
    }

    #[test]
    fn echo_request_becomes_reply_with_swapped_addresses() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let requester_mac = [2, 0, 0, 0, 0, 9];
        let requester_ip = [192, 168, 0, 42];
        build_echo_request(&mut buffers, &requester_mac, &requester_ip);

        let my_mac = [2, 0, 0, 0, 0, 1];
        let my_ip = [192, 168, 0, 1];
        match echo_reply(&mut buffers, &my_mac, &my_ip) {
            IcmpAction::Reply(len) => assert_eq!(len, ICMP_DATA as u16),
            IcmpAction::NotHandled => panic!("expected a reply"),
        }

        assert_eq!(buffers.buffer_out[ICMP_TYPE], ICMP_TYPE_ECHOREPLY);
        assert_eq!(&buffers.buffer_out[ETH_MAC_DST..ETH_MAC_DST + 6], &requester_mac);
        assert_eq!(&buffers.buffer_out[ETH_MAC_SRC..ETH_MAC_SRC + 6], &my_mac);
        assert_eq!(&buffers.buffer_out[IP_DST..IP_DST + 4], &requester_ip);
        assert_eq!(&buffers.buffer_out[IP_SRC..IP_SRC + 4], &my_ip);

        // The checksum patch must match recomputing the checksum from
        // scratch over the (now type-0) ICMP header with the checksum
        // field itself zeroed first.
        let mut rezeroed = [0u8; ICMP_DATA - ICMP_TYPE];
        rezeroed.copy_from_slice(&buffers.buffer_out[ICMP_TYPE..ICMP_DATA]);
        rezeroed[ICMP_CHECKSUM_H - ICMP_TYPE] = 0;
        rezeroed[ICMP_CHECKSUM_L - ICMP_TYPE] = 0;
        let recomputed = checksum(&rezeroed, ChecksumKind::Ip);
        let patched = u16::from_be_bytes([
            buffers.buffer_out[ICMP_CHECKSUM_H],
            buffers.buffer_out[ICMP_CHECKSUM_L],
        ]);
        assert_eq!(recomputed, patched);
    }

    #[test]
    fn non_echo_request_is_ignored() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        buffers.buffer_in[ICMP_TYPE] = 0x0D; // timestamp request, not echo
        buffers.buffer_in_length = ICMP_DATA as u16;
        assert!(matches!(
            echo_reply(&mut buffers, &[0; 6], &[0; 4]),
            IcmpAction::NotHandled
        ));
    }
}

//! The two packet buffers every protocol layer reads and writes in place.
//!
//! The original firmware keeps `buffer_in`/`buffer_out` as module-wide
//! arrays poked by every layer. Here they're fields of one owned
//! [`PacketBuffers`] value threaded by `&mut` through the dispatch stack,
//! which keeps the "exactly one handler touches the buffers at a time"
//! invariant enforced by the borrow checker instead of by convention.

use crate::wire::*;

/// A received Ethernet frame is dropped (and its length reset to zero)
/// whenever a handler decides it has nothing useful to say back.
///
/// `BUF_IN` is `MTU_IN + 1` (the extra byte is the trailing NUL sentinel
/// the NIC driver always writes at `buffer_in[MTU_IN]`); `BUF_OUT` is
/// `MTU_OUT`.
pub struct PacketBuffers<const BUF_IN: usize, const BUF_OUT: usize> {
    /// Holds one received Ethernet frame at offset 0, NUL-padded at the
    /// last byte. Length actually received is tracked separately.
    pub buffer_in: [u8; BUF_IN],
    /// Length of the frame currently held in `buffer_in`; zero means empty.
    pub buffer_in_length: u16,
    /// Working area for the frame currently being built for transmission.
    pub buffer_out: [u8; BUF_OUT],
    /// Running low byte of the IP identification field, bumped on every
    /// `ip_prepare` call.
    id_nr: u8,
}

impl<const BUF_IN: usize, const BUF_OUT: usize> PacketBuffers<BUF_IN, BUF_OUT> {
    pub const fn new() -> Self {
        Self {
            buffer_in: [0; BUF_IN],
            buffer_in_length: 0,
            buffer_out: [0; BUF_OUT],
            id_nr: 0x05,
        }
    }

    /// Drop whatever is currently in `buffer_in`.
    pub fn discard_received(&mut self) {
        self.buffer_in_length = 0;
    }

    pub fn received(&self) -> &[u8] {
        &self.buffer_in[..self.buffer_in_length as usize]
    }

    /// Template an Ethernet + IPv4 header into `buffer_out` for `protocol`,
    /// addressed to `dst_ip`/`dst_mac`, sourced from `my_ip`/`my_mac`.
    ///
    /// Grounded in `shared.c`'s `ip_prepare`: version 4, IHL 5, ToS 0,
    /// length left at zero (the sender fills it in before transmit), a
    /// monotonically incrementing identification low byte, the
    /// Don't-Fragment flag, TTL 64, and the checksum field pre-zeroed.
    pub fn ip_prepare(
        &mut self,
        protocol: u8,
        dst_ip: &[u8; 4],
        dst_mac: &[u8; 6],
        my_ip: &[u8; 4],
        my_mac: &[u8; 6],
    ) {
        self.buffer_out[ETH_MAC_DST..ETH_MAC_DST + 6].copy_from_slice(dst_mac);
        self.buffer_out[ETH_MAC_SRC..ETH_MAC_SRC + 6].copy_from_slice(my_mac);
        self.buffer_out[ETH_TYPE_H] = ETH_TYPE_IP[0];
        self.buffer_out[ETH_TYPE_L] = ETH_TYPE_IP[1];

        self.buffer_out[IP_HEADER_LEN] = 0x45;
        self.buffer_out[IP_TOS] = 0;
        self.buffer_out[IP_LENGTH_H] = 0;
        self.buffer_out[IP_LENGTH_L] = 0;
        self.buffer_out[IP_ID_H] = 0;
        self.buffer_out[IP_ID_L] = self.id_nr;
        self.id_nr = self.id_nr.wrapping_add(1);
        self.buffer_out[IP_FLAGS] = 0x40; // Don't Fragment
        self.buffer_out[IP_FRAGMENT_L] = 0;
        self.buffer_out[IP_TTL] = 64;
        self.buffer_out[IP_PROTOCOL] = protocol;
        self.buffer_out[IP_CHECKSUM_H] = 0;
        self.buffer_out[IP_CHECKSUM_L] = 0;
        self.buffer_out[IP_DST..IP_DST + 4].copy_from_slice(dst_ip);
        self.buffer_out[IP_SRC..IP_SRC + 4].copy_from_slice(my_ip);
    }

    /// Template an ARP packet addressed to `dst_mac`, sender fields filled
    /// with `my_mac`/`my_ip`. Caller fills in `ARP_OPER_*` and the target
    /// fields afterward. Grounded in `arp.c`'s `arp_prepare`.
    pub fn arp_prepare(&mut self, dst_mac: &[u8; 6], my_mac: &[u8; 6], my_ip: &[u8; 4]) {
        self.buffer_out[ETH_MAC_DST..ETH_MAC_DST + 6].copy_from_slice(dst_mac);
        self.buffer_out[ETH_MAC_SRC..ETH_MAC_SRC + 6].copy_from_slice(my_mac);
        self.buffer_out[ETH_TYPE_H] = ETH_TYPE_ARP[0];
        self.buffer_out[ETH_TYPE_L] = ETH_TYPE_ARP[1];

        self.buffer_out[ARP_HARDWARE_H] = 0;
        self.buffer_out[ARP_HARDWARE_L] = ARP_HW_ETHERNET;
        self.buffer_out[ARP_PROTOCOL_H] = ETH_TYPE_IP[0];
        self.buffer_out[ARP_PROTOCOL_L] = ETH_TYPE_IP[1];
        self.buffer_out[ARP_SIZE_HW] = 6;
        self.buffer_out[ARP_SIZE_PROTO] = 4;
        self.buffer_out[ARP_SEND_HW..ARP_SEND_HW + 6].copy_from_slice(my_mac);
        self.buffer_out[ARP_SEND_PROTO..ARP_SEND_PROTO + 4].copy_from_slice(my_ip);
    }
}

impl<const BUF_IN: usize, const BUF_OUT: usize> Default for PacketBuffers<BUF_IN, BUF_OUT> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_prepare_writes_ethernet_and_ip_headers() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let my_mac = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        let my_ip = [10, 0, 0, 7];
        let dst_mac = [0xAA; 6];
        let dst_ip = [10, 0, 0, 2];

        buffers.ip_prepare(IP_PROTO_UDP, &dst_ip, &dst_mac, &my_ip, &my_mac);

        assert_eq!(&buffers.buffer_out[ETH_MAC_DST..ETH_MAC_DST + 6], &dst_mac);
        assert_eq!(&buffers.buffer_out[ETH_MAC_SRC..ETH_MAC_SRC + 6], &my_mac);
        assert_eq!(buffers.buffer_out[ETH_TYPE_H], 0x08);
        assert_eq!(buffers.buffer_out[ETH_TYPE_L], 0x00);
        assert_eq!(buffers.buffer_out[IP_HEADER_LEN], 0x45);
        assert_eq!(buffers.buffer_out[IP_TTL], 64);
        assert_eq!(buffers.buffer_out[IP_FLAGS], 0x40);
        assert_eq!(buffers.buffer_out[IP_PROTOCOL], IP_PROTO_UDP);
        assert_eq!(&buffers.buffer_out[IP_SRC..IP_SRC + 4], &my_ip);
        assert_eq!(&buffers.buffer_out[IP_DST..IP_DST + 4], &dst_ip);
    }

    #[test]
    fn ip_prepare_increments_identification_mod_256() {
        let mut buffers: PacketBuffers<128, 128> = PacketBuffers::new();
        let my_mac = [0u8; 6];
        let my_ip = [0u8; 4];
        let mut last = buffers.id_nr;
        for _ in 0..300 {
            buffers.ip_prepare(IP_PROTO_UDP, &my_ip, &my_mac, &my_ip, &my_mac);
            let current = buffers.buffer_out[IP_ID_L];
            assert_eq!(current, last.wrapping_add(1));
            last = current;
        }
    }
}

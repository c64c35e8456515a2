//! ARP cache and request/reply handling.
//!
//! Grounded in `arp.c`: a fixed-size cache of `{ip, mac}` pairs written
//! round-robin by `cache_index`, a request-for-me responder, and a
//! reply-for-me cache saver that skips entries already present.

use crate::buffers::PacketBuffers;
use crate::wire::*;

#[derive(Clone, Copy, Default)]
struct ArpEntry {
    ip: [u8; 4],
    mac: [u8; 6],
}

/// Outcome of feeding one received frame to [`ArpCache::receive`].
pub enum ArpAction {
    /// Not an ARP frame addressed to us; caller should leave `buffer_in`
    /// alone for another handler.
    NotForUs,
    /// Handled; the frame should be dropped (`buffer_in_length = 0`).
    Consumed,
    /// Handled, and a reply of `len` bytes was templated into `buffer_out`
    /// and should be sent.
    Reply(u16),
}

/// A fixed `N`-entry ARP cache with no eviction by age — full tables stay
/// full until one of their IPs comes up again in a reply.
pub struct ArpCache<const N: usize> {
    entries: [ArpEntry; N],
    cache_index: usize,
    /// Set while `arp_request_mac` is waiting on a reply; cleared by
    /// [`ArpCache::receive`] when a reply arrives for us.
    pub waiting: bool,
}

impl<const N: usize> ArpCache<N> {
    pub const fn new() -> Self {
        ArpCache {
            entries: [ArpEntry {
                ip: [0; 4],
                mac: [0; 6],
            }; N],
            cache_index: 0,
            waiting: false,
        }
    }

    /// Linear scan for an exact IP match. An all-zero `ip` is the empty
    /// sentinel and never matches a real request.
    pub fn lookup(&self, ip: &[u8; 4]) -> Option<[u8; 6]> {
        if *ip == [0; 4] {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.ip == *ip)
            .map(|e| e.mac)
    }

    fn save(&mut self, ip: &[u8; 4], mac: &[u8; 6]) {
        if self.lookup(ip).is_some() {
            return;
        }
        self.entries[self.cache_index] = ArpEntry { ip: *ip, mac: *mac };
        self.cache_index = (self.cache_index + 1) % N;
    }

    /// Handle one received Ethernet frame already known to carry EtherType
    /// `0x0806`. Request-for-me gets answered in place; reply-for-me is
    /// cached and clears `waiting`.
    pub fn receive<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        my_ip: &[u8; 4],
        my_mac: &[u8; 6],
    ) -> ArpAction {
        let frame = buffers.received();
        if frame.len() < ARP_TARG_PROTO + 4 {
            return ArpAction::NotForUs;
        }

        let oper_h = frame[ARP_OPER_H];
        let oper_l = frame[ARP_OPER_L];
        let target_proto = &frame[ARP_TARG_PROTO..ARP_TARG_PROTO + 4];

        if oper_h == 0 && oper_l == ARP_OPER_REQUEST {
            if target_proto != my_ip {
                return ArpAction::NotForUs;
            }

            let mut requester_mac = [0u8; 6];
            requester_mac.copy_from_slice(&buffers.received()[ARP_SEND_HW..ARP_SEND_HW + 6]);
            buffers.arp_prepare(&requester_mac, my_mac, my_ip);
            buffers.buffer_out[ARP_OPER_H] = 0;
            buffers.buffer_out[ARP_OPER_L] = ARP_OPER_REPLY;
            buffers.buffer_out[ARP_TARG_HW..ARP_TARG_HW + 6].copy_from_slice(&requester_mac);
            let mut requester_ip = [0u8; 4];
            requester_ip.copy_from_slice(&buffers.received()[ARP_SEND_PROTO..ARP_SEND_PROTO + 4]);
            buffers.buffer_out[ARP_TARG_PROTO..ARP_TARG_PROTO + 4]
                .copy_from_slice(&requester_ip);
            return ArpAction::Reply(ARP_LEN);
        }

        if oper_h == 0 && oper_l == ARP_OPER_REPLY {
            if target_proto != my_ip {
                return ArpAction::NotForUs;
            }

            let mut sender_ip = [0u8; 4];
            let mut sender_mac = [0u8; 6];
            sender_ip.copy_from_slice(&buffers.received()[ARP_SEND_PROTO..ARP_SEND_PROTO + 4]);
            sender_mac.copy_from_slice(&buffers.received()[ARP_SEND_HW..ARP_SEND_HW + 6]);
            self.save(&sender_ip, &sender_mac);
            self.waiting = false;
            return ArpAction::Consumed;
        }

        ArpAction::NotForUs
    }

    /// Build a broadcast "who-has" request for `ip` into `buffer_out`,
    /// ready to be sent for `ARP_LEN` bytes. The caller is responsible for
    /// the reentrant wait on [`ArpCache::waiting`] (see spec.md §4.3).
    pub fn prepare_request<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        ip: &[u8; 4],
        my_mac: &[u8; 6],
        my_ip: &[u8; 4],
    ) {
        buffers.arp_prepare(&[0xFF; 6], my_mac, my_ip);
        buffers.buffer_out[ARP_OPER_H] = 0;
        buffers.buffer_out[ARP_OPER_L] = ARP_OPER_REQUEST;
        buffers.buffer_out[ARP_TARG_HW..ARP_TARG_HW + 6].copy_from_slice(&[0; 6]);
        buffers.buffer_out[ARP_TARG_PROTO..ARP_TARG_PROTO + 4].copy_from_slice(ip);
        self.waiting = true;
    }
}

impl<const N: usize> Default for ArpCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

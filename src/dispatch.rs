//! The cooperative single-threaded stack tying the NIC, the shared
//! buffers, and every protocol handler together behind one `poll()` call.
//!
//! Grounded in spec.md §5's loop shape (`poll_receive()` → `dhcp_renew()`
//! if compiled → protocol dispatch on the freshly received frame →
//! counters hook) and §4.1 step 9 (subsystem inits, then block on DHCP
//! acquisition before the main loop starts). The surviving C source has
//! no single `network_backbone()` file in the retrieved pack — this is
//! assembled from the per-module `_receive`/`_prepare` functions already
//! grounded in their own files, wired together the way spec.md describes.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use crate::arp::{ArpAction, ArpCache};
use crate::buffers::PacketBuffers;
use crate::counters::{Clock, Counters, Direction, TrafficKind};
use crate::dhcp::{DhcpClient, DhcpEvent};
use crate::error::NicError;
use crate::http::{self, HttpPathCallback};
use crate::icmp::{self, IcmpAction};
use crate::nic::Enc28j60;
use crate::port_service::PortService;
use crate::tcp::{self, TcpAction, TcpCallback, TcpState};
use crate::udp::{self, UdpCallback};
use crate::wire::*;

/// The whole protocol stack: NIC driver, shared buffers, per-protocol
/// state, and the three port/path registries, parameterized the way
/// `PacketBuffers`/`ArpCache`/`PortService` already are over their fixed
/// capacities.
pub struct Stack<
    SPI,
    RST,
    CNT,
    const BUF_IN: usize,
    const BUF_OUT: usize,
    const N_ARP: usize,
    const N_PORTS: usize,
> {
    nic: Enc28j60<SPI, RST>,
    buffers: PacketBuffers<BUF_IN, BUF_OUT>,
    arp: ArpCache<N_ARP>,
    dhcp: DhcpClient,
    tcp_state: TcpState,
    udp_ports: PortService<u16, UdpCallback<BUF_IN, BUF_OUT>, N_PORTS>,
    tcp_ports: PortService<u16, TcpCallback<BUF_IN, BUF_OUT>, N_PORTS>,
    http_paths: PortService<&'static str, HttpPathCallback<BUF_IN, BUF_OUT>, N_PORTS>,
    counters: CNT,
    my_mac: [u8; 6],
    http_port: u16,
    uptime_secs: u32,
}

impl<SPI, RST, CNT, E, const BUF_IN: usize, const BUF_OUT: usize, const N_ARP: usize, const N_PORTS: usize>
    Stack<SPI, RST, CNT, BUF_IN, BUF_OUT, N_ARP, N_PORTS>
where
    SPI: SpiDevice<Error = E>,
    RST: OutputPin,
    CNT: Counters,
{
    pub fn new(spi: SPI, reset: RST, counters: CNT, my_mac: [u8; 6], http_port: u16) -> Self {
        Stack {
            nic: Enc28j60::new(spi, reset),
            buffers: PacketBuffers::new(),
            arp: ArpCache::new(),
            dhcp: DhcpClient::new(),
            tcp_state: TcpState::new(),
            udp_ports: PortService::new(),
            tcp_ports: PortService::new(),
            http_paths: PortService::new(),
            counters,
            my_mac,
            http_port,
            uptime_secs: 0,
        }
    }

    pub fn register_udp_port(&mut self, port: u16, callback: UdpCallback<BUF_IN, BUF_OUT>) {
        self.udp_ports.set(port, callback);
    }

    pub fn register_tcp_port(&mut self, port: u16, callback: TcpCallback<BUF_IN, BUF_OUT>) {
        self.tcp_ports.set(port, callback);
    }

    pub fn register_http_path(&mut self, path: &'static str, callback: HttpPathCallback<BUF_IN, BUF_OUT>) {
        self.http_paths.set(path, callback);
    }

    /// Seconds elapsed since `init()` returned, per [`Clock::on_tick`].
    pub fn uptime_secs(&self) -> u32 {
        self.uptime_secs
    }

    pub fn my_ip(&self) -> [u8; 4] {
        self.dhcp.my_ip
    }

    pub fn is_bound(&self) -> bool {
        self.dhcp.is_bound()
    }

    /// Initialize the NIC, register the HTTP port in the TCP table, then
    /// block running DHCP acquisition until `my_ip` is set. Mirrors
    /// spec.md §4.1 step 9.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), NicError<E>> {
        self.nic.init(&self.my_mac, delay)?;

        // OFFER/ACK arrive as general IP broadcasts before we have an
        // address of our own to be unicast to; admit them, then shut
        // broadcast back off once bound.
        self.nic.broadcast(true)?;

        while !self.dhcp.is_bound() {
            let link_up = self.nic.is_link_up()?;
            let received = self.nic.poll_receive(&mut self.buffers.buffer_in, crate::config::MTU_IN)?;
            self.buffers.buffer_in_length = received;

            match self.dhcp.acquire(&mut self.buffers, &self.my_mac, link_up, received > 0) {
                DhcpEvent::Send(len) => {
                    self.nic.send(&self.buffers.buffer_out, len)?;
                    self.counters.note(TrafficKind::Dhcp, Direction::Tx, len);
                }
                DhcpEvent::Bound => {
                    log::info!("dhcp: bound to {:?}", self.dhcp.my_ip);
                    self.nic.broadcast(false)?;
                }
                DhcpEvent::Nothing => {}
            }
        }

        Ok(())
    }

    /// One iteration of the foreground loop: drain one frame, run the
    /// lease-renewal tick if compiled in, classify and dispatch, then run
    /// the counters hook. Call this forever from `main`.
    pub fn poll(&mut self) -> Result<(), NicError<E>> {
        let received = self.nic.poll_receive(&mut self.buffers.buffer_in, crate::config::MTU_IN)?;
        self.buffers.buffer_in_length = received;
        if received > 0 {
            self.counters.note(TrafficKind::Other, Direction::Rx, received);
        }

        #[cfg(feature = "dhcp-renew")]
        {
            let link_up = self.nic.is_link_up()?;
            if let DhcpEvent::Send(len) =
                self.dhcp.renew(&mut self.buffers, &self.my_mac, link_up, received > 0)
            {
                self.nic.send(&self.buffers.buffer_out, len)?;
                self.counters.note(TrafficKind::Dhcp, Direction::Tx, len);
            }
        }

        if received > 0 {
            self.dispatch()?;
        }

        Ok(())
    }

    /// Non-blocking MAC resolution. Returns the cached MAC immediately on
    /// a hit; otherwise issues a broadcast ARP request (unless one is
    /// already outstanding) and returns `None`. A caller that needs the
    /// answer synchronously should call this from its own `poll()`-driven
    /// loop with whatever budget or timeout fits its use case — the core
    /// itself imposes none, and a request that is never answered leaves
    /// `lookup_mac` returning `None` forever.
    pub fn lookup_mac(&mut self, ip: &[u8; 4]) -> Result<Option<[u8; 6]>, NicError<E>> {
        if let Some(mac) = self.arp.lookup(ip) {
            return Ok(Some(mac));
        }
        if !self.arp.waiting {
            let my_mac = self.my_mac;
            let my_ip = self.my_ip();
            self.arp.prepare_request(&mut self.buffers, ip, &my_mac, &my_ip);
            self.nic.send(&self.buffers.buffer_out, ARP_LEN)?;
            self.counters.note(TrafficKind::Arp, Direction::Tx, ARP_LEN);
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Result<(), NicError<E>> {
        let ethertype = [
            self.buffers.buffer_in[ETH_TYPE_H],
            self.buffers.buffer_in[ETH_TYPE_L],
        ];

        if ethertype == ETH_TYPE_ARP {
            let my_ip = self.my_ip();
            match self.arp.receive(&mut self.buffers, &my_ip, &self.my_mac) {
                ArpAction::Reply(len) => {
                    self.nic.send(&self.buffers.buffer_out, len)?;
                    self.counters.note(TrafficKind::Arp, Direction::Tx, len);
                }
                ArpAction::Consumed | ArpAction::NotForUs => {}
            }
            return Ok(());
        }

        if ethertype != ETH_TYPE_IP {
            return Ok(());
        }

        match self.buffers.buffer_in[IP_PROTOCOL] {
            IP_PROTO_ICMP => {
                let my_ip = self.my_ip();
                if let IcmpAction::Reply(len) = icmp::echo_reply(&mut self.buffers, &self.my_mac, &my_ip) {
                    self.nic.send(&self.buffers.buffer_out, len)?;
                    self.counters.note(TrafficKind::Icmp, Direction::Tx, len);
                }
            }
            IP_PROTO_UDP => {
                if let Some(len) = udp::receive(&mut self.buffers, &self.udp_ports) {
                    self.nic.send(&self.buffers.buffer_out, len)?;
                    self.counters.note(TrafficKind::Udp, Direction::Tx, len);
                }
            }
            IP_PROTO_TCP => self.dispatch_tcp()?,
            _ => {}
        }

        Ok(())
    }

    fn dispatch_tcp(&mut self) -> Result<(), NicError<E>> {
        let my_ip = self.my_ip();
        match tcp::receive(&mut self.buffers, &mut self.tcp_state, &self.my_mac, &my_ip) {
            TcpAction::Reset => {}
            TcpAction::SynAck(len) | TcpAction::FinAck(len) => {
                self.nic.send(&self.buffers.buffer_out, len)?;
                self.counters.note(TrafficKind::Tcp, Direction::Tx, len);
            }
            TcpAction::Data { dst_port, payload_start, payload_len } => {
                let len = if dst_port == self.http_port {
                    self.dispatch_http(payload_start, payload_len)
                } else {
                    tcp::dispatch(&mut self.buffers, &self.tcp_ports, dst_port, payload_start, payload_len)
                };
                if let Some(len) = len {
                    self.nic.send(&self.buffers.buffer_out, len)?;
                    self.counters.note(TrafficKind::Tcp, Direction::Tx, len);
                }
            }
        }
        Ok(())
    }

    fn dispatch_http(&mut self, payload_start: usize, payload_len: usize) -> Option<u16> {
        if payload_start + payload_len > self.buffers.buffer_in.len() || payload_len > crate::config::MTU_IN {
            log::debug!("http: payload length overruns buffer_in, dropping");
            return None;
        }
        let mut request = [0u8; crate::config::MTU_IN];
        request[..payload_len]
            .copy_from_slice(&self.buffers.buffer_in[payload_start..payload_start + payload_len]);
        let my_ip = self.my_ip();
        Some(http::handle_request(
            &mut self.buffers,
            &mut self.tcp_state,
            &self.my_mac,
            &my_ip,
            &request[..payload_len],
            &self.http_paths,
        ))
    }
}

impl<SPI, RST, CNT, E, const BUF_IN: usize, const BUF_OUT: usize, const N_ARP: usize, const N_PORTS: usize>
    Clock for Stack<SPI, RST, CNT, BUF_IN, BUF_OUT, N_ARP, N_PORTS>
where
    SPI: SpiDevice<Error = E>,
    RST: OutputPin,
    CNT: Counters,
{
    /// Call from the tick interrupt handler: bumps the DHCP lease-renewal
    /// seconds counter and the monotonic uptime counter together.
    fn on_tick(&mut self) {
        self.dhcp.on_tick();
        self.uptime_secs = self.uptime_secs.wrapping_add(1);
    }
}

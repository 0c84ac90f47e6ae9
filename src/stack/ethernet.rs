//! Ethernet composer (spec.md §4.4.1): the root of the stack tree. Owns
//! this host's MAC, the gateway's IP/MAC, and a vector of link-typed
//! children — the ARP handler and (at most) one IP composer.
//!
//! The teacher's closest analogue is `NetworkStack::new` in
//! `src_legacy/lib.rs`, which wires one `EthernetTx`/`arp::TableManager`
//! pair per interface; this composer folds that wiring into the same
//! `StackNode`-shaped demux/encapsulate pair every other node in the tree
//! uses, with ARP resolution of the gateway cached once (spec.md §4.4.1;
//! see DESIGN.md, "no subnet mask" for why every outbound frame routes
//! via the gateway rather than resolving each destination IP directly).

use heapless::Vec;
use log::trace;

use crate::addr::MacAddr;
use crate::arp::{self, QueryResult};
use crate::config::InterfaceConfig;
use crate::error::{Error, Result};
use crate::node::NO_IP_HEADER;
use crate::stack::ip::IpComposer;
use crate::time::Instant;
use crate::wire::arp::{ArpPacket, Operation};
use crate::wire::ether_type;
use crate::wire::ethernet::EthernetFrame;
use crate::wire::ipv4::Ipv4Packet;

pub const MAX_LINK_CHILDREN: usize = 2;

pub enum LinkChild {
    Arp(arp::Handler),
    Ip(IpComposer),
}

pub struct EthernetComposer {
    our_mac: MacAddr,
    gateway_addr: core::net::Ipv4Addr,
    gateway_mac: Option<MacAddr>,
    mtu: usize,
    children: Vec<LinkChild, MAX_LINK_CHILDREN>,
}

impl EthernetComposer {
    pub fn new(config: InterfaceConfig) -> EthernetComposer {
        EthernetComposer {
            our_mac: config.our_mac,
            gateway_addr: config.gateway_addr,
            gateway_mac: None,
            mtu: config.mtu,
            children: Vec::new(),
        }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn add_child(&mut self, child: LinkChild) -> Result<()> {
        self.children.push(child).map_err(|_| Error::ShortBuffer)
    }

    pub fn ip_mut(&mut self) -> Option<&mut IpComposer> {
        self.children.iter_mut().find_map(|c| match c {
            LinkChild::Ip(ip) => Some(ip),
            _ => None,
        })
    }

    pub fn arp_mut(&mut self) -> Option<&mut arp::Handler> {
        self.children.iter_mut().find_map(|c| match c {
            LinkChild::Arp(h) => Some(h),
            _ => None,
        })
    }

    /// Validates and demultiplexes one inbound Ethernet frame (spec.md
    /// §4.4.1): drops anything not addressed to us or to broadcast, then
    /// dispatches by EtherType (the VLAN tag, if present, is decoded
    /// transparently and never re-synthesized on the send side).
    pub fn demux(&mut self, carrier: &[u8], off_frame: usize, now: Instant) -> Result<()> {
        let frame = EthernetFrame::new(&carrier[off_frame..])?;
        if !arp::ethernet_accepts(&frame, self.our_mac) {
            trace!("ethernet: frame not addressed to us, dropping");
            return Err(Error::PacketDrop);
        }
        let ethertype = frame.ethertype();
        let header_len = if frame.has_vlan_tag() {
            crate::wire::ethernet::VLAN_HEADER_LEN
        } else {
            crate::wire::ethernet::HEADER_LEN
        };
        let payload_off = off_frame + header_len;

        for child in self.children.iter_mut() {
            match (child, ethertype) {
                (LinkChild::Arp(h), ether_type::ARP) => return h.demux(carrier, payload_off, now),
                (LinkChild::Ip(ip), ether_type::IPV4) => return ip.demux(carrier, payload_off, now),
                _ => continue,
            }
        }
        Err(Error::PacketDrop)
    }

    /// Polls children for one outbound frame (spec.md §4.4.1). ARP gets
    /// first refusal so pending queries/replies make progress even while
    /// IP traffic is queued. IP children are polled unconditionally —
    /// DHCP in particular has to run before any gateway is known — and
    /// the produced datagram's own destination decides addressing:
    /// IPv4 limited-broadcast needs no resolution and always goes out to
    /// the Ethernet broadcast address; anything else needs the gateway
    /// MAC, resolved (and cached) via ARP. A unicast datagram produced
    /// while the gateway is still unresolved is dropped here — the same
    /// as if the wire had dropped it — and relies on the producing
    /// node's own retry/timeout to try again (spec.md §4.6/§4.7 clients
    /// all re-arm on a deadline; see DESIGN.md, "gateway-only routing").
    pub fn encapsulate(&mut self, carrier: &mut [u8], off_frame: usize, now: Instant) -> Result<usize> {
        let body_off = off_frame + crate::wire::ethernet::HEADER_LEN;
        if carrier.len() < body_off {
            return Err(Error::ShortBuffer);
        }

        let mut arp_out: Option<(usize, MacAddr)> = None;
        for child in self.children.iter_mut() {
            if let LinkChild::Arp(h) = child {
                let n = h.encapsulate(carrier, NO_IP_HEADER, body_off, now)?;
                if n > 0 {
                    let dest = {
                        let pkt = ArpPacket::new(&carrier[body_off..body_off + n])?;
                        if pkt.operation() == Operation::Reply {
                            pkt.target_hw_addr()
                        } else {
                            MacAddr::BROADCAST
                        }
                    };
                    arp_out = Some((n, dest));
                }
                break;
            }
        }
        if let Some((n, dest)) = arp_out {
            return self.finish_frame(carrier, off_frame, body_off, n, ether_type::ARP, dest);
        }

        if self.gateway_mac.is_none() {
            self.gateway_mac = self.poll_gateway_resolution(now);
        }

        let mut ip_out: Option<(usize, core::net::Ipv4Addr)> = None;
        for child in self.children.iter_mut() {
            if let LinkChild::Ip(ip) = child {
                let n = ip.encapsulate(carrier, body_off, now)?;
                if n > 0 {
                    let dest = Ipv4Packet::new(&carrier[body_off..body_off + n])?.destination();
                    ip_out = Some((n, dest));
                }
                break;
            }
        }
        if let Some((n, ip_dest)) = ip_out {
            let dest_mac = if ip_dest == core::net::Ipv4Addr::BROADCAST {
                Some(MacAddr::BROADCAST)
            } else {
                self.gateway_mac
            };
            if let Some(dest_mac) = dest_mac {
                return self.finish_frame(carrier, off_frame, body_off, n, ether_type::IPV4, dest_mac);
            }
            trace!("ethernet: ip datagram to {} dropped, gateway unresolved", ip_dest);
        }
        Ok(0)
    }

    fn poll_gateway_resolution(&mut self, now: Instant) -> Option<MacAddr> {
        let gateway_addr = self.gateway_addr;
        let h = self.arp_mut()?;
        match h.query_result(gateway_addr, now) {
            QueryResult::Resolved(mac) => Some(mac),
            QueryResult::Pending => None,
            QueryResult::Timeout => {
                let _ = h.start_query(gateway_addr, now);
                None
            }
        }
    }

    fn finish_frame(
        &self,
        carrier: &mut [u8],
        off_frame: usize,
        body_off: usize,
        n: usize,
        ethertype: u16,
        dest: MacAddr,
    ) -> Result<usize> {
        let total = (body_off - off_frame) + n;
        let mut frame = EthernetFrame::new(&mut carrier[off_frame..off_frame + total])?;
        frame.set_destination(dest);
        frame.set_source(self.our_mac);
        frame.set_ethertype(ethertype);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;
    use crate::node::StackNode;
    use crate::stack::ip::IpChild;
    use crate::wire::icmpv4::{self, IcmpPacket};
    use core::net::Ipv4Addr;

    fn composer() -> EthernetComposer {
        let mac = MacAddr::new(1, 2, 3, 4, 5, 6);
        let our_addr = Ipv4Addr::new(10, 0, 0, 5);
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let mut eth = EthernetComposer::new(InterfaceConfig::new(mac, our_addr, gateway));
        eth.add_child(LinkChild::Arp(arp::Handler::new(HandlerConfig::new(mac, our_addr))))
            .unwrap();
        eth.add_child(LinkChild::Ip(IpComposer::new(our_addr))).unwrap();
        eth
    }

    fn arp_reply_frame(target: MacAddr, sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8, 64> {
        let mut raw = Vec::new();
        raw.resize(crate::wire::ethernet::HEADER_LEN + crate::wire::arp::ETHERNET_IPV4_LEN, 0)
            .unwrap();
        {
            let mut frame = EthernetFrame::new(&mut raw[..]).unwrap();
            frame.set_destination(target);
            frame.set_source(sender_mac);
            frame.set_ethertype(ether_type::ARP);
        }
        {
            let mut pkt = ArpPacket::new(&mut raw[crate::wire::ethernet::HEADER_LEN..]).unwrap();
            pkt.init_ethernet_ipv4(Operation::Reply);
            pkt.set_sender_hw_addr(sender_mac);
            pkt.set_sender_proto_addr(sender_ip);
            pkt.set_target_hw_addr(target);
            pkt.set_target_proto_addr(target_ip);
        }
        raw
    }

    #[test]
    fn frame_not_addressed_to_us_dropped() {
        let mut eth = composer();
        let other = MacAddr::new(9, 9, 9, 9, 9, 9);
        let frame = arp_reply_frame(
            other,
            MacAddr::new(7, 7, 7, 7, 7, 7),
            Ipv4Addr::new(10, 0, 0, 9),
            Ipv4Addr::new(10, 0, 0, 5),
        );
        assert_eq!(eth.demux(&frame, 0, Instant::ZERO), Err(Error::PacketDrop));
    }

    #[test]
    fn gateway_resolution_gates_ip_traffic_then_unblocks() {
        let mut eth = composer();
        eth.ip_mut().unwrap().add_child(IpChild::Icmp(crate::icmp::Handler::new())).unwrap();

        let mut scratch = [0u8; 128];
        assert_eq!(eth.encapsulate(&mut scratch, 0, Instant::ZERO).unwrap(), 0);

        let our_mac = MacAddr::new(1, 2, 3, 4, 5, 6);
        let reply = arp_reply_frame(
            our_mac,
            MacAddr::new(0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 5),
        );
        eth.demux(&reply, 0, Instant::ZERO).unwrap();

        {
            let ip = eth.ip_mut().unwrap();
            let IpChild::Icmp(h) = ip.child_mut(crate::wire::ip_protocol::ICMP).unwrap() else {
                unreachable!()
            };
            let req = build_ping();
            h.demux(&req, 0, Instant::ZERO).unwrap();
        }

        let n = eth.encapsulate(&mut scratch, 0, Instant::ZERO).unwrap();
        assert!(n > 0);
        let frame = EthernetFrame::new(&scratch[..n]).unwrap();
        assert_eq!(frame.destination(), MacAddr::new(0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA));
        assert_eq!(frame.ethertype(), ether_type::IPV4);
    }

    #[test]
    fn broadcast_ip_traffic_flows_before_gateway_resolves() {
        let mut eth = composer();
        {
            let ip = eth.ip_mut().unwrap();
            let mut mux = crate::stack::portmux::PortMux::new();
            mux.register(
                None,
                crate::dhcp::CLIENT_PORT,
                crate::stack::TransportEndpoint::Dhcp(crate::dhcp::Client::new()),
            )
            .unwrap();
            if let Some(crate::stack::TransportEndpoint::Dhcp(c)) = mux.endpoint_mut(crate::dhcp::CLIENT_PORT) {
                c.begin_request(crate::config::RequestConfig::new(MacAddr::new(1, 2, 3, 4, 5, 6)), 0x99, Instant::ZERO)
                    .unwrap();
            }
            ip.add_child(IpChild::Udp(mux)).unwrap();
        }

        let mut scratch = [0u8; 350];
        let n = eth.encapsulate(&mut scratch, 0, Instant::ZERO).unwrap();
        assert!(n > 0, "discover should flow out before any ARP resolution happens");
        let frame = EthernetFrame::new(&scratch[..n]).unwrap();
        assert_eq!(frame.destination(), MacAddr::BROADCAST);
        assert_eq!(frame.ethertype(), ether_type::IPV4);
        let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
        assert_eq!(ip_pkt.destination(), Ipv4Addr::BROADCAST);
    }

    fn build_ping() -> Vec<u8, 64> {
        let mut raw = Vec::new();
        raw.resize(icmpv4::HEADER_LEN, 0).unwrap();
        {
            let mut pkt = IcmpPacket::new(&mut raw[..]).unwrap();
            pkt.set_icmp_type(icmpv4::TYPE_ECHO_REQUEST);
            pkt.set_echo_identifier(1);
            pkt.set_echo_sequence(1);
            pkt.fill_checksum();
        }
        raw
    }
}

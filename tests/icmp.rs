//! Full-stack ICMPv4 echo: one inbound request frame in, one reply frame
//! out, with the gateway pre-resolved so the reply actually reaches the
//! wire instead of queueing behind ARP (see tests/ethernet.rs for that
//! half of the behavior).

use nemesis_stack::addr::MacAddr;
use nemesis_stack::arp;
use nemesis_stack::config::{HandlerConfig, InterfaceConfig};
use nemesis_stack::icmp;
use nemesis_stack::stack::ip::{IpChild, IpComposer};
use nemesis_stack::stack::{LinkChild, Stack};
use nemesis_stack::time::Instant;
use nemesis_stack::wire::arp::{ArpPacket, Operation};
use nemesis_stack::wire::ethernet::EthernetFrame;
use nemesis_stack::wire::icmpv4::{self, IcmpPacket};
use nemesis_stack::wire::ipv4::Ipv4Packet;
use nemesis_stack::wire::{ether_type, ip_protocol};
use std::net::Ipv4Addr;

const OUR_MAC: MacAddr = MacAddr::new(1, 2, 3, 4, 5, 6);
const OUR_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const GATEWAY_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const GATEWAY_MAC: MacAddr = MacAddr::new(0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA);
const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 77);

fn stack_with_gateway_resolved() -> Stack {
    let mut stack = Stack::new(InterfaceConfig::new(OUR_MAC, OUR_ADDR, GATEWAY_ADDR));
    stack
        .ethernet_mut()
        .add_child(LinkChild::Arp(arp::Handler::new(HandlerConfig::new(OUR_MAC, OUR_ADDR))))
        .unwrap();
    let mut ip = IpComposer::new(OUR_ADDR);
    ip.add_child(IpChild::Icmp(icmp::Handler::new())).unwrap();
    stack.ethernet_mut().add_child(LinkChild::Ip(ip)).unwrap();

    let mut reply = vec![0u8; nemesis_stack::wire::ethernet::HEADER_LEN + nemesis_stack::wire::arp::ETHERNET_IPV4_LEN];
    {
        let mut frame = EthernetFrame::new(&mut reply[..]).unwrap();
        frame.set_destination(OUR_MAC);
        frame.set_source(GATEWAY_MAC);
        frame.set_ethertype(ether_type::ARP);
    }
    {
        let mut pkt = ArpPacket::new(&mut reply[nemesis_stack::wire::ethernet::HEADER_LEN..]).unwrap();
        pkt.init_ethernet_ipv4(Operation::Reply);
        pkt.set_sender_hw_addr(GATEWAY_MAC);
        pkt.set_sender_proto_addr(GATEWAY_ADDR);
        pkt.set_target_hw_addr(OUR_MAC);
        pkt.set_target_proto_addr(OUR_ADDR);
    }
    stack.demux(&reply, Instant::ZERO).unwrap();
    stack
}

fn build_echo_request_frame(payload: &[u8]) -> Vec<u8> {
    let eth_len = nemesis_stack::wire::ethernet::HEADER_LEN;
    let ip_len = 20;
    let icmp_len = icmpv4::HEADER_LEN + payload.len();
    let mut raw = vec![0u8; eth_len + ip_len + icmp_len];
    {
        let mut frame = EthernetFrame::new(&mut raw[..]).unwrap();
        frame.set_destination(OUR_MAC);
        frame.set_source(GATEWAY_MAC);
        frame.set_ethertype(ether_type::IPV4);
    }
    {
        let mut icmp_pkt = IcmpPacket::new(&mut raw[eth_len + ip_len..]).unwrap();
        icmp_pkt.set_icmp_type(icmpv4::TYPE_ECHO_REQUEST);
        icmp_pkt.set_echo_identifier(0x55aa);
        icmp_pkt.set_echo_sequence(3);
        icmp_pkt.payload_mut().copy_from_slice(payload);
        icmp_pkt.fill_checksum();
    }
    {
        let mut pkt = Ipv4Packet::new(&mut raw[eth_len..]).unwrap();
        pkt.set_version_and_ihl(5);
        pkt.set_total_length((ip_len + icmp_len) as u16);
        pkt.set_ttl(64);
        pkt.set_protocol(ip_protocol::ICMP);
        pkt.set_source(PEER_ADDR);
        pkt.set_destination(OUR_ADDR);
        pkt.fill_checksum();
    }
    raw
}

#[test]
fn echo_request_produces_matching_reply_out_the_driver() {
    let mut stack = stack_with_gateway_resolved();
    let request = build_echo_request_frame(b"hello stack");
    stack.demux(&request, Instant::ZERO).unwrap();

    let mut out = [0u8; 128];
    let n = stack.encapsulate(&mut out, Instant::ZERO).unwrap();
    assert!(n > 0);

    let frame = EthernetFrame::new(&out[..n]).unwrap();
    assert_eq!(frame.destination(), GATEWAY_MAC);
    assert_eq!(frame.source(), OUR_MAC);

    let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
    assert_eq!(ip_pkt.source(), OUR_ADDR);
    assert_eq!(ip_pkt.destination(), PEER_ADDR);
    assert_eq!(ip_pkt.header_checksum_sum16(), 0);

    let reply = IcmpPacket::new(ip_pkt.payload()).unwrap();
    assert_eq!(reply.icmp_type(), icmpv4::TYPE_ECHO_REPLY);
    assert_eq!(reply.echo_identifier(), 0x55aa);
    assert_eq!(reply.echo_sequence(), 3);
    assert_eq!(reply.payload(), b"hello stack");
    assert_eq!(reply.checksum_sum16(), 0);
}

#[test]
fn second_ping_after_first_reply_drained_also_answered() {
    let mut stack = stack_with_gateway_resolved();
    stack.demux(&build_echo_request_frame(b"one"), Instant::ZERO).unwrap();
    let mut out = [0u8; 128];
    assert!(stack.encapsulate(&mut out, Instant::ZERO).unwrap() > 0);
    assert_eq!(stack.encapsulate(&mut out, Instant::ZERO).unwrap(), 0);

    stack.demux(&build_echo_request_frame(b"two"), Instant::ZERO).unwrap();
    let n = stack.encapsulate(&mut out, Instant::ZERO).unwrap();
    assert!(n > 0);
    let frame = EthernetFrame::new(&out[..n]).unwrap();
    let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
    let reply = IcmpPacket::new(ip_pkt.payload()).unwrap();
    assert_eq!(reply.payload(), b"two");
}

//! Full-stack TCP: a passive-open listener accepts a handshake, receives
//! a data segment, and has its own queued reply delivered — all through
//! `Stack::demux`/`Stack::encapsulate`, with the gateway pre-resolved so
//! outbound segments aren't held up waiting on ARP.

use nemesis_stack::addr::MacAddr;
use nemesis_stack::arp;
use nemesis_stack::config::{ConnConfig, HandlerConfig, InterfaceConfig};
use nemesis_stack::stack::ip::{IpChild, IpComposer};
use nemesis_stack::stack::portmux::{PortMux, TcpConnection};
use nemesis_stack::stack::{LinkChild, Stack, TransportEndpoint};
use nemesis_stack::time::Instant;
use nemesis_stack::crc::Crc791;
use nemesis_stack::wire::arp::{ArpPacket, Operation};
use nemesis_stack::wire::ethernet::EthernetFrame;
use nemesis_stack::wire::ipv4::Ipv4Packet;
use nemesis_stack::wire::pseudo::crc_write_tcp_pseudo;
use nemesis_stack::wire::tcp::{self, TcpPacket};
use nemesis_stack::wire::{ether_type, ip_protocol};
use std::net::Ipv4Addr;

const OUR_MAC: MacAddr = MacAddr::new(1, 2, 3, 4, 5, 7);
const OUR_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const GATEWAY_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const GATEWAY_MAC: MacAddr = MacAddr::new(0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA);
const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 77);
const PEER_PORT: u16 = 4000;
const LISTEN_PORT: u16 = 80;

fn stack_with_listener() -> Stack {
    let mut stack = Stack::new(InterfaceConfig::new(OUR_MAC, OUR_ADDR, GATEWAY_ADDR));
    stack
        .ethernet_mut()
        .add_child(LinkChild::Arp(arp::Handler::new(HandlerConfig::new(OUR_MAC, OUR_ADDR))))
        .unwrap();
    let mut ip = IpComposer::new(OUR_ADDR);
    let mut tcp_mux = PortMux::new();
    let mut conn = TcpConnection::new();
    conn.configure(ConnConfig::new(4)).unwrap();
    conn.open_listen(LISTEN_PORT, 1000).unwrap();
    tcp_mux
        .register(None, LISTEN_PORT, TransportEndpoint::Tcp(conn))
        .unwrap();
    ip.add_child(IpChild::Tcp(tcp_mux)).unwrap();
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

fn build_segment_frame(seq: u32, ack: u32, flags: u8, window: u16, payload: &[u8]) -> Vec<u8> {
    let eth_len = nemesis_stack::wire::ethernet::HEADER_LEN;
    let ip_len = 20;
    let tcp_len = tcp::MIN_HEADER_LEN + payload.len();
    let mut raw = vec![0u8; eth_len + ip_len + tcp_len];
    {
        let mut frame = EthernetFrame::new(&mut raw[..]).unwrap();
        frame.set_destination(OUR_MAC);
        frame.set_source(GATEWAY_MAC);
        frame.set_ethertype(ether_type::IPV4);
    }
    {
        let tcp_off = eth_len + ip_len;
        {
            let mut seg = TcpPacket::new(&mut raw[tcp_off..]).unwrap();
            seg.set_source_port(PEER_PORT);
            seg.set_destination_port(LISTEN_PORT);
            seg.set_sequence(seq);
            seg.set_ack_number(ack);
            seg.set_data_offset(tcp::MIN_HEADER_LEN);
            seg.set_flags(flags);
            seg.set_window(window);
            seg.payload_mut()[..payload.len()].copy_from_slice(payload);
        }
        let mut acc = Crc791::new();
        crc_write_tcp_pseudo(&mut acc, PEER_ADDR, OUR_ADDR, tcp_len as u16);
        TcpPacket::new(&mut raw[tcp_off..]).unwrap().fill_checksum(&acc);
    }
    {
        let mut pkt = Ipv4Packet::new(&mut raw[eth_len..]).unwrap();
        pkt.set_version_and_ihl(5);
        pkt.set_total_length((ip_len + tcp_len) as u16);
        pkt.set_ttl(64);
        pkt.set_protocol(ip_protocol::TCP);
        pkt.set_source(PEER_ADDR);
        pkt.set_destination(OUR_ADDR);
        pkt.fill_checksum();
    }
    raw
}

fn parse_segment(out: &[u8]) -> (u8, u32, u32) {
    let frame = EthernetFrame::new(out).unwrap();
    assert_eq!(frame.destination(), GATEWAY_MAC);
    let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
    assert_eq!(ip_pkt.destination(), PEER_ADDR);
    assert_eq!(ip_pkt.header_checksum_sum16(), 0);
    let seg = TcpPacket::new(ip_pkt.payload()).unwrap();
    assert_eq!(seg.checksum_sum16(&{
        let mut acc = Crc791::new();
        crc_write_tcp_pseudo(&mut acc, OUR_ADDR, PEER_ADDR, ip_pkt.payload().len() as u16);
        acc
    }), 0);
    (seg.flags(), seg.sequence(), seg.ack_number())
}

#[test]
fn passive_handshake_then_data_flows_through_the_driver() {
    let mut stack = stack_with_listener();

    let syn = build_segment_frame(500, 0, tcp::FLAG_SYN, 4096, &[]);
    stack.demux(&syn, Instant::ZERO).unwrap();
    assert_eq!(
        stack.tcp_mut(LISTEN_PORT).unwrap().state(),
        nemesis_stack::tcp::State::SynRcvd
    );

    let mut out = [0u8; 128];
    let n = stack.encapsulate(&mut out, Instant::ZERO).unwrap();
    assert!(n > 0);
    let (flags, seq, ack) = parse_segment(&out[..n]);
    assert_eq!(flags & (tcp::FLAG_SYN | tcp::FLAG_ACK), tcp::FLAG_SYN | tcp::FLAG_ACK);
    assert_eq!(seq, 1000);
    assert_eq!(ack, 501);

    let final_ack = build_segment_frame(501, 1001, tcp::FLAG_ACK, 4096, &[]);
    stack.demux(&final_ack, Instant::ZERO).unwrap();
    assert_eq!(
        stack.tcp_mut(LISTEN_PORT).unwrap().state(),
        nemesis_stack::tcp::State::Established
    );

    let data = build_segment_frame(501, 1001, tcp::FLAG_ACK | tcp::FLAG_PSH, 4096, b"hello");
    stack.demux(&data, Instant::ZERO).unwrap();
    let conn = stack.tcp_mut(LISTEN_PORT).unwrap();
    let mut buf = [0u8; 16];
    let read = conn.read(&mut buf).unwrap();
    assert_eq!(&buf[..read], b"hello");

    conn.write(b"world").unwrap();
    let n2 = stack.encapsulate(&mut out, Instant::ZERO).unwrap();
    assert!(n2 > 0);
    let (flags2, seq2, _) = parse_segment(&out[..n2]);
    assert_eq!(flags2 & tcp::FLAG_ACK, tcp::FLAG_ACK);
    assert_eq!(seq2, 1001);
    let frame = EthernetFrame::new(&out[..n2]).unwrap();
    let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
    let seg = TcpPacket::new(ip_pkt.payload()).unwrap();
    assert_eq!(seg.payload(), b"world");
}

#[test]
fn segment_for_unregistered_port_is_dropped() {
    let mut stack = stack_with_listener();
    let mut wrong_port = build_segment_frame(1, 0, tcp::FLAG_SYN, 4096, &[]);
    {
        let eth_len = nemesis_stack::wire::ethernet::HEADER_LEN;
        let ip_len = 20;
        let tcp_off = eth_len + ip_len;
        {
            let mut seg = TcpPacket::new(&mut wrong_port[tcp_off..]).unwrap();
            seg.set_destination_port(81);
        }
        let mut acc = Crc791::new();
        crc_write_tcp_pseudo(&mut acc, PEER_ADDR, OUR_ADDR, tcp::MIN_HEADER_LEN as u16);
        TcpPacket::new(&mut wrong_port[tcp_off..]).unwrap().fill_checksum(&acc);
    }
    assert_eq!(
        stack.demux(&wrong_port, Instant::ZERO),
        Err(nemesis_stack::Error::PacketDrop)
    );
}

//! Full-stack NTP: one request goes out as a unicast UDP datagram once the
//! gateway is resolved, and a crafted server reply yields a clock offset.

use nemesis_stack::addr::MacAddr;
use nemesis_stack::arp;
use nemesis_stack::config::{HandlerConfig, InterfaceConfig};
use nemesis_stack::ntp;
use nemesis_stack::stack::ip::{IpChild, IpComposer};
use nemesis_stack::stack::portmux::PortMux;
use nemesis_stack::stack::{LinkChild, Stack, TransportEndpoint};
use nemesis_stack::time::Instant;
use nemesis_stack::wire::arp::{ArpPacket, Operation};
use nemesis_stack::wire::ethernet::EthernetFrame;
use nemesis_stack::wire::ipv4::Ipv4Packet;
use nemesis_stack::wire::ntp::{NtpPacket, Timestamp, MODE_SERVER};
use nemesis_stack::wire::udp::UdpPacket;
use nemesis_stack::wire::{ether_type, ip_protocol};
use std::net::Ipv4Addr;

const OUR_MAC: MacAddr = MacAddr::new(1, 2, 3, 4, 5, 8);
const OUR_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const GATEWAY_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const GATEWAY_MAC: MacAddr = MacAddr::new(0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA);
const NTP_SERVER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 123);

fn stack_with_gateway_resolved() -> Stack {
    let mut stack = Stack::new(InterfaceConfig::new(OUR_MAC, OUR_ADDR, GATEWAY_ADDR));
    stack
        .ethernet_mut()
        .add_child(LinkChild::Arp(arp::Handler::new(HandlerConfig::new(OUR_MAC, OUR_ADDR))))
        .unwrap();
    let mut ip = IpComposer::new(OUR_ADDR);
    let mut udp = PortMux::new();
    udp.register(
        Some(NTP_SERVER_ADDR),
        ntp::CLIENT_PORT,
        TransportEndpoint::Ntp(ntp::Client::new()),
    )
    .unwrap();
    ip.add_child(IpChild::Udp(udp)).unwrap();
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

fn server_reply_frame(originate: Timestamp, receive: Timestamp, transmit: Timestamp) -> Vec<u8> {
    let eth_len = nemesis_stack::wire::ethernet::HEADER_LEN;
    let ip_len = 20;
    let udp_len = nemesis_stack::wire::udp::HEADER_LEN + nemesis_stack::wire::ntp::HEADER_LEN;
    let mut raw = vec![0u8; eth_len + ip_len + udp_len];
    {
        let mut frame = EthernetFrame::new(&mut raw[..]).unwrap();
        frame.set_destination(OUR_MAC);
        frame.set_source(GATEWAY_MAC);
        frame.set_ethertype(ether_type::IPV4);
    }
    {
        let udp_off = eth_len + ip_len;
        {
            let body = &mut raw[udp_off + nemesis_stack::wire::udp::HEADER_LEN..];
            let mut pkt = NtpPacket::new(body).unwrap();
            pkt.set_leap_version_mode(0, 4, MODE_SERVER);
            pkt.set_originate_timestamp(originate);
            pkt.set_receive_timestamp(receive);
            pkt.set_transmit_timestamp(transmit);
        }
        let mut udp = UdpPacket::new(&mut raw[udp_off..]).unwrap();
        udp.set_source_port(ntp::SERVER_PORT);
        udp.set_destination_port(ntp::CLIENT_PORT);
        udp.set_length(udp_len as u16);
        udp.set_checksum(0);
    }
    {
        let mut pkt = Ipv4Packet::new(&mut raw[eth_len..]).unwrap();
        pkt.set_version_and_ihl(5);
        pkt.set_total_length((ip_len + udp_len) as u16);
        pkt.set_ttl(64);
        pkt.set_protocol(ip_protocol::UDP);
        pkt.set_source(NTP_SERVER_ADDR);
        pkt.set_destination(OUR_ADDR);
        pkt.fill_checksum();
    }
    raw
}

#[test]
fn request_reply_yields_offset_through_the_driver_loop() {
    let mut stack = stack_with_gateway_resolved();
    stack.ntp_mut().unwrap().begin_request(Instant::ZERO);

    let mut out = [0u8; 128];
    let n = stack.encapsulate(&mut out, Instant::ZERO).unwrap();
    assert!(n > 0);
    let frame = EthernetFrame::new(&out[..n]).unwrap();
    assert_eq!(frame.destination(), GATEWAY_MAC);
    let ip_pkt = Ipv4Packet::new(frame.payload()).unwrap();
    assert_eq!(ip_pkt.destination(), NTP_SERVER_ADDR);
    let udp = UdpPacket::new(ip_pkt.payload()).unwrap();
    let sent = NtpPacket::new(udp.payload()).unwrap();
    let t1 = sent.transmit_timestamp();

    let t2 = Timestamp::from_micros(t1.as_micros() + 1000);
    let t3 = Timestamp::from_micros(t2.as_micros() + 500);
    let reply = server_reply_frame(t1, t2, t3);
    let now = Instant::from_micros(t1.as_micros() + 2000);
    stack.demux(&reply, now).unwrap();

    let client = stack.ntp_mut().unwrap();
    assert_eq!(client.state(), ntp::State::Complete);
    assert!(client.offset_micros().is_some());
    assert!(client.round_trip_delay_micros().unwrap() >= 0);
}

#[test]
fn reply_with_stale_originate_timestamp_is_dropped() {
    let mut stack = stack_with_gateway_resolved();
    stack.ntp_mut().unwrap().begin_request(Instant::ZERO);
    let mut out = [0u8; 128];
    stack.encapsulate(&mut out, Instant::ZERO).unwrap();

    let reply = server_reply_frame(Timestamp::from_micros(1), Timestamp::ZERO, Timestamp::ZERO);
    assert_eq!(
        stack.demux(&reply, Instant::ZERO),
        Err(nemesis_stack::Error::PacketDrop)
    );
    assert_eq!(stack.ntp_mut().unwrap().state(), ntp::State::Sent);
}

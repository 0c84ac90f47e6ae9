//! IP pseudo-header folding for transport checksums (RFC 793 §3.1, RFC
//! 768, RFC 2460 §8.1).

use core::net::{Ipv4Addr, Ipv6Addr};

use crate::crc::Crc791;
use crate::wire::ip_protocol;

/// Folds the IPv4 pseudo-header (source, destination, zero, protocol,
/// transport length) into `acc`, ready for the caller to `write` the
/// transport segment on top.
pub fn crc_write_ipv4_pseudo(
    acc: &mut Crc791,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    transport_len: u16,
) {
    acc.write(&src.octets());
    acc.write(&dst.octets());
    acc.write(&[0u8, protocol]);
    acc.write(&transport_len.to_be_bytes());
}

/// Folds the IPv6 pseudo-header into `acc`.
pub fn crc_write_ipv6_pseudo(
    acc: &mut Crc791,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    protocol: u8,
    transport_len: u32,
) {
    acc.write(&src.octets());
    acc.write(&dst.octets());
    acc.write(&transport_len.to_be_bytes());
    acc.write(&[0, 0, 0, protocol]);
}

pub fn crc_write_tcp_pseudo(acc: &mut Crc791, src: Ipv4Addr, dst: Ipv4Addr, tcp_len: u16) {
    crc_write_ipv4_pseudo(acc, src, dst, ip_protocol::TCP, tcp_len);
}

pub fn crc_write_udp_pseudo(acc: &mut Crc791, src: Ipv4Addr, dst: Ipv4Addr, udp_len: u16) {
    crc_write_ipv4_pseudo(acc, src, dst, ip_protocol::UDP, udp_len);
}

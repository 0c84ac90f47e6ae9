//! A heapless, userspace TCP/IP stack for hosts with no OS network
//! stack of their own: Ethernet/ARP/IPv4 at the bottom, UDP/TCP port
//! multiplexing above that, and DHCP/DNS/NTP clients plus a raw TCP
//! connection type as the leaves (spec.md §2, §4).
//!
//! The teacher this grew from (`rips`, see `src_legacy/`) is a `std` +
//! `pnet` stack built around an `Arc<Mutex<_>>`-shared `NetworkStack`
//! and OS-backed raw sockets. This crate keeps the teacher's layering —
//! one composer per layer, `Tx`/`Rx`-shaped read/write halves, `log`
//! for diagnostics — but drops `std`, `pnet`, and threads entirely: the
//! whole tree runs off one buffer in (`Stack::demux`), one buffer out
//! (`Stack::encapsulate`), driven by a caller-owned loop around
//! whatever raw-frame I/O that caller has (a NIC driver, a tun/tap fd,
//! a test harness). Nothing here spawns a thread, blocks, or touches
//! the heap.
//!
//! `node::StackNode` is the contract every layer implements; `stack`
//! assembles the concrete composer tree; `coordinator` wraps the
//! leaf clients (DHCP/ARP/DNS/NTP) in retry budgets for callers that
//! want a single `step`-until-`Done` call instead of watching client
//! state by hand.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod arp;
pub mod config;
pub mod coordinator;
pub mod crc;
pub mod dhcp;
pub mod dns;
pub mod error;
pub mod icmp;
pub mod node;
pub mod ntp;
pub mod ring;
pub mod rng;
pub mod stack;
pub mod tcp;
pub mod time;
pub mod validate;
pub mod wire;

pub use addr::MacAddr;
pub use error::{Error, Result};
pub use node::StackNode;
pub use stack::Stack;
pub use time::Instant;

//! Coordinator (spec.md §4.9): retry wrappers around the DHCP/ARP/DNS/NTP
//! clients. spec.md phrases these as an "async coordinator", but per §5
//! this core has no suspension points and no executor to suspend into —
//! `encapsulate`/`demux` never block, so a real `do_dhcp(..).await` has
//! nowhere to yield to. Each task here is instead a small state machine
//! whose `step` is meant to be called once per driver poll, exactly like
//! every other node's `encapsulate`; "sleeping between polls" (§5) is the
//! caller's poll loop, outside this crate.
//!
//! Grounded in the ARP handler's own single-in-flight-plus-deadline shape
//! (`arp::Handler`), generalized here to wrap a whole retry budget across
//! *cycles* of an inner client that already retries within one cycle.

use core::net::Ipv4Addr;

use crate::addr::MacAddr;
use crate::arp::QueryResult;
use crate::config::{RequestConfig, ResolveConfig};
use crate::dhcp;
use crate::dns;
use crate::error::{Error, Result};
use crate::ntp;
use crate::rng::Rng;
use crate::stack::Stack;
use crate::time::Instant;

/// Outcome of one `step` call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TaskState {
    Pending,
    Done,
    Failed,
}

/// Drives `dhcp::Client` through repeated DISCOVER/REQUEST cycles
/// (spec.md §4.9 `do_dhcp(requested, timeout, retries)`). The client
/// itself retries within one cycle; this task restarts the cycle with a
/// fresh transaction id, drawn from `seed` (spec.md §5: "randomness for
/// xid/ISS is injected by the configuration seed"), when the client
/// gives up or is NAK'd, up to `retries` cycles.
pub struct DhcpTask {
    config: RequestConfig,
    rng: Rng,
    retries_left: u8,
}

impl DhcpTask {
    pub fn begin(stack: &mut Stack, config: RequestConfig, seed: u64, retries: u8, now: Instant) -> Result<DhcpTask> {
        let mut rng = Rng::new(seed);
        let xid = rng.next_u32();
        let client = stack.dhcp_mut().ok_or(Error::NotConfigured)?;
        client.begin_request(config.clone(), xid, now)?;
        Ok(DhcpTask {
            config,
            rng,
            retries_left: retries,
        })
    }

    pub fn step(&mut self, stack: &mut Stack, now: Instant) -> TaskState {
        let Some(client) = stack.dhcp_mut() else {
            return TaskState::Failed;
        };
        match client.state() {
            dhcp::State::Bound => TaskState::Done,
            dhcp::State::Init | dhcp::State::Nak => {
                if self.retries_left == 0 {
                    return TaskState::Failed;
                }
                self.retries_left -= 1;
                let xid = self.rng.next_u32();
                if client.begin_request(self.config.clone(), xid, now).is_err() {
                    return TaskState::Failed;
                }
                TaskState::Pending
            }
            dhcp::State::Selecting | dhcp::State::Requesting => TaskState::Pending,
        }
    }
}

/// Drives `arp::Handler` to resolve one address, re-issuing the query on
/// each of the handler's own timeouts (spec.md §4.9
/// `do_resolve_hw_addr(ip, timeout, retries)`; the per-query timeout
/// itself is the handler's fixed one-second deadline, since `HandlerConfig`
/// carries no per-query override — `retries` bounds how many times this
/// task re-arms it).
pub struct ArpResolveTask {
    target: Ipv4Addr,
    retries_left: u8,
    resolved: Option<MacAddr>,
}

impl ArpResolveTask {
    pub fn begin(stack: &mut Stack, target: Ipv4Addr, retries: u8, now: Instant) -> Result<ArpResolveTask> {
        let handler = stack.arp_mut().ok_or(Error::NotConfigured)?;
        handler.start_query(target, now)?;
        Ok(ArpResolveTask {
            target,
            retries_left: retries,
            resolved: None,
        })
    }

    pub fn step(&mut self, stack: &mut Stack, now: Instant) -> TaskState {
        let Some(handler) = stack.arp_mut() else {
            return TaskState::Failed;
        };
        match handler.query_result(self.target, now) {
            QueryResult::Resolved(mac) => {
                self.resolved = Some(mac);
                TaskState::Done
            }
            QueryResult::Pending => TaskState::Pending,
            QueryResult::Timeout => {
                if self.retries_left == 0 {
                    return TaskState::Failed;
                }
                self.retries_left -= 1;
                if handler.start_query(self.target, now).is_err() {
                    return TaskState::Failed;
                }
                TaskState::Pending
            }
        }
    }

    pub fn resolved(&self) -> Option<MacAddr> {
        self.resolved
    }
}

/// Drives `dns::Client` through repeated resolve attempts (spec.md §4.9
/// `do_lookup_ip(host, timeout, retries)`), re-issuing with a fresh
/// query id on each of the client's own timeouts.
pub struct DnsLookupTask<'a> {
    config: ResolveConfig<'a>,
    rng: Rng,
    retries_left: u8,
}

impl<'a> DnsLookupTask<'a> {
    pub fn begin(stack: &mut Stack, config: ResolveConfig<'a>, seed: u64, retries: u8, now: Instant) -> Result<DnsLookupTask<'a>> {
        let mut rng = Rng::new(seed);
        let id = rng.next_u16();
        let client = stack.dns_mut().ok_or(Error::NotConfigured)?;
        client.start_resolve(config.clone(), id, now)?;
        Ok(DnsLookupTask {
            config,
            rng,
            retries_left: retries,
        })
    }

    pub fn step(&mut self, stack: &mut Stack, now: Instant) -> TaskState {
        let Some(client) = stack.dns_mut() else {
            return TaskState::Failed;
        };
        match client.state() {
            dns::State::Answered => TaskState::Done,
            dns::State::Failed => {
                if self.retries_left == 0 {
                    return TaskState::Failed;
                }
                self.retries_left -= 1;
                let id = self.rng.next_u16();
                if client.start_resolve(self.config.clone(), id, now).is_err() {
                    return TaskState::Failed;
                }
                TaskState::Pending
            }
            dns::State::Idle | dns::State::Sent => TaskState::Pending,
        }
    }
}

/// Drives `ntp::Client` through repeated exchanges (spec.md §4.9
/// `do_ntp(server, timeout, retries)`; `server` addressing is handled by
/// the caller's registration of the client under a pinned remote address,
/// this task only re-arms the exchange).
pub struct NtpTask {
    retries_left: u8,
}

impl NtpTask {
    pub fn begin(stack: &mut Stack, retries: u8, now: Instant) -> Result<NtpTask> {
        let client = stack.ntp_mut().ok_or(Error::NotConfigured)?;
        client.begin_request(now);
        Ok(NtpTask { retries_left: retries })
    }

    pub fn step(&mut self, stack: &mut Stack, now: Instant) -> TaskState {
        let Some(client) = stack.ntp_mut() else {
            return TaskState::Failed;
        };
        match client.state() {
            ntp::State::Complete => TaskState::Done,
            ntp::State::Failed => {
                if self.retries_left == 0 {
                    return TaskState::Failed;
                }
                self.retries_left -= 1;
                client.begin_request(now);
                TaskState::Pending
            }
            ntp::State::Idle | ntp::State::Sent => TaskState::Pending,
        }
    }
}

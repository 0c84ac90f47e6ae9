//! DNS client (spec.md §2.6, §4.7): a single in-flight question, resolved
//! over UDP port 53, built on `wire::dns`.
//!
//! Single-question-at-a-time mirrors the ARP handler's one-table-entry
//! shape in `arp::Handler` rather than the teacher's own code (it never
//! had a DNS client); `message_copy_to` — handing the caller the raw
//! decoded answer set instead of this crate owning address-list storage
//! — follows the same "caller supplies the buffer" pattern as
//! `tcp::Connection::read`.

use heapless::Vec;
use log::{debug, warn};

use crate::config::ResolveConfig;
use crate::error::{Error, Result};
use crate::node::{ConnectionId, StackNode};
use crate::time::Instant;
use crate::wire::dns::{self, DnsMessage, Rcode, MAX_NAME_LEN};
use crate::wire::udp::UdpPacket;

pub const CLIENT_PORT: u16 = 53500;
pub const SERVER_PORT: u16 = 53;

const TIMEOUT: core::time::Duration = core::time::Duration::from_secs(2);
const MAX_RETRIES: u8 = 3;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum State {
    Idle,
    Sent,
    Answered,
    Failed,
}

/// One decoded answer record: the owning question index, the record
/// type, and its rdata (4 bytes for an A record, 16 for AAAA).
#[derive(Copy, Clone, Debug)]
pub struct Answer {
    pub question_index: u8,
    pub rtype: u16,
    pub ttl: u32,
    pub rdata: [u8; 16],
    pub rdata_len: u8,
}

pub const MAX_ANSWERS: usize = 8;

pub struct Client {
    state: State,
    id: u16,
    question_names: Vec<Vec<u8, MAX_NAME_LEN>, { crate::config::MAX_QUESTIONS }>,
    question_types: Vec<u16, { crate::config::MAX_QUESTIONS }>,
    enable_recursion: bool,
    deadline: Option<Instant>,
    retries: u8,
    rcode: Rcode,
    answers: Vec<Answer, MAX_ANSWERS>,
    connection_id: ConnectionId,
}

impl Client {
    pub fn new() -> Client {
        Client {
            state: State::Idle,
            id: 0,
            question_names: Vec::new(),
            question_types: Vec::new(),
            enable_recursion: true,
            deadline: None,
            retries: 0,
            rcode: Rcode::NoError,
            answers: Vec::new(),
            connection_id: 0,
        }
    }

    pub fn start_resolve(&mut self, config: ResolveConfig, id: u16, now: Instant) -> Result<()> {
        self.question_names.clear();
        self.question_types.clear();
        for q in config.questions.iter() {
            let mut name: Vec<u8, MAX_NAME_LEN> = Vec::new();
            name.extend_from_slice(q.name.as_bytes())
                .map_err(|_| Error::InvalidField)?;
            self.question_names.push(name).map_err(|_| Error::InvalidField)?;
            self.question_types
                .push(q.qtype)
                .map_err(|_| Error::InvalidField)?;
        }
        self.enable_recursion = config.enable_recursion;
        self.id = id;
        self.retries = 0;
        self.answers.clear();
        self.state = State::Sent;
        self.deadline = Some(now + TIMEOUT);
        debug!("dns: id={:04x} resolving {} question(s)", id, self.question_names.len());
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn rcode(&self) -> Rcode {
        self.rcode
    }

    /// Copies decoded answers into `dst`, returning how many were
    /// written (spec.md §4.7's caller-owned-buffer pattern).
    pub fn message_copy_to(&self, dst: &mut [Answer]) -> usize {
        let n = self.answers.len().min(dst.len());
        dst[..n].copy_from_slice(&self.answers[..n]);
        n
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl StackNode for Client {
    fn encapsulate(
        &mut self,
        carrier: &mut [u8],
        _off_ip: isize,
        off_frame: usize,
        now: Instant,
    ) -> Result<usize> {
        if self.state != State::Sent {
            return Ok(0);
        }
        if let Some(deadline) = self.deadline {
            if now < deadline {
                return Ok(0); // query already in flight this round
            }
        }
        if self.retries >= MAX_RETRIES {
            warn!("dns: id={:04x} timed out", self.id);
            self.state = State::Failed;
            self.deadline = None;
            return Ok(0);
        }
        self.retries += 1;
        self.deadline = Some(now + TIMEOUT);

        let body_budget = carrier.len().saturating_sub(off_frame + crate::wire::udp::HEADER_LEN);
        if body_budget < dns::HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        let body_start = off_frame + crate::wire::udp::HEADER_LEN;
        let mut offset;
        {
            let mut msg = DnsMessage::new(&mut carrier[body_start..])?;
            msg.set_id(self.id);
            msg.set_query_flags(self.enable_recursion);
            msg.set_question_count(self.question_names.len() as u16);
            offset = dns::HEADER_LEN;
            for (name, qtype) in self.question_names.iter().zip(self.question_types.iter()) {
                let name_str = core::str::from_utf8(name).map_err(|_| Error::InvalidField)?;
                offset = msg.write_question(offset, name_str, *qtype)?;
            }
        }
        let total = crate::wire::udp::HEADER_LEN + offset;
        {
            let mut udp = UdpPacket::new(&mut carrier[off_frame..off_frame + total])?;
            udp.set_source_port(CLIENT_PORT);
            udp.set_destination_port(SERVER_PORT);
            udp.set_length(total as u16);
            udp.set_checksum(0);
        }
        Ok(total)
    }

    fn demux(&mut self, carrier: &[u8], off_frame: usize, _now: Instant) -> Result<()> {
        let udp = UdpPacket::new(&carrier[off_frame..])?;
        if udp.destination_port() != CLIENT_PORT {
            return Err(Error::PacketDrop);
        }
        let body = udp.payload();
        let msg = DnsMessage::new(body)?;
        if msg.id() != self.id || !msg.is_response() {
            return Err(Error::PacketDrop);
        }
        if self.state != State::Sent {
            return Err(Error::PacketDrop);
        }

        self.rcode = msg.rcode();
        if self.rcode != Rcode::NoError {
            self.state = State::Failed;
            self.deadline = None;
            return Ok(());
        }

        let mut offset = dns::HEADER_LEN;
        let mut scratch: Vec<u8, MAX_NAME_LEN> = Vec::new();
        for _ in 0..msg.question_count() {
            scratch.clear();
            let consumed = msg.decode_name(offset, &mut scratch)?;
            offset += consumed + 4; // qtype + qclass
        }

        self.answers.clear();
        for i in 0..msg.answer_count() {
            scratch.clear();
            let name_consumed = msg.decode_name(offset, &mut scratch)?;
            offset += name_consumed;
            let (rtype, _rclass, ttl, rdata, next_offset) = msg.read_record_fixed(offset)?;
            offset = next_offset;
            if self.answers.is_full() {
                break;
            }
            let mut rdata_buf = [0u8; 16];
            let copy_len = rdata.len().min(rdata_buf.len());
            rdata_buf[..copy_len].copy_from_slice(&rdata[..copy_len]);
            let _ = self.answers.push(Answer {
                question_index: (i % 256) as u8,
                rtype,
                ttl,
                rdata: rdata_buf,
                rdata_len: copy_len as u8,
            });
        }

        self.state = State::Answered;
        self.deadline = None;
        debug!("dns: id={:04x} answered ({} records)", self.id, self.answers.len());
        Ok(())
    }

    fn local_port(&self) -> u16 {
        CLIENT_PORT
    }

    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

//! Captive DNS responder.
//!
//! Answers every A query with the access point address so connectivity
//! checks land on the setup portal. Other query types get an empty answer.

use log::{debug, info, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;
const ANSWER_TTL: u32 = 60;

/// Build a response for a raw DNS query, or `None` if it is not a
/// well-formed standard query.
pub fn build_response(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let flags = u16::from_be_bytes([query[2], query[3]]);
    let is_response = flags & 0x8000 != 0;
    let opcode = (flags >> 11) & 0x0f;
    let questions = u16::from_be_bytes([query[4], query[5]]);
    if is_response || opcode != 0 || questions == 0 {
        return None;
    }

    // First question only: labels, then type and class
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        if len > 63 {
            return None;
        }
        pos += len;
    }
    let qtype = u16::from_be_bytes([*query.get(pos)?, *query.get(pos + 1)?]);
    let qclass = u16::from_be_bytes([*query.get(pos + 2)?, *query.get(pos + 3)?]);
    let question_end = pos + 4;

    let answer = (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN;

    let mut response = Vec::with_capacity(question_end + 16);
    response.extend_from_slice(&query[0..2]);
    // QR, authoritative, recursion desired copied from the query, recursion available
    let rd = flags & 0x0100;
    response.extend_from_slice(&(0x8480 | rd).to_be_bytes());
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&u16::from(answer).to_be_bytes());
    response.extend_from_slice(&[0, 0, 0, 0]);
    response.extend_from_slice(&query[HEADER_LEN..question_end]);

    if answer {
        response.extend_from_slice(&[0xc0, HEADER_LEN as u8]);
        response.extend_from_slice(&TYPE_A.to_be_bytes());
        response.extend_from_slice(&CLASS_IN.to_be_bytes());
        response.extend_from_slice(&ANSWER_TTL.to_be_bytes());
        response.extend_from_slice(&4u16.to_be_bytes());
        response.extend_from_slice(&ip.octets());
    }
    Some(response)
}

/// Running responder. Dropping it stops the thread.
pub struct CaptiveDns {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl CaptiveDns {
    /// Bind `bind` and answer with `ip` until stopped.
    pub fn start(bind: SocketAddr, ip: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;
        let local_addr = socket.local_addr()?;
        info!("Captive DNS on {} answering {}", local_addr, ip);

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let thread = thread::Builder::new()
            .name("captive-dns".into())
            .spawn(move || serve(&socket, ip, &flag))?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CaptiveDns {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(socket: &UdpSocket, ip: Ipv4Addr, shutdown: &AtomicBool) {
    let mut buf = [0u8; 512];
    while !shutdown.load(Ordering::Acquire) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => {
                warn!("Captive DNS receive failed: {}", e);
                continue;
            }
        };

        match build_response(&buf[..len], ip) {
            Some(response) => {
                if let Err(e) = socket.send_to(&response, peer) {
                    debug!("Captive DNS reply to {} failed: {}", peer, e);
                }
            }
            None => debug!("Ignoring malformed DNS packet from {}", peer),
        }
    }
    debug!("Captive DNS stopped");
}

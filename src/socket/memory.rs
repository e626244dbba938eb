//! In-memory [`PacketSocket`] for exercising the filter and the discovery
//! lifecycle without touching the network.

use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
    sync::{Condvar, Mutex, MutexGuard},
    time::Instant,
};

use super::PacketSocket;

type Responder = dyn Fn(&[u8], SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> + Send + Sync;

#[derive(Default)]
struct State {
    inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    deadline: Option<Instant>,
    deadline_history: Vec<Option<Instant>>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
}

/// Every `send_to` is handed to the responder; whatever it returns is queued
/// as inbound datagrams `(payload, sender)`.
pub struct MemorySocket {
    state: Mutex<State>,
    ready: Condvar,
    responder: Box<Responder>,
}

impl MemorySocket {
    pub fn new(
        responder: impl Fn(&[u8], SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
            responder: Box::new(responder),
        }
    }

    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn deliver(&self, payload: &[u8], from: SocketAddr) {
        self.lock().inbox.push_back((payload.to_vec(), from));
        self.ready.notify_all();
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.lock().deadline
    }

    /// Every value passed to `set_read_deadline`, in order.
    pub fn deadline_history(&self) -> Vec<Option<Instant>> {
        self.lock().deadline_history.clone()
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.lock().sent.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().inbox.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PacketSocket for MemorySocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut state = self.lock();

        loop {
            let now = Instant::now();
            if state.deadline.is_some_and(|deadline| now >= deadline) {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                ));
            }

            if let Some((payload, from)) = state.inbox.pop_front() {
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                return Ok((n, from));
            }

            let deadline = state.deadline;
            state = match deadline {
                Some(deadline) => {
                    self.ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
                None => self
                    .ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
    }

    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let replies = (self.responder)(buf, addr);

        let mut state = self.lock();
        state.sent.push((buf.to_vec(), addr));
        state.inbox.extend(replies);
        drop(state);

        self.ready.notify_all();
        Ok(buf.len())
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        let mut state = self.lock();
        state.deadline = deadline;
        state.deadline_history.push(deadline);
        drop(state);

        self.ready.notify_all();
    }
}

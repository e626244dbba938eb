//! Blocking STUN transaction client over a borrowed connection.
//!
//! Messages are encoded and decoded with `stun_rs`. The client never owns
//! its transport: a reader thread spawned in the caller's [`thread::Scope`]
//! pulls datagrams off the [`Connection`] while [`Client::transact`] resends
//! the request on a fixed pacing tick until a response with the same
//! transaction id arrives or the deadline passes.

use std::{
    io,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, Scope, ScopedJoinHandle},
    time::{Duration, Instant},
};

use stun_rs::{
    MessageClass, MessageDecoderBuilder, MessageEncoderBuilder, StunMessage, StunMessageBuilder,
    TransactionId, attributes::stun::ErrorCode, methods::BINDING,
};

#[cfg(test)]
pub(crate) mod fixtures;

const MAX_DATAGRAM: usize = 1500;
const MAX_RETRANSMIT_INTERVAL: Duration = Duration::from_millis(1600);

/// Stream-like transport talking to exactly one peer.
pub trait Connection: Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    fn close(&self) -> io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client options: {0}")]
    InvalidOptions(&'static str),

    #[error("failed to spawn reader: {0}")]
    Spawn(io::Error),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("write failed: {0}")]
    Write(io::Error),

    #[error("read failed: {0}")]
    Read(io::Error),

    #[error("close failed: {0}")]
    Close(io::Error),

    #[error("client closed")]
    Closed,

    #[error("transaction timed out")]
    TransactionTimedOut,

    #[error("error response: {code} {reason}")]
    ErrorResponse { code: u16, reason: String },

    #[error("error response without usable error code")]
    MalformedErrorResponse,
}

impl ClientError {
    /// True when the transport gave up because its read deadline passed.
    pub fn is_deadline(&self) -> bool {
        match self {
            ClientError::Read(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Wait before the first resend; doubles after every resend.
    pub retransmit_interval: Duration,

    /// Total sends per transaction, the first one included.
    pub max_attempts: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retransmit_interval: Duration::from_millis(100),
            max_attempts: 7,
        }
    }
}

/// Completion of one transaction.
pub struct Event {
    pub result: Result<StunMessage, ClientError>,
}

enum Inbound {
    Message(StunMessage),
    Failed(io::Error),
}

pub struct Client<'scope, C> {
    conn: &'scope C,
    options: ClientOptions,
    inbound: Receiver<Inbound>,
    reader: Option<ScopedJoinHandle<'scope, ()>>,
    reader_done: bool,
}

impl<'scope, C: Connection> Client<'scope, C> {
    pub fn new<'env>(
        scope: &'scope Scope<'scope, 'env>,
        conn: &'scope C,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        if options.retransmit_interval.is_zero() {
            return Err(ClientError::InvalidOptions("retransmit interval must be non-zero"));
        }
        if options.max_attempts == 0 {
            return Err(ClientError::InvalidOptions("at least one attempt is required"));
        }

        let (tx, inbound) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("stun-reader".into())
            .spawn_scoped(scope, move || read_loop(conn, tx))
            .map_err(ClientError::Spawn)?;

        Ok(Self {
            conn,
            options,
            inbound,
            reader: Some(reader),
            reader_done: false,
        })
    }

    /// Runs one transaction and hands its outcome to `handler` exactly once.
    ///
    /// An `Err` means the request never went out and `handler` was not
    /// called.
    pub fn transact<F>(
        &mut self,
        request: &StunMessage,
        deadline: Instant,
        handler: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Event),
    {
        if self.reader_done {
            return Err(ClientError::Closed);
        }

        let raw = encode(request)?;
        self.conn.write(&raw).map_err(ClientError::Write)?;

        let mut interval = self.options.retransmit_interval;
        let mut next_send = Instant::now() + interval;
        let mut attempts = 1;

        let result = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(ClientError::TransactionTimedOut);
            }

            let wake = if attempts < self.options.max_attempts {
                next_send.min(deadline)
            } else {
                deadline
            };

            match self.inbound.recv_timeout(wake.saturating_duration_since(now)) {
                Ok(Inbound::Message(msg)) if msg.transaction_id() == request.transaction_id() => {
                    break response(msg);
                }
                Ok(Inbound::Message(_)) => {
                    log::debug!("ignoring message for another transaction");
                }
                Ok(Inbound::Failed(err)) => {
                    self.reader_done = true;
                    break Err(ClientError::Read(err));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.reader_done = true;
                    break Err(ClientError::Closed);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if attempts >= self.options.max_attempts || Instant::now() < next_send {
                        continue;
                    }

                    log::debug!("retransmitting binding request (attempt {})", attempts + 1);
                    if let Err(err) = self.conn.write(&raw) {
                        break Err(ClientError::Write(err));
                    }

                    attempts += 1;
                    interval = (interval * 2).min(MAX_RETRANSMIT_INTERVAL);
                    next_send = Instant::now() + interval;
                }
            }
        };

        handler(Event { result });

        Ok(())
    }

    /// Closes the connection and waits for the reader to finish.
    ///
    /// The reader only returns once a read on the connection fails, so the
    /// transport must already be failing reads (e.g. an elapsed deadline).
    pub fn close(mut self) -> Result<(), ClientError> {
        let res = self.conn.close().map_err(ClientError::Close);

        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::warn!("stun reader thread panicked");
            }
        }

        res
    }
}

/// Binding request under a fresh random transaction id.
pub fn binding_request() -> StunMessage {
    StunMessageBuilder::new(BINDING, MessageClass::Request)
        .with_transaction_id(TransactionId::default())
        .build()
}

pub(crate) fn encode(msg: &StunMessage) -> Result<Vec<u8>, ClientError> {
    let encoder = MessageEncoderBuilder::default().build();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let size = encoder
        .encode(&mut buf, msg)
        .map_err(|err| ClientError::Encode(err.to_string()))?;
    buf.truncate(size);

    Ok(buf)
}

fn response(msg: StunMessage) -> Result<StunMessage, ClientError> {
    if msg.class() != MessageClass::ErrorResponse {
        return Ok(msg);
    }

    let err = msg
        .get::<ErrorCode>()
        .and_then(|attr| attr.as_error_code().ok())
        .map(|attr| ClientError::ErrorResponse {
            code: attr.error_code().error_code(),
            reason: attr.error_code().reason().to_string(),
        })
        .unwrap_or(ClientError::MalformedErrorResponse);

    Err(err)
}

fn read_loop<C: Connection>(conn: &C, tx: Sender<Inbound>) {
    let decoder = MessageDecoderBuilder::default().build();
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        match conn.read(&mut buf) {
            Ok(n) => match decoder.decode(&buf[..n]) {
                Ok((msg, _)) => {
                    if tx.send(Inbound::Message(msg)).is_err() {
                        // receiver gone, keep draining until the transport fails
                        continue;
                    }
                }
                Err(err) => log::debug!("dropping undecodable datagram: {err}"),
            },
            Err(err) => {
                let _ = tx.send(Inbound::Failed(err));
                return;
            }
        }
    }
}

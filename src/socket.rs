use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Mutex,
    time::{Duration, Instant},
};

use socket2::{Domain, Protocol, Socket, Type};

#[cfg(test)]
pub(crate) mod memory;

/// Longest a single blocking receive waits before the deadline is re-read.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Connectionless datagram endpoint shared between the caller and a
/// discovery call.
///
/// Implementations must let `set_read_deadline` from one thread affect a
/// `recv_from` already blocked on another: moving the deadline into the past
/// is how a lingering read gets released, so setting it cannot fail.
pub trait PacketSocket: Sync {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// `None` removes the deadline. An elapsed deadline fails reads with
    /// [`io::ErrorKind::TimedOut`].
    fn set_read_deadline(&self, deadline: Option<Instant>);
}

/// UDP socket with an absolute read deadline.
///
/// The deadline lives next to the socket, not in `SO_RCVTIMEO`: the OS
/// timeout is only armed while `recv_from` runs and is back to blocking
/// when it returns, so the wrapped socket stays usable through
/// [`get_ref`](Self::get_ref).
#[derive(Debug)]
pub struct DeadlineUdpSocket {
    inner: UdpSocket,
    deadline: Mutex<Option<Instant>>,
}

impl DeadlineUdpSocket {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(UdpSocket::bind(addr)?.into())
    }

    /// Binds with `SO_REUSEADDR` so the port can be picked up again for
    /// peer traffic once discovery is done.
    pub fn bind_reusable(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;

        Ok(UdpSocket::from(socket).into())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        *self.lock_deadline()
    }

    pub fn get_ref(&self) -> &UdpSocket {
        &self.inner
    }

    fn lock_deadline(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl From<UdpSocket> for DeadlineUdpSocket {
    fn from(inner: UdpSocket) -> Self {
        Self {
            inner,
            deadline: Mutex::new(None),
        }
    }
}

impl DeadlineUdpSocket {
    fn recv_sliced(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let wait = match self.read_deadline() {
                None => POLL_SLICE,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read deadline exceeded",
                        ));
                    }
                    (deadline - now).min(POLL_SLICE)
                }
            };

            self.inner.set_read_timeout(Some(wait))?;

            match self.inner.recv_from(buf) {
                Ok(res) => return Ok(res),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl PacketSocket for DeadlineUdpSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let res = self.recv_sliced(buf);
        let restored = self.inner.set_read_timeout(None);

        res.and_then(|received| restored.map(|()| received))
    }

    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, addr)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self.lock_deadline() = deadline;
    }
}

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
};

use crate::{client::Connection, error::Error, socket::PacketSocket};

/// Presents a shared packet socket as a private connection to one peer.
///
/// Datagrams from any other sender are dropped. The socket is borrowed, so
/// closing the filter leaves it untouched.
#[derive(Debug)]
pub struct AddressFilter<'a, S> {
    socket: &'a S,
    remote: SocketAddr,
    remote_text: String,
}

impl<'a, S: PacketSocket> AddressFilter<'a, S> {
    pub fn new(socket: &'a S, addr: &str) -> Result<Self, Error> {
        let remote = resolve(addr).map_err(|source| Error::AddressResolution {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            socket,
            remote,
            remote_text: remote.to_string(),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

// first IPv4 result, any address otherwise
fn resolve(addr: &str) -> io::Result<SocketAddr> {
    let addrs: Vec<_> = addr.to_socket_addrs()?.collect();

    addrs
        .iter()
        .find(|x| x.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"))
}

impl<S: PacketSocket> Connection for AddressFilter<'_, S> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (n, from) = self.socket.recv_from(buf)?;

            if from.to_string() == self.remote_text {
                return Ok(n);
            }

            log::trace!("discarding {n} bytes from {from}, expecting {}", self.remote);
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.remote)
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

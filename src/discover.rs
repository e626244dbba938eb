use std::{
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use stun_rs::{StunMessage, attributes::stun::XorMappedAddress};

use crate::{
    client::{Client, ClientError, ClientOptions, Connection, Event, binding_request},
    error::{AttributeError, Error},
    socket::PacketSocket,
};

pub mod filter;
pub mod stun;

pub use filter::AddressFilter;

/// Window given to the binding transaction itself. The caller's overall
/// timeout is enforced separately through the socket deadline; whichever is
/// shorter ends the call.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Discover {
    type Error;

    /// Reflexive address and the local port it maps to.
    async fn discover(&self) -> Result<(SocketAddr, u16), Self::Error>;
}

/// Asks `server` for the reflexive address of `socket`.
///
/// Blocks until the binding transaction completes or `timeout` elapses. The
/// call takes over the socket's read path while it runs and leaves the read
/// deadline cleared on return, whatever the outcome.
pub fn discover_reflexive_address<S: PacketSocket>(
    server: &str,
    socket: &S,
    timeout: Duration,
) -> Result<SocketAddr, Error> {
    discover_with(server, socket, timeout, ClientOptions::default())
}

/// Tries `servers` in order, returning the first discovered address or the
/// last error.
pub fn discover_any<S, A>(servers: &[A], socket: &S, timeout: Duration) -> Result<SocketAddr, Error>
where
    S: PacketSocket,
    A: AsRef<str>,
{
    let mut last_err = Error::NoServers;

    for server in servers {
        match discover_reflexive_address(server.as_ref(), socket, timeout) {
            Ok(addr) => return Ok(addr),
            Err(err) => {
                log::warn!("stun server {} failed: {err}", server.as_ref());
                last_err = err;
            }
        }
    }

    Err(last_err)
}

pub(crate) fn discover_with<S: PacketSocket>(
    server: &str,
    socket: &S,
    timeout: Duration,
    options: ClientOptions,
) -> Result<SocketAddr, Error> {
    let conn = AddressFilter::new(socket, server)?;
    log::debug!("querying {} ({server})", conn.remote_addr());

    thread::scope(|scope| {
        let client = Client::new(scope, &conn, options).map_err(Error::ClientConstruction)?;
        let mut session = Session {
            socket,
            client: Some(client),
        };
        socket.set_read_deadline(Some(Instant::now() + timeout));

        let request = binding_request();
        let mut outcome = None;

        session
            .transact(&request, Instant::now() + TRANSACTION_TIMEOUT, |event| {
                outcome = Some(reflexive_address(event));
            })
            .map_err(Error::Dispatch)?;

        let addr = outcome.unwrap_or(Err(Error::ProtocolEvent(ClientError::Closed)))?;
        log::info!("{server} reports reflexive address {addr}");

        Ok(addr)
    })
}

fn reflexive_address(event: Event) -> Result<SocketAddr, Error> {
    match event.result {
        Err(err) if err.is_deadline() => Err(Error::DeadlineExceeded),
        Err(err) => Err(Error::ProtocolEvent(err)),
        Ok(msg) => {
            let attr = msg
                .get::<XorMappedAddress>()
                .ok_or(AttributeError::Missing)?;
            let mapped = attr
                .as_xor_mapped_address()
                .map_err(AttributeError::from)?;

            Ok(*mapped.socket_address())
        }
    }
}

/// Owns the client for one discovery call and restores the socket when
/// dropped: deadline moved into the past to release the reader, client
/// closed, deadline cleared.
struct Session<'scope, S: PacketSocket, C: Connection> {
    socket: &'scope S,
    client: Option<Client<'scope, C>>,
}

impl<S: PacketSocket, C: Connection> Session<'_, S, C> {
    fn transact<F>(
        &mut self,
        request: &StunMessage,
        deadline: Instant,
        handler: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Event),
    {
        match self.client.as_mut() {
            Some(client) => client.transact(request, deadline, handler),
            None => Err(ClientError::Closed),
        }
    }
}

impl<S: PacketSocket, C: Connection> Drop for Session<'_, S, C> {
    fn drop(&mut self) {
        self.socket.set_read_deadline(Some(Instant::now()));

        if let Some(client) = self.client.take() {
            if let Err(err) = client.close() {
                log::warn!("failed to close stun client: {err}");
            }
        }

        self.socket.set_read_deadline(None);
    }
}

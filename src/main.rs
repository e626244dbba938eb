use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use stun_disco::{
    Discover, Error,
    discover::stun::StunDiscover,
    socket::DeadlineUdpSocket,
};

#[derive(Debug, clap::Parser)]
#[command(version, about = "Discover the reflexive address of a UDP socket")]
pub struct Args {
    /// Local address to bind
    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Overall timeout per server, in milliseconds
    #[arg(short, long, default_value_t = 3000)]
    timeout_ms: u64,

    /// STUN servers (host:port), tried in order; defaults to $STUN_SERVER
    servers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let socket = Arc::new(DeadlineUdpSocket::bind_reusable(args.bind)?);
    let local_addr = socket.local_addr()?;

    let discover = if args.servers.is_empty() {
        StunDiscover::from_env(socket)
    } else {
        StunDiscover::new(socket, args.servers)
    }
    .with_timeout(Duration::from_millis(args.timeout_ms));

    log::info!("bound {local_addr}, querying {:?}", discover.servers());

    let (endpoint, _) = discover.discover().await?;

    println!("{endpoint} (local {local_addr})");

    Ok(())
}

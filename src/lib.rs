//! Reflexive transport address discovery over a UDP socket the caller keeps
//! using afterwards.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use stun_disco::{discover_reflexive_address, socket::DeadlineUdpSocket};
//!
//! let socket = DeadlineUdpSocket::bind("0.0.0.0:0")?;
//! let external = discover_reflexive_address("stun.l.google.com:19302", &socket, Duration::from_secs(3))?;
//! println!("{external}");
//! # Ok::<(), stun_disco::Error>(())
//! ```

pub mod client;
pub mod discover;
pub(crate) mod error;
pub mod socket;

pub use discover::{Discover, discover_any, discover_reflexive_address};
pub use error::{AttributeError, Error};

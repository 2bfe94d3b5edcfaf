//! An Art-Net client for the UDP broadcast domain on port 6454: it discovers the other nodes on
//! the network, advertises its own identity and port configuration through ArtPollReply, and
//! publishes or subscribes DMX-512 universes with the pacing and sequencing real consoles and
//! gateways expect.
//!
//! ```no_run
//! use artnet_client::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Config::default())?;
//!
//!     // We feed universe 0:0:1 into the network
//!     let universe = client.set_port_config("0:0:1", true, false)?;
//!     universe.set_dmx(&[255, 128, 0])?;
//!
//!     // Watch the neighbourhood from another task while the loop runs
//!     let watcher = client.clone();
//!     tokio::spawn(async move {
//!         loop {
//!             tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!             for node in watcher.list_nodes() {
//!                 println!("{} #{}: {}", node.id.ip, node.id.bind_index, node.short_name);
//!             }
//!         }
//!     });
//!
//!     // Runs until client.close() is called
//!     client.connect().await?;
//!     Ok(())
//! }
//! ```
//!
//! The wire codec lives in [ArtCommand] and is usable on its own; frames with OpCodes the client
//! does not interpret decode into [ArtCommand::Unknown] and round-trip unchanged.
#![deny(missing_docs)]

/// Re-export of the bitflags crate that this library uses
#[macro_use]
pub extern crate bitflags;
/// Re-export of the byteorder crate that this library uses
pub extern crate byteorder;

#[macro_use]
mod macros;
mod client;
mod command;
mod convert;
mod enums;
mod error;
mod node;
mod port_address;
mod universe;

pub mod interface;

pub use crate::client::{Client, Config, Stats, UniverseHandle, ARTNET_PORT};
pub use crate::command::*;
pub use crate::enums::ArtTalkToMe;
pub use crate::error::*;
pub use crate::node::{Node, NodeId, Port, PortDirection, PortProtocol};
pub use crate::port_address::PortAddress;
pub use crate::universe::{LocalRole, UniverseInfo};

//! Wyoming protocol: event framing, typed messages, server and client.

pub mod client;
pub mod event;
pub mod info;
pub mod messages;
pub mod server;

pub use client::WyomingClient;
pub use event::{Event, read_event, write_event};
pub use info::{AsrModel, AsrProgram, Attribution, Info};
pub use messages::Message;
pub use server::{EventHandler, EventServer, ServerUri};

//! The connection aggregate: outbound queues, writer task, keepalive and the
//! close/failure state machine.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - Created, waiting for the upgraded streams
//! 2. **Open** - Streams attached, writer task running
//! 3. **Closing** - One side's close frame sent or received
//! 4. **Closed** - Both close frames exchanged, streams released
//! 5. **Failed** - Canceled, timed out or hit an error
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rsws_duplex::{Config, Message, Role, Streams, WebSocket, WebSocketListener};
//!
//! struct Echo;
//!
//! impl WebSocketListener for Echo {
//!     fn on_message(&self, ws: &WebSocket, message: Message) {
//!         ws.send(message);
//!     }
//!
//!     fn on_closing(&self, ws: &WebSocket, code: u16, _reason: &str) {
//!         let _ = ws.close(code, "");
//!     }
//! }
//!
//! let ws = WebSocket::new("echo", Config::default(), Arc::new(Echo));
//! ws.run(Streams::from_io(Role::Server, stream)).await?;
//! ```

mod listener;
mod queue;
mod role;
mod state;
mod streams;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::WebSocket;
pub use listener::WebSocketListener;
pub use role::Role;
pub use state::ConnectionState;
pub use streams::{BoxedSink, BoxedSource, Streams};

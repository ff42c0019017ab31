//! SCTP association management for one endpoint.
//!
//! This crate owns the sockets of an SCTP endpoint and turns readiness
//! callbacks into client events: complete messages, association and peer
//! address changes, connect results and send failures.
//!
//! ## Features
//!
//! - **Connection table**: fd-keyed slot table with generation-checked ids
//! - **Readiness dispatch**: accept, receive, deferred connect completion
//! - **Reassembly**: multi-part messages in a doubling buffer
//! - **Notifications**: decoded and gated by the subscription mask
//! - **Reconnect**: blocking retry with 1, 1, 2, 2, 4, 4 unit backoff
//! - **Modes**: one association (client or server) or multiplexed
//!
//! ## Example
//!
//! ```rust,no_run
//! use sctp_session::{
//!     ConnectRequest, Endpoint, EndpointConfig, InterestRegistry, KernelSockets, SctpEvent,
//! };
//! use tokio::sync::mpsc;
//!
//! # fn example() -> Result<(), sctp_session::SessionError> {
//! let mut config = EndpointConfig::default();
//! config.set_parameter("peer_IP_address", "127.0.0.1")?;
//! config.set_parameter("peer_port", "2905")?;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel::<SctpEvent>();
//! let registry = InterestRegistry::new();
//! let mut endpoint = Endpoint::new(
//!     config,
//!     Box::new(KernelSockets::new()),
//!     Box::new(registry.clone()),
//!     Box::new(tx),
//! );
//! endpoint.map()?;
//! endpoint.connect(ConnectRequest::default())?;
//!
//! // Poll the fds in `registry.snapshot()` and call
//! // handle_readable / handle_writable / handle_error accordingly.
//! while let Ok(event) = rx.try_recv() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod dispatch;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod factory;
pub mod mode;
mod notify;
pub mod readiness;
pub mod reassembly;
pub mod reconnect;
pub mod resolver;
pub mod send;
pub mod settings;
pub mod socket;
pub mod table;

#[cfg(test)]
mod testing;

pub use config::EndpointConfig;
pub use endpoint::{
    ConnectFromRequest, ConnectRequest, Endpoint, EndpointCore, ListenRequest, SocketOption,
};
pub use error::{ErrorCategory, Result, SessionError};
pub use events::{ClientId, EventSink, SctpEvent};
pub use mode::{ConnectionMode, MultiConnection, SingleConnection};
pub use readiness::{Interest, InterestRegistry, Readiness};
pub use reassembly::{Progress, Reassembly};
pub use reconnect::{Backoff, Sleeper, ThreadSleeper};
pub use resolver::{AddressFamily, HostLookup, Resolver, SystemLookup};
pub use send::SendRequest;
pub use settings::ProtocolSettings;
pub use socket::{KernelSockets, Received, RecvFlags, SocketApi};
pub use table::{ConnectionRecord, FdTable, ListenerRecord, SlotId};

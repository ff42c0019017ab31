//! Connection modes.
//!
//! A single-connection endpoint owns at most one association (plus a
//! listening socket in server mode). A multiplexed endpoint owns any number
//! of associations and listeners, each addressed by its client id.

mod multi;
mod single;

pub use multi::MultiConnection;
pub use single::SingleConnection;

use crate::config::EndpointConfig;
use crate::endpoint::{ConnectFromRequest, ConnectRequest, EndpointCore, ListenRequest};
use crate::error::Result;
use crate::events::ClientId;
use std::os::fd::RawFd;

/// Behavior that differs between single and multiplexed endpoints
pub trait ConnectionMode: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Arm the endpoint
    fn map(&mut self, core: &mut EndpointCore) -> Result<()>;

    /// Close everything the endpoint owns
    fn unmap(&mut self, core: &mut EndpointCore) -> Result<()>;

    /// Connect to a peer
    fn connect(&mut self, core: &mut EndpointCore, request: ConnectRequest) -> Result<()>;

    /// Connect to a peer from a local address
    fn connect_from(&mut self, core: &mut EndpointCore, request: ConnectFromRequest)
        -> Result<()>;

    /// Open a listener
    fn listen(&mut self, core: &mut EndpointCore, request: ListenRequest) -> Result<()>;

    /// Close one association, or all of them when `client_id` is absent
    fn close(&mut self, core: &mut EndpointCore, client_id: Option<ClientId>) -> Result<()>;

    /// Socket a send request goes to
    fn send_target(&self, core: &EndpointCore, client_id: Option<ClientId>) -> Result<RawFd>;

    /// Client id put into a send failure event
    fn failure_client_id(&self, core: &EndpointCore, target: RawFd) -> Option<ClientId>;

    /// Accept on `fd` if it is a listening socket; false when it is not
    fn accept(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<bool>;

    /// Writability completes pending non-blocking connects
    fn completes_deferred_connects(&self) -> bool;

    /// Drop an association the peer lost
    fn association_lost(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<()>;

    /// A lost-communication notification triggers a reconnect
    fn reconnects_on_association_loss(&self, core: &EndpointCore) -> bool;

    /// Socket that init and linger updates apply to
    fn primary_fd(&self, core: &EndpointCore) -> Option<RawFd>;
}

/// Mode selected by the configuration
pub fn select(config: &EndpointConfig) -> Box<dyn ConnectionMode> {
    if config.simple_mode {
        Box::new(SingleConnection::new())
    } else {
        Box::new(MultiConnection::new())
    }
}

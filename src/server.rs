// Socket-server collaborator traits
//
// The bridge owns a transport server on its I/O thread and reacts to its
// delegate callbacks. The server itself (WebSocket multiplexing, HTTP
// endpoints, framing) is external; these traits are the seam.

use thiserror::Error;

use crate::queue::SessionId;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {host}:{port}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}

/// Narrow control surface a server exposes to delegate callbacks running on
/// the I/O thread. In wait-for-connect mode the delegate accepts the
/// session directly through this handle, without an engine round-trip.
pub trait ServerHandle {
    fn accept_session(&mut self, session_id: SessionId);
    fn decline_session(&mut self, session_id: SessionId);
}

/// A session-multiplexing socket server driven from the bridge's I/O
/// thread.
///
/// Implementations are constructed on the I/O thread inside a
/// current-thread tokio runtime with a `LocalSet`; `start` may
/// `spawn_local` connection tasks onto it. Session ids are minted by the
/// server and must be positive and unique within the server's lifetime.
///
/// The server owns the boxed [`ServerDelegate`] it was built with and must
/// drop it once the listener and every connection have closed; that drop is
/// what lets the bridge's event loop exit.
pub trait TransportServer: ServerHandle {
    /// Bind the listener and begin accepting connections.
    fn start(&mut self) -> ServerResult<()>;

    /// Close the listener. Open sessions keep draining until the remote
    /// side disconnects.
    fn stop(&mut self);

    /// Forcibly close every open session.
    fn terminate_connections(&mut self);

    /// Send a UTF-8 payload to one session.
    fn send(&mut self, session_id: SessionId, message: String);

    /// The actually bound port, valid after `start` succeeds.
    fn port(&self) -> u16;
}

/// Callbacks a server raises on the I/O thread. Implemented by the bridge.
pub trait ServerDelegate: Send {
    /// A frontend opened a session against the given target.
    fn start_session(
        &mut self,
        server: &mut dyn ServerHandle,
        session_id: SessionId,
        target_id: &str,
    );

    /// A protocol frame arrived from the frontend.
    fn message_received(&mut self, session_id: SessionId, message: String);

    /// The frontend disconnected or the session was terminated.
    fn end_session(&mut self, session_id: SessionId);

    /// Ids of the debuggable targets. This bridge always exposes exactly
    /// one.
    fn target_ids(&self) -> Vec<String>;

    fn target_title(&self, id: &str) -> String;

    fn target_url(&self, id: &str) -> String;
}

// Engine-side collaborator traits
//
// The embedder supplies an `InspectorAgent`; the bridge hands it a
// `FrontendChannel` per session and receives an engine-side session handle
// in return.

use std::rc::Rc;
use std::sync::Arc;

use crate::bridge::Shared;
use crate::queue::{SessionId, TransportAction};

/// An engine-side session handle, produced by [`InspectorAgent::connect`].
pub trait InspectorSession {
    /// Dispatch one protocol message into the engine.
    ///
    /// Must tolerate reentrant invocation: a dispatch may pause the engine,
    /// and a nested message for the same session can arrive while paused.
    fn dispatch(&self, message: &[u16]);
}

/// The inspector API of the scripting runtime, as seen from the bridge.
///
/// `connect` is called on the engine thread only. The three wake-up methods
/// are called from the I/O thread; each must eventually cause
/// [`InspectorIo::dispatch_messages`](crate::bridge::InspectorIo::dispatch_messages)
/// to run on the engine thread. All three are fired together because the
/// engine may be idle, running native code, or between tasks; whichever
/// path becomes active first runs the drain and the reentry guard makes the
/// others no-ops.
pub trait InspectorAgent: Send + Sync {
    /// Connect a new engine-side session for the given frontend channel.
    fn connect(&self, channel: FrontendChannel) -> Rc<dyn InspectorSession>;

    /// Schedule a foreground task on the engine's task runner.
    fn post_dispatch_task(&self);

    /// Request an interrupt of running script code.
    fn request_interrupt(&self);

    /// Signal the engine-side wake-up handle. Level-triggered.
    fn wake(&self);
}

/// Outbound half of one debugger session, handed to the engine on connect.
///
/// The channel stays valid for the lifetime of the bridge; writes after the
/// session ended are drained and dropped by the server.
#[derive(Clone)]
pub struct FrontendChannel {
    shared: Arc<Shared>,
    session_id: SessionId,
}

impl FrontendChannel {
    pub(crate) fn new(shared: Arc<Shared>, session_id: SessionId) -> Self {
        Self { shared, session_id }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue a message for the frontend and wake the I/O thread.
    pub fn send_to_frontend(&self, message: &[u16]) {
        self.shared
            .write(TransportAction::SendMessage, self.session_id, message);
    }
}

impl std::fmt::Debug for FrontendChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendChannel")
            .field("session_id", &self.session_id)
            .finish()
    }
}

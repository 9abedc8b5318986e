// Debugger-transport bridge for embedded script engines
//
// Sits between a synchronous engine-side inspector API and remote debugger
// frontends speaking an asynchronous socket protocol:
// - Bridge lifecycle and pause/resume handshake
// - Two bounded-lifetime FIFO queues under a single lock
// - Engine-thread dispatcher with a reentry guard
// - I/O thread running the transport server's event loop
// - Wait-for-connect startup gating

pub mod agent;
pub mod bridge;
pub mod io;
pub mod queue;
pub mod server;
pub mod string16;
pub mod target;

pub use agent::{FrontendChannel, InspectorAgent, InspectorSession};
pub use bridge::{InspectorConfig, InspectorIo, State, PORT_UNBOUND};
pub use io::RESUME_COMMAND;
pub use queue::{InspectorAction, SessionId, TransportAction};
pub use server::{ServerDelegate, ServerError, ServerHandle, ServerResult, TransportServer};
pub use string16::String16;

// I/O thread: event loop, outgoing-queue drain, and the server delegate
//
// The bridge owns this thread between start and stop. It runs a
// current-thread tokio runtime inside a LocalSet; transport servers spawn
// their connection tasks onto it, interleaved with the outgoing drain.

use std::sync::Arc;

use tokio::task::LocalSet;
use tracing::{debug, error};

use crate::agent::InspectorAgent;
use crate::bridge::{InspectorConfig, Shared, State};
use crate::queue::{InspectorAction, Message, MessageQueue, SessionId, TransportAction};
use crate::server::{ServerDelegate, ServerHandle, TransportServer};
use crate::target;

/// Inspector command that resumes a startup parked in wait-for-connect
/// mode. The probe is a plain substring match, not JSON-aware: a message
/// merely quoting this phrase inside a string literal resumes as well.
pub const RESUME_COMMAND: &str = "\"Runtime.runIfWaitingForDebugger\"";

pub(crate) fn io_thread_main<S, F>(
    shared: Arc<Shared>,
    agent: Arc<dyn InspectorAgent>,
    config: InspectorConfig,
    target_id: String,
    wait_for_connect: bool,
    bind: F,
) where
    S: TransportServer + 'static,
    F: FnOnce(Box<dyn ServerDelegate>, &str, u16) -> S,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build inspector I/O runtime");
    let local = LocalSet::new();
    local.block_on(&runtime, async {
        let script_path = target::resolve_script_path(&config.script_name);
        let delegate = IoDelegate::new(
            shared.clone(),
            agent,
            target_id,
            script_path,
            config.script_name.clone(),
            wait_for_connect,
        );
        let mut server = bind(Box::new(delegate), &config.host, config.port);
        if let Err(err) = server.start() {
            error!("inspector server failed to start: {err}");
            // Safe: the engine thread is parked on the startup gate.
            shared.set_state(State::Error);
            shared.post_startup();
            return;
        }
        // Safe: the engine thread is parked on the startup gate, except in
        // wait-for-connect mode where the port stays advisory until bound.
        shared.set_port(i32::from(server.port()));
        if !wait_for_connect {
            shared.post_startup();
        }
        run_event_loop(&shared, &mut server).await;
    });
    // Dropping the LocalSet and runtime here is the loop teardown: it
    // closes the wake handle and cancels any server task still parked.
}

/// Drive the outgoing drain until the server releases its delegate, which
/// happens once the listener and every connection have closed.
async fn run_event_loop<S: TransportServer>(shared: &Shared, server: &mut S) {
    let mut drained = MessageQueue::new();
    loop {
        tokio::select! {
            _ = shared.io_wake_notified() => {
                drain_outgoing(shared, server, &mut drained);
            }
            _ = shared.server_done_notified() => break,
        }
    }
    debug!("inspector event loop exiting");
}

fn drain_outgoing<S: TransportServer>(
    shared: &Shared,
    server: &mut S,
    drained: &mut MessageQueue<TransportAction>,
) {
    shared.swap_outgoing(drained);
    loop {
        let next = drained.pop_front();
        let Message {
            action,
            session_id,
            payload,
        } = match next {
            Some(message) => message,
            None => break,
        };
        match action {
            TransportAction::Kill => {
                server.terminate_connections();
                server.stop();
            }
            TransportAction::Stop => server.stop(),
            TransportAction::SendMessage => server.send(session_id, payload.to_utf8()),
            TransportAction::AcceptSession => server.accept_session(session_id),
            TransportAction::DeclineSession => server.decline_session(session_id),
        }
    }
}

/// The bridge's server delegate. Lives on the I/O thread, owned by the
/// server; its drop is the signal that the server is fully done.
pub(crate) struct IoDelegate {
    shared: Arc<Shared>,
    agent: Arc<dyn InspectorAgent>,
    target_id: String,
    script_path: String,
    script_name: String,
    waiting: bool,
}

impl IoDelegate {
    pub(crate) fn new(
        shared: Arc<Shared>,
        agent: Arc<dyn InspectorAgent>,
        target_id: String,
        script_path: String,
        script_name: String,
        waiting: bool,
    ) -> Self {
        Self {
            shared,
            agent,
            target_id,
            script_path,
            script_name,
            waiting,
        }
    }
}

impl ServerDelegate for IoDelegate {
    fn start_session(
        &mut self,
        server: &mut dyn ServerHandle,
        session_id: SessionId,
        _target_id: &str,
    ) {
        let action = if self.waiting {
            // Accept on the spot so the socket can carry protocol frames
            // before the engine thread has run a single drain.
            server.accept_session(session_id);
            InspectorAction::StartSessionUnconditionally
        } else {
            InspectorAction::StartSession
        };
        self.shared
            .post_incoming(self.agent.as_ref(), action, session_id, "");
    }

    fn message_received(&mut self, session_id: SessionId, message: String) {
        if self.waiting && message.contains(RESUME_COMMAND) {
            self.waiting = false;
            self.shared.post_startup();
        }
        self.shared.post_incoming(
            self.agent.as_ref(),
            InspectorAction::SendMessage,
            session_id,
            &message,
        );
    }

    fn end_session(&mut self, session_id: SessionId) {
        self.shared
            .post_incoming(self.agent.as_ref(), InspectorAction::EndSession, session_id, "");
    }

    fn target_ids(&self) -> Vec<String> {
        vec![self.target_id.clone()]
    }

    fn target_title(&self, _id: &str) -> String {
        if self.script_name.is_empty() {
            target::process_title()
        } else {
            self.script_name.clone()
        }
    }

    fn target_url(&self, _id: &str) -> String {
        format!("file://{}", self.script_path)
    }
}

impl Drop for IoDelegate {
    fn drop(&mut self) {
        self.shared.signal_server_done();
    }
}

// Bridge lifecycle, state machine, and the engine-thread dispatcher
//
// One `InspectorIo` per engine instance. It owns the I/O thread between
// `start` and `stop`, the queue pair shared with it, and the engine-side
// session table. Everything here except the `Shared` state runs on the
// engine thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::agent::{FrontendChannel, InspectorAgent, InspectorSession};
use crate::queue::{InspectorAction, Message, MessageQueue, SessionId, TransportAction};
use crate::server::{ServerDelegate, TransportServer};
use crate::string16::String16;
use crate::target;

/// Returned by [`InspectorIo::port`] until the server has bound.
pub const PORT_UNBOUND: i32 = -1;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    New = 0,
    Accepting = 1,
    Done = 2,
    ShutDown = 3,
    Error = 4,
}

impl State {
    fn from_u8(raw: u8) -> State {
        match raw {
            0 => State::New,
            1 => State::Accepting,
            2 => State::Done,
            3 => State::ShutDown,
            4 => State::Error,
            _ => unreachable!("invalid bridge state {raw}"),
        }
    }
}

/// Bridge configuration, handed in by the embedder.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Interface the server binds to.
    pub host: String,
    /// Requested port; the actually bound port is reported by
    /// [`InspectorIo::port`].
    pub port: u16,
    /// Entry script of the debuggee, used for target metadata. May be
    /// empty.
    pub script_name: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9229,
            script_name: String::new(),
        }
    }
}

pub(crate) struct QueuePair {
    pub(crate) incoming: MessageQueue<InspectorAction>,
    pub(crate) outgoing: MessageQueue<TransportAction>,
}

/// State shared between the engine thread and the I/O thread.
///
/// The queue pair is only touched under the mutex; state and port are
/// atomics written by the I/O thread exclusively while the engine thread is
/// parked on the startup gate.
pub(crate) struct Shared {
    queues: Mutex<QueuePair>,
    incoming_cond: Condvar,
    state: AtomicU8,
    port: AtomicI32,
    io_wake: Notify,
    server_done: Notify,
    startup_gate: Mutex<Option<SyncSender<()>>>,
}

impl Shared {
    pub(crate) fn new(startup: SyncSender<()>) -> Self {
        Self {
            queues: Mutex::new(QueuePair {
                incoming: MessageQueue::new(),
                outgoing: MessageQueue::new(),
            }),
            incoming_cond: Condvar::new(),
            state: AtomicU8::new(State::New as u8),
            port: AtomicI32::new(PORT_UNBOUND),
            io_wake: Notify::new(),
            server_done: Notify::new(),
            startup_gate: Mutex::new(Some(startup)),
        }
    }

    fn lock_queues(&self) -> MutexGuard<'_, QueuePair> {
        self.queues.lock().expect("bridge queue lock poisoned")
    }

    pub(crate) fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn port(&self) -> i32 {
        self.port.load(Ordering::SeqCst)
    }

    pub(crate) fn set_port(&self, port: i32) {
        self.port.store(port, Ordering::SeqCst);
    }

    /// Unblock a `start` parked on the startup gate. Idempotent: the sender
    /// is consumed on first post.
    pub(crate) fn post_startup(&self) {
        let gate = self
            .startup_gate
            .lock()
            .expect("startup gate lock poisoned")
            .take();
        if let Some(gate) = gate {
            let _ = gate.send(());
        }
    }

    /// Queue an engine-bound entry and fire the engine-side wake-ups.
    ///
    /// The triple wake-up covers the three contexts the engine thread can
    /// be in: idle on its loop (`wake`), running native code
    /// (`request_interrupt`), or between tasks (`post_dispatch_task`). The
    /// condition variable is broadcast unconditionally because
    /// `wait_for_frontend_event` must wake on every arrival, not only on
    /// the queue edge.
    pub(crate) fn post_incoming(
        &self,
        agent: &dyn InspectorAgent,
        action: InspectorAction,
        session_id: SessionId,
        message: &str,
    ) {
        let was_empty = self
            .lock_queues()
            .incoming
            .append(action, session_id, String16::from_utf8(message));
        if was_empty {
            agent.post_dispatch_task();
            agent.request_interrupt();
            agent.wake();
        }
        let _guard = self.lock_queues();
        self.incoming_cond.notify_all();
    }

    /// Queue a server-bound entry and wake the I/O thread. The wake is
    /// unconditional; the notify permit is level-triggered, so redundant
    /// signals coalesce.
    pub(crate) fn write(&self, action: TransportAction, session_id: SessionId, message: &[u16]) {
        self.lock_queues()
            .outgoing
            .append(action, session_id, String16::from_units(message));
        self.io_wake.notify_one();
    }

    pub(crate) fn swap_incoming(&self, into: &mut MessageQueue<InspectorAction>) {
        self.lock_queues().incoming.swap(into);
    }

    pub(crate) fn swap_outgoing(&self, into: &mut MessageQueue<TransportAction>) {
        self.lock_queues().outgoing.swap(into);
    }

    pub(crate) async fn io_wake_notified(&self) {
        self.io_wake.notified().await;
    }

    pub(crate) async fn server_done_notified(&self) {
        self.server_done.notified().await;
    }

    /// Raised when the server has released its delegate, meaning the
    /// listener and all connections are closed and the event loop may exit.
    pub(crate) fn signal_server_done(&self) {
        self.server_done.notify_one();
    }
}

/// Engine-thread-confined state. Only ever touched from the engine thread.
struct EngineState {
    sessions: HashMap<SessionId, Rc<dyn InspectorSession>>,
    /// Partially drained entries survive here across reentrant
    /// `wait_for_frontend_event` calls.
    dispatch_buf: MessageQueue<InspectorAction>,
    dispatching: bool,
}

/// The debugger-transport bridge.
///
/// Deliberately `!Send`: the session table holds engine-thread session
/// handles, and every method except the ones documented otherwise must be
/// called on the engine thread.
pub struct InspectorIo {
    config: InspectorConfig,
    wait_for_connect: bool,
    target_id: String,
    agent: Arc<dyn InspectorAgent>,
    shared: Arc<Shared>,
    engine: RefCell<EngineState>,
    thread: Option<JoinHandle<()>>,
    startup_rx: Option<Receiver<()>>,
}

impl InspectorIo {
    pub fn new(
        config: InspectorConfig,
        agent: Arc<dyn InspectorAgent>,
        wait_for_connect: bool,
    ) -> Self {
        let (startup_tx, startup_rx) = mpsc::sync_channel(1);
        Self {
            config,
            wait_for_connect,
            target_id: target::generate_target_id(),
            agent,
            shared: Arc::new(Shared::new(startup_tx)),
            engine: RefCell::new(EngineState {
                sessions: HashMap::new(),
                dispatch_buf: MessageQueue::new(),
                dispatching: false,
            }),
            thread: None,
            startup_rx: Some(startup_rx),
        }
    }

    /// Spawn the I/O thread and park until it is ready.
    ///
    /// `bind` is invoked on the I/O thread with the server delegate and the
    /// configured host and port; it builds the transport server the bridge
    /// will drive. Returns `false` if the server failed to bind, leaving
    /// the bridge in [`State::Error`]; an errored bridge must not be
    /// reused.
    ///
    /// In wait-for-connect mode this blocks until a frontend has connected
    /// and issued the resume command, and runs one dispatch pass before
    /// returning so the unconditional session start is processed.
    pub fn start<S, F>(&mut self, bind: F) -> bool
    where
        S: TransportServer + 'static,
        F: FnOnce(Box<dyn ServerDelegate>, &str, u16) -> S + Send + 'static,
    {
        assert_eq!(self.shared.state(), State::New, "bridge started twice");

        let shared = self.shared.clone();
        let agent = self.agent.clone();
        let config = self.config.clone();
        let target_id = self.target_id.clone();
        let wait_for_connect = self.wait_for_connect;
        let handle = std::thread::Builder::new()
            .name("inspector-io".to_string())
            .spawn(move || {
                crate::io::io_thread_main(shared, agent, config, target_id, wait_for_connect, bind)
            })
            .expect("failed to spawn inspector I/O thread");
        self.thread = Some(handle);

        let startup = self
            .startup_rx
            .take()
            .expect("startup gate already consumed");
        let _ = startup.recv();

        if self.shared.state() == State::Error {
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
            return false;
        }
        self.shared.set_state(State::Accepting);
        if self.wait_for_connect {
            self.dispatch_messages();
        }
        true
    }

    /// Terminate all connections, stop the server, and join the I/O
    /// thread. Flushes the terminal `EndSession` entries afterwards.
    pub fn stop(&mut self) {
        assert!(self.thread.is_some(), "stop called before start");
        assert!(
            !self.engine.borrow().sessions.is_empty() || self.shared.state() == State::Accepting,
            "stop called with no sessions outside the accepting state"
        );
        self.write(TransportAction::Kill, 0, &[]);
        if let Some(thread) = self.thread.take() {
            thread.join().expect("inspector I/O thread panicked");
        }
        self.shared.set_state(State::ShutDown);
        self.dispatch_messages();
    }

    /// Whether the bridge owns a live I/O thread. Used by embedders to
    /// avoid double initialization.
    pub fn is_started(&self) -> bool {
        self.thread.is_some()
    }

    /// Begin an orderly shutdown. With no sessions open the bridge goes
    /// straight to [`State::Done`]; otherwise it enters
    /// [`State::ShutDown`], asks the server to close its listener, and
    /// lets the open sessions drain.
    pub fn wait_for_disconnect(&self) {
        if self.shared.state() == State::Accepting {
            self.shared.set_state(State::Done);
        }
        if !self.engine.borrow().sessions.is_empty() {
            self.shared.set_state(State::ShutDown);
            self.write(TransportAction::Stop, 0, &[]);
            info!("waiting for the debugger to disconnect...");
        }
    }

    /// Park the engine at a natural pause point until frontend traffic
    /// arrives. Returns `false` when no sessions are open, meaning the
    /// engine should resume.
    ///
    /// Reentrant dispatch is permitted while paused so that nested engine
    /// callbacks (for example an evaluation triggered from the pause) still
    /// receive messages.
    pub fn wait_for_frontend_event(&self) -> bool {
        self.engine.borrow_mut().dispatching = false;
        if self.engine.borrow().sessions.is_empty() {
            return false;
        }
        let buffered = !self.engine.borrow().dispatch_buf.is_empty();
        let guard = self.shared.lock_queues();
        if !buffered && guard.incoming.is_empty() {
            let _guard = self
                .shared
                .incoming_cond
                .wait(guard)
                .expect("bridge queue lock poisoned");
        }
        true
    }

    /// Drain the incoming queue on the engine thread.
    ///
    /// Safe to call from any of the wake-up paths; redundant invocations
    /// and reentrant invocations return immediately. The drain repeats
    /// until a pass observes both the shared queue and the local buffer
    /// empty, so entries appended mid-drain are picked up in the same
    /// call.
    pub fn dispatch_messages(&self) {
        {
            let mut engine = self.engine.borrow_mut();
            if engine.dispatching {
                return;
            }
            engine.dispatching = true;
        }
        loop {
            let had_messages = {
                let mut engine = self.engine.borrow_mut();
                if engine.dispatch_buf.is_empty() {
                    self.shared.swap_incoming(&mut engine.dispatch_buf);
                }
                !engine.dispatch_buf.is_empty()
            };
            if !had_messages {
                break;
            }
            loop {
                let next = self.engine.borrow_mut().dispatch_buf.pop_front();
                match next {
                    Some(message) => self.handle_incoming(message),
                    None => break,
                }
            }
        }
        self.engine.borrow_mut().dispatching = false;
    }

    fn handle_incoming(&self, message: Message<InspectorAction>) {
        let Message {
            action,
            session_id,
            payload,
        } = message;
        match action {
            InspectorAction::StartSession => {
                self.attach(session_id);
                self.write(TransportAction::AcceptSession, session_id, &[]);
            }
            InspectorAction::StartSessionUnconditionally => {
                // The I/O thread already accepted the socket; no echo.
                self.attach(session_id);
            }
            InspectorAction::EndSession => {
                let mut engine = self.engine.borrow_mut();
                engine.sessions.remove(&session_id);
                debug!(session_id, "session ended");
                if engine.sessions.is_empty() {
                    let next = if self.shared.state() == State::ShutDown {
                        State::Done
                    } else {
                        State::Accepting
                    };
                    self.shared.set_state(next);
                }
            }
            InspectorAction::SendMessage => {
                let session = self.engine.borrow().sessions.get(&session_id).cloned();
                match session {
                    Some(session) => session.dispatch(payload.as_view()),
                    // Benign race: the frontend sent a message between
                    // EndSession and the drain observing it.
                    None => debug!(session_id, "dropping message for unknown session"),
                }
            }
        }
    }

    fn attach(&self, session_id: SessionId) {
        let channel = FrontendChannel::new(self.shared.clone(), session_id);
        let session = self.agent.connect(channel);
        self.engine.borrow_mut().sessions.insert(session_id, session);
        info!(session_id, "debugger attached");
    }

    /// Queue a server-bound action. Called by per-session frontend
    /// channels and by the lifecycle operations; safe from any thread.
    pub fn write(&self, action: TransportAction, session_id: SessionId, message: &[u16]) {
        self.shared.write(action, session_id, message);
    }

    /// Unblock a `start` parked in wait-for-connect mode. Fires at most
    /// once per bridge.
    pub fn resume_startup(&self) {
        self.shared.post_startup();
    }

    /// The actually bound port after `start` returned `true`;
    /// [`PORT_UNBOUND`] before.
    pub fn port(&self) -> i32 {
        self.shared.port()
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Ids of the debuggable targets; always exactly one.
    pub fn target_ids(&self) -> Vec<String> {
        vec![self.target_id.clone()]
    }
}

impl Drop for InspectorIo {
    fn drop(&mut self) {
        // The delegate on the I/O thread holds a reference to the shared
        // state; the thread must be gone before the bridge is.
        if let Some(thread) = self.thread.take() {
            self.shared.write(TransportAction::Kill, 0, &[]);
            let _ = thread.join();
        }
    }
}

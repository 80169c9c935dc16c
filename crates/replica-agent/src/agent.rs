//! The replica agent runtime.
//!
//! A [`ReplicaAgent`] sits between a node's protocol logic and the test
//! controller:
//!
//! - outbound protocol messages are relayed through the controller so it can
//!   delay, reorder or drop them;
//! - inbound messages and directives arrive on an embedded HTTP listener;
//! - timeouts are registered with the controller, which fires them on demand.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──▶ Starting ──listener up──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!    ▲                     │
//!    └──── bind failure ───┘
//! ```
//!
//! Readiness is a separate flag flipped by [`ready`](ReplicaAgent::ready) and
//! [`not_ready`](ReplicaAgent::not_ready), usually through controller
//! directives. Outbound messages are only relayed while ready.

use crate::config::AgentConfig;
use crate::controller::{ControllerTransport, HttpControllerTransport};
use crate::counter::Counter;
use crate::directive::{DirectiveDispatcher, DirectiveHandler, Readiness};
use crate::error::{AgentError, DirectiveError, Result};
use crate::queue::MessageQueue;
use crate::server;
use crate::telemetry::{Telemetry, params, spawn_detached};
use crate::timer::{TimeoutHandle, TimeoutInfo, TimerRegistry, format_duration};
use crate::types::{EventType, Message, MessageId, ReplicaId, ReplicaRecord, TimeoutFire};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of [`ReplicaAgent::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Relayed to the controller under this identifier.
    Sent(MessageId),
    /// Dropped because the replica is not ready. Nothing reached the controller.
    DroppedNotReady,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }
}

struct Listener {
    local_addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
}

struct Lifecycle {
    state: LifecycleState,
    listener: Option<Listener>,
}

/// State shared between the public handle and the inbound listener.
pub(crate) struct AgentInner {
    config: AgentConfig,
    transport: Arc<dyn ControllerTransport>,
    queue: MessageQueue,
    timers: TimerRegistry,
    counter: Counter,
    telemetry: Telemetry,
    dispatcher: DirectiveDispatcher,
    ready: Mutex<bool>,
    lifecycle: Mutex<Lifecycle>,
    stop_signal: Mutex<CancellationToken>,
}

impl AgentInner {
    fn record(&self, ready: bool) -> ReplicaRecord {
        ReplicaRecord {
            id: self.config.replica_id.clone(),
            info: self.config.info.clone(),
            addr: self.config.advertised_addr.clone(),
            ready,
        }
    }

    fn set_ready(&self, ready: bool) {
        *self.ready.lock() = ready;

        let record = self.record(ready);
        let transport = Arc::clone(&self.transport);
        spawn_detached(async move {
            if let Err(e) = transport.register_replica(&record).await {
                warn!(replica = %record.id, ready, error = %e, "Failed to update replica registration");
            }
        });
    }

    fn is_stopped(&self) -> bool {
        self.stop_signal.lock().is_cancelled()
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state
    }

    /// Inbound `/message`.
    pub(crate) fn deliver(&self, message: Message) {
        debug!(message_id = %message.id, from = %message.from, "Received message");
        self.telemetry.publish_event_async(
            EventType::MessageReceive,
            params([("message_id", message.id.to_string())]),
        );
        if !self.queue.add(message) {
            debug!("Message queue blocked, discarding message");
        }
    }

    /// Inbound `/timeout`.
    pub(crate) fn end_timeout(&self, fire: TimeoutFire) {
        info!(key = %fire.timeout_type, duration = %fire.duration, "Ending timeout");
        self.timers.fire_timeout(&fire.timeout_type);
        self.telemetry.publish_event_async(
            EventType::TimeoutEnd,
            params([("type", fire.timeout_type), ("duration", fire.duration)]),
        );
    }

    /// Inbound `/directive`.
    pub(crate) async fn handle_directive(&self, action: &str) -> std::result::Result<(), DirectiveError> {
        self.dispatcher.dispatch(action, self).await
    }
}

impl Readiness for AgentInner {
    fn ready(&self) {
        self.set_ready(true);
    }

    fn not_ready(&self) {
        self.set_ready(false);
    }

    fn is_ready(&self) -> bool {
        *self.ready.lock()
    }
}

/// Handle to a replica agent. Clones share the same agent.
#[derive(Clone)]
pub struct ReplicaAgent {
    inner: Arc<AgentInner>,
}

impl fmt::Debug for ReplicaAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaAgent")
            .field("replica", &self.inner.config.replica_id)
            .field("state", &self.inner.state())
            .field("ready", &self.inner.is_ready())
            .finish_non_exhaustive()
    }
}

impl ReplicaAgent {
    /// Creates an agent that talks to the controller over HTTP.
    ///
    /// The configuration is validated here and never again.
    pub fn new(config: AgentConfig, handler: Arc<dyn DirectiveHandler>) -> Result<Self> {
        let mut config = config;
        config.validate()?;
        let transport =
            HttpControllerTransport::new(config.controller_url(), config.request_timeout)?;
        Ok(Self::build(config, handler, Arc::new(transport)))
    }

    /// Creates an agent with a custom controller transport.
    pub fn with_transport(
        config: AgentConfig,
        handler: Arc<dyn DirectiveHandler>,
        transport: Arc<dyn ControllerTransport>,
    ) -> Result<Self> {
        let mut config = config;
        config.validate()?;
        Ok(Self::build(config, handler, transport))
    }

    fn build(
        config: AgentConfig,
        handler: Arc<dyn DirectiveHandler>,
        transport: Arc<dyn ControllerTransport>,
    ) -> Self {
        let telemetry = Telemetry::new(config.replica_id.clone(), Arc::clone(&transport));
        let dispatcher = DirectiveDispatcher::new(handler, config.directive_mode);

        Self {
            inner: Arc::new(AgentInner {
                config,
                transport,
                queue: MessageQueue::new(),
                timers: TimerRegistry::new(),
                counter: Counter::new(),
                telemetry,
                dispatcher,
                ready: Mutex::new(false),
                lifecycle: Mutex::new(Lifecycle {
                    state: LifecycleState::Stopped,
                    listener: None,
                }),
                stop_signal: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.inner.config.replica_id
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lifecycle
            .lock()
            .listener
            .as_ref()
            .map(|l| l.local_addr)
    }

    /// Registers with the controller and brings up the inbound listener.
    ///
    /// Does nothing if the agent is already starting or running, and fails
    /// with [`AgentError::Stopping`] while a [`stop`](Self::stop) is still
    /// draining. A failed registration is logged and start carries on. The
    /// listener is given the configured start grace window to fail; surviving
    /// it counts as started.
    pub async fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match lifecycle.state {
                LifecycleState::Stopped => lifecycle.state = LifecycleState::Starting,
                LifecycleState::Stopping => return Err(AgentError::Stopping),
                LifecycleState::Starting | LifecycleState::Running => return Ok(()),
            }
        }
        {
            let mut stop_signal = self.inner.stop_signal.lock();
            if stop_signal.is_cancelled() {
                *stop_signal = CancellationToken::new();
            }
        }

        info!(
            replica = %self.inner.config.replica_id,
            addr = %self.inner.config.listen_addr,
            "Starting replica agent"
        );

        if let Err(e) = self
            .inner
            .transport
            .register_replica(&self.inner.record(false))
            .await
        {
            warn!(replica = %self.inner.config.replica_id, error = %e, "Failed to register replica");
        }

        match self.bring_up_listener().await {
            Ok(listener) => {
                info!(addr = %listener.local_addr, "Replica agent listening");
                let mut lifecycle = self.inner.lifecycle.lock();
                lifecycle.state = LifecycleState::Running;
                lifecycle.listener = Some(listener);
                Ok(())
            }
            Err(e) => {
                self.inner.lifecycle.lock().state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    async fn bring_up_listener(&self) -> Result<Listener> {
        let target = self.inner.config.bind_target();
        let tcp = tokio::net::TcpListener::bind(&target)
            .await
            .map_err(|source| AgentError::Bind {
                addr: target.clone(),
                source,
            })?;
        let local_addr = tcp.local_addr().map_err(|source| AgentError::Bind {
            addr: target.clone(),
            source,
        })?;

        let shutdown = self.inner.stop_signal.lock().clone();
        let router = server::router(Arc::clone(&self.inner));
        let mut task = tokio::spawn(async move {
            axum::serve(tcp, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        // Surviving the grace window is taken as a successful start.
        match tokio::time::timeout(self.inner.config.start_grace, &mut task).await {
            Err(_) => Ok(Listener { local_addr, task }),
            Ok(Ok(Ok(()))) => Err(AgentError::Server(
                "listener exited during startup".to_string(),
            )),
            Ok(Ok(Err(e))) => Err(AgentError::Server(e.to_string())),
            Ok(Err(e)) => Err(AgentError::Server(e.to_string())),
        }
    }

    /// Stops the agent.
    ///
    /// Pending and future sends fail with [`AgentError::Stopped`] from here on.
    /// The listener drains for at most the configured stop grace; if it takes
    /// longer it is aborted and [`AgentError::ShutdownTimeout`] is returned.
    pub async fn stop(&self) -> Result<()> {
        let listener = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != LifecycleState::Running {
                return Ok(());
            }
            lifecycle.state = LifecycleState::Stopping;
            lifecycle.listener.take()
        };

        info!(replica = %self.inner.config.replica_id, "Stopping replica agent");
        self.inner.stop_signal.lock().cancel();

        let result = match listener {
            Some(mut listener) => {
                let grace = self.inner.config.stop_grace;
                match tokio::time::timeout(grace, &mut listener.task).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(e))) => Err(AgentError::Server(e.to_string())),
                    Ok(Err(e)) => Err(AgentError::Server(e.to_string())),
                    Err(_) => {
                        listener.task.abort();
                        Err(AgentError::ShutdownTimeout(grace))
                    }
                }
            }
            None => Ok(()),
        };

        self.inner.lifecycle.lock().state = LifecycleState::Stopped;
        result
    }

    /// Marks the replica ready and re-registers in the background.
    pub fn ready(&self) {
        self.inner.ready();
    }

    /// Marks the replica not ready and re-registers in the background.
    pub fn not_ready(&self) {
        self.inner.not_ready();
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Relays a message to `to` through the controller.
    ///
    /// Fails with [`AgentError::Stopped`] after [`stop`](Self::stop). While
    /// not ready the message is dropped and `Ok(SendOutcome::DroppedNotReady)`
    /// is returned without contacting the controller.
    pub async fn send_message(
        &self,
        message_type: impl Into<String>,
        to: impl Into<ReplicaId>,
        data: impl Into<Vec<u8>>,
        intercept: bool,
    ) -> Result<SendOutcome> {
        if self.inner.is_stopped() {
            return Err(AgentError::Stopped);
        }
        if !self.is_ready() {
            debug!("Replica not ready, dropping outbound message");
            return Ok(SendOutcome::DroppedNotReady);
        }

        let from = self.inner.config.replica_id.clone();
        let to = to.into();
        let message = Message {
            id: self.inner.counter.next_id(&from, &to),
            message_type: message_type.into(),
            from,
            to,
            data: data.into(),
            intercept,
        };

        self.inner.transport.relay_message(&message).await?;
        debug!(message_id = %message.id, to = %message.to, "Relayed message");

        self.inner.telemetry.publish_event_async(
            EventType::MessageSend,
            params([("message_id", message.id.to_string())]),
        );
        Ok(SendOutcome::Sent(message.id))
    }

    /// Next inbound message, if any.
    pub fn receive_message(&self) -> Option<Message> {
        self.inner.queue.pop()
    }

    pub fn message_queue(&self) -> &MessageQueue {
        &self.inner.queue
    }

    pub fn counter(&self) -> &Counter {
        &self.inner.counter
    }

    /// Hands a message to the inbound queue as if the controller delivered it.
    pub fn deliver_message(&self, message: Message) {
        self.inner.deliver(message);
    }

    /// Registers a logical timeout with the controller.
    ///
    /// Returns false, and reports nothing, if a timeout with the same key is
    /// already pending.
    pub async fn start_timer<T: TimeoutInfo + 'static>(&self, info: T) -> bool {
        let key = info.key();
        let duration = format_duration(info.duration());
        info!(key = %key, duration = %duration, "Starting timer");

        if !self.inner.timers.add_timeout(Arc::new(info)) {
            return false;
        }

        self.inner
            .telemetry
            .publish_event(
                EventType::TimeoutStart,
                params([("type", key), ("duration", duration)]),
            )
            .await;
        true
    }

    /// Fires the pending timeout for `key`, as the controller's `/timeout`
    /// call does. Returns whether one was pending.
    pub fn fire_timeout(&self, key: &str) -> bool {
        self.inner.timers.fire_timeout(key)
    }

    /// Waits for the next fired timeout.
    pub async fn next_timeout(&self) -> Option<TimeoutHandle> {
        self.inner.timers.recv().await
    }

    pub fn try_next_timeout(&self) -> Option<TimeoutHandle> {
        self.inner.timers.try_recv()
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.inner.timers
    }

    /// Carries out a directive as if the controller had sent it.
    pub async fn handle_directive(&self, action: &str) -> std::result::Result<(), DirectiveError> {
        self.inner.handle_directive(action).await
    }

    pub async fn publish_event(&self, event_type: EventType, params: HashMap<String, String>) {
        self.inner.telemetry.publish_event(event_type, params).await;
    }

    pub fn publish_event_async(&self, event_type: EventType, params: HashMap<String, String>) {
        self.inner.telemetry.publish_event_async(event_type, params);
    }

    /// Posts a log record to the controller.
    pub async fn log(&self, params: Map<String, Value>, message: impl Into<String>) {
        self.inner.telemetry.log(params, message).await;
    }

    pub fn log_async(&self, params: Map<String, Value>, message: impl Into<String>) {
        self.inner.telemetry.log_async(params, message);
    }
}

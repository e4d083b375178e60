//! Channel endpoint — one logical connection to a UI surface
//!
//! State machine:
//!
//!   Disconnected --connect ok--> Connected
//!   Connected --link drop--> Disconnected --(auto_reconnect)--> Reconnecting
//!   Reconnecting --retry ok--> Connected
//!   Reconnecting --retry fails--> Reconnecting (after backoff)
//!   any --disconnect()--> Disconnected (terminal, timers cancelled)
//!
//! Sends never fail from the caller's point of view: while the link is down
//! envelopes wait in a FIFO transmit queue that is flushed, oldest first,
//! in the same critical section that marks the endpoint Connected. A send
//! issued after that can therefore never overtake a queued envelope.
//!
//! The endpoint state lives behind a `std::sync::Mutex` that is never held
//! across an `.await` or while user callbacks run.

use crate::config::ChannelConfig;
use crate::transport::{Connector, Link};
use agentlink_core::{ConnectionState, Envelope, EnvelopeType, Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type EnvelopeCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What happened to an envelope handed to [`ChannelEndpoint::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live link.
    Sent,
    /// Waiting in the transmit queue for the next connection.
    Queued,
    /// Dropped: the endpoint never connected with auto-reconnect off, or it
    /// was explicitly disconnected and not connected again.
    Rejected,
}

impl SendOutcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, SendOutcome::Rejected)
    }
}

struct Shared {
    name: Option<String>,
    state: ConnectionState,
    auto_reconnect: bool,
    ever_connected: bool,
    /// Set by `disconnect()`, cleared by the next `connect()`.
    closed: bool,
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
    queue: VecDeque<Envelope>,
    listeners: Vec<(ListenerId, EnvelopeType, EnvelopeCallback)>,
    state_listeners: Vec<(ListenerId, StateCallback)>,
    next_listener_id: u64,
    /// Bumped whenever the current link is replaced or torn down, so tasks
    /// belonging to an older link become inert.
    generation: u64,
    link_cancel: Option<CancellationToken>,
    reconnect_cancel: Option<CancellationToken>,
    last_heartbeat_ack: Option<i64>,
}

impl Shared {
    fn teardown_link(&mut self) {
        self.generation += 1;
        self.outbound = None;
        if let Some(token) = self.link_cancel.take() {
            token.cancel();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect_cancel.take() {
            token.cancel();
        }
    }

    fn state_callbacks(&self) -> Vec<StateCallback> {
        self.state_listeners.iter().map(|(_, cb)| cb.clone()).collect()
    }

    fn allocate_listener_id(&mut self) -> ListenerId {
        self.next_listener_id += 1;
        ListenerId(self.next_listener_id)
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    shared: Mutex<Shared>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(|e| e.into_inner());
        shared.teardown_link();
        shared.cancel_reconnect();
    }
}

/// Cheaply cloneable handle to one channel.
#[derive(Clone)]
pub struct ChannelEndpoint {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("ChannelEndpoint")
            .field("transport", &self.inner.connector.kind())
            .field("name", &shared.name)
            .field("state", &shared.state)
            .field("queued", &shared.queue.len())
            .finish()
    }
}

impl ChannelEndpoint {
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        let shared = Shared {
            name: None,
            state: ConnectionState::Disconnected,
            auto_reconnect: config.auto_reconnect,
            ever_connected: false,
            closed: false,
            outbound: None,
            queue: VecDeque::new(),
            listeners: Vec::new(),
            state_listeners: Vec::new(),
            next_listener_id: 0,
            generation: 0,
            link_cancel: None,
            reconnect_cancel: None,
            last_heartbeat_ack: None,
        };
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                shared: Mutex::new(shared),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn name(&self) -> Option<String> {
        self.lock().name.clone()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn auto_reconnect(&self) -> bool {
        self.lock().auto_reconnect
    }

    /// True after [`disconnect`](Self::disconnect) until the next
    /// [`connect`](Self::connect).
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Envelopes waiting for the next connection.
    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Timestamp carried by the most recent heartbeat acknowledgment.
    /// Advisory only; a stale value never forces a disconnect.
    pub fn last_heartbeat_ack(&self) -> Option<i64> {
        self.lock().last_heartbeat_ack
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open the link to `name`. On failure the endpoint stays Disconnected.
    pub async fn connect(&self, name: impl Into<String>, auto_reconnect: bool) -> Result<()> {
        let name = name.into();
        let (generation, dropped) = {
            let mut shared = self.lock();
            shared.name = Some(name.clone());
            shared.auto_reconnect = auto_reconnect;
            shared.closed = false;
            shared.cancel_reconnect();
            shared.teardown_link();
            let was = std::mem::replace(&mut shared.state, ConnectionState::Disconnected);
            let dropped = (was != ConnectionState::Disconnected).then(|| shared.state_callbacks());
            (shared.generation, dropped)
        };
        if let Some(callbacks) = dropped {
            notify(&callbacks, ConnectionState::Disconnected);
        }

        info!(
            "Connecting channel {} over {} (auto_reconnect={})",
            name,
            self.inner.connector.kind(),
            auto_reconnect
        );
        match self.inner.connector.connect(&name).await {
            Ok(link) => {
                if self.install_link(link, generation) {
                    Ok(())
                } else {
                    Err(Error::ConnectionClosed(format!(
                        "{}: superseded while connecting",
                        name
                    )))
                }
            }
            Err(e) => {
                warn!("Channel {} connect failed: {}", name, e);
                Err(e)
            }
        }
    }

    /// Terminal teardown: no heartbeat or reconnect attempt happens after
    /// this returns. Queued envelopes are discarded and later sends are
    /// rejected until the next `connect()`.
    pub fn disconnect(&self) {
        let (callbacks, name, discarded) = {
            let mut shared = self.lock();
            shared.auto_reconnect = false;
            shared.closed = true;
            shared.cancel_reconnect();
            shared.teardown_link();
            let discarded = shared.queue.len();
            shared.queue.clear();
            let was = std::mem::replace(&mut shared.state, ConnectionState::Disconnected);
            let callbacks = (was != ConnectionState::Disconnected).then(|| shared.state_callbacks());
            (callbacks, shared.name.clone(), discarded)
        };
        info!(
            "Channel {} disconnected ({} queued discarded)",
            name.as_deref().unwrap_or("<unnamed>"),
            discarded
        );
        if let Some(callbacks) = callbacks {
            notify(&callbacks, ConnectionState::Disconnected);
        }
    }

    /// Mark the endpoint Connected on `link`, flushing the transmit queue
    /// first. Returns `false` if the link was superseded by a newer
    /// connect/disconnect while it was being opened.
    fn install_link(&self, link: Link, generation: u64) -> bool {
        let Link { outbound, inbound } = link;
        let token = CancellationToken::new();

        let (callbacks, name, flushed) = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return false;
            }

            let mut flushed = 0;
            while let Some(envelope) = shared.queue.pop_front() {
                if let Err(mpsc::error::SendError(envelope)) = outbound.send(envelope) {
                    // Peer died already; the reader will report the drop.
                    shared.queue.push_front(envelope);
                    break;
                }
                flushed += 1;
            }

            shared.cancel_reconnect();
            shared.outbound = Some(outbound);
            shared.link_cancel = Some(token.clone());
            shared.state = ConnectionState::Connected;
            shared.ever_connected = true;
            (
                shared.state_callbacks(),
                shared.name.clone().unwrap_or_default(),
                flushed,
            )
        };

        info!("Channel {} connected (flushed {} queued)", name, flushed);

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(run_reader(weak.clone(), inbound, token.clone(), generation));
        tokio::spawn(run_heartbeat(
            weak,
            token,
            generation,
            self.inner.config.heartbeat_interval(),
        ));

        notify(&callbacks, ConnectionState::Connected);
        true
    }

    /// Unexpected loss of the link belonging to `generation`.
    fn handle_link_drop(&self, generation: u64) {
        let (callbacks, auto_reconnect, name) = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connected {
                return;
            }
            shared.teardown_link();
            shared.state = ConnectionState::Disconnected;
            (
                shared.state_callbacks(),
                shared.auto_reconnect,
                shared.name.clone().unwrap_or_default(),
            )
        };

        warn!("Channel {} link dropped", name);
        notify(&callbacks, ConnectionState::Disconnected);
        if auto_reconnect {
            self.schedule_reconnect();
        }
    }

    /// Start the single reconnect loop, unless one is already pending.
    fn schedule_reconnect(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; reconnect not scheduled");
            return;
        };

        let (token, callbacks) = {
            let mut shared = self.lock();
            if !shared.auto_reconnect
                || shared.name.is_none()
                || shared.reconnect_cancel.is_some()
                || shared.state == ConnectionState::Connected
            {
                return;
            }
            let token = CancellationToken::new();
            shared.reconnect_cancel = Some(token.clone());
            shared.state = ConnectionState::Reconnecting;
            (token, shared.state_callbacks())
        };

        notify(&callbacks, ConnectionState::Reconnecting);

        let weak = Arc::downgrade(&self.inner);
        let backoff = self.inner.config.reconnect_backoff();
        handle.spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                let Some(endpoint) = ChannelEndpoint::from_weak(&weak) else {
                    return;
                };
                attempt += 1;
                if endpoint.try_reconnect(&token, attempt).await {
                    return;
                }
            }
        });
    }

    /// One reconnect attempt. Returns `true` when the loop should stop.
    async fn try_reconnect(&self, token: &CancellationToken, attempt: u32) -> bool {
        let (name, generation) = {
            let shared = self.lock();
            if token.is_cancelled() {
                return true;
            }
            match shared.name.clone() {
                Some(name) => (name, shared.generation),
                None => return true,
            }
        };

        debug!("Reconnecting channel {} (attempt {})", name, attempt);
        match self.inner.connector.connect(&name).await {
            Ok(link) => {
                if token.is_cancelled() {
                    return true;
                }
                self.install_link(link, generation);
                true
            }
            Err(e) => {
                debug!("Reconnect attempt {} for {} failed: {}", attempt, name, e);
                token.is_cancelled()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send an application envelope. Never blocks and never errors.
    pub fn send(
        &self,
        kind: EnvelopeType,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> SendOutcome {
        let mut envelope = Envelope::new(kind, payload);
        envelope.correlation_id = correlation_id;
        self.send_envelope(envelope)
    }

    pub fn send_envelope(&self, envelope: Envelope) -> SendOutcome {
        let mut shared = self.lock();

        let live = match shared.state {
            ConnectionState::Connected => shared.outbound.clone(),
            _ => None,
        };
        if let Some(outbound) = live {
            let kind = envelope.kind;
            return match outbound.send(envelope) {
                Ok(()) => {
                    debug!("sent {} envelope", kind);
                    SendOutcome::Sent
                }
                Err(mpsc::error::SendError(envelope)) => {
                    let generation = shared.generation;
                    shared.queue.push_back(envelope);
                    drop(shared);
                    warn!("Transmit of {} failed; envelope queued", kind);
                    self.handle_link_drop(generation);
                    SendOutcome::Queued
                }
            };
        }

        if shared.closed {
            debug!("Rejected {} envelope: channel closed", envelope.kind);
            return SendOutcome::Rejected;
        }
        if !shared.ever_connected && !shared.auto_reconnect {
            debug!("Rejected {} envelope: never connected", envelope.kind);
            return SendOutcome::Rejected;
        }

        shared.queue.push_back(envelope);
        let needs_retry = shared.auto_reconnect
            && shared.name.is_some()
            && shared.reconnect_cancel.is_none();
        let queued = shared.queue.len();
        drop(shared);

        debug!("Envelope queued ({} waiting)", queued);
        if needs_retry {
            self.schedule_reconnect();
        }
        SendOutcome::Queued
    }

    /// Send directly on the link of `generation`; liveness traffic is never
    /// queued.
    fn send_internal(&self, envelope: Envelope, generation: u64) {
        let failed = {
            let shared = self.lock();
            if shared.generation != generation {
                return;
            }
            match shared.outbound.as_ref() {
                Some(outbound) => outbound.send(envelope).is_err(),
                None => false,
            }
        };
        if failed {
            self.handle_link_drop(generation);
        }
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register `callback` for inbound envelopes of `kind`. Heartbeat types
    /// are consumed internally and never delivered.
    pub fn add_listener<F>(&self, kind: EnvelopeType, callback: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let mut shared = self.lock();
        let id = shared.allocate_listener_id();
        shared.listeners.push((id, kind, Arc::new(callback)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut shared = self.lock();
        let before = shared.listeners.len();
        shared.listeners.retain(|(lid, _, _)| *lid != id);
        shared.listeners.len() != before
    }

    /// Register a state listener. It is called immediately with the current
    /// state, then on every transition.
    pub fn add_connection_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let callback: StateCallback = Arc::new(callback);
        let (id, state) = {
            let mut shared = self.lock();
            let id = shared.allocate_listener_id();
            shared.state_listeners.push((id, callback.clone()));
            (id, shared.state)
        };
        callback(state);
        id
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        let mut shared = self.lock();
        let before = shared.state_listeners.len();
        shared.state_listeners.retain(|(lid, _)| *lid != id);
        shared.state_listeners.len() != before
    }

    fn dispatch(&self, envelope: Envelope, generation: u64) {
        match envelope.kind {
            EnvelopeType::Heartbeat => {
                let ts = envelope
                    .heartbeat_timestamp()
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
                self.send_internal(Envelope::heartbeat_ack(ts), generation);
            }
            EnvelopeType::HeartbeatAck => {
                let ts = envelope.heartbeat_timestamp();
                debug!("heartbeat ack {:?}", ts);
                self.lock().last_heartbeat_ack = ts;
            }
            kind => {
                let callbacks: Vec<EnvelopeCallback> = {
                    let shared = self.lock();
                    if shared.generation != generation {
                        return;
                    }
                    shared
                        .listeners
                        .iter()
                        .filter(|(_, k, _)| *k == kind)
                        .map(|(_, _, cb)| cb.clone())
                        .collect()
                };
                if callbacks.is_empty() {
                    debug!("No listener for inbound {} envelope", kind);
                }
                for callback in callbacks {
                    callback(&envelope);
                }
            }
        }
    }
}

fn notify(callbacks: &[StateCallback], state: ConnectionState) {
    for callback in callbacks {
        callback(state);
    }
}

// ---------------------------------------------------------------------------
// Per-link tasks
// ---------------------------------------------------------------------------

async fn run_reader(
    weak: Weak<Inner>,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    token: CancellationToken,
    generation: u64,
) {
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return,
            next = inbound.recv() => next,
        };
        let Some(endpoint) = ChannelEndpoint::from_weak(&weak) else {
            return;
        };
        match next {
            Some(envelope) => endpoint.dispatch(envelope, generation),
            None => {
                endpoint.handle_link_drop(generation);
                return;
            }
        }
    }
}

async fn run_heartbeat(
    weak: Weak<Inner>,
    token: CancellationToken,
    generation: u64,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(endpoint) = ChannelEndpoint::from_weak(&weak) else {
            return;
        };
        let now = chrono::Utc::now().timestamp_millis();
        endpoint.send_internal(Envelope::heartbeat(now), generation);
    }
}

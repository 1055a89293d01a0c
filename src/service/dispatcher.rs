//! Dispatch loop: pulls ready events from a transport and routes them.

use crate::config::DispatchConfig;
use crate::domain::{
    CALL_COMPLETED_KIND, CallCompleted, DispatchStats, KindTag, OperationHandle, Registry,
    SessionId, decode_payload,
};
use crate::error::DispatchError;
use crate::transport::{NativeTransport, RawEvent, TransportRole};

/// What a single [`Dispatcher::pump`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The transport had nothing ready.
    Idle,
    /// One event was processed.
    Dispatched {
        /// Kind of the event.
        kind: KindTag,
        /// Broadcast subscribers that received it.
        delivered: usize,
        /// Async result channels resolved by it.
        resolved: usize,
    },
}

/// Drives one native event source against a [`Registry`].
///
/// Every event is first delivered to the broadcast subscribers of its
/// kind. A completion event additionally resolves the async result
/// channels waiting on its handle: the result buffer is fetched once
/// from the transport and handed to every waiting channel.
///
/// A game-server dispatcher is built the same way from a
/// [`Registry::sibling`], so it sees the same broadcast subscribers but
/// only the async results bound through its own registry.
#[derive(Debug)]
pub struct Dispatcher<T> {
    session: SessionId,
    role: TransportRole,
    transport: T,
    registry: Registry,
    drain_limit: usize,
    stats: DispatchStats,
}

impl<T: NativeTransport> Dispatcher<T> {
    /// Creates a dispatcher for `role`.
    #[must_use]
    pub fn new(
        role: TransportRole,
        transport: T,
        registry: Registry,
        config: &DispatchConfig,
    ) -> Self {
        let session = SessionId::new();
        tracing::info!(%session, %role, drain_limit = config.drain_limit, "dispatcher created");
        Self {
            session,
            role,
            transport,
            registry,
            drain_limit: config.drain_limit.max(1),
            stats: DispatchStats::new(session, role),
        }
    }

    /// Creates a dispatcher for the client event source.
    #[must_use]
    pub fn client(transport: T, registry: Registry, config: &DispatchConfig) -> Self {
        Self::new(TransportRole::Client, transport, registry, config)
    }

    /// Creates a dispatcher for the game-server event source.
    ///
    /// Pass a [`Registry::sibling`] of the client registry to share its
    /// broadcast subscribers.
    #[must_use]
    pub fn game_server(transport: T, registry: Registry, config: &DispatchConfig) -> Self {
        Self::new(TransportRole::GameServer, transport, registry, config)
    }

    /// Processes at most one ready event.
    ///
    /// # Errors
    ///
    /// Returns the first [`DispatchError::PayloadSizeMismatch`] raised
    /// while processing the event. The event is still delivered to every
    /// other subscriber before the error is returned.
    pub fn pump(&mut self) -> Result<PumpOutcome, DispatchError> {
        let Some(event) = self.transport.poll_event() else {
            return Ok(PumpOutcome::Idle);
        };
        self.stats.record_event();

        let mut first_error = None;
        let delivered = self.broadcast(&event, &mut first_error);

        let mut resolved = 0;
        if event.kind == CALL_COMPLETED_KIND {
            match decode_payload::<CallCompleted>(&event.payload) {
                Ok(record) => resolved = self.resolve(record.handle, &mut first_error),
                Err(err) => self.note_error(event.kind, err, &mut first_error),
            }
        }

        tracing::trace!(
            session = %self.session,
            role = %self.role,
            kind = %event.kind,
            delivered,
            resolved,
            "event dispatched"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(PumpOutcome::Dispatched {
                kind: event.kind,
                delivered,
                resolved,
            }),
        }
    }

    /// Pumps until the transport is idle or the drain limit is reached.
    ///
    /// Returns the number of events processed.
    ///
    /// # Errors
    ///
    /// Returns the first error any pump reported. Draining continues past
    /// it, so later events are still processed.
    pub fn drain(&mut self) -> Result<usize, DispatchError> {
        let mut processed = 0usize;
        let mut first_error = None;
        while processed < self.drain_limit {
            match self.pump() {
                Ok(PumpOutcome::Idle) => break,
                Ok(PumpOutcome::Dispatched { .. }) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
            processed = processed.saturating_add(1);
        }
        first_error.map_or(Ok(processed), Err)
    }

    /// Expires every async result still waiting on this dispatcher and
    /// hands back the transport. The expired channels never fire.
    pub fn shutdown(self) -> T {
        let pending = self.registry.clear_one_shot();
        for (key, member) in &pending {
            member.expire(*key);
        }
        tracing::info!(
            session = %self.session,
            role = %self.role,
            expired = pending.len(),
            events = self.stats.events_polled,
            "dispatcher shut down"
        );
        drop(pending);
        self.transport
    }

    /// Running counters.
    #[must_use]
    pub const fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Session identifier of this dispatcher.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Event source this dispatcher drives.
    #[must_use]
    pub const fn role(&self) -> TransportRole {
        self.role
    }

    /// Registry the dispatcher routes through.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Maximum events per [`Dispatcher::drain`].
    #[must_use]
    pub const fn drain_limit(&self) -> usize {
        self.drain_limit
    }

    /// Shared access to the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Exclusive access to the transport, e.g. to queue loopback events.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn broadcast(&mut self, event: &RawEvent, first_error: &mut Option<DispatchError>) -> usize {
        let mut delivered = 0usize;
        for (key, subscriber) in self.registry.lookup_broadcast(event.kind) {
            // Skip entries removed by an earlier callback of this event.
            if !self.registry.is_broadcast_live(key) {
                continue;
            }
            match subscriber.deliver(&event.payload) {
                Ok(()) => {
                    delivered = delivered.saturating_add(1);
                    self.stats.broadcasts_delivered =
                        self.stats.broadcasts_delivered.saturating_add(1);
                }
                Err(err) => self.note_error(event.kind, err, first_error),
            }
        }
        delivered
    }

    fn resolve(
        &mut self,
        handle: OperationHandle,
        first_error: &mut Option<DispatchError>,
    ) -> usize {
        let group = self.registry.take_one_shot(handle);
        let Some((_, lead)) = group.first() else {
            self.stats.completions_unclaimed = self.stats.completions_unclaimed.saturating_add(1);
            tracing::debug!(session = %self.session, %handle, "completion without listener");
            return 0;
        };

        let fetched = match self
            .transport
            .fetch_async_result(handle, lead.payload_size(), lead.kind())
        {
            Ok(fetched) => fetched,
            Err(err) => {
                let reason = self.transport.call_failure_reason(handle);
                self.stats.fetch_failures = self.stats.fetch_failures.saturating_add(1);
                tracing::warn!(
                    session = %self.session,
                    role = %self.role,
                    %handle,
                    %reason,
                    error = %err,
                    waiting = group.len(),
                    "call result lost"
                );
                return 0;
            }
        };

        let mut resolved = 0usize;
        for (key, member) in &group {
            match member.resolve(*key, &fetched.payload, fetched.io_failure) {
                Ok(true) => {
                    resolved = resolved.saturating_add(1);
                    self.stats.calls_resolved = self.stats.calls_resolved.saturating_add(1);
                }
                Ok(false) => {}
                Err(err) => self.note_error(member.kind(), err, first_error),
            }
        }
        resolved
    }

    fn note_error(
        &mut self,
        kind: KindTag,
        err: DispatchError,
        first_error: &mut Option<DispatchError>,
    ) {
        self.stats.payload_errors = self.stats.payload_errors.saturating_add(1);
        tracing::error!(
            session = %self.session,
            role = %self.role,
            %kind,
            code = err.error_code(),
            error = %err,
            "payload rejected"
        );
        first_error.get_or_insert(err);
    }
}

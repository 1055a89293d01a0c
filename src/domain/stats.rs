//! Per-dispatcher counters.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SessionId;
use crate::transport::TransportRole;

/// Running counters for one dispatcher, serializable for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    /// Session the counters belong to.
    pub session_id: SessionId,
    /// Which transport the dispatcher drives.
    pub role: TransportRole,
    /// Events pulled from the transport.
    pub events_polled: u64,
    /// Broadcast subscriber invocations that completed without error.
    pub broadcasts_delivered: u64,
    /// One-shot subscriber invocations.
    pub calls_resolved: u64,
    /// Completion events for handles nobody was waiting on.
    pub completions_unclaimed: u64,
    /// Result fetches the transport refused; those results are lost.
    pub fetch_failures: u64,
    /// Payloads that were too small for the subscriber's shape.
    pub payload_errors: u64,
    /// Wall-clock time of the last polled event.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl DispatchStats {
    /// Creates zeroed counters.
    #[must_use]
    pub const fn new(session_id: SessionId, role: TransportRole) -> Self {
        Self {
            session_id,
            role,
            events_polled: 0,
            broadcasts_delivered: 0,
            calls_resolved: 0,
            completions_unclaimed: 0,
            fetch_failures: 0,
            payload_errors: 0,
            last_event_at: None,
        }
    }

    pub(crate) fn record_event(&mut self) {
        self.events_polled = self.events_polled.saturating_add(1);
        self.last_event_at = Some(Utc::now());
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_is_zeroed() {
        let stats = DispatchStats::new(SessionId::new(), TransportRole::Client);
        assert_eq!(stats.events_polled, 0);
        assert!(stats.last_event_at.is_none());
    }

    #[test]
    fn record_event_stamps_time() {
        let mut stats = DispatchStats::new(SessionId::new(), TransportRole::GameServer);
        stats.record_event();
        assert_eq!(stats.events_polled, 1);
        assert!(stats.last_event_at.is_some());
    }

    #[test]
    fn serializes_role_in_snake_case() {
        let stats = DispatchStats::new(SessionId::new(), TransportRole::GameServer);
        let Ok(json) = serde_json::to_string(&stats) else {
            panic!("serialization failed");
        };
        assert!(json.contains("\"role\":\"game_server\""));
        assert!(json.contains("\"events_polled\":0"));
    }
}

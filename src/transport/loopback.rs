//! In-memory transport.
//!
//! [`LoopbackTransport`] queues events and stores call results the way a
//! native library would, so the dispatch loop can be exercised without
//! one. Completing a call stores its result and posts a
//! [`CallCompleted`] event, mirroring the native completion flow.
//!
//! A stored result can be fetched until the next event after its
//! completion is polled; results nobody fetched by then are discarded.
//! Only the most recent fetch failure is remembered.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use super::{CallFailure, FetchedResult, NativeTransport, RawEvent, TransportError};
use crate::domain::{
    CALL_COMPLETED_KIND, CallCompleted, KindTag, OperationHandle, decode_payload,
};

#[derive(Debug)]
enum StoredResult {
    Ready {
        kind: KindTag,
        payload: Bytes,
        io_failure: bool,
    },
    Failed(CallFailure),
}

/// Event queue plus result store living entirely in memory.
#[derive(Debug)]
pub struct LoopbackTransport {
    events: VecDeque<RawEvent>,
    results: HashMap<OperationHandle, StoredResult>,
    last_failure: Option<(OperationHandle, CallFailure)>,
    claimable: Option<OperationHandle>,
    next_handle: u64,
    fetches: u64,
}

impl LoopbackTransport {
    /// Creates an empty transport. Handles are issued starting at `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            results: HashMap::new(),
            last_failure: None,
            claimable: None,
            next_handle: 1,
            fetches: 0,
        }
    }

    /// Allocates a fresh handle for a new asynchronous call.
    pub fn issue_call(&mut self) -> OperationHandle {
        let handle = OperationHandle::new(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        handle
    }

    /// Queues a broadcast event.
    pub fn push_event(&mut self, kind: KindTag, payload: impl Into<Bytes>) {
        self.events.push_back(RawEvent::new(kind, payload));
    }

    /// Stores the result of `handle` and posts its completion event.
    pub fn complete_call(
        &mut self,
        handle: OperationHandle,
        kind: KindTag,
        payload: impl Into<Bytes>,
        io_failure: bool,
    ) {
        self.results.insert(
            handle,
            StoredResult::Ready {
                kind,
                payload: payload.into(),
                io_failure,
            },
        );
        self.post_completion(handle);
    }

    /// Posts a completion event for `handle` whose result fetch will fail
    /// with `reason`.
    pub fn fail_call(&mut self, handle: OperationHandle, reason: CallFailure) {
        self.results.insert(handle, StoredResult::Failed(reason));
        self.post_completion(handle);
    }

    /// Posts a completion event for `handle` without storing any result.
    pub fn post_completion(&mut self, handle: OperationHandle) {
        let record = CallCompleted { handle };
        self.events
            .push_back(RawEvent::new(CALL_COMPLETED_KIND, record.to_bytes()));
    }

    /// Number of events waiting to be polled.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if a result for `handle` has not been fetched yet.
    #[must_use]
    pub fn has_result(&self, handle: OperationHandle) -> bool {
        self.results.contains_key(&handle)
    }

    /// Number of results stored and not yet fetched or discarded.
    #[must_use]
    pub fn stored_results(&self) -> usize {
        self.results.len()
    }

    /// Number of fetch attempts served so far.
    #[must_use]
    pub const fn fetch_count(&self) -> u64 {
        self.fetches
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTransport for LoopbackTransport {
    fn poll_event(&mut self) -> Option<RawEvent> {
        if let Some(stale) = self.claimable.take()
            && self.results.remove(&stale).is_some()
        {
            tracing::trace!(handle = %stale, "unclaimed call result discarded");
        }
        let event = self.events.pop_front()?;
        if event.kind == CALL_COMPLETED_KIND {
            self.claimable = decode_payload::<CallCompleted>(&event.payload)
                .ok()
                .map(|record| record.handle);
        }
        Some(event)
    }

    fn fetch_async_result(
        &mut self,
        handle: OperationHandle,
        _expected_size: usize,
        expected_kind: KindTag,
    ) -> Result<FetchedResult, TransportError> {
        self.fetches = self.fetches.saturating_add(1);
        match self.results.remove(&handle) {
            Some(StoredResult::Ready {
                kind,
                payload,
                io_failure,
            }) if kind == expected_kind => {
                self.last_failure = None;
                Ok(FetchedResult {
                    payload,
                    io_failure,
                })
            }
            Some(StoredResult::Ready { kind, .. }) => {
                self.last_failure = Some((handle, CallFailure::MismatchedKind));
                Err(TransportError::KindMismatch {
                    handle,
                    expected: expected_kind,
                    actual: kind,
                })
            }
            Some(StoredResult::Failed(reason)) => {
                self.last_failure = Some((handle, reason));
                Err(TransportError::Native(reason.to_string()))
            }
            None => {
                self.last_failure = Some((handle, CallFailure::InvalidHandle));
                Err(TransportError::ResultUnavailable(handle))
            }
        }
    }

    fn call_failure_reason(&self, handle: OperationHandle) -> CallFailure {
        match self.last_failure {
            Some((failed, reason)) if failed == handle => reason,
            _ => CallFailure::None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::decode_payload;

    #[test]
    fn issued_handles_are_valid_and_distinct() {
        let mut transport = LoopbackTransport::new();
        let a = transport.issue_call();
        let b = transport.issue_call();
        assert!(a.is_valid());
        assert_ne!(a, b);
    }

    #[test]
    fn events_are_fifo() {
        let mut transport = LoopbackTransport::new();
        transport.push_event(KindTag::new(1), vec![1u8]);
        transport.push_event(KindTag::new(2), vec![2u8]);

        let kinds: Vec<_> = std::iter::from_fn(|| transport.poll_event())
            .map(|e| e.kind.get())
            .collect();
        assert_eq!(kinds, vec![1, 2]);
        assert!(transport.poll_event().is_none());
    }

    #[test]
    fn complete_call_posts_completion_record() {
        let mut transport = LoopbackTransport::new();
        let handle = transport.issue_call();
        transport.complete_call(handle, KindTag::new(99), vec![0x2au8, 0, 0, 0], false);

        let Some(event) = transport.poll_event() else {
            panic!("completion event expected");
        };
        assert_eq!(event.kind, CALL_COMPLETED_KIND);
        let Ok(record) = decode_payload::<CallCompleted>(&event.payload) else {
            panic!("completion record should decode");
        };
        assert_eq!(record.handle, handle);
    }

    #[test]
    fn fetch_consumes_result() {
        let mut transport = LoopbackTransport::new();
        let handle = transport.issue_call();
        transport.complete_call(handle, KindTag::new(99), vec![1u8, 2, 3, 4], true);

        let Ok(fetched) = transport.fetch_async_result(handle, 4, KindTag::new(99)) else {
            panic!("fetch should succeed");
        };
        assert_eq!(fetched.payload.as_ref(), &[1, 2, 3, 4]);
        assert!(fetched.io_failure);
        assert!(!transport.has_result(handle));
        assert_eq!(
            transport.fetch_async_result(handle, 4, KindTag::new(99)),
            Err(TransportError::ResultUnavailable(handle))
        );
        assert_eq!(transport.call_failure_reason(handle), CallFailure::InvalidHandle);
    }

    #[test]
    fn fetch_with_wrong_kind_fails() {
        let mut transport = LoopbackTransport::new();
        let handle = transport.issue_call();
        transport.complete_call(handle, KindTag::new(99), vec![0u8; 4], false);

        let result = transport.fetch_async_result(handle, 4, KindTag::new(98));
        assert!(matches!(result, Err(TransportError::KindMismatch { .. })));
        assert_eq!(transport.call_failure_reason(handle), CallFailure::MismatchedKind);
    }

    #[test]
    fn failed_call_reports_reason() {
        let mut transport = LoopbackTransport::new();
        let handle = transport.issue_call();
        transport.fail_call(handle, CallFailure::NetworkFailure);

        assert!(transport.fetch_async_result(handle, 4, KindTag::new(99)).is_err());
        assert_eq!(transport.call_failure_reason(handle), CallFailure::NetworkFailure);
        assert_eq!(transport.fetch_count(), 1);
    }

    #[test]
    fn only_last_failure_is_kept() {
        let mut transport = LoopbackTransport::new();
        let first = transport.issue_call();
        let second = transport.issue_call();
        transport.fail_call(first, CallFailure::NetworkFailure);
        transport.fail_call(second, CallFailure::TransportGone);

        assert!(transport.fetch_async_result(first, 4, KindTag::new(99)).is_err());
        assert!(transport.fetch_async_result(second, 4, KindTag::new(99)).is_err());
        assert_eq!(transport.call_failure_reason(first), CallFailure::None);
        assert_eq!(transport.call_failure_reason(second), CallFailure::TransportGone);
        assert_eq!(transport.stored_results(), 0);
    }

    #[test]
    fn unfetched_result_is_dropped_on_next_poll() {
        let mut transport = LoopbackTransport::new();
        let handle = transport.issue_call();
        transport.complete_call(handle, KindTag::new(99), vec![1u8, 0, 0, 0], false);
        transport.push_event(KindTag::new(1), vec![0u8]);

        assert!(transport.poll_event().is_some());
        assert!(transport.has_result(handle));
        assert!(transport.poll_event().is_some());
        assert!(!transport.has_result(handle));
        assert_eq!(transport.stored_results(), 0);
    }
}

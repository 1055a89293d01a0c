//! Async result channel: a callback bound to one pending operation.
//!
//! A [`CallResult`] waits on at most one [`OperationHandle`] at a time.
//! Binding a new handle cancels the previous binding, and the binding
//! expires by itself once the dispatcher delivers the result.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::domain::{
    KindTag, OneShotSubscriber, OperationHandle, Payload, Registry, SlotKey, decode_payload,
    kind_tag_of,
};
use crate::error::DispatchError;

type ResultFn<P> = Rc<dyn Fn(P, bool)>;

struct CallResultState<P> {
    kind: KindTag,
    handle: Cell<OperationHandle>,
    slot: Cell<Option<SlotKey>>,
    func: RefCell<Option<ResultFn<P>>>,
}

impl<P: Payload> CallResultState<P> {
    fn has_callback(&self) -> bool {
        self.func.borrow().is_some()
    }

    fn run(&self, raw: &[u8], io_failure: bool) -> Result<(), DispatchError> {
        // The dispatcher has already dropped the registration by now.
        self.handle.set(OperationHandle::INVALID);
        self.slot.set(None);
        let value = decode_payload::<P>(raw)?;
        let func = self.func.borrow().as_ref().map(Rc::clone);
        if let Some(func) = func {
            func(value, io_failure);
        }
        Ok(())
    }
}

impl<P: Payload> OneShotSubscriber for CallResultState<P> {
    fn payload_size(&self) -> usize {
        P::SHAPE.size
    }

    fn kind(&self) -> KindTag {
        self.kind
    }

    fn resolve(&self, key: SlotKey, raw: &[u8], io_failure: bool) -> Result<bool, DispatchError> {
        if self.slot.get() != Some(key) {
            return Ok(false);
        }
        self.run(raw, io_failure).map(|()| true)
    }

    fn expire(&self, key: SlotKey) {
        if self.slot.get() == Some(key) {
            self.slot.set(None);
            self.handle.set(OperationHandle::INVALID);
        }
    }
}

impl<P: Payload> fmt::Debug for CallResultState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallResultState")
            .field("shape", &P::SHAPE.name)
            .field("kind", &self.kind)
            .field("handle", &self.handle.get())
            .field("slot", &self.slot.get())
            .finish_non_exhaustive()
    }
}

/// Callback waiting on the result of one asynchronous operation.
///
/// The callback receives the decoded result and the transport's I/O
/// failure flag. Dropping the `CallResult` cancels any pending binding.
pub struct CallResult<P: Payload> {
    registry: Registry,
    state: Rc<CallResultState<P>>,
}

impl<P: Payload> CallResult<P> {
    /// Creates an unbound call result without a callback.
    ///
    /// A callback must be supplied through [`CallResult::bind_with`]
    /// before the first bind.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownShapeKind`] if `P` has no kind tag.
    pub fn new(registry: &Registry) -> Result<Self, DispatchError> {
        let kind = kind_tag_of(&P::SHAPE)?;
        Ok(Self {
            registry: registry.clone(),
            state: Rc::new(CallResultState {
                kind,
                handle: Cell::new(OperationHandle::INVALID),
                slot: Cell::new(None),
                func: RefCell::new(None),
            }),
        })
    }

    /// Creates an unbound call result with a callback.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownShapeKind`] if `P` has no kind tag.
    pub fn with_callback<F>(registry: &Registry, func: F) -> Result<Self, DispatchError>
    where
        F: Fn(P, bool) + 'static,
    {
        let call = Self::new(registry)?;
        call.set_callback(func);
        Ok(call)
    }

    /// Creates a call result with a callback and binds it to `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownShapeKind`] if `P` has no kind tag.
    pub fn bound<F>(
        registry: &Registry,
        func: F,
        handle: OperationHandle,
    ) -> Result<Self, DispatchError>
    where
        F: Fn(P, bool) + 'static,
    {
        let mut call = Self::with_callback(registry, func)?;
        call.bind(handle)?;
        Ok(call)
    }

    /// Binds to `handle`, cancelling any current binding first.
    ///
    /// Binding to [`OperationHandle::INVALID`] only cancels.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoCallbackConfigured`] if no callback was
    /// ever supplied; the current binding is left untouched in that case.
    pub fn bind(&mut self, handle: OperationHandle) -> Result<(), DispatchError> {
        if !self.state.has_callback() {
            return Err(DispatchError::NoCallbackConfigured(P::SHAPE.name));
        }
        if self.state.handle.get().is_valid() {
            self.cancel();
        }
        self.state.handle.set(handle);
        if handle.is_valid() {
            let subscriber: Rc<dyn OneShotSubscriber> = Rc::<CallResultState<P>>::clone(&self.state);
            let key = self.registry.register_one_shot(subscriber, handle);
            self.state.slot.set(Some(key));
            tracing::debug!(%handle, shape = P::SHAPE.name, "call result bound");
        }
        Ok(())
    }

    /// Replaces the callback, then binds to `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`CallResult::bind`].
    pub fn bind_with<F>(&mut self, handle: OperationHandle, func: F) -> Result<(), DispatchError>
    where
        F: Fn(P, bool) + 'static,
    {
        self.set_callback(func);
        self.bind(handle)
    }

    /// Returns `true` while bound to a valid handle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.handle.get().is_valid()
    }

    /// Handle currently bound, or [`OperationHandle::INVALID`].
    #[must_use]
    pub fn handle(&self) -> OperationHandle {
        self.state.handle.get()
    }

    /// Kind tag of the expected result.
    #[must_use]
    pub fn kind(&self) -> KindTag {
        self.state.kind
    }

    /// Drops the current binding, if any. The callback will not fire for
    /// it. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        let handle = self.state.handle.replace(OperationHandle::INVALID);
        if !handle.is_valid() {
            return;
        }
        if let Some(key) = self.state.slot.take() {
            let _ = self.registry.unregister_one_shot(key, handle);
        }
        tracing::debug!(%handle, shape = P::SHAPE.name, "call result cancelled");
    }

    /// Decodes `raw` and runs the callback with `io_failure`.
    ///
    /// The binding is cleared before the callback runs, so the callback
    /// observes [`CallResult::is_active`] as `false` and may rebind.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PayloadSizeMismatch`] if `raw` is smaller
    /// than `P`'s shape.
    pub fn invoke(&self, raw: &[u8], io_failure: bool) -> Result<(), DispatchError> {
        if let Some(key) = self.state.slot.get() {
            let _ = self
                .registry
                .unregister_one_shot(key, self.state.handle.get());
        }
        self.state.run(raw, io_failure)
    }

    fn set_callback<F>(&self, func: F)
    where
        F: Fn(P, bool) + 'static,
    {
        let func: ResultFn<P> = Rc::new(func);
        *self.state.func.borrow_mut() = Some(func);
    }
}

impl<P: Payload> Drop for CallResult<P> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<P: Payload> fmt::Debug for CallResult<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallResult")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::cell::RefCell;

    use bytes::Buf;

    use super::*;
    use crate::domain::Shape;

    #[derive(Debug, PartialEq)]
    struct Ticket(u32);

    impl Payload for Ticket {
        const SHAPE: Shape = Shape::tagged("Ticket", 99, 4);

        fn decode(mut raw: &[u8]) -> Self {
            Self(raw.get_u32_le())
        }
    }

    type Log = Rc<RefCell<Vec<(u32, bool)>>>;

    fn recorder(log: &Log) -> impl Fn(Ticket, bool) + 'static {
        let log = Rc::clone(log);
        move |ticket, io| log.borrow_mut().push((ticket.0, io))
    }

    #[test]
    fn bind_without_callback_fails() {
        let registry = Registry::new();
        let Ok(mut call) = CallResult::<Ticket>::new(&registry) else {
            panic!("construction failed");
        };
        assert_eq!(
            call.bind(OperationHandle::new(1)),
            Err(DispatchError::NoCallbackConfigured("Ticket"))
        );
        assert!(!call.is_active());
        assert!(registry.pending_handles().is_empty());
    }

    #[test]
    fn bound_registers_under_handle() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(42)) else {
            panic!("bind failed");
        };
        assert!(call.is_active());
        assert_eq!(call.handle(), OperationHandle::new(42));
        assert_eq!(registry.one_shot_count(OperationHandle::new(42)), 1);
    }

    #[test]
    fn rebind_moves_registration() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(mut call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(1)) else {
            panic!("bind failed");
        };
        assert!(call.bind(OperationHandle::new(2)).is_ok());
        assert_eq!(registry.pending_handles(), vec![OperationHandle::new(2)]);
    }

    #[test]
    fn bind_invalid_is_cancel() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(mut call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(1)) else {
            panic!("bind failed");
        };
        assert!(call.bind(OperationHandle::INVALID).is_ok());
        assert!(!call.is_active());
        assert!(registry.pending_handles().is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(mut call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(1)) else {
            panic!("bind failed");
        };
        call.cancel();
        call.cancel();
        assert!(!call.is_active());
        assert!(registry.pending_handles().is_empty());
    }

    #[test]
    fn bind_with_supplies_late_callback() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(mut call) = CallResult::<Ticket>::new(&registry) else {
            panic!("construction failed");
        };
        assert!(call.bind_with(OperationHandle::new(5), recorder(&log)).is_ok());
        assert!(call.is_active());
    }

    #[test]
    fn invoke_clears_handle_before_callback() {
        let registry = Registry::new();
        let observed = Rc::new(Cell::new(None));
        let call_slot: Rc<RefCell<Option<CallResult<Ticket>>>> = Rc::new(RefCell::new(None));

        let probe = Rc::clone(&call_slot);
        let seen = Rc::clone(&observed);
        let Ok(call) = CallResult::bound(
            &registry,
            move |_ticket: Ticket, _io| {
                let active = probe.borrow().as_ref().map(CallResult::is_active);
                seen.set(active);
            },
            OperationHandle::new(3),
        ) else {
            panic!("bind failed");
        };
        *call_slot.borrow_mut() = Some(call);

        let result = call_slot
            .borrow()
            .as_ref()
            .map(|call| call.invoke(&[7, 0, 0, 0], false));
        assert_eq!(result, Some(Ok(())));
        assert_eq!(observed.get(), Some(false));
        call_slot.borrow_mut().take();
    }

    #[test]
    fn invoke_passes_failure_flag() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(3)) else {
            panic!("bind failed");
        };
        assert!(call.invoke(&[9, 0, 0, 0], true).is_ok());
        assert_eq!(*log.borrow(), vec![(9, true)]);
        assert!(registry.pending_handles().is_empty());
    }

    #[test]
    fn stale_key_does_not_resolve() {
        let registry = Registry::new();
        let log = Log::default();
        let Ok(mut call) = CallResult::bound(&registry, recorder(&log), OperationHandle::new(1)) else {
            panic!("bind failed");
        };
        let group = registry.take_one_shot(OperationHandle::new(1));
        call.cancel();
        for (key, member) in group {
            assert_eq!(member.resolve(key, &[1, 0, 0, 0], false), Ok(false));
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn drop_cancels() {
        let registry = Registry::new();
        let log = Log::default();
        {
            let _call = CallResult::bound(&registry, recorder(&log), OperationHandle::new(8));
            assert_eq!(registry.one_shot_count(OperationHandle::new(8)), 1);
        }
        assert!(registry.pending_handles().is_empty());
    }
}

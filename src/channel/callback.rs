//! Broadcast channel: one user callback for every event of a kind.

use std::fmt;
use std::rc::Rc;

use crate::domain::{
    BroadcastSubscriber, KindTag, Payload, Registry, SlotKey, decode_payload, kind_tag_of,
};
use crate::error::DispatchError;

struct BroadcastHandler<P> {
    kind: KindTag,
    func: Box<dyn Fn(P)>,
}

impl<P: Payload> BroadcastSubscriber for BroadcastHandler<P> {
    fn kind(&self) -> KindTag {
        self.kind
    }

    fn deliver(&self, raw: &[u8]) -> Result<(), DispatchError> {
        let value = decode_payload::<P>(raw)?;
        (self.func)(value);
        Ok(())
    }
}

impl<P: Payload> fmt::Debug for BroadcastHandler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHandler")
            .field("shape", &P::SHAPE.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Registration of a callback for every event of `P`'s kind.
///
/// The callback is registered on construction and unregistered when the
/// `Callback` is dropped or [`Callback::unregister`] is called. Once
/// unregistered it is never invoked by a dispatcher again.
pub struct Callback<P: Payload> {
    registry: Registry,
    handler: Rc<BroadcastHandler<P>>,
    key: Option<SlotKey>,
}

impl<P: Payload> Callback<P> {
    /// Registers `func` for every event of `P`'s kind.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownShapeKind`] if `P` has no kind tag.
    pub fn new<F>(registry: &Registry, func: F) -> Result<Self, DispatchError>
    where
        F: Fn(P) + 'static,
    {
        let kind = kind_tag_of(&P::SHAPE)?;
        let handler = Rc::new(BroadcastHandler {
            kind,
            func: Box::new(func),
        });
        let subscriber: Rc<dyn BroadcastSubscriber> = Rc::<BroadcastHandler<P>>::clone(&handler);
        let key = registry.register_broadcast(subscriber);
        tracing::debug!(%kind, shape = P::SHAPE.name, "callback registered");
        Ok(Self {
            registry: registry.clone(),
            handler,
            key: Some(key),
        })
    }

    /// Kind tag the callback listens to.
    #[must_use]
    pub fn kind(&self) -> KindTag {
        self.handler.kind
    }

    /// Returns `true` until the callback is unregistered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.key
            .is_some_and(|key| self.registry.is_broadcast_live(key))
    }

    /// Removes the callback from the registry. Calling it again is a no-op.
    pub fn unregister(&mut self) {
        if let Some(key) = self.key.take()
            && self.registry.unregister_broadcast(key)
        {
            tracing::debug!(kind = %self.handler.kind, shape = P::SHAPE.name, "callback unregistered");
        }
    }

    /// Decodes `raw` and runs the callback directly.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PayloadSizeMismatch`] if `raw` is smaller
    /// than `P`'s shape.
    pub fn invoke(&self, raw: &[u8]) -> Result<(), DispatchError> {
        self.handler.deliver(raw)
    }
}

impl<P: Payload> Drop for Callback<P> {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl<P: Payload> fmt::Debug for Callback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("shape", &P::SHAPE.name)
            .field("kind", &self.handler.kind)
            .field("key", &self.key)
            .finish()
    }
}

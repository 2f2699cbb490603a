//! Functions and types used to handle incoming connections and messages.
//! There is three main kinds of handlers: [connect], [message] and [disconnect].
//!
//! Handlers are stored in a [`Listeners`] registry embedded in each [`Namespace`](crate::ns::Namespace)
//! and [`Socket`](crate::socket::Socket). For a given event name they are invoked synchronously,
//! in registration order. Each registration returns a [`ListenerId`] that can later be used to
//! remove that exact handler.
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

pub mod connect;
pub mod disconnect;
pub mod message;

pub use connect::{ConnectMiddleware, ConnectionHandler, MiddlewareError};
pub use disconnect::{DisconnectHandler, ErrorHandler};
pub use message::MessageHandler;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A registry mapping event names to their ordered handlers.
pub(crate) struct Listeners<H: ?Sized> {
    next_id: AtomicU64,
    map: RwLock<HashMap<Cow<'static, str>, Vec<(ListenerId, Arc<H>)>>>,
}

impl<H: ?Sized> Default for Listeners<H> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: ?Sized> Listeners<H> {
    /// Appends a handler to the list of the given event.
    pub fn on(&self, event: impl Into<Cow<'static, str>>, handler: Arc<H>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.map
            .write()
            .unwrap()
            .entry(event.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes the handler registered with `id` for the given event.
    /// Returns false if there was no such handler.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut map = self.map.write().unwrap();
        let Some(handlers) = map.get_mut(event) else {
            return false;
        };
        let len = handlers.len();
        handlers.retain(|(i, _)| *i != id);
        let removed = handlers.len() != len;
        if handlers.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Returns a snapshot of the handlers of the given event.
    ///
    /// The lock is released before the handlers are called, so a handler can register
    /// or remove other handlers without deadlocking.
    pub fn get(&self, event: &str) -> Vec<Arc<H>> {
        self.map
            .read()
            .unwrap()
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn has(&self, event: &str) -> bool {
        self.map.read().unwrap().contains_key(event)
    }
}

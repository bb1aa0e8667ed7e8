//! Per-connection event surface.
//!
//! Every [`Connection`](super::Connection) owns one [`EventBus`].  Handlers
//! are registered by [`EventName`] and run on the connection's driver task in
//! emission order.  Nothing here is process-wide: two connections never see
//! each other's events.
//!
//! [`EventBus::shutdown`] waits for handlers running on other threads, so
//! once it returns no handler of that bus runs again.  A handler may shut
//! down its own bus.  A handler must not shut down a bus whose handlers are
//! running on another thread and waiting on it.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use craft_core::Message;

use super::ConnectionError;

/// Everything a connection reports to its subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// The socket connected.
    Connect,
    /// Emitted right after every `Connect`; hook for re-identification.
    Reconnect,
    /// Raw bytes of one delivery, before parsing.
    Data(Vec<u8>),
    /// One decoded protocol message.
    Command(Message),
    /// A flush pass emptied the outbound queue into the socket.
    Drain,
    /// The server closed its side of the connection.
    End,
    /// The socket was torn down.
    Close,
    /// No socket activity within the inactivity timeout.
    Timeout,
    /// A connect, socket, or parse failure.
    Error(Arc<ConnectionError>),
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::Connect => EventName::Connect,
            Event::Reconnect => EventName::Reconnect,
            Event::Data(_) => EventName::Data,
            Event::Command(msg) => EventName::Command(msg.code),
            Event::Drain => EventName::Drain,
            Event::End => EventName::End,
            Event::Close => EventName::Close,
            Event::Timeout => EventName::Timeout,
            Event::Error(_) => EventName::Error,
        }
    }
}

/// Key under which handlers subscribe.  Protocol commands are keyed by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connect,
    Reconnect,
    Data,
    Command(char),
    Drain,
    End,
    Close,
    Timeout,
    Error,
}

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with each matching event.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every event.
    filter: Option<EventName>,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscriptions: Vec<Subscription>,
    closed: bool,
}

thread_local! {
    /// Buses whose handlers are running on this thread.
    static EMITTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a bus as emitting on the current thread until dropped.
struct Emitting(usize);

impl Emitting {
    fn enter(key: usize) -> Self {
        EMITTING.with(|keys| keys.borrow_mut().push(key));
        Self(key)
    }

    fn active(key: usize) -> bool {
        EMITTING.with(|keys| keys.borrow().contains(&key))
    }
}

impl Drop for Emitting {
    fn drop(&mut self) {
        EMITTING.with(|keys| {
            let mut keys = keys.borrow_mut();
            if let Some(pos) = keys.iter().rposition(|k| *k == self.0) {
                keys.remove(pos);
            }
        });
    }
}

/// Subscriber registry shared between a connection handle and its driver.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    /// Held for reading while handlers run, for writing by `shutdown`.
    gate: Arc<RwLock<()>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events named `filter` (all events when `None`).
    ///
    /// Subscribing to a shut-down bus is a no-op; the returned id matches
    /// nothing.
    pub fn subscribe(&self, filter: Option<EventName>, once: bool, handler: Handler) -> SubscriptionId {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        if !state.closed {
            state.subscriptions.push(Subscription {
                id,
                filter,
                once,
                handler,
            });
        }
        id
    }

    /// Removes a subscription.  Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.subscriptions.len() != before
    }

    /// Delivers `event` to every matching handler and returns how many matched.
    ///
    /// Handlers run without the registry lock held, so they may subscribe,
    /// unsubscribe, send, or close the connection.
    pub fn emit(&self, event: &Event) -> usize {
        let key = self.key();
        let _gate = if Emitting::active(key) {
            None
        } else {
            Some(self.gate.read().unwrap_or_else(PoisonError::into_inner))
        };

        let name = event.name();
        let handlers: Vec<Handler> = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            let matched: Vec<Handler> = state
                .subscriptions
                .iter()
                .filter(|s| s.filter.map_or(true, |f| f == name))
                .map(|s| Arc::clone(&s.handler))
                .collect();
            state
                .subscriptions
                .retain(|s| !(s.once && s.filter.map_or(true, |f| f == name)));
            matched
        };

        let _running = Emitting::enter(key);
        for handler in &handlers {
            if self.is_shut_down() {
                break;
            }
            handler(event);
        }
        handlers.len()
    }

    /// Number of handlers that would receive an event named `name`.
    pub fn listener_count(&self, name: EventName) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.filter.map_or(true, |f| f == name))
            .count()
    }

    /// Drops every subscriber and silences all further emission.
    ///
    /// Blocks until handlers running on other threads have returned.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };
        drop(dropped);
        if !Emitting::active(self.key()) {
            drop(self.gate.write().unwrap_or_else(PoisonError::into_inner));
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().closed
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.gate) as usize
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

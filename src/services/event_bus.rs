//! Hierarchical publish/subscribe event bus.
//!
//! Each [`HierarchicalEventBus`] owns a namespace-keyed map of child buses
//! and a listener table keyed by event type plus a wildcard bucket. Emitting
//! an event fires local handlers synchronously, then bubbles up through
//! every ancestor, tagged with the originating namespace so listeners can
//! tell a bubbled event from a locally emitted one. A per-bus rate limiter
//! caps how many bubbles reach the parent per second, protecting a busy
//! parent from a single noisy child.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use governor::{Quota, RateLimiter};
use serde_json::{json, Value};

use crate::domain::error::{SubagentError, SubagentResult};
use crate::domain::models::limits::SubagentLimits;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// An event as observed by a listener: the type name, the payload, and —
/// for bubbled events — where it originated and that it is in fact bubbled.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    /// The event type string (e.g. `"subagent:spawn"`).
    pub event_type: String,
    /// The payload, tagged with `_source`/`_bubbled` if this is a bubble.
    pub data: Value,
    /// The namespace of the bus the event originated on, if bubbled.
    pub source: Option<String>,
    /// Whether this invocation is a bubbled delivery rather than local.
    pub bubbled: bool,
}

/// A listener callback. Returning `Err` logs a warning; it never aborts
/// sibling handlers or prevents bubbling.
pub type Handler = Box<dyn Fn(&EmittedEvent) -> Result<(), String> + Send + Sync>;

struct Listener {
    id: u64,
    handler: Handler,
}

const WILDCARD: &str = "*";

struct BusInner {
    session_id: String,
    namespace: Option<String>,
    parent: Option<Weak<BusInner>>,
    children: RwLock<HashMap<String, Arc<BusInner>>>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    limits: SubagentLimits,
    bubble_limiter: DirectRateLimiter,
    warned_this_window: AtomicBool,
    next_listener_id: AtomicU64,
}

/// A handle to one bus in the hierarchy. Cheaply cloneable; clones refer to
/// the same underlying bus.
#[derive(Clone)]
pub struct HierarchicalEventBus(Arc<BusInner>);

/// Returned by `subscribe`; call [`Subscription::unsubscribe`] to detach.
pub struct Subscription {
    bus: Weak<BusInner>,
    event_type: String,
    id: u64,
}

impl Subscription {
    /// Removes the associated listener. A no-op if the bus has since been
    /// dropped or the listener already removed.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut table = bus.listeners.write().expect("listener table lock poisoned");
            if let Some(list) = table.get_mut(&self.event_type) {
                list.retain(|listener| listener.id != self.id);
            }
        }
    }
}

fn make_limiter(max_bubbles_per_second: u32) -> DirectRateLimiter {
    let quota = Quota::per_second(
        std::num::NonZeroU32::new(max_bubbles_per_second.max(1))
            .expect("max_bubbles_per_second.max(1) is always nonzero"),
    );
    RateLimiter::direct(quota)
}

impl HierarchicalEventBus {
    /// Creates the root bus of a new hierarchy for the given session.
    pub fn new(session_id: impl Into<String>, limits: SubagentLimits) -> Self {
        Self(Arc::new(BusInner {
            session_id: session_id.into(),
            namespace: None,
            parent: None,
            children: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            bubble_limiter: make_limiter(limits.max_bubbles_per_second),
            limits,
            warned_this_window: AtomicBool::new(false),
            next_listener_id: AtomicU64::new(0),
        }))
    }

    /// The session id this bus (and its whole tree) was constructed with.
    pub fn session_id(&self) -> &str {
        &self.0.session_id
    }

    /// This bus's namespace under its parent, or `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.0.namespace.as_deref()
    }

    fn parent(&self) -> Option<HierarchicalEventBus> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(HierarchicalEventBus)
    }

    /// Creates a child bus under the given namespace.
    ///
    /// # Errors
    /// Returns [`SubagentError::DuplicateNamespace`] if the namespace is
    /// already taken among this bus's direct children.
    pub fn create_child(&self, namespace: impl Into<String>) -> SubagentResult<HierarchicalEventBus> {
        let namespace = namespace.into();
        let mut children = self.0.children.write().expect("children lock poisoned");
        if children.contains_key(&namespace) {
            return Err(SubagentError::DuplicateNamespace { namespace });
        }
        let child = Arc::new(BusInner {
            session_id: self.0.session_id.clone(),
            namespace: Some(namespace.clone()),
            parent: Some(Arc::downgrade(&self.0)),
            children: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            bubble_limiter: make_limiter(self.0.limits.max_bubbles_per_second),
            limits: self.0.limits,
            warned_this_window: AtomicBool::new(false),
            next_listener_id: AtomicU64::new(0),
        });
        children.insert(namespace, Arc::clone(&child));
        Ok(HierarchicalEventBus(child))
    }

    /// Subscribes to `event_type`, or to every event if `event_type == "*"`.
    ///
    /// # Errors
    /// Returns [`SubagentError::TooManyListeners`] once `maxListenersPerEvent`
    /// listeners are already registered for this type.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> SubagentResult<Subscription> {
        let mut table = self.0.listeners.write().expect("listener table lock poisoned");
        let list = table.entry(event_type.to_string()).or_default();
        if list.len() >= self.0.limits.max_listeners_per_event {
            return Err(SubagentError::TooManyListeners {
                event_type: event_type.to_string(),
                limit: self.0.limits.max_listeners_per_event,
            });
        }
        let id = self.0.next_listener_id.fetch_add(1, Ordering::Relaxed);
        list.push(Listener { id, handler });
        Ok(Subscription {
            bus: Arc::downgrade(&self.0),
            event_type: event_type.to_string(),
            id,
        })
    }

    /// Subscribes on this bus to events bubbled from the child named
    /// `namespace`, regardless of event type.
    ///
    /// # Errors
    /// Propagates [`SubagentError::TooManyListeners`] from the underlying
    /// wildcard subscription.
    pub fn on_namespaced(
        &self,
        namespace: impl Into<String>,
        handler: Handler,
    ) -> SubagentResult<Subscription> {
        let namespace = namespace.into();
        let filtered: Handler = Box::new(move |event| {
            if event.bubbled && event.source.as_deref() == Some(namespace.as_str()) {
                handler(event)
            } else {
                Ok(())
            }
        });
        self.subscribe(WILDCARD, filtered)
    }

    fn invoke_local(&self, event_type: &str, data: &Value, source: Option<&str>, bubbled: bool) {
        let event = EmittedEvent {
            event_type: event_type.to_string(),
            data: data.clone(),
            source: source.map(str::to_string),
            bubbled,
        };
        let table = self.0.listeners.read().expect("listener table lock poisoned");
        let keys: &[&str] = if event_type == WILDCARD {
            &[WILDCARD]
        } else {
            &[event_type, WILDCARD]
        };
        for key in keys {
            if let Some(list) = table.get(*key) {
                for listener in list {
                    if let Err(err) = (listener.handler)(&event) {
                        tracing::warn!(
                            bus = %self.0.session_id,
                            event_type,
                            error = %err,
                            "event bus handler returned an error"
                        );
                    }
                }
            }
        }
    }

    /// Emits `event_type` with `data`, firing local handlers and then
    /// bubbling to every ancestor.
    pub fn emit(&self, event_type: &str, data: Value) {
        self.invoke_local(event_type, &data, None, false);

        let Some(parent) = self.parent() else {
            return;
        };
        let Some(namespace) = self.0.namespace.clone() else {
            return;
        };

        if self.0.bubble_limiter.check().is_ok() {
            self.0.warned_this_window.store(false, Ordering::Relaxed);
            let tagged = tag_bubbled(data, &namespace);
            bubble_upward(&parent, event_type, tagged, &namespace);
        } else if !self.0.warned_this_window.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                bus = %self.0.session_id,
                namespace = %namespace,
                event_type,
                "anti-storm: bubble dropped, rate limit exceeded"
            );
        }
    }

    /// Emits `event_type` with `data` to every descendant (depth-first),
    /// never firing on the caller itself.
    pub fn broadcast(&self, event_type: &str, data: &Value) {
        let children = self.0.children.read().expect("children lock poisoned");
        for child in children.values() {
            let child_bus = HierarchicalEventBus(Arc::clone(child));
            child_bus.invoke_local(event_type, data, None, false);
            child_bus.broadcast(event_type, data);
        }
    }
}

fn tag_bubbled(data: Value, source: &str) -> Value {
    match data {
        Value::Object(mut map) => {
            map.insert("_source".to_string(), json!(source));
            map.insert("_bubbled".to_string(), json!(true));
            Value::Object(map)
        }
        other => json!({
            "_value": other,
            "_source": source,
            "_bubbled": true,
        }),
    }
}

fn bubble_upward(bus: &HierarchicalEventBus, event_type: &str, tagged: Value, source: &str) {
    bus.invoke_local(event_type, &tagged, Some(source), true);
    if let Some(parent) = bus.parent() {
        bubble_upward(&parent, event_type, tagged, source);
    }
}

//! Scoped event-listener registration.
//!
//! Interactions that need document-wide events (drag-resize, hover
//! affordances) acquire a [`ListenerScope`]. The scope registers listeners
//! with the host's [`EventHub`] and removes every one of them when it is
//! released or dropped, so no exit path can leave a global listener behind.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::nodes::{ElementId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Where a listener is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Document,
    /// The rendered table element of a table node
    Table(NodeId),
    /// The horizontally scrolling wrapper around a table
    TableScroller(NodeId),
    /// Any host-owned element (affordances, their buttons)
    Element(ElementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerMove,
    PointerUp,
    Click,
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Listener {
    pub target: EventTarget,
    pub kind: EventKind,
    pub capture: bool,
}

/// The host's listener registration surface (`addEventListener` /
/// `removeEventListener`)
pub trait EventHub {
    fn add_listener(&mut self, listener: Listener) -> ListenerId;
    /// Returns false when the id was not registered
    fn remove_listener(&mut self, id: ListenerId) -> bool;
}

pub type SharedHub = Rc<RefCell<dyn EventHub>>;

/// In-memory [`EventHub`] that tracks which listeners are live.
///
/// The editor checks it before delivering document-level events, so only
/// events some session listens for reach views and assistants. Tests use it
/// to prove sessions never leak registrations.
#[derive(Debug, Default)]
pub struct ListenerTable {
    next_id: u64,
    active: BTreeMap<ListenerId, Listener>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_listening(&self, target: EventTarget, kind: EventKind) -> bool {
        self.active
            .values()
            .any(|l| l.target == target && l.kind == kind)
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.active.values()
    }
}

impl EventHub for ListenerTable {
    fn add_listener(&mut self, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.active.insert(id, listener);
        id
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.active.remove(&id).is_some()
    }
}

/// A set of listeners whose lifetime is tied to one interaction session
pub struct ListenerScope {
    hub: SharedHub,
    ids: Vec<ListenerId>,
}

impl ListenerScope {
    pub fn new(hub: SharedHub) -> Self {
        Self {
            hub,
            ids: Vec::new(),
        }
    }

    /// Returns `None` when the hub is busy and nothing was registered
    pub fn listen(&mut self, target: EventTarget, kind: EventKind) -> Option<ListenerId> {
        self.register(Listener {
            target,
            kind,
            capture: false,
        })
    }

    /// Register in the capture phase, so the session sees events before
    /// inner elements can stop propagation
    pub fn listen_capture(
        &mut self,
        target: EventTarget,
        kind: EventKind,
    ) -> Option<ListenerId> {
        self.register(Listener {
            target,
            kind,
            capture: true,
        })
    }

    fn register(&mut self, listener: Listener) -> Option<ListenerId> {
        let Ok(mut hub) = self.hub.try_borrow_mut() else {
            log::warn!(
                "event hub busy, {:?} listener on {:?} not registered",
                listener.kind,
                listener.target
            );
            return None;
        };
        let id = hub.add_listener(listener);
        self.ids.push(id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remove every listener this scope registered. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        match self.hub.try_borrow_mut() {
            Ok(mut hub) => {
                for id in self.ids.drain(..) {
                    hub.remove_listener(id);
                }
            }
            Err(_) => {
                log::warn!(
                    "event hub busy, {} listeners could not be released",
                    self.ids.len()
                );
            }
        }
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        self.release();
    }
}

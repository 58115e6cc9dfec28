use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use geo::Coord;
use log::warn;

use directions_api::RouteResponse;

use crate::map::PointerEvent;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventType {
    /// Before a waypoint is inserted. Cancelable.
    AddWaypoint,
    WaypointAdded,
    /// Before a waypoint is removed. Cancelable.
    RemoveWaypoint,
    WaypointRemoved,
    /// Before a dragged waypoint's new position is committed. Cancelable.
    MoveWaypoint,
    WaypointMoved,
    /// Before a hoverpoint appears over the selected route. Cancelable.
    CreateHoverpoint,
    SetWaypoints,
    RotateWaypoints,
    /// Before a routing request is made. Cancelable.
    FetchRoutesStart,
    FetchRoutesEnd,
}

impl EventType {
    pub fn is_cancelable(self) -> bool {
        matches!(
            self,
            EventType::AddWaypoint
                | EventType::RemoveWaypoint
                | EventType::MoveWaypoint
                | EventType::CreateHoverpoint
                | EventType::FetchRoutesStart
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AddWaypoint => "addwaypoint",
            EventType::WaypointAdded => "waypointadded",
            EventType::RemoveWaypoint => "removewaypoint",
            EventType::WaypointRemoved => "waypointremoved",
            EventType::MoveWaypoint => "movewaypoint",
            EventType::WaypointMoved => "waypointmoved",
            EventType::CreateHoverpoint => "createhoverpoint",
            EventType::SetWaypoints => "setwaypoints",
            EventType::RotateWaypoints => "rotatewaypoints",
            EventType::FetchRoutesStart => "fetchroutesstart",
            EventType::FetchRoutesEnd => "fetchroutesend",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventData {
    None,
    Waypoint {
        index: usize,
    },
    MoveWaypoint {
        index: usize,
        initial_coordinates: Option<Coord>,
    },
    Hoverpoint {
        coord: Coord,
        leg_index: usize,
    },
    /// The raw service response, absent when the request failed.
    Routing {
        directions: Option<RouteResponse>,
    },
}

#[derive(Debug)]
pub struct Event {
    pub kind: EventType,
    pub data: EventData,
    /// The pointer event that caused this, if any
    pub original_event: Option<PointerEvent>,
    default_prevented: Cell<bool>,
}

impl Event {
    pub fn new(kind: EventType, data: EventData) -> Event {
        Event {
            kind,
            data,
            original_event: None,
            default_prevented: Cell::new(false),
        }
    }

    pub fn with_original(mut self, original: Option<PointerEvent>) -> Event {
        self.original_event = original;
        self
    }

    pub fn cancelable(&self) -> bool {
        self.kind.is_cancelable()
    }

    /// Stops the action this event announces. Only meaningful for cancelable events.
    pub fn prevent_default(&self) {
        if self.cancelable() {
            self.default_prevented.set(true);
        } else {
            warn!("prevent_default on {}, which isn't cancelable", self.kind.as_str());
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

pub type Listener = Rc<dyn Fn(&Event)>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

/// Synchronous publish/subscribe. Listeners may register or remove listeners (including
/// themselves) while being called.
#[derive(Default)]
pub struct Evented {
    next_id: Cell<u64>,
    listeners: RefCell<HashMap<EventType, Vec<(ListenerId, Listener)>>>,
    one_time_listeners: RefCell<HashMap<EventType, Vec<(ListenerId, Listener)>>>,
}

impl Evented {
    pub fn on<F: Fn(&Event) + 'static>(&self, kind: EventType, listener: F) -> ListenerId {
        let id = self.next_listener_id();
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Registers a listener called at most once.
    pub fn once<F: Fn(&Event) + 'static>(&self, kind: EventType, listener: F) -> ListenerId {
        let id = self.next_listener_id();
        self.one_time_listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener registered with `on` or `once`. Does nothing if it's already gone.
    pub fn off(&self, kind: EventType, id: ListenerId) {
        for store in [&self.listeners, &self.one_time_listeners] {
            if let Some(list) = store.borrow_mut().get_mut(&kind) {
                list.retain(|(x, _)| *x != id);
            }
        }
    }

    /// Calls one-time listeners, then persistent ones. Returns false only if a cancelable event
    /// had its default prevented.
    pub fn fire(&self, event: &Event) -> bool {
        // Take the one-time list before calling anything, so listeners registering new one-time
        // listeners don't get them fired now
        let one_time = self
            .one_time_listeners
            .borrow_mut()
            .remove(&event.kind)
            .unwrap_or_default();
        for (_, listener) in one_time {
            listener(event);
        }

        let persistent: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&event.kind)
            .map(|list| list.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for listener in persistent {
            listener(event);
        }

        !event.default_prevented()
    }

    fn next_listener_id(&self) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ListenerId(id)
    }
}

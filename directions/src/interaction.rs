//! Pointer handling. The host forwards its map's pointer events here; each handler only acts in
//! the modes where the corresponding listener would be active.

use anyhow::Result;
use geo::Coord;
use geojson::JsonObject;
use log::{debug, warn};

use crate::events::{Event, EventData, EventType};
use crate::features::PointKind;
use crate::map::{Cursor, MapHost, PointerEvent, PointerSource};
use crate::state::{exceeds_threshold, Category, Drag, DragSubject, Hover, Mode};
use crate::MapDirections;

const HOVER_PRIORITY: [Category; 4] = [
    Category::Waypoint,
    Category::Snappoint,
    Category::Routeline,
    Category::AltRouteline,
];
const DRAG_PRIORITY: [Category; 3] = [
    Category::Waypoint,
    Category::Snappoint,
    Category::Routeline,
];
const CLICK_PRIORITY: [Category; 4] = [
    Category::Waypoint,
    Category::Snappoint,
    Category::AltRouteline,
    Category::Routeline,
];

enum DragOutcome {
    Nothing,
    // Back where it started, but the routes show where it was dragged
    Reroute { index: usize },
    MoveWaypoint {
        id: String,
        index: usize,
        initial: Coord,
        refreshed: bool,
    },
    InsertWaypoint {
        coord: Coord,
        index: usize,
        profile: Option<String>,
    },
}

impl<M: MapHost> MapDirections<M> {
    /// Mouse move, or a touch starting. Highlights whatever is under the pointer.
    pub fn on_move(&self, e: PointerEvent) {
        let create_hoverpoint = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if !state.interactive || matches!(state.mode, Mode::Dragging(_)) {
                return;
            }

            let hit = state.hit_test(&self.config, e.point, &HOVER_PRIORITY);
            state.clear_highlights();
            let mut create_hoverpoint = None;

            match hit {
                Some((Category::Waypoint, feature)) | Some((Category::Snappoint, feature)) => {
                    let found = feature.id().and_then(|id| {
                        state
                            .waypoint_index(id)
                            .map(|idx| (idx, Hover::Waypoint(idx)))
                            .or_else(|| {
                                state
                                    .snappoint_index(id)
                                    .map(|idx| (idx, Hover::Snappoint(idx)))
                            })
                    });
                    if let Some((idx, hover)) = found {
                        state.highlight_pair(idx);
                        state.mode = Mode::Hovering(hover);
                    }
                    state.hoverpoint = None;
                    state.map.set_cursor(Cursor::Pointer);
                    state.map.set_drag_pan(false);
                }
                Some((Category::Routeline, feature)) => {
                    let leg = feature
                        .id()
                        .and_then(|id| state.find_leg(id).map(|leg| (id.to_string(), leg)));
                    if let Some((leg_id, (_, leg_index))) = leg {
                        state.highlight_leg(&leg_id);
                        let props = state.hoverpoint_properties(leg_index);
                        match state.hoverpoint {
                            Some(ref mut hoverpoint) => {
                                hoverpoint.coord = e.lng_lat;
                                hoverpoint.properties = props;
                            }
                            None => create_hoverpoint = Some((leg_index, props)),
                        }
                        state.mode = Mode::Hovering(Hover::Routeline(leg_id));
                    }
                    state.map.set_cursor(Cursor::Pointer);
                    state.map.set_drag_pan(false);
                }
                Some((Category::AltRouteline, feature)) => {
                    if let Some(leg_id) = feature.id() {
                        state.highlight_leg(leg_id);
                        state.mode = Mode::Hovering(Hover::AltRouteline(leg_id.to_string()));
                    }
                    state.hoverpoint = None;
                    state.map.set_cursor(Cursor::Pointer);
                }
                None => {
                    state.hoverpoint = None;
                    state.mode = Mode::Neutral;
                    state.map.set_cursor(Cursor::Default);
                    state.map.set_drag_pan(true);
                }
            }
            create_hoverpoint
        };

        if let Some((leg_index, props)) = create_hoverpoint {
            self.create_hoverpoint(e, leg_index, props);
        }
        self.draw(true);
    }

    fn create_hoverpoint(&self, e: PointerEvent, leg_index: usize, props: JsonObject) {
        let event = Event::new(
            EventType::CreateHoverpoint,
            EventData::Hoverpoint {
                coord: e.lng_lat,
                leg_index,
            },
        )
        .with_original(Some(e));
        if !self.fire(event) {
            return;
        }
        let hoverpoint = self
            .builders
            .build_point(e.lng_lat, PointKind::Hoverpoint, Some(props));
        self.state.borrow_mut().hoverpoint = Some(hoverpoint);
    }

    /// Mouse down, or a touch starting. Captures whatever a drag would move.
    pub fn on_drag_down(&self, e: PointerEvent) {
        if !e.is_primary() {
            return;
        }
        let hoverpoint_needed = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if !state.interactive || matches!(state.mode, Mode::Dragging(_)) {
                return;
            }

            let mut hoverpoint_needed = None;
            let subject = match state.hit_test(&self.config, e.point, &DRAG_PRIORITY) {
                Some((Category::Waypoint, feature)) | Some((Category::Snappoint, feature)) => {
                    // Dragging a snappoint drags its waypoint
                    let index = feature.id().and_then(|id| {
                        state
                            .waypoint_index(id)
                            .or_else(|| state.snappoint_index(id))
                    });
                    match index.and_then(|idx| state.waypoints.get(idx)) {
                        Some(waypoint) => DragSubject::Waypoint {
                            id: waypoint.id.clone(),
                            initial: waypoint.coord,
                        },
                        None => DragSubject::Nothing,
                    }
                }
                Some((Category::Routeline, feature)) => {
                    match feature.id().and_then(|id| state.find_leg(id)) {
                        Some((_, depart_index)) => {
                            state.clear_highlights();
                            if let Some(snappoint) = state.snappoints.get_mut(depart_index) {
                                snappoint.highlight = true;
                            }
                            if let Some(snappoint) = state.snappoints.get_mut(depart_index + 1) {
                                snappoint.highlight = true;
                            }
                            if state.hoverpoint.is_none() {
                                hoverpoint_needed =
                                    Some((depart_index, state.hoverpoint_properties(depart_index)));
                            }
                            DragSubject::Routeline { depart_index }
                        }
                        None => DragSubject::Nothing,
                    }
                }
                _ => DragSubject::Nothing,
            };

            if subject != DragSubject::Nothing {
                state.map.set_drag_pan(false);
            }
            debug!("Drag started on {:?}", subject);
            state.mode = Mode::Dragging(Drag {
                down: e.point,
                subject,
                refreshed: false,
            });
            hoverpoint_needed
        };

        // A touch never hovered first
        if let Some((leg_index, props)) = hoverpoint_needed {
            self.create_hoverpoint(e, leg_index, props);
        }
        self.draw(true);
    }

    /// Mouse or touch move while dragging. Moves the captured point, and optionally re-routes
    /// once the pointer pauses.
    pub async fn on_drag_move(&self, e: PointerEvent) -> Result<()> {
        if !e.is_primary() {
            return Ok(());
        }
        let refresh = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let Mode::Dragging(ref drag) = state.mode else {
                return Ok(());
            };
            match drag.subject {
                DragSubject::Waypoint { ref id, .. } => {
                    if let Some(waypoint) = state.waypoints.iter_mut().find(|x| &x.id == id) {
                        waypoint.coord = e.lng_lat;
                    }
                    self.config.refresh_on_move
                        && exceeds_threshold(self.config.drag_threshold, drag.down, e.point)
                }
                DragSubject::Routeline { .. } => {
                    if let Some(ref mut hoverpoint) = state.hoverpoint {
                        hoverpoint.coord = e.lng_lat;
                    }
                    false
                }
                DragSubject::Nothing => false,
            }
        };
        self.draw(true);

        if refresh {
            self.refresh_after_pause(e).await;
        }
        Ok(())
    }

    // Only the last of a burst of moves re-routes
    async fn refresh_after_pause(&self, e: PointerEvent) {
        let sequence = {
            let mut state = self.state.borrow_mut();
            state.drag_moves += 1;
            state.drag_moves
        };
        tokio::time::sleep(self.config.refresh_debounce).await;

        let index = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if state.drag_moves != sequence {
                return;
            }
            match state.mode {
                Mode::Dragging(Drag {
                    subject: DragSubject::Waypoint { ref id, .. },
                    ref mut refreshed,
                    ..
                }) => {
                    *refreshed = true;
                    state
                        .waypoints
                        .iter()
                        .position(|x| &x.id == id)
                }
                _ => None,
            }
        };
        let Some(index) = index else {
            return;
        };

        self.fire(
            Event::new(
                EventType::WaypointMoved,
                EventData::MoveWaypoint {
                    index,
                    initial_coordinates: None,
                },
            )
            .with_original(Some(e)),
        );
        if let Err(err) = self.fetch_directions().await {
            warn!("Refreshing routes mid-drag failed: {:#}", err);
        }
    }

    /// Mouse up or touch end. Commits the drag if it went far enough.
    pub async fn on_drag_up(&self, e: PointerEvent) -> Result<()> {
        if let PointerSource::Mouse { button } = e.source {
            if button != 0 {
                return Ok(());
            }
        }

        let outcome = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let drag = match std::mem::replace(&mut state.mode, Mode::Neutral) {
                Mode::Dragging(drag) => drag,
                other => {
                    state.mode = other;
                    return Ok(());
                }
            };
            let moved = exceeds_threshold(self.config.drag_threshold, drag.down, e.point);

            let outcome = match drag.subject {
                DragSubject::Waypoint { id, initial } => match state.waypoint_index(&id) {
                    Some(index) if moved => {
                        state.waypoints[index].coord = e.lng_lat;
                        DragOutcome::MoveWaypoint {
                            id,
                            index,
                            initial,
                            refreshed: drag.refreshed,
                        }
                    }
                    Some(index) => {
                        state.waypoints[index].coord = initial;
                        if drag.refreshed {
                            DragOutcome::Reroute { index }
                        } else {
                            DragOutcome::Nothing
                        }
                    }
                    None => DragOutcome::Nothing,
                },
                DragSubject::Routeline { depart_index } => {
                    let hoverpoint = state.hoverpoint.take();
                    if moved && hoverpoint.is_some() {
                        DragOutcome::InsertWaypoint {
                            coord: e.lng_lat,
                            index: depart_index + 1,
                            profile: state
                                .waypoints
                                .get(depart_index)
                                .and_then(|x| x.profile())
                                .map(|x| x.to_string()),
                        }
                    } else {
                        DragOutcome::Nothing
                    }
                }
                DragSubject::Nothing => DragOutcome::Nothing,
            };

            state.clear_highlights();
            state.map.set_drag_pan(true);
            outcome
        };
        self.draw(true);

        match outcome {
            DragOutcome::Nothing => Ok(()),
            DragOutcome::Reroute { index } => self.reroute_rolled_back(index, e).await,
            DragOutcome::MoveWaypoint {
                id,
                index,
                initial,
                refreshed,
            } => {
                let before = Event::new(
                    EventType::MoveWaypoint,
                    EventData::MoveWaypoint {
                        index,
                        initial_coordinates: Some(initial),
                    },
                )
                .with_original(Some(e));
                if !self.fire(before) {
                    debug!("Moving waypoint {} was prevented", index);
                    self.restore_waypoint(&id, initial);
                    if refreshed {
                        return self.reroute_rolled_back(index, e).await;
                    }
                    return Ok(());
                }

                self.fire(
                    Event::new(
                        EventType::WaypointMoved,
                        EventData::MoveWaypoint {
                            index,
                            initial_coordinates: Some(initial),
                        },
                    )
                    .with_original(Some(e)),
                );
                if let Err(err) = self.fetch_directions().await {
                    self.restore_waypoint(&id, initial);
                    if refreshed {
                        if let Err(err) = self.reroute_rolled_back(index, e).await {
                            warn!("Re-routing the restored waypoint failed: {:#}", err);
                        }
                    }
                    return Err(err);
                }
                Ok(())
            }
            DragOutcome::InsertWaypoint {
                coord,
                index,
                profile,
            } => {
                self.add_waypoint_with(coord, Some(index), profile, Some(e))
                    .await
            }
        }
    }

    // A live refresh already announced and routed the abandoned position
    async fn reroute_rolled_back(&self, index: usize, e: PointerEvent) -> Result<()> {
        self.fire(
            Event::new(
                EventType::WaypointMoved,
                EventData::MoveWaypoint {
                    index,
                    initial_coordinates: None,
                },
            )
            .with_original(Some(e)),
        );
        self.fetch_directions().await
    }

    fn restore_waypoint(&self, id: &str, coord: Coord) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(index) = state.waypoint_index(id) {
                state.waypoints[index].coord = coord;
            }
        }
        self.draw(true);
    }

    /// A click (not the end of a drag). Removes the waypoint or snappoint clicked, selects the
    /// alternative route clicked, or adds a waypoint at the end.
    pub async fn on_click(&self, e: PointerEvent) -> Result<()> {
        let hit = {
            let state = self.state.borrow();
            if !state.interactive {
                return Ok(());
            }
            state.hit_test(&self.config, e.point, &CLICK_PRIORITY)
        };

        match hit {
            Some((Category::Waypoint, feature)) | Some((Category::Snappoint, feature)) => {
                let index = {
                    let state = self.state.borrow();
                    feature.id().and_then(|id| {
                        state
                            .waypoint_index(id)
                            .or_else(|| state.snappoint_index(id))
                    })
                };
                match index {
                    Some(index) => self.remove_waypoint_with(index, Some(e)).await,
                    None => Ok(()),
                }
            }
            Some((Category::AltRouteline, feature)) => {
                {
                    let mut state = self.state.borrow_mut();
                    if let Some((route_index, _)) = feature.id().and_then(|id| state.find_leg(id))
                    {
                        debug!("Selecting route {}", route_index);
                        state.selected_route_index = route_index;
                    }
                }
                self.draw(false);
                Ok(())
            }
            // The selected route is already selected
            Some((Category::Routeline, _)) => Ok(()),
            None => {
                self.add_waypoint_with(e.lng_lat, None, None, Some(e))
                    .await
            }
        }
    }
}

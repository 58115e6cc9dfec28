//! Interactive routing on a web map. Attach a [`MapDirections`] to a [`MapHost`], forward pointer
//! events to it, and it places waypoints, asks a routing service for routes between them, and
//! keeps a GeoJSON source with everything to draw up to date.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use geo::Coord;
use geojson::{Feature, JsonObject};
use log::{debug, info};

pub use directions_api::{RouteResponse, Snappoint};

pub use self::config::{build_configuration, Configuration, ConfigurationInput};
pub use self::events::{Event, EventData, EventType, Evented, ListenerId};
pub use self::features::{PointFeature, PointKind, RouteTag, RoutelineSegment};
pub use self::layers::{layers_factory, Layer, LayerRole};
pub use self::map::{Cursor, MapHost, PointerEvent, PointerSource, RenderedFeature, ScreenPoint};
pub use self::request::{
    build_request, Bearing, HttpRoutingClient, Method, RouteRequest, RoutingClient,
};

use self::state::{Mode, State};

mod config;
mod events;
mod features;
mod fetch;
mod helpers;
mod interaction;
mod layers;
mod map;
mod request;
mod state;

/// The construction steps a caller may replace, such as to attach extra properties to every
/// waypoint or to talk to a service with a different URL scheme.
pub trait Builders {
    fn build_point(
        &self,
        coord: Coord,
        kind: PointKind,
        properties: Option<JsonObject>,
    ) -> PointFeature {
        features::build_point(coord, kind, properties)
    }

    fn build_routelines(
        &self,
        request_options: &BTreeMap<String, String>,
        routes: &[directions_api::Route],
        selected_route_index: usize,
        snappoints: &[PointFeature],
    ) -> Vec<Vec<RoutelineSegment>> {
        features::build_routelines(request_options, routes, selected_route_index, snappoints)
    }

    fn build_request(
        &self,
        config: &Configuration,
        profile: &str,
        coords: &[Coord],
        bearings: Option<&[Option<Bearing>]>,
    ) -> RouteRequest {
        request::build_request(config, profile, coords, bearings)
    }
}

pub struct DefaultBuilders;

impl Builders for DefaultBuilders {}

/// One attachment of the routing engine to one map. Cloning gives another handle to the same
/// attachment.
///
/// Everything runs on one thread. Methods that route are async; while one is pending, starting
/// another supersedes it.
pub struct MapDirections<M: MapHost> {
    config: Rc<Configuration>,
    client: Rc<dyn RoutingClient>,
    builders: Rc<dyn Builders>,
    state: Rc<RefCell<State<M>>>,
    events: Rc<Evented>,
}

impl<M: MapHost> Clone for MapDirections<M> {
    fn clone(&self) -> Self {
        MapDirections {
            config: self.config.clone(),
            client: self.client.clone(),
            builders: self.builders.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }
}

impl<M: MapHost> MapDirections<M> {
    /// Adds the source and the configured layers to the map. Fails if any of them already exist,
    /// such as when attaching twice to the same map without destroying the first attachment.
    ///
    /// Starts non-interactive; call `set_interactive(true)` to respond to pointer events.
    pub fn new(
        map: M,
        config: Configuration,
        client: Rc<dyn RoutingClient>,
    ) -> Result<MapDirections<M>> {
        MapDirections::with_builders(map, config, client, Rc::new(DefaultBuilders))
    }

    pub fn with_builders(
        mut map: M,
        config: Configuration,
        client: Rc<dyn RoutingClient>,
        builders: Rc<dyn Builders>,
    ) -> Result<MapDirections<M>> {
        if map.has_source(&config.source_name) {
            bail!(
                "The map already has a source called {}; is directions already attached?",
                config.source_name
            );
        }
        for layer in &config.layers {
            if map.has_layer(&layer.id) {
                bail!("The map already has a layer called {}", layer.id);
            }
        }

        map.add_source(&config.source_name);
        for layer in &config.layers {
            map.add_layer(layer);
        }
        info!(
            "Attached to the map with {} layers, routing with {}",
            config.layers.len(),
            config.api
        );

        let directions = MapDirections {
            config: Rc::new(config),
            client,
            builders,
            state: Rc::new(RefCell::new(State::new(map))),
            events: Rc::new(Evented::default()),
        };
        directions.draw(false);
        Ok(directions)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Don't hold onto this across calls into the engine.
    pub fn map(&self) -> Ref<'_, M> {
        Ref::map(self.state.borrow(), |state| &state.map)
    }

    /// Don't hold onto this across calls into the engine.
    pub fn map_mut(&self) -> RefMut<'_, M> {
        RefMut::map(self.state.borrow_mut(), |state| &mut state.map)
    }

    pub fn on<F: Fn(&Event) + 'static>(&self, kind: EventType, listener: F) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn once<F: Fn(&Event) + 'static>(&self, kind: EventType, listener: F) -> ListenerId {
        self.events.once(kind, listener)
    }

    pub fn off(&self, kind: EventType, id: ListenerId) {
        self.events.off(kind, id)
    }

    /// Returns false if a listener prevented the default action.
    fn fire(&self, event: Event) -> bool {
        debug!("Firing {}", event.kind.as_str());
        self.events.fire(&event)
    }

    pub fn interactive(&self) -> bool {
        self.state.borrow().interactive
    }

    /// Whether pointer events are handled. While routes are being fetched, the engine is
    /// temporarily non-interactive; setting this during a fetch also decides what to restore
    /// afterwards.
    pub fn set_interactive(&self, interactive: bool) {
        let mut state = self.state.borrow_mut();
        state.interactive = interactive;
        if let Some(ref mut pending) = state.pending {
            pending.interactive_before = interactive;
        }
    }

    pub fn waypoints(&self) -> Vec<Coord> {
        self.state.borrow().waypoint_coords()
    }

    /// Where the service placed each waypoint on its network. Empty until routes are fetched.
    pub fn snappoints(&self) -> Vec<Coord> {
        self.state.borrow().snappoint_coords()
    }

    pub fn waypoint_features(&self) -> Vec<Feature> {
        let state = self.state.borrow();
        state.waypoints.iter().map(|x| x.to_geojson()).collect()
    }

    pub fn snappoint_features(&self) -> Vec<Feature> {
        let state = self.state.borrow();
        state.snappoints.iter().map(|x| x.to_geojson()).collect()
    }

    /// One list of segments per route, the selected one included.
    pub fn routelines(&self) -> Vec<Vec<Feature>> {
        let state = self.state.borrow();
        state
            .routelines
            .iter()
            .map(|route| route.iter().map(|x| x.to_geojson()).collect())
            .collect()
    }

    pub fn selected_route_index(&self) -> usize {
        self.state.borrow().selected_route_index
    }

    pub fn hoverpoint(&self) -> Option<Feature> {
        self.state.borrow().hoverpoint.as_ref().map(|x| x.to_geojson())
    }

    pub fn waypoints_bearings(&self) -> Vec<Option<Bearing>> {
        self.state.borrow().waypoint_bearings()
    }

    /// Sets one bearing per waypoint and re-routes. Only allowed if bearings are enabled.
    pub async fn set_waypoints_bearings(&self, bearings: Vec<Option<Bearing>>) -> Result<()> {
        if !self.config.bearings {
            bail!("Bearings are disabled; enable them in the configuration first");
        }
        {
            let mut state = self.state.borrow_mut();
            if bearings.len() != state.waypoints.len() {
                bail!(
                    "Got {} bearings for {} waypoints",
                    bearings.len(),
                    state.waypoints.len()
                );
            }
            for (waypoint, bearing) in state.waypoints.iter_mut().zip(bearings) {
                match bearing {
                    Some(bearing) => {
                        waypoint
                            .properties
                            .insert("bearing".to_string(), serde_json::to_value(bearing)?);
                    }
                    None => {
                        waypoint.properties.remove("bearing");
                    }
                }
            }
        }
        self.draw(true);
        self.fire(Event::new(EventType::RotateWaypoints, EventData::None));
        self.fetch_directions().await
    }

    /// Replaces every waypoint and re-routes. `profiles` gives the profile of each leg, so it must
    /// have one entry fewer than `coords`.
    pub async fn set_waypoints(
        &self,
        coords: Vec<Coord>,
        profiles: Option<Vec<String>>,
    ) -> Result<()> {
        if let Some(ref profiles) = profiles {
            if profiles.len() + 1 != coords.len() {
                bail!(
                    "Got {} profiles for {} waypoints; need one per leg",
                    profiles.len(),
                    coords.len()
                );
            }
        }

        let waypoints: Vec<PointFeature> = coords
            .into_iter()
            .enumerate()
            .map(|(idx, coord)| {
                let properties = profiles
                    .as_ref()
                    .and_then(|list| list.get(idx))
                    .map(|profile| profile_properties(profile));
                self.builders
                    .build_point(coord, PointKind::Waypoint, properties)
            })
            .collect();
        {
            let mut state = self.state.borrow_mut();
            state.waypoints = waypoints;
            state.snappoints.clear();
            state.routelines.clear();
            state.hoverpoint = None;
            state.assign_categories();
        }
        self.draw(false);
        self.fire(Event::new(EventType::SetWaypoints, EventData::None));
        self.fetch_directions().await
    }

    /// Inserts a waypoint at `index`, or at the end, then re-routes.
    pub async fn add_waypoint(&self, coord: Coord, index: Option<usize>) -> Result<()> {
        self.add_waypoint_with(coord, index, None, None).await
    }

    async fn add_waypoint_with(
        &self,
        coord: Coord,
        index: Option<usize>,
        profile: Option<String>,
        original_event: Option<PointerEvent>,
    ) -> Result<()> {
        let index = {
            let len = self.state.borrow().waypoints.len();
            index.unwrap_or(len).min(len)
        };
        let before = Event::new(EventType::AddWaypoint, EventData::Waypoint { index })
            .with_original(original_event);
        if !self.fire(before) {
            debug!("Adding waypoint {} was prevented", index);
            return Ok(());
        }

        let waypoint = self.builders.build_point(
            coord,
            PointKind::Waypoint,
            profile.as_deref().map(profile_properties),
        );
        {
            let mut state = self.state.borrow_mut();
            // A listener might have changed the list
            let index = index.min(state.waypoints.len());
            state.waypoints.insert(index, waypoint);
            state.assign_categories();
        }
        self.draw(true);
        self.fire(
            Event::new(EventType::WaypointAdded, EventData::Waypoint { index })
                .with_original(original_event),
        );
        self.fetch_directions().await
    }

    /// Removes a waypoint and its snappoint, then re-routes.
    pub async fn remove_waypoint(&self, index: usize) -> Result<()> {
        self.remove_waypoint_with(index, None).await
    }

    async fn remove_waypoint_with(
        &self,
        index: usize,
        original_event: Option<PointerEvent>,
    ) -> Result<()> {
        let len = self.state.borrow().waypoints.len();
        if index >= len {
            bail!("Can't remove waypoint {}; there are only {}", index, len);
        }
        let before = Event::new(EventType::RemoveWaypoint, EventData::Waypoint { index })
            .with_original(original_event);
        if !self.fire(before) {
            debug!("Removing waypoint {} was prevented", index);
            return Ok(());
        }

        {
            let mut state = self.state.borrow_mut();
            if index >= state.waypoints.len() {
                return Ok(());
            }
            state.waypoints.remove(index);
            if index < state.snappoints.len() {
                state.snappoints.remove(index);
            }
            state.hoverpoint = None;
            state.assign_categories();
        }
        self.draw(true);
        self.fire(
            Event::new(EventType::WaypointRemoved, EventData::Waypoint { index })
                .with_original(original_event),
        );
        self.fetch_directions().await
    }

    /// Cancels any request in flight. Nothing it would have changed is applied.
    pub fn abort(&self) {
        let mut state = self.state.borrow_mut();
        let restore = state.abort_pending();
        state.restore_interactive(restore);
    }

    /// Removes every waypoint, snappoint and route.
    pub fn clear(&self) {
        {
            let mut state = self.state.borrow_mut();
            let restore = state.abort_pending();
            state.restore_interactive(restore);
            state.waypoints.clear();
            state.snappoints.clear();
            state.routelines.clear();
            state.hoverpoint = None;
            state.selected_route_index = 0;
            state.mode = Mode::Neutral;
        }
        self.draw(false);
    }

    /// Detaches from the map, removing the source and layers. The attachment is useless
    /// afterwards.
    pub fn destroy(&self) {
        self.state.borrow_mut().destroying = true;
        self.clear();

        let mut state = self.state.borrow_mut();
        state.interactive = false;
        state.map.set_cursor(Cursor::Default);
        state.map.set_drag_pan(true);
        for layer in &self.config.layers {
            if state.map.has_layer(&layer.id) {
                state.map.remove_layer(&layer.id);
            }
        }
        if state.map.has_source(&self.config.source_name) {
            state.map.remove_source(&self.config.source_name);
        }
        info!("Detached from the map");
    }

    /// Pushes the current state to the map. Pass true to skip re-tagging the selected route, when
    /// only points or highlights changed.
    pub fn draw(&self, skip_selected_route_redraw: bool) {
        self.state
            .borrow_mut()
            .draw(&self.config, skip_selected_route_redraw);
    }
}

fn profile_properties(profile: &str) -> JsonObject {
    let mut props = JsonObject::new();
    props.insert("profile".to_string(), profile.into());
    props
}

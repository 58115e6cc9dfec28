use futures::future::AbortHandle;
use geo::Coord;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

use crate::config::Configuration;
use crate::features::{build_snaplines, PointFeature, RouteTag, RoutelineSegment};
use crate::map::{MapHost, RenderedFeature, ScreenPoint};
use crate::request::Bearing;

/// Everything one attachment mutates. Only ever borrowed for the duration of a synchronous step;
/// never across an await or while firing events.
pub(crate) struct State<M> {
    pub map: M,
    pub waypoints: Vec<PointFeature>,
    // Paired with waypoints by index, once a fetch has succeeded
    pub snappoints: Vec<PointFeature>,
    pub routelines: Vec<Vec<RoutelineSegment>>,
    pub selected_route_index: usize,
    pub hoverpoint: Option<PointFeature>,
    pub interactive: bool,
    pub mode: Mode,
    pub pending: Option<PendingFetch>,
    pub destroying: bool,
    pub next_fetch_id: u64,
    // Bumped on every drag move that may trigger a live refresh
    pub drag_moves: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Mode {
    Neutral,
    Hovering(Hover),
    Dragging(Drag),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Hover {
    Waypoint(usize),
    Snappoint(usize),
    // Leg ids
    Routeline(String),
    AltRouteline(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Drag {
    pub down: ScreenPoint,
    pub subject: DragSubject,
    // A live refresh routed the waypoint's in-between position
    pub refreshed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DragSubject {
    Waypoint { id: String, initial: Coord },
    // Dragging the selected route to insert a waypoint into this leg
    Routeline { depart_index: usize },
    Nothing,
}

pub(crate) struct PendingFetch {
    pub id: u64,
    pub handle: AbortHandle,
    /// Interactivity before the first of a chain of superseding fetches started
    pub interactive_before: bool,
}

/// Groups of sensitive layers, in no particular priority.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Category {
    Waypoint,
    Snappoint,
    Routeline,
    AltRouteline,
}

impl Category {
    fn layers(self, config: &Configuration) -> &[String] {
        match self {
            Category::Waypoint => &config.sensitive_waypoint_layers,
            Category::Snappoint => &config.sensitive_snappoint_layers,
            Category::Routeline => &config.sensitive_routeline_layers,
            Category::AltRouteline => &config.sensitive_alt_routeline_layers,
        }
    }
}

impl<M: MapHost> State<M> {
    pub fn new(map: M) -> State<M> {
        State {
            map,
            waypoints: Vec::new(),
            snappoints: Vec::new(),
            routelines: Vec::new(),
            selected_route_index: 0,
            hoverpoint: None,
            interactive: false,
            mode: Mode::Neutral,
            pending: None,
            destroying: false,
            next_fetch_id: 0,
            drag_moves: 0,
        }
    }

    pub fn waypoint_coords(&self) -> Vec<Coord> {
        self.waypoints.iter().map(|x| x.coord).collect()
    }

    pub fn snappoint_coords(&self) -> Vec<Coord> {
        self.snappoints.iter().map(|x| x.coord).collect()
    }

    pub fn waypoint_bearings(&self) -> Vec<Option<Bearing>> {
        self.waypoints
            .iter()
            .map(|waypoint| {
                waypoint
                    .properties
                    .get("bearing")
                    .and_then(|x| serde_json::from_value(x.clone()).ok())
            })
            .collect()
    }

    /// Recomputes every waypoint's index and ORIGIN/DESTINATION category. Call after any change to
    /// the list itself.
    pub fn assign_categories(&mut self) {
        let last = self.waypoints.len().saturating_sub(1);
        for (index, waypoint) in self.waypoints.iter_mut().enumerate() {
            waypoint
                .properties
                .insert("index".to_string(), index.into());
            let category = if index == 0 {
                Some("ORIGIN")
            } else if index == last {
                Some("DESTINATION")
            } else {
                None
            };
            match category {
                Some(category) => {
                    waypoint
                        .properties
                        .insert("category".to_string(), category.into());
                }
                None => {
                    waypoint.properties.remove("category");
                }
            }
        }
    }

    pub fn clear_highlights(&mut self) {
        for point in self.waypoints.iter_mut().chain(self.snappoints.iter_mut()) {
            point.highlight = false;
        }
        for segment in self.routelines.iter_mut().flatten() {
            segment.highlight = false;
        }
    }

    pub fn highlight_pair(&mut self, index: usize) {
        if let Some(waypoint) = self.waypoints.get_mut(index) {
            waypoint.highlight = true;
        }
        if let Some(snappoint) = self.snappoints.get_mut(index) {
            snappoint.highlight = true;
        }
    }

    pub fn highlight_leg(&mut self, leg_id: &str) {
        for segment in self.routelines.iter_mut().flatten() {
            if segment.leg_id == leg_id {
                segment.highlight = true;
            }
        }
    }

    pub fn waypoint_index(&self, id: &str) -> Option<usize> {
        self.waypoints.iter().position(|x| x.id == id)
    }

    pub fn snappoint_index(&self, id: &str) -> Option<usize> {
        self.snappoints.iter().position(|x| x.id == id)
    }

    /// The route index and leg index of a leg.
    pub fn find_leg(&self, leg_id: &str) -> Option<(usize, usize)> {
        self.routelines
            .iter()
            .flatten()
            .find(|segment| segment.leg_id == leg_id)
            .map(|segment| (segment.route_index, segment.leg_index))
    }

    /// What a hoverpoint over a leg carries, in case it becomes a waypoint.
    pub fn hoverpoint_properties(&self, leg_index: usize) -> JsonObject {
        let mut props = JsonObject::new();
        for (key, index) in [
            ("departSnappointProperties", leg_index),
            ("arriveSnappointProperties", leg_index + 1),
        ] {
            if let Some(snappoint) = self.snappoints.get(index) {
                props.insert(
                    key.to_string(),
                    JsonValue::Object(snappoint.properties_snapshot()),
                );
            }
        }
        props
    }

    /// Finds what's under the cursor in the given categories, trying them in order.
    pub fn hit_test(
        &self,
        config: &Configuration,
        point: ScreenPoint,
        priority: &[Category],
    ) -> Option<(Category, RenderedFeature)> {
        let layers: Vec<String> = priority
            .iter()
            .flat_map(|category| category.layers(config).iter().cloned())
            .collect();
        let features = self.map.query_rendered_features(point, &layers);
        for category in priority {
            let layers = category.layers(config);
            if let Some(feature) = features.iter().find(|f| layers.contains(&f.layer_id)) {
                return Some((*category, feature.clone()));
            }
        }
        None
    }

    /// Stops any request in flight. Returns the interactivity it should restore.
    pub fn abort_pending(&mut self) -> Option<bool> {
        let pending = self.pending.take()?;
        pending.handle.abort();
        Some(pending.interactive_before)
    }

    /// Takes over responsibility for restoring interactivity, if that fetch still has it.
    pub fn take_pending(&mut self, id: u64) -> Option<bool> {
        if self.pending.as_ref().map(|x| x.id) == Some(id) {
            self.pending.take().map(|x| x.interactive_before)
        } else {
            None
        }
    }

    pub fn restore_interactive(&mut self, value: Option<bool>) {
        if let Some(value) = value {
            if !self.destroying {
                self.interactive = value;
            }
        }
    }

    /// Pushes everything to the map's source, if it's there. Re-tagging routes as
    /// SELECTED/ALT touches every segment, so high-frequency redraws skip it.
    pub fn draw(&mut self, config: &Configuration, skip_selected_route_redraw: bool) {
        if !skip_selected_route_redraw {
            let selected = self.selected_route_index;
            for segment in self.routelines.iter_mut().flatten() {
                segment.route = RouteTag::for_route(segment.route_index, selected);
            }
        }

        if !self.map.has_source(&config.source_name) {
            return;
        }
        let data = self.feature_collection();
        self.map.set_source_data(&config.source_name, data);
    }

    pub fn feature_collection(&self) -> FeatureCollection {
        let (depart_snappoint_index, show_hover_snaplines) = match self.mode {
            Mode::Dragging(Drag {
                subject: DragSubject::Routeline { depart_index },
                ..
            }) => (Some(depart_index), true),
            _ => (None, false),
        };

        let mut features: Vec<Feature> = Vec::new();
        features.extend(self.waypoints.iter().map(|x| x.to_geojson()));
        features.extend(self.snappoints.iter().map(|x| x.to_geojson()));
        features.extend(build_snaplines(
            &self.waypoint_coords(),
            &self.snappoint_coords(),
            self.hoverpoint.as_ref().map(|x| x.coord),
            depart_snappoint_index,
            show_hover_snaplines,
        ));
        features.extend(self.routelines.iter().flatten().map(|x| x.to_geojson()));
        if let Some(ref hoverpoint) = self.hoverpoint {
            features.push(hoverpoint.to_geojson());
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

/// Strictly beyond the threshold on either axis. A drag of exactly the threshold doesn't count.
pub(crate) fn exceeds_threshold(threshold: f64, from: ScreenPoint, to: ScreenPoint) -> bool {
    (to.x - from.x).abs() > threshold || (to.y - from.y).abs() > threshold
}

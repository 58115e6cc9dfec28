use geo::Coord;
use geojson::{FeatureCollection, JsonObject};

use crate::layers::Layer;

/// A position in the map's viewport, in pixels.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> ScreenPoint {
        ScreenPoint { x, y }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointerSource {
    Mouse { button: u16 },
    Touch { touches: usize },
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PointerEvent {
    pub point: ScreenPoint,
    pub lng_lat: Coord,
    pub source: PointerSource,
}

impl PointerEvent {
    pub fn mouse(point: ScreenPoint, lng_lat: Coord) -> PointerEvent {
        PointerEvent {
            point,
            lng_lat,
            source: PointerSource::Mouse { button: 0 },
        }
    }

    /// The left mouse button, or exactly one finger.
    pub fn is_primary(&self) -> bool {
        match self.source {
            PointerSource::Mouse { button } => button == 0,
            PointerSource::Touch { touches } => touches == 1,
        }
    }
}

/// A feature found under the cursor, and the style layer it was rendered by.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedFeature {
    pub layer_id: String,
    pub properties: JsonObject,
}

impl RenderedFeature {
    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(|x| x.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cursor {
    Default,
    Pointer,
}

/// What the engine needs from the map library it's attached to. Rendering, panning and
/// hit-testing all happen on the other side of this.
pub trait MapHost {
    /// The features rendered at a point by any of the given layers, topmost first.
    fn query_rendered_features(&self, point: ScreenPoint, layer_ids: &[String])
        -> Vec<RenderedFeature>;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str);
    fn remove_source(&mut self, id: &str);
    /// Replaces everything a GeoJSON source displays.
    fn set_source_data(&mut self, id: &str, data: FeatureCollection);

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: &Layer);
    fn remove_layer(&mut self, id: &str);

    fn set_cursor(&mut self, cursor: Cursor);
    /// Toggles the map's own drag-to-pan gesture.
    fn set_drag_pan(&mut self, enabled: bool);
}

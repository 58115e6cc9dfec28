use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A MapLibre style layer. Everything besides the id is passed to the host as-is.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: String,
    #[serde(flatten)]
    pub spec: JsonObject,
}

/// The semantic role of each default layer, in drawing order (bottom first).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LayerRole {
    Snapline,
    AltRoutelineCasing,
    AltRouteline,
    RoutelineCasing,
    Routeline,
    HoverpointCasing,
    Hoverpoint,
    SnappointCasing,
    Snappoint,
    WaypointCasing,
    Waypoint,
}

impl LayerRole {
    pub const ALL: [LayerRole; 11] = [
        LayerRole::Snapline,
        LayerRole::AltRoutelineCasing,
        LayerRole::AltRouteline,
        LayerRole::RoutelineCasing,
        LayerRole::Routeline,
        LayerRole::HoverpointCasing,
        LayerRole::Hoverpoint,
        LayerRole::SnappointCasing,
        LayerRole::Snappoint,
        LayerRole::WaypointCasing,
        LayerRole::Waypoint,
    ];

    fn suffix(self) -> &'static str {
        match self {
            LayerRole::Snapline => "snapline",
            LayerRole::AltRoutelineCasing => "alt-routeline-casing",
            LayerRole::AltRouteline => "alt-routeline",
            LayerRole::RoutelineCasing => "routeline-casing",
            LayerRole::Routeline => "routeline",
            LayerRole::HoverpointCasing => "hoverpoint-casing",
            LayerRole::Hoverpoint => "hoverpoint",
            LayerRole::SnappointCasing => "snappoint-casing",
            LayerRole::Snappoint => "snappoint",
            LayerRole::WaypointCasing => "waypoint-casing",
            LayerRole::Waypoint => "waypoint",
        }
    }

    pub fn layer_id(self, source_name: &str) -> String {
        format!("{}-{}", source_name, self.suffix())
    }
}

/// The default layers, with point radii and line widths multiplied by the scaling factors.
pub fn layers_factory(
    points_scaling_factor: f64,
    lines_scaling_factor: f64,
    source_name: &str,
) -> Vec<Layer> {
    LayerRole::ALL
        .iter()
        .map(|role| Layer {
            id: role.layer_id(source_name),
            spec: default_spec(
                *role,
                points_scaling_factor,
                lines_scaling_factor,
                source_name,
            ),
        })
        .collect()
}

fn default_spec(role: LayerRole, points: f64, lines: f64, source: &str) -> JsonObject {
    let value = match role {
        LayerRole::Snapline => json!({
            "type": "line",
            "source": source,
            "layout": { "line-cap": "round", "line-join": "round" },
            "paint": {
                "line-dasharray": [3, 3],
                "line-color": "#34343f",
                "line-opacity": 0.65,
                "line-width": 3,
            },
            "filter": ["==", ["get", "type"], "SNAPLINE"],
        }),
        LayerRole::AltRoutelineCasing => json!({
            "type": "line",
            "source": source,
            "layout": { "line-cap": "butt", "line-join": "round" },
            "paint": {
                "line-color": "#9e91be",
                "line-opacity": 0.55,
                "line-width": highlightable_zoom_scale([10.0, 7.0], [32.0, 23.0], lines),
            },
            "filter": ["==", ["get", "route"], "ALT"],
        }),
        LayerRole::AltRouteline => json!({
            "type": "line",
            "source": source,
            "layout": { "line-cap": "butt", "line-join": "round" },
            "paint": {
                "line-color": "#9e91be",
                "line-opacity": 0.85,
                "line-width": zoom_scale(3.0, 10.0, lines),
            },
            "filter": ["==", ["get", "route"], "ALT"],
        }),
        LayerRole::RoutelineCasing => json!({
            "type": "line",
            "source": source,
            "layout": { "line-cap": "butt", "line-join": "round" },
            "paint": {
                "line-color": congestion_color(),
                "line-opacity": 0.55,
                "line-width": highlightable_zoom_scale([10.0, 7.0], [32.0, 23.0], lines),
            },
            "filter": ["==", ["get", "route"], "SELECTED"],
        }),
        LayerRole::Routeline => json!({
            "type": "line",
            "source": source,
            "layout": { "line-cap": "butt", "line-join": "round" },
            "paint": {
                "line-color": congestion_color(),
                "line-opacity": 0.85,
                "line-width": zoom_scale(3.0, 10.0, lines),
            },
            "filter": ["==", ["get", "route"], "SELECTED"],
        }),
        // Always highlighted while it exists, so no highlight variant
        LayerRole::HoverpointCasing => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": zoom_scale(14.0, 33.0, points),
                "circle-color": "#30a856",
                "circle-opacity": 0.65,
            },
            "filter": ["==", ["get", "type"], "HOVERPOINT"],
        }),
        LayerRole::Hoverpoint => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": zoom_scale(9.0, 21.0, points),
                "circle-color": "#30a856",
            },
            "filter": ["==", ["get", "type"], "HOVERPOINT"],
        }),
        LayerRole::SnappointCasing => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": highlightable_zoom_scale([14.0, 12.0], [33.0, 28.0], points),
                "circle-color": highlight_color("#e50d3f", "#cb3373"),
                "circle-opacity": 0.65,
            },
            "filter": ["==", ["get", "type"], "SNAPPOINT"],
        }),
        LayerRole::Snappoint => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": highlightable_zoom_scale([9.0, 7.0], [21.0, 16.0], points),
                "circle-color": highlight_color("#e50d3f", "#cb3373"),
            },
            "filter": ["==", ["get", "type"], "SNAPPOINT"],
        }),
        LayerRole::WaypointCasing => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": highlightable_zoom_scale([14.0, 12.0], [33.0, 28.0], points),
                "circle-color": highlight_color("#6d26d7", "#7b33e7"),
                "circle-opacity": 0.65,
            },
            "filter": ["==", ["get", "type"], "WAYPOINT"],
        }),
        LayerRole::Waypoint => json!({
            "type": "circle",
            "source": source,
            "paint": {
                "circle-radius": highlightable_zoom_scale([9.0, 7.0], [21.0, 16.0], points),
                "circle-color": highlight_color("#6d26d7", "#7b33e7"),
            },
            "filter": ["==", ["get", "type"], "WAYPOINT"],
        }),
    };
    match value {
        Value::Object(spec) => spec,
        _ => JsonObject::new(),
    }
}

// Constant on zoom levels 0-5, then grows exponentially up to zoom 18
fn zoom_scale(low_zoom: f64, high_zoom: f64, factor: f64) -> Value {
    json!([
        "interpolate",
        ["exponential", 1.5],
        ["zoom"],
        0,
        low_zoom * factor,
        5,
        low_zoom * factor,
        18,
        high_zoom * factor,
    ])
}

// Like zoom_scale, with [highlighted, default] values at both ends
fn highlightable_zoom_scale(low_zoom: [f64; 2], high_zoom: [f64; 2], factor: f64) -> Value {
    let case = |[highlighted, default]: [f64; 2]| {
        json!([
            "case",
            ["boolean", ["get", "highlight"], false],
            highlighted * factor,
            default * factor,
        ])
    };
    json!([
        "interpolate",
        ["exponential", 1.5],
        ["zoom"],
        0,
        case(low_zoom),
        5,
        case(low_zoom),
        18,
        case(high_zoom),
    ])
}

fn highlight_color(highlighted: &str, default: &str) -> Value {
    json!([
        "case",
        ["boolean", ["get", "highlight"], false],
        highlighted,
        default,
    ])
}

fn congestion_color() -> Value {
    json!([
        "interpolate-hcl",
        ["linear"],
        ["get", "congestion"],
        0,
        "#7b51f8",
        1,
        "#42c74c",
        100,
        "#d72359",
    ])
}

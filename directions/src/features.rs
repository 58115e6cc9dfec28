use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use geo::Coord;
use geojson::{Feature, JsonObject, JsonValue};
use log::warn;

use directions_api::Route;

use crate::helpers::{
    coordinates_equal, decode_congestion, decode_geometry, AnnotationKind, GeometryEncoding,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A process-wide unique id for a feature or a leg.
pub fn fresh_id() -> String {
    format!("{:x}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointKind {
    Waypoint,
    Snappoint,
    Hoverpoint,
}

impl PointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PointKind::Waypoint => "WAYPOINT",
            PointKind::Snappoint => "SNAPPOINT",
            PointKind::Hoverpoint => "HOVERPOINT",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RouteTag {
    Selected,
    Alt,
}

impl RouteTag {
    pub fn for_route(route_index: usize, selected_route_index: usize) -> RouteTag {
        if route_index == selected_route_index {
            RouteTag::Selected
        } else {
            RouteTag::Alt
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteTag::Selected => "SELECTED",
            RouteTag::Alt => "ALT",
        }
    }
}

/// A waypoint, snappoint or hoverpoint. Kind-specific attributes (a waypoint's index, category,
/// profile and bearing, a snappoint's copy of its waypoint's properties) live in `properties`.
#[derive(Clone, Debug, PartialEq)]
pub struct PointFeature {
    pub id: String,
    pub kind: PointKind,
    pub coord: Coord,
    pub properties: JsonObject,
    pub highlight: bool,
}

impl PointFeature {
    /// Everything a styling layer or a correlated feature needs to know about this point. This is
    /// a copy; later changes to the point aren't reflected.
    pub fn properties_snapshot(&self) -> JsonObject {
        let mut props = self.properties.clone();
        props.insert("type".to_string(), self.kind.as_str().into());
        props.insert("id".to_string(), self.id.clone().into());
        props
    }

    pub fn to_geojson(&self) -> Feature {
        let mut props = self.properties_snapshot();
        props.insert("highlight".to_string(), self.highlight.into());
        Feature {
            bbox: None,
            geometry: Some(point_geometry(self.coord)),
            id: None,
            properties: Some(props),
            foreign_members: None,
        }
    }

    pub fn profile(&self) -> Option<&str> {
        self.properties.get("profile").and_then(|x| x.as_str())
    }
}

/// One congestion-homogeneous piece of one leg of one route.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutelineSegment {
    /// Shared by every segment of the same leg, so a whole leg can be highlighted at once
    pub leg_id: String,
    pub route_index: usize,
    pub route: RouteTag,
    pub leg_index: usize,
    pub congestion: u8,
    pub depart_snappoint_properties: JsonObject,
    pub arrive_snappoint_properties: JsonObject,
    pub coords: Vec<Coord>,
    pub highlight: bool,
}

impl RoutelineSegment {
    pub fn to_geojson(&self) -> Feature {
        let mut props = JsonObject::new();
        props.insert("id".to_string(), self.leg_id.clone().into());
        props.insert("routeIndex".to_string(), self.route_index.into());
        props.insert("route".to_string(), self.route.as_str().into());
        props.insert("legIndex".to_string(), self.leg_index.into());
        props.insert("congestion".to_string(), self.congestion.into());
        props.insert(
            "departSnappointProperties".to_string(),
            JsonValue::Object(self.depart_snappoint_properties.clone()),
        );
        props.insert(
            "arriveSnappointProperties".to_string(),
            JsonValue::Object(self.arrive_snappoint_properties.clone()),
        );
        props.insert("highlight".to_string(), self.highlight.into());
        Feature {
            bbox: None,
            geometry: Some(line_geometry(&self.coords)),
            id: None,
            properties: Some(props),
            foreign_members: None,
        }
    }
}

pub fn build_point(coord: Coord, kind: PointKind, properties: Option<JsonObject>) -> PointFeature {
    PointFeature {
        id: fresh_id(),
        kind,
        coord,
        properties: properties.unwrap_or_default(),
        highlight: false,
    }
}

/// Lines from every waypoint to its snappoint. While a leg is being dragged to insert a waypoint,
/// also connects the hoverpoint to that leg's two snappoints.
pub fn build_snaplines(
    waypoints: &[Coord],
    snappoints: &[Coord],
    hoverpoint: Option<Coord>,
    depart_snappoint_index: Option<usize>,
    show_hover_snaplines: bool,
) -> Vec<Feature> {
    if waypoints.len() != snappoints.len() {
        return Vec::new();
    }

    let mut snaplines: Vec<Feature> = waypoints
        .iter()
        .zip(snappoints)
        .map(|(waypoint, snappoint)| snapline(*waypoint, *snappoint))
        .collect();

    if let (true, Some(hover), Some(depart)) =
        (show_hover_snaplines, hoverpoint, depart_snappoint_index)
    {
        if let (Some(from), Some(to)) = (snappoints.get(depart), snappoints.get(depart + 1)) {
            snaplines.push(snapline(hover, *from));
            snaplines.push(snapline(hover, *to));
        }
    }

    snaplines
}

fn snapline(from: Coord, to: Coord) -> Feature {
    let mut props = JsonObject::new();
    props.insert("type".to_string(), "SNAPLINE".into());
    Feature {
        bbox: None,
        geometry: Some(line_geometry(&[from, to])),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

/// Splits every route into legs at the snappoints, and every leg into segments wherever the
/// congestion changes. Adjacent segments share exactly one coordinate, so they render as one
/// continuous line.
pub fn build_routelines(
    request_options: &BTreeMap<String, String>,
    routes: &[Route],
    selected_route_index: usize,
    snappoints: &[PointFeature],
) -> Vec<Vec<RoutelineSegment>> {
    let encoding = GeometryEncoding::from_request_options(request_options);
    let annotation_kind = AnnotationKind::from_request_options(request_options);
    if snappoints.len() < 2 {
        return Vec::new();
    }

    routes
        .iter()
        .enumerate()
        .map(|(route_index, route)| {
            let coordinates = match decode_geometry(encoding, &route.geometry) {
                Ok(coords) => coords,
                Err(err) => {
                    warn!("Skipping route {}: {}", route_index, err);
                    Vec::new()
                }
            };
            let legs = split_into_legs(encoding, &coordinates, snappoints);

            let mut segments: Vec<RoutelineSegment> = Vec::new();
            for (leg_index, leg_coords) in legs.into_iter().enumerate() {
                let leg_id = fresh_id();
                let annotation = route
                    .legs
                    .get(leg_index)
                    .and_then(|leg| leg.annotation.as_ref());

                for (i, coord) in leg_coords.iter().enumerate() {
                    let congestion = decode_congestion(annotation_kind, annotation, i);

                    if let Some(previous) = segments.last_mut() {
                        if previous.leg_index == leg_index && previous.congestion == congestion {
                            previous.coords.push(*coord);
                            continue;
                        }
                    }

                    let mut coords = Vec::new();
                    if let Some(previous) = segments.last() {
                        if let Some(last) = previous.coords.last() {
                            coords.push(*last);
                        }
                    }
                    coords.push(*coord);

                    segments.push(RoutelineSegment {
                        leg_id: leg_id.clone(),
                        route_index,
                        route: RouteTag::for_route(route_index, selected_route_index),
                        leg_index,
                        congestion,
                        depart_snappoint_properties: snappoints[leg_index].properties_snapshot(),
                        arrive_snappoint_properties: snappoints[leg_index + 1]
                            .properties_snapshot(),
                        coords,
                        highlight: false,
                    });
                }
            }
            segments
        })
        .collect()
}

// One run of coordinates per consecutive pair of snappoints. The runs don't overlap; the
// segment builder stitches them together.
fn split_into_legs(
    encoding: GeometryEncoding,
    coordinates: &[Coord],
    snappoints: &[PointFeature],
) -> Vec<Vec<Coord>> {
    let mut legs = Vec::new();
    let mut start = 0;
    // The first snappoint always matches the first coordinate
    let mut search_from = 0;
    for snappoint in &snappoints[1..] {
        let end = coordinates
            .iter()
            .skip(search_from)
            .position(|pt| coordinates_equal(encoding, *pt, snappoint.coord))
            .map(|offset| search_from + offset)
            .unwrap_or(coordinates.len().saturating_sub(1));
        let leg = if start < coordinates.len() && start <= end {
            coordinates[start..=end].to_vec()
        } else {
            Vec::new()
        };
        legs.push(leg);
        start = end + 1;
        search_from = end;
    }
    legs
}

pub(crate) fn point_geometry(coord: Coord) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::Point(vec![coord.x, coord.y]))
}

pub(crate) fn line_geometry(coords: &[Coord]) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::LineString(
        coords.iter().map(|pt| vec![pt.x, pt.y]).collect(),
    ))
}

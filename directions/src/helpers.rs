use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use geo::Coord;

use directions_api::{Annotation, CongestionLevel, Geometry};

/// How the service encodes route geometry, chosen by the `geometries` request option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GeometryEncoding {
    GeoJson,
    /// 5 fractional digits. The service default.
    Polyline,
    Polyline6,
}

impl GeometryEncoding {
    pub fn from_request_options(options: &BTreeMap<String, String>) -> GeometryEncoding {
        match options.get("geometries").map(|x| x.as_str()) {
            Some("geojson") => GeometryEncoding::GeoJson,
            Some("polyline6") => GeometryEncoding::Polyline6,
            _ => GeometryEncoding::Polyline,
        }
    }
}

/// Which congestion annotation the service was asked for, chosen by the `annotations` request
/// option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AnnotationKind {
    None,
    Congestion,
    CongestionNumeric,
}

impl AnnotationKind {
    pub fn from_request_options(options: &BTreeMap<String, String>) -> AnnotationKind {
        let Some(annotations) = options.get("annotations") else {
            return AnnotationKind::None;
        };
        // "congestion" is a prefix of "congestion_numeric", so check the longer one first
        if annotations.contains("congestion_numeric") {
            AnnotationKind::CongestionNumeric
        } else if annotations.contains("congestion") {
            AnnotationKind::Congestion
        } else {
            AnnotationKind::None
        }
    }
}

/// Decodes a route's geometry into `(lon, lat)` coordinates, whatever the wire order.
pub fn decode_geometry(encoding: GeometryEncoding, geometry: &Geometry) -> Result<Vec<Coord>> {
    match (encoding, geometry) {
        (GeometryEncoding::GeoJson, Geometry::GeoJson { coordinates }) => Ok(coordinates
            .iter()
            .map(|[x, y]| Coord { x: *x, y: *y })
            .collect()),
        (GeometryEncoding::Polyline, Geometry::Polyline(raw)) => decode_polyline(raw, 5),
        (GeometryEncoding::Polyline6, Geometry::Polyline(raw)) => decode_polyline(raw, 6),
        (GeometryEncoding::GeoJson, Geometry::Polyline(_)) => {
            bail!("expected a GeoJSON geometry, but the service sent a polyline")
        }
        (_, Geometry::GeoJson { .. }) => {
            bail!("expected a polyline geometry, but the service sent GeoJSON")
        }
    }
}

fn decode_polyline(raw: &str, precision: u32) -> Result<Vec<Coord>> {
    // The wire format is lat,lon; the decoder already hands back x = lon
    let linestring = polyline::decode_polyline(raw, precision).map_err(|err| anyhow!(err))?;
    Ok(linestring.0)
}

/// The congestion of one segment of a leg on a 0 (free flow or unknown) to 100 (severe) scale.
pub fn decode_congestion(
    kind: AnnotationKind,
    annotation: Option<&Annotation>,
    segment_index: usize,
) -> u8 {
    let Some(annotation) = annotation else {
        return 0;
    };
    match kind {
        AnnotationKind::None => 0,
        AnnotationKind::CongestionNumeric => annotation
            .congestion_numeric
            .as_ref()
            .and_then(|values| values.get(segment_index).copied().flatten())
            .map(|value| value.min(100) as u8)
            .unwrap_or(0),
        AnnotationKind::Congestion => match annotation
            .congestion
            .as_ref()
            .and_then(|levels| levels.get(segment_index))
        {
            Some(CongestionLevel::Low) => 1,
            Some(CongestionLevel::Moderate) => 34,
            Some(CongestionLevel::Heavy) => 77,
            Some(CongestionLevel::Severe) => 100,
            Some(CongestionLevel::Unknown) | None => 0,
        },
    }
}

/// Decoding a 5-digit polyline loses precision, so snappoints from the response won't exactly
/// match the decoded route coordinates.
pub fn coordinates_equal(encoding: GeometryEncoding, a: Coord, b: Coord) -> bool {
    match encoding {
        GeometryEncoding::Polyline => (a.x - b.x).abs() <= 0.00001 && (a.y - b.y).abs() <= 0.00001,
        GeometryEncoding::GeoJson | GeometryEncoding::Polyline6 => a == b,
    }
}

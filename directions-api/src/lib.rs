use serde::{Deserialize, Deserializer, Serialize};

/// The subset of a routing service response used to draw routes. Matches both the
/// OSRM `route` service and the Mapbox Directions API.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub waypoints: Vec<Snappoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Route {
    pub geometry: Geometry,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

/// Either a compressed polyline (`geometries=polyline` or `polyline6`) or a GeoJSON LineString
/// (`geometries=geojson`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Geometry {
    Polyline(String),
    GeoJson { coordinates: Vec<[f64; 2]> },
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Leg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion: Option<Vec<CongestionLevel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion_numeric: Option<Vec<Option<u32>>>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Unknown,
    Low,
    Moderate,
    Heavy,
    Severe,
}

// Providers add levels over time; anything unrecognized is as good as unknown
impl<'de> Deserialize<'de> for CongestionLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "low" => CongestionLevel::Low,
            "moderate" => CongestionLevel::Moderate,
            "heavy" => CongestionLevel::Heavy,
            "severe" => CongestionLevel::Severe,
            _ => CongestionLevel::Unknown,
        })
    }
}

/// A waypoint as corrected onto the routable network by the service.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Snappoint {
    pub location: [f64; 2],
}

impl RouteResponse {
    pub fn is_ok(&self) -> bool {
        self.code == "Ok"
    }

    /// The server-supplied message, falling back to the code itself.
    pub fn error_message(&self) -> String {
        match self.message {
            Some(ref msg) => format!("{}: {}", self.code, msg),
            None => self.code.clone(),
        }
    }
}

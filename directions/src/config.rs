use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::layers::{layers_factory, Layer, LayerRole};

pub const DEFAULT_API: &str = "https://router.project-osrm.org/route/v1";
pub const DEFAULT_PROFILE: &str = "driving";
pub const DEFAULT_SOURCE_NAME: &str = "maplibre-gl-directions";
pub const DEFAULT_DRAG_THRESHOLD: f64 = 10.0;
pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(300);

/// The complete configuration of one attachment. Fixed once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    /// OSRM- or Mapbox-compatible endpoint, without a trailing slash
    pub api: String,
    pub profile: String,
    /// Passed along with every request. `access_token` moves to the URL for POST requests.
    pub request_options: BTreeMap<String, String>,
    pub make_post_request: bool,
    /// The GeoJSON source everything is drawn into, and the prefix of the default layer ids
    pub source_name: String,
    pub layers: Vec<Layer>,
    pub sensitive_waypoint_layers: Vec<String>,
    pub sensitive_snappoint_layers: Vec<String>,
    pub sensitive_routeline_layers: Vec<String>,
    pub sensitive_alt_routeline_layers: Vec<String>,
    /// Pixels a point must be dragged before the drag counts. Never negative.
    pub drag_threshold: f64,
    /// Send each waypoint's `[angle, tolerance]` as the `bearings` request parameter
    pub bearings: bool,
    /// Re-fetch routes while a waypoint is still being dragged
    pub refresh_on_move: bool,
    pub refresh_debounce: Duration,
    pub request_timeout: Option<Duration>,
}

/// What a user may specify. Anything missing takes the default.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigurationInput {
    pub api: Option<String>,
    pub profile: Option<String>,
    pub request_options: Option<BTreeMap<String, String>>,
    pub make_post_request: Option<bool>,
    pub source_name: Option<String>,
    pub layers: Option<Vec<Layer>>,
    /// Only used to generate the default layers
    pub points_scaling_factor: Option<f64>,
    /// Only used to generate the default layers
    pub lines_scaling_factor: Option<f64>,
    pub sensitive_waypoint_layers: Option<Vec<String>>,
    pub sensitive_snappoint_layers: Option<Vec<String>>,
    pub sensitive_routeline_layers: Option<Vec<String>>,
    pub sensitive_alt_routeline_layers: Option<Vec<String>>,
    pub drag_threshold: Option<f64>,
    pub bearings: Option<bool>,
    pub refresh_on_move: Option<bool>,
    pub refresh_debounce_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

pub fn build_configuration(input: ConfigurationInput) -> Configuration {
    let source_name = input
        .source_name
        .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string());
    let layers = input.layers.unwrap_or_else(|| {
        layers_factory(
            input.points_scaling_factor.unwrap_or(1.0),
            input.lines_scaling_factor.unwrap_or(1.0),
            &source_name,
        )
    });
    let sensitive = |role: LayerRole, casing: LayerRole| {
        vec![role.layer_id(&source_name), casing.layer_id(&source_name)]
    };

    Configuration {
        api: input.api.unwrap_or_else(|| DEFAULT_API.to_string()),
        profile: input
            .profile
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        request_options: input.request_options.unwrap_or_default(),
        make_post_request: input.make_post_request.unwrap_or(false),
        sensitive_waypoint_layers: input
            .sensitive_waypoint_layers
            .unwrap_or_else(|| sensitive(LayerRole::Waypoint, LayerRole::WaypointCasing)),
        sensitive_snappoint_layers: input
            .sensitive_snappoint_layers
            .unwrap_or_else(|| sensitive(LayerRole::Snappoint, LayerRole::SnappointCasing)),
        sensitive_routeline_layers: input
            .sensitive_routeline_layers
            .unwrap_or_else(|| sensitive(LayerRole::Routeline, LayerRole::RoutelineCasing)),
        sensitive_alt_routeline_layers: input.sensitive_alt_routeline_layers.unwrap_or_else(
            || sensitive(LayerRole::AltRouteline, LayerRole::AltRoutelineCasing),
        ),
        // NaN fails the comparison too
        drag_threshold: match input.drag_threshold {
            Some(x) if x >= 0.0 => x,
            Some(_) => 0.0,
            None => DEFAULT_DRAG_THRESHOLD,
        },
        bearings: input.bearings.unwrap_or(false),
        refresh_on_move: input.refresh_on_move.unwrap_or(false),
        refresh_debounce: input
            .refresh_debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REFRESH_DEBOUNCE),
        request_timeout: input.request_timeout_ms.map(Duration::from_millis),
        layers,
        source_name,
    }
}

impl Default for Configuration {
    fn default() -> Configuration {
        build_configuration(ConfigurationInput::default())
    }
}

impl Configuration {
    /// Builds from a user-supplied JSON object, such as `{"profile": "foot", "dragThreshold": 5}`.
    pub fn from_json(raw: &str) -> Result<Configuration> {
        let input: ConfigurationInput =
            serde_json::from_str(raw).context("parsing directions configuration")?;
        Ok(build_configuration(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.api, DEFAULT_API);
        assert_eq!(config.profile, "driving");
        assert!(!config.make_post_request);
        assert_eq!(config.drag_threshold, 10.0);
        assert_eq!(config.layers.len(), LayerRole::ALL.len());
        assert_eq!(
            config.sensitive_waypoint_layers,
            vec![
                "maplibre-gl-directions-waypoint".to_string(),
                "maplibre-gl-directions-waypoint-casing".to_string()
            ]
        );
        assert_eq!(
            config.sensitive_alt_routeline_layers[1],
            "maplibre-gl-directions-alt-routeline-casing"
        );
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn merges_json_input() {
        let config = Configuration::from_json(
            r#"{
                "profile": "foot",
                "requestOptions": {"geometries": "geojson"},
                "sourceName": "trip",
                "dragThreshold": -4,
                "requestTimeoutMs": 2500
            }"#,
        )
        .unwrap();
        assert_eq!(config.profile, "foot");
        assert_eq!(config.api, DEFAULT_API);
        assert_eq!(config.request_options["geometries"], "geojson");
        assert_eq!(config.drag_threshold, 0.0);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.layers[0].id, "trip-snapline");
        assert_eq!(config.sensitive_routeline_layers[0], "trip-routeline");
    }

    #[test]
    fn custom_layers_replace_the_defaults() {
        let config = Configuration::from_json(
            r#"{"layers": [{"id": "mine", "type": "circle", "source": "maplibre-gl-directions"}]}"#,
        )
        .unwrap();
        assert_eq!(config.layers.len(), 1);
        assert_eq!(config.layers[0].id, "mine");
        assert_eq!(config.layers[0].spec["type"], "circle");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Configuration::from_json(r#"{"dragThreshold": "far"}"#).is_err());
    }
}

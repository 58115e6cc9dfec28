use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use geo::Coord;
use geojson::FeatureCollection;
use log::info;

use directions::{
    Configuration, Cursor, Layer, MapDirections, MapHost, RenderedFeature, RoutingClient,
    ScreenPoint,
};

/// A map that renders nothing. It only remembers what each source was last given, so the result
/// can be written out.
#[derive(Default)]
pub struct HeadlessMap {
    sources: BTreeMap<String, Option<FeatureCollection>>,
    layers: Vec<String>,
}

impl HeadlessMap {
    pub fn source_data(&self, id: &str) -> Option<&FeatureCollection> {
        self.sources.get(id).and_then(|x| x.as_ref())
    }
}

impl MapHost for HeadlessMap {
    fn query_rendered_features(&self, _: ScreenPoint, _: &[String]) -> Vec<RenderedFeature> {
        Vec::new()
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str) {
        self.sources.insert(id.to_string(), None);
    }

    fn remove_source(&mut self, id: &str) {
        self.sources.remove(id);
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) {
        self.sources.insert(id.to_string(), Some(data));
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|x| x == id)
    }

    fn add_layer(&mut self, layer: &Layer) {
        self.layers.push(layer.id.clone());
    }

    fn remove_layer(&mut self, id: &str) {
        self.layers.retain(|x| x != id);
    }

    fn set_cursor(&mut self, _: Cursor) {}

    fn set_drag_pan(&mut self, _: bool) {}
}

/// Parses `lon,lat`.
pub fn parse_coord(raw: &str) -> Result<Coord> {
    let Some((lon, lat)) = raw.split_once(',') else {
        bail!("{raw} isn't lon,lat");
    };
    Ok(Coord {
        x: lon.trim().parse().with_context(|| format!("bad longitude in {raw}"))?,
        y: lat.trim().parse().with_context(|| format!("bad latitude in {raw}"))?,
    })
}

/// Parses `key=value`.
pub fn parse_option(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("{raw} isn't key=value"),
    }
}

/// Routes between the waypoints once, and returns everything that would be drawn: waypoints,
/// snappoints, snaplines and route segments.
pub async fn plan_route(
    waypoints: Vec<Coord>,
    profiles: Option<Vec<String>>,
    config: Configuration,
    client: Rc<dyn RoutingClient>,
) -> Result<FeatureCollection> {
    if waypoints.len() < 2 {
        bail!("Need at least two waypoints, got {}", waypoints.len());
    }
    let source = config.source_name.clone();
    let directions = MapDirections::new(HeadlessMap::default(), config, client)?;
    info!("Routing between {} waypoints", waypoints.len());
    directions.set_waypoints(waypoints, profiles).await?;
    info!(
        "Got {} route(s); route {} is selected",
        directions.routelines().len(),
        directions.selected_route_index()
    );

    let data = directions
        .map()
        .source_data(&source)
        .cloned()
        .context("nothing was drawn")?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use directions::{ConfigurationInput, RouteRequest, RouteResponse};
    use futures::future::LocalBoxFuture;
    use std::cell::RefCell;

    struct CannedClient {
        urls: RefCell<Vec<String>>,
    }

    impl RoutingClient for CannedClient {
        fn fetch(&self, request: RouteRequest) -> LocalBoxFuture<'static, Result<RouteResponse>> {
            self.urls.borrow_mut().push(request.get_url());
            Box::pin(async {
                let response: RouteResponse = serde_json::from_str(
                    r#"{
                        "code": "Ok",
                        "routes": [{
                            "geometry": {"type": "LineString", "coordinates": [[1, 2], [1.5, 2.5], [3, 4]]},
                            "legs": [{}]
                        }],
                        "waypoints": [{"location": [1, 2]}, {"location": [3, 4]}]
                    }"#,
                )?;
                anyhow::Ok(response)
            })
        }
    }

    #[test]
    fn parsing_arguments() {
        assert_eq!(parse_coord("13.4, 52.5").unwrap(), Coord { x: 13.4, y: 52.5 });
        assert!(parse_coord("13.4").is_err());
        assert!(parse_coord("a,b").is_err());
        assert_eq!(
            parse_option("overview=full").unwrap(),
            ("overview".to_string(), "full".to_string())
        );
        assert!(parse_option("=full").is_err());
        assert!(parse_option("overview").is_err());
    }

    #[tokio::test]
    async fn plans_a_route() {
        let client = Rc::new(CannedClient {
            urls: RefCell::new(Vec::new()),
        });
        let config = directions::build_configuration(ConfigurationInput {
            request_options: Some(
                [("geometries".to_string(), "geojson".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        });
        let data = plan_route(
            vec![Coord { x: 1.0, y: 2.0 }, Coord { x: 3.0, y: 4.0 }],
            None,
            config,
            client.clone(),
        )
        .await
        .unwrap();

        assert_eq!(
            *client.urls.borrow(),
            vec![
                "https://router.project-osrm.org/route/v1/driving/1,2;3,4?geometries=geojson"
                    .to_string()
            ]
        );
        // 2 waypoints, 2 snappoints, 2 snaplines, 1 route segment
        assert_eq!(data.features.len(), 7);
    }

    #[tokio::test]
    async fn needs_two_waypoints() {
        let client = Rc::new(CannedClient {
            urls: RefCell::new(Vec::new()),
        });
        let result = plan_route(
            vec![Coord { x: 1.0, y: 2.0 }],
            None,
            Configuration::default(),
            client,
        )
        .await;
        assert!(result.is_err());
    }
}

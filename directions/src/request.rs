use anyhow::{anyhow, Context, Result};
use futures::future::LocalBoxFuture;
use geo::Coord;
use log::debug;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use directions_api::RouteResponse;

use crate::config::Configuration;

/// Restricts which direction a route may leave a waypoint in: clockwise degrees from true
/// north, plus or minus a tolerance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Bearing {
    pub angle: f64,
    pub tolerance: f64,
}

impl From<[f64; 2]> for Bearing {
    fn from([angle, tolerance]: [f64; 2]) -> Bearing {
        Bearing { angle, tolerance }
    }
}

impl From<Bearing> for [f64; 2] {
    fn from(b: Bearing) -> [f64; 2] {
        [b.angle, b.tolerance]
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub method: Method,
    pub url: String,
    /// URL-encoded. The query string for GET, the form body for POST.
    pub payload: String,
}

impl RouteRequest {
    /// The full URL to request, with the query string for GET requests.
    pub fn get_url(&self) -> String {
        if self.method == Method::Get && !self.payload.is_empty() {
            format!("{}?{}", self.url, self.payload)
        } else {
            self.url.clone()
        }
    }
}

/// Builds a GET request with coordinates in the path, or a POST request (Mapbox only) with
/// everything in the form body. `bearings` has one entry per coordinate when given.
pub fn build_request(
    config: &Configuration,
    profile: &str,
    coords: &[Coord],
    bearings: Option<&[Option<Bearing>]>,
) -> RouteRequest {
    let coordinates = coords
        .iter()
        .map(|pt| format!("{},{}", pt.x, pt.y))
        .collect::<Vec<_>>()
        .join(";");
    let bearings = bearings.map(|list| {
        list.iter()
            .map(|b| match b {
                Some(b) => format!("{},{}", b.angle, b.tolerance),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join(";")
    });

    if !config.make_post_request {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &config.request_options {
            query.append_pair(key, value);
        }
        if let Some(ref bearings) = bearings {
            query.append_pair("bearings", bearings);
        }
        return RouteRequest {
            method: Method::Get,
            url: format!("{}/{}/{}", config.api, profile, coordinates),
            payload: query.finish(),
        };
    }

    // The Mapbox API insists on the token being in the URL
    let mut url = format!("{}/{}", config.api, profile);
    if let Some(token) = config.request_options.get("access_token") {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", token)
            .finish();
        url = format!("{}?{}", url, query);
    }

    let mut form = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &config.request_options {
        if key != "access_token" {
            form.append_pair(key, value);
        }
    }
    if let Some(ref bearings) = bearings {
        form.append_pair("bearings", bearings);
    }
    form.append_pair("coordinates", &coordinates);

    RouteRequest {
        method: Method::Post,
        url,
        payload: form.finish(),
    }
}

/// Performs routing requests. The engine only sees this seam, so hosts can route through their
/// own HTTP stack, and tests can script responses.
pub trait RoutingClient {
    fn fetch(&self, request: RouteRequest) -> LocalBoxFuture<'static, Result<RouteResponse>>;
}

/// Talks to a real service over HTTP.
#[derive(Clone, Default)]
pub struct HttpRoutingClient {
    client: reqwest::Client,
}

impl HttpRoutingClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl RoutingClient for HttpRoutingClient {
    fn fetch(&self, request: RouteRequest) -> LocalBoxFuture<'static, Result<RouteResponse>> {
        let client = self.client.clone();
        Box::pin(async move {
            let url = request.get_url();
            debug!("{:?} {}", request.method, url);
            let builder = match request.method {
                Method::Get => client.get(&url),
                Method::Post => client
                    .post(&url)
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(request.payload),
            };
            let resp = builder
                .send()
                .await
                .with_context(|| format!("requesting {}", url))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .with_context(|| format!("reading the response from {}", url))?;

            parse_response(&url, status, &body)
        })
    }
}

// Some services answer errors with only a message, like Mapbox's 401 for a bad token
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn parse_response(url: &str, status: reqwest::StatusCode, body: &str) -> Result<RouteResponse> {
    // Services describe failures in the body with a non-2xx status, so try that first
    match serde_json::from_str::<RouteResponse>(body) {
        Ok(directions) => Ok(directions),
        Err(err) if status.is_success() => {
            Err(anyhow!(err).context(format!("parsing the response from {}", url)))
        }
        Err(_) => match serde_json::from_str::<ErrorBody>(body) {
            Ok(error) => Err(anyhow!(
                "{} failed with status {}: {}",
                url,
                status,
                error.message
            )),
            Err(_) => Err(anyhow!("{} failed with status {}", url, status)),
        },
    }
}

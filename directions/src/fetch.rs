use anyhow::{anyhow, bail, Result};
use futures::future::{try_join_all, AbortHandle, AbortRegistration, Abortable, Aborted};
use geo::Coord;
use geojson::{JsonObject, JsonValue};
use log::{debug, info, warn};

use directions_api::RouteResponse;

use crate::events::{Event, EventData, EventType};
use crate::features::{PointFeature, PointKind, RoutelineSegment};
use crate::map::MapHost;
use crate::request::RouteRequest;
use crate::state::PendingFetch;
use crate::MapDirections;

/// Consecutive legs routed with the same profile, as an inclusive range of waypoints. Adjacent
/// groups share their boundary waypoint.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ProfileGroup {
    pub profile: String,
    pub start: usize,
    pub end: usize,
}

impl ProfileGroup {
    fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// A leg uses the profile of the waypoint it departs from, or the default.
pub(crate) fn profile_groups(waypoints: &[PointFeature], default_profile: &str) -> Vec<ProfileGroup> {
    let mut groups: Vec<ProfileGroup> = Vec::new();
    for leg in 0..waypoints.len().saturating_sub(1) {
        let profile = waypoints[leg].profile().unwrap_or(default_profile);
        match groups.last_mut() {
            Some(group) if group.profile == profile => group.end = leg + 1,
            _ => groups.push(ProfileGroup {
                profile: profile.to_string(),
                start: leg,
                end: leg + 1,
            }),
        }
    }
    groups
}

impl<M: MapHost> MapDirections<M> {
    /// Routes between the current waypoints, replacing the snappoints and routes once the service
    /// answers. Supersedes any fetch still in flight; the superseded call returns `Ok` without
    /// changing anything.
    ///
    /// If the service fails or times out, the previous snappoints and routes are kept. If it
    /// answers with snappoints that don't match the waypoints, both are cleared.
    pub async fn fetch_directions(&self) -> Result<()> {
        let inherited = self.state.borrow_mut().abort_pending();

        if self.state.borrow().waypoints.len() < 2 {
            {
                let mut state = self.state.borrow_mut();
                state.snappoints.clear();
                state.routelines.clear();
                state.restore_interactive(inherited);
            }
            self.draw(false);
            return Ok(());
        }

        if !self.fire(Event::new(EventType::FetchRoutesStart, EventData::None)) {
            debug!("Fetching routes was prevented");
            self.state.borrow_mut().restore_interactive(inherited);
            return Ok(());
        }

        let (id, registration, groups, requests) = self.start_fetch(inherited);
        debug!(
            "Fetch {} needs {} request(s) for {} profile group(s)",
            id,
            requests.len(),
            groups.len()
        );

        let timeout = self.config.request_timeout;
        let fetches = requests.into_iter().map(|request| {
            let response = self.client.fetch(request);
            async move {
                let response = match timeout {
                    Some(limit) => tokio::time::timeout(limit, response)
                        .await
                        .map_err(|_| anyhow!("No answer from the routing service in {:?}", limit))??,
                    None => response.await?,
                };
                if !response.is_ok() {
                    bail!("The routing service failed: {}", response.error_message());
                }
                anyhow::Ok(response)
            }
        });
        let result = Abortable::new(try_join_all(fetches), registration).await;

        let restore = self.state.borrow_mut().take_pending(id);
        let responses = match result {
            Err(Aborted) => {
                debug!("Fetch {} was aborted", id);
                return Ok(());
            }
            Ok(Err(err)) => {
                self.fail_fetch(restore);
                return Err(err);
            }
            Ok(Ok(responses)) => responses,
        };

        if let Err(err) = self.reconcile(&groups, &responses) {
            self.draw(false);
            self.fail_fetch(restore);
            return Err(err);
        }
        self.draw(false);
        self.state.borrow_mut().restore_interactive(restore);
        info!(
            "Routed between {} waypoints, got {} route(s)",
            self.state.borrow().waypoints.len(),
            self.state.borrow().routelines.len()
        );

        for response in responses {
            self.fire(Event::new(
                EventType::FetchRoutesEnd,
                EventData::Routing {
                    directions: Some(response),
                },
            ));
        }
        Ok(())
    }

    // Becomes the pending fetch, and builds one request per profile group
    fn start_fetch(
        &self,
        inherited: Option<bool>,
    ) -> (u64, AbortRegistration, Vec<ProfileGroup>, Vec<RouteRequest>) {
        let (id, registration, groups, coords, bearings) = {
            let mut state = self.state.borrow_mut();
            let (handle, registration) = AbortHandle::new_pair();
            let id = state.next_fetch_id;
            state.next_fetch_id += 1;
            let interactive_before = inherited.unwrap_or(state.interactive);
            state.pending = Some(PendingFetch {
                id,
                handle,
                interactive_before,
            });
            state.interactive = false;

            let groups = profile_groups(&state.waypoints, &self.config.profile);
            let bearings = if self.config.bearings {
                Some(state.waypoint_bearings())
            } else {
                None
            };
            (id, registration, groups, state.waypoint_coords(), bearings)
        };

        let requests = groups
            .iter()
            .map(|group| {
                self.builders.build_request(
                    &self.config,
                    &group.profile,
                    &coords[group.start..=group.end],
                    bearings
                        .as_deref()
                        .map(|list| &list[group.start..=group.end]),
                )
            })
            .collect();
        (id, registration, groups, requests)
    }

    fn fail_fetch(&self, restore: Option<bool>) {
        warn!("Fetching routes failed");
        self.state.borrow_mut().restore_interactive(restore);
        self.fire(Event::new(
            EventType::FetchRoutesEnd,
            EventData::Routing { directions: None },
        ));
    }

    /// Replaces the snappoints and routes with what the service returned. Responses that don't
    /// fit the waypoints they were requested for clear both instead.
    ///
    /// The builders run without the state borrowed, so they may call back into `self`.
    fn reconcile(&self, groups: &[ProfileGroup], responses: &[RouteResponse]) -> Result<()> {
        let (selected, route_count, waypoint_properties) = {
            let mut state = self.state.borrow_mut();
            if let Err(err) = check_structure(groups, responses, state.waypoints.len()) {
                state.snappoints.clear();
                state.routelines.clear();
                return Err(err);
            }

            // Only routes every group has alternatives for can be shown
            let route_count = responses
                .iter()
                .map(|x| x.routes.len())
                .min()
                .unwrap_or(0);
            if state.selected_route_index >= route_count {
                state.selected_route_index = 0;
            }
            let waypoint_properties: Vec<JsonObject> = state
                .waypoints
                .iter()
                .map(|x| x.properties_snapshot())
                .collect();
            (state.selected_route_index, route_count, waypoint_properties)
        };

        let mut snappoints: Vec<PointFeature> = Vec::new();
        let mut routelines: Vec<Vec<RoutelineSegment>> = vec![Vec::new(); route_count];
        for (group_index, (group, response)) in groups.iter().zip(responses).enumerate() {
            let group_snappoints: Vec<PointFeature> = response
                .waypoints
                .iter()
                .zip(&waypoint_properties[group.start..=group.end])
                .map(|(snappoint, waypoint_props)| {
                    let mut props = JsonObject::new();
                    props.insert(
                        "waypointProperties".to_string(),
                        JsonValue::Object(waypoint_props.clone()),
                    );
                    self.builders.build_point(
                        Coord {
                            x: snappoint.location[0],
                            y: snappoint.location[1],
                        },
                        PointKind::Snappoint,
                        Some(props),
                    )
                })
                .collect();

            let lines = self.builders.build_routelines(
                &self.config.request_options,
                &response.routes,
                selected,
                &group_snappoints,
            );
            for (route, mut segments) in routelines.iter_mut().zip(lines) {
                for segment in &mut segments {
                    segment.leg_index += group.start;
                }
                route.extend(segments);
            }

            // The previous group already has the shared boundary snappoint
            let skip = if group_index == 0 { 0 } else { 1 };
            snappoints.extend(group_snappoints.into_iter().skip(skip));
        }

        let mut state = self.state.borrow_mut();
        state.snappoints = snappoints;
        state.routelines = routelines;
        Ok(())
    }
}

fn check_structure(
    groups: &[ProfileGroup],
    responses: &[RouteResponse],
    waypoint_count: usize,
) -> Result<()> {
    if let Some(last) = groups.last() {
        if last.end + 1 != waypoint_count {
            bail!(
                "Routed {} waypoints, but there are now {}",
                last.end + 1,
                waypoint_count
            );
        }
    }
    for (group, response) in groups.iter().zip(responses) {
        if response.waypoints.len() != group.len() {
            bail!(
                "Asked to route {} waypoints, but got {} snappoints back",
                group.len(),
                response.waypoints.len()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_point;

    fn waypoint(profile: Option<&str>) -> PointFeature {
        let props = profile.map(|profile| {
            let mut props = JsonObject::new();
            props.insert("profile".to_string(), profile.into());
            props
        });
        build_point(Coord { x: 0.0, y: 0.0 }, PointKind::Waypoint, props)
    }

    fn group(profile: &str, start: usize, end: usize) -> ProfileGroup {
        ProfileGroup {
            profile: profile.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn one_group_by_default() {
        let waypoints = vec![waypoint(None), waypoint(None), waypoint(None)];
        assert_eq!(
            profile_groups(&waypoints, "driving"),
            vec![group("driving", 0, 2)]
        );
        assert!(profile_groups(&waypoints[..1], "driving").is_empty());
    }

    #[test]
    fn groups_share_boundaries() {
        // The last waypoint's profile doesn't matter; no leg departs from it
        let waypoints = vec![
            waypoint(Some("foot")),
            waypoint(Some("foot")),
            waypoint(None),
            waypoint(Some("cycling")),
            waypoint(Some("foot")),
        ];
        assert_eq!(
            profile_groups(&waypoints, "driving"),
            vec![
                group("foot", 0, 2),
                group("driving", 2, 3),
                group("cycling", 3, 4),
            ]
        );
    }
}

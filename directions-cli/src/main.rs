use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use geo::Coord;
use log::info;

use directions::{build_configuration, ConfigurationInput, HttpRoutingClient};
use directions_cli::{parse_coord, parse_option, plan_route};

/// Routes between waypoints with an OSRM- or Mapbox-compatible service, and writes everything
/// that would be drawn on a map as GeoJSON.
#[derive(Parser)]
struct Args {
    /// A waypoint as `lon,lat`. Repeat for every waypoint, in order.
    #[arg(long = "waypoint", value_parser = parse_coord, required = true)]
    waypoints: Vec<Coord>,

    /// The profile of each leg. Give none, or one per leg.
    #[arg(long = "leg-profile")]
    leg_profiles: Vec<String>,

    /// JSON file with the configuration. Flags below override it.
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    api: Option<String>,

    #[arg(long)]
    profile: Option<String>,

    /// An extra request parameter as `key=value`, like `overview=full`
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Send a POST request, as the Mapbox API supports
    #[arg(long)]
    post: bool,

    /// Give up on the service after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Output file to write. Prints to stdout if omitted.
    #[arg(long)]
    output: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn configuration(&self) -> Result<ConfigurationInput> {
        let mut input: ConfigurationInput = match self.config {
            Some(ref path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?
            }
            None => ConfigurationInput::default(),
        };
        if self.api.is_some() {
            input.api = self.api.clone();
        }
        if self.profile.is_some() {
            input.profile = self.profile.clone();
        }
        if !self.options.is_empty() {
            input
                .request_options
                .get_or_insert_with(Default::default)
                .extend(self.options.iter().cloned());
        }
        if self.post {
            input.make_post_request = Some(true);
        }
        if self.timeout_ms.is_some() {
            input.request_timeout_ms = self.timeout_ms;
        }
        Ok(input)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })?;

    let profiles = if args.leg_profiles.is_empty() {
        None
    } else {
        if args.leg_profiles.len() + 1 != args.waypoints.len() {
            bail!(
                "{} waypoints make {} legs, but got {} leg profiles",
                args.waypoints.len(),
                args.waypoints.len().saturating_sub(1),
                args.leg_profiles.len()
            );
        }
        Some(args.leg_profiles.clone())
    };
    let config = build_configuration(args.configuration()?);

    let data = plan_route(
        args.waypoints.clone(),
        profiles,
        config,
        Rc::new(HttpRoutingClient::new()),
    )
    .await?;
    let output = serde_json::to_string_pretty(&data)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, output).with_context(|| format!("writing {path}"))?;
            info!("Wrote {} features to {path}", data.features.len());
        }
        None => println!("{output}"),
    }
    Ok(())
}

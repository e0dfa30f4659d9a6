//! Server configuration, loaded from environment variables.

use anyhow::{Context, Result, anyhow};
use video_service::ReactionPolicy;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CONTROL_PORT: u16 = 8081;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host both listeners bind to
    pub host: String,
    /// Public API port
    pub port: u16,
    /// Control API port
    pub control_port: u16,
    pub reaction_policy: ReactionPolicy,
    /// Seed for the injectable random source; random when unset
    pub rng_seed: Option<u64>,
    /// Populate the in-memory store with generated fixtures
    pub seed_demo_data: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("Parsing PORT '{raw}'"))?,
            None => DEFAULT_PORT,
        };
        let control_port = match lookup("CONTROL_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Parsing CONTROL_PORT '{raw}'"))?,
            None => DEFAULT_CONTROL_PORT,
        };
        if port == control_port {
            return Err(anyhow!("PORT and CONTROL_PORT must differ (both {port})"));
        }
        let reaction_policy = match lookup("REACTION_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|err: String| anyhow!(err))
                .context("Parsing REACTION_POLICY")?,
            None => ReactionPolicy::default(),
        };
        let rng_seed = lookup("RNG_SEED")
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("Parsing RNG_SEED '{raw}'"))
            })
            .transpose()?;
        let seed_demo_data = match lookup("SEED_DEMO_DATA") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("Parsing SEED_DEMO_DATA '{raw}': expected true or false"))?,
            None => true,
        };

        Ok(Self {
            host,
            port,
            control_port,
            reaction_policy,
            rng_seed,
            seed_demo_data,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

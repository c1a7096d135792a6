//! Dispatcher configuration.

use maple_dispatch_query::QueryConfig;
use maple_dispatch_router::RoutingConfig;
use maple_dispatch_throttle::ThrottleConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::telemetry::TelemetryConfig;

/// Environment prefix for overrides, e.g. `MAPLE_DISPATCH_ROUTING__CACHE_THRESHOLD=4`.
pub const ENV_PREFIX: &str = "MAPLE_DISPATCH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl DispatchConfig {
    /// Defaults, then the optional file, then `MAPLE_DISPATCH_*` variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DispatchConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

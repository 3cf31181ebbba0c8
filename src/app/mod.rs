//! Application configuration
//!
//! Turns a configuration file into everything one module run needs.

mod config;

pub use config::{
    CampaignConfig, CampaignPlan, CampaignTarget, ConfigFile, ConfigFormat, EndpointList, ModulePlan,
    ProbeConfig, MAX_CONCURRENCY, MIN_RATE_PER_SECOND,
};

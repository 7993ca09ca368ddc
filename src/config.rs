//! Process-wide configuration surface (spec.md §6).
//!
//! Flowsmith reads a small, fixed set of environment variables. There is
//! no config file for the core itself — job/trigger configuration lives
//! in the entity store (see [`crate::trigger::store`]) and is opaque to
//! this module.

use std::env;

/// Default NATS URL used when `FLOWSMITH_BUS_URL` is unset.
pub const DEFAULT_BUS_URL: &str = "nats://localhost:4222";

/// Default tenant id used when `FLOWSMITH_TENANT_ID` is unset.
pub const DEFAULT_TENANT_ID: &str = "default";

/// Run mode controls workspace/container retention (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Workspaces are retained at a known path and containers are not
    /// auto-removed, to allow inspection.
    Dev,
    /// Workspaces and containers are torn down on every exit path.
    Production,
}

impl RunMode {
    pub fn is_dev(self) -> bool {
        matches!(self, RunMode::Dev)
    }
}

/// Process-wide settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bus_url: String,
    pub tenant_id: String,
    pub run_mode: RunMode,
}

impl Settings {
    /// Loads settings from the environment, applying the documented
    /// defaults for unset variables. Loads a local `.env` file first
    /// (if present) so development runs don't need exported shell vars.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let bus_url =
            env::var("FLOWSMITH_BUS_URL").unwrap_or_else(|_| DEFAULT_BUS_URL.to_string());
        let tenant_id =
            env::var("FLOWSMITH_TENANT_ID").unwrap_or_else(|_| DEFAULT_TENANT_ID.to_string());
        let run_mode = match env::var("FLOWSMITH_RUN_MODE") {
            Ok(v) if v.eq_ignore_ascii_case("dev") => RunMode::Dev,
            _ => RunMode::Production,
        };

        Settings {
            bus_url,
            tenant_id,
            run_mode,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bus_url: DEFAULT_BUS_URL.to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            run_mode: RunMode::Production,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_defaults() {
        let s = Settings::default();
        assert_eq!(s.bus_url, "nats://localhost:4222");
        assert_eq!(s.tenant_id, "default");
        assert!(!s.run_mode.is_dev());
    }
}

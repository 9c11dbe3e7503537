// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Engine configuration loaded from environment variables.
//!
//! Every proximity radius and detection threshold is a named value here so
//! each product decision (silent check-in, UI gating, advancement, dwell
//! detection) can be tuned on its own.

use crate::models::{Money, UnitPrices};
use std::env;
use std::str::FromStr;

/// The three proximity radii plus the relative "far" rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityRadii {
    /// Silent auto-check-in radius (meters)
    pub check_in_m: f64,
    /// "At bar" radius gating manual actions (meters)
    pub at_bar_m: f64,
    /// Within this distance of the next stop the cursor advances (meters)
    pub auto_advance_m: f64,
    /// "Far from current stop" is `far_factor × at_bar_m`
    pub far_factor: f64,
}

impl ProximityRadii {
    pub fn far_threshold_m(&self) -> f64 {
        self.far_factor * self.at_bar_m
    }
}

impl Default for ProximityRadii {
    fn default() -> Self {
        Self {
            check_in_m: 30.0,
            at_bar_m: 60.0,
            auto_advance_m: 80.0,
            far_factor: 2.0,
        }
    }
}

/// Unplanned-stop detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellSettings {
    /// Movement beyond this resets the dwell (meters)
    pub movement_threshold_m: f64,
    /// Stationary time before a place lookup (seconds)
    pub dwell_window_secs: i64,
    /// Place-lookup search radius (meters)
    pub search_radius_m: f64,
    /// Planned rounds for a proposed stop
    pub proposed_rounds: u32,
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            movement_threshold_m: 30.0,
            dwell_window_secs: 10 * 60,
            search_radius_m: 40.0,
            proposed_rounds: 1,
        }
    }
}

/// Which notification kinds surface, and how long a surfaced one is muted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationSettings {
    pub time_exceeded: bool,
    pub objective_complete: bool,
    pub participant_nearby: bool,
    pub pot_shortfall: bool,
    pub dedup_ttl_secs: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            time_exceeded: true,
            objective_complete: true,
            participant_nearby: false,
            pot_shortfall: false,
            dedup_ttl_secs: 30 * 60,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Identity ---
    /// Route this engine instance follows
    pub route_id: String,
    /// Participant id of the local user
    pub actor_id: String,

    // --- Backend ---
    /// Base URL of the route backend
    pub api_base_url: String,
    /// Session token issued by the auth layer
    pub api_token: Option<String>,
    /// Local UI API port
    pub port: u16,
    /// Extra origin allowed by CORS besides localhost (UI shell dev server)
    pub ui_origin: Option<String>,
    /// Run against a route fixture file instead of the backend
    pub offline_route_file: Option<String>,

    // --- Engine tunables ---
    pub radii: ProximityRadii,
    /// Samples with worse reported accuracy are unreliable (meters)
    pub max_accuracy_m: f64,
    pub dwell: DwellSettings,
    pub notifications: NotificationSettings,
    pub default_prices: UnitPrices,
    /// Minimum spacing of own-position reports (seconds)
    pub position_report_interval_secs: i64,
    /// Participant positions older than this are ignored (seconds)
    pub participant_stale_secs: i64,
    /// Period of the background route/participants/pot refresh (seconds)
    pub refresh_interval_secs: u64,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            route_id: "test-route".to_string(),
            actor_id: "test-actor".to_string(),
            api_base_url: "http://localhost:3000".to_string(),
            api_token: None,
            port: 8787,
            ui_origin: None,
            offline_route_file: None,
            radii: ProximityRadii::default(),
            max_accuracy_m: 150.0,
            dwell: DwellSettings::default(),
            notifications: NotificationSettings::default(),
            default_prices: UnitPrices::default(),
            position_report_interval_secs: 10,
            participant_stale_secs: 5 * 60,
            refresh_interval_secs: 30,
        }
    }
}

impl Config {
    /// Config for tests (offline defaults).
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        Ok(Self {
            route_id: env::var("ROUTE_ID").map_err(|_| ConfigError::Missing("ROUTE_ID"))?,
            actor_id: env::var("ACTOR_ID").map_err(|_| ConfigError::Missing("ACTOR_ID"))?,
            api_base_url: env::var("API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_token: env::var("API_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            port: parse_or("PORT", defaults.port)?,
            ui_origin: env::var("UI_ORIGIN").ok().filter(|v| !v.is_empty()),
            offline_route_file: env::var("OFFLINE_ROUTE_FILE").ok().filter(|v| !v.is_empty()),

            radii: ProximityRadii {
                check_in_m: parse_or("CHECK_IN_RADIUS_M", defaults.radii.check_in_m)?,
                at_bar_m: parse_or("AT_BAR_RADIUS_M", defaults.radii.at_bar_m)?,
                auto_advance_m: parse_or("AUTO_ADVANCE_RADIUS_M", defaults.radii.auto_advance_m)?,
                far_factor: parse_or("FAR_FACTOR", defaults.radii.far_factor)?,
            },
            max_accuracy_m: parse_or("MAX_ACCURACY_M", defaults.max_accuracy_m)?,
            dwell: DwellSettings {
                movement_threshold_m: parse_or(
                    "DWELL_MOVEMENT_THRESHOLD_M",
                    defaults.dwell.movement_threshold_m,
                )?,
                dwell_window_secs: parse_or::<i64>("DWELL_WINDOW_MINUTES", 10)? * 60,
                search_radius_m: parse_or("PLACE_SEARCH_RADIUS_M", defaults.dwell.search_radius_m)?,
                proposed_rounds: parse_or("PROPOSED_STOP_ROUNDS", defaults.dwell.proposed_rounds)?,
            },
            notifications: NotificationSettings {
                time_exceeded: parse_or("NOTIFY_TIME_EXCEEDED", true)?,
                objective_complete: parse_or("NOTIFY_OBJECTIVE_COMPLETE", true)?,
                participant_nearby: parse_or("NOTIFY_PARTICIPANT_NEARBY", false)?,
                pot_shortfall: parse_or("NOTIFY_POT_SHORTFALL", false)?,
                dedup_ttl_secs: parse_or(
                    "NOTIFICATION_TTL_SECS",
                    defaults.notifications.dedup_ttl_secs,
                )?,
            },
            default_prices: UnitPrices {
                drink: parse_or::<Money>("DEFAULT_DRINK_PRICE", defaults.default_prices.drink)?,
                food: parse_or::<Money>("DEFAULT_FOOD_PRICE", defaults.default_prices.food)?,
            },
            position_report_interval_secs: parse_or(
                "POSITION_REPORT_INTERVAL_SECS",
                defaults.position_report_interval_secs,
            )?,
            participant_stale_secs: parse_or(
                "PARTICIPANT_STALE_SECS",
                defaults.participant_stale_secs,
            )?,
            refresh_interval_secs: parse_or(
                "REFRESH_INTERVAL_SECS",
                defaults.refresh_interval_secs,
            )?,
        })
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test touching the process environment so runs don't race.
    #[test]
    fn test_config_from_env() {
        env::set_var("ROUTE_ID", "route-42");
        env::set_var("ACTOR_ID", "alice");
        env::set_var("API_BASE_URL", "https://crawl.example.com/");
        env::set_var("AT_BAR_RADIUS_M", "75");
        env::set_var("DWELL_WINDOW_MINUTES", "12");
        env::set_var("DEFAULT_DRINK_PRICE", "4.20");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.route_id, "route-42");
        assert_eq!(config.actor_id, "alice");
        assert_eq!(config.api_base_url, "https://crawl.example.com");
        assert_eq!(config.radii.at_bar_m, 75.0);
        assert_eq!(config.radii.check_in_m, 30.0);
        assert_eq!(config.radii.far_threshold_m(), 150.0);
        assert_eq!(config.dwell.dwell_window_secs, 720);
        assert_eq!(config.default_prices.drink.to_string(), "4.20");
        assert!(!config.notifications.pot_shortfall);

        env::set_var("AT_BAR_RADIUS_M", "wide");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("AT_BAR_RADIUS_M", _)));

        for name in [
            "ROUTE_ID",
            "ACTOR_ID",
            "API_BASE_URL",
            "AT_BAR_RADIUS_M",
            "DWELL_WINDOW_MINUTES",
            "DEFAULT_DRINK_PRICE",
        ] {
            env::remove_var(name);
        }
    }
}

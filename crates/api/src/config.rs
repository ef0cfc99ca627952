//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::OrchestratorConfig;

/// Server and checkout configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for plain text
/// - `ORDER_EVENTS_TOPIC`: topic for order completion events (default: `"orders"`)
/// - `EVENT_PUBLISH_TIMEOUT_MS`: bound on one event publish (default: `5000`)
/// - `NOTIFICATION_TIMEOUT_MS`: bound on one confirmation email (default: `5000`)
/// - `NOTIFICATION_URL`: base URL of the email service; in-memory when unset
/// - `TRACE_SAMPLE_RATIO`: fraction of new traces sampled (default: `1.0`)
/// - `FAULT_PAYMENT_UNREACHABLE`: send charges to an unreachable endpoint
/// - `FAULT_EVENT_FLOOD`: extra copies published per completion event
/// - `DEMO_RETENTION`: charges, shipments, emails and events the in-memory
///   collaborators keep (default: `100`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub events_topic: String,
    pub event_publish_timeout: Duration,
    pub notification_timeout: Duration,
    pub notification_url: Option<String>,
    pub trace_sample_ratio: f64,
    pub fault_payment_unreachable: bool,
    pub fault_event_flood: u32,
    pub demo_retention: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`; unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| parse_var(&lookup, key).map(Duration::from_millis);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            events_topic: lookup("ORDER_EVENTS_TOPIC")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.events_topic),
            event_publish_timeout: millis("EVENT_PUBLISH_TIMEOUT_MS")
                .unwrap_or(defaults.event_publish_timeout),
            notification_timeout: millis("NOTIFICATION_TIMEOUT_MS")
                .unwrap_or(defaults.notification_timeout),
            notification_url: lookup("NOTIFICATION_URL").filter(|v| !v.trim().is_empty()),
            trace_sample_ratio: parse_var(&lookup, "TRACE_SAMPLE_RATIO")
                .map(|ratio: f64| ratio.clamp(0.0, 1.0))
                .unwrap_or(defaults.trace_sample_ratio),
            fault_payment_unreachable: lookup("FAULT_PAYMENT_UNREACHABLE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.fault_payment_unreachable),
            fault_event_flood: parse_var(&lookup, "FAULT_EVENT_FLOOD")
                .unwrap_or(defaults.fault_event_flood),
            demo_retention: parse_var(&lookup, "DEMO_RETENTION")
                .unwrap_or(defaults.demo_retention),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The subset of settings the orchestrator itself uses.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            events_topic: self.events_topic.clone(),
            event_publish_timeout: self.event_publish_timeout,
            notification_timeout: self.notification_timeout,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            events_topic: orchestrator.events_topic,
            event_publish_timeout: orchestrator.event_publish_timeout,
            notification_timeout: orchestrator.notification_timeout,
            notification_url: None,
            trace_sample_ratio: 1.0,
            fault_payment_unreachable: false,
            fault_event_flood: 0,
            demo_retention: 100,
        }
    }
}

use crate::solver::SearchLimits;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_MAX_SEAT_CHOICES: usize = 250_000;

/// Runtime settings for the seating server.
#[derive(Debug, Clone, Parser)]
#[command(name = "seating_solver", about = "Classroom seating constraint solver", version)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    #[arg(long, env = "SEATING_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Wall-clock budget for one optimize request, in milliseconds
    #[arg(long, env = "SEATING_SOLVE_TIMEOUT_MS", default_value_t = 10_000)]
    pub solve_timeout_ms: u64,

    /// Optional cap on search nodes per optimize request
    #[arg(long, env = "SEATING_MAX_NODES")]
    pub max_nodes: Option<u64>,

    /// Largest students × seats model an optimize request may build
    #[arg(long, env = "SEATING_MAX_SEAT_CHOICES", default_value_t = DEFAULT_MAX_SEAT_CHOICES)]
    pub max_seat_choices: usize,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "SEATING_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            solve_timeout_ms: 10_000,
            max_nodes: None,
            max_seat_choices: DEFAULT_MAX_SEAT_CHOICES,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Fresh limits for one request; the deadline starts now.
    pub fn search_limits(&self) -> SearchLimits {
        let limits = SearchLimits::with_timeout(Duration::from_millis(self.solve_timeout_ms))
            .with_max_seat_choices(self.max_seat_choices);
        match self.max_nodes {
            Some(max) => limits.with_max_nodes(max),
            None => limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = ServerConfig::try_parse_from(["seating_solver"]).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.solve_timeout_ms, 10_000);
        assert_eq!(config.max_nodes, None);
        assert_eq!(config.search_limits().max_seat_choices, Some(DEFAULT_MAX_SEAT_CHOICES));
    }

    #[test]
    fn test_parse_overrides() {
        let config = ServerConfig::try_parse_from([
            "seating_solver",
            "--bind",
            "0.0.0.0:9000",
            "--solve-timeout-ms",
            "250",
            "--max-nodes",
            "5000",
            "--max-seat-choices",
            "900",
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.search_limits().max_nodes, Some(5000));
        assert!(config.search_limits().deadline.is_some());
        assert_eq!(config.search_limits().max_seat_choices, Some(900));
    }
}

use crate::sync::RefreshInterval;
use crate::view::TableRows;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the tuning server's HTTP interface.
    pub base_url: String,
    /// Session name to follow.
    pub session: String,
    pub refresh: RefreshInterval,
    pub table_rows: TableRows,
    /// Initially selected chart series as a selector position: 0 is time,
    /// then one per variable, then performance.
    pub series: usize,
    pub http_timeout_ms: u64,
    /// Consecutive poll failures before failures are logged as errors.
    pub failure_warn_after: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1977".to_string(),
            session: String::new(),
            refresh: RefreshInterval::default(),
            table_rows: TableRows::default(),
            series: 0,
            http_timeout_ms: 10_000,
            failure_warn_after: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: std::env::var("TUNEDASH_BASE").unwrap_or(d.base_url),
            session: std::env::var("TUNEDASH_SESSION").unwrap_or(d.session),
            refresh: std::env::var("REFRESH_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(RefreshInterval::nearest)
                .unwrap_or(d.refresh),
            table_rows: std::env::var("TABLE_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(TableRows::nearest)
                .unwrap_or(d.table_rows),
            series: std::env::var("SERIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.series),
            http_timeout_ms: std::env::var("HTTP_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.http_timeout_ms),
            failure_warn_after: std::env::var("FAILURE_WARN_AFTER").ok().and_then(|v| v.parse().ok()).unwrap_or(d.failure_warn_after),
        }
    }

    /// Apply command-line overrides of the form `--key=value` or a bare session name.
    pub fn apply_args<I: IntoIterator<Item = String>>(mut self, args: I) -> Self {
        for arg in args {
            match arg.split_once('=') {
                Some(("--base", v)) => self.base_url = v.to_string(),
                Some(("--refresh", v)) => {
                    if let Ok(ms) = v.parse() {
                        self.refresh = RefreshInterval::nearest(ms);
                    }
                }
                Some(("--rows", v)) => {
                    if let Ok(n) = v.parse() {
                        self.table_rows = TableRows::nearest(n);
                    }
                }
                Some(("--series", v)) => {
                    if let Ok(i) = v.parse() {
                        self.series = i;
                    }
                }
                _ if !arg.starts_with("--") => self.session = arg,
                _ => eprintln!("[config] ignoring unknown argument {}", arg),
            }
        }
        self
    }
}

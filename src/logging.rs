//! Structured logging for the dashboard client.
//!
//! Every entry is a single JSON line carrying a run id, a sequence number, a
//! level and a domain. Lines go to stdout (unless `LOG_STDOUT=0`) and, when
//! `LOG_DIR` is set, to `events.jsonl` / `trace.jsonl` under a per-run directory.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Wire,      // Response decoding
    Schema,    // Variable discovery
    Store,     // Record/series appends
    Sync,      // Poll cycle state machine
    View,      // Table/chart reconciliation
    Transport, // HTTP requests
    Session,   // Session control RPCs
    System,    // Startup, shutdown
    Profile,   // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Wire => "wire",
            Domain::Schema => "schema",
            Domain::Store => "store",
            Domain::Sync => "sync",
            Domain::View => "view",
            Domain::Transport => "transport",
            Domain::Session => "session",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Sequence counter and run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    stdout: bool,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let stdout = !matches!(std::env::var("LOG_STDOUT").as_deref(), Ok("0") | Ok("false"));

        let (events, trace) = match std::env::var("LOG_DIR") {
            Ok(base) => open_run_files(PathBuf::from(base), &run_id),
            Err(_) => (None, None),
        };

        RunContext {
            run_id,
            stdout,
            events,
            trace,
        }
    })
}

type RunFiles = (
    Option<Mutex<BufWriter<File>>>,
    Option<Mutex<BufWriter<File>>>,
);

fn open_run_files(base: PathBuf, run_id: &str) -> RunFiles {
    let run_dir = base.join(run_id);
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return (None, None);
    }

    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );

    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };
    (open("events.jsonl"), open("trace.jsonl"))
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["session", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

/// Build the JSON line for an entry without emitting it.
fn render_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    Value::Object(entry).to_string()
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = render_record(&ctx.run_id, level, component, event, fields);

    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if ctx.stdout {
        println!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_poll(session: &str, count: usize, url: &str) {
    log(
        Level::Debug,
        Domain::Transport,
        "poll",
        obj(&[
            ("session", v_str(session)),
            ("count", json!(count)),
            ("url", v_str(url)),
        ]),
    );
}

pub fn log_schema_change(generation: u64, variables: &[String]) {
    log(
        Level::Info,
        Domain::Schema,
        "schema_changed",
        obj(&[
            ("generation", json!(generation)),
            (
                "variables",
                Value::Array(variables.iter().map(|v| v_str(v)).collect()),
            ),
        ]),
    );
}

pub fn log_late_variable(name: &str, index: usize) {
    log(
        Level::Warn,
        Domain::Schema,
        "late_variable",
        obj(&[("name", v_str(name)), ("index", json!(index))]),
    );
}

pub fn log_decode_warning(session: &str, warning: &str) {
    log(
        Level::Warn,
        Domain::Wire,
        "decode_warning",
        obj(&[("session", v_str(session)), ("msg", v_str(warning))]),
    );
}

pub fn log_cycle(session: &str, appended: usize, skipped: usize, total: usize, rendered: bool) {
    log(
        Level::Debug,
        Domain::Sync,
        "cycle",
        obj(&[
            ("session", v_str(session)),
            ("appended", json!(appended)),
            ("skipped_duplicates", json!(skipped)),
            ("total", json!(total)),
            ("rendered", Value::Bool(rendered)),
        ]),
    );
}

pub fn log_poll_failure(session: &str, reason: &str, consecutive: u32, escalated: bool) {
    let level = if escalated { Level::Error } else { Level::Warn };
    log(
        level,
        Domain::Sync,
        "poll_failed",
        obj(&[
            ("session", v_str(session)),
            ("msg", v_str(reason)),
            ("consecutive", json!(consecutive)),
        ]),
    );
}

pub fn log_new_best(session: &str, id: &str, performance: f64) {
    log(
        Level::Info,
        Domain::Store,
        "new_best",
        obj(&[
            ("session", v_str(session)),
            ("id", v_str(id)),
            ("performance", v_num(performance)),
        ]),
    );
}

pub fn log_rebuild(generation: u64, columns: usize, rows: usize) {
    log(
        Level::Debug,
        Domain::View,
        "rebuild",
        obj(&[
            ("generation", json!(generation)),
            ("columns", json!(columns)),
            ("rows", json!(rows)),
        ]),
    );
}

pub fn log_unknown_series(position: usize, available: usize) {
    log(
        Level::Warn,
        Domain::View,
        "unknown_series",
        obj(&[("position", json!(position)), ("available", json!(available))]),
    );
}

pub fn log_session_command(session: &str, command: &str, ok: bool) {
    log(
        if ok { Level::Info } else { Level::Warn },
        Domain::Session,
        "command",
        obj(&[
            ("session", v_str(session)),
            ("command", v_str(command)),
            ("ok", Value::Bool(ok)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: Some(obj(fields)),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_render_hoists_session_and_msg() {
        let line = render_record(
            "r-test",
            Level::Warn,
            "wire",
            "decode_warning",
            obj(&[
                ("session", v_str("gemm")),
                ("msg", v_str("unknown key")),
                ("field", v_str("foo:bar")),
            ]),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["lvl"], "WARN");
        assert_eq!(parsed["session"], "gemm");
        assert_eq!(parsed["msg"], "unknown key");
        assert_eq!(parsed["data"]["field"], "foo:bar");
        assert!(parsed["data"].get("session").is_none());
    }
}

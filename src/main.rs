use anyhow::{bail, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;

use tunedash::config::Config;
use tunedash::logging::{log, obj, v_str, Domain, Level};
use tunedash::sync::{CycleOutcome, HttpTransport, IntervalHandle, RefreshInterval, SyncEngine};
use tunedash::view::text::TextSurface;

const USAGE: &str =
    "usage: tunedash <session> [--base=URL] [--refresh=MS] [--rows=N] [--series=I]";

/// Read `r <ms>` (change refresh period) and `q` (quit) from stdin. A closed
/// stdin only ends the control reader; the dashboard keeps polling.
async fn read_controls<R: AsyncRead + Unpin>(
    input: R,
    interval: IntervalHandle,
    shutdown: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(input).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("q"), _) => {
                let _ = shutdown.send(true);
                return;
            }
            (Some("r"), Some(ms)) => match ms.parse() {
                Ok(ms) => {
                    interval.set(RefreshInterval::nearest(ms));
                    log(
                        Level::Info,
                        Domain::Sync,
                        "interval_changed",
                        obj(&[("refresh_ms", json!(interval.get().millis()))]),
                    );
                }
                Err(_) => eprintln!("[tunedash] not a number: {}", ms),
            },
            _ => eprintln!("[tunedash] commands: r <ms>, q"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The terminal belongs to the dashboard frame unless asked otherwise.
    if std::env::var("LOG_STDOUT").is_err() {
        std::env::set_var("LOG_STDOUT", "0");
    }

    let cfg = Config::from_env().apply_args(std::env::args().skip(1));
    if cfg.session.is_empty() {
        bail!(USAGE);
    }

    let transport = HttpTransport::new(&cfg.base_url, cfg.http_timeout_ms)?;
    let mut engine = SyncEngine::new(&cfg.session, &cfg);
    let mut surface = TextSurface::new();

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("session", v_str(&cfg.session)),
            ("base", v_str(&cfg.base_url)),
            ("refresh_ms", json!(cfg.refresh.millis())),
            ("rows", json!(cfg.table_rows.count())),
        ]),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(true);
        }
    });
    tokio::spawn(read_controls(
        tokio::io::stdin(),
        engine.interval_handle(),
        shutdown_tx,
    ));

    engine
        .run(&transport, &mut surface, shutdown_rx, |outcome, surface| {
            if let CycleOutcome::Failed(err) = outcome {
                eprintln!("[tunedash] poll failed: {}", err);
            }
            if surface.is_dirty() {
                print!("\x1b[2J\x1b[H{}", surface.take_frame());
            }
        })
        .await;

    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[
            ("session", v_str(engine.session())),
            ("cycles", json!(engine.cycles())),
            ("records", json!(engine.store().count())),
        ]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_stdin_keeps_running() {
        let engine = SyncEngine::new("gemm", &Config::default());
        let (tx, rx) = watch::channel(false);
        let _ctrl_c = tx.clone();
        read_controls(tokio::io::empty(), engine.interval_handle(), tx).await;
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn q_stops_and_r_retimes() {
        let engine = SyncEngine::new("gemm", &Config::default());
        let (tx, rx) = watch::channel(false);
        read_controls(&b"r 900\nq\n"[..], engine.interval_handle(), tx).await;
        assert!(*rx.borrow());
        assert_eq!(engine.interval(), RefreshInterval::Ms1000);
    }
}

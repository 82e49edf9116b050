use anyhow::{bail, Result};

use tunedash::config::Config;
use tunedash::session::{Command, SessionControl};
use tunedash::sync::HttpTransport;
use tunedash::view::format_server_time;

const USAGE: &str = "usage: tunedash-sessions [list | pause S | resume S | kill S | restart S [INIT] | strategy S | converged S] [--json]";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let as_json = args.iter().any(|a| a == "--json");
    let words: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    let cfg = Config::from_env();
    let transport = HttpTransport::new(&cfg.base_url, cfg.http_timeout_ms)?;
    let control = SessionControl::new(&transport);

    match words.as_slice() {
        [] | ["list"] => {
            let sessions = control.list().await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else {
                for s in &sessions {
                    println!(
                        "{:<20} {}  clients={:<3} reported={:<6} best={}",
                        s.name,
                        format_server_time(s.started_ms),
                        s.clients,
                        s.reported,
                        s.best
                    );
                }
            }
        }
        ["pause", name] => control.send(name, Command::Pause).await?,
        ["resume", name] => control.send(name, Command::Resume).await?,
        ["kill", name] => control.send(name, Command::Kill).await?,
        ["restart", name] => control.send(name, Command::Restart { init: None }).await?,
        ["restart", name, init @ ..] => {
            let init = init.join(" ");
            control.send(name, Command::Restart { init: Some(init) }).await?
        }
        ["strategy", name] => println!("{}", control.strategy(name).await?),
        ["converged", name] => println!("{}", control.converged(name).await?),
        _ => bail!(USAGE),
    }
    Ok(())
}

// Terminal viewer: follows /realtime and logs a one-line summary per update.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use vpsmonit::client::{ConsumerState, ConsumerView, StreamConsumer};
use vpsmonit::config::ClientConfig;
use vpsmonit::display::{
    LoadLevel, average_cpu_load, format_bytes, format_uptime, is_near_full, parse_percentage,
    sort_disks_by_capacity,
};

#[derive(Parser, Debug)]
#[command(name = "vpsmonit-watch", about = "Follow a vpsmonit real-time stream")]
struct Args {
    /// Stream URL; overrides `[client].url` from the config file.
    #[arg(long)]
    url: Option<String>,

    /// Warn when no snapshot has arrived for this many seconds.
    #[arg(long, default_value_t = 5)]
    stale_after_secs: u64,
}

fn is_missing_file(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}

fn summarize(view: &ConsumerView, stale_after: Duration) -> String {
    let Some(data) = view.data.as_ref() else {
        return match &view.error {
            Some(e) => format!("error: {}", e),
            None => "loading...".into(),
        };
    };

    let cpu = average_cpu_load(&data.cpu_load);
    let mut line = format!(
        "cpu {:.1}% [{}] ({} cores)",
        cpu,
        LoadLevel::from_percent(cpu).label(),
        data.cpu_load.len()
    );
    if let Some(mem) = &data.mem {
        let used = parse_percentage(&mem.used_percent);
        line.push_str(&format!(
            " | mem {}% [{}] of {}",
            mem.used_percent,
            LoadLevel::from_percent(used).label(),
            format_bytes(mem.total)
        ));
    }
    if let Some(uptime) = data.uptime {
        line.push_str(&format!(" | up {}", format_uptime(uptime)));
    }
    if let Some(disk) = sort_disks_by_capacity(&data.disk).first() {
        line.push_str(&format!(
            " | {} {}% ({} free)",
            disk.mount,
            disk.capacity,
            format_bytes(disk.available)
        ));
    }
    let near_full = data.disk.iter().filter(|d| is_near_full(d)).count();
    if near_full > 0 {
        line.push_str(&format!(" | {} filesystem(s) nearly full", near_full));
    }
    if data.partial {
        line.push_str(" | partial");
    }
    if view.state != ConsumerState::Streaming {
        line.push_str(" | reconnecting");
    } else if view.is_stale(stale_after) {
        line.push_str(" | stale");
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut client_config = match ClientConfig::load() {
        Ok(c) => c,
        Err(e) if is_missing_file(&e) => {
            tracing::debug!(error = %e, "no config file; using client defaults");
            ClientConfig::default()
        }
        Err(e) => return Err(e),
    };
    if let Some(url) = args.url {
        client_config.url = url;
    }
    let stale_after = Duration::from_secs(args.stale_after_secs);

    tracing::info!(url = %client_config.url, "following stream");
    let consumer = StreamConsumer::connect(client_config)?;
    let mut updates = consumer.watch();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                tracing::info!("{}", summarize(&view, stale_after));
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    consumer.close().await;
    Ok(())
}

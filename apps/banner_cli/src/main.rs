mod config;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use banner_core::BannerController;
use clap::Parser;
use retained_alarms::InMemoryRetainedAlarms;
use serde::Serialize;
use shared::{
    domain::{AlarmHandle, LocaleId, RotationConfig},
    protocol::BannerSnapshot,
};
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Settings};

/// Drives the alarm banner through a scripted session against in-memory
/// retained alarms and prints every banner change.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `banner.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    interval_ms: Option<i64>,
    #[arg(long)]
    locale: Option<String>,
    #[arg(long)]
    run_seconds: Option<u64>,
    /// Print snapshots as JSON lines.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(v) = self.interval_ms {
            settings.rotation_interval_ms = v;
        }
        if let Some(v) = self.locale {
            settings.locale = v;
        }
        if let Some(v) = self.run_seconds {
            settings.run_seconds = v;
        }
        if self.json {
            settings.json = true;
        }
        settings
    }
}

#[derive(Serialize)]
struct SnapshotLine<'a> {
    at: String,
    #[serde(flatten)]
    snapshot: &'a BannerSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    let settings = args.apply(settings);

    let primary = LocaleId::or_default(Some(&LocaleId::new(settings.locale.clone())));
    let secondary = if primary.as_str() == "it-IT" {
        LocaleId::new("en-US")
    } else {
        LocaleId::new("it-IT")
    };

    let root = InMemoryRetainedAlarms::with_locales([primary.clone(), secondary.clone()]);
    let (session_tx, session_rx) = watch::channel(Some(primary.clone()));
    let (config_tx, config_rx) =
        watch::channel(RotationConfig::from_millis(settings.rotation_interval_ms));

    let controller = BannerController::new(root.clone(), session_rx, config_rx);
    let printer = spawn_printer(controller.subscribe(), settings.json);
    controller
        .start()
        .await
        .context("failed to start the alarm banner")?;

    let run_for = Duration::from_secs(settings.run_seconds);
    let step = run_for / 8;

    sleep(step).await;
    info!("raising alarms 1 and 2 in both locales, 3 in {primary} only");
    root.raise(AlarmHandle(1), &[primary.clone(), secondary.clone()])?;
    root.raise(AlarmHandle(2), &[primary.clone(), secondary.clone()])?;
    root.raise(AlarmHandle(3), &[primary.clone()])?;

    sleep(step).await;
    info!("next");
    controller.next().await;

    sleep(step).await;
    info!("previous");
    controller.previous().await;

    sleep(step).await;
    info!(locale = %secondary, "switching session locale");
    session_tx.send_replace(Some(secondary.clone()));

    sleep(step).await;
    let faster = (settings.rotation_interval_ms / 2).max(1);
    info!(interval_ms = faster, "changing rotation interval");
    config_tx.send_replace(RotationConfig::from_millis(faster));

    sleep(step).await;
    let retired = root.retire(AlarmHandle(1));
    info!(locales = retired, "retired alarm 1");

    sleep(run_for.saturating_sub(step * 6)).await;
    controller.stop().await;
    printer.abort();
    info!("alarm banner stopped");
    Ok(())
}

fn spawn_printer(mut snapshots: watch::Receiver<BannerSnapshot>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = *snapshots.borrow_and_update();
            print_snapshot(&snapshot, json);
        }
    })
}

fn print_snapshot(snapshot: &BannerSnapshot, json: bool) {
    let at = chrono::Local::now();
    if json {
        let line = SnapshotLine {
            at: at.to_rfc3339(),
            snapshot,
        };
        match serde_json::to_string(&line) {
            Ok(line) => println!("{line}"),
            Err(error) => tracing::error!(%error, "failed to encode snapshot"),
        }
        return;
    }

    let at = at.format("%H:%M:%S%.3f");
    match snapshot.displayed {
        Some(alarm) => println!(
            "[{at}] alarm {alarm} ({}/{})",
            snapshot.index + 1,
            snapshot.alarm_count
        ),
        None if snapshot.alarm_count == 0 => println!("[{at}] no active alarms"),
        None => println!("[{at}] waiting ({} active)", snapshot.alarm_count),
    }
}

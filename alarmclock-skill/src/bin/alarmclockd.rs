//! Alarm clock skill daemon.
//!
//! Connects to the MQTT broker, runs the skill and serves the local status
//! API until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use alarmclock_skill::api;
use alarmclock_skill::bus::mqtt::{self, MqttSettings};
use alarmclock_skill::clock::SystemTimeSource;
use alarmclock_skill::config::{self, Config, SiteConfig, SnoozeConfig};
use alarmclock_skill::skill::AlarmClockSkill;
use alarmclock_skill::tracing::{init_journald_or_stdout, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "alarmclockd", version, about = "Alarm clock skill for Hermes voice assistants")]
struct Args {
    /// Rooms and their site ids: `room:site_id[:timeout]`, comma separated.
    #[arg(long, env = "ALARMCLOCK_SITES", default_value = "bedroom:default")]
    sites: String,

    /// Room for new alarms that name none. Defaults to the first site.
    #[arg(long, env = "ALARMCLOCK_DEFAULT_ROOM")]
    default_room: Option<String>,

    /// Ringtone volume, 0--100.
    #[arg(
        long,
        env = "ALARMCLOCK_RINGING_VOLUME",
        default_value_t = config::DEFAULT_RINGING_VOLUME,
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    ringing_volume: u8,

    /// Ringing timeout for sites without their own (`30`, `45s`, `2m`).
    #[arg(
        long,
        env = "ALARMCLOCK_RINGING_TIMEOUT",
        default_value = "30s",
        value_parser = config::parse_timeout
    )]
    ringing_timeout: Duration,

    /// Play the ringtone on the site's speaker.
    #[arg(long, env = "ALARMCLOCK_RINGTONE", default_value_t = true, action = ArgAction::Set)]
    ringtone: bool,

    /// WAV file to ring with instead of the built-in beep.
    #[arg(long, env = "ALARMCLOCK_RINGTONE_PATH")]
    ringtone_path: Option<PathBuf>,

    /// Ask "snooze or stop?" after an alarm is acknowledged.
    #[arg(long, env = "ALARMCLOCK_SNOOZE", default_value_t = true, action = ArgAction::Set)]
    snooze: bool,

    #[arg(long, env = "ALARMCLOCK_SNOOZE_DEFAULT", default_value_t = 9)]
    snooze_default: u32,

    #[arg(long, env = "ALARMCLOCK_SNOOZE_MIN", default_value_t = 2)]
    snooze_min: u32,

    #[arg(long, env = "ALARMCLOCK_SNOOZE_MAX", default_value_t = 10)]
    snooze_max: u32,

    /// Seconds to wait for the snooze answer.
    #[arg(long, env = "ALARMCLOCK_SNOOZE_TIMEOUT", default_value_t = 30)]
    snooze_timeout: u64,

    /// Load saved alarms at startup.
    #[arg(long, env = "ALARMCLOCK_RESTORE", default_value_t = true, action = ArgAction::Set)]
    restore: bool,

    /// Seconds a new alarm must lie in the future.
    #[arg(long, env = "ALARMCLOCK_MIN_LEAD_TIME", default_value_t = 120)]
    min_lead_time: u64,

    /// Clock poll interval in seconds. Must be below one minute.
    #[arg(long, env = "ALARMCLOCK_POLL_INTERVAL", default_value_t = 5)]
    poll_interval: u64,

    /// Minutes before an alarm to announce sunriseStart. 0 disables it.
    #[arg(long, env = "ALARMCLOCK_SUNRISE_LEAD", default_value_t = 30)]
    sunrise_lead: u64,

    /// Seconds an acknowledged site waits for a dialogue session.
    #[arg(long, env = "ALARMCLOCK_SESSION_TIMEOUT", default_value_t = 30)]
    session_timeout: u64,

    #[arg(long, env = "ALARMCLOCK_STORE", default_value = "alarms.jsonl")]
    store_path: PathBuf,

    #[arg(long, env = "ALARMCLOCK_MQTT_HOST", default_value = "localhost")]
    mqtt_host: String,

    #[arg(long, env = "ALARMCLOCK_MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[arg(long, env = "ALARMCLOCK_API_ADDR", default_value = api::server::DEFAULT_ADDR)]
    api_addr: SocketAddr,

    /// Intent name prefix.
    #[arg(long, env = "ALARMCLOCK_NAMESPACE", default_value = "alarmclock")]
    namespace: String,
}

impl Args {
    fn config(&self) -> Result<Config> {
        let template = SiteConfig {
            ringing_timeout: self.ringing_timeout,
            ringing_volume: self.ringing_volume,
            ringtone_enabled: self.ringtone,
            ..SiteConfig::new("", "")
        };
        let sites = config::parse_sites(&self.sites, &template)?;
        let default_room = match &self.default_room {
            Some(room) => room.clone(),
            None => sites.first().map(|s| s.room.clone()).unwrap_or_default(),
        };

        let config = Config {
            sites,
            default_room,
            min_lead_time: Duration::from_secs(self.min_lead_time),
            poll_interval: Duration::from_secs(self.poll_interval),
            sunrise_lead: Duration::from_secs(self.sunrise_lead * 60),
            session_timeout: Duration::from_secs(self.session_timeout),
            snooze: SnoozeConfig {
                enabled: self.snooze,
                default_minutes: self.snooze_default,
                min_minutes: self.snooze_min,
                max_minutes: self.snooze_max,
                answer_timeout: Duration::from_secs(self.snooze_timeout),
            },
            restore_alarms: self.restore,
            store_path: self.store_path.clone(),
            ringtone_path: self.ringtone_path.clone(),
            intent_namespace: self.namespace.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    fn mqtt(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: format!("alarmclock-{}", std::process::id()),
            intent_namespace: self.namespace.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_journald_or_stdout();

    // The local offset can only be read while the process is single-threaded.
    let time = Arc::new(SystemTimeSource::local());
    let config = args.config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(args, config, time))
}

async fn run(args: Args, config: Config, time: Arc<SystemTimeSource>) -> Result<()> {
    info!(
        sites = config.sites.len(),
        store = %config.store_path.display(),
        broker = %format!("{}:{}", args.mqtt_host, args.mqtt_port),
        "Starting alarm clock skill"
    );

    let (publisher, listener) = mqtt::connect(&args.mqtt());
    let skill = AlarmClockSkill::new(config, Arc::new(publisher), time)?;

    let running = CancellationToken::new();
    let inbound = skill.inbound();
    let api_state = skill.api_state();
    let skill = skill.start();

    let mqtt_task = tokio::spawn(listener.run(inbound, running.clone()));
    let api_task = tokio::spawn(api::serve(args.api_addr, api_state, running.clone()));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = sigterm.recv() => info!("Terminated"),
    }

    running.cancel();
    skill.stop().await;
    if let Err(e) = mqtt_task.await {
        error!(error = %e, "MQTT task failed");
    }
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API task failed"),
    }

    info!("Exiting");
    Ok(())
}

//! Command-line interface for alarmclockd.
//!
//! This binary queries and controls the skill daemon via the HTTP API.

use std::env;

use anyhow::Result;

use alarmclock_skill::api_client::{self, types::AlarmState};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: alarmclock-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status           Check that the daemon is up");
        eprintln!("  alarms           List pending alarms");
        eprintln!("  missed           List missed alarms");
        eprintln!("  sites            Show sites and their state");
        eprintln!("  stop <site-id>   Stop a ringing site");
        eprintln!();
        eprintln!("Environment:");
        eprintln!(
            "  ALARMCLOCK_API_URL    API base URL (default: {})",
            api_client::DEFAULT_BASE_URL
        );
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "alarms" => cmd_alarms().await?,
        "missed" => cmd_missed().await?,
        "sites" => cmd_sites().await?,
        "stop" => {
            let Some(site_id) = args.get(2) else {
                eprintln!("Usage: alarmclock-cli stop <site-id>");
                std::process::exit(1);
            };
            cmd_stop(site_id).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring ALARMCLOCK_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("ALARMCLOCK_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

async fn cmd_status() -> Result<()> {
    let client = make_client();
    println!("Health: {}", client.health().await?);

    let alarms = client.get_alarms().await?;
    let missed = client.get_missed().await?;
    println!("Alarms: {}", alarms.len());
    println!("Missed: {}", missed.len());
    if let Some(next) = alarms.first() {
        println!("Next:   {} ({})", next.datetime, next.room);
    }
    Ok(())
}

async fn cmd_alarms() -> Result<()> {
    print_alarms(&make_client().get_alarms().await?);
    Ok(())
}

async fn cmd_missed() -> Result<()> {
    print_alarms(&make_client().get_missed().await?);
    Ok(())
}

async fn cmd_sites() -> Result<()> {
    let sites = make_client().get_sites().await?;
    for site in &sites {
        println!(
            "{:<12} {:<16} {:<18} timeout {} s{}",
            site.room,
            site.site_id,
            site.phase,
            site.ringing_timeout_secs,
            if site.ringtone_enabled { "" } else { ", silent" }
        );
        if let Some(alarm) = &site.ringing {
            println!("  ringing: {}", alarm.datetime);
        }
    }
    Ok(())
}

async fn cmd_stop(site_id: &str) -> Result<()> {
    let site = make_client().stop_ringing(site_id).await?;
    println!("Stopped {} ({}), now {}", site.site_id, site.room, site.phase);
    Ok(())
}

fn print_alarms(alarms: &[AlarmState]) {
    if alarms.is_empty() {
        println!("(none)");
        return;
    }
    for alarm in alarms {
        println!("{}  {} ({})", alarm.datetime, alarm.room, alarm.site_id);
    }
}

//! Skill configuration.
//!
//! Plain structs with sensible defaults. The daemon fills them from
//! command-line arguments and `ALARMCLOCK_*` environment variables; library
//! users and tests construct them directly.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::SiteId;

pub const DEFAULT_RINGING_TIMEOUT: Duration = Duration::from_secs(30);

/// Shorter timeouts would cut the ringtone off before it played once.
pub const MIN_RINGING_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_RINGING_VOLUME: u8 = 50;

/// Scheduling granularity. The poll interval must stay below it.
pub const GRANULARITY: Duration = Duration::from_secs(60);

/// Per-site ringing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    /// Display name used in speech ("bedroom").
    pub room: String,

    pub site_id: SiteId,

    /// How long an unacknowledged alarm rings before it counts as missed.
    pub ringing_timeout: Duration,

    /// Ringtone loudness, 0--100.
    pub ringing_volume: u8,

    /// Play the ringtone on this site's speaker. When off, only the
    /// ringing notifications are published (external hardware rings).
    pub ringtone_enabled: bool,
}

impl SiteConfig {
    pub fn new(room: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            site_id: SiteId::new(site_id),
            ringing_timeout: DEFAULT_RINGING_TIMEOUT,
            ringing_volume: DEFAULT_RINGING_VOLUME,
            ringtone_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnoozeConfig {
    /// Ask "snooze or stop?" after an alarm is acknowledged.
    pub enabled: bool,

    /// Used when the answer names no duration or one outside the bounds.
    pub default_minutes: u32,
    pub min_minutes: u32,
    pub max_minutes: u32,

    /// How long to wait for the snooze answer before giving up.
    pub answer_timeout: Duration,
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_minutes: 9,
            min_minutes: 2,
            max_minutes: 10,
            answer_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sites: Vec<SiteConfig>,

    /// Room used when a new-alarm request names none.
    pub default_room: String,

    /// New alarms must be at least this far in the future.
    pub min_lead_time: Duration,

    /// Clock poll interval. Must be shorter than [`GRANULARITY`].
    pub poll_interval: Duration,

    /// How long before an alarm `sunriseStart` is announced so a wake-up
    /// light can start fading in. Zero disables the announcement.
    pub sunrise_lead: Duration,

    /// How long an acknowledged site waits for the dialogue manager to
    /// report a session before it is released.
    pub session_timeout: Duration,

    pub snooze: SnoozeConfig,

    /// Load saved alarms at startup instead of starting empty.
    pub restore_alarms: bool,

    /// JSON-lines file holding the alarms.
    pub store_path: PathBuf,

    /// WAV file to ring with. A generated beep is used when unset.
    pub ringtone_path: Option<PathBuf>,

    /// Intent name prefix (`<namespace>:newAlarm`).
    pub intent_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites: vec![SiteConfig::new("bedroom", "default")],
            default_room: "bedroom".to_string(),
            min_lead_time: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            sunrise_lead: Duration::from_secs(30 * 60),
            session_timeout: Duration::from_secs(30),
            snooze: SnoozeConfig::default(),
            restore_alarms: true,
            store_path: PathBuf::from("alarms.jsonl"),
            ringtone_path: None,
            intent_namespace: "alarmclock".to_string(),
        }
    }
}

impl Config {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(Error::Config("no sites configured".into()));
        }

        let mut rooms = HashSet::new();
        let mut ids = HashSet::new();
        for site in &self.sites {
            if !rooms.insert(site.room.as_str()) {
                return Err(Error::Config(format!("room {} configured twice", site.room)));
            }
            if !ids.insert(&site.site_id) {
                return Err(Error::Config(format!(
                    "site {} configured twice",
                    site.site_id
                )));
            }
            if site.ringing_volume > 100 {
                return Err(Error::Config(format!(
                    "ringing volume {} for {} is above 100",
                    site.ringing_volume, site.room
                )));
            }
        }

        if !rooms.contains(self.default_room.as_str()) {
            return Err(Error::Config(format!(
                "default room {} is not among the configured sites",
                self.default_room
            )));
        }

        if self.poll_interval.is_zero() || self.poll_interval >= GRANULARITY {
            return Err(Error::Config(format!(
                "poll interval {:?} must be between zero and {:?}",
                self.poll_interval, GRANULARITY
            )));
        }

        let snooze = &self.snooze;
        if snooze.min_minutes == 0 || snooze.min_minutes > snooze.max_minutes {
            return Err(Error::Config(format!(
                "snooze bounds {}..={} are invalid",
                snooze.min_minutes, snooze.max_minutes
            )));
        }
        if !(snooze.min_minutes..=snooze.max_minutes).contains(&snooze.default_minutes) {
            return Err(Error::Config(format!(
                "default snooze {} is outside {}..={}",
                snooze.default_minutes, snooze.min_minutes, snooze.max_minutes
            )));
        }

        Ok(())
    }
}

/// Parse a ringing timeout such as `30`, `30s` or `2m`.
///
/// Values below [`MIN_RINGING_TIMEOUT`] are raised to it.
pub fn parse_timeout(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (digits, scale) = match s.strip_suffix('m') {
        Some(rest) => (rest, 60),
        None => (s.strip_suffix('s').unwrap_or(s), 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid ringing timeout {s:?}")))?;

    Ok(Duration::from_secs(value * scale).max(MIN_RINGING_TIMEOUT))
}

/// Parse a site map like `bedroom:default, kitchen:kitchen-pi:60s`.
///
/// Each entry is `room:site_id` with an optional per-site ringing timeout;
/// entries without one use `template.ringing_timeout`. Volume and ringtone
/// settings come from `template`.
pub fn parse_sites(map: &str, template: &SiteConfig) -> Result<Vec<SiteConfig>> {
    map.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split(':').map(str::trim);
            let (Some(room), Some(site_id)) = (parts.next(), parts.next()) else {
                return Err(Error::Config(format!(
                    "site entry {entry:?} is not room:site_id"
                )));
            };
            if room.is_empty() || site_id.is_empty() {
                return Err(Error::Config(format!("site entry {entry:?} has an empty field")));
            }
            let ringing_timeout = match parts.next() {
                Some(timeout) => parse_timeout(timeout)?,
                None => template.ringing_timeout,
            };
            if parts.next().is_some() {
                return Err(Error::Config(format!("site entry {entry:?} has extra fields")));
            }

            Ok(SiteConfig {
                room: room.to_string(),
                site_id: SiteId::new(site_id),
                ringing_timeout,
                ..template.clone()
            })
        })
        .collect()
}

//! Authoritative alarm list.
//!
//! Every mutation is written through to the backend before the call
//! returns. Requests run against a copy of the list; the copy replaces the
//! live list only after the write succeeded, so a failed write leaves memory
//! and disk in agreement.
//!
//! Outcomes of ringing (acknowledged, stopped, missed) have already happened
//! and are applied in memory regardless. If their write fails the store is
//! left dirty and [`AlarmStore::flush`] retries it.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use time::{Date, PrimitiveDateTime};

use crate::clock::TimeSource;
use crate::error::{Error, PersistenceError, Result, ValidationError};
use crate::tracing::prelude::*;
use crate::types::{Alarm, AlarmId, AlarmRecord, SiteId, minute};

/// Durable storage for alarm records.
pub trait AlarmBackend: Send + Sync + fmt::Debug {
    fn load(&self) -> std::result::Result<Vec<AlarmRecord>, PersistenceError>;
    fn save(&self, records: &[AlarmRecord]) -> std::result::Result<(), PersistenceError>;
}

/// One JSON object per line, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonLinesFile {
    path: PathBuf,
}

impl JsonLinesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AlarmBackend for JsonLinesFile {
    /// A missing file is an empty store. Lines that fail to parse are
    /// skipped with a warning.
    fn load(&self) -> std::result::Result<Vec<AlarmRecord>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<AlarmRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping unreadable alarm record"
                ),
            }
        }
        Ok(records)
    }

    fn save(&self, records: &[AlarmRecord]) -> std::result::Result<(), PersistenceError> {
        let temp = self.temp_path();
        {
            let file = fs::File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Volatile backend for simulations and tests. Can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<AlarmRecord>>,
    fail: AtomicBool,
}

impl MemoryBackend {
    pub fn with_records(records: Vec<AlarmRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fail: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AlarmRecord> {
        self.records.lock().clone()
    }
}

impl AlarmBackend for MemoryBackend {
    fn load(&self) -> std::result::Result<Vec<AlarmRecord>, PersistenceError> {
        Ok(self.records())
    }

    fn save(&self, records: &[AlarmRecord]) -> std::result::Result<(), PersistenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("backend unavailable").into());
        }
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}

impl<T: AlarmBackend + ?Sized> AlarmBackend for Arc<T> {
    fn load(&self) -> std::result::Result<Vec<AlarmRecord>, PersistenceError> {
        (**self).load()
    }

    fn save(&self, records: &[AlarmRecord]) -> std::result::Result<(), PersistenceError> {
        (**self).save(records)
    }
}

#[derive(Debug, Clone, Default)]
struct Inner {
    alarms: Vec<Alarm>,
    next_id: AlarmId,
}

impl Inner {
    fn insert(&mut self, datetime: PrimitiveDateTime, site_id: SiteId) -> Alarm {
        self.next_id += 1;
        let alarm = Alarm {
            id: self.next_id,
            datetime,
            site_id,
            repetition: None,
            missed: false,
            fired: false,
        };
        self.alarms.push(alarm.clone());
        alarm
    }

    fn records(&self) -> Vec<AlarmRecord> {
        let mut alarms: Vec<&Alarm> = self.alarms.iter().collect();
        alarms.sort_by_key(|a| (a.datetime, a.id));
        alarms.into_iter().map(Alarm::to_record).collect()
    }
}

/// Counts from [`AlarmStore::restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub newly_missed: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct AlarmStore {
    inner: Mutex<Inner>,
    backend: Box<dyn AlarmBackend>,
    time: Arc<dyn TimeSource>,
    sites: HashSet<SiteId>,
    min_lead_time: Duration,
    /// Memory holds changes the backend has not seen.
    dirty: AtomicBool,
}

impl AlarmStore {
    pub fn new(
        backend: Box<dyn AlarmBackend>,
        time: Arc<dyn TimeSource>,
        sites: impl IntoIterator<Item = SiteId>,
        min_lead_time: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            backend,
            time,
            sites: sites.into_iter().collect(),
            min_lead_time,
            dirty: AtomicBool::new(false),
        }
    }

    /// Schedule a new alarm.
    ///
    /// `datetime` is checked at full precision against the current time and
    /// stored truncated to the minute.
    pub fn add(&self, datetime: PrimitiveDateTime, site_id: &SiteId) -> Result<Alarm> {
        self.check_site(site_id)?;

        let now = self.time.now();
        if datetime < now {
            return Err(ValidationError::InPast {
                requested: datetime,
                now,
            }
            .into());
        }
        if datetime - now < self.min_lead_time {
            return Err(ValidationError::TooSoon {
                requested: datetime,
                now,
                min_lead_secs: self.min_lead_time.as_secs() as i64,
            }
            .into());
        }

        let datetime = minute::truncate(datetime);
        let alarm = self.mutate(|inner| inner.insert(datetime, site_id.clone()))?;
        info!(
            site = %alarm.site_id,
            at = %minute::format(alarm.datetime),
            id = alarm.id,
            "Alarm added"
        );
        Ok(alarm)
    }

    /// Schedule a snooze follow-up. Exempt from the minimum lead time.
    pub fn add_snooze(&self, datetime: PrimitiveDateTime, site_id: &SiteId) -> Result<Alarm> {
        self.check_site(site_id)?;

        let datetime = minute::truncate(datetime);
        let now = minute::truncate(self.time.now());
        if datetime <= now {
            return Err(ValidationError::InPast {
                requested: datetime,
                now,
            }
            .into());
        }

        let alarm = self.mutate(|inner| inner.insert(datetime, site_id.clone()))?;
        info!(site = %alarm.site_id, at = %minute::format(alarm.datetime), "Snooze alarm added");
        Ok(alarm)
    }

    /// Remove one alarm. Returns it if it existed.
    pub fn remove(&self, id: AlarmId) -> Result<Option<Alarm>> {
        let mut removed = self.remove_all(|a| a.id == id)?;
        Ok(removed.pop())
    }

    /// Remove every alarm matching `predicate`.
    pub fn remove_all(&self, predicate: impl Fn(&Alarm) -> bool) -> Result<Vec<Alarm>> {
        {
            let inner = self.inner.lock();
            if !inner.alarms.iter().any(&predicate) {
                return Ok(Vec::new());
            }
        }

        self.mutate(|inner| {
            let (removed, kept) = std::mem::take(&mut inner.alarms)
                .into_iter()
                .partition(|a| predicate(a));
            inner.alarms = kept;
            removed
        })
    }

    /// Acknowledged alarms are done and leave the store.
    ///
    /// The removal sticks even if the write fails.
    pub fn complete(&self, id: AlarmId) -> Result<Option<Alarm>> {
        if !self.inner.lock().alarms.iter().any(|a| a.id == id) {
            return Ok(None);
        }
        self.settle(|inner| {
            let index = inner.alarms.iter().position(|a| a.id == id)?;
            Some(inner.alarms.remove(index))
        })
    }

    /// Alarms waiting to ring at or before `now`, oldest first.
    pub fn due(&self, now: PrimitiveDateTime) -> Vec<Alarm> {
        let inner = self.inner.lock();
        let mut due: Vec<Alarm> = inner
            .alarms
            .iter()
            .filter(|a| a.is_active() && a.datetime <= now)
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.datetime, a.id));
        due
    }

    /// Flag an alarm as handed to the ring controller.
    ///
    /// Runtime state only; nothing is written. Returns false if the alarm is
    /// gone or was not active.
    pub fn mark_fired(&self, id: AlarmId) -> bool {
        let mut inner = self.inner.lock();
        match inner.alarms.iter_mut().find(|a| a.id == id) {
            Some(alarm) if alarm.is_active() => {
                alarm.fired = true;
                true
            }
            _ => false,
        }
    }

    /// Move an alarm to the missed bucket.
    ///
    /// The alarm is missed in memory even if the write fails.
    pub fn mark_missed(&self, id: AlarmId) -> Result<bool> {
        if !self.inner.lock().alarms.iter().any(|a| a.id == id) {
            return Ok(false);
        }
        self.settle(|inner| match inner.alarms.iter_mut().find(|a| a.id == id) {
            Some(alarm) => {
                alarm.missed = true;
                alarm.fired = false;
                true
            }
            None => false,
        })
    }

    /// Pending alarms, soonest first, optionally limited to one site and
    /// one calendar day.
    pub fn active(&self, site_id: Option<&SiteId>, on: Option<Date>) -> Vec<Alarm> {
        let inner = self.inner.lock();
        let mut alarms: Vec<Alarm> = inner
            .alarms
            .iter()
            .filter(|a| !a.missed)
            .filter(|a| site_id.is_none_or(|s| &a.site_id == s))
            .filter(|a| on.is_none_or(|d| a.datetime.date() == d))
            .cloned()
            .collect();
        alarms.sort_by_key(|a| (a.datetime, a.id));
        alarms
    }

    /// Missed alarms, most recent first.
    pub fn missed(&self, site_id: Option<&SiteId>) -> Vec<Alarm> {
        let inner = self.inner.lock();
        let mut alarms: Vec<Alarm> = inner
            .alarms
            .iter()
            .filter(|a| a.missed)
            .filter(|a| site_id.is_none_or(|s| &a.site_id == s))
            .cloned()
            .collect();
        alarms.sort_by_key(|a| std::cmp::Reverse((a.datetime, a.id)));
        alarms
    }

    /// Durable form of every alarm, in schedule order.
    pub fn records(&self) -> Vec<AlarmRecord> {
        self.inner.lock().records()
    }

    /// Write the current list to the backend.
    pub fn persist(&self) -> Result<()> {
        let inner = self.inner.lock();
        self.save(&inner)
    }

    /// Whether memory holds changes whose write failed.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Retry a failed write. Returns whether anything was written.
    pub fn flush(&self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.persist()?;
        info!("Saved alarms after an earlier write failure");
        Ok(true)
    }

    /// Replace the in-memory list with the backend's contents.
    ///
    /// Records for unconfigured sites are dropped. Records in the past are
    /// reclassified as missed. An unreadable backend leaves the store empty
    /// rather than failing startup.
    pub fn restore(&self) -> RestoreSummary {
        let records = match self.backend.load() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load saved alarms, starting empty");
                return RestoreSummary::default();
            }
        };

        let now = minute::truncate(self.time.now());
        let mut summary = RestoreSummary::default();
        let mut restored = Inner::default();

        for record in records {
            if !self.sites.contains(&record.site_id) {
                warn!(
                    site = %record.site_id,
                    at = %minute::format(record.datetime),
                    "Dropping saved alarm for unknown site"
                );
                summary.dropped += 1;
                continue;
            }

            let datetime = minute::truncate(record.datetime);
            let missed = record.missed || datetime < now;
            if missed && !record.missed {
                summary.newly_missed += 1;
            }

            restored.next_id += 1;
            restored.alarms.push(Alarm {
                id: restored.next_id,
                datetime,
                site_id: record.site_id,
                repetition: record.repetition,
                missed,
                fired: false,
            });
            summary.restored += 1;
        }

        *self.inner.lock() = restored;

        if (summary.newly_missed > 0 || summary.dropped > 0)
            && let Err(e) = self.persist()
        {
            warn!(error = %e, "Failed to rewrite restored alarms");
        }

        info!(
            restored = summary.restored,
            newly_missed = summary.newly_missed,
            dropped = summary.dropped,
            "Alarms restored"
        );
        summary
    }

    fn check_site(&self, site_id: &SiteId) -> Result<()> {
        if self.sites.contains(site_id) {
            Ok(())
        } else {
            Err(Error::UnknownSite(site_id.clone()))
        }
    }

    /// Apply a requested change only if it can be written.
    fn mutate<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R> {
        let mut inner = self.inner.lock();
        let mut next = inner.clone();
        let result = f(&mut next);
        if let Err(e) = self.backend.save(&next.records()) {
            error!(error = %e, "Failed to persist alarms, change rolled back");
            return Err(e.into());
        }
        *inner = next;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(result)
    }

    /// Apply a change that already happened, then try to write it.
    fn settle<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R> {
        let mut inner = self.inner.lock();
        let result = f(&mut inner);
        self.save(&inner)?;
        Ok(result)
    }

    fn save(&self, inner: &Inner) -> Result<()> {
        match self.backend.save(&inner.records()) {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use test_case::test_case;
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2024-03-01 07:00);

    fn bedroom() -> SiteId {
        SiteId::from("bedroom")
    }

    fn store_with(backend: Arc<MemoryBackend>) -> (AlarmStore, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(NOW));
        let store = AlarmStore::new(
            Box::new(backend),
            time.clone(),
            [bedroom(), SiteId::from("kitchen")],
            Duration::from_secs(120),
        );
        (store, time)
    }

    fn store() -> (AlarmStore, Arc<MemoryBackend>, Arc<ManualTimeSource>) {
        let backend = Arc::new(MemoryBackend::default());
        let (store, time) = store_with(backend.clone());
        (store, backend, time)
    }

    #[test]
    fn should_accept_alarm_beyond_lead_time() {
        let (store, backend, _) = store();

        let alarm = store.add(datetime!(2024-03-01 07:02:10), &bedroom()).unwrap();

        assert_eq!(alarm.datetime, datetime!(2024-03-01 07:02));
        assert_eq!(backend.records().len(), 1);
    }

    #[test_case(datetime!(2024-03-01 07:00:30) ; "thirty seconds ahead")]
    #[test_case(datetime!(2024-03-01 07:01:59) ; "just under lead time")]
    fn should_reject_alarm_within_lead_time(at: PrimitiveDateTime) {
        let (store, backend, _) = store();

        let err = store.add(at, &bedroom()).unwrap_err();

        assert!(matches!(err, Error::Validation(ValidationError::TooSoon { .. })));
        assert!(backend.records().is_empty());
    }

    #[test]
    fn should_reject_alarm_in_past() {
        let (store, _, _) = store();
        let err = store.add(datetime!(2024-03-01 06:59), &bedroom()).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InPast { .. })));
    }

    #[test]
    fn should_reject_unknown_site() {
        let (store, _, _) = store();
        let err = store.add(datetime!(2024-03-01 08:00), &SiteId::from("attic")).unwrap_err();
        assert!(matches!(err, Error::UnknownSite(s) if s == SiteId::from("attic")));
    }

    #[test]
    fn snooze_skips_lead_time_but_not_past_check() {
        let (store, _, _) = store();

        store.add_snooze(datetime!(2024-03-01 07:01), &bedroom()).unwrap();
        assert!(store.add_snooze(NOW, &bedroom()).is_err());
    }

    #[test]
    fn due_is_inclusive_and_ordered() {
        let (store, _, _) = store();
        let late = store.add(datetime!(2024-03-01 07:10), &bedroom()).unwrap();
        let early = store.add(datetime!(2024-03-01 07:05), &SiteId::from("kitchen")).unwrap();
        let tie = store.add(datetime!(2024-03-01 07:10), &SiteId::from("kitchen")).unwrap();
        store.add(datetime!(2024-03-01 07:11), &bedroom()).unwrap();

        let due: Vec<_> = store.due(datetime!(2024-03-01 07:10)).iter().map(|a| a.id).collect();

        assert_eq!(due, vec![early.id, late.id, tie.id]);
    }

    #[test]
    fn fired_alarms_are_not_due_again() {
        let (store, _, _) = store();
        let alarm = store.add(datetime!(2024-03-01 07:05), &bedroom()).unwrap();

        assert!(store.mark_fired(alarm.id));
        assert!(store.due(datetime!(2024-03-01 07:30)).is_empty());
        assert!(!store.mark_fired(alarm.id));
    }

    #[test]
    fn missed_alarms_are_listed_most_recent_first() {
        let (store, _, _) = store();
        let first = store.add(datetime!(2024-03-01 07:05), &bedroom()).unwrap();
        let second = store.add(datetime!(2024-03-01 07:06), &bedroom()).unwrap();
        store.mark_missed(first.id).unwrap();
        store.mark_missed(second.id).unwrap();

        let missed: Vec<_> = store.missed(Some(&bedroom())).iter().map(|a| a.id).collect();
        assert_eq!(missed, vec![second.id, first.id]);
        assert!(store.active(None, None).is_empty());
        assert!(store.due(datetime!(2024-03-01 08:00)).is_empty());
    }

    #[test]
    fn active_filters_by_site_and_day() {
        let (store, _, _) = store();
        store.add(datetime!(2024-03-01 08:00), &bedroom()).unwrap();
        store.add(datetime!(2024-03-02 08:00), &bedroom()).unwrap();
        store.add(datetime!(2024-03-01 09:00), &SiteId::from("kitchen")).unwrap();

        assert_eq!(store.active(None, None).len(), 3);
        assert_eq!(store.active(Some(&bedroom()), None).len(), 2);
        assert_eq!(
            store.active(Some(&bedroom()), Some(time::macros::date!(2024-03-02))).len(),
            1
        );
    }

    #[test]
    fn failed_save_rolls_back() {
        let (store, backend, _) = store();
        let kept = store.add(datetime!(2024-03-01 08:00), &bedroom()).unwrap();

        backend.set_failing(true);
        let err = store.add(datetime!(2024-03-01 09:00), &bedroom()).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.remove(kept.id).is_err());

        let ids: Vec<_> = store.active(None, None).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![kept.id]);
        assert_eq!(backend.records().len(), 1);
    }

    #[test]
    fn missed_and_completed_survive_failed_save() {
        let (store, backend, time) = store();
        let missed = store.add(datetime!(2024-03-01 07:05), &bedroom()).unwrap();
        let acked = store.add(datetime!(2024-03-01 07:06), &bedroom()).unwrap();
        time.set(datetime!(2024-03-01 07:06));

        backend.set_failing(true);
        assert!(store.mark_missed(missed.id).is_err());
        assert!(store.complete(acked.id).is_err());

        assert!(store.is_dirty());
        assert!(store.due(time.now()).is_empty());
        assert!(store.active(None, None).is_empty());
        assert_eq!(store.missed(None)[0].id, missed.id);
        assert_eq!(backend.records().len(), 2);
        assert!(!backend.records()[0].missed);

        assert!(store.flush().is_err());
        backend.set_failing(false);
        assert!(store.flush().unwrap());
        assert!(!store.is_dirty());
        assert!(!store.flush().unwrap());

        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].missed);
        assert_eq!(records[0].datetime, datetime!(2024-03-01 07:05));
    }

    #[test]
    fn remove_all_removes_matching_only() {
        let (store, backend, _) = store();
        store.add(datetime!(2024-03-01 08:00), &bedroom()).unwrap();
        store.add(datetime!(2024-03-01 09:00), &SiteId::from("kitchen")).unwrap();

        let removed = store.remove_all(|a| a.site_id == bedroom()).unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(backend.records().len(), 1);
        assert_eq!(backend.records()[0].site_id, SiteId::from("kitchen"));
    }

    #[test]
    fn restore_marks_past_alarms_missed_and_drops_unknown_sites() {
        let record = |dt, site: &str, missed| AlarmRecord {
            datetime: dt,
            site_id: SiteId::from(site),
            repetition: None,
            missed,
        };
        let backend = Arc::new(MemoryBackend::with_records(vec![
            record(datetime!(2024-03-01 06:00), "bedroom", false),
            record(datetime!(2024-03-01 05:00), "bedroom", true),
            record(datetime!(2024-03-01 09:00), "kitchen", false),
            record(datetime!(2024-03-01 09:00), "attic", false),
        ]));
        let (store, _) = store_with(backend.clone());

        let summary = store.restore();

        assert_eq!(
            summary,
            RestoreSummary {
                restored: 3,
                newly_missed: 1,
                dropped: 1,
            }
        );
        assert_eq!(store.missed(None).len(), 2);
        assert_eq!(store.active(None, None).len(), 1);
        assert!(backend.records().iter().all(|r| r.site_id.as_str() != "attic"));
        assert!(
            backend
                .records()
                .iter()
                .filter(|r| r.datetime < NOW)
                .all(|r| r.missed)
        );
    }

    #[test]
    fn json_lines_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonLinesFile::new(dir.path().join("alarms.jsonl"));
        let records = vec![AlarmRecord {
            datetime: datetime!(2024-03-01 07:30),
            site_id: bedroom(),
            repetition: None,
            missed: true,
        }];

        file.save(&records).unwrap();

        assert_eq!(file.load().unwrap(), records);
        let text = fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            text,
            "{\"datetime\":\"2024-03-01T07:30\",\"siteId\":\"bedroom\",\"repetition\":null,\"missed\":true}\n"
        );
        assert!(!file.temp_path().exists());
    }

    #[test]
    fn json_lines_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonLinesFile::new(dir.path().join("absent.jsonl"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn json_lines_file_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.jsonl");
        fs::write(
            &path,
            "not json\n{\"datetime\":\"2024-03-01 07:30\",\"siteId\":\"bedroom\"}\n\n",
        )
        .unwrap();

        let records = JsonLinesFile::new(&path).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].datetime, datetime!(2024-03-01 07:30));
    }
}

// ABOUTME: Observed facts about a running workload, written by background watchers.
// ABOUTME: Runtime accessors read this cache instead of calling the backend.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct Observed {
    exit_code: Mutex<Option<i64>>,
    started: Mutex<Option<DateTime<Utc>>>,
    finished: Mutex<Option<DateTime<Utc>>>,
    ip_address: Mutex<Option<String>>,
    host: Mutex<Option<String>>,
}

impl Observed {
    pub fn exit_code(&self) -> Option<i64> {
        *self.exit_code.lock()
    }

    pub fn set_exit_code(&self, code: i64) {
        *self.exit_code.lock() = Some(code);
    }

    /// First start time wins; later reports of the same start are ignored.
    pub fn mark_started(&self, at: DateTime<Utc>) {
        self.started.lock().get_or_insert(at);
    }

    pub fn mark_finished(&self, at: DateTime<Utc>) {
        self.finished.lock().get_or_insert(at);
    }

    pub fn duration(&self) -> Option<Duration> {
        let started = (*self.started.lock())?;
        let end = self.finished.lock().unwrap_or_else(Utc::now);
        (end - started).to_std().ok()
    }

    pub fn ip_address(&self) -> Option<String> {
        self.ip_address.lock().clone()
    }

    pub fn set_ip_address(&self, ip: Option<String>) {
        if ip.as_deref().is_some_and(|s| !s.is_empty()) {
            *self.ip_address.lock() = ip;
        }
    }

    pub fn host(&self) -> Option<String> {
        self.host.lock().clone()
    }

    pub fn set_host(&self, host: Option<String>) {
        if host.as_deref().is_some_and(|s| !s.is_empty()) {
            *self.host.lock() = host;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn duration_is_none_before_start() {
        assert!(Observed::default().duration().is_none());
    }

    #[test]
    fn finished_run_has_fixed_duration() {
        let obs = Observed::default();
        let start = Utc::now() - TimeDelta::seconds(30);
        obs.mark_started(start);
        obs.mark_finished(start + TimeDelta::seconds(12));
        obs.mark_finished(start + TimeDelta::seconds(20));
        assert_eq!(obs.duration(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn empty_addresses_are_ignored() {
        let obs = Observed::default();
        obs.set_ip_address(Some(String::new()));
        assert_eq!(obs.ip_address(), None);
        obs.set_ip_address(Some("10.0.0.7".into()));
        obs.set_ip_address(None);
        assert_eq!(obs.ip_address().as_deref(), Some("10.0.0.7"));
    }
}

use chrono::{DateTime, Duration, Utc};

use crate::clock::Debounce;

pub const AUTOSAVE_DELAY_MS: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutosaveStatus {
    /// Buffer equals the last synced content.
    Clean,
    /// Edited with autosave off; waits for a manual save.
    Dirty,
    /// Edited with autosave on; a save fires when the debounce expires.
    DirtyPending,
    /// A write was issued for the buffer.
    Saved,
}

impl AutosaveStatus {
    pub fn label(self) -> &'static str {
        match self {
            AutosaveStatus::Clean => "",
            AutosaveStatus::Dirty => "Unsaved changes",
            AutosaveStatus::DirtyPending => "Saving…",
            AutosaveStatus::Saved => "Saved",
        }
    }
}

/// Editor buffer plus the debounce deciding when it is written back.
#[derive(Clone, Debug)]
pub struct Autosave {
    buffer: String,
    synced: String,
    debounce: Debounce,
    status: AutosaveStatus,
}

impl Autosave {
    pub fn new(content: &str) -> Self {
        Self::with_delay(content, Duration::milliseconds(AUTOSAVE_DELAY_MS))
    }

    pub fn with_delay(content: &str, delay: Duration) -> Self {
        Self {
            buffer: content.to_string(),
            synced: content.to_string(),
            debounce: Debounce::new(delay),
            status: AutosaveStatus::Clean,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn status(&self) -> AutosaveStatus {
        self.status
    }

    pub fn synced(&self) -> &str {
        &self.synced
    }

    pub fn is_dirty(&self) -> bool {
        self.buffer != self.synced
    }

    /// Time left until a scheduled save is due.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.debounce.remaining(now)
    }

    /// Records a keystroke. Returns the deadline when a save got scheduled.
    pub fn edit(
        &mut self,
        text: String,
        now: DateTime<Utc>,
        autosave: bool,
    ) -> Option<DateTime<Utc>> {
        self.buffer = text;
        if !self.is_dirty() {
            self.debounce.cancel();
            self.status = AutosaveStatus::Clean;
            return None;
        }
        if autosave {
            self.status = AutosaveStatus::DirtyPending;
            Some(self.debounce.trigger(now))
        } else {
            self.debounce.cancel();
            self.status = AutosaveStatus::Dirty;
            None
        }
    }

    /// The buffer to write once the debounce has expired, at most once per
    /// quiet period.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<String> {
        if !self.debounce.poll(now) || !self.is_dirty() {
            return None;
        }
        Some(self.mark_synced())
    }

    /// Manual save: always yields the buffer and cancels a pending autosave.
    pub fn save_now(&mut self) -> String {
        self.debounce.cancel();
        self.mark_synced()
    }

    /// Rolls back the bookkeeping of a write of `written` that did not go
    /// through. Ignored once something else has been synced since.
    pub fn save_failed(&mut self, written: &str, previous: &str) {
        if self.synced != written {
            return;
        }
        self.synced = previous.to_string();
        self.status = if self.is_dirty() {
            AutosaveStatus::Dirty
        } else {
            AutosaveStatus::Clean
        };
    }

    /// Adopts content pushed from outside (e.g. the store after a save or
    /// reload) when it differs from what we last synced. Never schedules a
    /// save.
    pub fn sync_external(&mut self, content: &str) -> bool {
        if content == self.synced {
            return false;
        }
        self.reset(content);
        true
    }

    /// Starts over on a different document.
    pub fn reset(&mut self, content: &str) {
        self.buffer = content.to_string();
        self.synced = content.to_string();
        self.debounce.cancel();
        self.status = AutosaveStatus::Clean;
    }

    fn mark_synced(&mut self) -> String {
        self.synced = self.buffer.clone();
        self.status = AutosaveStatus::Saved;
        self.buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn saves_once_after_quiet_period() {
        let mut autosave = Autosave::new("# Doc");
        autosave.edit("# Doc!".into(), at(0), true);
        autosave.edit("# Doc!!".into(), at(200), true);
        assert_eq!(autosave.status(), AutosaveStatus::DirtyPending);

        assert_eq!(autosave.poll(at(500)), None);
        assert_eq!(autosave.poll(at(699)), None);
        assert_eq!(autosave.poll(at(700)), Some("# Doc!!".to_string()));
        assert_eq!(autosave.status(), AutosaveStatus::Saved);
        assert_eq!(autosave.poll(at(5_000)), None);
    }

    #[test]
    fn reverting_to_synced_content_cancels_the_save() {
        let mut autosave = Autosave::new("a");
        autosave.edit("ab".into(), at(0), true);
        autosave.edit("a".into(), at(100), true);
        assert_eq!(autosave.status(), AutosaveStatus::Clean);
        assert_eq!(autosave.poll(at(1_000)), None);
    }

    #[test]
    fn disabled_autosave_waits_for_manual_save() {
        let mut autosave = Autosave::new("a");
        assert_eq!(autosave.edit("ab".into(), at(0), false), None);
        assert_eq!(autosave.status(), AutosaveStatus::Dirty);
        assert_eq!(autosave.poll(at(10_000)), None);
        assert_eq!(autosave.save_now(), "ab");
        assert!(!autosave.is_dirty());
    }

    #[test]
    fn external_content_resyncs_without_saving() {
        let mut autosave = Autosave::new("first");
        assert!(!autosave.sync_external("first"));
        assert!(autosave.sync_external("second"));
        assert_eq!(autosave.buffer(), "second");
        assert_eq!(autosave.status(), AutosaveStatus::Clean);
        assert_eq!(autosave.poll(at(10_000)), None);
    }

    #[test]
    fn failed_write_leaves_the_buffer_dirty() {
        let mut autosave = Autosave::new("v1");
        autosave.edit("v2".into(), at(0), true);
        let previous = autosave.synced().to_string();
        let written = autosave.poll(at(500)).unwrap();
        assert!(!autosave.is_dirty());

        autosave.save_failed(&written, &previous);
        assert!(autosave.is_dirty());
        assert_eq!(autosave.status(), AutosaveStatus::Dirty);
        assert_eq!(autosave.save_now(), "v2");
    }

    #[test]
    fn echo_of_our_own_save_keeps_newer_keystrokes() {
        let mut autosave = Autosave::new("v1");
        autosave.edit("v2".into(), at(0), true);
        let written = autosave.poll(at(500)).unwrap();
        autosave.edit("v3".into(), at(600), true);

        // The store publishes the saved row while v3 is still pending.
        assert!(!autosave.sync_external(&written));
        assert_eq!(autosave.buffer(), "v3");
        assert_eq!(autosave.poll(at(1_100)), Some("v3".to_string()));
    }
}

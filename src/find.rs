use chrono::{DateTime, Duration, Utc};
use regex::RegexBuilder;

use crate::clock::Debounce;

/// Quiet period before a rendered-preview search runs.
pub const PREVIEW_FIND_DELAY_MS: i64 = 200;

/// Byte range of one match inside the scanned text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchRange {
    pub start: usize,
    pub end: usize,
}

impl MatchRange {
    /// The same range in UTF-16 code units, as the DOM counts offsets.
    /// `None` when the range does not fit `text`.
    pub fn to_utf16(self, text: &str) -> Option<(u32, u32)> {
        let start = text.get(..self.start)?.encode_utf16().count();
        let len = text.get(self.start..self.end)?.encode_utf16().count();
        Some((start as u32, (start + len) as u32))
    }
}

/// State of a find overlay: query, matches in the last scanned text, and
/// the current match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindState {
    query: String,
    scanned: Option<String>,
    matches: Vec<MatchRange>,
    current: Option<usize>,
}

impl FindState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn count(&self) -> usize {
        self.matches.len()
    }

    /// Zero-based index of the current match, `-1` when there is none.
    pub fn index(&self) -> i32 {
        self.current.map(|i| i as i32).unwrap_or(-1)
    }

    pub fn current_match(&self) -> Option<MatchRange> {
        self.current.map(|i| self.matches[i])
    }

    /// "3 of 7" style label, or "No results" for a non-empty query.
    pub fn status(&self) -> String {
        match self.current {
            Some(i) => format!("{} of {}", i + 1, self.matches.len()),
            None if self.query.is_empty() => String::new(),
            None => "No results".to_string(),
        }
    }

    /// Sets the query and rescans `text`. The current match resets to the
    /// first one.
    pub fn search(&mut self, text: &str, query: &str) {
        self.query = query.to_string();
        self.scan(text);
    }

    /// Rescans only when `text` differs from what was last scanned, keeping
    /// the current index when it is still in range.
    pub fn refresh(&mut self, text: &str) {
        self.refresh_changed(text);
    }

    fn refresh_changed(&mut self, text: &str) -> bool {
        if self.scanned.is_none() || self.scanned.as_deref() == Some(text) {
            return false;
        }
        let previous = self.current;
        self.scan(text);
        if let Some(previous) = previous {
            if previous < self.matches.len() {
                self.current = Some(previous);
            }
        }
        true
    }

    /// Advances to the next match in `text`, rescanning first if `text`
    /// changed since the last scan.
    pub fn next(&mut self, text: &str) -> Option<MatchRange> {
        if self.refresh_changed(text) {
            return self.current_match();
        }
        let count = self.matches.len();
        if count == 0 {
            return None;
        }
        let next = self.current.map(|i| (i + 1) % count).unwrap_or(0);
        self.current = Some(next);
        self.current_match()
    }

    pub fn previous(&mut self, text: &str) -> Option<MatchRange> {
        if self.refresh_changed(text) {
            return self.current_match();
        }
        let count = self.matches.len();
        if count == 0 {
            return None;
        }
        let previous = self.current.map(|i| (i + count - 1) % count).unwrap_or(count - 1);
        self.current = Some(previous);
        self.current_match()
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }

    fn scan(&mut self, text: &str) {
        self.matches = find_matches(text, &self.query);
        self.current = if self.matches.is_empty() { None } else { Some(0) };
        self.scanned = Some(text.to_string());
    }
}

/// A find query held back until typing pauses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingQuery {
    query: Option<String>,
    debounce: Debounce,
}

impl PendingQuery {
    pub fn new(delay: Duration) -> Self {
        Self {
            query: None,
            debounce: Debounce::new(delay),
        }
    }

    /// Replaces the held query and restarts the quiet period. Returns how
    /// long to wait before polling.
    pub fn push(&mut self, query: &str, now: DateTime<Utc>) -> Duration {
        self.query = Some(query.to_string());
        self.debounce.trigger(now);
        self.debounce.delay()
    }

    /// The query, once the quiet period has passed. Released at most once
    /// per `push`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<String> {
        if !self.debounce.poll(now) {
            return None;
        }
        self.query.take()
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.debounce.remaining(now)
    }

    pub fn cancel(&mut self) {
        self.query = None;
        self.debounce.cancel();
    }
}

/// Non-overlapping, case-insensitive, literal occurrences of `query`.
pub fn find_matches(text: &str, query: &str) -> Vec<MatchRange> {
    if query.is_empty() {
        return Vec::new();
    }
    let pattern = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern,
        Err(err) => {
            log::warn!("find pattern rejected: {err}");
            return Vec::new();
        }
    };
    pattern
        .find_iter(text)
        .map(|m| MatchRange {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Rust is fun. rust is fast. RUST!";

    #[test]
    fn counts_case_insensitive_literal_matches() {
        let mut find = FindState::new();
        find.search(TEXT, "rust");
        assert_eq!(find.count(), 3);
        assert_eq!(find.index(), 0);
        assert_eq!(find.status(), "1 of 3");

        find.search("a.b axb a.b", "a.b");
        assert_eq!(find.count(), 2);

        find.search("aaaa", "aa");
        assert_eq!(find.count(), 2);
    }

    #[test]
    fn empty_query_has_no_matches() {
        let mut find = FindState::new();
        find.search(TEXT, "");
        assert_eq!(find.count(), 0);
        assert_eq!(find.index(), -1);
        assert_eq!(find.next(TEXT), None);
        assert_eq!(find.status(), "");

        find.search(TEXT, "python");
        assert_eq!(find.index(), -1);
        assert_eq!(find.status(), "No results");
    }

    #[test]
    fn navigation_wraps_both_ways() {
        let mut find = FindState::new();
        find.search(TEXT, "rust");
        let start = find.index();
        for _ in 0..find.count() {
            find.next(TEXT);
        }
        assert_eq!(find.index(), start);

        find.previous(TEXT);
        assert_eq!(find.index(), 2);
        find.next(TEXT);
        assert_eq!(find.index(), 0);

        find.next(TEXT);
        let before = find.index();
        find.previous(TEXT);
        find.next(TEXT);
        assert_eq!(find.index(), before);
    }

    #[test]
    fn refresh_rescans_only_on_change() {
        let mut find = FindState::new();
        find.search(TEXT, "rust");
        find.next(TEXT);
        find.refresh(TEXT);
        assert_eq!(find.index(), 1);

        find.refresh("rust only once");
        assert_eq!(find.count(), 1);
        assert_eq!(find.index(), 0);
    }

    #[test]
    fn close_clears_everything() {
        let mut find = FindState::new();
        find.search(TEXT, "fun");
        find.close();
        assert_eq!(find, FindState::default());
    }

    #[test]
    fn utf16_offsets_account_for_wide_chars() {
        let text = "héllo 😀 world";
        let matches = find_matches(text, "WORLD");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].to_utf16(text), Some((9, 14)));
        assert_eq!(matches[0].to_utf16("short"), None);
        assert_eq!(MatchRange { start: 1, end: 2 }.to_utf16("é"), None);
    }

    #[test]
    fn navigation_rescans_text_that_changed_underneath() {
        let long = "# Notes about rust\n\nMore rust here, and rust again.";
        let mut find = FindState::new();
        find.search(long, "rust");
        find.next(long);
        find.next(long);
        assert_eq!(find.index(), 2);

        let short = "rust?";
        let found = find.next(short).unwrap();
        assert_eq!(found, MatchRange { start: 0, end: 4 });
        assert_eq!(found.to_utf16(short), Some((0, 4)));
        assert_eq!(find.status(), "1 of 1");

        assert_eq!(find.previous("nothing left"), None);
        assert_eq!(find.status(), "No results");
    }

    #[test]
    fn pending_query_waits_for_a_quiet_period() {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let delay = Duration::milliseconds(PREVIEW_FIND_DELAY_MS);
        let mut pending = PendingQuery::new(delay);

        assert_eq!(pending.push("ru", start), delay);
        assert_eq!(pending.poll(start + Duration::milliseconds(150)), None);

        let typed = start + Duration::milliseconds(150);
        pending.push("rust", typed);
        assert_eq!(pending.poll(typed + Duration::milliseconds(199)), None);
        assert_eq!(
            pending.remaining(typed + Duration::milliseconds(199)),
            Some(Duration::milliseconds(1))
        );

        assert_eq!(pending.poll(typed + delay), Some("rust".to_string()));
        assert_eq!(pending.poll(typed + delay * 2), None);

        pending.push("gone", typed);
        pending.cancel();
        assert_eq!(pending.poll(typed + delay), None);
    }
}

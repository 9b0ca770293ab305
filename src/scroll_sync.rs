use chrono::{DateTime, Duration, Utc};

/// How long the pane that started a scroll stays the only accepted source.
pub const SOURCE_WINDOW_MS: i64 = 50;
/// Scroll events are coalesced for this long before syncing.
pub const SCROLL_DEBOUNCE_MS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    Editor,
    Preview,
}

impl Pane {
    pub fn other(self) -> Self {
        match self {
            Pane::Editor => Pane::Preview,
            Pane::Preview => Pane::Editor,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn of(element: &web_sys::Element) -> Self {
        Self {
            scroll_top: f64::from(element.scroll_top()),
            scroll_height: f64::from(element.scroll_height()),
            client_height: f64::from(element.client_height()),
        }
    }

    fn range(&self) -> f64 {
        self.scroll_height - self.client_height
    }
}

/// Scrolled fraction of `metrics`, in `0.0..=1.0`. Content that fits the
/// viewport divides by 1 instead of 0.
pub fn scroll_ratio(metrics: &ScrollMetrics) -> f64 {
    let range = metrics.range();
    let denominator = if range > 0.0 { range } else { 1.0 };
    (metrics.scroll_top / denominator).clamp(0.0, 1.0)
}

pub fn target_offset(metrics: &ScrollMetrics, ratio: f64) -> f64 {
    (ratio * metrics.range().max(0.0)).round()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollUpdate {
    pub pane: Pane,
    pub scroll_top: f64,
}

/// Proportional scroll coupling between editor and preview.
///
/// The pane a sync starts from becomes the active source for a short
/// window; scroll events from the other pane inside that window are the
/// echo of our own write and are ignored.
#[derive(Clone, Debug)]
pub struct ScrollSync {
    window: Duration,
    active: Option<(Pane, DateTime<Utc>)>,
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new(Duration::milliseconds(SOURCE_WINDOW_MS))
    }
}

impl ScrollSync {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            active: None,
        }
    }

    pub fn on_scroll(
        &mut self,
        source: Pane,
        source_metrics: &ScrollMetrics,
        target_metrics: &ScrollMetrics,
        now: DateTime<Utc>,
    ) -> Option<ScrollUpdate> {
        if let Some((active, until)) = self.active {
            if active != source && now < until {
                return None;
            }
        }
        self.active = Some((source, now + self.window));
        let ratio = scroll_ratio(source_metrics);
        Some(ScrollUpdate {
            pane: source.other(),
            scroll_top: target_offset(target_metrics, ratio),
        })
    }

    pub fn reset(&mut self) {
        self.active = None;
    }
}

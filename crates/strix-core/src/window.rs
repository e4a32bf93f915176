//! Sliding-window event storage.
//!
//! A bounded FIFO ring of recent events plus lazily-created named rings for
//! auxiliary views. Appends evict the oldest entry once a ring is full, so
//! memory stays bounded for any input length.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::config::WindowConfig;
use crate::error::Error;
use crate::event::Event;

pub struct WindowManager {
    capacity: usize,
    named_capacity: usize,
    buffer: VecDeque<Event>,
    windows: HashMap<String, NamedRing>,
}

/// A named ring remembers the capacity it was created with; later calls that
/// pass a different size do not resize it.
struct NamedRing {
    capacity: usize,
    ring: VecDeque<Event>,
}

impl NamedRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, event: Event) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(event);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub buffer_size: usize,
    pub window_count: usize,
    pub windows: HashMap<String, usize>,
}

impl WindowManager {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            named_capacity: config.named_capacity.max(1),
            buffer: VecDeque::with_capacity(config.capacity.max(1)),
            windows: HashMap::new(),
        }
    }

    /// Append to the main ring, stamping a missing timestamp and caching the
    /// parsed epoch. Evicts the oldest event when full.
    pub fn add_event(&mut self, mut event: Event) {
        event.stamp();
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Last `count` events in arrival order; all events when `count` is
    /// `None`.
    pub fn get_recent_events(&self, count: Option<usize>) -> Vec<Event> {
        let n = count.unwrap_or(self.buffer.len()).min(self.buffer.len());
        self.buffer.iter().skip(self.buffer.len() - n).cloned().collect()
    }

    /// Events whose timestamp falls within `seconds` of the newest event's
    /// timestamp. The scan walks backwards and stops at the first event
    /// outside the range, so a single out-of-order event ends the scan.
    /// A malformed timestamp aborts the query.
    pub fn get_time_window(&self, seconds: f64) -> Result<Vec<Event>, Error> {
        let newest = match self.buffer.back() {
            Some(ev) => ev,
            None => return Ok(Vec::new()),
        };
        let cutoff = newest.epoch_seconds_strict()? - seconds;

        let mut result: VecDeque<Event> = VecDeque::new();
        for event in self.buffer.iter().rev() {
            if event.epoch_seconds_strict()? >= cutoff {
                result.push_front(event.clone());
            } else {
                break;
            }
        }
        Ok(result.into())
    }

    /// Append to a named ring, creating it with `size` (or the default named
    /// capacity) on first use.
    pub fn update_window(&mut self, name: &str, event: Event, size: Option<usize>) {
        let cap = size.unwrap_or(self.named_capacity).max(1);
        self.windows
            .entry(name.to_string())
            .or_insert_with(|| NamedRing::new(cap))
            .push(event);
    }

    /// Contents of a named ring, creating an empty one on first use.
    pub fn get_window(&mut self, name: &str, size: Option<usize>) -> Vec<Event> {
        let cap = size.unwrap_or(self.named_capacity).max(1);
        self.windows
            .entry(name.to_string())
            .or_insert_with(|| NamedRing::new(cap))
            .ring
            .iter()
            .cloned()
            .collect()
    }

    /// Clear a single named window, or all state when `name` is `None`.
    pub fn clear(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                if let Some(named) = self.windows.get_mut(name) {
                    named.ring.clear();
                }
            }
            None => {
                self.buffer.clear();
                self.windows.clear();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            buffer_size: self.buffer.len(),
            window_count: self.windows.len(),
            windows: self
                .windows
                .iter()
                .map(|(name, named)| (name.clone(), named.ring.len()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(capacity: usize) -> WindowManager {
        WindowManager::new(&WindowConfig {
            capacity,
            named_capacity: 3,
            feature_window: 100,
        })
    }

    fn event_at(ts: &str, endpoint: &str) -> Event {
        Event {
            timestamp: Some(ts.to_string()),
            endpoint: Some(endpoint.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_bounded_and_ordered() {
        let mut wm = manager(3);
        for i in 0..5 {
            wm.add_event(event_at(
                &format!("2026-08-01 10:00:0{}.000000", i),
                &format!("/e{}", i),
            ));
        }
        assert_eq!(wm.len(), 3);
        let recent = wm.get_recent_events(Some(2));
        assert_eq!(recent[0].endpoint.as_deref(), Some("/e3"));
        assert_eq!(recent[1].endpoint.as_deref(), Some("/e4"));
    }

    #[test]
    fn test_missing_timestamp_is_stamped() {
        let mut wm = manager(10);
        wm.add_event(Event::default());
        let events = wm.get_recent_events(None);
        assert!(events[0].timestamp.is_some());
        assert!(events[0].epoch.is_some());
    }

    #[test]
    fn test_time_window_anchors_on_newest() {
        let mut wm = manager(10);
        wm.add_event(event_at("2026-08-01 10:00:00.000000", "/a"));
        wm.add_event(event_at("2026-08-01 10:00:05.000000", "/b"));
        wm.add_event(event_at("2026-08-01 10:00:09.000000", "/c"));

        let events = wm.get_time_window(5.0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].endpoint.as_deref(), Some("/b"));
        assert_eq!(events[1].endpoint.as_deref(), Some("/c"));
    }

    #[test]
    fn test_time_window_stops_at_first_out_of_range() {
        let mut wm = manager(10);
        wm.add_event(event_at("2026-08-01 10:00:08.000000", "/in-range-but-skipped"));
        wm.add_event(event_at("2026-08-01 09:00:00.000000", "/old"));
        wm.add_event(event_at("2026-08-01 10:00:09.000000", "/new"));

        // The backward scan ends at /old even though the first event would
        // qualify on its own.
        let events = wm.get_time_window(5.0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].endpoint.as_deref(), Some("/new"));
    }

    #[test]
    fn test_time_window_rejects_malformed_timestamp() {
        let mut wm = manager(10);
        wm.add_event(event_at("garbage", "/a"));
        assert!(wm.get_time_window(5.0).is_err());
    }

    #[test]
    fn test_named_windows() {
        let mut wm = manager(10);
        for i in 0..5 {
            wm.update_window("errors", event_at("2026-08-01 10:00:00.000000", &format!("/{}", i)), None);
        }
        // Named capacity is 3 in this fixture.
        assert_eq!(wm.get_window("errors", None).len(), 3);

        wm.clear(Some("errors"));
        assert!(wm.get_window("errors", None).is_empty());

        wm.add_event(Event::default());
        wm.clear(None);
        assert!(wm.is_empty());
        assert_eq!(wm.stats().window_count, 0);
    }
}

use crate::record::{FrameSample, PerceptionRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameEntry {
    id: i64,
    key: String,
}

/// Sorted list of usable frame identifiers plus the record sample rate.
/// Answers which discrete frame a simulated time falls on.
#[derive(Debug, Clone)]
pub struct FrameIndex {
    entries: Vec<FrameEntry>,
    fps: f64,
}

impl FrameIndex {
    /// Keep only keys that parse as integers, sorted ascending. When two keys
    /// parse to the same identifier (`"7"` and `"07"`) the first one wins.
    pub fn build(record: &PerceptionRecord) -> Self {
        let mut entries: Vec<FrameEntry> = Vec::with_capacity(record.len());
        for key in record.keys() {
            match key.parse::<i64>() {
                Ok(id) => entries.push(FrameEntry {
                    id,
                    key: key.to_string(),
                }),
                Err(_) => log::debug!("discarding non-integer frame key {key:?}"),
            }
        }
        entries.sort_by_key(|entry| entry.id);
        entries.dedup_by_key(|entry| entry.id);
        Self {
            entries,
            fps: record.metadata().fps,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// `clamp(floor(t * fps), 0, len - 1)`; `None` only when there are no
    /// frames at all.
    pub fn resolve(&self, simulated_time: f64) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        let raw = (simulated_time * self.fps).floor();
        let index = if raw.is_nan() || raw <= 0.0 {
            0
        } else if raw >= last as f64 {
            last
        } else {
            raw as usize
        };
        Some(index)
    }

    pub fn frame_at(&self, index: usize) -> Option<i64> {
        self.entries.get(index).map(|entry| entry.id)
    }

    pub fn sample_at<'a>(
        &self,
        record: &'a PerceptionRecord,
        index: usize,
    ) -> Option<(i64, &'a FrameSample)> {
        let entry = self.entries.get(index)?;
        record.frame(&entry.key).map(|sample| (entry.id, sample))
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Latest known position of a vessel
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub mmsi: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Course over ground, degrees
    pub course: Option<f32>,
    /// Speed over ground, knots
    pub speed: Option<f32>,
    /// True heading, degrees
    pub heading: Option<u16>,
    /// Unix time the report was received
    pub received_at: i64,
}

pub type SharedCache = Arc<Mutex<PositionCache>>;

/// Per-MMSI position cache feeding the timed JSON uplink.
pub struct PositionCache {
    entries: HashMap<u32, Position>,
    max_entries: usize,
    max_age: i64,
}

impl PositionCache {
    pub fn init(max_entries: usize, max_age_secs: u64) -> Result<SharedCache, String> {
        if max_entries == 0 {
            return Err("position cache needs room for at least one entry".to_string());
        }
        log::debug!(
            "position cache: {} entries, max age {} s",
            max_entries,
            max_age_secs
        );
        Ok(Arc::new(Mutex::new(Self {
            entries: HashMap::new(),
            max_entries,
            max_age: max_age_secs as i64,
        })))
    }

    /// Store or replace the position for `pos.mmsi`. When full, the oldest
    /// entry is evicted to make room.
    pub fn update(&mut self, pos: Position) {
        if !self.entries.contains_key(&pos.mmsi) && self.entries.len() >= self.max_entries {
            if let Some(oldest) = self
                .entries
                .values()
                .min_by_key(|p| p.received_at)
                .map(|p| p.mmsi)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(pos.mmsi, pos);
    }

    /// Take every cached position not older than the max age, ordered by MMSI.
    pub fn drain(&mut self, now: i64) -> Vec<Position> {
        let max_age = self.max_age;
        let mut out: Vec<Position> = self
            .entries
            .drain()
            .map(|(_, p)| p)
            .filter(|p| max_age == 0 || now - p.received_at <= max_age)
            .collect();
        out.sort_by_key(|p| p.mmsi);
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn deinit(&mut self) {
        self.entries.clear();
    }
}

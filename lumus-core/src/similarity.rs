use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: usize = 125;

/// Edit distance (unit-cost insert, delete, substitute) over Unicode scalar values.
pub fn distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    Fixed(usize),
    /// Limit grows with the longer candidate, never dropping below `floor`.
    Relative { ratio: f32, floor: usize },
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Fixed(DEFAULT_THRESHOLD)
    }
}

impl Threshold {
    pub fn limit(&self, a: &str, b: &str) -> usize {
        match *self {
            Threshold::Fixed(limit) => limit,
            Threshold::Relative { ratio, floor } => {
                let longest = a.chars().count().max(b.chars().count()) as f32;
                let scaled = (longest * ratio.max(0.0)).round();
                if scaled.is_finite() {
                    (scaled as usize).max(floor)
                } else {
                    floor
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    Consistent,
    Divergent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Arbiter {
    threshold: Threshold,
}

impl Arbiter {
    pub fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    pub fn classify(&self, a: &str, b: &str) -> Agreement {
        self.classify_distance(distance(a, b), self.threshold.limit(a, b))
    }

    fn classify_distance(&self, distance: usize, limit: usize) -> Agreement {
        if distance <= limit {
            Agreement::Consistent
        } else {
            Agreement::Divergent
        }
    }
}

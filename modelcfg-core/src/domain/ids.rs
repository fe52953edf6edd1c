use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Named data-sampling interval (`m5`, `m15`, `h1`, `d1`, ...).
///
/// Ordered by sampling duration so that timeframe maps iterate from the
/// finest to the coarsest bucket. Names that don't parse as a duration sort
/// after all parseable ones, alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(pub String);

impl Timeframe {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the interval in minutes, if the name follows the
    /// `<unit><count>` (`h4`) or `<count><unit>` (`4h`) convention.
    pub fn minutes(&self) -> Option<u64> {
        let name = self.0.trim().to_ascii_lowercase();
        let unit_first = name
            .chars()
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .and_then(|unit| Some((unit, name[1..].parse::<u64>().ok()?)));
        let unit_last = || {
            let unit = name.chars().last().filter(|c| c.is_ascii_alphabetic())?;
            let count = name[..name.len() - 1].parse::<u64>().ok()?;
            Some((unit, count))
        };
        let (unit, count) = unit_first.or_else(unit_last)?;
        let scale = match unit {
            'm' => 1,
            'h' => 60,
            'd' => 60 * 24,
            'w' => 60 * 24 * 7,
            _ => return None,
        };
        count.checked_mul(scale)
    }
}

impl Ord for Timeframe {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.minutes(), other.minutes()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Timeframe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Timeframe {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Timeframe {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Model family (`LSTM`, `Transformer`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelType(pub String);

impl ModelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ModelType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Session-local identity of a layer node. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk-{}", self.0)
    }
}

/// Monotonic source of fresh [`LayerId`]s, owned by whoever needs ids.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> LayerId {
        let id = LayerId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_minutes_parse_both_conventions() {
        assert_eq!(Timeframe::from("m5").minutes(), Some(5));
        assert_eq!(Timeframe::from("m15").minutes(), Some(15));
        assert_eq!(Timeframe::from("h1").minutes(), Some(60));
        assert_eq!(Timeframe::from("4h").minutes(), Some(240));
        assert_eq!(Timeframe::from("d1").minutes(), Some(1440));
        assert_eq!(Timeframe::from("weekly").minutes(), None);
    }

    #[test]
    fn timeframes_sort_by_duration() {
        let mut tfs: Vec<Timeframe> = ["d1", "weekly", "h1", "m15", "m5"]
            .into_iter()
            .map(Timeframe::from)
            .collect();
        tfs.sort();
        let names: Vec<&str> = tfs.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["m5", "m15", "h1", "d1", "weekly"]);
    }

    #[test]
    fn id_generator_is_monotonic() {
        let mut ids = IdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.to_string(), "blk-0");
    }
}

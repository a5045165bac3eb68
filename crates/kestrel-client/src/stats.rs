//! Server statistics and their aggregation across servers.
//!
//! Queue servers report flat `STAT <name> <value>` pairs. Per-queue figures
//! are encoded as `queue_<queue>_<stat>`; they are split out into a nested
//! map keyed by queue name.

use serde::Serialize;
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;

/// Per-queue statistic names, longest first so suffix matching is unambiguous.
pub const QUEUE_STAT_NAMES: &[&str] = &[
    "open_transactions",
    "expired_items",
    "total_items",
    "mem_items",
    "mem_bytes",
    "discarded",
    "logsize",
    "waiters",
    "items",
    "bytes",
    "age",
];

const QUEUE_PREFIX: &str = "queue_";

/// A single statistic value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    /// Parse the textual value a server reported
    pub fn parse(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            Self::Integer(value)
        } else if let Ok(value) = raw.parse::<f64>() {
            Self::Float(value)
        } else {
            Self::Text(raw.to_string())
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) => Some(*value as i64),
            Self::Text(_) => None,
        }
    }

    /// Combine the same statistic from two servers.
    ///
    /// Numbers are summed. Text keeps the first value seen.
    pub fn merge(&self, other: &StatValue) -> StatValue {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Self::Integer(a + b),
            (Self::Integer(a), Self::Float(b)) => Self::Float(*a as f64 + b),
            (Self::Float(a), Self::Integer(b)) => Self::Float(a + *b as f64),
            (Self::Float(a), Self::Float(b)) => Self::Float(a + b),
            _ => self.clone(),
        }
    }
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Statistics for one queue
pub type QueueStats = BTreeMap<String, StatValue>;

/// Statistics for one server, or the merged view of several
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerStats {
    pub stats: BTreeMap<String, StatValue>,
    pub queues: BTreeMap<String, QueueStats>,
}

impl ServerStats {
    /// Build from the raw pairs reported by a server
    pub fn from_raw(pairs: &[(String, String)]) -> Self {
        let mut server = Self::default();

        for (name, raw) in pairs {
            let value = StatValue::parse(raw);
            match split_queue_stat(name) {
                Some((queue, stat)) => {
                    server
                        .queues
                        .entry(queue.to_string())
                        .or_default()
                        .insert(stat.to_string(), value);
                }
                None => {
                    server.stats.insert(name.clone(), value);
                }
            }
        }

        server
    }

    /// Merge `other` into this view
    pub fn merge(&mut self, other: &ServerStats) {
        merge_map(&mut self.stats, &other.stats);

        for (queue, stats) in &other.queues {
            merge_map(self.queues.entry(queue.clone()).or_default(), stats);
        }
    }

    /// Merge the stats of several servers
    pub fn merge_all<'a>(servers: impl IntoIterator<Item = &'a ServerStats>) -> ServerStats {
        let mut merged = ServerStats::default();
        for server in servers {
            merged.merge(server);
        }
        merged
    }

    /// Statistics for one queue
    pub fn queue(&self, name: &str) -> Option<&QueueStats> {
        self.queues.get(name)
    }

    /// Items waiting on `name`, or 0 if the queue is unknown
    pub fn queue_size(&self, name: &str) -> u64 {
        self.queue(name)
            .and_then(|stats| stats.get("items"))
            .and_then(StatValue::as_i64)
            .map(|items| items.max(0) as u64)
            .unwrap_or(0)
    }

    /// Names of all queues the servers reported
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }
}

fn merge_map(into: &mut BTreeMap<String, StatValue>, from: &BTreeMap<String, StatValue>) {
    for (name, value) in from {
        match into.get_mut(name) {
            Some(existing) => *existing = existing.merge(value),
            None => {
                into.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Split `queue_<queue>_<stat>` into its parts
fn split_queue_stat(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(QUEUE_PREFIX)?;

    QUEUE_STAT_NAMES.iter().find_map(|stat| {
        let queue = rest.strip_suffix(stat)?.strip_suffix('_')?;
        if queue.is_empty() {
            None
        } else {
            Some((queue, *stat))
        }
    })
}

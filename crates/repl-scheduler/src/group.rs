use std::collections::HashSet;

use repl_schemas::{Event, EventPayload};

/// One transaction's worth of events plus the precomputed write-key set a
/// Worker checks against every other in-flight group before taking it.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: u64,
    pub keys: HashSet<String>,
    pub events: Vec<Event>,
}

/// Sentinel key a group's conflict set collapses to once it exceeds
/// `max_keys_per_group`: cheaper to treat as "conflicts with everything"
/// than to keep tracking an unbounded set per group.
pub const WILDCARD_KEY: &str = "*";

/// Extract the write-key set for a buffered group: one key per distinct
/// database touched by an opaque statement/row event, collapsed to
/// [`WILDCARD_KEY`] if that would exceed `max_keys`.
pub fn group_keys(events: &[Event], max_keys: u32) -> HashSet<String> {
    let mut keys = HashSet::new();
    for event in events {
        if let EventPayload::Opaque { db: Some(db), .. } = &event.payload {
            keys.insert(db.clone());
        }
    }
    if keys.is_empty() {
        keys.insert(String::new());
    }
    if keys.len() as u32 > max_keys {
        let mut wildcard = HashSet::with_capacity(1);
        wildcard.insert(WILDCARD_KEY.to_string());
        return wildcard;
    }
    keys
}

fn intersects(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    if a.contains(WILDCARD_KEY) || b.contains(WILDCARD_KEY) {
        return true;
    }
    a.intersection(b).next().is_some()
}

pub fn conflicts_with_any<'a>(candidate: &HashSet<String>, in_flight: impl Iterator<Item = &'a HashSet<String>>) -> bool {
    for keys in in_flight {
        if intersects(candidate, keys) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repl_schemas::Coordinate;

    fn opaque(db: &str) -> Event {
        Event {
            server_id: 1,
            timestamp: Utc::now(),
            coordinate: Coordinate::new("relay-bin.000001".into(), 4),
            payload_len: 0,
            payload: EventPayload::Opaque {
                statement_or_rows: vec![],
                db: Some(db.to_string()),
            },
            checksum: None,
        }
    }

    #[test]
    fn group_keys_collapse_to_wildcard_past_max() {
        let events = vec![opaque("a"), opaque("b"), opaque("c")];
        let keys = group_keys(&events, 2);
        assert!(keys.contains(WILDCARD_KEY));
    }

    #[test]
    fn group_keys_under_max_stay_precise() {
        let events = vec![opaque("a"), opaque("b")];
        let keys = group_keys(&events, 4);
        assert_eq!(keys.len(), 2);
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `{sid: 16-byte uuid, gno: u64}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gtid {
    pub sid: Uuid,
    pub gno: u64,
}

impl Gtid {
    pub fn new(sid: Uuid, gno: u64) -> Self {
        Self { sid, gno }
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sid, self.gno)
    }
}

/// Set of GTIDs, grouped per-source (`sid`) as disjoint gno intervals —
/// the representation a real binlog GTID set uses so ranges stay compact
/// instead of one entry per transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtidSet {
    /// sid -> sorted, non-overlapping, non-adjacent `(start, end_inclusive)` ranges.
    intervals: BTreeMap<Uuid, Vec<(u64, u64)>>,
}

impl GtidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.values().all(|v| v.is_empty())
    }

    pub fn contains(&self, g: &Gtid) -> bool {
        match self.intervals.get(&g.sid) {
            Some(ranges) => ranges
                .binary_search_by(|(start, end)| {
                    if g.gno < *start {
                        std::cmp::Ordering::Greater
                    } else if g.gno > *end {
                        std::cmp::Ordering::Less
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn add(&mut self, g: Gtid) {
        let ranges = self.intervals.entry(g.sid).or_default();
        insert_and_merge(ranges, g.gno, g.gno);
    }

    pub fn union(&mut self, other: &GtidSet) {
        for (sid, ranges) in &other.intervals {
            let dst = self.intervals.entry(*sid).or_default();
            for &(start, end) in ranges {
                insert_and_merge(dst, start, end);
            }
        }
    }

    pub fn unioned(&self, other: &GtidSet) -> GtidSet {
        let mut out = self.clone();
        out.union(other);
        out
    }

    /// Removes a single GTID from the set, splitting its interval if needed.
    pub fn remove(&mut self, g: &Gtid) {
        let Some(ranges) = self.intervals.get_mut(&g.sid) else {
            return;
        };
        let mut rebuilt = Vec::with_capacity(ranges.len() + 1);
        for &(start, end) in ranges.iter() {
            if g.gno < start || g.gno > end {
                rebuilt.push((start, end));
                continue;
            }
            if start < g.gno {
                rebuilt.push((start, g.gno - 1));
            }
            if g.gno < end {
                rebuilt.push((g.gno + 1, end));
            }
        }
        rebuilt.sort_unstable();
        if rebuilt.is_empty() {
            self.intervals.remove(&g.sid);
        } else {
            *ranges = rebuilt;
        }
    }

    /// The single highest GTID from one source (used for the "subtract the
    /// last retrieved GTID" auto-position rule). Returns `None` if `sid` is
    /// unknown.
    pub fn last_of(&self, sid: &Uuid) -> Option<Gtid> {
        self.intervals
            .get(sid)
            .and_then(|ranges| ranges.last())
            .map(|&(_, end)| Gtid::new(*sid, end))
    }

    /// Text encoding: `sid:range[,range...];sid:range...`, ranges as
    /// `start-end` (or bare `n` for a single GTID), sids in stable order.
    pub fn encode_text(&self) -> String {
        self.intervals
            .iter()
            .filter(|(_, ranges)| !ranges.is_empty())
            .map(|(sid, ranges)| {
                let body = ranges
                    .iter()
                    .map(|&(s, e)| {
                        if s == e {
                            s.to_string()
                        } else {
                            format!("{s}-{e}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{sid}:{body}")
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Binary encoding: length-prefixed sid + interval count + packed
    /// (start, end) pairs, in the same stable sid order as `encode_text`.
    pub fn encode_binary(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.intervals.len() as u32).to_be_bytes());
        for (sid, ranges) in &self.intervals {
            out.extend_from_slice(sid.as_bytes());
            out.extend_from_slice(&(ranges.len() as u32).to_be_bytes());
            for &(s, e) in ranges {
                out.extend_from_slice(&s.to_be_bytes());
                out.extend_from_slice(&e.to_be_bytes());
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = Gtid> + '_ {
        self.intervals.iter().flat_map(|(sid, ranges)| {
            ranges
                .iter()
                .flat_map(move |&(s, e)| (s..=e).map(move |gno| Gtid::new(*sid, gno)))
        })
    }
}

fn insert_and_merge(ranges: &mut Vec<(u64, u64)>, start: u64, end: u64) {
    ranges.push((start, end));
    ranges.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for &(s, e) in ranges.iter() {
        match merged.last_mut() {
            Some((_, last_end)) if s <= last_end.saturating_add(1) => {
                if e > *last_end {
                    *last_end = e;
                }
            }
            _ => merged.push((s, e)),
        }
    }
    *ranges = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn add_and_contains() {
        let mut s = GtidSet::new();
        s.add(Gtid::new(sid(1), 5));
        assert!(s.contains(&Gtid::new(sid(1), 5)));
        assert!(!s.contains(&Gtid::new(sid(1), 6)));
    }

    #[test]
    fn contiguous_adds_merge_into_one_range() {
        let mut s = GtidSet::new();
        for i in 1..=5 {
            s.add(Gtid::new(sid(1), i));
        }
        assert_eq!(s.encode_text(), format!("{}:1-5", sid(1)));
    }

    #[test]
    fn remove_splits_interval() {
        let mut s = GtidSet::new();
        for i in 1..=5 {
            s.add(Gtid::new(sid(1), i));
        }
        s.remove(&Gtid::new(sid(1), 3));
        assert!(!s.contains(&Gtid::new(sid(1), 3)));
        assert!(s.contains(&Gtid::new(sid(1), 2)));
        assert!(s.contains(&Gtid::new(sid(1), 4)));
    }

    #[test]
    fn union_merges_overlapping_ranges() {
        let mut a = GtidSet::new();
        a.add(Gtid::new(sid(1), 1));
        a.add(Gtid::new(sid(1), 2));
        let mut b = GtidSet::new();
        b.add(Gtid::new(sid(1), 3));
        a.union(&b);
        assert_eq!(a.encode_text(), format!("{}:1-3", sid(1)));
    }

    #[test]
    fn last_of_returns_highest_gno() {
        let mut s = GtidSet::new();
        s.add(Gtid::new(sid(1), 1));
        s.add(Gtid::new(sid(1), 9));
        assert_eq!(s.last_of(&sid(1)), Some(Gtid::new(sid(1), 9)));
    }
}

use repl_schemas::{Coordinate, Gtid, GtidSet};

pub const DUMP_OPCODE: u8 = 0x12;

/// The two wire requests a dump command can encode.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpRequest {
    FileOffset {
        file: String,
        offset: u64,
        server_id: u32,
        flags: u16,
    },
    AutoPosition {
        server_id: u32,
        flags: u16,
        gtid_set: GtidSet,
    },
}

/// Build the auto-position GTID set: the union of retrieved and logged,
/// minus the last retrieved GTID unless it is also logged — forces
/// re-delivery of a possibly-partial transaction on reconnect.
pub fn auto_position_gtid_set(retrieved: &GtidSet, logged: &GtidSet, last_retrieved: Option<Gtid>) -> GtidSet {
    let mut set = retrieved.unioned(logged);
    if let Some(last) = last_retrieved {
        if !logged.contains(&last) {
            set.remove(&last);
        }
    }
    set
}

pub fn build_dump_request(
    auto_position: bool,
    master_coord: &Coordinate,
    retrieved_gtids: &GtidSet,
    logged_gtids: &GtidSet,
    last_retrieved: Option<Gtid>,
    server_id: u32,
    flags: u16,
) -> DumpRequest {
    if auto_position {
        DumpRequest::AutoPosition {
            server_id,
            flags,
            gtid_set: auto_position_gtid_set(retrieved_gtids, logged_gtids, last_retrieved),
        }
    } else {
        DumpRequest::FileOffset {
            file: master_coord.file_name.clone(),
            offset: master_coord.offset,
            server_id,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sid() -> Uuid {
        Uuid::from_bytes([9; 16])
    }

    #[test]
    fn subtracts_unlogged_last_retrieved() {
        let mut retrieved = GtidSet::new();
        retrieved.add(Gtid::new(sid(), 1));
        retrieved.add(Gtid::new(sid(), 2));
        let logged = GtidSet::new();

        let set = auto_position_gtid_set(&retrieved, &logged, Some(Gtid::new(sid(), 2)));
        assert!(set.contains(&Gtid::new(sid(), 1)));
        assert!(!set.contains(&Gtid::new(sid(), 2)));
    }

    #[test]
    fn keeps_last_retrieved_when_also_logged() {
        let mut retrieved = GtidSet::new();
        retrieved.add(Gtid::new(sid(), 1));
        retrieved.add(Gtid::new(sid(), 2));
        let mut logged = GtidSet::new();
        logged.add(Gtid::new(sid(), 2));

        let set = auto_position_gtid_set(&retrieved, &logged, Some(Gtid::new(sid(), 2)));
        assert!(set.contains(&Gtid::new(sid(), 2)));
    }

    #[test]
    fn file_offset_mode_ignores_gtids() {
        let coord = Coordinate::new("mysql-bin.000005".into(), 1024);
        let req = build_dump_request(false, &coord, &GtidSet::new(), &GtidSet::new(), None, 42, 0);
        assert_eq!(
            req,
            DumpRequest::FileOffset {
                file: "mysql-bin.000005".into(),
                offset: 1024,
                server_id: 42,
                flags: 0,
            }
        );
    }
}

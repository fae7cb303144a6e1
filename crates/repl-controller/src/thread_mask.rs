use serde::Deserialize;

/// Which of the two threads an operation targets, mirroring `START SLAVE
/// IO_THREAD` / `SQL_THREAD` / plain `START SLAVE` (both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadMask {
    pub io: bool,
    pub sql: bool,
}

impl ThreadMask {
    pub const ALL: ThreadMask = ThreadMask { io: true, sql: true };
    pub const IO: ThreadMask = ThreadMask { io: true, sql: false };
    pub const SQL: ThreadMask = ThreadMask { io: false, sql: true };
}

impl Default for ThreadMask {
    fn default() -> Self {
        ThreadMask::ALL
    }
}

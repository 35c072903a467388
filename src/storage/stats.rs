use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::{
    cursor::{CursorState, End},
    CursorError, Result,
};
use crate::codec::Field;

/// Statistic ids start here so they are not confused with other small integers
pub const STATS_BASE: u32 = 1000;

const BILLION: u64 = 1_000_000_000;
const MILLION: u64 = 1_000_000;

macro_rules! stats {
    ($($variant:ident => $desc:literal,)+) => {
        /// Engine counters exposed through `statistics:` cursors
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Stat {
            $($variant,)+
        }

        impl Stat {
            pub const ALL: &'static [Stat] = &[$(Stat::$variant,)+];

            pub fn desc(&self) -> &'static str {
                match self {
                    $(Stat::$variant => $desc,)+
                }
            }
        }
    };
}

stats! {
    CursorCreate => "cursor: cursor create calls",
    CursorClose => "cursor: table cursors released",
    CursorOpen => "cursor: open table cursors",
    CursorNext => "cursor: cursor next calls",
    CursorPrev => "cursor: cursor prev calls",
    CursorReset => "cursor: cursor reset calls",
    CursorSearch => "cursor: cursor search calls",
    CursorSearchNear => "cursor: cursor search near calls",
    CursorInsert => "cursor: cursor insert calls",
    CursorUpdate => "cursor: cursor update calls",
    CursorRemove => "cursor: cursor remove calls",
    TableCreate => "schema: table create calls",
    TableDrop => "schema: table drop calls",
    TableCount => "schema: tables",
    RecordCount => "data: records stored",
}

impl Stat {
    pub fn id(&self) -> u32 {
        STATS_BASE + *self as u32
    }
}

/// Live counters shared by every cursor of a [Database](super::Database)
#[derive(Debug)]
pub struct Stats {
    counters: Vec<AtomicU64>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            counters: Stat::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl Stats {
    pub fn incr(&self, stat: Stat) {
        self.counters[stat as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr(&self, stat: Stat) {
        let _ = self.counters[stat as usize].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |v| v.checked_sub(1),
        );
    }

    pub fn set(&self, stat: Stat, value: u64) {
        self.counters[stat as usize].store(value, Ordering::Relaxed);
    }

    pub fn get(&self, stat: Stat) -> u64 {
        self.counters[stat as usize].load(Ordering::Relaxed)
    }

    /// Copies every counter into an immutable, id ordered list
    pub fn snapshot(&self) -> Vec<StatEntry> {
        Stat::ALL
            .iter()
            .map(|stat| StatEntry {
                id: stat.id(),
                desc: stat.desc(),
                value: self.get(*stat),
            })
            .collect()
    }
}

/// One row of a statistics cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEntry {
    pub id: u32,
    pub desc: &'static str,
    pub value: u64,
}

impl StatEntry {
    /// Human readable value; large counts are abbreviated with the exact count in parentheses
    pub fn printable(&self) -> String {
        let v = self.value;
        if v >= BILLION {
            format!("{}B ({v})", v / BILLION)
        } else if v >= MILLION {
            format!("{}M ({v})", v / MILLION)
        } else {
            v.to_string()
        }
    }
}

/// Read-only cursor over a statistics snapshot taken at open time.
///
/// Navigation follows the same state machine as a table cursor. Keys are the statistic id;
/// values are `(description, printable value, value)`.
#[derive(Debug)]
pub struct StatCursor {
    entries: Vec<StatEntry>,
    pos: Option<usize>,
    state: CursorState,
    exhausted_at: Option<End>,
    closed: bool,
}

impl StatCursor {
    pub fn new(entries: Vec<StatEntry>) -> Self {
        debug!("opening statistics cursor over {} entries", entries.len());
        Self {
            entries,
            pos: None,
            state: CursorState::Unpositioned,
            exhausted_at: None,
            closed: false,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(CursorError::ClosedCursor)
        } else {
            Ok(())
        }
    }

    fn land(&mut self, pos: Option<usize>, end: End) -> Result<()> {
        match pos {
            Some(pos) => {
                self.pos = Some(pos);
                self.exhausted_at = None;
                self.state = CursorState::Positioned;
                Ok(())
            }
            None => {
                self.pos = None;
                self.exhausted_at = Some(end);
                self.state = CursorState::Exhausted;
                Err(CursorError::NotFound)
            }
        }
    }

    /// Running off the last entry is sticky for next; prev restarts from the last entry.
    pub fn next(&mut self) -> Result<()> {
        self.check_open()?;
        let pos = match (self.state, self.pos, self.exhausted_at) {
            (CursorState::Positioned, Some(pos), _) => {
                (pos + 1 < self.entries.len()).then_some(pos + 1)
            }
            (CursorState::Exhausted, _, Some(End::High)) => None,
            _ => (!self.entries.is_empty()).then_some(0),
        };
        self.land(pos, End::High)
    }

    pub fn prev(&mut self) -> Result<()> {
        self.check_open()?;
        let pos = match (self.state, self.pos, self.exhausted_at) {
            (CursorState::Positioned, Some(pos), _) => pos.checked_sub(1),
            (CursorState::Exhausted, _, Some(End::Low)) => None,
            _ => self.entries.len().checked_sub(1),
        };
        self.land(pos, End::Low)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.check_open()?;
        self.pos = None;
        self.exhausted_at = None;
        self.state = CursorState::Unpositioned;
        Ok(())
    }

    /// The entry under the cursor
    pub fn entry(&self) -> Result<&StatEntry> {
        self.check_open()?;
        self.pos
            .and_then(|pos| self.entries.get(pos))
            .ok_or_else(|| CursorError::invalid_state("statistics cursor is not positioned"))
    }

    pub fn get_key(&self) -> Result<Vec<Field>> {
        Ok(vec![Field::UInt(self.entry()?.id.into())])
    }

    pub fn get_value(&self) -> Result<Vec<Field>> {
        let entry = self.entry()?;
        Ok(vec![
            Field::from(entry.desc),
            Field::Str(entry.printable()),
            Field::UInt(entry.value),
        ])
    }

    pub fn close(&mut self) {
        if !self.closed {
            debug!("closing statistics cursor");
            self.closed = true;
            self.pos = None;
            self.exhausted_at = None;
            self.state = CursorState::Unpositioned;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entries(n: u32) -> Vec<StatEntry> {
        (0..n)
            .map(|i| StatEntry {
                id: STATS_BASE + i,
                desc: "test: counter",
                value: u64::from(i) * 10,
            })
            .collect()
    }

    #[test]
    fn ids_are_offset_from_base() {
        assert_eq!(Stat::CursorCreate.id(), STATS_BASE);
        assert_eq!(Stat::ALL.len(), Stats::default().snapshot().len());
        let snapshot = Stats::default().snapshot();
        assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn counters() {
        let stats = Stats::default();
        stats.incr(Stat::CursorNext);
        stats.incr(Stat::CursorNext);
        stats.decr(Stat::CursorOpen);
        assert_eq!(stats.get(Stat::CursorNext), 2);
        assert_eq!(stats.get(Stat::CursorOpen), 0);
    }

    #[test]
    fn printable_values() {
        let entry = |value| StatEntry {
            id: STATS_BASE,
            desc: "x",
            value,
        };
        assert_eq!(entry(999).printable(), "999");
        assert_eq!(entry(5_300_000).printable(), "5M (5300000)");
        assert_eq!(entry(2_000_000_001).printable(), "2B (2000000001)");
    }

    #[test]
    fn walks_forward_and_back() {
        let mut cursor = StatCursor::new(entries(3));

        let mut ids = Vec::new();
        while cursor.next().is_ok() {
            ids.push(cursor.entry().unwrap().id);
        }
        assert_eq!(ids, vec![1000, 1001, 1002]);
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert!(cursor.entry().is_err());

        cursor.reset().unwrap();
        let mut ids = Vec::new();
        while cursor.prev().is_ok() {
            ids.push(cursor.entry().unwrap().id);
        }
        assert_eq!(ids, vec![1002, 1001, 1000]);
    }

    #[test]
    fn turns_around_after_running_off() {
        let mut cursor = StatCursor::new(entries(3));
        while cursor.next().is_ok() {}
        assert_eq!(cursor.next(), Err(CursorError::NotFound));

        cursor.prev().unwrap();
        assert_eq!(cursor.entry().unwrap().id, 1002);

        while cursor.prev().is_ok() {}
        assert_eq!(cursor.prev(), Err(CursorError::NotFound));
        cursor.next().unwrap();
        assert_eq!(cursor.entry().unwrap().id, 1000);
    }

    #[test]
    fn value_triple() {
        let mut cursor = StatCursor::new(entries(2));
        cursor.next().unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.get_key().unwrap(), vec![Field::UInt(1001)]);
        assert_eq!(
            cursor.get_value().unwrap(),
            vec![
                Field::from("test: counter"),
                Field::from("10"),
                Field::UInt(10)
            ]
        );
    }

    #[test]
    fn closed_cursor() {
        let mut cursor = StatCursor::new(entries(1));
        cursor.close();
        cursor.close();
        assert_eq!(cursor.next(), Err(CursorError::ClosedCursor));
        assert_eq!(cursor.reset(), Err(CursorError::ClosedCursor));
    }

    #[test]
    fn empty_snapshot() {
        let mut cursor = StatCursor::new(Vec::new());
        assert_eq!(cursor.next(), Err(CursorError::NotFound));
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }
}

//! Time-based 64-bit identifiers and the directory sharding derived from them.
//!
//! Layout, most significant first:
//!
//! ```text
//! | elapsed ms since origin (42) | deployment context (10) | sequence (12) |
//! ```
//!
//! A generator is an explicit value: two instances with different deployment
//! contexts never collide; a single instance is safe to share between threads.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SEQUENCE_BITS: u32 = 12;
pub const CONTEXT_BITS: u32 = 10;
pub const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + CONTEXT_BITS;
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_CONTEXT: u16 = (1 << CONTEXT_BITS) - 1;

/// 2006-01-01T00:00:00Z in milliseconds since the UNIX epoch.
pub fn default_origin_ms() -> u64 {
    Utc.with_ymd_and_hms(2006, 1, 1, 0, 0, 0)
        .single()
        .map(|t| t.timestamp_millis() as u64)
        .unwrap_or(1_136_073_600_000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub u64);

impl Identifier {
    pub fn value(self) -> u64 { self.0 }
    pub fn elapsed_ms(self) -> u64 { self.0 >> TIMESTAMP_SHIFT }
    pub fn context(self) -> u16 { ((self.0 >> SEQUENCE_BITS) & u64::from(MAX_CONTEXT)) as u16 }
    pub fn sequence(self) -> u64 { self.0 & MAX_SEQUENCE }

    pub fn shard_path(self) -> Vec<String> { shard_path(&self.to_string()) }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for Identifier {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { s.trim().parse::<u64>().map(Identifier) }
}

struct TickState {
    last_tick: u64,
    sequence: u64,
}

pub struct IdGenerator {
    origin_ms: u64,
    context: u64,
    clock: fn() -> u64,
    state: Mutex<TickState>,
}

fn system_now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

impl IdGenerator {
    /// `deployment_context` is masked to its 10 bits.
    pub fn new(origin_ms: u64, deployment_context: u16) -> Self {
        Self::with_clock(origin_ms, deployment_context, system_now_ms)
    }

    /// Generator reading time from `clock` (milliseconds since the UNIX epoch).
    pub fn with_clock(origin_ms: u64, deployment_context: u16, clock: fn() -> u64) -> Self {
        if deployment_context > MAX_CONTEXT {
            warn!(target: "stowage::idgen", deployment_context, "deployment context exceeds 10 bits; masking");
        }
        Self {
            origin_ms,
            context: u64::from(deployment_context & MAX_CONTEXT),
            clock,
            state: Mutex::new(TickState { last_tick: 0, sequence: 0 }),
        }
    }

    pub fn deployment_context(&self) -> u16 { self.context as u16 }

    fn elapsed(&self) -> u64 {
        (self.clock)().saturating_sub(self.origin_ms)
    }

    fn issue(&self, state: &mut TickState, now: u64) -> Identifier {
        if now > state.last_tick {
            state.last_tick = now;
            state.sequence = 0;
        } else if state.sequence == MAX_SEQUENCE {
            // sequence exhausted for this tick (or the clock went backwards): borrow the next tick
            state.last_tick += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }
        Identifier(state.last_tick << TIMESTAMP_SHIFT | self.context << SEQUENCE_BITS | state.sequence)
    }

    pub fn next(&self) -> Identifier {
        let now = self.elapsed();
        let mut state = self.state.lock();
        self.issue(&mut state, now)
    }

    /// `n` distinct identifiers issued under one lock acquisition.
    pub fn next_batch(&self, n: usize) -> Vec<Identifier> {
        let mut ids = Vec::with_capacity(n);
        let mut state = self.state.lock();
        for _ in 0..n {
            let now = self.elapsed();
            ids.push(self.issue(&mut state, now));
        }
        drop(state);
        debug!(target: "stowage::idgen", count = n, "issued identifier batch");
        ids
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").field("origin_ms", &self.origin_ms).field("context", &self.context).finish()
    }
}

/// Directory components for an identifier string: the two 3-digit groups before the
/// last three digits, then the id itself. Ids shorter than 7 characters are not sharded.
pub fn shard_path(id: &str) -> Vec<String> {
    let id = id.trim();
    if id.is_empty() {
        return Vec::new();
    }
    let len = id.len();
    if len < 7 || !id.is_char_boundary(len - 6) || !id.is_char_boundary(len - 3) {
        return vec![id.to_string()];
    }
    vec![id[len - 6..len - 3].to_string(), id[len - 3..].to_string(), id.to_string()]
}

/// `root` joined with the shard components of `id`.
pub fn shard_dir(root: &Path, id: &str) -> PathBuf {
    shard_path(id).iter().fold(root.to_path_buf(), |p, c| p.join(c))
}

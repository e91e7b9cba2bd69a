//! Time-ordered 64-bit message ids.
//!
//! Layout, most significant bit first: 41 bits of milliseconds since the
//! Twitter epoch, 10 bits of node id, 12 bits of per-millisecond sequence.

use std::sync::Mutex;

use chrono::Utc;

/// Twitter snowflake epoch (2010-11-04T01:42:54.657Z) in milliseconds.
pub const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const STEP_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const STEP_MASK: i64 = (1 << STEP_BITS) - 1;
const TIME_SHIFT: u32 = NODE_BITS + STEP_BITS;

#[derive(Debug, Default)]
struct GeneratorState {
    last_ms: i64,
    step: i64,
}

/// Snowflake id generator shared by every writer of the mail queue.
///
/// Ids are strictly increasing within one generator even if the wall clock
/// steps backwards.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node: i64,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// Create a generator for a node id in `0..=1023`. Larger ids are masked.
    pub fn new(node: u16) -> Self {
        Self {
            node: i64::from(node & MAX_NODE),
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// The node id mixed into every id.
    pub fn node(&self) -> u16 {
        self.node as u16
    }

    /// Produce the next id.
    pub fn generate(&self) -> i64 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut now = (Utc::now().timestamp_millis() - EPOCH_MS).max(state.last_ms);
        if now == state.last_ms {
            state.step = (state.step + 1) & STEP_MASK;
            if state.step == 0 {
                // Sequence exhausted for this millisecond; borrow the next one
                now += 1;
            }
        } else {
            state.step = 0;
        }
        state.last_ms = now;

        (now << TIME_SHIFT) | (self.node << STEP_BITS) | state.step
    }
}

/// Milliseconds since the Unix epoch encoded in an id.
pub fn timestamp_ms(id: i64) -> i64 {
    (id >> TIME_SHIFT) + EPOCH_MS
}

//! Session id and join-secret generation.

use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a join secret.
pub const SECRET_LEN: usize = 6;

/// Secret alphabet with ambiguous glyphs (0/O, 1/I) removed.
///
/// Players read these codes aloud and type them on phones.
const SECRET_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate an unguessable join secret.
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..SECRET_LEN)
        .map(|_| SECRET_ALPHABET[rng.gen_range(0..SECRET_ALPHABET.len())] as char)
        .collect()
}

/// Monotonic, collision-free session id generator.
///
/// Ids are wall-clock milliseconds bumped past the last issued id, so two
/// sessions created within the same millisecond still get distinct,
/// strictly increasing ids.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    last: AtomicI64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next session id.
    pub fn next_id(&self) -> i64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        loop {
            let last = self.last.load(Ordering::Acquire);
            let candidate = now_ms.max(last + 1);
            if self
                .last
                .compare_exchange(last, candidate, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

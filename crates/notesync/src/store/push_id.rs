//! Chronologically sortable child keys.
//!
//! A key is 20 characters: 8 encode the millisecond timestamp, 12 are random.
//! Keys generated in the same millisecond reuse the previous random part
//! incremented by one, so keys from one generator sort in generation order.
//! The alphabet is ordered by ASCII value, so lexicographic order matches
//! numeric order.

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_time: i64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now_ms: i64) -> String {
        // A clock step backwards must not reorder keys.
        let now_ms = now_ms.max(self.last_time);
        let duplicate_time = now_ms == self.last_time;
        self.last_time = now_ms;

        let mut id = String::with_capacity(20);
        let mut time_chars = [0u8; 8];
        let mut t = now_ms;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        id.extend(time_chars.iter().map(|&c| c as char));

        if duplicate_time {
            self.increment_random();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }
        id.extend(self.last_random.iter().map(|&i| PUSH_CHARS[i as usize] as char));
        id
    }

    fn increment_random(&mut self) {
        for slot in self.last_random.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                return;
            }
        }
    }
}

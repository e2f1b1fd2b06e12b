//! Rate limiting for inbound peer traffic

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default inbound budget per peer (one position update per frame at 60 fps)
pub const PEER_MESSAGE_RATE_LIMIT: u32 = 60;

/// Per-peer limiter table, lazily populated on first message from a peer
pub struct PeerRateLimiter {
    per_second: u32,
    limiters: HashMap<String, Arc<Limiter>>,
}

impl PeerRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            limiters: HashMap::new(),
        }
    }

    /// Check if a message from this peer is allowed (returns true if allowed)
    pub fn check(&mut self, peer_id: &str) -> bool {
        let per_second = self.per_second;
        self.limiters
            .entry(peer_id.to_string())
            .or_insert_with(|| create_limiter(per_second))
            .check()
            .is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new(PEER_MESSAGE_RATE_LIMIT)
    }
}

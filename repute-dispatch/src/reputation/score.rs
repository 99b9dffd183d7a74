//! Health scoring
//!
//! `health = clamp(100 - (spam*45 + bounce*35 + complaint*20 + sqrt(sent_count)*0.1), 0, 100)`
//!
//! The `sqrt(sent_count)` term slowly wears down identities that carry a lot
//! of volume, even when no negative signal is reported.

use repute_common::identity::{MAX_HEALTH, MIN_HEALTH};

pub const SPAM_WEIGHT: f64 = 45.0;
pub const BOUNCE_WEIGHT: f64 = 35.0;
pub const COMPLAINT_WEIGHT: f64 = 20.0;
pub const VOLUME_DECAY: f64 = 0.1;

/// Observed outcome rates for one dispatch, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub spam: f64,
    pub bounce: f64,
    pub complaint: f64,
}

impl Rates {
    /// A clean, successful send
    pub const CLEAN: Self = Self {
        spam: 0.0,
        bounce: 0.0,
        complaint: 0.0,
    };

    /// The fixed penalty applied to a failed transmission
    #[must_use]
    pub const fn penalty(rate: f64) -> Self {
        Self {
            spam: rate,
            bounce: rate,
            complaint: 0.0,
        }
    }
}

/// Compute the health of an identity that has already recorded `sent_count` outcomes
#[must_use]
pub fn score(rates: Rates, sent_count: u64) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "sqrt of a send counter")]
    let volume = (sent_count as f64).sqrt() * VOLUME_DECAY;

    let health = MAX_HEALTH
        - (rates.spam * SPAM_WEIGHT
            + rates.bounce * BOUNCE_WEIGHT
            + rates.complaint * COMPLAINT_WEIGHT
            + volume);

    if health.is_nan() {
        MIN_HEALTH
    } else {
        health.clamp(MIN_HEALTH, MAX_HEALTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn clean_outcome_at_zero_volume_is_perfect() {
        assert!(approx(score(Rates::CLEAN, 0), 100.0));
    }

    #[test]
    fn volume_decay() {
        assert!(approx(score(Rates::CLEAN, 1), 99.9));
        assert!(approx(score(Rates::CLEAN, 100), 99.0));
        assert!(approx(score(Rates::CLEAN, 10_000), 90.0));
    }

    #[test]
    fn weighted_rates() {
        let rates = Rates {
            spam: 0.1,
            bounce: 0.05,
            complaint: 0.02,
        };

        assert!(approx(score(rates, 0), 100.0 - (4.5 + 1.75 + 0.4)));
        assert!(approx(score(Rates::penalty(0.2), 0), 84.0));
    }

    #[test]
    fn always_within_bounds() {
        let worst = Rates {
            spam: 1.0,
            bounce: 1.0,
            complaint: 1.0,
        };
        assert!(approx(score(worst, u64::MAX), 0.0));

        let negative = Rates {
            spam: -1.0,
            bounce: 0.0,
            complaint: 0.0,
        };
        assert!(approx(score(negative, 0), 100.0));

        let nan = Rates {
            spam: f64::NAN,
            bounce: 0.0,
            complaint: 0.0,
        };
        assert!(approx(score(nan, 0), 0.0));

        for spam in 0..=10 {
            for bounce in 0..=10 {
                for complaint in 0..=10 {
                    for sent_count in [0, 1, 7, 1_000, 1_000_000] {
                        let rates = Rates {
                            spam: f64::from(spam) / 10.0,
                            bounce: f64::from(bounce) / 10.0,
                            complaint: f64::from(complaint) / 10.0,
                        };
                        let health = score(rates, sent_count);
                        assert!((0.0..=100.0).contains(&health), "{rates:?} -> {health}");
                    }
                }
            }
        }
    }
}

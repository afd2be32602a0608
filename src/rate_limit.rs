use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::error;

use crate::error::ConfigError;
use crate::identity::{Identity, IdentityKey};

/// A named fixed-window budget: at most `max_count` admissions per `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRule {
    pub name: String,
    pub window: Duration,
    pub max_count: u32,
}

impl RateRule {
    pub fn new(
        name: impl Into<String>,
        window: Duration,
        max_count: u32,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow(name));
        }
        if max_count == 0 {
            return Err(ConfigError::ZeroCount(name));
        }
        Ok(Self {
            name,
            window,
            max_count,
        })
    }

    // "5 per minute", "100 per 2 days" or "5/minute"
    pub fn parse(name: impl Into<String>, limit: &str) -> Result<Self, ConfigError> {
        let (max_count, window) = parse_limit(limit)?;
        Self::new(name, window, max_count)
    }
}

fn parse_limit(limit: &str) -> Result<(u32, Duration), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLimit {
        limit: limit.to_string(),
        reason: reason.to_string(),
    };

    let text = limit.trim().to_ascii_lowercase();
    let (count, period) = text
        .split_once(" per ")
        .or_else(|| text.split_once('/'))
        .ok_or_else(|| invalid("expected '<count> per <period>'"))?;

    let count: u32 = count
        .trim()
        .parse()
        .map_err(|_| invalid("count is not a whole number"))?;

    let mut parts = period.split_whitespace();
    let (multiplier, unit) = match (parts.next(), parts.next(), parts.next()) {
        (Some(unit), None, None) => (1, unit),
        (Some(n), Some(unit), None) => {
            let n: u64 = n
                .parse()
                .map_err(|_| invalid("period multiplier is not a whole number"))?;
            (n, unit)
        }
        _ => return Err(invalid("expected a single period unit")),
    };

    let unit_secs: u64 = match unit.trim_end_matches('s') {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        _ => return Err(invalid("unknown period unit")),
    };

    let secs = unit_secs
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("period is too long"))?;
    Ok((count, Duration::from_secs(secs)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl AdmitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmitDecision::Allowed)
    }
}

// Window counter - tracks usage of one rule by one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub window_start: Instant,
    pub count: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    // A stale `now` (before window_start) counts as zero elapsed
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    fn is_lapsed(&self, window: Duration, now: Instant) -> bool {
        self.elapsed(now) >= window
    }

    fn try_consume(&mut self, rule: &RateRule, now: Instant) -> AdmitDecision {
        // window expired..? reset it
        if self.is_lapsed(rule.window, now) {
            self.window_start = now;
            self.count = 0;
        }

        // Bookkeeping bug, not a client condition. Fatal in debug, fail-open in release.
        if self.count > rule.max_count {
            debug_assert!(
                false,
                "counter for rule {} overran its budget: {} > {}",
                rule.name, self.count, rule.max_count
            );
            error!(
                rule = %rule.name,
                count = self.count,
                max_count = rule.max_count,
                "window counter overran its budget, admitting request"
            );
            return AdmitDecision::Allowed;
        }

        if self.count >= rule.max_count {
            return AdmitDecision::Denied {
                retry_after: rule.window - self.elapsed(now),
            };
        }

        self.count += 1;
        AdmitDecision::Allowed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    identity: IdentityKey,
    rule: String,
}

impl CounterKey {
    fn new(identity: &Identity, rule: &RateRule) -> Self {
        Self {
            identity: identity.key(),
            rule: rule.name.clone(),
        }
    }
}

// Counter plus the window it was created for, so the sweeper can judge staleness
#[derive(Debug)]
struct Slot {
    window: Duration,
    counter: WindowCounter,
}

impl Slot {
    fn is_lapsed(&self, now: Instant) -> bool {
        self.counter.is_lapsed(self.window, now)
    }
}

// Owns every window counter; the entry guard is held across check-and-increment
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    counters: DashMap<CounterKey, Slot>,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and consume one unit of `rule` for `identity`.
    pub fn admit(&self, identity: &Identity, rule: &RateRule, now: Instant) -> AdmitDecision {
        let mut slot = self
            .counters
            .entry(CounterKey::new(identity, rule))
            .or_insert_with(|| Slot {
                window: rule.window,
                counter: WindowCounter::new(now),
            });
        slot.window = rule.window;
        slot.counter.try_consume(rule, now)
    }

    // Stops at the first denial; later rules are not charged
    pub fn admit_all<'a, I>(&self, identity: &Identity, rules: I, now: Instant) -> AdmitDecision
    where
        I: IntoIterator<Item = &'a RateRule>,
    {
        for rule in rules {
            let decision = self.admit(identity, rule, now);
            if !decision.is_allowed() {
                return decision;
            }
        }
        AdmitDecision::Allowed
    }

    // Effective usage at `now`; 0 once the window has lapsed
    #[cfg(test)]
    pub(crate) fn count(&self, identity: &Identity, rule: &RateRule, now: Instant) -> u32 {
        self.counters
            .get(&CounterKey::new(identity, rule))
            .filter(|slot| !slot.is_lapsed(now))
            .map(|slot| slot.counter.count)
            .unwrap_or(0)
    }

    pub fn tracked(&self) -> usize {
        self.counters.len()
    }

    // Staleness is re-checked under each entry's lock before removal
    pub fn prune_idle(&self, now: Instant) -> usize {
        let stale: Vec<CounterKey> = self
            .counters
            .iter()
            .filter(|entry| entry.value().is_lapsed(now))
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|key| {
                self.counters
                    .remove_if(key, |_, slot| slot.is_lapsed(now))
                    .is_some()
            })
            .count()
    }
}

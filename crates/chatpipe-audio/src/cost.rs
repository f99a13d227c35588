//! ASR cost estimation.
//!
//! Rates and rounding disciplines are data, not code paths: one row per
//! `(provider, model, plan)`. Unknown combinations bill at zero rather
//! than failing a run.

use chatpipe_utils::canonical::round6;

/// Billing rounding discipline applied to billable seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Bill raw seconds.
    RawSeconds,
    /// Round each item up to the next 30 s.
    CeilTo30s,
    /// Round each item up to the next 60 s.
    CeilTo60s,
}

struct Rate {
    provider: &'static str,
    /// `*` matches any model.
    model: &'static str,
    plan: &'static str,
    per_minute_usd: f64,
    rounding: Rounding,
}

const RATES: &[Rate] = &[
    Rate {
        provider: "openai",
        model: "whisper-1",
        plan: "standard",
        per_minute_usd: 0.006,
        rounding: Rounding::RawSeconds,
    },
    Rate {
        provider: "openai",
        model: "*",
        plan: "standard",
        per_minute_usd: 0.006,
        rounding: Rounding::RawSeconds,
    },
    Rate {
        provider: "openai",
        model: "*",
        plan: "batch",
        per_minute_usd: 0.003,
        rounding: Rounding::CeilTo30s,
    },
    Rate {
        provider: "whisper-cli",
        model: "*",
        plan: "standard",
        per_minute_usd: 0.0,
        rounding: Rounding::RawSeconds,
    },
    Rate {
        provider: "stub",
        model: "*",
        plan: "standard",
        per_minute_usd: 0.0,
        rounding: Rounding::RawSeconds,
    },
];

fn lookup(provider: &str, model: &str, plan: &str) -> Option<&'static Rate> {
    RATES
        .iter()
        .find(|r| r.provider == provider && r.model == model && r.plan == plan)
        .or_else(|| {
            RATES
                .iter()
                .find(|r| r.provider == provider && r.model == "*" && r.plan == plan)
        })
}

fn apply_rounding(seconds: f64, rounding: Rounding) -> f64 {
    match rounding {
        Rounding::RawSeconds => seconds,
        Rounding::CeilTo30s => (seconds / 30.0).ceil() * 30.0,
        Rounding::CeilTo60s => (seconds / 60.0).ceil() * 60.0,
    }
}

/// Estimated cost in USD for `billable_seconds` of audio.
///
/// Always non-negative; rounded to 6 decimals.
#[must_use]
pub fn estimate_cost(provider: &str, model: &str, plan: &str, billable_seconds: f64) -> f64 {
    let seconds = billable_seconds.max(0.0);
    match lookup(provider, model, plan) {
        Some(rate) => {
            let billed = apply_rounding(seconds, rate.rounding);
            round6(billed / 60.0 * rate.per_minute_usd)
        }
        None => 0.0,
    }
}

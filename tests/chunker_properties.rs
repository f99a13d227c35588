//! Property tests for the chunk planner: coverage, bounds, and the
//! overlap/window validation boundary.

use proptest::prelude::*;

use chatpipe::audio::plan_windows;
use chatpipe::config::Config;

proptest! {
    #[test]
    fn windows_cover_the_stream_without_gaps(
        total in 0.1f64..3600.0,
        window in 1.0f64..300.0,
        overlap_frac in 0.0f64..0.9,
    ) {
        let overlap = window * overlap_frac;
        let windows = plan_windows(total, window, overlap);

        prop_assert!(!windows.is_empty());
        // First window starts at zero; last ends at (rounded) EOF.
        prop_assert_eq!(windows[0].0, 0.0);
        let last = windows[windows.len() - 1];
        prop_assert!((last.1 - total).abs() < 0.002);

        for (start, end) in &windows {
            prop_assert!(end > start);
            // No window exceeds the configured length (rounding slack).
            prop_assert!(end - start <= window + 0.002);
        }

        // Consecutive windows overlap or touch: no instant is uncovered.
        for pair in windows.windows(2) {
            prop_assert!(pair[1].0 <= pair[0].1 + 1e-9);
        }
    }

    #[test]
    fn planning_is_deterministic(total in 0.1f64..1000.0, window in 1.0f64..200.0) {
        prop_assert_eq!(
            plan_windows(total, window, 0.25),
            plan_windows(total, window, 0.25)
        );
    }
}

#[test]
fn zero_or_negative_durations_yield_nothing() {
    assert!(plan_windows(0.0, 120.0, 0.25).is_empty());
    assert!(plan_windows(-5.0, 120.0, 0.25).is_empty());
}

#[test]
fn overlap_must_be_strictly_less_than_window() {
    let mut config = Config::default();
    config.audio.chunk_seconds = 30.0;
    config.audio.chunk_overlap_seconds = 30.0;
    assert!(config.validate().is_err());

    config.audio.chunk_overlap_seconds = 29.9;
    config.validate().unwrap();
}

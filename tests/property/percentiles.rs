//! Property tests for the percentile helpers.

use proptest::prelude::*;
use stampede_metrics::stats::{nearest_rank, population_std_dev, sorted};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn nearest_rank_returns_a_member(values in prop::collection::vec(0.0f64..10_000.0, 1..500), p in 0.0f64..100.0) {
        let samples = sorted(values);
        let result = nearest_rank(&samples, p);
        prop_assert!(samples.contains(&result));
    }

    #[test]
    fn nearest_rank_is_monotone_in_p(values in prop::collection::vec(0.0f64..10_000.0, 1..500)) {
        let samples = sorted(values);
        let mut previous = f64::NEG_INFINITY;
        for p in [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0, 99.9, 100.0] {
            let value = nearest_rank(&samples, p);
            prop_assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn nearest_rank_is_bounded_by_extremes(values in prop::collection::vec(0.0f64..10_000.0, 1..500), p in 0.0f64..100.0) {
        let samples = sorted(values);
        let result = nearest_rank(&samples, p);
        prop_assert!(result >= samples[0]);
        prop_assert!(result <= samples[samples.len() - 1]);
    }

    #[test]
    fn std_dev_is_non_negative(values in prop::collection::vec(-1_000.0f64..1_000.0, 0..200)) {
        prop_assert!(population_std_dev(&values) >= 0.0);
    }

    #[test]
    fn std_dev_is_translation_invariant(values in prop::collection::vec(0.0f64..100.0, 2..100), shift in -50.0f64..50.0) {
        let shifted: Vec<f64> = values.iter().map(|v| v + shift).collect();
        let difference = (population_std_dev(&values) - population_std_dev(&shifted)).abs();
        prop_assert!(difference < 1e-6);
    }
}

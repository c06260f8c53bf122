use pagetrail_core::frame::FrameGate;
use pagetrail_core::{ScrollMetrics, ThresholdSet, ThresholdTracker};
use proptest::prelude::*;

fn tracker() -> ThresholdTracker {
    ThresholdTracker::new(ThresholdSet::default())
}

proptest! {
    #[test]
    fn each_threshold_fires_at_most_once(
        positions in prop::collection::vec(0.0f64..=1.0, 1..200),
        document in 900.0f64..20_000.0,
    ) {
        let mut tracker = tracker();
        let scrollable = document - 800.0;
        let mut fired = Vec::new();
        for p in positions {
            fired.extend(tracker.sample(&ScrollMetrics::new(p * scrollable, document, 800.0)));
        }

        let mut deduped = fired.clone();
        deduped.dedup();
        prop_assert_eq!(&fired, &deduped);
        prop_assert!(fired.len() <= 5);
    }

    #[test]
    fn thresholds_fire_in_ascending_order(
        positions in prop::collection::vec(0.0f64..=1.0, 1..200),
    ) {
        let mut tracker = tracker();
        let mut fired = Vec::new();
        for p in positions {
            fired.extend(tracker.sample(&ScrollMetrics::new(p * 4000.0, 4800.0, 800.0)));
        }
        prop_assert!(fired.windows(2).all(|w| w[0] < w[1]), "fired out of order: {:?}", fired);
    }

    #[test]
    fn fired_thresholds_never_exceed_max_depth(
        positions in prop::collection::vec(0.0f64..=1.0, 1..100),
    ) {
        let mut tracker = tracker();
        let mut max_depth = 0u8;
        let mut fired = Vec::new();
        for p in positions {
            let metrics = ScrollMetrics::new(p * 1000.0, 1800.0, 800.0);
            max_depth = max_depth.max(metrics.percentage());
            fired.extend(tracker.sample(&metrics));
        }
        prop_assert!(fired.iter().all(|t| *t <= max_depth));
    }

    #[test]
    fn short_documents_report_zero(
        scroll_top in 0.0f64..5000.0,
        document in 0.0f64..800.0,
    ) {
        let metrics = ScrollMetrics::new(scroll_top, document, 800.0);
        prop_assert_eq!(metrics.percentage(), 0);
        prop_assert!(tracker().sample(&metrics).is_empty());
    }

    #[test]
    fn percentage_is_clamped(
        scroll_top in -10_000.0f64..10_000.0,
        document in 0.0f64..10_000.0,
        viewport in 0.0f64..2_000.0,
    ) {
        prop_assert!(ScrollMetrics::new(scroll_top, document, viewport).percentage() <= 100);
    }

    #[test]
    fn burst_runs_one_frame_with_latest_sample(samples in prop::collection::vec(any::<u32>(), 1..500)) {
        let mut gate = FrameGate::new();
        for s in &samples {
            gate.request(*s);
        }
        prop_assert_eq!(gate.on_frame(), samples.last().copied());
        prop_assert_eq!(gate.on_frame(), None);
        prop_assert_eq!(gate.stats().frames_run, 1);
    }
}

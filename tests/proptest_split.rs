use proptest::prelude::*;
use trapset::split::{assign, partition, Partition, SplitThreshold};

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn assignment_is_a_pure_function_of_the_digest(
        digest in proptest_helpers::arb_digest(),
        threshold in "[0-9a-f]{1,64}",
    ) {
        let t = SplitThreshold::new(&threshold).unwrap();
        let expected = if digest.as_str() > threshold.as_str() {
            Partition::Validation
        } else {
            Partition::Train
        };
        prop_assert_eq!(assign(&digest, &t), expected);
        prop_assert_eq!(assign(&digest.clone(), &t.clone()), expected);
    }

    #[test]
    fn adding_items_never_moves_existing_ones(
        base in prop::collection::vec(proptest_helpers::arb_digest(), 0..20),
        extra in prop::collection::vec(proptest_helpers::arb_digest(), 0..20),
        fraction in 0.0f64..=1.0,
    ) {
        let t = SplitThreshold::from_validation_fraction(fraction).unwrap();
        let before = partition(base.iter(), &t);
        let after = partition(base.iter().chain(extra.iter()), &t);
        for d in &before.train {
            prop_assert!(after.train.contains(d));
        }
        for d in &before.validation {
            prop_assert!(after.validation.contains(d));
        }
        prop_assert_eq!(after.train.len() + after.validation.len(), base.len() + extra.len());
    }

    #[test]
    fn larger_fraction_never_shrinks_validation(
        digest in proptest_helpers::arb_digest(),
        lo in 0.0f64..=1.0,
        hi in 0.0f64..=1.0,
    ) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let small = SplitThreshold::from_validation_fraction(lo).unwrap();
        let large = SplitThreshold::from_validation_fraction(hi).unwrap();
        if assign(&digest, &small) == Partition::Validation {
            prop_assert_eq!(assign(&digest, &large), Partition::Validation);
        }
    }
}

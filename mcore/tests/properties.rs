use mcore::measure::{decode, is_valid_sequence};
use proptest::prelude::*;

proptest! {
    #[test]
    fn foreign_character_gives_empty_result(s in "[a-z_]{0,20}[^a-z_][a-z_]{0,20}") {
        prop_assert!(!is_valid_sequence(&s));
        prop_assert_eq!(decode(&s).unwrap(), Vec::<u128>::new());
    }

    #[test]
    fn decoding_is_deterministic(s in "[a-z_]{1,200}") {
        prop_assert_eq!(decode(&s).unwrap(), decode(&s).unwrap());
    }

    #[test]
    fn output_bounded_by_value_symbols(s in "[a-z_]{1,200}") {
        let values = s.bytes().filter(|b| *b != b'z').count();
        prop_assert!(decode(&s).unwrap().len() <= values);
    }

    #[test]
    fn carry_markers_alone_produce_nothing(n in 1usize..50) {
        prop_assert_eq!(decode(&"z".repeat(n)).unwrap(), Vec::<u128>::new());
    }
}

//! Property-based tests for the mode configuration record and status parser
//!
//! These tests check that segment edits touch exactly one segment, that
//! malformed inputs are rejected by length, and that status parsing never
//! panics on arbitrary frames.

use kettle_core::{
    parse_status, read_segment, replace_segment, CodecError, MODE_CONFIG_LEN,
    MODE_SEGMENT_COUNT, MODE_SEGMENT_LEN, STATUS_FRAME_MIN_LEN,
};
use proptest::prelude::*;

/// Generate an arbitrary well-formed record
fn arb_record() -> impl Strategy<Value = [u8; MODE_CONFIG_LEN]> {
    any::<[u8; MODE_CONFIG_LEN]>()
}

/// Generate a valid segment index
fn arb_index() -> impl Strategy<Value = usize> {
    0..MODE_SEGMENT_COUNT
}

proptest! {
    /// Property: a replaced segment reads back and no other byte changes
    #[test]
    fn replace_then_read_returns_value(
        record in arb_record(),
        index in arb_index(),
        value in any::<[u8; MODE_SEGMENT_LEN]>(),
    ) {
        let updated = replace_segment(&record, index, &value).unwrap();
        prop_assert_eq!(read_segment(&updated, index).unwrap(), value);

        for other in (0..MODE_SEGMENT_COUNT).filter(|i| *i != index) {
            prop_assert_eq!(
                read_segment(&updated, other).unwrap(),
                read_segment(&record, other).unwrap()
            );
        }
    }

    /// Property: records of any other length are rejected
    #[test]
    fn wrong_record_length_rejected(
        record in prop::collection::vec(any::<u8>(), 0..32),
        index in arb_index(),
    ) {
        prop_assume!(record.len() != MODE_CONFIG_LEN);
        let expected = CodecError::InvalidLength {
            expected: MODE_CONFIG_LEN,
            actual: record.len(),
        };
        prop_assert_eq!(read_segment(&record, index), Err(expected.clone()));
        prop_assert_eq!(replace_segment(&record, index, &[0, 0]), Err(expected));
    }

    /// Property: segment values of any other length are rejected
    #[test]
    fn wrong_value_length_rejected(
        record in arb_record(),
        index in arb_index(),
        value in prop::collection::vec(any::<u8>(), 0..8),
    ) {
        prop_assume!(value.len() != MODE_SEGMENT_LEN);
        prop_assert_eq!(
            replace_segment(&record, index, &value),
            Err(CodecError::InvalidLength {
                expected: MODE_SEGMENT_LEN,
                actual: value.len(),
            })
        );
    }

    /// Property: parsing accepts exactly the frames of minimum length or more
    #[test]
    fn status_parse_length_gate(
        frame in prop::collection::vec(any::<u8>(), 0..24),
        authenticated in any::<bool>(),
    ) {
        let parsed = parse_status(&frame, authenticated);
        if frame.len() < STATUS_FRAME_MIN_LEN {
            prop_assert!(parsed.is_err());
        } else {
            let snapshot = parsed.unwrap();
            prop_assert_eq!(snapshot.current_temperature, frame[5]);
            prop_assert_eq!(snapshot.mode, frame[4]);
            prop_assert_eq!(
                snapshot.keep_warm_time,
                u16::from_be_bytes([frame[7], frame[8]])
            );
            prop_assert!(!snapshot.is_control || authenticated);
        }
    }
}

//! Property-based tests for the change event buffer.

use proptest::prelude::*;
use serde_json::json;
use vela_core::{ChangeKind, Document};
use vela_storage::ChangeEventBuffer;

fn fill(buffer: &ChangeEventBuffer, writes: usize) {
    for i in 0..writes {
        let doc = Document::new("id", json!({"id": format!("d{}", i % 7), "n": i})).unwrap();
        buffer.append(ChangeKind::Update, None, Some(doc));
    }
}

proptest! {
    /// Property: `get_from(n + 1)` returns exactly the events in `(n, counter]`
    /// while `n` is within reach, and `None` once an event after `n` was evicted.
    #[test]
    fn get_from_window(capacity in 1usize..20, writes in 0usize..60, n in 0u64..70) {
        let buffer = ChangeEventBuffer::new("c", capacity);
        fill(&buffer, writes);
        let counter = buffer.counter();
        prop_assert_eq!(counter, writes as u64);

        let oldest = counter.saturating_sub(capacity as u64) + 1;
        match buffer.get_from(n + 1) {
            Some(events) => {
                prop_assert!(n + 1 >= oldest || oldest == 1);
                let got: Vec<u64> = events.iter().map(|e| e.sequence_id()).collect();
                let expected: Vec<u64> = ((n + 1)..=counter).collect();
                prop_assert_eq!(got, expected);
            }
            None => prop_assert!(n + 1 < oldest && oldest > 1),
        }
    }

    /// Property: the counter only grows and retained events stay contiguous.
    #[test]
    fn counter_is_monotonic(capacity in 1usize..10, writes in 1usize..40) {
        let buffer = ChangeEventBuffer::new("c", capacity);
        let mut last = 0;
        for i in 0..writes {
            let doc = Document::new("id", json!({"id": format!("d{}", i)})).unwrap();
            let event = buffer.append(ChangeKind::Insert, None, Some(doc));
            prop_assert_eq!(event.sequence_id(), last + 1);
            last = event.sequence_id();
        }
        prop_assert_eq!(buffer.len(), writes.min(capacity));
        let retained = buffer.get_from(buffer.oldest_sequence().unwrap()).unwrap();
        for pair in retained.windows(2) {
            prop_assert_eq!(pair[1].sequence_id(), pair[0].sequence_id() + 1);
        }
    }
}

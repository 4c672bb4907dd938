//! Process-wide query id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a query instance within the process.
pub type QueryId = u64;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Gets the next unique query id.
pub fn next_query_id() -> QueryId {
    NEXT_QUERY_ID.fetch_add(1, Ordering::SeqCst)
}

/// Sets the next query id only if it is greater than the current value.
/// Used when restoring state so ids never repeat.
pub fn set_next_query_id(id: QueryId) {
    NEXT_QUERY_ID.fetch_max(id, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_ids_are_unique_and_increasing() {
        let a = next_query_id();
        let b = next_query_id();
        assert!(b > a);
    }

    #[test]
    fn test_set_next_query_id_never_goes_back() {
        set_next_query_id(1_000_000);
        let a = next_query_id();
        set_next_query_id(5);
        let b = next_query_id();
        assert!(a >= 1_000_000);
        assert!(b > a);
    }
}

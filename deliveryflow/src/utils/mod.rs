//! Utility functions for run ids and timestamps.

mod time;

pub use time::{elapsed_between, iso_timestamp, parse_timestamp, Timestamp};

use uuid::Uuid;

/// Generates a time-ordered run id, so ids sort by start time.
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_v7() {
        let id = Uuid::parse_str(&generate_run_id()).unwrap();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Import,
    Export,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Import => "import",
            SyncType::Export => "export",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(SyncType::Import),
            "export" => Some(SyncType::Export),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
    Error,
}

impl SyncStatus {
    /// `Error` only when every processed item failed.
    pub fn from_counts(processed: usize, errors: usize) -> Self {
        if errors == 0 {
            SyncStatus::Success
        } else if errors >= processed {
            SyncStatus::Error
        } else {
            SyncStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(SyncStatus::Success),
            "partial" => Some(SyncStatus::Partial),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record, one per sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub family_member_id: String,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub events_processed: u32,
    pub errors_count: u32,
    pub error_details: Option<Vec<String>>,
    pub completed_at: DateTime<Utc>,
}

impl SyncLogEntry {
    pub fn for_run(member_id: &str, sync_type: SyncType, processed: u32, errors: Vec<String>) -> Self {
        let errors_count = errors.len() as u32;
        Self {
            family_member_id: member_id.to_string(),
            sync_type,
            status: SyncStatus::from_counts(processed as usize, errors.len()),
            events_processed: processed,
            errors_count,
            error_details: (!errors.is_empty()).then_some(errors),
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTally {
    pub processed: u32,
    pub applied: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl RunTally {
    pub fn status(&self) -> SyncStatus {
        SyncStatus::from_counts(self.processed as usize, self.errors.len())
    }
}

/// Runs `process` over every item in order. A failed item is turned into a
/// message by `describe_failure` and collected; the loop always continues.
pub fn collect_errors<T, E, F, D>(items: &[T], mut process: F, describe_failure: D) -> RunTally
where
    F: FnMut(&T) -> Result<ItemOutcome, E>,
    D: Fn(&T, E) -> String,
{
    let mut tally = RunTally::default();

    for item in items {
        tally.processed += 1;
        match process(item) {
            Ok(ItemOutcome::Applied) => tally.applied += 1,
            Ok(ItemOutcome::Skipped) => tally.skipped += 1,
            Err(err) => {
                let message = describe_failure(item, err);
                tracing::warn!("{}", message);
                tally.errors.push(message);
            }
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_errors_is_success() {
        assert_eq!(SyncStatus::from_counts(3, 0), SyncStatus::Success);
        assert_eq!(SyncStatus::from_counts(0, 0), SyncStatus::Success);
    }

    #[test]
    fn some_errors_is_partial() {
        assert_eq!(SyncStatus::from_counts(3, 1), SyncStatus::Partial);
    }

    #[test]
    fn all_errors_is_error() {
        assert_eq!(SyncStatus::from_counts(2, 2), SyncStatus::Error);
    }

    #[test]
    fn entry_without_errors_has_no_details() {
        let entry = SyncLogEntry::for_run("m1", SyncType::Export, 1, vec![]);

        assert_eq!(entry.status, SyncStatus::Success);
        assert_eq!(entry.errors_count, 0);
        assert_eq!(entry.error_details, None);
    }

    #[test]
    fn collect_errors_continues_past_failures() {
        let items = vec![1, -2, 3, 0, -5];

        let tally = collect_errors(
            &items,
            |n| match *n {
                n if n < 0 => Err(format!("negative {}", n)),
                0 => Ok(ItemOutcome::Skipped),
                _ => Ok(ItemOutcome::Applied),
            },
            |n, err| format!("Failed to import \"{}\": {}", n, err),
        );

        assert_eq!(tally.processed, 5);
        assert_eq!(tally.applied, 2);
        assert_eq!(tally.skipped, 1);
        assert_eq!(
            tally.errors,
            vec![
                "Failed to import \"-2\": negative -2".to_string(),
                "Failed to import \"-5\": negative -5".to_string(),
            ]
        );
        assert_eq!(tally.status(), SyncStatus::Partial);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [SyncStatus::Success, SyncStatus::Partial, SyncStatus::Error] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncType::parse("export"), Some(SyncType::Export));
    }

    proptest! {
        #[test]
        fn status_matches_error_share(processed in 1usize..50, errors_seed in 0usize..50) {
            let errors = errors_seed % (processed + 1);
            let status = SyncStatus::from_counts(processed, errors);

            prop_assert_eq!(status == SyncStatus::Success, errors == 0);
            prop_assert_eq!(status == SyncStatus::Error, errors == processed);
        }
    }
}

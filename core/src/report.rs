/// User-facing notices for finished scans and replace runs
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub occurrences: usize,
    pub records: usize,
}

impl ScanSummary {
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn message(&self) -> String {
        if self.is_empty() {
            "No matches found".to_string()
        } else {
            format!(
                "Found {} matches across {} records",
                self.occurrences, self.records
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSummary {
    pub completed: usize,
    pub failed: usize,
}

impl ReplaceSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn message(&self) -> String {
        if self.is_success() {
            format!("Replaced in {} items", self.completed)
        } else {
            format!(
                "Replaced in {} items, {} failed",
                self.completed, self.failed
            )
        }
    }
}

//! Multipart upload session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One part acknowledged by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: u32,
    pub e_tag: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Started,
    UploadingParts,
    Completed,
    Aborted,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Aborted)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadState::Started => "started",
            UploadState::UploadingParts => "uploading_parts",
            UploadState::Completed => "completed",
            UploadState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Upload session is already {0}")]
    Terminal(UploadState),

    #[error("Part {0} was already recorded")]
    DuplicatePart(u32),

    #[error("Part numbers start at 1, got {0}")]
    InvalidPartNumber(u32),
}

/// One in-flight multipart upload.
///
/// Owned by the coordinating task. Parts are recorded only after the store returned
/// an ETag for them; `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub object_key: String,
    pub upload_id: String,
    parts: Vec<PartRecord>,
    state: UploadState,
    pub started_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(object_key: impl Into<String>, upload_id: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            upload_id: upload_id.into(),
            parts: Vec::new(),
            state: UploadState::Started,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Parts in the order they were acknowledged.
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    pub fn record_part(&mut self, part: PartRecord) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminal(self.state));
        }
        if part.part_number == 0 {
            return Err(SessionError::InvalidPartNumber(0));
        }
        if self.parts.iter().any(|p| p.part_number == part.part_number) {
            return Err(SessionError::DuplicatePart(part.part_number));
        }
        self.parts.push(part);
        self.state = UploadState::UploadingParts;
        Ok(())
    }

    /// Parts sorted ascending by part number, the order `Complete` requires.
    pub fn sorted_parts(&self) -> Vec<PartRecord> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Part numbers in `1..=expected` that have not been recorded.
    pub fn missing_parts(&self, expected: u32) -> Vec<u32> {
        let have: BTreeSet<u32> = self.parts.iter().map(|p| p.part_number).collect();
        (1..=expected).filter(|n| !have.contains(n)).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }

    pub fn mark_completed(&mut self) -> Result<(), SessionError> {
        self.transition(UploadState::Completed)
    }

    pub fn mark_aborted(&mut self) -> Result<(), SessionError> {
        self.transition(UploadState::Aborted)
    }

    fn transition(&mut self, next: UploadState) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminal(self.state));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u32) -> PartRecord {
        PartRecord {
            part_number: n,
            e_tag: format!("etag-{}", n),
            size: 10,
        }
    }

    #[test]
    fn parts_are_sorted_regardless_of_arrival_order() {
        let mut session = UploadSession::new("k", "u");
        session.record_part(part(3)).unwrap();
        session.record_part(part(1)).unwrap();
        session.record_part(part(2)).unwrap();

        let numbers: Vec<u32> = session.sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(session.state(), UploadState::UploadingParts);
        assert_eq!(session.total_bytes(), 30);
    }

    #[test]
    fn duplicate_and_zero_part_numbers_are_rejected() {
        let mut session = UploadSession::new("k", "u");
        session.record_part(part(1)).unwrap();
        assert_eq!(
            session.record_part(part(1)),
            Err(SessionError::DuplicatePart(1))
        );
        assert_eq!(
            session.record_part(part(0)),
            Err(SessionError::InvalidPartNumber(0))
        );
    }

    #[test]
    fn missing_parts_are_reported() {
        let mut session = UploadSession::new("k", "u");
        session.record_part(part(1)).unwrap();
        session.record_part(part(3)).unwrap();
        assert_eq!(session.missing_parts(4), vec![2, 4]);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut session = UploadSession::new("k", "u");
        session.mark_aborted().unwrap();
        assert_eq!(
            session.record_part(part(1)),
            Err(SessionError::Terminal(UploadState::Aborted))
        );
        assert_eq!(
            session.mark_completed(),
            Err(SessionError::Terminal(UploadState::Aborted))
        );
    }
}

//! Error types for Arbor.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in Arbor operations.
#[derive(Debug, Error)]
pub enum ArborError {
    // Arena errors
    #[error("Page arena exhausted: all {capacity} pages in use")]
    ArenaExhausted { capacity: u32 },

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("Page still latched: {page_id}")]
    PageLatched { page_id: PageId },

    // Page layout errors
    #[error("Page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: PageId, reason: String },

    #[error("Page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("Page full, unable to insert cell")]
    PageFull,

    #[error("Invalid node type code {code:#x} on page {page_id}")]
    InvalidNodeType { page_id: PageId, code: u16 },

    #[error("Decode error: {0}")]
    Decode(String),

    // B-tree errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Cell too large: {size} bytes (max {max})")]
    CellTooLarge { size: usize, max: usize },

    #[error("B-tree corrupted: {0}")]
    BTreeCorrupted(String),

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArborError {
    /// Builds a `PageCorrupted` error for the given page.
    pub fn corrupted(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::PageCorrupted {
            page_id,
            reason: reason.into(),
        }
    }

    /// Returns true for errors that indicate a damaged page or tree shape.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::PageCorrupted { .. }
                | Self::InvalidNodeType { .. }
                | Self::BTreeCorrupted(_)
                | Self::Decode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_exhausted_display() {
        let err = ArborError::ArenaExhausted { capacity: 100 };
        assert_eq!(err.to_string(), "Page arena exhausted: all 100 pages in use");
    }

    #[test]
    fn test_page_not_found_display() {
        let err = ArborError::PageNotFound {
            page_id: PageId::new(42),
        };
        assert_eq!(err.to_string(), "Page not found: 42");
    }

    #[test]
    fn test_page_corrupted_display() {
        let err = ArborError::corrupted(PageId::new(7), "slot offset out of range");
        assert_eq!(
            err.to_string(),
            "Page corrupted: 7, reason: slot offset out of range"
        );
        assert!(err.is_structural());
    }

    #[test]
    fn test_page_size_mismatch_display() {
        let err = ArborError::PageSizeMismatch {
            expected: 8192,
            actual: 4096,
        };
        assert_eq!(err.to_string(), "Page size mismatch: expected 8192, got 4096");
    }

    #[test]
    fn test_invalid_node_type_display() {
        let err = ArborError::InvalidNodeType {
            page_id: PageId::new(3),
            code: 0x2,
        };
        assert_eq!(err.to_string(), "Invalid node type code 0x2 on page 3");
        assert!(err.is_structural());
    }

    #[test]
    fn test_btree_errors_display() {
        assert_eq!(ArborError::DuplicateKey.to_string(), "Duplicate key");

        let err = ArborError::CellTooLarge {
            size: 5000,
            max: 2039,
        };
        assert_eq!(err.to_string(), "Cell too large: 5000 bytes (max 2039)");
        assert!(!err.is_structural());

        let err = ArborError::BTreeCorrupted("child pid is invalid".to_string());
        assert_eq!(err.to_string(), "B-tree corrupted: child pid is invalid");
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = ArborError::InvalidParameter {
            name: "max_fill_factor".to_string(),
            value: "1.5".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: max_fill_factor = 1.5");
    }

    #[test]
    fn test_page_full_is_not_structural() {
        assert!(!ArborError::PageFull.is_structural());
        assert!(!ArborError::ArenaExhausted { capacity: 1 }.is_structural());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ArborError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ArborError>();
    }
}

//! Error types for Tensores
//!
//! This module defines all error types used throughout the library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Tensores operations
pub type Result<T> = std::result::Result<T, TensoresError>;

/// Error type for all Tensores operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensoresError {
    /// Invalid argument passed to a loader or builder
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Reason for invalidity
        reason: String,
    },

    /// File could not be opened
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Path that failed to open
        path: PathBuf,
    },

    /// File I/O failure during read or write
    #[error("Failed to read '{}': {message}", path.display())]
    FileRead {
        /// Path being read
        path: PathBuf,
        /// Underlying I/O error message
        message: String,
    },

    /// Container prefix or JSON header violates the format contract
    #[error("Invalid header: {reason}")]
    InvalidHeader {
        /// Reason the header was rejected
        reason: String,
    },

    /// JSON reader failure with the byte offset of the first error
    #[error("JSON parse error at byte {offset}: {message}")]
    JsonParse {
        /// Byte offset into the header where parsing failed
        offset: usize,
        /// Parser diagnostic
        message: String,
    },

    /// Tensor descriptor is missing a required field
    #[error("Tensor '{name}': missing field '{field}'")]
    MissingField {
        /// Tensor name
        name: String,
        /// Name of the missing field
        field: String,
    },

    /// Tensor descriptor names a dtype outside the closed set
    #[error("Tensor '{name}': unknown dtype '{dtype}'")]
    UnknownDtype {
        /// Tensor name
        name: String,
        /// The unrecognized dtype string
        dtype: String,
    },

    /// Tensor shape exceeds the dimension limit
    #[error("Tensor '{name}': too many dimensions ({ndim}, max {max})")]
    TooManyDims {
        /// Tensor name
        name: String,
        /// Number of dimensions in the header
        ndim: usize,
        /// Maximum allowed dimensions
        max: usize,
    },

    /// Tensor `data_offsets` field is malformed or mismatched with emptiness
    #[error("Tensor '{name}': invalid data_offsets: {reason}")]
    BadOffsets {
        /// Tensor name
        name: String,
        /// Reason the offsets were rejected
        reason: String,
    },

    /// Two tensors share a name
    #[error("Duplicate tensor name '{name}'")]
    DuplicateName {
        /// The duplicated name
        name: String,
    },

    /// Tensor offsets do not match the payload or the descriptor byte size
    #[error("Tensor '{name}': {reason}")]
    InvalidTensor {
        /// Tensor name
        name: String,
        /// Reason validation failed
        reason: String,
    },

    /// Typed extraction requested a different dtype than the tensor carries
    #[error("Tensor '{name}' has dtype {actual}, expected {expected}")]
    DtypeMismatch {
        /// Tensor name
        name: String,
        /// Dtype the caller asked for
        expected: String,
        /// Dtype stored in the descriptor
        actual: String,
    },

    /// Lookup key is absent
    #[error("Key '{key}' not found")]
    KeyNotFound {
        /// The missing key
        key: String,
    },

    /// File I/O failure during write
    #[error("Failed to write '{}': {message}", path.display())]
    FileWrite {
        /// Path being written
        path: PathBuf,
        /// Underlying I/O error message
        message: String,
    },

    /// Memory mapping syscall failure
    #[error("mmap failed: {message}")]
    MmapFailed {
        /// OS error message
        message: String,
    },

    /// Memory mapping is unavailable on this target
    #[error("mmap not supported on this platform")]
    MmapUnsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TensoresError::UnknownDtype {
            name: "weight".to_string(),
            dtype: "F4".to_string(),
        };
        assert!(err.to_string().contains("unknown dtype 'F4'"));
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_json_parse_offset_in_message() {
        let err = TensoresError::JsonParse {
            offset: 17,
            message: "Expected ':' after key".to_string(),
        };
        assert!(err.to_string().contains("byte 17"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = TensoresError::InvalidHeader {
            reason: "Header size too small".to_string(),
        };
        let err2 = TensoresError::InvalidHeader {
            reason: "Header size too small".to_string(),
        };
        assert_eq!(err1, err2);
    }
}

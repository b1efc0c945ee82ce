//! # Tensores
//!
//! Pure Rust loader, validator and writer for the safetensors tensor
//! container format: named n-dimensional tensors plus optional string
//! metadata, stored so that untrusted files are safe to open.
//!
//! ## Format Overview
//!
//! ```text
//! Safetensors := HEADER_SIZE HEADER PAYLOAD
//!
//! HEADER_SIZE := u64 (little-endian)
//!
//! HEADER := JSON {
//!   "__metadata__": { "key": "value", ... },      (optional)
//!   "tensor_name": {
//!     "dtype": "F32" | "F16" | "BF16" | ...,
//!     "shape": [dim1, dim2, ...],
//!     "data_offsets": [begin, end]                (absent for empty tensors)
//!   },
//!   ...
//! }
//!
//! PAYLOAD := raw little-endian tensor bytes, offsets relative to its start
//! ```
//!
//! The header is untrusted input: the embedded JSON reader rejects
//! duplicate keys, control characters and malformed escapes, the header
//! size is capped at 100 MiB, and offset arithmetic is bounds-checked.
//!
//! ## Load modes
//!
//! Two ways to open a file: **copy** reads the payload into an owned
//! buffer, **map** memory-maps the file read-only and hands out zero-copy
//! views. Offset validation is a separate, explicit pass so corrupt files
//! can still be inspected.
//!
//! ## Example
//!
//! ```rust
//! use tensores::{Dtype, SafeTensors, SafeTensorsBuilder};
//!
//! let mut builder = SafeTensorsBuilder::new();
//! builder.add_metadata("format", "pt").unwrap();
//! let data: Vec<u8> = [1.0f32, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
//! builder.add_tensor("weight", Dtype::F32, &[3], &data).unwrap();
//! let bytes = builder.to_bytes();
//!
//! let st = SafeTensors::load_from_memory(&bytes).unwrap();
//! st.validate_data_offsets().unwrap();
//! assert_eq!(st.get_tensor("weight").unwrap().shape, vec![3]);
//! assert_eq!(st.get_tensor_f32("weight").unwrap(), vec![1.0, 2.0, 3.0]);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod convert;
pub mod dtype;
pub mod error;
mod header;
pub mod json;
pub mod load;
#[cfg(not(target_arch = "wasm32"))]
mod mmap;
pub mod save;
pub mod tensor;

// Re-exports for convenience
pub use convert::{bf16_to_f32, f16_to_f32, f32_to_bf16, f32_to_f16};
pub use dtype::Dtype;
pub use error::{Result, TensoresError};
pub use load::{Mode, SafeTensors, MAX_HEADER_SIZE};
pub use save::SafeTensorsBuilder;
pub use tensor::{TensorInfo, MAX_DIM};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_limits() {
        assert_eq!(MAX_DIM, 8);
        assert_eq!(MAX_HEADER_SIZE, 100 * 1024 * 1024);
    }
}

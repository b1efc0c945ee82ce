//! Safetensors container writing
//!
//! [`SafeTensorsBuilder`] accumulates tensors and metadata, then emits
//! `{u64 header_size}{JSON header}{payload}` with tensors and metadata in
//! insertion order and offsets measured from the start of the payload
//! region. Output from the builder round-trips through the loaders.

use std::path::Path;

use crate::dtype::Dtype;
use crate::error::{Result, TensoresError};
use crate::tensor::{TensorInfo, MAX_DIM};

/// Incrementally builds a safetensors container.
#[derive(Debug, Default)]
pub struct SafeTensorsBuilder {
    tensors: Vec<TensorInfo>,
    metadata: Vec<(String, String)>,
    storage: Vec<u8>,
}

impl SafeTensorsBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a metadata key/value pair.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicate key.
    pub fn add_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        if self.metadata.iter().any(|(k, _)| k == key) {
            return Err(TensoresError::InvalidArgument {
                reason: format!("duplicate metadata key '{key}'"),
            });
        }
        self.metadata.push((key.to_string(), value.to_string()));
        Ok(())
    }

    /// Append a tensor. `data` must be the tensor's raw little-endian bytes
    /// and its length must match the shape and dtype exactly; empty tensors
    /// (any dimension 0) take no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or duplicate name, too many
    /// dimensions, or a data length that does not match the descriptor.
    pub fn add_tensor(
        &mut self,
        name: &str,
        dtype: Dtype,
        shape: &[usize],
        data: &[u8],
    ) -> Result<()> {
        if name.is_empty() {
            return Err(TensoresError::InvalidArgument {
                reason: "empty tensor name".to_string(),
            });
        }
        if self.tensors.iter().any(|t| t.name == name) {
            return Err(TensoresError::DuplicateName {
                name: name.to_string(),
            });
        }
        if shape.len() > MAX_DIM {
            return Err(TensoresError::TooManyDims {
                name: name.to_string(),
                ndim: shape.len(),
                max: MAX_DIM,
            });
        }

        let mut tensor = TensorInfo {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
            data_offsets: [0, 0],
        };

        let byte_size = tensor.byte_size();
        if data.len() != byte_size {
            return Err(TensoresError::InvalidArgument {
                reason: format!(
                    "tensor '{name}': data length {} does not match shape (expected {byte_size})",
                    data.len()
                ),
            });
        }

        if !tensor.is_empty() {
            let begin = self.storage.len();
            self.storage.extend_from_slice(data);
            tensor.data_offsets = [begin, begin + data.len()];
        }
        self.tensors.push(tensor);
        Ok(())
    }

    /// Number of tensors added so far.
    #[must_use]
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    fn header_json(&self) -> String {
        let mut json = String::from("{");
        let mut first = true;

        if !self.metadata.is_empty() {
            json.push_str("\"__metadata__\":{");
            for (i, (key, value)) in self.metadata.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                json.push_str(&escape(key));
                json.push(':');
                json.push_str(&escape(value));
            }
            json.push('}');
            first = false;
        }

        for tensor in &self.tensors {
            if !first {
                json.push(',');
            }
            first = false;

            json.push_str(&escape(&tensor.name));
            json.push_str(":{\"dtype\":");
            json.push_str(&escape(tensor.dtype.name()));
            json.push_str(",\"shape\":[");
            for (i, dim) in tensor.shape.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                json.push_str(&dim.to_string());
            }
            json.push(']');
            if !tensor.is_empty() {
                let [begin, end] = tensor.data_offsets;
                json.push_str(&format!(",\"data_offsets\":[{begin},{end}]"));
            }
            json.push('}');
        }

        json.push('}');
        // Pad with spaces so the payload starts 8-byte aligned (this also
        // keeps the minimal container at the 16-byte floor).
        while (8 + json.len()) % 8 != 0 {
            json.push(' ');
        }
        json
    }

    /// Serialize the container to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.header_json();
        let mut out = Vec::with_capacity(8 + header.len() + self.storage.len());
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.storage);
        out
    }

    /// Serialize the container to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()).map_err(|e| TensoresError::FileWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// JSON string literal with escapes, via serde_json's string encoder.
fn escape(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::SafeTensors;

    #[test]
    fn test_empty_builder_roundtrips() {
        let bytes = SafeTensorsBuilder::new().to_bytes();
        assert!(bytes.len() >= 16);
        assert_eq!(bytes.len() % 8, 0);

        let st = SafeTensors::load_from_memory(&bytes).expect("load");
        assert_eq!(st.tensor_count(), 0);
        assert!(st.metadata().is_empty());
    }

    #[test]
    fn test_single_tensor_roundtrip() {
        let values: Vec<u8> = [1.0f32, 2.0, 3.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let mut builder = SafeTensorsBuilder::new();
        builder
            .add_tensor("w", Dtype::F32, &[3], &values)
            .expect("add");
        let bytes = builder.to_bytes();

        let st = SafeTensors::load_from_memory(&bytes).expect("load");
        st.validate_data_offsets().expect("offsets");
        assert_eq!(st.get_tensor_f32("w").expect("values"), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_offsets_are_payload_relative_and_packed() {
        let mut builder = SafeTensorsBuilder::new();
        builder.add_tensor("a", Dtype::U8, &[4], &[1, 2, 3, 4]).expect("a");
        builder.add_tensor("b", Dtype::U8, &[2], &[5, 6]).expect("b");
        let bytes = builder.to_bytes();

        let st = SafeTensors::load_from_memory(&bytes).expect("load");
        assert_eq!(st.get_tensor("a").expect("a").data_offsets, [0, 4]);
        assert_eq!(st.get_tensor("b").expect("b").data_offsets, [4, 6]);
    }

    #[test]
    fn test_metadata_and_order_preserved() {
        let mut builder = SafeTensorsBuilder::new();
        builder.add_metadata("format", "pt").expect("meta");
        builder.add_metadata("model", "test").expect("meta");
        builder.add_tensor("z", Dtype::U8, &[1], &[0]).expect("z");
        builder.add_tensor("a", Dtype::U8, &[1], &[1]).expect("a");

        let st = SafeTensors::load_from_memory(&builder.to_bytes()).expect("load");
        assert_eq!(st.tensor_names(), ["z", "a"]);
        assert_eq!(
            st.metadata(),
            [
                ("format".to_string(), "pt".to_string()),
                ("model".to_string(), "test".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_tensor_emits_no_offsets() {
        let mut builder = SafeTensorsBuilder::new();
        builder.add_tensor("e", Dtype::F32, &[0, 10], &[]).expect("empty");
        let bytes = builder.to_bytes();

        let st = SafeTensors::load_from_memory(&bytes).expect("load");
        let t = st.get_tensor("e").expect("tensor");
        assert_eq!(t.data_offsets, [0, 0]);
        assert_eq!(t.byte_size(), 0);
    }

    #[test]
    fn test_scalar_tensor() {
        let mut builder = SafeTensorsBuilder::new();
        builder
            .add_tensor("s", Dtype::F32, &[], &2.5f32.to_le_bytes())
            .expect("scalar");
        let st = SafeTensors::load_from_memory(&builder.to_bytes()).expect("load");
        assert_eq!(st.get_tensor_f32("s").expect("value"), vec![2.5]);
    }

    #[test]
    fn test_name_escaping() {
        let mut builder = SafeTensorsBuilder::new();
        builder
            .add_tensor("layer \"0\"\\bias", Dtype::U8, &[1], &[9])
            .expect("escaped name");
        let st = SafeTensors::load_from_memory(&builder.to_bytes()).expect("load");
        assert!(st.has_tensor("layer \"0\"\\bias"));
    }

    #[test]
    fn test_rejects_bad_tensors() {
        let mut builder = SafeTensorsBuilder::new();
        assert!(matches!(
            builder.add_tensor("", Dtype::U8, &[1], &[0]).unwrap_err(),
            TensoresError::InvalidArgument { .. }
        ));
        builder.add_tensor("a", Dtype::U8, &[1], &[0]).expect("a");
        assert!(matches!(
            builder.add_tensor("a", Dtype::U8, &[1], &[0]).unwrap_err(),
            TensoresError::DuplicateName { .. }
        ));
        assert!(matches!(
            builder
                .add_tensor("dims", Dtype::U8, &[1; 9], &[0])
                .unwrap_err(),
            TensoresError::TooManyDims { .. }
        ));
        // Length mismatch: shape [2] of F32 needs 8 bytes
        assert!(matches!(
            builder
                .add_tensor("short", Dtype::F32, &[2], &[0; 4])
                .unwrap_err(),
            TensoresError::InvalidArgument { .. }
        ));
        // Empty tensors must not carry bytes
        assert!(matches!(
            builder
                .add_tensor("e", Dtype::U8, &[0], &[1])
                .unwrap_err(),
            TensoresError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_rejects_duplicate_metadata() {
        let mut builder = SafeTensorsBuilder::new();
        builder.add_metadata("k", "v").expect("first");
        assert!(builder.add_metadata("k", "w").is_err());
    }
}

//! Safetensors container loading
//!
//! A safetensors file is `{u64 header_size}{JSON header}{raw payload}`,
//! little-endian throughout. Loading splits the three regions, runs the
//! JSON reader over the header and the validator over the tree, and records
//! the payload region either as an owned copy or as a zero-copy view
//! (memory map or caller-provided buffer).
//!
//! Offsets are deliberately *not* cross-checked against the payload length
//! at load time; [`SafeTensors::validate_data_offsets`] is a separate pass,
//! so files with corrupt offsets can still be opened for inspection.

use std::collections::HashMap;
use std::path::Path;

use crate::convert::{bf16_to_f32, f16_to_f32};
use crate::dtype::Dtype;
use crate::error::{Result, TensoresError};
use crate::header::{self, ParsedHeader};
use crate::json;
#[cfg(not(target_arch = "wasm32"))]
use crate::mmap::MmapFile;
use crate::tensor::TensorInfo;

/// Hard cap on the JSON header size (bounds parser memory): 100 MiB
pub const MAX_HEADER_SIZE: u64 = 100 * 1024 * 1024;

/// Whether a container owns a heap copy of its payload or holds a read-only
/// view into mapped/caller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The payload was copied into an owned buffer
    Copied,
    /// The payload is a zero-copy view (memory map or borrowed buffer)
    Mapped,
}

#[derive(Debug)]
enum Storage<'a> {
    /// Owned copy of the payload region only
    Owned(Vec<u8>),
    /// Whole-file memory map; the payload starts at `payload_start`
    #[cfg(not(target_arch = "wasm32"))]
    Mapped {
        file: MmapFile,
        payload_start: usize,
    },
    /// Payload view into a caller-provided buffer
    Borrowed(&'a [u8]),
}

/// A loaded safetensors container.
///
/// Immutable after construction: the tensor directory, metadata and payload
/// view never change, so shared references may be handed to any number of
/// readers. All resources (owned buffers, file handle, mapping) are
/// released when the value is dropped.
#[derive(Debug)]
pub struct SafeTensors<'a> {
    header_size: usize,
    tensors: Vec<TensorInfo>,
    index: HashMap<String, usize>,
    metadata: Vec<(String, String)>,
    warnings: Vec<String>,
    storage: Storage<'a>,
}

/// Split the container prefix and run the header through the JSON reader
/// and validator. Returns the header size and the validated directory.
fn parse_container(data: &[u8]) -> Result<(usize, ParsedHeader)> {
    if data.len() < 16 {
        return Err(TensoresError::InvalidArgument {
            reason: format!("data too short ({} bytes, minimum 16)", data.len()),
        });
    }

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&data[0..8]);
    let header_size = u64::from_le_bytes(prefix);

    if header_size < 2 {
        return Err(TensoresError::InvalidHeader {
            reason: format!("header size {header_size} too small"),
        });
    }
    // Checked before any allocation sized by the header.
    if header_size > MAX_HEADER_SIZE {
        return Err(TensoresError::InvalidHeader {
            reason: format!("header size {header_size} exceeds {MAX_HEADER_SIZE} byte limit"),
        });
    }
    if 8 + header_size > data.len() as u64 {
        return Err(TensoresError::InvalidHeader {
            reason: format!(
                "header size {header_size} exceeds data size {}",
                data.len()
            ),
        });
    }

    let header_size = usize::try_from(header_size).map_err(|_| TensoresError::InvalidHeader {
        reason: format!("header size {header_size} exceeds platform limit"),
    })?;

    let root = json::parse(&data[8..8 + header_size])?;
    let parsed = header::collect(&root)?;

    Ok((header_size, parsed))
}

impl SafeTensors<'static> {
    /// Load a safetensors file, copying the payload into owned memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the container is
    /// malformed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TensoresError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                TensoresError::FileRead {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            }
        })?;
        Self::load_from_memory(&data)
    }

    /// Parse a safetensors container from memory, copying the payload into
    /// owned storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is malformed.
    pub fn load_from_memory(data: &[u8]) -> Result<Self> {
        let (header_size, parsed) = parse_container(data)?;
        let payload = data[8 + header_size..].to_vec();
        Ok(Self::assemble(header_size, parsed, Storage::Owned(payload)))
    }

    /// Load a safetensors file with a read-only memory map; tensor data is
    /// never copied.
    ///
    /// The map and the file handle are held until the container is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or the
    /// container is malformed. On targets without memory mapping this
    /// returns [`TensoresError::MmapUnsupported`]; callers fall back to
    /// [`SafeTensors::load_from_file`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn mmap_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = MmapFile::open(path.as_ref())?;
        let (header_size, parsed) = parse_container(file.as_slice())?;
        Ok(Self::assemble(
            header_size,
            parsed,
            Storage::Mapped {
                file,
                payload_start: 8 + header_size,
            },
        ))
    }

    /// Memory mapping is unavailable on this target.
    ///
    /// # Errors
    ///
    /// Always returns [`TensoresError::MmapUnsupported`].
    #[cfg(target_arch = "wasm32")]
    pub fn mmap_from_file(_path: impl AsRef<Path>) -> Result<Self> {
        Err(TensoresError::MmapUnsupported)
    }
}

impl<'a> SafeTensors<'a> {
    /// Parse a safetensors container over caller-owned memory (typically a
    /// mapping the caller manages). The payload is a zero-copy view into
    /// `data`, which must outlive the returned container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is malformed.
    pub fn mmap_from_memory(data: &'a [u8]) -> Result<SafeTensors<'a>> {
        let (header_size, parsed) = parse_container(data)?;
        Ok(Self::assemble(
            header_size,
            parsed,
            Storage::Borrowed(&data[8 + header_size..]),
        ))
    }

    fn assemble(header_size: usize, parsed: ParsedHeader, storage: Storage<'a>) -> SafeTensors<'a> {
        let index = parsed
            .tensors
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        SafeTensors {
            header_size,
            tensors: parsed.tensors,
            index,
            metadata: parsed.metadata,
            warnings: Vec::new(),
            storage,
        }
    }

    /// Size of the JSON header in bytes
    #[must_use]
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Whether the payload is an owned copy or a zero-copy view
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.storage {
            Storage::Owned(_) => Mode::Copied,
            #[cfg(not(target_arch = "wasm32"))]
            Storage::Mapped { .. } => Mode::Mapped,
            Storage::Borrowed(_) => Mode::Mapped,
        }
    }

    /// The raw payload region (everything after the header)
    #[must_use]
    pub fn data_buffer(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data,
            #[cfg(not(target_arch = "wasm32"))]
            Storage::Mapped { file, payload_start } => &file.as_slice()[*payload_start..],
            Storage::Borrowed(data) => data,
        }
    }

    /// Tensor descriptors in header order
    #[must_use]
    pub fn tensors(&self) -> &[TensorInfo] {
        &self.tensors
    }

    /// Number of tensors
    #[must_use]
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Tensor names in header order
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        self.tensors.iter().map(|t| t.name.as_str()).collect()
    }

    /// Look up a tensor by name
    #[must_use]
    pub fn get_tensor(&self, name: &str) -> Option<&TensorInfo> {
        self.index.get(name).map(|&i| &self.tensors[i])
    }

    /// Look up a tensor by position in header order
    #[must_use]
    pub fn get_tensor_by_index(&self, index: usize) -> Option<&TensorInfo> {
        self.tensors.get(index)
    }

    /// Whether a tensor with this name exists
    #[must_use]
    pub fn has_tensor(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Metadata key/value pairs in header order
    #[must_use]
    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// Look up a metadata value by key
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Non-fatal diagnostics collected during loading. Currently always
    /// empty; reserved for reporting tolerated oddities such as unknown
    /// tensor fields.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Raw bytes of a tensor: the payload subrange at its `data_offsets`.
    ///
    /// Returns `None` when the offsets fall outside the payload. Bounds are
    /// not otherwise re-validated here; callers wanting a single up-front
    /// check use [`SafeTensors::validate_data_offsets`].
    #[must_use]
    pub fn tensor_data(&self, tensor: &TensorInfo) -> Option<&[u8]> {
        let [begin, end] = tensor.data_offsets;
        self.data_buffer().get(begin..end)
    }

    /// Check every tensor's offsets against the payload: for each non-empty
    /// tensor, `begin <= end <= payload_len` and `end - begin` must equal
    /// the descriptor's byte size.
    ///
    /// This is deliberately separate from loading so corrupt files can
    /// still be opened and inspected.
    ///
    /// # Errors
    ///
    /// Returns [`TensoresError::InvalidTensor`] for the first violation.
    pub fn validate_data_offsets(&self) -> Result<()> {
        let payload_len = self.data_buffer().len();

        for tensor in &self.tensors {
            let [begin, end] = tensor.data_offsets;
            if begin > end {
                return Err(TensoresError::InvalidTensor {
                    name: tensor.name.clone(),
                    reason: format!("begin offset {begin} > end offset {end}"),
                });
            }

            let byte_size = tensor.byte_size();
            if byte_size == 0 {
                continue;
            }

            if end > payload_len {
                return Err(TensoresError::InvalidTensor {
                    name: tensor.name.clone(),
                    reason: format!(
                        "data offsets [{begin}, {end}] exceed payload size {payload_len}"
                    ),
                });
            }
            let stored = end - begin;
            if stored != byte_size {
                return Err(TensoresError::InvalidTensor {
                    name: tensor.name.clone(),
                    reason: format!("size mismatch (expected {byte_size} bytes, got {stored})"),
                });
            }
        }

        Ok(())
    }

    fn tensor_slice(&self, name: &str) -> Result<(&TensorInfo, &[u8])> {
        let tensor = self.get_tensor(name).ok_or_else(|| TensoresError::KeyNotFound {
            key: name.to_string(),
        })?;
        let data = self
            .tensor_data(tensor)
            .ok_or_else(|| TensoresError::InvalidTensor {
                name: name.to_string(),
                reason: format!(
                    "data offsets [{}, {}] exceed payload size {}",
                    tensor.data_offsets[0],
                    tensor.data_offsets[1],
                    self.data_buffer().len()
                ),
            })?;
        Ok((tensor, data))
    }

    fn expect_dtype(tensor: &TensorInfo, expected: Dtype) -> Result<()> {
        if tensor.dtype == expected {
            Ok(())
        } else {
            Err(TensoresError::DtypeMismatch {
                name: tensor.name.clone(),
                expected: expected.to_string(),
                actual: tensor.dtype.to_string(),
            })
        }
    }

    /// Extract an F32 tensor's values.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is missing, its dtype is not F32, or
    /// its offsets fall outside the payload.
    ///
    /// # Panics
    ///
    /// Never panics: `chunks_exact(4)` guarantees 4-byte chunks.
    pub fn get_tensor_f32(&self, name: &str) -> Result<Vec<f32>> {
        let (tensor, bytes) = self.tensor_slice(name)?;
        Self::expect_dtype(tensor, Dtype::F32)?;

        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| {
                f32::from_le_bytes(chunk.try_into().expect("chunks_exact(4) yields 4 bytes"))
            })
            .collect())
    }

    /// Extract an F16 tensor's values, widened to F32.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is missing, its dtype is not F16, or
    /// its offsets fall outside the payload.
    pub fn get_tensor_f16_as_f32(&self, name: &str) -> Result<Vec<f32>> {
        let (tensor, bytes) = self.tensor_slice(name)?;
        Self::expect_dtype(tensor, Dtype::F16)?;

        Ok(bytes
            .chunks_exact(2)
            .map(|chunk| f16_to_f32(u16::from_le_bytes([chunk[0], chunk[1]])))
            .collect())
    }

    /// Extract a BF16 tensor's values, widened to F32.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is missing, its dtype is not BF16, or
    /// its offsets fall outside the payload.
    pub fn get_tensor_bf16_as_f32(&self, name: &str) -> Result<Vec<f32>> {
        let (tensor, bytes) = self.tensor_slice(name)?;
        Self::expect_dtype(tensor, Dtype::BF16)?;

        Ok(bytes
            .chunks_exact(2)
            .map(|chunk| bf16_to_f32(u16::from_le_bytes([chunk[0], chunk[1]])))
            .collect())
    }

    /// Extract a float tensor as F32, converting F16/BF16 automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is missing, its dtype is not one of
    /// F32/F16/BF16, or its offsets fall outside the payload.
    pub fn get_tensor_auto(&self, name: &str) -> Result<Vec<f32>> {
        let tensor = self.get_tensor(name).ok_or_else(|| TensoresError::KeyNotFound {
            key: name.to_string(),
        })?;

        match tensor.dtype {
            Dtype::F32 => self.get_tensor_f32(name),
            Dtype::F16 => self.get_tensor_f16_as_f32(name),
            Dtype::BF16 => self.get_tensor_bf16_as_f32(name),
            other => Err(TensoresError::DtypeMismatch {
                name: name.to_string(),
                expected: "F32, F16 or BF16".to_string(),
                actual: other.to_string(),
            }),
        }
    }
}

//! Header validation
//!
//! Turns the parsed header JSON into the tensor directory and metadata
//! list, enforcing the format invariants: known dtypes, at most
//! [`MAX_DIM`](crate::tensor::MAX_DIM) dimensions, integral shape and
//! offset values, and `data_offsets` present exactly when the tensor is
//! non-empty. Nothing half-built survives an error; the JSON tree is
//! discarded once validation returns.

use std::collections::HashSet;

use crate::dtype::Dtype;
use crate::error::{Result, TensoresError};
use crate::json::JsonValue;
use crate::tensor::{TensorInfo, MAX_DIM};

/// Validated header contents, in header order.
#[derive(Debug)]
pub(crate) struct ParsedHeader {
    pub(crate) tensors: Vec<TensorInfo>,
    pub(crate) metadata: Vec<(String, String)>,
}

/// Shape dimensions and offsets are JSON numbers (IEEE doubles); only
/// values that round-trip as non-negative integers below 2^53 are accepted.
fn as_index(value: &JsonValue) -> Option<usize> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    let n = value.as_f64()?;
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 || n > MAX_EXACT {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = n as usize;
    Some(index)
}

fn collect_metadata(value: &JsonValue) -> Result<Vec<(String, String)>> {
    let pairs = value
        .as_object()
        .ok_or_else(|| TensoresError::InvalidHeader {
            reason: "__metadata__ must be a JSON object".to_string(),
        })?;

    let mut metadata = Vec::with_capacity(pairs.len());
    for (key, val) in pairs {
        let text = val.as_str().ok_or_else(|| TensoresError::InvalidHeader {
            reason: format!("__metadata__ value for '{key}' must be a string"),
        })?;
        metadata.push((key.clone(), text.to_string()));
    }
    Ok(metadata)
}

fn collect_tensor(name: &str, value: &JsonValue) -> Result<TensorInfo> {
    if name.is_empty() {
        return Err(TensoresError::InvalidHeader {
            reason: "empty tensor name".to_string(),
        });
    }
    if value.as_object().is_none() {
        return Err(TensoresError::InvalidHeader {
            reason: format!("tensor '{name}' is not a JSON object"),
        });
    }

    let dtype_str = value
        .get("dtype")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| TensoresError::MissingField {
            name: name.to_string(),
            field: "dtype".to_string(),
        })?;
    let dtype = Dtype::parse(dtype_str).ok_or_else(|| TensoresError::UnknownDtype {
        name: name.to_string(),
        dtype: dtype_str.to_string(),
    })?;

    let shape_val = value
        .get("shape")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| TensoresError::MissingField {
            name: name.to_string(),
            field: "shape".to_string(),
        })?;
    if shape_val.len() > MAX_DIM {
        return Err(TensoresError::TooManyDims {
            name: name.to_string(),
            ndim: shape_val.len(),
            max: MAX_DIM,
        });
    }
    let mut shape = Vec::with_capacity(shape_val.len());
    for dim in shape_val {
        let d = as_index(dim).ok_or_else(|| TensoresError::InvalidHeader {
            reason: format!("tensor '{name}': invalid shape dimension"),
        })?;
        shape.push(d);
    }
    let is_empty = shape.contains(&0);

    // data_offsets is required for non-empty tensors and forbidden for
    // empty ones.
    let data_offsets = match (value.get("data_offsets"), is_empty) {
        (Some(_), true) => {
            return Err(TensoresError::BadOffsets {
                name: name.to_string(),
                reason: "empty tensor must not have data_offsets".to_string(),
            });
        }
        (None, true) => [0, 0],
        (None, false) => {
            return Err(TensoresError::MissingField {
                name: name.to_string(),
                field: "data_offsets".to_string(),
            });
        }
        (Some(offsets_val), false) => {
            let items = offsets_val.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
                TensoresError::BadOffsets {
                    name: name.to_string(),
                    reason: "expected [begin, end]".to_string(),
                }
            })?;
            let begin = as_index(&items[0]).ok_or_else(|| TensoresError::BadOffsets {
                name: name.to_string(),
                reason: "begin is not a non-negative integer".to_string(),
            })?;
            let end = as_index(&items[1]).ok_or_else(|| TensoresError::BadOffsets {
                name: name.to_string(),
                reason: "end is not a non-negative integer".to_string(),
            })?;
            if begin > end {
                return Err(TensoresError::BadOffsets {
                    name: name.to_string(),
                    reason: format!("begin offset {begin} > end offset {end}"),
                });
            }
            [begin, end]
        }
    };

    // Unrecognized fields on the tensor object are ignored.

    Ok(TensorInfo {
        name: name.to_string(),
        dtype,
        shape,
        data_offsets,
    })
}

/// Walk the parsed header tree into the tensor directory plus metadata,
/// both in header order.
pub(crate) fn collect(root: &JsonValue) -> Result<ParsedHeader> {
    let pairs = root.as_object().ok_or_else(|| TensoresError::InvalidHeader {
        reason: "root JSON must be an object".to_string(),
    })?;

    let mut tensors = Vec::new();
    let mut metadata = Vec::new();
    // The reader already rejects duplicate keys; assert anyway.
    let mut seen: HashSet<&str> = HashSet::new();

    for (key, value) in pairs {
        if key == "__metadata__" {
            metadata = collect_metadata(value)?;
        } else {
            if !seen.insert(key.as_str()) {
                return Err(TensoresError::DuplicateName { name: key.clone() });
            }
            tensors.push(collect_tensor(key, value)?);
        }
    }

    Ok(ParsedHeader { tensors, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json;

    fn collect_str(text: &str) -> Result<ParsedHeader> {
        collect(&json::parse(text.as_bytes()).expect("test header parses"))
    }

    #[test]
    fn test_single_tensor() {
        let parsed =
            collect_str(r#"{"w":{"dtype":"F32","shape":[2,3],"data_offsets":[0,24]}}"#)
                .expect("valid header");
        assert_eq!(parsed.tensors.len(), 1);
        let t = &parsed.tensors[0];
        assert_eq!(t.name, "w");
        assert_eq!(t.dtype, Dtype::F32);
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.data_offsets, [0, 24]);
    }

    #[test]
    fn test_order_follows_header() {
        let parsed = collect_str(
            r#"{"z":{"dtype":"U8","shape":[1],"data_offsets":[0,1]},
                "a":{"dtype":"U8","shape":[1],"data_offsets":[1,2]}}"#,
        )
        .expect("valid header");
        let names: Vec<&str> = parsed.tensors.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["z", "a"]);
    }

    #[test]
    fn test_metadata_collected_in_order() {
        let parsed = collect_str(
            r#"{"__metadata__":{"format":"pt","model":"test"},
                "w":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#,
        )
        .expect("valid header");
        assert_eq!(
            parsed.metadata,
            vec![
                ("format".to_string(), "pt".to_string()),
                ("model".to_string(), "test".to_string()),
            ]
        );
        assert_eq!(parsed.tensors.len(), 1);
    }

    #[test]
    fn test_rejects_non_object_root() {
        assert!(matches!(
            collect_str("[1,2]").unwrap_err(),
            TensoresError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn test_rejects_non_string_metadata_value() {
        let err = collect_str(r#"{"__metadata__":{"epoch":3}}"#).unwrap_err();
        assert!(matches!(err, TensoresError::InvalidHeader { .. }));
    }

    #[test]
    fn test_rejects_non_object_metadata() {
        let err = collect_str(r#"{"__metadata__":"pt"}"#).unwrap_err();
        assert!(matches!(err, TensoresError::InvalidHeader { .. }));
    }

    #[test]
    fn test_missing_fields() {
        let err = collect_str(r#"{"w":{"shape":[1],"data_offsets":[0,4]}}"#).unwrap_err();
        assert_eq!(
            err,
            TensoresError::MissingField {
                name: "w".to_string(),
                field: "dtype".to_string(),
            }
        );

        let err = collect_str(r#"{"w":{"dtype":"F32","data_offsets":[0,4]}}"#).unwrap_err();
        assert_eq!(
            err,
            TensoresError::MissingField {
                name: "w".to_string(),
                field: "shape".to_string(),
            }
        );

        let err = collect_str(r#"{"w":{"dtype":"F32","shape":[1]}}"#).unwrap_err();
        assert_eq!(
            err,
            TensoresError::MissingField {
                name: "w".to_string(),
                field: "data_offsets".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_unknown_dtype() {
        let err =
            collect_str(r#"{"w":{"dtype":"F128","shape":[1],"data_offsets":[0,4]}}"#).unwrap_err();
        assert_eq!(
            err,
            TensoresError::UnknownDtype {
                name: "w".to_string(),
                dtype: "F128".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_too_many_dims() {
        let err = collect_str(
            r#"{"w":{"dtype":"U8","shape":[1,1,1,1,1,1,1,1,1],"data_offsets":[0,1]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TensoresError::TooManyDims { ndim: 9, .. }));
    }

    #[test]
    fn test_eight_dims_allowed() {
        let parsed = collect_str(
            r#"{"w":{"dtype":"U8","shape":[1,1,1,1,1,1,1,1],"data_offsets":[0,1]}}"#,
        )
        .expect("8 dims is the limit");
        assert_eq!(parsed.tensors[0].ndim(), 8);
    }

    #[test]
    fn test_rejects_non_integral_shape() {
        for shape in ["[1.5]", "[-1]", "[1e300]", "[\"2\"]", "[null]"] {
            let header =
                format!(r#"{{"w":{{"dtype":"U8","shape":{shape},"data_offsets":[0,1]}}}}"#);
            assert!(collect_str(&header).is_err(), "shape {shape}");
        }
    }

    #[test]
    fn test_shape_at_integer_precision_limit() {
        // 2^53 is exact and accepted; fractional or negative values are not
        let parsed = collect_str(
            r#"{"w":{"dtype":"U8","shape":[9007199254740992],"data_offsets":[0,1]}}"#,
        )
        .expect("2^53 is representable");
        assert_eq!(parsed.tensors[0].shape, vec![9_007_199_254_740_992]);
    }

    #[test]
    fn test_empty_tensor_offsets_rules() {
        // No offsets: defaults to [0, 0]
        let parsed = collect_str(r#"{"e":{"dtype":"F32","shape":[0,10]}}"#).expect("empty tensor");
        assert_eq!(parsed.tensors[0].data_offsets, [0, 0]);

        // Offsets on an empty tensor are rejected
        let err = collect_str(r#"{"e":{"dtype":"F32","shape":[0,10],"data_offsets":[0,0]}}"#)
            .unwrap_err();
        assert!(matches!(err, TensoresError::BadOffsets { .. }));
    }

    #[test]
    fn test_rejects_malformed_offsets() {
        for offsets in ["[0]", "[0,1,2]", "[]", "[0,\"x\"]", "7", "[-1,4]"] {
            let header = format!(
                r#"{{"w":{{"dtype":"F32","shape":[1],"data_offsets":{offsets}}}}}"#
            );
            assert!(
                matches!(
                    collect_str(&header).unwrap_err(),
                    TensoresError::BadOffsets { .. }
                ),
                "offsets {offsets}"
            );
        }
    }

    #[test]
    fn test_rejects_begin_after_end() {
        let err =
            collect_str(r#"{"w":{"dtype":"F32","shape":[1],"data_offsets":[8,4]}}"#).unwrap_err();
        assert!(matches!(err, TensoresError::BadOffsets { .. }));
    }

    #[test]
    fn test_unknown_tensor_fields_ignored() {
        let parsed = collect_str(
            r#"{"w":{"dtype":"F32","shape":[1],"data_offsets":[0,4],"layout":"row"}}"#,
        )
        .expect("unknown fields are tolerated");
        assert_eq!(parsed.tensors.len(), 1);
    }

    #[test]
    fn test_rejects_empty_tensor_name() {
        let err = collect_str(r#"{"":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#)
            .unwrap_err();
        assert!(matches!(err, TensoresError::InvalidHeader { .. }));
    }

    #[test]
    fn test_scalar_shape() {
        let parsed = collect_str(r#"{"s":{"dtype":"F32","shape":[],"data_offsets":[0,4]}}"#)
            .expect("scalar");
        assert_eq!(parsed.tensors[0].ndim(), 0);
        assert_eq!(parsed.tensors[0].element_count(), 1);
    }
}

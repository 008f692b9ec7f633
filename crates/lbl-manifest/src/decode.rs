use serde_json::Value;
use thiserror::Error;

use crate::class_index::ClassIndex;
use crate::encode::{ClassMetadata, IndexMetadata};
use crate::schema::{SchemaVariant, SOURCE_REF};

/// What every schema variant carries: where the image is and what class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRef {
    pub source_ref: String,
    pub class_name: String,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: invalid json: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: record is not a json object")]
    NotAnObject { line: usize },
    #[error("line {line}: missing or mistyped field {field:?}")]
    Field { line: usize, field: String },
    #[error("line {line}: label index {index} disagrees with class-name {class_name:?}")]
    IndexMismatch {
        line: usize,
        index: u64,
        class_name: String,
    },
}

/// Decodes one parsed record. `line` is only used for error messages.
pub fn decode_record(
    value: &Value,
    variant: &SchemaVariant,
    class_index: Option<&ClassIndex>,
    line: usize,
) -> Result<LabeledRef, DecodeError> {
    let obj = value
        .as_object()
        .ok_or(DecodeError::NotAnObject { line })?;
    let field_err = |field: &str| DecodeError::Field {
        line,
        field: field.to_string(),
    };

    let source_ref = obj
        .get(SOURCE_REF)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| field_err(SOURCE_REF))?
        .to_string();

    let attr = variant.label_attribute();
    let meta_attr = variant.metadata_attribute();

    let class_name = match variant {
        SchemaVariant::Classification { .. } | SchemaVariant::ClassWithDate => {
            let class = obj
                .get(attr)
                .and_then(Value::as_str)
                .ok_or_else(|| field_err(attr))?;
            // Metadata is optional on input; when present it must be well-formed.
            if let Some(meta) = obj.get(&meta_attr) {
                serde_json::from_value::<ClassMetadata>(meta.clone())
                    .map_err(|_| field_err(&meta_attr))?;
            }
            class.to_string()
        }
        SchemaVariant::IndexLabeled => {
            let index = obj
                .get(attr)
                .and_then(Value::as_u64)
                .ok_or_else(|| field_err(attr))?;
            let meta_name = match obj.get(&meta_attr) {
                Some(meta) => Some(
                    serde_json::from_value::<IndexMetadata>(meta.clone())
                        .map_err(|_| field_err(&meta_attr))?
                        .class_name,
                ),
                None => None,
            };
            let index_name = class_index
                .and_then(|ci| u32::try_from(index).ok().and_then(|i| ci.name_of(i)))
                .map(str::to_string);
            match (meta_name, index_name) {
                (Some(m), Some(i)) if m != i => {
                    return Err(DecodeError::IndexMismatch {
                        line,
                        index,
                        class_name: m,
                    })
                }
                (Some(m), _) => m,
                (None, Some(i)) => i,
                (None, None) => return Err(field_err(&format!("{meta_attr}.class-name"))),
            }
        }
    };

    Ok(LabeledRef {
        source_ref,
        class_name,
    })
}

pub fn decode_line(
    text: &str,
    variant: &SchemaVariant,
    class_index: Option<&ClassIndex>,
    line: usize,
) -> Result<LabeledRef, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|source| DecodeError::Json { line, source })?;
    decode_record(&value, variant, class_index, line)
}

/// Decodes a whole manifest. Blank lines are skipped; line numbers in errors are 1-based.
pub fn decode_manifest(
    text: &str,
    variant: &SchemaVariant,
    class_index: Option<&ClassIndex>,
) -> Result<Vec<LabeledRef>, DecodeError> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| decode_line(l, variant, class_index, i + 1))
        .collect()
}

use std::fmt;

use thiserror::Error;

pub const SOURCE_REF: &str = "source-ref";
pub const CLASS_ATTRIBUTE: &str = "class";
pub const IMAGE_LABEL_ATTRIBUTE: &str = "image-label";
pub const GROUNDTRUTH_TYPE: &str = "groundtruth/image-classification";

/// The manifest record shape to emit or expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaVariant {
    /// `{source-ref, <attr>: class, <attr>-metadata: {confidence, job-name, class-name, human-annotated}}`
    /// with a floating-point confidence.
    Classification { label_attribute: String },
    /// `{source-ref, class: class, class-metadata: {confidence, job-name, class-name,
    /// human-annotated, creation-date}}` with an integer confidence.
    ClassWithDate,
    /// `{source-ref, image-label: index, image-label-metadata: {class-name, confidence, type,
    /// job-name}}`. Needs a class index.
    IndexLabeled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaParseError {
    #[error("unknown schema {0:?} (expected: classification|class|index)")]
    Unknown(String),
    #[error("invalid label attribute {0:?}")]
    InvalidLabelAttribute(String),
}

impl SchemaVariant {
    /// Parses a schema name. `label_attribute` only applies to `classification` and defaults to
    /// `class` there.
    pub fn parse(name: &str, label_attribute: Option<&str>) -> Result<Self, SchemaParseError> {
        let s = name.trim().to_ascii_lowercase();
        let variant = match s.as_str() {
            "classification" | "1" => {
                let attr = label_attribute.unwrap_or(CLASS_ATTRIBUTE).trim();
                if attr.is_empty() || attr == SOURCE_REF || attr.ends_with("-metadata") {
                    return Err(SchemaParseError::InvalidLabelAttribute(attr.to_string()));
                }
                SchemaVariant::Classification {
                    label_attribute: attr.to_string(),
                }
            }
            "class" | "class-with-date" | "2" => SchemaVariant::ClassWithDate,
            "index" | "index-labeled" | "3" => SchemaVariant::IndexLabeled,
            _ => return Err(SchemaParseError::Unknown(name.to_string())),
        };
        Ok(variant)
    }

    /// Top-level key holding the class (or class index).
    pub fn label_attribute(&self) -> &str {
        match self {
            SchemaVariant::Classification { label_attribute } => label_attribute,
            SchemaVariant::ClassWithDate => CLASS_ATTRIBUTE,
            SchemaVariant::IndexLabeled => IMAGE_LABEL_ATTRIBUTE,
        }
    }

    pub fn metadata_attribute(&self) -> String {
        format!("{}-metadata", self.label_attribute())
    }

    pub fn needs_class_index(&self) -> bool {
        matches!(self, SchemaVariant::IndexLabeled)
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVariant::Classification { label_attribute } => {
                write!(f, "classification({label_attribute})")
            }
            SchemaVariant::ClassWithDate => write!(f, "class"),
            SchemaVariant::IndexLabeled => write!(f, "index"),
        }
    }
}

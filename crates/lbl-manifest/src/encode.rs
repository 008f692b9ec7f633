use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::class_index::ClassIndex;
use crate::schema::{SchemaVariant, GROUNDTRUTH_TYPE, SOURCE_REF};

/// Job-level constants stamped onto every record of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobMetadata {
    pub job_name: String,
    pub confidence: f64,
    pub human_annotated: bool,
    /// Only emitted by [`SchemaVariant::ClassWithDate`].
    pub creation_date: String,
}

impl JobMetadata {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            confidence: 1.0,
            human_annotated: true,
            creation_date: creation_date_now(),
        }
    }
}

/// Current UTC time in the labeling service's format, e.g. `2024-05-01T12:00:00.123456`.
pub fn creation_date_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    #[error("class {0:?} is not in the class index")]
    UnmappedClass(String),
    #[error("schema {0} requires a class index")]
    MissingClassIndex(SchemaVariant),
    #[error("source-ref must be non-empty")]
    EmptySourceRef,
    #[error("confidence {0} is not a finite number")]
    InvalidConfidence(f64),
    #[error("serialize record metadata: {0}")]
    Serialize(String),
}

/// One manifest line. Key order is the order the labeling service writes them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestRecord(Map<String, Value>);

impl ManifestRecord {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn source_ref(&self) -> Option<&str> {
        self.0.get(SOURCE_REF).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ClassMetadata {
    pub confidence: Number,
    pub job_name: String,
    pub class_name: String,
    pub human_annotated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct IndexMetadata {
    pub class_name: String,
    pub confidence: Number,
    #[serde(rename = "type")]
    pub kind: String,
    pub job_name: String,
}

/// Pure `(source-ref, class) -> record` function for one schema variant.
#[derive(Debug, Clone)]
pub struct Encoder {
    variant: SchemaVariant,
    meta: JobMetadata,
    class_index: Option<ClassIndex>,
}

impl Encoder {
    /// Fails when the variant needs a class index and none is given, or the confidence is not
    /// finite.
    pub fn new(
        variant: SchemaVariant,
        meta: JobMetadata,
        class_index: Option<ClassIndex>,
    ) -> Result<Self, EncodeError> {
        if variant.needs_class_index() && class_index.is_none() {
            return Err(EncodeError::MissingClassIndex(variant));
        }
        if !meta.confidence.is_finite() {
            return Err(EncodeError::InvalidConfidence(meta.confidence));
        }
        Ok(Self {
            variant,
            meta,
            class_index,
        })
    }

    pub fn variant(&self) -> &SchemaVariant {
        &self.variant
    }

    pub fn class_index(&self) -> Option<&ClassIndex> {
        self.class_index.as_ref()
    }

    pub fn encode(&self, source_ref: &str, class_label: &str) -> Result<ManifestRecord, EncodeError> {
        if source_ref.trim().is_empty() {
            return Err(EncodeError::EmptySourceRef);
        }

        let attr = self.variant.label_attribute().to_string();
        let mut map = Map::new();
        map.insert(SOURCE_REF.to_string(), Value::String(source_ref.to_string()));

        let metadata = match &self.variant {
            SchemaVariant::Classification { .. } => {
                map.insert(attr, Value::String(class_label.to_string()));
                to_value(&ClassMetadata {
                    confidence: self.float_confidence()?,
                    job_name: self.meta.job_name.clone(),
                    class_name: class_label.to_string(),
                    human_annotated: self.human_annotated(),
                    creation_date: None,
                })?
            }
            SchemaVariant::ClassWithDate => {
                map.insert(attr, Value::String(class_label.to_string()));
                to_value(&ClassMetadata {
                    confidence: self.int_confidence(),
                    job_name: self.meta.job_name.clone(),
                    class_name: class_label.to_string(),
                    human_annotated: self.human_annotated(),
                    creation_date: Some(self.meta.creation_date.clone()),
                })?
            }
            SchemaVariant::IndexLabeled => {
                let index = self
                    .class_index
                    .as_ref()
                    .ok_or_else(|| EncodeError::MissingClassIndex(self.variant.clone()))?
                    .index_of(class_label)
                    .ok_or_else(|| EncodeError::UnmappedClass(class_label.to_string()))?;
                map.insert(attr, Value::Number(Number::from(index)));
                to_value(&IndexMetadata {
                    class_name: class_label.to_string(),
                    confidence: self.int_confidence(),
                    kind: GROUNDTRUTH_TYPE.to_string(),
                    job_name: self.meta.job_name.clone(),
                })?
            }
        };
        map.insert(self.variant.metadata_attribute(), metadata);
        Ok(ManifestRecord(map))
    }

    fn float_confidence(&self) -> Result<Number, EncodeError> {
        Number::from_f64(self.meta.confidence)
            .ok_or(EncodeError::InvalidConfidence(self.meta.confidence))
    }

    // Integer-confidence schemas round to the nearest whole number.
    fn int_confidence(&self) -> Number {
        Number::from(self.meta.confidence.round() as i64)
    }

    fn human_annotated(&self) -> String {
        let s = if self.meta.human_annotated { "yes" } else { "no" };
        s.to_string()
    }
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, EncodeError> {
    serde_json::to_value(v).map_err(|e| EncodeError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> JobMetadata {
        JobMetadata {
            job_name: "car-damage".to_string(),
            confidence: 0.95,
            human_annotated: true,
            creation_date: "2024-05-01T12:00:00.000000".to_string(),
        }
    }

    #[test]
    fn classification_uses_custom_attribute_and_float_confidence() {
        let enc = Encoder::new(
            SchemaVariant::Classification {
                label_attribute: "damage".to_string(),
            },
            meta(),
            None,
        )
        .unwrap();
        let rec = enc.encode("s3://b/cars/car1.jpg", "scratch").unwrap();
        assert_eq!(
            rec.into_value(),
            json!({
                "source-ref": "s3://b/cars/car1.jpg",
                "damage": "scratch",
                "damage-metadata": {
                    "confidence": 0.95,
                    "job-name": "car-damage",
                    "class-name": "scratch",
                    "human-annotated": "yes"
                }
            })
        );
    }

    #[test]
    fn class_with_date_emits_integer_confidence_and_date() {
        let enc = Encoder::new(SchemaVariant::ClassWithDate, meta(), None).unwrap();
        let rec = enc.encode("s3://b/cars/car2.png", "dent").unwrap();
        let v = rec.into_value();
        assert_eq!(v["class"], json!("dent"));
        assert_eq!(v["class-metadata"]["confidence"], json!(1));
        assert_eq!(
            v["class-metadata"]["creation-date"],
            json!("2024-05-01T12:00:00.000000")
        );
    }

    #[test]
    fn index_labeled_maps_class_to_index() {
        let idx = ClassIndex::from_names(["dent", "scratch"]).unwrap();
        let enc = Encoder::new(SchemaVariant::IndexLabeled, meta(), Some(idx)).unwrap();
        let rec = enc.encode("s3://b/cars/car1.jpg", "scratch").unwrap();
        assert_eq!(
            rec.into_value(),
            json!({
                "source-ref": "s3://b/cars/car1.jpg",
                "image-label": 1,
                "image-label-metadata": {
                    "class-name": "scratch",
                    "confidence": 1,
                    "type": "groundtruth/image-classification",
                    "job-name": "car-damage"
                }
            })
        );
    }

    #[test]
    fn index_labeled_rejects_unmapped_class() {
        let idx = ClassIndex::from_names(["dent"]).unwrap();
        let enc = Encoder::new(SchemaVariant::IndexLabeled, meta(), Some(idx)).unwrap();
        assert_eq!(
            enc.encode("s3://b/cars/car1.jpg", "scratch"),
            Err(EncodeError::UnmappedClass("scratch".to_string()))
        );
    }

    #[test]
    fn index_labeled_requires_index_up_front() {
        assert!(matches!(
            Encoder::new(SchemaVariant::IndexLabeled, meta(), None),
            Err(EncodeError::MissingClassIndex(_))
        ));
    }

    #[test]
    fn source_ref_is_first_key() {
        let enc = Encoder::new(SchemaVariant::ClassWithDate, meta(), None).unwrap();
        let rec = enc.encode("s3://b/k.jpg", "dent").unwrap();
        let first = rec.as_map().keys().next().cloned();
        assert_eq!(first.as_deref(), Some("source-ref"));
    }

    #[test]
    fn human_annotated_no() {
        let mut m = meta();
        m.human_annotated = false;
        let enc = Encoder::new(SchemaVariant::ClassWithDate, m, None).unwrap();
        let v = enc.encode("s3://b/k.jpg", "dent").unwrap().into_value();
        assert_eq!(v["class-metadata"]["human-annotated"], json!("no"));
    }
}

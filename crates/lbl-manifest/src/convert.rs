use thiserror::Error;

use crate::class_index::ClassIndex;
use crate::decode::{decode_manifest, DecodeError};
use crate::encode::{EncodeError, Encoder, ManifestRecord};
use crate::schema::SchemaVariant;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("record {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: EncodeError,
    },
}

/// Re-encodes every record of `text` (read as `from`) with `encoder`.
///
/// Record order is preserved.
pub fn convert_manifest(
    text: &str,
    from: &SchemaVariant,
    from_index: Option<&ClassIndex>,
    encoder: &Encoder,
) -> Result<Vec<ManifestRecord>, ConvertError> {
    decode_manifest(text, from, from_index)?
        .into_iter()
        .enumerate()
        .map(|(index, r)| {
            encoder
                .encode(&r.source_ref, &r.class_name)
                .map_err(|source| ConvertError::Encode { index, source })
        })
        .collect()
}

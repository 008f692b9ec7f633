use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Stable class-name to integer-index mapping for the index-labeled schema.
///
/// Indices are dense and start at 0. On disk this is a `labels.tsv`:
///
/// ```text
/// schema_version=1
/// 0<TAB>dent
/// 1<TAB>scratch
/// ```
///
/// Labels are percent-encoded so tabs and newlines inside a class name survive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassIndex {
    names: Vec<String>,
    by_name: BTreeMap<String, u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassIndexError {
    #[error("empty labels.tsv")]
    Empty,
    #[error("labels header must be schema_version=<n>")]
    MissingHeader,
    #[error("unsupported labels schema_version {0}")]
    UnsupportedSchemaVersion(u32),
    #[error("labels line {0}: expected id<TAB>label")]
    BadLine(usize),
    #[error("labels line {0}: bad percent-encoding")]
    BadPercentEncoding(usize),
    #[error("duplicate label_id {0}")]
    DuplicateId(u32),
    #[error("missing label_id {0}")]
    MissingId(u32),
    #[error("duplicate class name {0:?}")]
    DuplicateName(String),
    #[error("class names must be non-empty")]
    EmptyName,
    #[error("labels.tsv is not utf-8")]
    NotUtf8,
}

impl ClassIndex {
    /// Index = position in `names`.
    pub fn from_names<I, S>(names: I) -> Result<Self, ClassIndexError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = ClassIndex::default();
        for name in names {
            let name: String = name.into();
            if name.trim().is_empty() {
                return Err(ClassIndexError::EmptyName);
            }
            if out.by_name.contains_key(&name) {
                return Err(ClassIndexError::DuplicateName(name));
            }
            out.by_name.insert(name.clone(), out.names.len() as u32);
            out.names.push(name);
        }
        Ok(out)
    }

    /// Distinct labels in sorted order. The same label set always yields the same index.
    pub fn from_labels_sorted<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = labels
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.trim().is_empty())
            .collect();
        let mut out = ClassIndex::default();
        for (i, name) in set.into_iter().enumerate() {
            out.by_name.insert(name.clone(), i as u32);
            out.names.push(name);
        }
        out
    }

    pub fn parse_labels_tsv(bytes: &[u8]) -> Result<Self, ClassIndexError> {
        let s = std::str::from_utf8(bytes).map_err(|_| ClassIndexError::NotUtf8)?;
        let mut lines = s.lines().enumerate();
        let (_, first) = lines
            .by_ref()
            .find(|(_, l)| !l.trim().is_empty())
            .ok_or(ClassIndexError::Empty)?;

        let (k, v) = first
            .split_once('=')
            .ok_or(ClassIndexError::MissingHeader)?;
        if k.trim() != "schema_version" {
            return Err(ClassIndexError::MissingHeader);
        }
        let schema_version: u32 = v.trim().parse().map_err(|_| ClassIndexError::MissingHeader)?;
        if schema_version != 1 {
            return Err(ClassIndexError::UnsupportedSchemaVersion(schema_version));
        }

        let mut items: Vec<(u32, String)> = Vec::new();
        for (idx, raw) in lines {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (id_s, label_enc) = line
                .split_once('\t')
                .ok_or(ClassIndexError::BadLine(line_no))?;
            let id: u32 = id_s
                .trim()
                .parse()
                .map_err(|_| ClassIndexError::BadLine(line_no))?;
            let label = percent_decode(label_enc.trim())
                .ok_or(ClassIndexError::BadPercentEncoding(line_no))?;
            items.push((id, label));
        }

        items.sort_by_key(|(id, _)| *id);
        // Dense ids: after sorting, the id at position `i` must be `i`.
        let mut names: Vec<String> = Vec::with_capacity(items.len());
        for (pos, (id, label)) in items.into_iter().enumerate() {
            let expected = pos as u32;
            if id < expected {
                return Err(ClassIndexError::DuplicateId(id));
            }
            if id > expected {
                return Err(ClassIndexError::MissingId(expected));
            }
            names.push(label);
        }
        Self::from_names(names)
    }

    pub fn to_labels_tsv(&self) -> String {
        let mut out = String::with_capacity(16 + self.names.len() * 16);
        out.push_str("schema_version=1\n");
        for (id, label) in self.names.iter().enumerate() {
            out.push_str(&id.to_string());
            out.push('\t');
            out.push_str(&percent_encode(label));
            out.push('\n');
        }
        out
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b' ' => {
                out.push(*b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let v = std::str::from_utf8(hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())?;
            out.push(v);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_names_uses_position() {
        let idx = ClassIndex::from_names(["scratch", "dent", "crack"]).unwrap();
        assert_eq!(idx.index_of("scratch"), Some(0));
        assert_eq!(idx.index_of("crack"), Some(2));
        assert_eq!(idx.name_of(1), Some("dent"));
        assert_eq!(idx.index_of("glass"), None);
    }

    #[test]
    fn from_names_rejects_duplicates() {
        assert_eq!(
            ClassIndex::from_names(["a", "b", "a"]),
            Err(ClassIndexError::DuplicateName("a".to_string()))
        );
    }

    #[test]
    fn sorted_index_is_stable_across_input_order() {
        let a = ClassIndex::from_labels_sorted(["scratch", "dent", "scratch"]);
        let b = ClassIndex::from_labels_sorted(["dent", "scratch"]);
        assert_eq!(a, b);
        assert_eq!(a.names(), &["dent".to_string(), "scratch".to_string()]);
    }

    #[test]
    fn labels_tsv_survives_awkward_names() {
        let idx = ClassIndex::from_names(["front bumper", "tab\there", "ünïcode"]).unwrap();
        let parsed = ClassIndex::parse_labels_tsv(idx.to_labels_tsv().as_bytes()).unwrap();
        assert_eq!(parsed, idx);
    }

    #[test]
    fn labels_tsv_requires_dense_ids() {
        let err = ClassIndex::parse_labels_tsv(b"schema_version=1\n0\ta\n2\tc\n").unwrap_err();
        assert_eq!(err, ClassIndexError::MissingId(1));
        let err = ClassIndex::parse_labels_tsv(b"schema_version=1\n0\ta\n0\tb\n").unwrap_err();
        assert_eq!(err, ClassIndexError::DuplicateId(0));
    }

    #[test]
    fn labels_tsv_huge_id_is_rejected_not_allocated() {
        assert_eq!(
            ClassIndex::parse_labels_tsv(b"schema_version=1\n4294967295\tx\n"),
            Err(ClassIndexError::MissingId(0))
        );
        assert_eq!(
            ClassIndex::parse_labels_tsv(b"schema_version=1\n0\ta\n4000000000\tb\n"),
            Err(ClassIndexError::MissingId(1))
        );
    }

    #[test]
    fn labels_tsv_header_is_checked() {
        assert_eq!(
            ClassIndex::parse_labels_tsv(b"0\ta\n"),
            Err(ClassIndexError::MissingHeader)
        );
        assert_eq!(
            ClassIndex::parse_labels_tsv(b"schema_version=2\n"),
            Err(ClassIndexError::UnsupportedSchemaVersion(2))
        );
        assert_eq!(ClassIndex::parse_labels_tsv(b"  \n"), Err(ClassIndexError::Empty));
    }
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use lbl_core::{join_key, LabelRow, MatchedImage};

pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Somewhere images can be looked up by file name.
pub trait ImageCorpus: Send + Sync {
    /// Location of `file_name` if the corpus holds it: a local path or an object key.
    fn resolve(&self, file_name: &str) -> Option<String>;
}

/// Images in a local directory (not recursive).
#[derive(Debug, Clone)]
pub struct DirCorpus {
    root: PathBuf,
}

impl DirCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageCorpus for DirCorpus {
    fn resolve(&self, file_name: &str) -> Option<String> {
        let p = self.root.join(file_name);
        if !p.is_file() {
            return None;
        }
        p.into_os_string().into_string().ok()
    }
}

/// Objects already in remote storage, directly under `prefix`.
#[derive(Debug, Clone, Default)]
pub struct NameSetCorpus {
    prefix: String,
    names: BTreeSet<String>,
}

impl NameSetCorpus {
    /// Keeps only keys that sit directly under `prefix` (no deeper `/`).
    pub fn from_keys<I>(prefix: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let p = prefix.trim_matches('/');
        let names = keys
            .into_iter()
            .filter_map(|k| {
                let rest = if p.is_empty() {
                    k.as_str()
                } else {
                    k.strip_prefix(p)?.strip_prefix('/')?
                };
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Self {
            prefix: p.to_string(),
            names,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ImageCorpus for NameSetCorpus {
    fn resolve(&self, file_name: &str) -> Option<String> {
        self.names
            .contains(file_name)
            .then(|| join_key(&self.prefix, file_name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub matched: Vec<MatchedImage>,
    pub unmatched: Vec<LabelRow>,
}

/// Resolves label rows to image files by probing an ordered list of extensions.
#[derive(Debug, Clone)]
pub struct ImageMatcher {
    extensions: Vec<String>,
}

impl Default for ImageMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl ImageMatcher {
    /// Extensions are tried in the given order; a missing leading `.` is added.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|e| {
                let e = e.as_ref().trim();
                if e.is_empty() || e == "." {
                    None
                } else if e.starts_with('.') {
                    Some(e.to_string())
                } else {
                    Some(format!(".{e}"))
                }
            })
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// First candidate the corpus holds wins. `None` means unmatched, which is not an error.
    pub fn match_row(&self, row: &LabelRow, corpus: &dyn ImageCorpus) -> Option<MatchedImage> {
        let stem = identifier_stem(&row.image_identifier);
        if stem.is_empty() {
            return None;
        }
        self.extensions.iter().find_map(|ext| {
            let file_name = format!("{stem}{ext}");
            corpus.resolve(&file_name).map(|resolved_path| MatchedImage {
                row: row.clone(),
                resolved_path,
                file_name,
            })
        })
    }

    pub fn match_rows(&self, rows: &[LabelRow], corpus: &dyn ImageCorpus) -> MatchReport {
        let mut report = MatchReport::default();
        for row in rows {
            match self.match_row(row, corpus) {
                Some(m) => report.matched.push(m),
                None => report.unmatched.push(row.clone()),
            }
        }
        report
    }
}

/// The identifier's last path component with a short trailing extension removed.
///
/// `car1.JPG` and `imgs/car1.png` both yield `car1`; `car1` is returned unchanged.
pub fn identifier_stem(identifier: &str) -> &str {
    let id = identifier.trim();
    let name = id.rsplit(['/', '\\']).next().unwrap_or(id);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => name,
    }
}

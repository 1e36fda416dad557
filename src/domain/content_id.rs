use std::fmt::Display;

/// Content-stable identifier of an upload.
///
/// Upstream derives it from the file contents, so re-uploads of the same
/// file share it. It keys the cover cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic cover file name for this content.
    ///
    /// Identifiers outside the url-safe alphabet are hashed, so the name can
    /// never point outside the cache directory.
    pub fn cover_file_name(&self) -> String {
        if self.is_path_safe() {
            format!("{}.jpg", self.0)
        } else {
            format!("{}.jpg", blake3::hash(self.0.as_bytes()).to_hex())
        }
    }

    fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

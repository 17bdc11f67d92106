//! Format-polymorphic content files.
//!
//! A [`ContentFile`] wraps a single on-disk document and lets callers load,
//! mutate and persist it without caring about the concrete format. Structured
//! data (YAML, JSON) is held as a [`serde_json::Value`] tree; page documents
//! are held as a front-matter mapping plus a raw body. The in-memory copy is
//! cached after the first read so the rendering layer can enrich page
//! metadata across multiple passes without re-parsing, and a single `write`
//! persists the merged state.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::error::{ContentError, ParseError};

/// On-disk representation of a [`ContentFile`], derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Structured data, `.yml`/`.yaml`.
    Yaml,
    /// Structured data, `.json`.
    Json,
    /// A document with a YAML front-matter header and a free-form body,
    /// `.html`.
    Hybrid,
    /// Anything else. Every I/O operation on it fails.
    Unsupported,
}

impl Format {
    fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some("yml" | "yaml") => Format::Yaml,
            Some("json") => Format::Json,
            Some("html") => Format::Hybrid,
            _ => Format::Unsupported,
        }
    }
}

/// Parsed contents of a [`ContentFile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// The full value tree of a structured data file.
    Data(Value),
    /// A hybrid document, split into its front matter and raw body. The body
    /// is preserved byte-for-byte across a read/write round trip.
    Hybrid { metadata: Value, body: String },
}

impl Content {
    /// The value tree of a data file, or the metadata of a hybrid document.
    pub fn data(&self) -> &Value {
        match self {
            Content::Data(value) => value,
            Content::Hybrid { metadata, .. } => metadata,
        }
    }

    /// The raw body of a hybrid document.
    pub fn body(&self) -> Option<&str> {
        match self {
            Content::Data(_) => None,
            Content::Hybrid { body, .. } => Some(body),
        }
    }
}

/// A single on-disk document with an in-memory cache of its parsed contents.
///
/// Instances are created per path on demand and never pooled; two values on
/// the same path do not see each other's in-memory mutations until both
/// re-read from disk.
#[derive(Debug)]
pub struct ContentFile {
    path: Utf8PathBuf,
    format: Format,
    content: Option<Content>,
}

impl ContentFile {
    /// Creates a handle for `path`, resolved against the current directory.
    /// No I/O happens until the first read.
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_owned()
        } else {
            match std::env::current_dir()
                .ok()
                .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            {
                Some(cwd) => cwd.join(path),
                None => path.to_owned(),
            }
        };

        Self {
            format: Format::from_path(&path),
            content: None,
            path,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Whether the file extension belongs to the supported set. Pure, no I/O.
    pub fn is_supported(&self) -> bool {
        self.format != Format::Unsupported
    }

    /// The in-memory contents, if any read happened yet.
    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// Returns the parsed contents, reading from disk only if the in-memory
    /// copy is not populated yet. A missing file yields an empty value rather
    /// than an error; a present but malformed file fails with a parse error.
    pub async fn read(&mut self) -> Result<&Content, ContentError> {
        if self.content.is_none() {
            let parsed = self.parse_disk().await?;
            self.content = Some(parsed);
        }

        match &self.content {
            Some(content) => Ok(content),
            None => unreachable!("populated above"),
        }
    }

    /// Like [`read`](Self::read), but always goes to disk, discarding any
    /// in-memory state.
    pub async fn reload(&mut self) -> Result<&Content, ContentError> {
        let parsed = self.parse_disk().await?;
        self.content = Some(parsed);
        self.read().await
    }

    /// Deep-merges `update` into the contents, reading from disk first when
    /// nothing is loaded yet. Mapping keys merge recursively, scalars are
    /// overwritten and sequences are concatenated; callers wanting
    /// replacement semantics must pre-deduplicate. For hybrid documents the
    /// merge applies to the metadata only, the body stays untouched.
    pub async fn patch(&mut self, update: Value) -> Result<(), ContentError> {
        self.read().await?;

        match &mut self.content {
            Some(Content::Data(value)) => deep_merge(value, update),
            Some(Content::Hybrid { metadata, .. }) => deep_merge(metadata, update),
            None => unreachable!("populated by read"),
        }

        Ok(())
    }

    /// Serializes the contents and persists them to the path, overwriting
    /// whatever is there. Reads first when nothing is loaded, so a write
    /// never discards unread on-disk state, and applies `update` as a patch
    /// when given. An unsupported format fails before any disk write.
    pub async fn write(&mut self, update: Option<Value>) -> Result<(), ContentError> {
        self.read().await?;

        if let Some(update) = update {
            self.patch(update).await?;
        }

        let text = self.serialize()?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.path, text).await?;

        Ok(())
    }

    async fn parse_disk(&self) -> Result<Content, ContentError> {
        if self.format == Format::Unsupported {
            return Err(self.unsupported());
        }

        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            // A missing file means "nothing written yet".
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(match self.format {
                    Format::Yaml | Format::Json => Content::Data(empty_mapping()),
                    Format::Hybrid => Content::Hybrid {
                        metadata: empty_mapping(),
                        body: String::new(),
                    },
                    Format::Unsupported => return Err(self.unsupported()),
                });
            }
            Err(err) => return Err(err.into()),
        };

        self.parse(&text)
    }

    fn parse(&self, text: &str) -> Result<Content, ContentError> {
        let fail = |err: ParseError| ContentError::Parse(self.path.clone(), err);

        match self.format {
            Format::Yaml => {
                let value = if text.trim().is_empty() {
                    empty_mapping()
                } else {
                    serde_yaml::from_str(text).map_err(|e| fail(e.into()))?
                };
                Ok(Content::Data(value))
            }
            Format::Json => {
                let value = serde_json::from_str(text).map_err(|e| fail(e.into()))?;
                Ok(Content::Data(value))
            }
            Format::Hybrid => {
                let text = text.strip_prefix('\u{feff}').unwrap_or(text);
                let (matter, body) = match split_front_matter(text) {
                    Some(found) => found,
                    None => ("", text),
                };

                let metadata = if matter.trim().is_empty() {
                    empty_mapping()
                } else {
                    let parsed: Value =
                        serde_yaml::from_str(matter).map_err(|e| fail(e.into()))?;
                    if !parsed.is_object() {
                        return Err(fail(ParseError::Matter));
                    }
                    parsed
                };

                Ok(Content::Hybrid {
                    metadata,
                    body: body.to_string(),
                })
            }
            Format::Unsupported => Err(self.unsupported()),
        }
    }

    fn serialize(&self) -> Result<String, ContentError> {
        let fail = |err: ParseError| ContentError::Serialize(self.path.clone(), err);

        match &self.content {
            Some(Content::Data(value)) => match self.format {
                Format::Yaml => serde_yaml::to_string(value).map_err(|e| fail(e.into())),
                // Two-space indentation, stable across rebuilds.
                Format::Json => serde_json::to_string_pretty(value).map_err(|e| fail(e.into())),
                Format::Hybrid | Format::Unsupported => Err(self.unsupported()),
            },
            Some(Content::Hybrid { metadata, body }) => {
                let matter = serde_yaml::to_string(metadata).map_err(|e| fail(e.into()))?;
                Ok(format!("---\n{matter}---\n{body}"))
            }
            None => unreachable!("serialize is only reached after read"),
        }
    }

    fn unsupported(&self) -> ContentError {
        ContentError::UnsupportedFormat(self.path.extension().unwrap_or("").into())
    }
}

fn empty_mapping() -> Value {
    Value::Object(Default::default())
}

/// Splits a document into its front-matter block and body. Returns `None`
/// when the document does not open with a delimiter line or the block is
/// never closed. The body starts right after the closing delimiter line, so
/// concatenating `---\n`, the matter and `---\n` + body reproduces the input.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let matter = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((matter, body));
        }
        offset += line.len();
    }

    None
}

/// Recursive merge: mapping keys merge key-by-key, sequences concatenate,
/// everything else is overwritten by `update`.
pub(crate) fn deep_merge(base: &mut Value, update: Value) {
    match (base, update) {
        (Value::Object(base), Value::Object(update)) => {
            for (key, value) in update {
                match base.get_mut(&key) {
                    Some(entry) => deep_merge(entry, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(update)) => base.extend(update),
        (base, update) => *base = update,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ContentFile::new("a/b.yml").format(), Format::Yaml);
        assert_eq!(ContentFile::new("a/b.yaml").format(), Format::Yaml);
        assert_eq!(ContentFile::new("a/b.json").format(), Format::Json);
        assert_eq!(ContentFile::new("a/b.html").format(), Format::Hybrid);
        assert_eq!(ContentFile::new("a/b.png").format(), Format::Unsupported);
        assert!(!ContentFile::new("a/b.png").is_supported());
    }

    #[test]
    fn deep_merge_maps_and_sequences() {
        let mut base = json!({ "a": { "x": 1 } });
        deep_merge(&mut base, json!({ "a": { "y": 2 } }));
        assert_eq!(base, json!({ "a": { "x": 1, "y": 2 } }));

        let mut base = json!({ "a": [1, 2] });
        deep_merge(&mut base, json!({ "a": [3] }));
        assert_eq!(base, json!({ "a": [1, 2, 3] }));

        let mut base = json!({ "a": "old", "keep": true });
        deep_merge(&mut base, json!({ "a": "new" }));
        assert_eq!(base, json!({ "a": "new", "keep": true }));
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let (_dir, root) = scratch();

        let mut file = ContentFile::new(root.join("missing.yml"));
        let content = file.read().await.unwrap();
        assert_eq!(content, &Content::Data(json!({})));

        let mut page = ContentFile::new(root.join("missing.html"));
        let content = page.read().await.unwrap();
        assert_eq!(content.data(), &json!({}));
        assert_eq!(content.body(), Some(""));
    }

    #[tokio::test]
    async fn cached_read_skips_disk() {
        let (_dir, root) = scratch();
        let path = root.join("site.yml");
        std::fs::write(&path, "name: first\n").unwrap();

        let mut file = ContentFile::new(&path);
        assert_eq!(file.read().await.unwrap().data()["name"], "first");

        // Change the file behind the cache's back.
        std::fs::write(&path, "name: second\n").unwrap();
        assert_eq!(file.read().await.unwrap().data()["name"], "first");
        assert_eq!(file.reload().await.unwrap().data()["name"], "second");
    }

    #[tokio::test]
    async fn write_preserves_unread_disk_state() {
        let (_dir, root) = scratch();
        let path = root.join("site.yml");
        std::fs::write(&path, "kept: true\n").unwrap();

        // Never read explicitly; the write must load before merging.
        let mut file = ContentFile::new(&path);
        file.write(Some(json!({ "added": 1 }))).await.unwrap();

        let mut reread = ContentFile::new(&path);
        let content = reread.read().await.unwrap();
        assert_eq!(content.data(), &json!({ "kept": true, "added": 1 }));
    }

    #[tokio::test]
    async fn hybrid_round_trip_is_idempotent() {
        let (_dir, root) = scratch();
        let path = root.join("about.html");
        let original = "---\ntitle: About\n---\n<h1>About</h1>\n\n<p>Body ---\nhere.</p>\n";
        std::fs::write(&path, original).unwrap();

        let mut file = ContentFile::new(&path);
        file.read().await.unwrap();
        file.write(None).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, original);

        let mut reread = ContentFile::new(&path);
        let content = reread.read().await.unwrap();
        assert_eq!(content.data(), &json!({ "title": "About" }));
        assert_eq!(content.body(), Some("<h1>About</h1>\n\n<p>Body ---\nhere.</p>\n"));
    }

    #[tokio::test]
    async fn hybrid_patch_touches_metadata_only() {
        let (_dir, root) = scratch();
        let path = root.join("post.html");
        std::fs::write(&path, "---\ntags:\n- a\n---\nbody text").unwrap();

        let mut file = ContentFile::new(&path);
        file.patch(json!({ "tags": ["b"], "draft": false }))
            .await
            .unwrap();

        let content = file.content().unwrap();
        assert_eq!(content.data(), &json!({ "tags": ["a", "b"], "draft": false }));
        assert_eq!(content.body(), Some("body text"));
    }

    #[tokio::test]
    async fn document_without_front_matter_is_all_body() {
        let (_dir, root) = scratch();
        let path = root.join("plain.html");
        std::fs::write(&path, "<p>no matter here</p>").unwrap();

        let mut file = ContentFile::new(&path);
        let content = file.read().await.unwrap();
        assert_eq!(content.data(), &json!({}));
        assert_eq!(content.body(), Some("<p>no matter here</p>"));
    }

    #[tokio::test]
    async fn json_write_is_pretty_printed() {
        let (_dir, root) = scratch();
        let path = root.join("data.json");

        let mut file = ContentFile::new(&path);
        file.write(Some(json!({ "a": 1 }))).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\n  \"a\": 1\n}");
    }

    #[tokio::test]
    async fn malformed_file_fails_with_parse_error() {
        let (_dir, root) = scratch();
        let path = root.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut file = ContentFile::new(&path);
        match file.read().await {
            Err(ContentError::Parse(reported, _)) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_format_never_touches_disk() {
        let (_dir, root) = scratch();
        let path = root.join("image.png");

        let mut file = ContentFile::new(&path);
        assert!(matches!(
            file.read().await,
            Err(ContentError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            file.write(Some(json!({ "a": 1 }))).await,
            Err(ContentError::UnsupportedFormat(_))
        ));
        assert!(!path.exists());
    }
}

//! Read-only access to log files and images under the allowed roots.

use impview_common::{LogRecord, modified_millis};
use serde_json::Value;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{Containment, PrefixRewrite, ServerConfig};
use crate::error::{AccessError, Result};
use crate::paths::AllowedRoot;

/// Parsed contents of a log file.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSnapshot {
    /// Records newest first.
    pub records: Vec<LogRecord>,
    /// Freshness marker taken before the content was read.
    pub last_modified: u64,
}

/// Image bytes ready to be served.
#[derive(Debug, Clone)]
pub struct ImageFile {
    /// Resolved location on disk.
    pub path: PathBuf,
    /// File contents.
    pub bytes: Vec<u8>,
    /// MIME type guessed from the extension.
    pub content_type: &'static str,
}

/// Resolves client references against the allowed roots and reads files.
#[derive(Debug, Clone)]
pub struct FileAccess {
    log_root: AllowedRoot,
    asset_root: Option<AllowedRoot>,
    containment: Containment,
    image_rewrites: Vec<PrefixRewrite>,
    preview_bytes: usize,
}

impl FileAccess {
    /// Access rooted where `config` says; fails when a root cannot be made
    /// absolute.
    pub fn new(config: &ServerConfig) -> std::result::Result<Self, String> {
        let log_root = AllowedRoot::new(&config.log_root)?;
        let asset_root = config
            .asset_root
            .as_deref()
            .map(AllowedRoot::new)
            .transpose()?;
        if !log_root.dir().is_dir() {
            warn!(root = %log_root.dir().display(), "Log root does not exist yet.");
        }
        Ok(Self {
            log_root,
            asset_root,
            containment: config.containment,
            image_rewrites: config.image_rewrites.clone(),
            preview_bytes: config.preview_bytes,
        })
    }

    /// Normalised absolute log root.
    pub fn log_root(&self) -> &Path {
        self.log_root.dir()
    }

    /// Full parsed contents of a log file, newest record first, with its
    /// freshness marker.
    pub async fn logs(&self, file: &str) -> Result<LogSnapshot> {
        let (path, metadata) = self.locate_log(file).await?;
        // Marker is taken before the read so it never claims newer content
        // than what is returned.
        let last_modified = marker(file, &metadata)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AccessError::from_io(file, e))?;

        let mut records =
            parse_log_file(&bytes, self.preview_bytes).map_err(|detail| {
                AccessError::MalformedContent {
                    path: file.to_string(),
                    detail,
                }
            })?;
        records.reverse();

        debug!(file, records = records.len(), last_modified, "Read log file.");
        Ok(LogSnapshot {
            records,
            last_modified,
        })
    }

    /// Freshness marker of a log file. Reads metadata only.
    pub async fn status(&self, file: &str) -> Result<u64> {
        let (_, metadata) = self.locate_log(file).await?;
        marker(file, &metadata)
    }

    /// An image referenced by a record, from the log root or the asset root.
    pub async fn image(&self, reference: &str) -> Result<ImageFile> {
        let rewritten = self
            .image_rewrites
            .iter()
            .find_map(|rewrite| rewrite.apply(reference))
            .unwrap_or_else(|| reference.to_string());
        let path = self.log_root.resolve(&rewritten);

        let roots: Vec<&AllowedRoot> = std::iter::once(&self.log_root)
            .chain(self.asset_root.as_ref())
            .collect();
        if !roots
            .iter()
            .any(|root| root.contains(&path, self.containment))
        {
            warn!(reference, path = %path.display(), "Image outside allowed roots.");
            return Err(AccessError::AccessDenied {
                path: reference.to_string(),
            });
        }
        self.confirm_real_path(&roots, &path, reference).await?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AccessError::from_io(reference, e))?;
        if !metadata.is_file() {
            return Err(AccessError::NotFound {
                path: reference.to_string(),
            });
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AccessError::from_io(reference, e))?;

        Ok(ImageFile {
            content_type: content_type_for(&path),
            path,
            bytes,
        })
    }

    async fn locate_log(&self, file: &str) -> Result<(PathBuf, Metadata)> {
        let path = self.log_root.resolve(file);
        if !self.log_root.contains(&path, self.containment) {
            warn!(file, path = %path.display(), "Log file outside allowed root.");
            return Err(AccessError::AccessDenied {
                path: file.to_string(),
            });
        }
        self.confirm_real_path(&[&self.log_root], &path, file)
            .await?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AccessError::from_io(file, e))?;
        if !metadata.is_file() {
            return Err(AccessError::NotFound {
                path: file.to_string(),
            });
        }
        Ok((path, metadata))
    }

    /// In ancestor mode, re-check containment after resolving symlinks so a
    /// link inside a root cannot point outside of it.
    async fn confirm_real_path(
        &self,
        roots: &[&AllowedRoot],
        path: &Path,
        reference: &str,
    ) -> Result<()> {
        if self.containment != Containment::Ancestor {
            return Ok(());
        }
        let real = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| AccessError::from_io(reference, e))?;
        for root in roots {
            if let Ok(real_root) = tokio::fs::canonicalize(root.dir()).await
                && real.starts_with(&real_root)
            {
                return Ok(());
            }
        }
        warn!(reference, real = %real.display(), "Symlink target outside allowed roots.");
        Err(AccessError::AccessDenied {
            path: reference.to_string(),
        })
    }
}

fn marker(file: &str, metadata: &Metadata) -> Result<u64> {
    modified_millis(metadata).map_err(|e| AccessError::Io {
        path: file.to_string(),
        source: std::io::Error::other(e),
    })
}

/// Parse a log file body into records in on-disk order.
///
/// Any JSON array is accepted; elements are kept whatever their shape.
/// Errors carry a preview of at most `preview_bytes` bytes around the
/// offending position.
pub fn parse_log_file(bytes: &[u8], preview_bytes: usize) -> std::result::Result<Vec<LogRecord>, String> {
    let items = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            return Err(format!(
                "expected a JSON array of records, found {} near `{}`",
                json_kind(&other),
                preview(bytes, 0, preview_bytes)
            ));
        }
        Err(err) => {
            let offset = byte_offset(bytes, err.line(), err.column());
            return Err(format!(
                "{err}; near `{}`",
                preview(bytes, offset, preview_bytes)
            ));
        }
    };

    Ok(items.into_iter().map(LogRecord::from).collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Byte offset of a 1-based line/column position reported by serde_json.
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = bytes
        .split(|b| *b == b'\n')
        .take(line - 1)
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column.saturating_sub(1)).min(bytes.len())
}

/// At most `max` bytes centred on `offset`, lossily decoded, with control
/// characters escaped.
fn preview(bytes: &[u8], offset: usize, max: usize) -> String {
    let start = offset.saturating_sub(max / 2).min(bytes.len());
    let end = (start + max).min(bytes.len());
    String::from_utf8_lossy(&bytes[start..end])
        .escape_debug()
        .to_string()
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use impview_common::Event;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        base: PathBuf,
        access: FileAccess,
    }

    /// `<tmp>/log_samples` as log root, `<tmp>/assets` as asset root.
    fn fixture(containment: Containment) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir_all(base.join("log_samples")).unwrap();
        fs::create_dir_all(base.join("assets")).unwrap();
        fs::create_dir_all(base.join("log_samples-evil")).unwrap();
        let config = ServerConfig {
            log_root: base.join("log_samples"),
            asset_root: Some(base.join("assets")),
            containment,
            image_rewrites: vec!["/remote/home=/local/home".parse().unwrap()],
            ..ServerConfig::default()
        };
        let access = FileAccess::new(&config).unwrap();
        Fixture {
            _dir: dir,
            base,
            access,
        }
    }

    #[tokio::test]
    async fn test_logs_are_returned_newest_first() {
        let fx = fixture(Containment::Ancestor);
        fs::write(
            fx.base.join("log_samples/run.json"),
            r#"[{"timestamp":1,"type":"a"},{"timestamp":2,"type":"b"},{"timestamp":3,"type":"c"}]"#,
        )
        .unwrap();

        let snapshot = fx.access.logs("run.json").await.unwrap();
        let kinds: Vec<&str> = snapshot.records.iter().map(LogRecord::kind).collect();
        assert_eq!(kinds, ["c", "b", "a"]);
        assert!(snapshot.last_modified > 0);

        let status = fx.access.status("run.json").await.unwrap();
        assert_eq!(status, snapshot.last_modified);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let fx = fixture(Containment::Ancestor);
        assert!(matches!(
            fx.access.logs("absent.json").await,
            Err(AccessError::NotFound { .. })
        ));
        assert!(matches!(
            fx.access.status("absent.json").await,
            Err(AccessError::NotFound { .. })
        ));
        // A directory is not a log file.
        fs::create_dir_all(fx.base.join("log_samples/nested")).unwrap();
        assert!(matches!(
            fx.access.status("nested").await,
            Err(AccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_paths_outside_root_are_denied() {
        let fx = fixture(Containment::Ancestor);
        fs::write(fx.base.join("secret.json"), "[]").unwrap();
        fs::write(fx.base.join("log_samples-evil/run.json"), "[]").unwrap();
        let absolute = fx.base.join("secret.json").display().to_string();

        for reference in [
            "../secret.json",
            absolute.as_str(),
            "../log_samples-evil/run.json",
        ] {
            assert!(
                matches!(
                    fx.access.logs(reference).await,
                    Err(AccessError::AccessDenied { .. })
                ),
                "logs({reference}) was not denied"
            );
            assert!(
                matches!(
                    fx.access.status(reference).await,
                    Err(AccessError::AccessDenied { .. })
                ),
                "status({reference}) was not denied"
            );
        }
    }

    #[tokio::test]
    async fn test_prefix_mode_admits_sibling_directory() {
        let fx = fixture(Containment::Prefix);
        fs::write(
            fx.base.join("log_samples-evil/run.json"),
            r#"[{"timestamp":1,"type":"x"}]"#,
        )
        .unwrap();

        let snapshot = fx
            .access
            .logs("../log_samples-evil/run.json")
            .await
            .unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert!(matches!(
            fx.access.logs("../secret.json").await,
            Err(AccessError::AccessDenied { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_denied() {
        let fx = fixture(Containment::Ancestor);
        fs::write(fx.base.join("secret.json"), "[]").unwrap();
        std::os::unix::fs::symlink(
            fx.base.join("secret.json"),
            fx.base.join("log_samples/link.json"),
        )
        .unwrap();

        assert!(matches!(
            fx.access.logs("link.json").await,
            Err(AccessError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed_with_bounded_preview() {
        let fx = fixture(Containment::Ancestor);
        let mut body = String::from("[");
        for i in 0..500 {
            body.push_str(&format!(r#"{{"timestamp":{i},"type":"tick"}},"#));
        }
        body.push_str("{\"timestamp\": oops}]");
        fs::write(fx.base.join("log_samples/bad.json"), &body).unwrap();

        let Err(AccessError::MalformedContent { detail, .. }) = fx.access.logs("bad.json").await
        else {
            panic!("expected malformed content");
        };
        assert!(detail.contains("oops"), "{detail}");
        assert!(detail.len() < 400, "preview not bounded: {} bytes", detail.len());

        // Status only looks at metadata.
        assert!(fx.access.status("bad.json").await.is_ok());
    }

    #[test]
    fn test_parse_rejects_only_non_arrays() {
        let err = parse_log_file(br#"{"timestamp":1,"type":"x"}"#, 64).unwrap_err();
        assert!(err.contains("an object"), "{err}");

        assert!(parse_log_file(b"[]", 64).unwrap().is_empty());
    }

    #[test]
    fn test_parse_keeps_records_without_envelope() {
        let bytes = br#"[{"timestamp":1,"type":"x"},{"type":"status","note":"no ts"},{"timestamp":2},"plain",7]"#;
        let records = parse_log_file(bytes, 64).unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[1].kind(), "status");
        assert_eq!(records[1].timestamp, None);
        assert_eq!(records[2].event, Event::Untyped);
        assert_eq!(records[3].event, Event::Bare(serde_json::json!("plain")));

        let values: Vec<Value> = records.iter().map(LogRecord::to_value).collect();
        assert_eq!(values, serde_json::from_slice::<Vec<Value>>(bytes).unwrap());
    }

    #[test]
    fn test_preview_escapes_control_characters() {
        let text = preview(b"ab\ncd\x07ef", 3, 64);
        assert_eq!(text, "ab\\ncd\\u{7}ef");
        assert_eq!(preview(b"abcdef", 100, 4), "");
        assert_eq!(preview(b"abcdefgh", 4, 4), "cdef");
    }

    #[test]
    fn test_byte_offset_from_line_and_column() {
        let bytes = b"[\n  1,\n  oops\n]";
        assert_eq!(byte_offset(bytes, 3, 3), 9);
        assert_eq!(bytes[9], b'o');
        assert_eq!(byte_offset(bytes, 0, 0), 0);
    }

    #[tokio::test]
    async fn test_images_from_both_roots() {
        let fx = fixture(Containment::Ancestor);
        fs::write(fx.base.join("log_samples/a.png"), b"png-bytes").unwrap();
        fs::write(fx.base.join("assets/b.JPG"), b"jpg-bytes").unwrap();

        let relative = fx.access.image("a.png").await.unwrap();
        assert_eq!(relative.bytes, b"png-bytes");
        assert_eq!(relative.content_type, "image/png");

        let absolute = fx.base.join("assets/b.JPG").display().to_string();
        let asset = fx.access.image(&absolute).await.unwrap();
        assert_eq!(asset.content_type, "image/jpeg");

        assert!(matches!(
            fx.access.image("missing.png").await,
            Err(AccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_image_outside_roots_is_denied() {
        let fx = fixture(Containment::Ancestor);
        fs::write(fx.base.join("elsewhere.png"), b"x").unwrap();
        let absolute = fx.base.join("elsewhere.png").display().to_string();

        assert!(matches!(
            fx.access.image(&absolute).await,
            Err(AccessError::AccessDenied { .. })
        ));
        assert!(matches!(
            fx.access.image("../assets-other/x.png").await,
            Err(AccessError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_image_prefix_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir_all(base.join("logs")).unwrap();
        fs::create_dir_all(base.join("out")).unwrap();
        fs::write(base.join("out/frame.webp"), b"webp").unwrap();
        let config = ServerConfig {
            log_root: base.join("logs"),
            asset_root: Some(base.join("out")),
            image_rewrites: vec![format!("/producer/out={}", base.join("out").display())
                .parse()
                .unwrap()],
            ..ServerConfig::default()
        };
        let access = FileAccess::new(&config).unwrap();

        let image = access.image("/producer/out/frame.webp").await.unwrap();
        assert_eq!(image.content_type, "image/webp");
        assert_eq!(image.path, base.join("out/frame.webp"));
    }
}

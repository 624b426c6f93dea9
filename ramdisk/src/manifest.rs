//! Editable archive manifest (`cpiolist.txt`).
//!
//! The manifest is line oriented so modes and links can be edited by hand
//! between unpack and repack:
//!
//! ```text
//! compress_level:6
//! dir sbin 0o750
//! file init initrd/init 0o750
//! slink bin system/bin 0o777
//! ```
//!
//! Entry lines are `kind name [path|target] mode [extra...]`. Modes are octal,
//! with or without a `0o` prefix; extra fields (uid, gid) are ignored. Lines
//! starting with `#`, blank lines, and lines of an unknown kind are skipped.
//! `key:value` lines other than `compress_level` belong to other consumers
//! of the same file and are ignored here.

use std::fmt;
use std::path::PathBuf;

use crate::error::{RamdiskError, Result};

/// Compression level used when the manifest does not name one.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Key of the compression level line.
pub const COMPRESS_LEVEL_KEY: &str = "compress_level";

/// Default permissions of a `dir` line without a mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default permissions of an `slink` line without a mode.
pub const DEFAULT_SYMLINK_MODE: u32 = 0o777;

/// Special node kinds that are recognized but never packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Node,
    Pipe,
    Socket,
}

impl SpecialKind {
    /// Manifest keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            SpecialKind::Node => "nod",
            SpecialKind::Pipe => "pipe",
            SpecialKind::Socket => "sock",
        }
    }
}

/// What a manifest line describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file whose content is read from `source` at pack time
    File { source: PathBuf },
    Directory,
    Symlink { target: String },
    Special(SpecialKind),
}

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash separated path inside the archive, never starting with `/`
    pub path: String,
    /// Permission bits
    pub mode: u32,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    /// A regular file entry.
    pub fn file(path: impl Into<String>, source: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            kind: EntryKind::File {
                source: source.into(),
            },
        }
    }

    /// A directory entry.
    pub fn directory(path: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            kind: EntryKind::Directory,
        }
    }

    /// A symbolic link entry.
    pub fn symlink(path: impl Into<String>, target: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            kind: EntryKind::Symlink {
                target: target.into(),
            },
        }
    }
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EntryKind::File { source } => write!(
                f,
                "file {} {} 0o{:o}",
                self.path,
                source.to_string_lossy().replace('\\', "/"),
                self.mode
            ),
            EntryKind::Directory => write!(f, "dir {} 0o{:o}", self.path, self.mode),
            EntryKind::Symlink { target } => {
                write!(f, "slink {} {} 0o{:o}", self.path, target, self.mode)
            }
            EntryKind::Special(kind) => write!(f, "{} {}", kind.keyword(), self.path),
        }
    }
}

/// Ordered archive entries plus the compression level to wrap them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifest {
    /// 0 stores the archive bare, 1-9 selects a deflate level
    pub compression_level: u32,
    pub entries: Vec<ArchiveEntry>,
}

impl Default for ArchiveManifest {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            entries: Vec::new(),
        }
    }
}

impl ArchiveManifest {
    /// Create an empty manifest with the default compression level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text.
    ///
    /// The first `compress_level` line wins; without one the level is
    /// [`DEFAULT_COMPRESSION_LEVEL`].
    pub fn parse(text: &str) -> Result<Self> {
        let mut compression_level = None;
        let mut entries = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(keyword) = fields.next() else {
                continue;
            };
            let kind_keyword = match keyword {
                "file" | "dir" | "slink" | "nod" | "pipe" | "sock" => keyword,
                _ => {
                    if let Some((key, value)) = line.split_once(':') {
                        if key.trim() == COMPRESS_LEVEL_KEY && compression_level.is_none() {
                            // Negative levels mean "store"
                            let level = value.trim().parse::<i32>().map_err(|e| {
                                RamdiskError::InvalidManifest {
                                    line: line_no,
                                    message: format!("bad compression level '{}': {}", value.trim(), e),
                                }
                            })?;
                            compression_level = Some(level.max(0) as u32);
                        }
                    }
                    continue;
                }
            };

            let args: Vec<&str> = fields.collect();
            entries.push(parse_entry(kind_keyword, &args, line_no)?);
        }

        Ok(Self {
            compression_level: compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL),
            entries,
        })
    }

    /// Render the manifest as text, compression level first.
    pub fn to_text(&self) -> String {
        let mut text = format!("{}:{}\n", COMPRESS_LEVEL_KEY, self.compression_level);
        for entry in &self.entries {
            text.push_str(&entry.to_string());
            text.push('\n');
        }
        text
    }
}

fn parse_entry(keyword: &str, args: &[&str], line: usize) -> Result<ArchiveEntry> {
    let invalid = |message: String| RamdiskError::InvalidManifest { line, message };

    let path = args
        .first()
        .map(|p| p.replace('\\', "/"))
        .ok_or_else(|| invalid(format!("'{}' line without a name", keyword)))?;

    let mode_at = |index: usize, default: Option<u32>| -> Result<u32> {
        match args.get(index) {
            Some(text) => parse_mode(text).ok_or_else(|| invalid(format!("bad mode '{}'", text))),
            None => default.ok_or_else(|| invalid(format!("'{}' line without a mode", keyword))),
        }
    };

    let entry = match keyword {
        "file" => {
            let source = args
                .get(1)
                .ok_or_else(|| invalid("'file' line without a source path".to_string()))?;
            ArchiveEntry::file(path, *source, mode_at(2, None)?)
        }
        "dir" => ArchiveEntry::directory(path, mode_at(1, Some(DEFAULT_DIR_MODE))?),
        "slink" => {
            let target = args
                .get(1)
                .ok_or_else(|| invalid("'slink' line without a target".to_string()))?;
            ArchiveEntry::symlink(path, *target, mode_at(2, Some(DEFAULT_SYMLINK_MODE))?)
        }
        "nod" | "pipe" | "sock" => {
            let kind = match keyword {
                "nod" => SpecialKind::Node,
                "pipe" => SpecialKind::Pipe,
                _ => SpecialKind::Socket,
            };
            ArchiveEntry {
                path,
                mode: 0,
                kind: EntryKind::Special(kind),
            }
        }
        _ => return Err(invalid(format!("unknown kind '{}'", keyword))),
    };

    Ok(entry)
}

/// Parse an octal mode written as `0o755`, `0755` or `755`.
pub fn parse_mode(text: &str) -> Option<u32> {
    let digits = text.strip_prefix("0o").unwrap_or(text);
    u32::from_str_radix(digits, 8).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0o755"), Some(0o755));
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("4555"), Some(0o4555));
        assert_eq!(parse_mode("0o9"), None);
        assert_eq!(parse_mode("rwx"), None);
    }

    #[test]
    fn test_parse_manifest() {
        let text = "\
mode:vendor
vendor_name:ROOTFS
compress_level:9
# comment
dir sbin 0o750
file init initrd/init 0o750 0 0
slink bin system/bin
dir data
nod dev/console c 5 1
unknown foo bar
compress_level:1
";
        let manifest = ArchiveManifest::parse(text).unwrap();
        assert_eq!(manifest.compression_level, 9);
        assert_eq!(manifest.entries.len(), 5);
        assert_eq!(manifest.entries[0], ArchiveEntry::directory("sbin", 0o750));
        assert_eq!(manifest.entries[1], ArchiveEntry::file("init", "initrd/init", 0o750));
        assert_eq!(manifest.entries[2], ArchiveEntry::symlink("bin", "system/bin", 0o777));
        assert_eq!(manifest.entries[3], ArchiveEntry::directory("data", 0o755));
        assert_eq!(manifest.entries[4].kind, EntryKind::Special(SpecialKind::Node));
    }

    #[test]
    fn test_missing_level_defaults() {
        let manifest = ArchiveManifest::parse("dir sbin 0o750\n").unwrap();
        assert_eq!(manifest.compression_level, DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn test_negative_level_is_uncompressed() {
        let manifest = ArchiveManifest::parse("compress_level:-1\ndir sbin 0o750\n").unwrap();
        assert_eq!(manifest.compression_level, 0);
        assert!(ArchiveManifest::parse("compress_level:fast\n").is_err());
    }

    #[test]
    fn test_file_requires_mode() {
        let err = ArchiveManifest::parse("compress_level:0\nfile init initrd/init\n").unwrap_err();
        assert!(matches!(err, RamdiskError::InvalidManifest { line: 2, .. }));
    }

    #[test]
    fn test_backslashes_normalized() {
        let manifest = ArchiveManifest::parse("dir system\\bin 755\n").unwrap();
        assert_eq!(manifest.entries[0].path, "system/bin");
    }

    #[test]
    fn test_to_text_parses_back() {
        let mut manifest = ArchiveManifest::new();
        manifest.compression_level = 0;
        manifest.entries.push(ArchiveEntry::directory("sbin", 0o750));
        manifest.entries.push(ArchiveEntry::file("init", "initrd/init", 0o750));
        manifest.entries.push(ArchiveEntry::symlink("etc", "/system/etc", 0o777));

        let text = manifest.to_text();
        assert!(text.starts_with("compress_level:0\n"));
        assert!(text.contains("file init initrd/init 0o750\n"));
        assert_eq!(ArchiveManifest::parse(&text).unwrap(), manifest);
    }
}

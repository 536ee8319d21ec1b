//! Normalized namespace paths.
//!
//! [`VfsPath`] is the only path type the dispatch core works with. A path is
//! normalized exactly once, when it enters the system, and is immutable from
//! then on: every operation returns a new value. The normalized form uses a
//! single `/` separator, never contains doubled separators, and carries no
//! trailing separator except for the root (`/`) or an explicit directory
//! marker created with [`VfsPath::dir`].
//!
//! Equality, ordering and hashing are ordinal and case-sensitive over the
//! normalized string. The backing storage is an `Arc<str>`, so clones are a
//! reference-count bump and paths can be shared across backends freely.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The canonical path separator.
pub const SEPARATOR: char = '/';

/// A normalized, immutable namespace path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VfsPath(Arc<str>);

impl VfsPath {
    /// The empty path.
    pub fn empty() -> Self {
        Self(Arc::from(""))
    }

    /// The namespace root, `/`.
    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    /// Normalize an arbitrary string into a path.
    ///
    /// Backslashes fold to `/`, runs of separators collapse to one, and a
    /// trailing separator is stripped unless the result is exactly the root.
    /// Already-normalized input is copied without a scratch buffer.
    pub fn normalize(raw: &str) -> Self {
        if is_normalized(raw) {
            return Self(Arc::from(raw));
        }

        let mut buf = String::with_capacity(raw.len());
        let mut prev_sep = false;
        for ch in raw.chars() {
            let ch = if ch == '\\' { SEPARATOR } else { ch };
            if ch == SEPARATOR {
                if prev_sep {
                    continue;
                }
                prev_sep = true;
            } else {
                prev_sep = false;
            }
            buf.push(ch);
        }
        if buf.len() > 1 && buf.ends_with(SEPARATOR) {
            buf.pop();
        }
        Self(Arc::from(buf))
    }

    /// Normalize `raw` and mark the result as an explicit directory.
    ///
    /// The marker is a single trailing separator. It is not preserved if the
    /// string is normalized again.
    pub fn dir(raw: &str) -> Self {
        let path = Self::normalize(raw);
        if path.is_empty() || path.is_directory() {
            return path;
        }
        let mut buf = String::with_capacity(path.0.len() + 1);
        buf.push_str(&path.0);
        buf.push(SEPARATOR);
        Self(Arc::from(buf))
    }

    /// The normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the normalized string in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == "/"
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    /// True for the root and for paths carrying an explicit directory marker.
    pub fn is_directory(&self) -> bool {
        self.0.ends_with(SEPARATOR)
    }

    /// True when the final segment is a dot-file (`.git`, `.env`).
    pub fn is_hidden(&self) -> bool {
        let leaf = self.leaf();
        leaf.len() > 1 && leaf.starts_with('.') && leaf != ".."
    }

    /// Concatenate two paths with exactly one separator between them.
    ///
    /// Appending the empty path (or the root) is the identity, and appending
    /// to the empty path returns the operand.
    pub fn append(&self, other: &VfsPath) -> VfsPath {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() || other.is_root() {
            return self.clone();
        }

        let left: &str = &self.0;
        let right: &str = &other.0;
        let mut buf = String::with_capacity(left.len() + right.len() + 1);
        buf.push_str(left);
        match (left.ends_with(SEPARATOR), right.starts_with(SEPARATOR)) {
            (true, true) => buf.push_str(&right[1..]),
            (false, false) => {
                buf.push(SEPARATOR);
                buf.push_str(right);
            }
            _ => buf.push_str(right),
        }
        Self(Arc::from(buf))
    }

    /// Normalize `segment` and append it.
    pub fn join(&self, segment: &str) -> VfsPath {
        self.append(&VfsPath::normalize(segment))
    }

    /// Literal prefix test over the normalized form. The empty prefix
    /// always matches. This is not segment-aware: `/mnt2` starts with `/mnt`.
    pub fn starts_with(&self, prefix: impl AsRef<str>) -> bool {
        self.0.starts_with(prefix.as_ref())
    }

    /// The parent of this path.
    ///
    /// The root, the empty path and single relative segments have no parent
    /// and yield the empty path.
    pub fn directory(&self) -> VfsPath {
        let s = self.trimmed();
        if s.is_empty() || s == "/" {
            return Self::empty();
        }
        match s.rfind(SEPARATOR) {
            None => Self::empty(),
            Some(0) => Self::root(),
            Some(idx) => Self(Arc::from(&s[..idx])),
        }
    }

    /// The final segment. The root's leaf is the separator itself.
    pub fn leaf(&self) -> &str {
        let s = self.trimmed();
        if s == "/" {
            return s;
        }
        match s.rfind(SEPARATOR) {
            Some(idx) => &s[idx + 1..],
            None => s,
        }
    }

    /// The final segment if it contains a `.`, else the empty string.
    ///
    /// This is a naming heuristic, not a type check: a directory named
    /// `v1.2` reports a file name too.
    pub fn file_name(&self) -> &str {
        let leaf = self.leaf();
        if leaf.contains('.') { leaf } else { "" }
    }

    /// Iterate over the non-empty segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Collect the segments. Empty for the root and the empty path.
    pub fn split(&self) -> Vec<&str> {
        self.segments().collect()
    }

    /// Climb one directory.
    ///
    /// A final segment that looks like `name.ext` is skipped first, so the
    /// `up()` of `/a/b/file.txt` is `/a`. Absolute paths clamp at the root;
    /// relative paths with no separator left become empty.
    pub fn up(&self) -> VfsPath {
        let base = if self.file_name().is_empty() {
            self.clone()
        } else {
            self.directory()
        };
        let parent = base.directory();
        if parent.is_empty() && self.is_absolute() {
            Self::root()
        } else {
            parent
        }
    }

    /// Strip a literal prefix plus `extra` further characters, if the
    /// prefix is present. Otherwise the path is returned unchanged.
    pub fn reduce_start(&self, prefix: &str, extra: usize) -> VfsPath {
        match self.0.strip_prefix(prefix) {
            Some(rest) => {
                let rest = match rest.char_indices().nth(extra) {
                    Some((idx, _)) => &rest[idx..],
                    None if extra == 0 => rest,
                    None => "",
                };
                Self::normalize(rest)
            }
            None => self.clone(),
        }
    }

    /// Strip a literal suffix if present.
    pub fn reduce_end(&self, suffix: &str) -> VfsPath {
        match self.0.strip_suffix(suffix) {
            Some(rest) => Self::normalize(rest),
            None => self.clone(),
        }
    }

    /// True when `self` equals `ancestor` or lies strictly beneath it.
    ///
    /// Unlike [`starts_with`](Self::starts_with) this respects segment
    /// boundaries: `/mnt2/file` is not under `/mnt`.
    pub fn is_under(&self, ancestor: &VfsPath) -> bool {
        if ancestor.is_root() {
            return self.is_absolute();
        }
        let anc = ancestor.trimmed();
        match self.0.strip_prefix(anc) {
            Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// This path without an explicit directory marker. The root keeps its
    /// separator.
    pub fn strip_marker(&self) -> VfsPath {
        let s = self.trimmed();
        if s.len() == self.0.len() {
            self.clone()
        } else {
            Self(Arc::from(s))
        }
    }

    /// The string without an explicit directory marker.
    fn trimmed(&self) -> &str {
        let s: &str = &self.0;
        if s.len() > 1 && s.ends_with(SEPARATOR) {
            &s[..s.len() - 1]
        } else {
            s
        }
    }
}

fn is_normalized(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() > 1 && bytes[bytes.len() - 1] == b'/' {
        return false;
    }
    !bytes.contains(&b'\\') && !bytes.windows(2).any(|w| w == b"//")
}

impl Default for VfsPath {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VfsPath({:?})", &*self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for VfsPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VfsPath {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<String> for VfsPath {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<&String> for VfsPath {
    fn from(raw: &String) -> Self {
        Self::normalize(raw)
    }
}

impl From<&VfsPath> for VfsPath {
    fn from(path: &VfsPath) -> Self {
        path.clone()
    }
}

impl From<VfsPath> for String {
    fn from(path: VfsPath) -> Self {
        path.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> VfsPath {
        VfsPath::normalize(raw)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(p("").as_str(), "");
        assert_eq!(p("/").as_str(), "/");
        assert_eq!(p("//").as_str(), "/");
        assert_eq!(p("\\").as_str(), "/");
        assert_eq!(p("/a//b///c/").as_str(), "/a/b/c");
        assert_eq!(p("\\mnt\\usb\\file.txt").as_str(), "/mnt/usb/file.txt");
        assert_eq!(p("a/b/").as_str(), "a/b");
        assert_eq!(p("/a\\/b").as_str(), "/a/b");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        fn prop(raw: String) -> bool {
            let once = VfsPath::normalize(&raw);
            VfsPath::normalize(once.as_str()) == once
        }
        quickcheck::quickcheck(prop as fn(String) -> bool);
    }

    #[test]
    fn test_append_identity() {
        fn prop(raw: String) -> bool {
            let path = VfsPath::normalize(&raw);
            let empty = VfsPath::empty();
            path.append(&empty) == path && empty.append(&path) == path
        }
        quickcheck::quickcheck(prop as fn(String) -> bool);
    }

    #[test]
    fn test_append() {
        assert_eq!(p("/a").append(&p("b")).as_str(), "/a/b");
        assert_eq!(p("/a").append(&p("/b")).as_str(), "/a/b");
        assert_eq!(p("/").append(&p("b")).as_str(), "/b");
        assert_eq!(p("/").append(&p("/b/c")).as_str(), "/b/c");
        assert_eq!(VfsPath::dir("/a").append(&p("/b")).as_str(), "/a/b");
        assert_eq!(p("/a").append(&VfsPath::root()).as_str(), "/a");
        assert_eq!(p("/a").join("x\\y").as_str(), "/a/x/y");
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(VfsPath::dir("/mnt").strip_marker().as_str(), "/mnt");
        assert_eq!(p("/mnt").strip_marker().as_str(), "/mnt");
        assert!(VfsPath::root().strip_marker().is_root());
        assert!(VfsPath::empty().strip_marker().is_empty());
    }

    #[test]
    fn test_append_to_empty_returns_operand() {
        let empty = VfsPath::empty();
        assert_eq!(empty.append(&VfsPath::root()), VfsPath::root());
        assert_eq!(empty.append(&empty), empty);
        assert_eq!(VfsPath::root().append(&empty), VfsPath::root());
        assert_eq!(VfsPath::root().append(&VfsPath::root()), VfsPath::root());
    }

    #[test]
    fn test_predicates() {
        assert!(p("").is_empty());
        assert!(p("/").is_root());
        assert!(p("/").is_directory());
        assert!(p("/a").is_absolute());
        assert!(!p("a").is_absolute());
        assert!(!p("/a").is_directory());
        assert!(VfsPath::dir("/a").is_directory());
        assert!(p("/home/.config").is_hidden());
        assert!(!p("/home/config").is_hidden());
        assert!(!p("/home/..").is_hidden());
    }

    #[test]
    fn test_starts_with() {
        assert!(p("/mnt/usb").starts_with(""));
        assert!(p("/mnt/usb").starts_with("/mnt"));
        assert!(p("/mnt2/file").starts_with("/mnt"));
        assert!(!p("/mnt").starts_with("/mnt/usb"));
    }

    #[test]
    fn test_is_under() {
        assert!(p("/mnt/usb").is_under(&p("/mnt")));
        assert!(p("/mnt").is_under(&p("/mnt")));
        assert!(!p("/mnt2/file").is_under(&p("/mnt")));
        assert!(p("/anything").is_under(&VfsPath::root()));
    }

    #[test]
    fn test_directory() {
        assert_eq!(p("/a/b/c").directory().as_str(), "/a/b");
        assert_eq!(p("/a").directory().as_str(), "/");
        assert!(p("/").directory().is_empty());
        assert!(p("").directory().is_empty());
        assert!(p("a").directory().is_empty());
        assert_eq!(p("a/b").directory().as_str(), "a");
        assert_eq!(VfsPath::dir("/a/b").directory().as_str(), "/a");
    }

    #[test]
    fn test_leaf_and_file_name() {
        assert_eq!(p("/").leaf(), "/");
        assert_eq!(p("/a/b.txt").leaf(), "b.txt");
        assert_eq!(p("/a/b.txt").file_name(), "b.txt");
        assert_eq!(p("/a/b").file_name(), "");
        assert_eq!(VfsPath::dir("/a/b").leaf(), "b");
        // Heuristic: dotted directory names read as file names.
        assert_eq!(p("/releases/v1.2").file_name(), "v1.2");
    }

    #[test]
    fn test_split() {
        assert!(p("/").split().is_empty());
        assert!(p("").split().is_empty());
        assert_eq!(p("/a/b/c.txt").split(), vec!["a", "b", "c.txt"]);
        assert_eq!(p("rel/path").split(), vec!["rel", "path"]);
    }

    #[test]
    fn test_up_boundaries() {
        assert_eq!(p("/").up(), VfsPath::root());
        assert_eq!(p("/a").up(), VfsPath::root());
        assert!(p("a").up().is_empty());
        assert_eq!(p("/a/b").up().as_str(), "/a");
        assert_eq!(p("/a/b/file.txt").up().as_str(), "/a");
        assert_eq!(p("/file.txt").up(), VfsPath::root());
        assert!(p("file.txt").up().is_empty());
    }

    #[test]
    fn test_reduce() {
        assert_eq!(p("/mnt/usb/file.txt").reduce_start("/mnt/usb", 0).as_str(), "/file.txt");
        assert_eq!(p("/mnt/usb/file.txt").reduce_start("/mnt/usb", 1).as_str(), "file.txt");
        assert_eq!(p("/mnt/usb").reduce_start("/other", 0).as_str(), "/mnt/usb");
        assert_eq!(p("/mnt/usb").reduce_start("/mnt/usb", 5).as_str(), "");
        assert_eq!(p("/a/b.txt").reduce_end(".txt").as_str(), "/a/b");
        assert_eq!(p("/a/b.txt").reduce_end(".md").as_str(), "/a/b.txt");
    }

    #[test]
    fn test_equality_is_case_sensitive() {
        assert_ne!(p("/A"), p("/a"));
        assert_eq!(p("/a//b"), p("/a/b"));
    }

    #[test]
    fn test_serde_normalizes() {
        let path: VfsPath = ron::from_str("\"/a//b/\"").unwrap();
        assert_eq!(path.as_str(), "/a/b");
        assert_eq!(ron::to_string(&path).unwrap(), "\"/a/b\"");
    }
}

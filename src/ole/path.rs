//! Paths naming entries inside a container.

use smallvec::SmallVec;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Sequence of entry names leading from the root to an entry.
///
/// Equality is component-wise and case-sensitive; the container's own
/// lookups are case-insensitive, which is a property of the directory and
/// not of the path.
///
/// ```
/// use poifs::ole::DocumentPath;
///
/// let path: DocumentPath = "/ObjectPool/_1234".parse().unwrap();
/// assert_eq!(path.len(), 2);
/// assert_eq!(path.name(), Some("_1234"));
/// assert_eq!(path.parent().unwrap().to_string(), "/ObjectPool");
/// assert!(DocumentPath::root().is_root());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    components: SmallVec<[String; 4]>,
}

impl DocumentPath {
    /// The root path (no components).
    #[inline]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from names, outermost first.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Names, outermost first.
    #[inline]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether this is the root path.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Last component, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Path of the containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.is_root() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Self { components })
    }

    /// This path extended by `name`.
    pub fn child(&self, name: impl Into<String>) -> DocumentPath {
        let mut components = self.components.clone();
        components.push(name.into());
        Self { components }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// Parses `/`-separated paths. Empty components are skipped, so `""`,
/// `"/"` and `"//"` all name the root. Entry names may not contain `/`.
impl FromStr for DocumentPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_components(s.split('/').filter(|c| !c.is_empty())))
    }
}

impl From<&str> for DocumentPath {
    fn from(s: &str) -> Self {
        Self::from_components(s.split('/').filter(|c| !c.is_empty()))
    }
}

impl From<&[&str]> for DocumentPath {
    fn from(components: &[&str]) -> Self {
        Self::from_components(components.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for DocumentPath {
    fn from(components: [&str; N]) -> Self {
        Self::from_components(components)
    }
}

impl From<&DocumentPath> for DocumentPath {
    fn from(path: &DocumentPath) -> Self {
        path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path: DocumentPath = "/dir1/dir2/doc".parse().unwrap();
        assert_eq!(path.components(), &["dir1", "dir2", "doc"]);
        assert_eq!(path.to_string(), "/dir1/dir2/doc");
        assert_eq!(DocumentPath::from("dir1//dir2/"), DocumentPath::from(["dir1", "dir2"]));
        assert_eq!(DocumentPath::from("/").to_string(), "/");
    }

    #[test]
    fn test_equality_is_case_sensitive() {
        assert_ne!(DocumentPath::from("/A"), DocumentPath::from("/a"));
        assert_ne!(DocumentPath::from("/a/b"), DocumentPath::from("/b/a"));
    }

    #[test]
    fn test_parent_and_child() {
        let dir = DocumentPath::from("/dir1");
        let doc = dir.child("doc");
        assert_eq!(doc.parent(), Some(dir.clone()));
        assert_eq!(dir.parent(), Some(DocumentPath::root()));
        assert_eq!(DocumentPath::root().parent(), None);
        assert_eq!(doc.name(), Some("doc"));
    }
}

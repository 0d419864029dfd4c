use std::fmt;

use crate::libs::error::{AnyResult, CloudFsError};

/// A slash-delimited path into a remote store, split into its components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    components: Vec<String>,
}

impl VirtualPath {
    /**
     * Split `path` on `/`. A leading slash is dropped and a single trailing
     * slash is tolerated; any other empty component is malformed.
     */
    pub fn parse(path: &str) -> AnyResult<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if components.iter().any(String::is_empty) {
            return Err(CloudFsError::Path(format!(
                "empty component in path '{}'",
                path
            )));
        }
        Ok(Self { components })
    }

    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Everything but the last component; the root is its own parent
    pub fn parent(&self) -> VirtualPath {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }

    pub fn join(&self, name: &str) -> AnyResult<VirtualPath> {
        let child = VirtualPath::parse(name)?;
        let mut components = self.components.clone();
        components.extend(child.components);
        Ok(Self { components })
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("/a/b/c", vec!["a", "b", "c"])]
    #[case("a/b", vec!["a", "b"])]
    #[case("/a/b/", vec!["a", "b"])]
    #[case("/", vec![])]
    #[case("", vec![])]
    fn splits_components(#[case] path: &str, #[case] expected: Vec<&str>) {
        let parsed = VirtualPath::parse(path).unwrap();
        assert_eq!(parsed.components(), expected.as_slice());
    }

    #[rstest]
    #[case("/a//b")]
    #[case("//a")]
    #[case("/a/b//")]
    fn rejects_empty_components(#[case] path: &str) {
        assert!(matches!(
            VirtualPath::parse(path),
            Err(CloudFsError::Path(_))
        ));
    }

    #[rstest]
    fn parent_and_name() {
        let path = VirtualPath::parse("/backups/2024/db.sql").unwrap();
        assert_eq!(path.file_name(), Some("db.sql"));
        assert_eq!(path.parent().to_string(), "/backups/2024");
        assert!(VirtualPath::root().parent().is_root());
    }

    #[rstest]
    fn join_appends() {
        let path = VirtualPath::parse("/a").unwrap().join("b/c").unwrap();
        assert_eq!(path.to_string(), "/a/b/c");
    }
}

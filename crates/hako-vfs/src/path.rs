//! Object key arithmetic.
//!
//! Paths inside the VFS are slash-separated, relative to the session root,
//! with no leading or trailing separator. The root is the empty string.

/// Key separator used by the store's delimited listing.
pub const DELIMITER: char = '/';

/// Normalize a protocol path: drop the leading `/`, empty and `.` segments,
/// and resolve `..` without climbing above the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(DELIMITER) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Returns true if `path` names the session root.
pub fn is_root(path: &str) -> bool {
    path.is_empty()
}

/// Key of the marker object representing directory `dir`.
pub fn marker_key(dir: &str) -> String {
    format!("{dir}{DELIMITER}")
}

/// Listing prefix for directory `dir`; empty for the root.
pub fn list_prefix(dir: &str) -> String {
    if is_root(dir) {
        String::new()
    } else {
        marker_key(dir)
    }
}

/// Ancestor directories of `path`, root-most first, immediate parent last.
///
/// The root itself is never included.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices(DELIMITER)
        .map(|(idx, _)| &path[..idx])
        .filter(|dir| !dir.is_empty())
        .collect()
}

/// Last segment of `path`, used as the display name of a stat result.
pub fn file_name(path: &str) -> &str {
    path.rsplit(DELIMITER).next().unwrap_or(path)
}

/// Absolute protocol form of a normalized path.
pub fn to_absolute(path: &str) -> String {
    format!("{DELIMITER}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b/c.txt"), "a/b/c.txt");
        assert_eq!(normalize("a//b/"), "a/b");
        assert_eq!(normalize("/a/./b/../c"), "a/c");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_stays_inside_root() {
        assert_eq!(normalize("/../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize(".."), "");
    }

    #[test]
    fn test_ancestors_root_most_first() {
        assert_eq!(ancestors("a/b/c.txt"), vec!["a", "a/b"]);
        assert_eq!(ancestors("top.txt"), Vec::<&str>::new());
        assert_eq!(ancestors(""), Vec::<&str>::new());
    }

    #[test]
    fn test_prefixes_and_markers() {
        assert_eq!(marker_key("a/b"), "a/b/");
        assert_eq!(list_prefix("a"), "a/");
        assert_eq!(list_prefix(""), "");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
        assert_eq!(to_absolute("a/b"), "/a/b");
    }
}

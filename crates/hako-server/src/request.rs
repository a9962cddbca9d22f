//! Typed file-operation requests.
//!
//! Every request the protocol layer can issue is one variant of [`Method`].
//! The session adapter matches on these exhaustively, so a new kind cannot
//! fall through to a default arm unnoticed.

use std::str::FromStr;

use hako_vfs::{VfsError, VfsResult, path};
use strum::{Display, EnumString};

/// `Filecmd` sub-kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FileCmd {
    Setstat,
    Rename,
    Remove,
    Mkdir,
    Rmdir,
    Symlink,
    Link,
}

/// `Filelist` sub-kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FileList {
    List,
    Stat,
    Readlink,
}

/// Request kind and sub-kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Open for reading.
    Get,
    /// Open for writing.
    Put,
    Cmd(FileCmd),
    List(FileList),
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("Get"),
            Method::Put => f.write_str("Put"),
            Method::Cmd(cmd) => write!(f, "{cmd}"),
            Method::List(list) => write!(f, "{list}"),
        }
    }
}

impl FromStr for Method {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Get" => Ok(Method::Get),
            "Put" => Ok(Method::Put),
            other => FileCmd::from_str(other)
                .map(Method::Cmd)
                .or_else(|_| FileList::from_str(other).map(Method::List))
                .map_err(|_| VfsError::unsupported(format!("request method {other}"))),
        }
    }
}

/// One file-operation request as handed over by the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path as sent by the client, relative to the session root.
    pub filepath: String,
    /// Second path for rename, symlink, and link.
    pub target: Option<String>,
}

impl Request {
    pub fn new(method: Method, filepath: impl Into<String>) -> Self {
        Self {
            method,
            filepath: filepath.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Store-relative form of [`filepath`](Self::filepath).
    pub fn path(&self) -> String {
        path::normalize(&self.filepath)
    }

    /// Store-relative form of [`target`](Self::target).
    pub fn target_path(&self) -> VfsResult<String> {
        self.target
            .as_deref()
            .map(path::normalize)
            .ok_or_else(|| VfsError::precondition(format!("{} without a target path", self.method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for method in [
            Method::Get,
            Method::Put,
            Method::Cmd(FileCmd::Rename),
            Method::Cmd(FileCmd::Setstat),
            Method::List(FileList::Readlink),
        ] {
            assert_eq!(method.to_string().parse::<Method>().unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        let err = "Chmod".parse::<Method>().unwrap_err();
        assert!(matches!(err, VfsError::Unsupported(_)));
    }

    #[test]
    fn test_paths_are_normalized() {
        let req = Request::new(Method::Cmd(FileCmd::Rename), "/a/b.txt").with_target("/c/d.txt");
        assert_eq!(req.path(), "a/b.txt");
        assert_eq!(req.target_path().unwrap(), "c/d.txt");
    }

    #[test]
    fn test_missing_target() {
        let req = Request::new(Method::Cmd(FileCmd::Rename), "/a");
        assert!(matches!(
            req.target_path(),
            Err(VfsError::PreconditionViolation(_))
        ));
    }
}

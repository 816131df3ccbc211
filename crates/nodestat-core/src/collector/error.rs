//! Error type shared by every collector.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::ParseError;

/// Why a collector could not contribute to a scrape.
#[derive(Debug)]
pub enum CollectError {
    /// A kernel interface could not be opened or read.
    DataSourceUnavailable { path: PathBuf, source: io::Error },
    /// The data was readable but did not have the expected shape.
    MalformedData(String),
}

impl CollectError {
    pub fn unavailable(path: impl AsRef<Path>, source: io::Error) -> Self {
        CollectError::DataSourceUnavailable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        CollectError::MalformedData(msg.into())
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::DataSourceUnavailable { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            CollectError::MalformedData(msg) => write!(f, "malformed data: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::DataSourceUnavailable { source, .. } => Some(source),
            CollectError::MalformedData(_) => None,
        }
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::MalformedData(e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        let err = CollectError::unavailable(
            "/proc/stat",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "failed to read /proc/stat: gone");
        assert!(err.source().is_some());

        let err: CollectError = ParseError::new("bad line").into();
        assert_eq!(err.to_string(), "malformed data: bad line");
        assert!(err.source().is_none());
    }
}

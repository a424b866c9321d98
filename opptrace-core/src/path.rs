//! Path addressing for automation configs
//!
//! A path is a `/`-delimited address into an automation or script config,
//! alternating structural keys and list indices:
//!
//! ```text
//! action/2/choose/0/sequence/1
//! ^^^^^^ ^ ^^^^^^ ^ ^^^^^^^^ ^
//!  key  idx  key idx   key  idx
//! ```
//!
//! Trace steps are keyed by these same strings, which is how a step is tied
//! back to the config node that produced it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Top-level key holding the triggers of an automation.
pub const TRIGGER: &str = "trigger";
/// Top-level key holding the conditions of an automation.
pub const CONDITION: &str = "condition";
/// Top-level key holding the actions of an automation.
pub const ACTION: &str = "action";
/// Top-level key holding the actions of a script.
pub const SEQUENCE: &str = "sequence";

/// True iff `path` addresses a trigger (`trigger` or `trigger/...`).
pub fn is_trigger_path(path: &str) -> bool {
    path == TRIGGER || path.starts_with("trigger/")
}

/// One segment of a [`TracePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Field name on an object
    Key(String),
    /// Position in a list
    Index(usize),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(index) => Segment::Index(index),
            Err(_) => Segment::Key(raw.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A parsed config address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TracePath {
    segments: Vec<Segment>,
}

impl TracePath {
    /// Parse a path string, rejecting empty paths and empty segments.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "path is empty".to_string(),
            });
        }

        let segments = path
            .split('/')
            .map(|raw| {
                if raw.is_empty() {
                    Err(Error::InvalidPath {
                        path: path.to_string(),
                        reason: "empty segment".to_string(),
                    })
                } else {
                    Ok(Segment::parse(raw))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// Path consisting of a single key.
    pub fn key(key: &str) -> Self {
        Self {
            segments: vec![Segment::Key(key.to_string())],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The top-level key, e.g. `action` for `action/2/sequence/0`.
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.root() == Some(TRIGGER)
    }

    /// The address one segment up, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child_key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self { segments }
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True if `self` is `other` or lies underneath it.
    pub fn starts_with(&self, other: &TracePath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for TracePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for TracePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_trigger_path() {
        assert!(is_trigger_path("trigger"));
        assert!(is_trigger_path("trigger/0"));
        assert!(!is_trigger_path("triggers"));
        assert!(!is_trigger_path("trigger_0"));
        assert!(!is_trigger_path("action/0"));
        assert!(!is_trigger_path(""));
    }

    #[test]
    fn test_parse_segments() {
        let path = TracePath::parse("action/2/choose/0/sequence/1").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("action".into()),
                Segment::Index(2),
                Segment::Key("choose".into()),
                Segment::Index(0),
                Segment::Key("sequence".into()),
                Segment::Index(1),
            ]
        );
        assert_eq!(path.root(), Some("action"));
        assert_eq!(path.to_string(), "action/2/choose/0/sequence/1");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(TracePath::parse("").is_err());
        assert!(TracePath::parse("action//0").is_err());
        assert!(TracePath::parse("action/0/").is_err());
    }

    #[test]
    fn test_negative_index_is_a_key() {
        let path = TracePath::parse("action/-1").unwrap();
        assert_eq!(path.segments()[1], Segment::Key("-1".into()));
    }

    #[test]
    fn test_parent_and_children() {
        let path = TracePath::parse("action/1").unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "action");
        assert!(TracePath::key("action").parent().is_none());

        let child = path.child_key("sequence").child_index(3);
        assert_eq!(child.to_string(), "action/1/sequence/3");
        assert!(child.starts_with(&path));
        assert!(!path.starts_with(&child));
        assert_eq!(child.depth(), 4);
    }
}

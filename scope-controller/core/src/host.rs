use std::{borrow::Borrow, fmt, sync::Arc};

/// A DNS-like hostname, optionally carrying a single leading `*` label.
///
/// Names are cheap to clone so that services, routing rules, and scope indexes may share them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

// === impl Name ===

impl Name {
    /// The wildcard that matches every hostname.
    pub const WILDCARD: &'static str = "*";

    pub fn wildcard() -> Self {
        Self::from(Self::WILDCARD)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.0.starts_with('*')
    }

    /// Returns true if `candidate` is selected by this name when it is used as a pattern.
    ///
    /// A concrete pattern matches only an identical name. A wildcard pattern (`*.suffix`) matches
    /// any name ending in `.suffix`; when the candidate is itself a wildcard, its suffix must fall
    /// within the pattern's. The bare wildcard `*` matches everything.
    pub fn matches(&self, candidate: &Self) -> bool {
        match self.0.strip_prefix('*') {
            Some(suffix) => match candidate.0.strip_prefix('*') {
                Some(candidate_suffix) => candidate_suffix.ends_with(suffix),
                None => candidate.0.ends_with(suffix),
            },
            None => self.0 == candidate.0,
        }
    }

    /// Returns true if some hostname could be selected by both names.
    ///
    /// Unlike [`Name::matches`], either side may be a wildcard: a concrete name overlaps a
    /// wildcard it falls within, and two wildcards overlap when one suffix contains the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self.0.strip_prefix('*'), other.0.strip_prefix('*')) {
            (Some(a), Some(b)) if a.len() < b.len() => b.ends_with(a),
            (Some(a), Some(b)) => a.ends_with(b),
            (Some(suffix), None) => other.0.ends_with(suffix),
            (None, Some(suffix)) => self.0.ends_with(suffix),
            (None, None) => self.0 == other.0,
        }
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self(name.into())
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Self(name.into())
    }
}

impl Borrow<str> for Name {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

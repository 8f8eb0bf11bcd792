//! Substrate Resource Locators
//!
//! Every stored lineage is addressed by an SRL: `srl://realm/a/b@3`. The
//! realm partitions keys, the path segments name the substrate, and the
//! optional `@version` suffix pins a revision. Without a suffix the SRL
//! refers to the head of the lineage.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// URI scheme prefix for substrate locators.
pub const SRL_SCHEME: &str = "srl://";

/// A 1-based version number within a lineage
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The first version of any lineage
    pub const FIRST: Self = Self(1);

    /// Create a version number (versions start at 1)
    #[inline]
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The raw number
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The following version
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Which revision of a lineage an SRL refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum Revision {
    /// The newest version
    #[default]
    Head,
    /// A pinned version
    At(Version),
}

/// A parsed substrate resource locator
///
/// `realm` is lowercase alphanumeric plus `-`/`_`; path segments also allow
/// `.`. At least one segment is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Srl {
    realm: String,
    segments: Vec<String>,
    revision: Revision,
}

impl Srl {
    /// Create a head-revision SRL from parts
    ///
    /// # Errors
    /// Returns an error if the realm or any segment is invalid
    pub fn new(
        realm: impl Into<String>,
        segments: Vec<String>,
    ) -> Result<Self, SrlError> {
        let realm = realm.into();
        validate_realm(&realm)?;
        if segments.is_empty() {
            return Err(SrlError::MissingSegments);
        }
        for seg in &segments {
            validate_segment(seg)?;
        }
        Ok(Self {
            realm,
            segments,
            revision: Revision::Head,
        })
    }

    /// The realm
    #[inline]
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The revision this SRL pins, head if none
    #[inline]
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// The same locator pinned to `version`
    #[must_use]
    pub fn at(&self, version: Version) -> Self {
        Self {
            revision: Revision::At(version),
            ..self.clone()
        }
    }

    /// The same locator pointing at the head
    #[must_use]
    pub fn head(&self) -> Self {
        Self {
            revision: Revision::Head,
            ..self.clone()
        }
    }

    /// The revision-free storage key: `realm/a/b`
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut key = String::with_capacity(
            self.realm.len() + self.segments.iter().map(|s| s.len() + 1).sum::<usize>(),
        );
        key.push_str(&self.realm);
        for seg in &self.segments {
            key.push('/');
            key.push_str(seg);
        }
        key
    }
}

fn validate_realm(realm: &str) -> Result<(), SrlError> {
    if realm.is_empty() {
        return Err(SrlError::EmptyRealm);
    }
    let ok = realm
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SrlError::InvalidRealm(realm.to_string()))
    }
}

fn validate_segment(seg: &str) -> Result<(), SrlError> {
    if seg.is_empty() {
        return Err(SrlError::EmptySegment);
    }
    let ok = seg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(SrlError::InvalidSegment(seg.to_string()))
    }
}

impl Display for Srl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{SRL_SCHEME}{}", self.canonical_key())?;
        if let Revision::At(v) = self.revision {
            write!(f, "@{}", v.get())?;
        }
        Ok(())
    }
}

impl FromStr for Srl {
    type Err = SrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SRL_SCHEME)
            .ok_or_else(|| SrlError::MissingScheme(s.to_string()))?;

        let (path, revision) = match rest.rsplit_once('@') {
            Some((path, rev)) => {
                let n: u64 = rev
                    .parse()
                    .map_err(|_| SrlError::InvalidRevision(rev.to_string()))?;
                if n == 0 {
                    return Err(SrlError::InvalidRevision(rev.to_string()));
                }
                (path, Revision::At(Version::new(n)))
            }
            None => (rest, Revision::Head),
        };

        let mut parts = path.split('/');
        let realm = parts.next().unwrap_or_default().to_string();
        let segments: Vec<String> = parts.map(str::to_string).collect();

        let mut srl = Self::new(realm, segments)?;
        srl.revision = revision;
        Ok(srl)
    }
}

impl serde::Serialize for Srl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Srl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors from SRL parsing and construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SrlError {
    /// The `srl://` prefix was absent
    #[error("missing srl:// scheme in '{0}'")]
    MissingScheme(String),

    /// Empty realm component
    #[error("srl has an empty realm")]
    EmptyRealm,

    /// Realm with invalid characters
    #[error("invalid realm '{0}' (lowercase alphanumeric, '-', '_')")]
    InvalidRealm(String),

    /// No path segments after the realm
    #[error("srl needs at least one path segment")]
    MissingSegments,

    /// Empty path segment
    #[error("srl contains an empty path segment")]
    EmptySegment,

    /// Segment with invalid characters
    #[error("invalid segment '{0}' (alphanumeric, '-', '_', '.')")]
    InvalidSegment(String),

    /// Revision suffix that is not a positive integer
    #[error("invalid revision '{0}' (positive integer required)")]
    InvalidRevision(String),
}

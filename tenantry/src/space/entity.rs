use crate::err::TenancyErr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

pub type Labels = BTreeMap<String, String>;

pub const SEGMENT_DELIM: char = '/';

/// Hierarchical path identifying an entity: `org/namespace` for a
/// [`crate::space::Namespace`] and `org/namespace/app` for a [`crate::space::App`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn namespace<O, N>(org: O, name: N) -> Self
    where
        O: AsRef<str>,
        N: AsRef<str>,
    {
        Self(format!("{}{}{}", org.as_ref(), SEGMENT_DELIM, name.as_ref()))
    }

    pub fn app<O, N, A>(org: O, namespace: N, name: A) -> Self
    where
        O: AsRef<str>,
        N: AsRef<str>,
        A: AsRef<str>,
    {
        Self::namespace(org, namespace).push(name)
    }

    pub fn push<S>(&self, segment: S) -> Self
    where
        S: AsRef<str>,
    {
        Self(format!("{}{}{}", self.0, SEGMENT_DELIM, segment.as_ref()))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEGMENT_DELIM)
    }

    pub fn org(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    pub fn last_segment(&self) -> &str {
        self.0
            .rsplit_once(SEGMENT_DELIM)
            .map(|(_, last)| last)
            .unwrap_or(self.0.as_str())
    }

    /// the path with its last segment removed.  For an app this is the id of
    /// the owning namespace.
    pub fn parent_path(&self) -> Option<EntityId> {
        self.0
            .rsplit_once(SEGMENT_DELIM)
            .map(|(parent, _)| EntityId(parent.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Deref for EntityId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
pub enum EntityKind {
    Namespace,
    App,
}

/// org, namespace and app names become path segments of an [`EntityId`] so they
/// may neither be empty nor contain the segment delimiter.
pub fn validate_segment<S>(what: &'static str, segment: S) -> Result<(), TenancyErr>
where
    S: AsRef<str>,
{
    let segment = segment.as_ref();
    if segment.trim().is_empty() {
        return Err(TenancyErr::invalid(format!("{} name must not be empty", what)));
    }
    if segment.contains(SEGMENT_DELIM) {
        return Err(TenancyErr::invalid(format!(
            "{} name '{}' must not contain '{}'",
            what, segment, SEGMENT_DELIM
        )));
    }
    Ok(())
}

#[cfg(test)]
pub mod test {
    use crate::space::entity::{validate_segment, EntityId};

    #[test]
    pub fn test_ids() {
        let namespace = EntityId::namespace("acme", "default");
        assert_eq!(namespace.as_str(), "acme/default");
        assert_eq!(namespace.org(), "acme");
        assert_eq!(namespace.last_segment(), "default");

        let app = EntityId::app("acme", "default", "billing");
        assert_eq!(app.as_str(), "acme/default/billing");
        assert_eq!(app.org(), "acme");
        assert_eq!(app.last_segment(), "billing");
        assert_eq!(app.parent_path(), Some(namespace));
    }

    #[test]
    pub fn test_segments() {
        assert!(validate_segment("namespace", "dev").is_ok());
        assert!(validate_segment("namespace", "").is_err());
        assert!(validate_segment("namespace", "  ").is_err());
        assert!(validate_segment("app", "a/b").is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// a quota change as requested by a caller: resource names are not yet
/// validated against the supported [`ResourceKind`]s.
pub type QuotaRequest = BTreeMap<String, f64>;

/// The closed set of resources a quota may be assigned for.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
pub enum ResourceKind {
    #[strum(serialize = "mem")]
    #[serde(rename = "mem")]
    Mem,
    #[strum(serialize = "cpu")]
    #[serde(rename = "cpu")]
    Cpu,
    #[strum(serialize = "disk")]
    #[serde(rename = "disk")]
    Disk,
}

impl ResourceKind {
    pub fn all() -> impl Iterator<Item = ResourceKind> {
        ResourceKind::iter()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Quantity per [`ResourceKind`].  A kind that is absent holds no quota at all
/// which reads as `0.0` through [`ResourceQuotas::get`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceQuotas(BTreeMap<ResourceKind, f64>);

impl ResourceQuotas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResourceKind, quota: f64) -> Self {
        self.set(kind, quota);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or_default()
    }

    pub fn quota(&self, kind: ResourceKind) -> Option<f64> {
        self.0.get(&kind).copied()
    }

    pub fn set(&mut self, kind: ResourceKind, quota: f64) {
        self.0.insert(kind, quota);
    }

    /// overwrite the kinds present in `other`, kinds `other` does not mention
    /// are left untouched
    pub fn merge(&mut self, other: &ResourceQuotas) {
        for (kind, quota) in other.iter() {
            self.set(kind, quota);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, f64)> + '_ {
        self.0.iter().map(|(kind, quota)| (*kind, *quota))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.0.keys().copied()
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_request(&self) -> QuotaRequest {
        self.iter()
            .map(|(kind, quota)| (kind.to_string(), quota))
            .collect()
    }
}

impl FromIterator<(ResourceKind, f64)> for ResourceQuotas {
    fn from_iter<T: IntoIterator<Item = (ResourceKind, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

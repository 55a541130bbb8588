use crate::registry::err::RegErr;
use crate::space::{EntityId, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TenancyErr {
    #[error("'{0}' not found")]
    NotFound(EntityId),
    #[error("'{0}' already exists")]
    AlreadyExists(EntityId),
    #[error("quotas for a resource with name '{kind}' are not supported")]
    UnsupportedResourceKind { kind: String },
    #[error("requested {requested} quota for the resource '{kind}', but quotas must not be negative")]
    NegativeQuota { kind: ResourceKind, requested: f64 },
    #[error("requested {requested} quota for the resource '{kind}', but quotas must be finite numbers")]
    NonFiniteQuota { kind: ResourceKind, requested: f64 },
    #[error("requested {requested} quota for the resource '{kind}' of '{id}', but only {available} available in parent")]
    ExceedsParentCapacity {
        id: EntityId,
        kind: ResourceKind,
        requested: f64,
        available: f64,
    },
    #[error("requested {requested} quota for the resource '{kind}' of '{id}', but {utilized} already utilized by its children")]
    BelowChildUtilization {
        id: EntityId,
        kind: ResourceKind,
        requested: f64,
        utilized: f64,
    },
    #[error("'{id}' must not have applications or child namespaces (has {namespaces} child namespaces and {apps} applications)")]
    NonEmptySubtree {
        id: EntityId,
        namespaces: usize,
        apps: usize,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] RegErr),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    #[error("{service} service failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },
}

impl TenancyErr {
    pub fn not_found(id: &EntityId) -> Self {
        Self::NotFound(id.clone())
    }

    pub fn already_exists(id: &EntityId) -> Self {
        Self::AlreadyExists(id.clone())
    }

    pub fn invalid<M>(msg: M) -> Self
    where
        M: ToString,
    {
        Self::InvalidArgument(msg.to_string())
    }

    /// every store failure, `NotFound` included, surfaces as [`TenancyErr::StoreUnavailable`].
    /// Used where a lookup failure must never be mistaken for an absent record.
    pub fn store(err: RegErr) -> Self {
        Self::StoreUnavailable(err)
    }

    pub fn collaborator<M>(service: &'static str, msg: M) -> Self
    where
        M: ToString,
    {
        Self::Collaborator {
            service,
            message: msg.to_string(),
        }
    }

    /// client correctable: retrying the same request cannot succeed
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AlreadyExists(_)
                | Self::UnsupportedResourceKind { .. }
                | Self::NegativeQuota { .. }
                | Self::NonFiniteQuota { .. }
                | Self::ExceedsParentCapacity { .. }
                | Self::BelowChildUtilization { .. }
                | Self::NonEmptySubtree { .. }
                | Self::InvalidArgument(_)
        )
    }

    /// the caller may retry, the failure was in the store or a sibling service
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::DeadlineExceeded | Self::Collaborator { .. }
        )
    }
}

impl From<RegErr> for TenancyErr {
    fn from(err: RegErr) -> Self {
        match err {
            RegErr::NotFound(id) => Self::NotFound(id),
            RegErr::Dupe(id) => Self::AlreadyExists(id),
            err => Self::StoreUnavailable(err),
        }
    }
}

//! Quota arithmetic.  Pure functions over [`ResourceQuotas`], no I/O.
//!
//! * **total** is an entity's own assigned quota
//! * **available** is total minus the sum of the direct children's totals
//! * **utilized** is total minus available

use crate::err::TenancyErr;
use crate::space::{EntityId, QuotaRequest, ResourceKind, ResourceQuotas};
use std::str::FromStr;

pub mod store;

/// available capacity of every supported kind.  A kind absent from `total`
/// counts as zero, so children holding a kind the parent lacks yield a
/// negative figure.  The result is never clamped.
pub fn compute_available<'a, I>(total: &ResourceQuotas, children: I) -> ResourceQuotas
where
    I: IntoIterator<Item = &'a ResourceQuotas>,
{
    let mut available: ResourceQuotas = ResourceKind::all()
        .map(|kind| (kind, total.get(kind)))
        .collect();
    for child in children {
        for (kind, quota) in child.iter() {
            available.set(kind, available.get(kind) - quota);
        }
    }
    available
}

pub fn compute_utilized(total: &ResourceQuotas, available: &ResourceQuotas) -> ResourceQuotas {
    let mut kinds: Vec<ResourceKind> = total.kinds().chain(available.kinds()).collect();
    kinds.sort();
    kinds.dedup();
    kinds
        .into_iter()
        .map(|kind| (kind, total.get(kind) - available.get(kind)))
        .collect()
}

/// Why a quota request was refused.  Carries the numbers, not the entity:
/// [`Rejection::into_err`] attaches the id.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnsupportedResourceKind {
        kind: String,
    },
    NegativeQuota {
        kind: ResourceKind,
        requested: f64,
    },
    NonFiniteQuota {
        kind: ResourceKind,
        requested: f64,
    },
    ExceedsParentCapacity {
        kind: ResourceKind,
        requested: f64,
        available: f64,
    },
    BelowChildUtilization {
        kind: ResourceKind,
        requested: f64,
        utilized: f64,
    },
}

impl Rejection {
    pub fn into_err(self, id: &EntityId) -> TenancyErr {
        match self {
            Rejection::UnsupportedResourceKind { kind } => {
                TenancyErr::UnsupportedResourceKind { kind }
            }
            Rejection::NegativeQuota { kind, requested } => {
                TenancyErr::NegativeQuota { kind, requested }
            }
            Rejection::NonFiniteQuota { kind, requested } => {
                TenancyErr::NonFiniteQuota { kind, requested }
            }
            Rejection::ExceedsParentCapacity {
                kind,
                requested,
                available,
            } => TenancyErr::ExceedsParentCapacity {
                id: id.clone(),
                kind,
                requested,
                available,
            },
            Rejection::BelowChildUtilization {
                kind,
                requested,
                utilized,
            } => TenancyErr::BelowChildUtilization {
                id: id.clone(),
                kind,
                requested,
                utilized,
            },
        }
    }
}

/// parse request keys into [`ResourceKind`]s, rejecting unknown kinds as well
/// as NaN, infinite and negative quantities.
pub fn parse_request(requested: &QuotaRequest) -> Result<ResourceQuotas, Rejection> {
    requested
        .iter()
        .map(|(kind, quota)| {
            let kind = ResourceKind::from_str(kind.as_str())
                .map_err(|_| Rejection::UnsupportedResourceKind { kind: kind.clone() })?;
            if !quota.is_finite() {
                return Err(Rejection::NonFiniteQuota {
                    kind,
                    requested: *quota,
                });
            }
            if *quota < 0.0 {
                return Err(Rejection::NegativeQuota {
                    kind,
                    requested: *quota,
                });
            }
            Ok((kind, *quota))
        })
        .collect()
}

/// Admit or refuse `requested` for an entity.  Every kind in the request is
/// checked in order: supported, non negative, within what the parent can
/// spare plus what the entity already holds, not below what the entity's
/// children already hold.  `parent_available` is `None` for a root, which
/// skips the parent capacity check.
///
/// On success the parsed quotas are returned, ready to be persisted.
pub fn validate_admission(
    requested: &QuotaRequest,
    parent_available: Option<&ResourceQuotas>,
    self_total: &ResourceQuotas,
    self_utilized: &ResourceQuotas,
) -> Result<ResourceQuotas, Rejection> {
    let admitted = parse_request(requested)?;
    for (kind, quota) in admitted.iter() {
        if let Some(parent_available) = parent_available {
            let capacity = parent_available.get(kind) + self_total.get(kind);
            if quota > capacity {
                return Err(Rejection::ExceedsParentCapacity {
                    kind,
                    requested: quota,
                    available: capacity,
                });
            }
        }
        let utilized = self_utilized.get(kind);
        if quota < utilized {
            return Err(Rejection::BelowChildUtilization {
                kind,
                requested: quota,
                utilized,
            });
        }
    }
    Ok(admitted)
}

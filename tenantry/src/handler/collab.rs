//! Sibling services the handler talks to.  Each is a narrow async trait so
//! the transport behind it is the caller's choice.

use crate::space::{ProfileDefinition, SeccompProfile, SyscallRule};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub type NodeId = String;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CollabErr {
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Msg(String),
}

impl CollabErr {
    pub fn msg<M>(msg: M) -> Self
    where
        M: ToString,
    {
        Self::Msg(msg.to_string())
    }
}

#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn define<'a>(
        &'a self,
        profile: &'a SeccompProfile,
        definition: &'a ProfileDefinition,
    ) -> Result<(), CollabErr>;

    /// define `profile` as `base` with `syscalls` layered on top
    async fn extend<'a>(
        &'a self,
        base: &'a SeccompProfile,
        profile: &'a SeccompProfile,
        syscalls: &'a [SyscallRule],
    ) -> Result<(), CollabErr>;

    async fn get<'a>(&'a self, profile: &'a SeccompProfile) -> Result<ProfileDefinition, CollabErr>;
}

/// A resource as the authorization service knows it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthResource {
    pub id: String,
    pub kind: String,
}

impl AuthResource {
    pub fn org<S: ToString>(org: S) -> Self {
        Self {
            id: org.to_string(),
            kind: "org".to_string(),
        }
    }

    pub fn namespace<S: ToString>(id: S) -> Self {
        Self {
            id: id.to_string(),
            kind: "namespace".to_string(),
        }
    }
}

#[async_trait]
pub trait Administrator: Send + Sync {
    /// record that `to` inherits the permissions granted on `from`
    async fn create_inheritance<'a>(
        &'a self,
        from: &'a AuthResource,
        to: &'a AuthResource,
    ) -> Result<(), CollabErr>;
}

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn org_nodes<'a>(&'a self, org: &'a str) -> Result<Vec<NodeId>, CollabErr>;
}

#[async_trait]
pub trait Disseminator: Send + Sync {
    async fn disseminate<'a>(&'a self, node: &'a NodeId, config: &'a [u8]) -> Result<(), CollabErr>;
}

/// Profile service kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryProfiles {
    profiles: Arc<DashMap<SeccompProfile, ProfileDefinition>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileService for MemoryProfiles {
    async fn define<'a>(
        &'a self,
        profile: &'a SeccompProfile,
        definition: &'a ProfileDefinition,
    ) -> Result<(), CollabErr> {
        self.profiles.insert(profile.clone(), definition.clone());
        Ok(())
    }

    async fn extend<'a>(
        &'a self,
        base: &'a SeccompProfile,
        profile: &'a SeccompProfile,
        syscalls: &'a [SyscallRule],
    ) -> Result<(), CollabErr> {
        let mut definition = self
            .profiles
            .get(base)
            .map(|definition| definition.value().clone())
            .ok_or_else(|| CollabErr::NotFound(base.name.clone()))?;
        definition.syscalls.extend(syscalls.iter().cloned());
        self.profiles.insert(profile.clone(), definition);
        Ok(())
    }

    async fn get<'a>(&'a self, profile: &'a SeccompProfile) -> Result<ProfileDefinition, CollabErr> {
        self.profiles
            .get(profile)
            .map(|definition| definition.value().clone())
            .ok_or_else(|| CollabErr::NotFound(profile.name.clone()))
    }
}

/// `percentage`% of `nodes`, rounded up, picked at random without repeats
pub fn select_random_nodes<T>(mut nodes: Vec<T>, percentage: u8) -> Vec<T> {
    let count = (nodes.len() as f64 * f64::from(percentage) / 100.0).ceil() as usize;
    nodes.shuffle(&mut rand::rng());
    nodes.truncate(count.min(nodes.len()));
    nodes
}

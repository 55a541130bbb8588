use crate::space::EntityId;
#[cfg(feature = "postgres")]
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RegErr {
    #[error("entity already registered: '{0}'")]
    Dupe(EntityId),
    #[error("entity not found: '{0}'")]
    NotFound(EntityId),
    #[error("'{child}' already has a parent, cannot attach it to '{parent}'")]
    EdgeConflict { parent: EntityId, child: EntityId },
    #[error("attaching '{child}' to '{parent}' would create a cycle")]
    Cycle { parent: EntityId, child: EntityId },
    #[error("entity '{0}' has more than one parent")]
    MultipleParents(EntityId),
    #[error("cannot write within a read only transaction")]
    ReadOnly,
    #[error("entity '{id}' registry error: {message}")]
    Corrupt { id: EntityId, message: String },
    #[error("{0}")]
    Msg(String),

    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    SqlxErr(#[from] Arc<sqlx::Error>),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RegErr {
    fn from(value: sqlx::Error) -> Self {
        RegErr::SqlxErr(Arc::new(value))
    }
}

impl From<&str> for RegErr {
    fn from(err: &str) -> Self {
        Self::Msg(err.to_string())
    }
}

impl RegErr {
    pub fn dupe(id: &EntityId) -> Self {
        Self::Dupe(id.clone())
    }

    pub fn not_found(id: &EntityId) -> Self {
        Self::NotFound(id.clone())
    }

    pub fn corrupt<M>(id: &EntityId, message: M) -> Self
    where
        M: ToString,
    {
        Self::Corrupt {
            id: id.clone(),
            message: message.to_string(),
        }
    }

    pub fn msg<M>(msg: M) -> RegErr
    where
        M: ToString,
    {
        Self::Msg(msg.to_string())
    }
}

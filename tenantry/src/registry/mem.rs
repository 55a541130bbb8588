use crate::registry::err::RegErr;
use crate::registry::{Direction, EntityRecord, RegistryApi, RegistryTxn, TxMode};
use crate::space::{EntityId, ResourceQuotas};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Clone, Default)]
pub struct MemoryGraph {
    pub entities: HashMap<EntityId, EntityRecord>,
    /// `(parent, child)`
    pub edges: BTreeSet<(EntityId, EntityId)>,
}

impl MemoryGraph {
    fn related(&self, id: &EntityId, direction: Direction) -> Vec<EntityRecord> {
        self.edges
            .iter()
            .filter_map(|(parent, child)| match direction {
                Direction::Children if parent == id => Some(child),
                Direction::Parent if child == id => Some(parent),
                _ => None,
            })
            .filter_map(|related| self.entities.get(related).cloned())
            .collect()
    }

    fn is_ancestor(&self, candidate: &EntityId, of: &EntityId) -> bool {
        let mut current = of.clone();
        loop {
            let parent = self
                .edges
                .iter()
                .find(|(_, child)| *child == current)
                .map(|(parent, _)| parent.clone());
            match parent {
                Some(parent) if parent == *candidate => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}

/// Registry held entirely in process memory.
///
/// Write transactions hold the graph's write lock from `begin` until they
/// are committed or dropped and mutate a private copy of the graph, so a
/// write is never observed half done and two writers never interleave.
#[derive(Clone)]
pub struct MemoryRegistry {
    graph: Arc<RwLock<MemoryGraph>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(RwLock::new(MemoryGraph::default())),
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryApi for MemoryRegistry {
    async fn begin<'a>(&'a self, mode: TxMode) -> Result<Box<dyn RegistryTxn>, RegErr> {
        let txn = match mode {
            TxMode::Read => MemoryTxn::Read(self.graph.clone().read_owned().await),
            TxMode::Write => {
                let guard = self.graph.clone().write_owned().await;
                let working = guard.clone();
                MemoryTxn::Write { guard, working }
            }
        };
        Ok(Box::new(txn))
    }

    async fn scorch<'a>(&'a self) -> Result<(), RegErr> {
        let mut graph = self.graph.write().await;
        *graph = MemoryGraph::default();
        Ok(())
    }
}

pub enum MemoryTxn {
    Read(OwnedRwLockReadGuard<MemoryGraph>),
    Write {
        guard: OwnedRwLockWriteGuard<MemoryGraph>,
        working: MemoryGraph,
    },
}

impl MemoryTxn {
    fn graph(&self) -> &MemoryGraph {
        match self {
            MemoryTxn::Read(guard) => guard,
            MemoryTxn::Write { working, .. } => working,
        }
    }

    fn graph_mut(&mut self) -> Result<&mut MemoryGraph, RegErr> {
        match self {
            MemoryTxn::Read(_) => Err(RegErr::ReadOnly),
            MemoryTxn::Write { working, .. } => Ok(working),
        }
    }
}

#[async_trait]
impl RegistryTxn for MemoryTxn {
    fn mode(&self) -> TxMode {
        match self {
            MemoryTxn::Read(_) => TxMode::Read,
            MemoryTxn::Write { .. } => TxMode::Write,
        }
    }

    async fn create_entity<'a>(&'a mut self, record: &'a EntityRecord) -> Result<(), RegErr> {
        let graph = self.graph_mut()?;
        if graph.entities.contains_key(&record.id) {
            return Err(RegErr::dupe(&record.id));
        }
        graph.entities.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn create_edge<'a>(
        &'a mut self,
        parent: &'a EntityId,
        child: &'a EntityId,
    ) -> Result<(), RegErr> {
        let graph = self.graph_mut()?;
        for id in [parent, child] {
            if !graph.entities.contains_key(id) {
                return Err(RegErr::not_found(id));
            }
        }
        if graph.edges.iter().any(|(_, c)| c == child) {
            return Err(RegErr::EdgeConflict {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        if parent == child || graph.is_ancestor(child, parent) {
            return Err(RegErr::Cycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        graph.edges.insert((parent.clone(), child.clone()));
        Ok(())
    }

    async fn record<'a>(&'a mut self, id: &'a EntityId) -> Result<Option<EntityRecord>, RegErr> {
        Ok(self.graph().entities.get(id).cloned())
    }

    async fn related<'a>(
        &'a mut self,
        id: &'a EntityId,
        direction: Direction,
    ) -> Result<Vec<EntityRecord>, RegErr> {
        Ok(self.graph().related(id, direction))
    }

    async fn set_quotas<'a>(
        &'a mut self,
        id: &'a EntityId,
        quotas: &'a ResourceQuotas,
    ) -> Result<(), RegErr> {
        let graph = self.graph_mut()?;
        let record = graph
            .entities
            .get_mut(id)
            .ok_or_else(|| RegErr::not_found(id))?;
        record.quotas.merge(quotas);
        Ok(())
    }

    async fn delete<'a>(&'a mut self, id: &'a EntityId) -> Result<(), RegErr> {
        let graph = self.graph_mut()?;
        graph
            .entities
            .remove(id)
            .ok_or_else(|| RegErr::not_found(id))?;
        graph
            .edges
            .retain(|(parent, child)| parent != id && child != id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RegErr> {
        if let MemoryTxn::Write { mut guard, working } = *self {
            *guard = working;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RegErr> {
        Ok(())
    }
}

use crate::env::PostgresConnectInfo;
use crate::registry::err::RegErr;
use crate::registry::{Direction, EntityRecord, RegistryApi, RegistryTxn, TxMode};
use crate::space::{EntityId, EntityKind, Labels, ResourceKind, ResourceQuotas};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{error, info};

pub struct PostgresRegistry {
    pool: Pool<Postgres>,
}

impl PostgresRegistry {
    pub async fn connect(info: &PostgresConnectInfo) -> Result<Self, RegErr> {
        let options = PgConnectOptions::from_str(info.url.as_str())?.database(info.database.as_str());
        let pool = PgPoolOptions::new()
            .max_connections(info.max_connections)
            .connect_with(options)
            .await?;

        let registry = Self { pool };

        match registry.setup().await {
            Ok(_) => {}
            Err(err) => {
                error!("registry database setup failed: {}", err);
                return Err(err);
            }
        }

        Ok(registry)
    }

    async fn setup(&self) -> Result<(), RegErr> {
        let entities = r#"CREATE TABLE IF NOT EXISTS entities (
         id TEXT PRIMARY KEY,
         kind TEXT NOT NULL,
         profile_version TEXT NOT NULL,
         labels TEXT NOT NULL
        )"#;

        let quotas = r#"CREATE TABLE IF NOT EXISTS quotas (
         entity_id TEXT NOT NULL,
         resource TEXT NOT NULL,
         quota DOUBLE PRECISION NOT NULL,
         FOREIGN KEY (entity_id) REFERENCES entities (id) ON DELETE CASCADE,
         UNIQUE(entity_id,resource)
        )"#;

        // an entity is the child of at most one edge
        let edges = r#"CREATE TABLE IF NOT EXISTS edges (
         parent TEXT NOT NULL,
         child TEXT NOT NULL,
         FOREIGN KEY (parent) REFERENCES entities (id) ON DELETE CASCADE,
         FOREIGN KEY (child) REFERENCES entities (id) ON DELETE CASCADE,
         UNIQUE(child)
        )"#;

        let parent_index = "CREATE INDEX IF NOT EXISTS edges_parent_index ON edges(parent)";

        let mut trans = self.pool.begin().await?;
        sqlx::query(entities).execute(&mut *trans).await?;
        sqlx::query(quotas).execute(&mut *trans).await?;
        sqlx::query(edges).execute(&mut *trans).await?;
        sqlx::query(parent_index).execute(&mut *trans).await?;
        trans.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl RegistryApi for PostgresRegistry {
    async fn begin<'a>(&'a self, mode: TxMode) -> Result<Box<dyn RegistryTxn>, RegErr> {
        let mut trans = self.pool.begin().await?;
        let isolation = match mode {
            TxMode::Read => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
            TxMode::Write => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        };
        sqlx::query(isolation).execute(&mut *trans).await?;
        Ok(Box::new(PostgresTxn { mode, trans }))
    }

    async fn scorch<'a>(&'a self) -> Result<(), RegErr> {
        info!("scorching registry database");
        let mut trans = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS edges CASCADE")
            .execute(&mut *trans)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS quotas CASCADE")
            .execute(&mut *trans)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS entities CASCADE")
            .execute(&mut *trans)
            .await?;
        trans.commit().await?;
        self.setup().await?;
        Ok(())
    }

    async fn close<'a>(&'a self) {
        self.pool.close().await;
    }
}

/// A transaction that is dropped uncommitted is rolled back by sqlx.
pub struct PostgresTxn {
    mode: TxMode,
    trans: Transaction<'static, Postgres>,
}

impl PostgresTxn {
    fn writable(&self) -> Result<(), RegErr> {
        match self.mode {
            TxMode::Read => Err(RegErr::ReadOnly),
            TxMode::Write => Ok(()),
        }
    }

    async fn exists(&mut self, id: &EntityId) -> Result<bool, RegErr> {
        let count = sqlx::query_as::<Postgres, Count>("SELECT count(*) FROM entities WHERE id=$1")
            .bind(id.as_str())
            .fetch_one(&mut *self.trans)
            .await?;
        Ok(count.0 > 0)
    }

    async fn quotas_for(
        &mut self,
        ids: Vec<String>,
    ) -> Result<HashMap<EntityId, ResourceQuotas>, RegErr> {
        let rows = sqlx::query_as::<Postgres, QuotaRow>(
            "SELECT entity_id, resource, quota FROM quotas WHERE entity_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.trans)
        .await?;

        let mut quotas: HashMap<EntityId, ResourceQuotas> = HashMap::new();
        for row in rows {
            let id = EntityId::from(row.entity_id);
            let kind = ResourceKind::from_str(row.resource.as_str()).map_err(|_| {
                RegErr::corrupt(&id, format!("unknown resource kind '{}'", row.resource))
            })?;
            quotas.entry(id).or_default().set(kind, row.quota);
        }
        Ok(quotas)
    }

    async fn attach_quotas(&mut self, rows: Vec<EntityRow>) -> Result<Vec<EntityRecord>, RegErr> {
        let ids = rows.iter().map(|row| row.id.to_string()).collect();
        let mut quotas = self.quotas_for(ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let quotas = quotas.remove(&row.id).unwrap_or_default();
                row.into_record(quotas)
            })
            .collect())
    }
}

#[async_trait]
impl RegistryTxn for PostgresTxn {
    fn mode(&self) -> TxMode {
        self.mode
    }

    async fn create_entity<'a>(&'a mut self, record: &'a EntityRecord) -> Result<(), RegErr> {
        self.writable()?;
        if self.exists(&record.id).await? {
            return Err(RegErr::dupe(&record.id));
        }

        let labels = serde_json::to_string(&record.labels)
            .map_err(|err| RegErr::corrupt(&record.id, err))?;
        sqlx::query("INSERT INTO entities (id,kind,profile_version,labels) VALUES ($1,$2,$3,$4)")
            .bind(record.id.as_str())
            .bind(record.kind.to_string())
            .bind(record.profile_version.as_str())
            .bind(labels)
            .execute(&mut *self.trans)
            .await?;

        self.set_quotas(&record.id, &record.quotas).await
    }

    async fn create_edge<'a>(
        &'a mut self,
        parent: &'a EntityId,
        child: &'a EntityId,
    ) -> Result<(), RegErr> {
        self.writable()?;
        for id in [parent, child] {
            if !self.exists(id).await? {
                return Err(RegErr::not_found(id));
            }
        }

        let attached = sqlx::query_as::<Postgres, Count>("SELECT count(*) FROM edges WHERE child=$1")
            .bind(child.as_str())
            .fetch_one(&mut *self.trans)
            .await?;
        if attached.0 > 0 {
            return Err(RegErr::EdgeConflict {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        let cycle = sqlx::query_as::<Postgres, Count>(
            r#"WITH RECURSIVE ancestors(id) AS (
                 SELECT parent FROM edges WHERE child=$1
                 UNION
                 SELECT edges.parent FROM edges JOIN ancestors ON edges.child=ancestors.id
               )
               SELECT count(*) FROM ancestors WHERE id=$2"#,
        )
        .bind(parent.as_str())
        .bind(child.as_str())
        .fetch_one(&mut *self.trans)
        .await?;
        if parent == child || cycle.0 > 0 {
            return Err(RegErr::Cycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        sqlx::query("INSERT INTO edges (parent,child) VALUES ($1,$2)")
            .bind(parent.as_str())
            .bind(child.as_str())
            .execute(&mut *self.trans)
            .await?;
        Ok(())
    }

    async fn record<'a>(&'a mut self, id: &'a EntityId) -> Result<Option<EntityRecord>, RegErr> {
        let row = sqlx::query_as::<Postgres, EntityRow>(
            "SELECT id,kind,profile_version,labels FROM entities WHERE id=$1",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *self.trans)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(self.attach_quotas(vec![row]).await?.pop()),
        }
    }

    async fn related<'a>(
        &'a mut self,
        id: &'a EntityId,
        direction: Direction,
    ) -> Result<Vec<EntityRecord>, RegErr> {
        let statement = match direction {
            Direction::Children => {
                "SELECT e.id,e.kind,e.profile_version,e.labels FROM entities e JOIN edges ON edges.child=e.id WHERE edges.parent=$1"
            }
            Direction::Parent => {
                "SELECT e.id,e.kind,e.profile_version,e.labels FROM entities e JOIN edges ON edges.parent=e.id WHERE edges.child=$1"
            }
        };
        let rows = sqlx::query_as::<Postgres, EntityRow>(statement)
            .bind(id.as_str())
            .fetch_all(&mut *self.trans)
            .await?;
        self.attach_quotas(rows).await
    }

    async fn set_quotas<'a>(
        &'a mut self,
        id: &'a EntityId,
        quotas: &'a ResourceQuotas,
    ) -> Result<(), RegErr> {
        self.writable()?;
        if !self.exists(id).await? {
            return Err(RegErr::not_found(id));
        }
        for (kind, quota) in quotas.iter() {
            sqlx::query(
                "INSERT INTO quotas (entity_id,resource,quota) VALUES ($1,$2,$3) ON CONFLICT (entity_id,resource) DO UPDATE SET quota=EXCLUDED.quota",
            )
            .bind(id.as_str())
            .bind(kind.as_str())
            .bind(quota)
            .execute(&mut *self.trans)
            .await?;
        }
        Ok(())
    }

    async fn delete<'a>(&'a mut self, id: &'a EntityId) -> Result<(), RegErr> {
        self.writable()?;
        let result = sqlx::query("DELETE FROM entities WHERE id=$1")
            .bind(id.as_str())
            .execute(&mut *self.trans)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RegErr::not_found(id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RegErr> {
        self.trans.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RegErr> {
        self.trans.rollback().await?;
        Ok(())
    }
}

struct Count(u64);

impl sqlx::FromRow<'_, PgRow> for Count {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let v: i64 = row.try_get(0)?;
        Ok(Self(v as u64))
    }
}

struct QuotaRow {
    entity_id: String,
    resource: String,
    quota: f64,
}

impl sqlx::FromRow<'_, PgRow> for QuotaRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            entity_id: row.try_get("entity_id")?,
            resource: row.try_get("resource")?,
            quota: row.try_get("quota")?,
        })
    }
}

struct EntityRow {
    id: EntityId,
    kind: EntityKind,
    profile_version: String,
    labels: Labels,
}

impl EntityRow {
    fn into_record(self, quotas: ResourceQuotas) -> EntityRecord {
        EntityRecord {
            id: self.id,
            kind: self.kind,
            profile_version: self.profile_version,
            labels: self.labels,
            quotas,
        }
    }
}

impl sqlx::FromRow<'_, PgRow> for EntityRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let profile_version: String = row.try_get("profile_version")?;
        let labels: String = row.try_get("labels")?;

        let kind =
            EntityKind::from_str(kind.as_str()).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let labels: Labels =
            serde_json::from_str(labels.as_str()).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self {
            id: EntityId::from(id),
            kind,
            profile_version,
            labels,
        })
    }
}

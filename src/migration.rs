//! Reversible schema migration for tenant support.
//!
//! Generates PostgreSQL statements only; running them is up to the host's
//! migration tooling. [`TenantMigration::down`] is derived from
//! [`TenantMigration::up`] step by step, so it drops exactly what was added,
//! in reverse order.
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::migration::TenantMigration;
//!
//! let migration = TenantMigration::new();
//! for step in migration.up() {
//!     println!("{};", step.sql);
//! }
//! assert_eq!(migration.up().len(), migration.down().len());
//! ```

use crate::context::TenantId;
use crate::enforcer::ResourceKind;
use crate::namespace::{SqlFragment, TENANT_COLUMN};

pub const REGISTRY_TABLE: &str = "tenant_registry";

/// Width of every tenant id column.
pub const TENANT_COLUMN_WIDTH: usize = 255;

/// Table storing each resource kind.
pub fn table_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Connection => "dbs",
        ResourceKind::Dashboard => "dashboards",
        ResourceKind::Chart => "slices",
        ResourceKind::Table => "tables",
        ResourceKind::SavedQuery => "saved_query",
    }
}

/// Name of the tenant index on `table`.
pub fn tenant_index_name(table: &str) -> String {
    format!("ix_{}_{}", table, TENANT_COLUMN)
}

/// A schema object created by the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaObject {
    Table(String),
    Column { table: String, column: String },
    Index { name: String, table: String },
}

impl SchemaObject {
    /// Statement removing this object.
    pub fn drop_statement(&self) -> String {
        match self {
            SchemaObject::Table(name) => format!("DROP TABLE IF EXISTS {}", name),
            SchemaObject::Column { table, column } => {
                format!("ALTER TABLE IF EXISTS {} DROP COLUMN IF EXISTS {}", table, column)
            }
            SchemaObject::Index { name, .. } => format!("DROP INDEX IF EXISTS {}", name),
        }
    }
}

/// One statement and the object it creates or removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub object: SchemaObject,
    pub sql: String,
}

/// The tenant-support migration.
#[derive(Debug, Clone)]
pub struct TenantMigration {
    kinds: Vec<ResourceKind>,
    user_table: Option<String>,
}

impl Default for TenantMigration {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantMigration {
    /// Migration covering every resource kind.
    pub fn new() -> Self {
        Self {
            kinds: ResourceKind::ALL.to_vec(),
            user_table: None,
        }
    }

    /// Restrict the migration to `kinds`, keeping the canonical order.
    pub fn for_kinds(kinds: &[ResourceKind]) -> Self {
        Self {
            kinds: ResourceKind::ALL
                .into_iter()
                .filter(|kind| kinds.contains(kind))
                .collect(),
            user_table: None,
        }
    }

    /// Reference `table(id)` from the registry's audit columns.
    pub fn with_user_table(mut self, table: &'static str) -> Self {
        self.user_table = Some(table.to_string());
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|kind| table_for(*kind))
    }

    /// Forward statements, in execution order.
    pub fn up(&self) -> Vec<MigrationStep> {
        let mut steps = Vec::with_capacity(self.kinds.len() * 2 + 3);

        for table in self.tables() {
            steps.push(MigrationStep {
                object: SchemaObject::Column {
                    table: table.to_string(),
                    column: TENANT_COLUMN.to_string(),
                },
                sql: format!(
                    "ALTER TABLE IF EXISTS {} ADD COLUMN IF NOT EXISTS {} VARCHAR({})",
                    table, TENANT_COLUMN, TENANT_COLUMN_WIDTH
                ),
            });
            steps.push(index_step(table, TENANT_COLUMN));
        }

        steps.push(MigrationStep {
            object: SchemaObject::Table(REGISTRY_TABLE.to_string()),
            sql: self.registry_table_sql(),
        });
        steps.push(index_step(REGISTRY_TABLE, TENANT_COLUMN));
        steps.push(index_step(REGISTRY_TABLE, "is_active"));

        steps
    }

    /// Reverse statements: each `up` step undone, last first.
    pub fn down(&self) -> Vec<MigrationStep> {
        self.up()
            .into_iter()
            .rev()
            .map(|step| MigrationStep {
                sql: step.object.drop_statement(),
                object: step.object,
            })
            .collect()
    }

    /// Statements assigning every legacy row to `tenant`.
    pub fn backfill_legacy(&self, tenant: &TenantId) -> Vec<SqlFragment> {
        self.tables()
            .map(|table| {
                SqlFragment::new(
                    format!(
                        "UPDATE {} SET {} = $1 WHERE {} IS NULL",
                        table, TENANT_COLUMN, TENANT_COLUMN
                    ),
                    vec![tenant.to_string()],
                )
            })
            .collect()
    }

    fn registry_table_sql(&self) -> String {
        let reference = |column: &str| match &self.user_table {
            Some(users) => format!("    {} INTEGER REFERENCES {} (id)", column, users),
            None => format!("    {} INTEGER", column),
        };
        let columns = [
            "    id SERIAL PRIMARY KEY".to_string(),
            format!(
                "    {} VARCHAR({}) NOT NULL UNIQUE",
                TENANT_COLUMN, TENANT_COLUMN_WIDTH
            ),
            "    tenant_name VARCHAR(500) NOT NULL".to_string(),
            "    description TEXT".to_string(),
            "    is_active BOOLEAN NOT NULL DEFAULT TRUE".to_string(),
            "    database_schema VARCHAR(255)".to_string(),
            "    configuration TEXT".to_string(),
            "    created_on TIMESTAMP".to_string(),
            "    changed_on TIMESTAMP".to_string(),
            reference("created_by_fk"),
            reference("changed_by_fk"),
        ];
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            REGISTRY_TABLE,
            columns.join(",\n")
        )
    }
}

fn index_step(table: &str, column: &str) -> MigrationStep {
    let name = format!("ix_{}_{}", table, column);
    MigrationStep {
        sql: format!("CREATE INDEX IF NOT EXISTS {} ON {} ({})", name, table, column),
        object: SchemaObject::Index {
            name,
            table: table.to_string(),
        },
    }
}

//! Database structure introspection.
//!
//! Reads the system catalogs through the `prepared` query manager. Results
//! are returned as plain structs that can be serialized.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::query_manager::PREPARED;
use crate::result::{ConvertedResult, ConvertedRow};
use crate::session::{ClientKind, Session};

/// Identifier of the inspector returned by `Session::inspector`.
pub const DEFAULT_INSPECTOR: &str = "inspector";

/// A schema with the number of tables and views it holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub oid: i64,
    pub comment: Option<String>,
    pub relations: i64,
}

/// A table, view, materialized view or foreign table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub name: String,
    pub relation_type: String,
    pub oid: i64,
    pub comment: Option<String>,
}

/// A column of a relation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Type name, schema qualified outside of `pg_catalog`.
    pub type_name: String,
    pub default: Option<String>,
    pub is_notnull: bool,
    pub comment: Option<String>,
    pub position: i64,
    pub is_primary: bool,
}

/// A non-primary index of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

const SCHEMAS_QUERY: &str = r#"
select
    n.nspname     as "name",
    n.oid         as "oid",
    d.description as "comment",
    count(c)      as "relations"
from pg_catalog.pg_namespace n
    left join pg_catalog.pg_description d on n.oid = d.objoid
    left join pg_catalog.pg_class c on
        c.relnamespace = n.oid and c.relkind in ('r', 'v')
where n.nspname !~ $* and n.nspname <> $*
group by 1, 2, 3
order by 1
"#;

const SCHEMA_OID_QUERY: &str = r#"
select s.oid as "oid"
from pg_catalog.pg_namespace s
where s.nspname = $*
"#;

const TABLE_OID_QUERY: &str = r#"
select c.oid as "oid"
from pg_catalog.pg_class c
    left join pg_catalog.pg_namespace n on n.oid = c.relnamespace
where n.nspname = $* and c.relname = $*
"#;

const FIELDS_QUERY: &str = r#"
select
    att.attname      as "name",
    case
        when name.nspname = 'pg_catalog' then typ.typname
        else format('%s.%s', name.nspname, typ.typname)
    end as "type",
    pg_catalog.pg_get_expr(def.adbin, def.adrelid) as "default",
    att.attnotnull   as "is_notnull",
    dsc.description  as "comment",
    att.attnum       as "position",
    att.attnum = any(ind.indkey) as "is_primary"
from
  pg_catalog.pg_attribute att
    join pg_catalog.pg_type  typ  on att.atttypid = typ.oid
    join pg_catalog.pg_class cla  on att.attrelid = cla.oid
    left join pg_catalog.pg_description dsc on cla.oid = dsc.objoid and att.attnum = dsc.objsubid
    left join pg_catalog.pg_attrdef def     on att.attrelid = def.adrelid and att.attnum = def.adnum
    left join pg_catalog.pg_index ind       on cla.oid = ind.indrelid and ind.indisprimary
    left join pg_catalog.pg_namespace name  on typ.typnamespace = name.oid
where att.attrelid = $*::oid and att.attnum > 0 and not att.attisdropped
order by att.attnum
"#;

const RELATIONS_QUERY: &str = r#"
select
    cl.relname      as "name",
    case
        when cl.relkind = 'r' then 'table'
        when cl.relkind = 'v' then 'view'
        when cl.relkind = 'm' then 'materialized view'
        when cl.relkind = 'f' then 'foreign table'
        else 'other'
    end             as "type",
    cl.oid          as "oid",
    des.description as "comment"
from
    pg_catalog.pg_class cl
        left join pg_catalog.pg_description des on
            cl.oid = des.objoid and des.objsubid = 0
where cl.relnamespace = $*::oid and cl.relkind in ('r', 'v', 'm', 'f')
order by name asc
"#;

const INDEXES_QUERY: &str = r#"
select
    i.relname as "name",
    array_agg(a.attname order by array_position(ix.indkey, a.attnum)) as "columns",
    ix.indisunique as "unique"
from pg_catalog.pg_class t
    join pg_catalog.pg_index ix on t.oid = ix.indrelid
    join pg_catalog.pg_class i on i.oid = ix.indexrelid
    join pg_catalog.pg_attribute a on a.attrelid = t.oid and a.attnum = any(ix.indkey)
where t.oid = $*::oid and not ix.indisprimary
group by i.relname, ix.indisunique
order by i.relname
"#;

#[derive(Debug)]
pub struct Inspector {
    identifier: String,
}

impl Inspector {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    /// User schemas, system schemas excluded.
    pub fn schemas(&self, session: &Session) -> Result<Vec<SchemaInfo>> {
        let result = self.execute(
            session,
            SCHEMAS_QUERY,
            &["^pg_".into(), "information_schema".into()],
        )?;
        result
            .iter()
            .map(|row| {
                let row = row?;
                Ok(SchemaInfo {
                    name: text(&row, "name")?,
                    oid: integer(&row, "oid")?,
                    comment: optional_text(&row, "comment")?,
                    relations: integer(&row, "relations")?,
                })
            })
            .collect()
    }

    pub fn schema_oid(&self, session: &Session, schema: &str) -> Result<Option<i64>> {
        let result = self.execute(session, SCHEMA_OID_QUERY, &[schema.into()])?;
        first_oid(&result)
    }

    pub fn table_oid(&self, session: &Session, schema: &str, table: &str) -> Result<Option<i64>> {
        let result = self.execute(session, TABLE_OID_QUERY, &[schema.into(), table.into()])?;
        first_oid(&result)
    }

    /// Columns of the relation `oid`, in position order.
    pub fn table_field_information(&self, session: &Session, oid: i64) -> Result<Vec<FieldInfo>> {
        let result = self.execute(session, FIELDS_QUERY, &[oid.into()])?;
        result
            .iter()
            .map(|row| {
                let row = row?;
                Ok(FieldInfo {
                    name: text(&row, "name")?,
                    type_name: text(&row, "type")?,
                    default: optional_text(&row, "default")?,
                    is_notnull: boolean(&row, "is_notnull")?,
                    comment: optional_text(&row, "comment")?,
                    position: integer(&row, "position")?,
                    is_primary: boolean(&row, "is_primary")?,
                })
            })
            .collect()
    }

    /// Relations of the schema `schema_oid`.
    pub fn tables(&self, session: &Session, schema_oid: i64) -> Result<Vec<RelationInfo>> {
        let result = self.execute(session, RELATIONS_QUERY, &[schema_oid.into()])?;
        result
            .iter()
            .map(|row| {
                let row = row?;
                Ok(RelationInfo {
                    name: text(&row, "name")?,
                    relation_type: text(&row, "type")?,
                    oid: integer(&row, "oid")?,
                    comment: optional_text(&row, "comment")?,
                })
            })
            .collect()
    }

    /// Indexes of the table `table_oid`, primary key excluded.
    pub fn indexes(&self, session: &Session, table_oid: i64) -> Result<Vec<IndexInfo>> {
        let result = self.execute(session, INDEXES_QUERY, &[table_oid.into()])?;
        result
            .iter()
            .map(|row| {
                let row = row?;
                let columns = match row.get("columns") {
                    Some(PgValue::Array(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(IndexInfo {
                    name: text(&row, "name")?,
                    columns,
                    unique: boolean(&row, "unique")?,
                })
            })
            .collect()
    }

    pub fn server_version(&self, session: &Session) -> Result<String> {
        let result = self.execute(session, "show server_version", &[])?;
        match result.first()? {
            Some(row) => text(&row, "server_version"),
            None => Err(missing("server_version")),
        }
    }

    fn execute<'s>(
        &self,
        session: &'s Session,
        sql: &str,
        parameters: &[PgValue],
    ) -> Result<ConvertedResult<'s>> {
        session.query_manager(PREPARED)?.query(session, sql, parameters)
    }
}

fn missing(field: &str) -> FoundationError {
    FoundationError::PoolUsage(format!("Catalog query returned no '{}' field.", field))
}

fn optional_text(row: &ConvertedRow, field: &str) -> Result<Option<String>> {
    match row.get(field) {
        Some(PgValue::Null) => Ok(None),
        Some(value) => Ok(value.as_str().map(str::to_string)),
        None => Err(missing(field)),
    }
}

fn text(row: &ConvertedRow, field: &str) -> Result<String> {
    optional_text(row, field)?.ok_or_else(|| missing(field))
}

fn integer(row: &ConvertedRow, field: &str) -> Result<i64> {
    row.get(field)
        .and_then(PgValue::as_i64)
        .ok_or_else(|| missing(field))
}

/// NULL reads as false.
fn boolean(row: &ConvertedRow, field: &str) -> Result<bool> {
    match row.get(field) {
        Some(PgValue::Null) => Ok(false),
        Some(value) => value.as_bool().ok_or_else(|| missing(field)),
        None => Err(missing(field)),
    }
}

fn first_oid(result: &ConvertedResult<'_>) -> Result<Option<i64>> {
    match result.first()? {
        Some(row) => integer(&row, "oid").map(Some),
        None => Ok(None),
    }
}

impl Client for Inspector {
    fn client_type(&self) -> &str {
        ClientKind::Inspector.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.identifier
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Default)]
pub struct InspectorPooler {
    state: PoolerState,
}

impl InspectorPooler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pooler for InspectorPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::Inspector.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn create_client(&self, _session: &Session, identifier: &str) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(Inspector::new(identifier)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

//! Renders [`QueryPredicate`]s into `sea-query` expressions and runs them
//! through `sea-orm`.
//!
//! Relations become correlated `EXISTS` subqueries over table aliases
//! `t0`, `t1`, ... Field comparisons carry an `IS NOT NULL` guard so that
//! negation stays two-valued, matching the in-memory evaluator.

use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, Query, SelectStatement, SimpleExpr, Table, TableCreateStatement,
};
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbBackend, Value as DbValue,
};
use serde_json::Value;

use crate::authz::condition::Quantifier;
use crate::authz::errors::AuthzError;
use crate::authz::query::QueryPredicate;
use crate::authz::schema::{AttributeType, RelationKind, Schema};
use crate::authz::types::{ResourceType, Scalar};
use crate::errors::TribuneError;

const ROOT_ALIAS: &str = "t0";

struct Renderer<'a> {
    schema: &'a Schema,
    next_alias: usize,
}

impl<'a> Renderer<'a> {
    fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            next_alias: 1,
        }
    }

    fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn render(
        &mut self,
        resource_type: ResourceType,
        alias: &str,
        predicate: &QueryPredicate,
    ) -> Result<SimpleExpr, AuthzError> {
        match predicate {
            QueryPredicate::MatchAll => Ok(Expr::cust("1 = 1")),
            QueryPredicate::MatchNone => Ok(Expr::cust("1 = 0")),
            QueryPredicate::FieldEq { field, value } => {
                if self.schema.attribute(resource_type, field).is_none() {
                    return Err(AuthzError::UnresolvedPath {
                        resource_type,
                        path: field.clone(),
                        reason: format!("`{resource_type}` has no column `{field}`"),
                    });
                }
                let col = Expr::col((Alias::new(alias), Alias::new(field.as_str())));
                Ok(col
                    .clone()
                    .is_not_null()
                    .and(col.eq(SimpleExpr::Value(scalar_value(value)))))
            }
            QueryPredicate::And(ps) => {
                let mut parts = Vec::with_capacity(ps.len());
                for p in ps {
                    parts.push(self.render(resource_type, alias, p)?);
                }
                Ok(parts
                    .into_iter()
                    .reduce(SimpleExpr::and)
                    .unwrap_or_else(|| Expr::cust("1 = 1")))
            }
            QueryPredicate::Or(ps) => {
                let mut parts = Vec::with_capacity(ps.len());
                for p in ps {
                    parts.push(self.render(resource_type, alias, p)?);
                }
                Ok(parts
                    .into_iter()
                    .reduce(SimpleExpr::or)
                    .unwrap_or_else(|| Expr::cust("1 = 0")))
            }
            QueryPredicate::Not(p) => Ok(self.render(resource_type, alias, p)?.not()),
            QueryPredicate::Relation {
                quantifier,
                relation,
                filter,
            } => {
                let rel = self.schema.relation(resource_type, relation).ok_or_else(|| {
                    AuthzError::UnresolvedPath {
                        resource_type,
                        path: relation.clone(),
                        reason: format!("`{resource_type}` has no relation `{relation}`"),
                    }
                })?;
                let target = self.schema.entity(rel.target)?;
                let child = self.fresh_alias();

                let join = match rel.kind {
                    RelationKind::BelongsTo { column } => Expr::col((Alias::new(&child), Alias::new("id")))
                        .equals((Alias::new(alias), Alias::new(column))),
                    RelationKind::HasMany { foreign_column } => {
                        Expr::col((Alias::new(&child), Alias::new(foreign_column)))
                            .equals((Alias::new(alias), Alias::new("id")))
                    }
                };
                let inner = self.render(rel.target, &child, filter)?;

                // EVERY x: P  ==  NOT EXISTS x: NOT P
                let (body, negate) = match quantifier {
                    Quantifier::Some => (join.and(inner), false),
                    Quantifier::None => (join.and(inner), true),
                    Quantifier::Every => (join.and(inner.not()), true),
                };

                let mut sub = Query::select();
                sub.expr(Expr::val(1))
                    .from_as(Alias::new(target.table), Alias::new(&child))
                    .and_where(body);
                let exists = Expr::exists(sub);
                Ok(if negate { exists.not() } else { exists })
            }
        }
    }
}

fn scalar_value(value: &Scalar) -> DbValue {
    match value {
        Scalar::Bool(b) => DbValue::from(*b),
        Scalar::Int(n) => DbValue::from(*n),
        Scalar::Str(s) => DbValue::from(s.clone()),
    }
}

/// The filter as a boolean expression over the root table aliased `t0`.
pub fn filter_expr(
    schema: &Schema,
    resource_type: ResourceType,
    predicate: &QueryPredicate,
) -> Result<SimpleExpr, AuthzError> {
    Renderer::new(schema).render(resource_type, ROOT_ALIAS, predicate)
}

fn ids_query(
    schema: &Schema,
    resource_type: ResourceType,
    predicate: &QueryPredicate,
) -> Result<SelectStatement, AuthzError> {
    let entity = schema.entity(resource_type)?;
    let filter = filter_expr(schema, resource_type, predicate)?;
    let mut select = Query::select();
    select
        .column((Alias::new(ROOT_ALIAS), Alias::new("id")))
        .from_as(Alias::new(entity.table), Alias::new(ROOT_ALIAS))
        .and_where(filter);
    Ok(select)
}

/// `SELECT t0.id FROM <table> t0 WHERE <filter> ORDER BY t0.id`
pub fn select_ids_statement(
    schema: &Schema,
    resource_type: ResourceType,
    predicate: &QueryPredicate,
) -> Result<SelectStatement, AuthzError> {
    let mut select = ids_query(schema, resource_type, predicate)?;
    select.order_by(
        (Alias::new(ROOT_ALIAS), Alias::new("id")),
        sea_orm::sea_query::Order::Asc,
    );
    Ok(select)
}

/// `DELETE FROM <table> WHERE id = ? AND id IN (<select_ids>)`
pub fn guarded_delete_statement(
    schema: &Schema,
    resource_type: ResourceType,
    id: &str,
    predicate: &QueryPredicate,
) -> Result<sea_orm::sea_query::DeleteStatement, AuthzError> {
    let entity = schema.entity(resource_type)?;
    let allowed = ids_query(schema, resource_type, predicate)?;
    let mut delete = Query::delete();
    delete
        .from_table(Alias::new(entity.table))
        .and_where(Expr::col(Alias::new("id")).eq(id))
        .and_where(Expr::col(Alias::new("id")).in_subquery(allowed));
    Ok(delete)
}

/// SQL text with values inlined, for diagnostics only.
pub fn sql_preview(
    backend: DbBackend,
    schema: &Schema,
    resource_type: ResourceType,
    predicate: &QueryPredicate,
) -> Result<String, AuthzError> {
    let select = select_ids_statement(schema, resource_type, predicate)?;
    Ok(backend.build(&select).to_string())
}

pub fn create_table_statements(schema: &Schema) -> Vec<TableCreateStatement> {
    schema
        .entities()
        .map(|entity| {
            let mut table = Table::create();
            table.table(Alias::new(entity.table)).if_not_exists();
            for attr in &entity.attributes {
                let mut col = ColumnDef::new(Alias::new(attr.name));
                match attr.ty {
                    AttributeType::Text => col.string(),
                    AttributeType::Integer => col.big_integer(),
                    AttributeType::Boolean => col.boolean(),
                };
                if attr.name == "id" {
                    col.not_null().primary_key();
                } else if attr.nullable {
                    col.null();
                } else {
                    col.not_null();
                }
                table.col(&mut col);
            }
            table
        })
        .collect()
}

pub async fn connect(url: &str) -> Result<DatabaseConnection, TribuneError> {
    let db = Database::connect(url).await?;
    tracing::info!(backend = ?db.get_database_backend(), "Connected to database");
    Ok(db)
}

pub async fn create_tables(db: &DatabaseConnection, schema: &Schema) -> Result<(), TribuneError> {
    let backend = db.get_database_backend();
    for stmt in create_table_statements(schema) {
        db.execute(backend.build(&stmt)).await?;
    }
    Ok(())
}

/// Insert one normalized row (same shape `MemoryStore::insert` takes).
pub async fn insert_row(
    db: &DatabaseConnection,
    schema: &Schema,
    resource_type: ResourceType,
    row: &Value,
) -> Result<(), TribuneError> {
    let entity = schema.entity(resource_type)?;
    let Value::Object(row) = row else {
        return Err(AuthzError::InvalidInstance(format!(
            "`{resource_type}` row must be a JSON object"
        ))
        .into());
    };
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for attr in &entity.attributes {
        let value = row.get(attr.name).unwrap_or(&Value::Null);
        columns.push(Alias::new(attr.name));
        values.push(SimpleExpr::Value(json_value(attr.ty, value)?));
    }
    let mut insert = Query::insert();
    insert
        .into_table(Alias::new(entity.table))
        .columns(columns)
        .values(values)
        .map_err(|e| TribuneError::Other(e.to_string()))?;
    let backend = db.get_database_backend();
    db.execute(backend.build(&insert)).await?;
    Ok(())
}

fn json_value(ty: AttributeType, value: &Value) -> Result<DbValue, TribuneError> {
    let converted = match (ty, value) {
        (AttributeType::Text, Value::Null) => DbValue::String(None),
        (AttributeType::Integer, Value::Null) => DbValue::BigInt(None),
        (AttributeType::Boolean, Value::Null) => DbValue::Bool(None),
        (AttributeType::Text, Value::String(s)) => DbValue::from(s.clone()),
        (AttributeType::Integer, Value::Number(n)) if n.is_i64() => DbValue::from(n.as_i64()),
        (AttributeType::Boolean, Value::Bool(b)) => DbValue::from(*b),
        (ty, other) => {
            return Err(TribuneError::BadRequest(format!(
                "expected {} column value, got {other}",
                ty.name()
            )))
        }
    };
    Ok(converted)
}

/// Ids of the rows of `resource_type` the predicate selects, ordered by id.
pub async fn select_ids(
    db: &DatabaseConnection,
    schema: &Schema,
    resource_type: ResourceType,
    predicate: &QueryPredicate,
) -> Result<Vec<String>, TribuneError> {
    let select = select_ids_statement(schema, resource_type, predicate)?;
    let backend = db.get_database_backend();
    let rows = db.query_all(backend.build(&select)).await?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(row.try_get::<String>("", "id")?);
    }
    Ok(ids)
}

/// Delete one row if, and only if, the predicate allows it. Returns whether
/// a row was deleted.
pub async fn delete_guarded(
    db: &DatabaseConnection,
    schema: &Schema,
    resource_type: ResourceType,
    id: &str,
    predicate: &QueryPredicate,
) -> Result<bool, TribuneError> {
    let delete = guarded_delete_statement(schema, resource_type, id, predicate)?;
    let backend = db.get_database_backend();
    let result = db.execute(backend.build(&delete)).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(q: Quantifier, r: &str, f: QueryPredicate) -> QueryPredicate {
        QueryPredicate::Relation {
            quantifier: q,
            relation: r.into(),
            filter: Box::new(f),
        }
    }

    fn preview(rt: ResourceType, p: &QueryPredicate) -> String {
        sql_preview(DbBackend::Sqlite, &Schema::conference(), rt, p).unwrap()
    }

    #[test]
    fn test_match_none_is_always_false() {
        let sql = preview(ResourceType::Paper, &QueryPredicate::MatchNone);
        assert!(sql.contains("1 = 0"), "{sql}");
        assert!(sql.contains(r#"FROM "papers" AS "t0""#), "{sql}");
    }

    #[test]
    fn test_field_eq_has_null_guard() {
        let p = QueryPredicate::FieldEq {
            field: "status".into(),
            value: Scalar::Str("PUBLISHED".into()),
        };
        let sql = preview(ResourceType::Paper, &p);
        assert!(sql.contains(r#""t0"."status" IS NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""t0"."status" = 'PUBLISHED'"#), "{sql}");
    }

    #[test]
    fn test_relation_renders_correlated_exists() {
        let p = rel(
            Quantifier::Some,
            "members",
            rel(
                Quantifier::Some,
                "user",
                QueryPredicate::FieldEq {
                    field: "id".into(),
                    value: Scalar::Str("u1".into()),
                },
            ),
        );
        let sql = preview(ResourceType::Delegation, &p);
        assert!(sql.contains(r#"FROM "delegation_members" AS "t1""#), "{sql}");
        assert!(sql.contains(r#""t1"."delegation_id" = "t0"."id""#), "{sql}");
        assert!(sql.contains(r#"FROM "users" AS "t2""#), "{sql}");
        assert!(sql.contains(r#""t2"."id" = "t1"."user_id""#), "{sql}");
        assert_eq!(sql.matches("EXISTS").count(), 2);
    }

    #[test]
    fn test_every_renders_not_exists_not() {
        let p = rel(Quantifier::Every, "members", QueryPredicate::MatchNone);
        let sql = preview(ResourceType::Delegation, &p);
        assert!(sql.contains("NOT EXISTS"), "{sql}");
    }

    #[test]
    fn test_unknown_relation_is_an_error() {
        let p = rel(Quantifier::Some, "staff", QueryPredicate::MatchAll);
        let err = sql_preview(DbBackend::Sqlite, &Schema::conference(), ResourceType::Delegation, &p)
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnresolvedPath { .. }));
    }

    #[test]
    fn test_guarded_delete_uses_subquery() {
        let schema = Schema::conference();
        let stmt = guarded_delete_statement(
            &schema,
            ResourceType::Paper,
            "p1",
            &QueryPredicate::MatchAll,
        )
        .unwrap();
        let sql = DbBackend::Sqlite.build(&stmt).to_string();
        assert!(sql.starts_with(r#"DELETE FROM "papers""#), "{sql}");
        assert!(sql.contains(r#""id" IN (SELECT "t0"."id""#), "{sql}");
    }

    #[test]
    fn test_create_table_statements_cover_schema() {
        let schema = Schema::conference();
        let stmts = create_table_statements(&schema);
        assert_eq!(stmts.len(), ResourceType::ALL.len());
        let sql = DbBackend::Sqlite.build(&stmts[0]).to_string();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"), "{sql}");
    }
}

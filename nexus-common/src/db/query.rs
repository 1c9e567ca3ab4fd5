//! Dynamic WHERE/ORDER BY construction for list queries
//!
//! Column names and SQL fragments are always static strings chosen by the
//! caller; user-provided values only ever reach SQLite as bound parameters.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::pagination::{calculate_pagination, ListParams, Page};
use crate::{Error, Result};

/// A value bound into a dynamic WHERE clause
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    Uuid(Uuid),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

/// AND-joined WHERE conditions; each `?` in a clause consumes one value
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<(String, Vec<SqlValue>)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw clause such as `"due_at < ?"`
    pub fn push(&mut self, clause: impl Into<String>, values: Vec<SqlValue>) -> &mut Self {
        self.clauses.push((clause.into(), values));
        self
    }

    /// `column = value`, skipped when `value` is None
    pub fn eq<V: Into<SqlValue>>(&mut self, column: &'static str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.push(format!("{} = ?", column), vec![v.into()]);
        }
        self
    }

    /// Case-insensitive substring match over any of `columns`
    pub fn search(&mut self, columns: &[&'static str], term: Option<&str>) -> &mut Self {
        let term = match term.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return self,
        };
        let pattern = like_pattern(term);
        let clause = columns
            .iter()
            .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        let values = columns.iter().map(|_| SqlValue::Text(pattern.clone())).collect();
        self.push(format!("({})", clause), values)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Append ` WHERE ...` to the builder
    pub fn apply<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        for (i, (clause, values)) in self.clauses.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            let mut values = values.iter();
            let mut parts = clause.split('?').peekable();
            while let Some(part) = parts.next() {
                qb.push(part);
                if parts.peek().is_some() {
                    match values.next() {
                        Some(SqlValue::Text(v)) => qb.push_bind(v.clone()),
                        Some(SqlValue::Uuid(v)) => qb.push_bind(*v),
                        Some(SqlValue::Int(v)) => qb.push_bind(*v),
                        Some(SqlValue::Timestamp(v)) => qb.push_bind(*v),
                        None => qb.push("NULL"),
                    };
                }
            }
        }
    }
}

/// Escape LIKE wildcards in user input and wrap it in `%...%`
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Resolve the requested sort column against an entity's whitelist
pub fn resolve_sort(
    requested: Option<&str>,
    allowed: &[&'static str],
    default: &'static str,
) -> Result<&'static str> {
    match requested {
        None => Ok(default),
        Some(col) => allowed
            .iter()
            .find(|c| **c == col)
            .copied()
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Cannot sort by '{}' (allowed: {})",
                    col,
                    allowed.join(", ")
                ))
            }),
    }
}

/// Count and fetch one page of `table` rows matching `conditions`
pub async fn fetch_page<T>(
    pool: &SqlitePool,
    table: &'static str,
    conditions: &Conditions,
    sort_column: &'static str,
    params: &ListParams,
) -> Result<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut count_qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table));
    conditions.apply(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, params.page, params.per_page);

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT * FROM {}", table));
    conditions.apply(&mut qb);
    qb.push(format!(
        " ORDER BY {} {}, rowid {}",
        sort_column,
        params.order.as_sql(),
        params.order.as_sql()
    ));
    qb.push(" LIMIT ").push_bind(pagination.per_page);
    qb.push(" OFFSET ").push_bind(pagination.offset);

    let items = qb.build_query_as::<T>().fetch_all(pool).await?;

    Ok(Page::new(items, total, pagination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("smith"), "%smith%");
    }

    #[test]
    fn test_resolve_sort() {
        let allowed = ["name", "created_at"];
        assert_eq!(resolve_sort(None, &allowed, "created_at").unwrap(), "created_at");
        assert_eq!(resolve_sort(Some("name"), &allowed, "created_at").unwrap(), "name");
        assert!(matches!(
            resolve_sort(Some("name; DROP TABLE accounts"), &allowed, "created_at"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_conditions_render_placeholders() {
        let mut conditions = Conditions::new();
        conditions
            .eq("status", Some("open"))
            .eq::<String>("source", None)
            .search(&["name", "email"], Some("ann"));

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM t");
        conditions.apply(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM t WHERE status = ? AND (name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let mut conditions = Conditions::new();
        conditions.search(&["name"], Some("   "));
        assert!(conditions.is_empty());
    }
}

use sqlx::types::Json;

use crate::db::tenant::quote_ident;
use crate::db::tenant::session::TenantSession;
use crate::models::content::{FieldValue, Fields, SiteEntity};
use crate::with_conn;

/// Bind every field value in order onto a query built for either backend.
macro_rules! bind_fields {
    ($query:expr, $fields:expr) => {{
        let mut query = $query;
        for (_, value) in $fields {
            query = match value {
                FieldValue::Text(s) => query.bind(s.as_str()),
                FieldValue::OptText(s) => query.bind(s.as_deref()),
                FieldValue::Bool(b) => query.bind(*b),
                FieldValue::Date(d) => query.bind(*d),
                FieldValue::Int(i) => query.bind(*i),
                FieldValue::Json(v) => query.bind(Json(v)),
            };
        }
        query
    }};
}

/// CRUD for site entities. Every query runs on the tenant session, so table
/// names stay unqualified and resolve inside the caller's namespace.
pub struct ContentService;

impl ContentService {
    pub async fn list<E: SiteEntity>(
        session: &mut TenantSession,
        published_only: bool,
    ) -> Result<Vec<E>, sqlx::Error> {
        let filter = if published_only && E::PUBLISHABLE {
            " WHERE status = TRUE"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {}{filter} ORDER BY id",
            E::COLUMNS,
            quote_ident(E::TABLE)
        );
        with_conn!(session.conn(), |c| {
            sqlx::query_as::<_, E>(&sql).fetch_all(c).await
        })
    }

    pub async fn get<E: SiteEntity>(
        session: &mut TenantSession,
        id: i32,
        published_only: bool,
    ) -> Result<Option<E>, sqlx::Error> {
        let filter = if published_only && E::PUBLISHABLE {
            " AND status = TRUE"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1{filter}",
            E::COLUMNS,
            quote_ident(E::TABLE)
        );
        with_conn!(session.conn(), |c| {
            sqlx::query_as::<_, E>(&sql).bind(id).fetch_optional(c).await
        })
    }

    pub async fn insert<E: SiteEntity>(
        session: &mut TenantSession,
        fields: &Fields,
    ) -> Result<E, sqlx::Error> {
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote_ident(E::TABLE),
            columns.join(", "),
            placeholders.join(", "),
            E::COLUMNS
        );
        with_conn!(session.conn(), |c| {
            bind_fields!(sqlx::query_as::<_, E>(&sql), fields)
                .fetch_one(c)
                .await
        })
    }

    /// Returns None when no row has `id`. An empty field list just re-reads
    /// the row.
    pub async fn update<E: SiteEntity>(
        session: &mut TenantSession,
        id: i32,
        fields: &Fields,
    ) -> Result<Option<E>, sqlx::Error> {
        if fields.is_empty() {
            return Self::get(session, id, false).await;
        }
        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{c} = ${}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ${} RETURNING {}",
            quote_ident(E::TABLE),
            assignments.join(", "),
            fields.len() + 1,
            E::COLUMNS
        );
        with_conn!(session.conn(), |c| {
            bind_fields!(sqlx::query_as::<_, E>(&sql), fields)
                .bind(id)
                .fetch_optional(c)
                .await
        })
    }

    /// Delete and return the removed row, so callers can clean up its file.
    pub async fn delete<E: SiteEntity>(
        session: &mut TenantSession,
        id: i32,
    ) -> Result<Option<E>, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 RETURNING {}",
            quote_ident(E::TABLE),
            E::COLUMNS
        );
        with_conn!(session.conn(), |c| {
            sqlx::query_as::<_, E>(&sql).bind(id).fetch_optional(c).await
        })
    }
}

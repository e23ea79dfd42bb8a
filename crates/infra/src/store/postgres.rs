//! Postgres-backed document store.
//!
//! One `documents` row per document: the full state as a JSONB body plus the
//! columns the store queries and constrains on. Saved events go to
//! `document_events` in the same transaction.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code / constraint | StoreError |
//! |------------|----------------------------|------------|
//! | unique violation | `23505` on `documents_tenant_sequence_key` | `Domain(SequenceConflict)` |
//! | unique violation | `23505` on `documents_tenant_number_key` | `Domain(SequenceConflict)` |
//! | unique violation | `23505` on `documents_tenant_credit_note_of_key` | `Domain(Conflict)` |
//! | unique violation | `23505` on anything else | `Concurrency` |
//! | other database error | any | `Backend` |
//! | PoolClosed / network / other | n/a | `Backend` |
//!
//! The row being saved is locked with `SELECT ... FOR UPDATE`, so the guard
//! always compares against the committed state. A finalizing save reads the
//! highest committed sequence of its prefix and year in the same transaction
//! and refuses any number that does not directly follow it; two writers that
//! read the same highest value collide on `documents_tenant_sequence_key`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use facturo_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use facturo_events::EventEnvelope;
use facturo_invoicing::{
    guard, Document, DocumentEvent, DocumentId, DocumentNumber, NumberingScheme,
};

use super::r#trait::{envelopes, owning_tenant, DocumentFilter, DocumentStore, StoreError};

/// Schema the store expects, applied by [`PostgresDocumentStore::apply_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_documents.sql");

const SEQUENCE_CONSTRAINT: &str = "documents_tenant_sequence_key";
const NUMBER_CONSTRAINT: &str = "documents_tenant_number_key";
const CREDIT_NOTE_CONSTRAINT: &str = "documents_tenant_credit_note_of_key";

/// Postgres document store.
///
/// Every query carries `tenant_id` in its WHERE clause.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    numbering: NumberingScheme,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            numbering: NumberingScheme::default(),
        }
    }

    /// Accept numbers of `numbering` instead of the default scheme.
    pub fn with_numbering(mut self, numbering: NumberingScheme) -> Self {
        self.numbering = numbering;
        self
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and constraints if they do not exist yet.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    async fn fetch_bodies(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Document>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(decode_body).collect()
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), document_id = %document_id),
        err
    )]
    async fn load(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE tenant_id = $1 AND document_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load", e))?;

        row.as_ref().map(decode_body).transpose()
    }

    #[instrument(
        skip(self, document, events),
        fields(
            document_id = %document.id_typed(),
            version = document.version(),
            event_count = events.len(),
            expected_version = ?expected_version
        ),
        err
    )]
    async fn save(
        &self,
        document: &Document,
        events: &[DocumentEvent],
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let tenant_id = owning_tenant(document)?;
        let document_id = document.id_typed();
        let body = serde_json::to_value(document)
            .map_err(|e| StoreError::Serialization(format!("document body: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let previous = lock_current(&mut tx, tenant_id, document_id).await?;
        let current_version = previous.as_ref().map(AggregateRoot::version);

        if !expected_version.matches(current_version) {
            return abort(
                tx,
                StoreError::Concurrency(format!(
                    "document {document_id}: expected {expected_version:?}, found {current_version:?}"
                )),
            )
            .await;
        }
        let checked = match &previous {
            None => guard::verify_insert(document),
            Some(previous) => guard::verify_update(previous, document),
        };
        if let Err(e) = checked {
            return abort(tx, e.into()).await;
        }
        if let Some(number) = guard::assigned_number(previous.as_ref(), document) {
            let highest =
                match committed_highest(&mut tx, tenant_id, number.prefix(), number.year()).await {
                    Ok(highest) => highest,
                    Err(e) => return abort(tx, e).await,
                };
            if let Err(e) = guard::verify_assigned_number(document, &self.numbering, highest) {
                return abort(tx, e.into()).await;
            }
        }
        let trail = match envelopes(tenant_id, document, events, current_version.unwrap_or(0)) {
            Ok(trail) => trail,
            Err(e) => return abort(tx, e).await,
        };

        let columns = match Columns::of(document) {
            Ok(columns) => columns,
            Err(e) => return abort(tx, e).await,
        };
        let written = if previous.is_none() {
            sqlx::query(
                r#"
                INSERT INTO documents (
                    tenant_id, document_id, kind, status,
                    number, number_prefix, number_year, number_sequence,
                    credit_note_of, version, body
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(document_id.0.as_uuid())
            .bind(columns.kind)
            .bind(columns.status)
            .bind(&columns.number)
            .bind(&columns.number_prefix)
            .bind(columns.number_year)
            .bind(columns.number_sequence)
            .bind(columns.credit_note_of)
            .bind(columns.version)
            .bind(&body)
            .execute(&mut *tx)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE documents
                SET status = $3,
                    number = $4,
                    number_prefix = $5,
                    number_year = $6,
                    number_sequence = $7,
                    version = $8,
                    body = $9,
                    updated_at = now()
                WHERE tenant_id = $1 AND document_id = $2 AND version = $10
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(document_id.0.as_uuid())
            .bind(columns.status)
            .bind(&columns.number)
            .bind(&columns.number_prefix)
            .bind(columns.number_year)
            .bind(columns.number_sequence)
            .bind(columns.version)
            .bind(&body)
            .bind(current_version.unwrap_or(0) as i64)
            .execute(&mut *tx)
            .await
        };

        match written {
            Ok(result) if result.rows_affected() == 1 => {}
            Ok(_) => {
                return abort(
                    tx,
                    StoreError::Concurrency(format!("document {document_id} changed concurrently")),
                )
                .await;
            }
            Err(e) => {
                let err = map_write_error("write_document", e, document);
                return abort(tx, err).await;
            }
        }

        for envelope in &trail {
            sqlx::query(
                r#"
                INSERT INTO document_events (
                    event_id, tenant_id, document_id, aggregate_type,
                    sequence_number, event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(envelope.event_id())
            .bind(tenant_id.as_uuid())
            .bind(document_id.0.as_uuid())
            .bind(envelope.aggregate_type())
            .bind(envelope.sequence_number() as i64)
            .bind(envelope.event_type())
            .bind(envelope.event_version() as i32)
            .bind(envelope.occurred_at())
            .bind(envelope.payload())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), document_id = %document_id),
        err
    )]
    async fn delete(&self, tenant_id: TenantId, document_id: DocumentId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(current) = lock_current(&mut tx, tenant_id, document_id).await? else {
            return abort(tx, DomainError::NotFound.into()).await;
        };
        if let Err(e) = guard::verify_delete(&current) {
            return abort(tx, e.into()).await;
        }

        sqlx::query("DELETE FROM document_events WHERE tenant_id = $1 AND document_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(document_id.0.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_events", e))?;
        sqlx::query("DELETE FROM documents WHERE tenant_id = $1 AND document_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(document_id.0.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_document", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list(
        &self,
        tenant_id: TenantId,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::int IS NULL OR number_year = $4)
            ORDER BY (number IS NULL), number_prefix, number_year, number_sequence
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.year);

        self.fetch_bodies("list", query).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn highest_sequence(
        &self,
        tenant_id: TenantId,
        prefix: &str,
        year: i32,
    ) -> Result<Option<u32>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        highest_in(&mut *conn, tenant_id, prefix, year).await
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), original = %original),
        err
    )]
    async fn find_credit_note_for(
        &self,
        tenant_id: TenantId,
        original: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE tenant_id = $1 AND credit_note_of = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(original.0.as_uuid());

        Ok(self
            .fetch_bodies("find_credit_note_for", query)
            .await?
            .into_iter()
            .next())
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), document_id = %document_id),
        err
    )]
    async fn events(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM document_events
            WHERE tenant_id = $1 AND document_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.0.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("events", e))?;

        rows.iter()
            .map(|row| EventRow::read(row).map(|r| r.into_envelope(tenant_id, document_id.0)))
            .collect()
    }
}

/// Values stored next to the JSONB body.
struct Columns {
    kind: &'static str,
    status: &'static str,
    number: Option<String>,
    number_prefix: Option<String>,
    number_year: Option<i32>,
    number_sequence: Option<i32>,
    credit_note_of: Option<uuid::Uuid>,
    version: i64,
}

impl Columns {
    fn of(document: &Document) -> Result<Self, StoreError> {
        let number = document.number();
        let number_sequence = number.map(sequence_column).transpose()?;
        Ok(Self {
            kind: document.kind().as_str(),
            status: document.status().as_str(),
            number: number.map(ToString::to_string),
            number_prefix: number.map(|n| n.prefix().to_string()),
            number_year: number.map(|n| n.year()),
            number_sequence,
            credit_note_of: document.credit_note_of().map(|of| *of.document_id.0.as_uuid()),
            version: document.version() as i64,
        })
    }
}

fn sequence_column(number: &DocumentNumber) -> Result<i32, StoreError> {
    i32::try_from(number.sequence()).map_err(|_| {
        DomainError::invariant(format!(
            "sequence of number {number} does not fit the sequence column"
        ))
        .into()
    })
}

struct EventRow {
    event_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl EventRow {
    fn read(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let read = || -> Result<Self, sqlx::Error> {
            Ok(Self {
                event_id: row.try_get("event_id")?,
                aggregate_type: row.try_get("aggregate_type")?,
                sequence_number: row.try_get("sequence_number")?,
                event_type: row.try_get("event_type")?,
                event_version: row.try_get("event_version")?,
                occurred_at: row.try_get("occurred_at")?,
                payload: row.try_get("payload")?,
            })
        };
        read().map_err(|e| StoreError::Backend(format!("failed to read event row: {e}")))
    }

    fn into_envelope(self, tenant_id: TenantId, aggregate_id: AggregateId) -> EventEnvelope {
        EventEnvelope::from_stored(
            self.event_id,
            tenant_id,
            aggregate_id,
            self.aggregate_type,
            self.sequence_number as u64,
            self.event_type,
            self.event_version as u32,
            self.occurred_at,
            self.payload,
        )
    }
}

fn decode_body(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| StoreError::Backend(format!("failed to read document body: {e}")))?;
    serde_json::from_value(body)
        .map_err(|e| StoreError::Serialization(format!("document body: {e}")))
}

/// Current committed state of a document, row-locked until the transaction ends.
async fn lock_current(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    document_id: DocumentId,
) -> Result<Option<Document>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT body
        FROM documents
        WHERE tenant_id = $1 AND document_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(document_id.0.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_current", e))?;

    row.as_ref().map(decode_body).transpose()
}

async fn committed_highest(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    prefix: &str,
    year: i32,
) -> Result<Option<u32>, StoreError> {
    highest_in(&mut **tx, tenant_id, prefix, year).await
}

async fn highest_in(
    conn: &mut sqlx::PgConnection,
    tenant_id: TenantId,
    prefix: &str,
    year: i32,
) -> Result<Option<u32>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT MAX(number_sequence) AS highest
        FROM documents
        WHERE tenant_id = $1 AND number_prefix = $2 AND number_year = $3
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(prefix)
    .bind(year)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("highest_sequence", e))?;

    let highest: Option<i32> = row
        .try_get("highest")
        .map_err(|e| StoreError::Backend(format!("failed to read highest sequence: {e}")))?;
    highest
        .map(|h| {
            u32::try_from(h)
                .map_err(|_| StoreError::Backend(format!("negative sequence {h} in storage")))
        })
        .transpose()
}

async fn abort<T>(tx: Transaction<'_, Postgres>, err: StoreError) -> Result<T, StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))?;
    Err(err)
}

/// Unique violations on a document write name the rule that was broken.
fn map_write_error(operation: &str, err: sqlx::Error, document: &Document) -> StoreError {
    if !is_unique_violation(&err) {
        return map_sqlx_error(operation, err);
    }
    let constraint = match &err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
        _ => None,
    };
    match constraint.as_deref() {
        Some(SEQUENCE_CONSTRAINT | NUMBER_CONSTRAINT) => DomainError::sequence_conflict(format!(
            "number {} is already taken",
            document
                .number()
                .map(ToString::to_string)
                .unwrap_or_default()
        ))
        .into(),
        Some(CREDIT_NOTE_CONSTRAINT) => DomainError::conflict(format!(
            "document {} already has a credit note",
            document
                .credit_note_of()
                .map(|of| of.document_id.to_string())
                .unwrap_or_default()
        ))
        .into(),
        _ => StoreError::Concurrency(format!(
            "document {} was inserted concurrently",
            document.id_typed()
        )),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

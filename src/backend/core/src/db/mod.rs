//! Database layer.
//!
//! Uses PostgreSQL with sqlx. Each event table stores the original record as
//! a JSONB document next to the columns used for lookup and ordering.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{ErrorCode, Result, TrailError};
use crate::events::{EventSource, SourceQuery};
use crate::identity::ExerciseIdentity;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            TrailError::new(ErrorCode::MissingConfiguration, "database.url is not set")
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| {
                TrailError::with_internal(
                    ErrorCode::DatabaseConnectionFailed,
                    "Failed to connect to the event database",
                    e.to_string(),
                )
            })?;

        info!(max_connections = config.max_connections, "Connected to event database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Both event sources over this pool.
    pub fn event_sources(&self, assignment_fallback: bool) -> (PgEventSource, PgEventSource) {
        (
            PgEventSource::new(self.pool.clone(), EventTable::Keystrokes)
                .with_assignment_fallback(assignment_fallback),
            PgEventSource::new(self.pool.clone(), EventTable::History)
                .with_assignment_fallback(assignment_fallback),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event Tables
// ═══════════════════════════════════════════════════════════════════════════════

/// The two event tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTable {
    /// Fine-grained editor snapshots.
    Keystrokes,
    /// Run, submission and access actions.
    History,
}

impl EventTable {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Keystrokes => "code_keystrokes",
            Self::History => "code_history",
        }
    }

    pub fn time_column(&self) -> &'static str {
        match self {
            Self::Keystrokes => "timestamp",
            Self::History => "created_at",
        }
    }

    /// Document with the time column written back into it, so records whose
    /// JSON lacks a timestamp still carry the row time.
    ///
    /// Binds: student, assignment (when scoped), alias texts, alias
    /// integers, limit. The exercise filter sits before `LIMIT`, so the
    /// limit counts matching rows only.
    fn select_sql(&self, by_assignment: bool) -> String {
        let (filter, first) = if by_assignment {
            ("user_id = $1 AND assignment_id = $2", 3)
        } else {
            ("user_id = $1", 2)
        };
        let (texts, ints, limit) = (first, first + 1, first + 2);
        format!(
            "SELECT document || jsonb_build_object('{col}', \"{col}\") AS document \
             FROM {table} WHERE {filter} AND ({exercise} OR {problem}) \
             ORDER BY \"{col}\" ASC, id ASC LIMIT ${limit}",
            col = self.time_column(),
            table = self.table(),
            filter = filter,
            exercise = reference_matches("exercise_id", texts, ints),
            problem = reference_matches("problem_index", texts, ints),
            limit = limit,
        )
    }
}

/// Loose match of one document field against the alias set: equal text, or
/// an integral number equal to an integer alias. The `CASE` keeps the cast
/// away from non-numeric values.
fn reference_matches(field: &str, texts: usize, ints: usize) -> String {
    format!(
        "(document->>'{f}' = ANY(${texts}) OR CASE WHEN document->>'{f}' ~ '^[[:space:]]*-?[0-9]+(\\.0+)?[[:space:]]*$' \
         THEN btrim(document->>'{f}')::numeric = ANY(${ints}::numeric[]) ELSE false END)",
        f = field,
        texts = texts,
        ints = ints,
    )
}

/// Text and integer forms of every alias, for the array binds.
fn alias_binds(exercise: &ExerciseIdentity) -> (Vec<String>, Vec<i64>) {
    let mut texts: Vec<String> = Vec::new();
    let mut ints: Vec<i64> = Vec::new();
    for alias in exercise.aliases() {
        let text = alias.as_text();
        if !texts.contains(&text) {
            texts.push(text);
        }
        if let Some(n) = alias.as_int().filter(|n| !ints.contains(n)) {
            ints.push(n);
        }
    }
    (texts, ints)
}

/// Event source backed by one PostgreSQL table.
#[derive(Clone)]
pub struct PgEventSource {
    pool: PgPool,
    table: EventTable,
    assignment_fallback: bool,
}

impl PgEventSource {
    pub fn new(pool: PgPool, table: EventTable) -> Self {
        Self {
            pool,
            table,
            assignment_fallback: true,
        }
    }

    /// When the assignment has no rows for the student, query by student
    /// only. Older rows were written without an assignment id.
    pub fn with_assignment_fallback(mut self, enabled: bool) -> Self {
        self.assignment_fallback = enabled;
        self
    }

    async fn has_assignment_rows(&self, query: &SourceQuery) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE user_id = $1 AND assignment_id = $2)",
            self.table.table()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(&query.student_id)
            .bind(&query.assignment_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl EventSource for PgEventSource {
    fn name(&self) -> &str {
        self.table.table()
    }

    async fn query(&self, query: &SourceQuery) -> Result<Vec<Value>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let by_assignment = !self.assignment_fallback || self.has_assignment_rows(query).await?;

        if !by_assignment {
            debug!(
                table = self.table.table(),
                assignment_id = %query.assignment_id,
                "No rows for assignment, querying by student only"
            );
        }

        let sql = self.table.select_sql(by_assignment);
        let mut statement = sqlx::query_scalar::<_, Value>(&sql).bind(&query.student_id);
        if by_assignment {
            statement = statement.bind(&query.assignment_id);
        }
        let (texts, ints) = alias_binds(&query.exercise);
        let documents = statement
            .bind(texts)
            .bind(ints)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_uses_table_time_column() {
        let sql = EventTable::History.select_sql(true);
        assert!(sql.contains("FROM code_history"));
        assert!(sql.contains("ORDER BY \"created_at\" ASC"));
        assert!(sql.contains("LIMIT $5"));

        let sql = EventTable::Keystrokes.select_sql(false);
        assert!(sql.contains("WHERE user_id = $1 AND ("));
        assert!(sql.contains("LIMIT $4"));
    }

    #[test]
    fn test_exercise_filter_precedes_limit() {
        let sql = EventTable::Keystrokes.select_sql(true);
        let filter = sql.find("document->>'problem_index' = ANY($3)").unwrap();
        assert!(sql.contains("document->>'exercise_id' = ANY($3)"));
        assert!(sql.contains("::numeric = ANY($4::numeric[])"));
        assert!(filter < sql.find("LIMIT").unwrap());
    }

    #[test]
    fn test_alias_binds_cover_every_encoding() {
        let (texts, ints) = alias_binds(&ExerciseIdentity::resolve("3"));
        assert_eq!(texts, vec!["3".to_string(), "2".to_string()]);
        assert_eq!(ints, vec![3, 2]);

        let (texts, ints) = alias_binds(&ExerciseIdentity::resolve("loops"));
        assert_eq!(texts, vec!["loops".to_string()]);
        assert!(ints.is_empty());
    }
}

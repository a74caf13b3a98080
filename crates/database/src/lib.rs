use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod memory;

pub use memory::MemoryStore;
pub use sqlx::Error;
pub use sqlx::Result;

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

// --- Driver Adapter Pattern ---
pub type Driver = Sqlite;
pub type Pool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Infrastructure(sqlx::Error),
    #[error("Resource not found")]
    NotFound,
    #[error("Malformed document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Document store is closed")]
    Closed,
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::PoolClosed => RepositoryError::Closed,
            _ => RepositoryError::Infrastructure(err),
        }
    }
}

/// A stored document together with the identifier the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Equality predicate on a top-level document field.
///
/// A `Null` value matches documents where the field is null or missing.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Handle onto a document database: named collections of JSON documents
/// addressed by store-assigned identifiers.
///
/// Every method is a single round trip to the store. Implementations must be
/// safe to share between concurrent requests.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Stores a new document and returns its identifier.
    async fn insert(&self, collection: &str, data: Value) -> Result<String, RepositoryError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepositoryError>;

    /// Returns the documents matching every filter, ordered by identifier.
    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, RepositoryError>;

    /// Overwrites an existing document. Fails with `NotFound` when absent.
    async fn replace(&self, collection: &str, id: &str, data: Value) -> Result<(), RepositoryError>;

    /// Applies `fields` as a JSON merge patch (RFC 7396) to an existing
    /// document. Fails with `NotFound` when absent.
    async fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError>;

    /// Round trip used by readiness checks.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Releases the underlying connections. Safe to call more than once.
    async fn close(&self);
}

#[derive(Clone)]
pub struct Database {
    pub pool: Pool,
}

impl Database {
    pub async fn new(connection_string: &str) -> sqlx::Result<Self> {
        let options = SqliteConnectOptions::from_str(connection_string)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await?;

        tracing::info!("Document store connected");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("Running migrations...");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await?;
        tracing::info!("Migrations complete.");
        Ok(())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Driver>, filter: &FieldFilter) {
    builder.push(" AND json_extract(data, ");
    builder.push_bind(format!("$.\"{}\"", filter.field));
    match &filter.value {
        Value::Null => {
            builder.push(") IS NULL");
        }
        Value::Bool(b) => {
            builder.push(") = ");
            builder.push_bind(*b);
        }
        Value::Number(n) => {
            builder.push(") = ");
            match n.as_i64() {
                Some(i) => builder.push_bind(i),
                None => builder.push_bind(n.as_f64().unwrap_or_default()),
            };
        }
        Value::String(s) => {
            builder.push(") = ");
            builder.push_bind(s.clone());
        }
        other => {
            builder.push(") = json(");
            builder.push_bind(other.to_string());
            builder.push(")");
        }
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn insert(&self, collection: &str, data: Value) -> Result<String, RepositoryError> {
        let id = uuid::Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(data.to_string())
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepositoryError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, RepositoryError> {
        let mut builder = QueryBuilder::<Driver>::new(
            "SELECT id, data FROM documents WHERE collection = ",
        );
        builder.push_bind(collection.to_string());
        for filter in filters {
            push_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY id");

        let rows = builder
            .build_query_as::<(String, String)>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, raw)| {
                Ok(Document {
                    id,
                    data: serde_json::from_str(&raw)?,
                })
            })
            .collect()
    }

    async fn replace(&self, collection: &str, id: &str, data: Value) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE documents SET data = $1 WHERE collection = $2 AND id = $3",
        )
        .bind(data.to_string())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE documents SET data = json_patch(data, $1) WHERE collection = $2 AND id = $3",
        )
        .bind(Value::Object(fields).to_string())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        self.pool.close().await;
        tracing::info!("Document store connection closed");
    }
}

// do not add #[cfg(test)] here because it hides this method from libraries.
pub async fn get_test_db() -> Database {
    use std::time::{SystemTime, UNIX_EPOCH};

    // Create a unique database file in the temp directory for each test
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let seq = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    let db_path = std::env::temp_dir().join(format!("test_cards_{}_{}.db", now, seq));
    let connection_string = format!("sqlite:{}", db_path.display());

    let options = SqliteConnectOptions::from_str(&connection_string).unwrap()
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1) // Single connection is safer for SQLite tests
        .connect_with(options)
        .await
        .expect("Failed to create test database pool");

    let db = Database { pool };
    db.run_migrations().await.expect("Failed to run migrations");

    db
}

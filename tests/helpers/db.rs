use sea_orm::DatabaseConnection;
use tempfile::NamedTempFile;
use tribune::authz::Schema;
use tribune::storage::sql;

use super::Dataset;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new SQLite test database with all tables created
    pub async fn new(schema: &Schema) -> Self {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = sql::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        sql::create_tables(&connection, schema)
            .await
            .expect("Failed to create tables");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Create a database and insert every row of `dataset`
    pub async fn seeded(schema: &Schema, dataset: &Dataset) -> Self {
        let db = Self::new(schema).await;
        for (rt, row) in dataset.rows() {
            sql::insert_row(db.connection(), schema, *rt, row)
                .await
                .expect("Failed to insert row");
        }
        db
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

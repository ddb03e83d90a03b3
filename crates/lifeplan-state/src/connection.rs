//! Connection bootstrap shared by the Surreal-backed stores.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::info;

use crate::error::{Result, StateError};
use crate::migrations;

/// Connect to an in-memory database and run migrations. For tests.
pub async fn connect_in_memory() -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect("mem://")
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;
    db.use_ns("lifeplan")
        .use_db("main")
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;
    migrations::init_schema(&db).await?;
    info!("connected to in-memory SurrealDB");
    Ok(db)
}

/// Connect using `DATABASE_URL`, falling back to local `surrealkv://` file
/// persistence when it is unset. Runs migrations when `auto_create_schema`.
pub async fn connect_from_env(auto_create_schema: bool) -> Result<Surreal<Any>> {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        let path = ".lifeplan/db";
        format!("surrealkv://{path}")
    });

    let db = surrealdb::engine::any::connect(&url)
        .await
        .map_err(|e| StateError::Connection(format!("failed to connect to {url}: {e}")))?;

    db.use_ns("lifeplan")
        .use_db("main")
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    if auto_create_schema {
        migrations::init_schema(&db).await?;
    }

    info!(url = %url, "connected to SurrealDB");
    Ok(db)
}

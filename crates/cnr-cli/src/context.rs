//! Engine assembly shared by every subcommand.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use cnr_core::{SystemClock, WorkflowConfig};
use cnr_workflow::{init_pool, LogNotifier, PgRequestStore, WorkflowEngine};

/// Default Postgres pool size for CLI processes.
const MAX_CONNECTIONS: u32 = 5;

/// Every subcommand that reads or writes requests needs the shared store;
/// an in-memory stand-in would report on nothing.
pub fn require_database(database_url: Option<&str>) -> Result<&str> {
    match database_url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => bail!("DATABASE_URL is required for this command (set it or pass --database-url)"),
    }
}

/// Build an engine over the Postgres request store at `database_url`.
pub async fn build_engine(database_url: Option<&str>) -> Result<Arc<WorkflowEngine>> {
    let url = require_database(database_url)?;
    let config = WorkflowConfig::from_env().context("invalid workflow configuration")?;

    let pool = init_pool(url, MAX_CONNECTIONS)
        .await
        .context("database initialization failed")?;
    tracing::info!("connected to request store");

    tracing::debug!(?config, "workflow configuration loaded");
    Ok(Arc::new(WorkflowEngine::new(
        Arc::new(PgRequestStore::new(pool)),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        config,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_fails_fast() {
        for url in [None, Some(""), Some("   ")] {
            let err = require_database(url).unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL is required"));
        }
        assert_eq!(
            require_database(Some("postgres://localhost/cnr")).unwrap(),
            "postgres://localhost/cnr"
        );
    }

    #[tokio::test]
    async fn engine_is_not_built_without_a_store() {
        assert!(build_engine(None).await.is_err());
    }
}

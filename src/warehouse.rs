/// Column casting to warehouse-safe primitive types.
pub mod cast;
/// Local directory session writing one JSON-lines file per table.
pub mod jsonl;

use async_trait::async_trait;
use log::{error, info, warn};

use crate::error::{ExtractError, Result};
use crate::powerbi::table::{Snapshot, Table};

pub use cast::cast_for_warehouse;
pub use jsonl::JsonLinesSession;

/// Destination of a snapshot load. Passed in explicitly by the caller.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    async fn create_schema_if_absent(&self, schema: &str) -> Result<()>;

    /// Replace the contents of `schema.table` with `table`.
    async fn overwrite_table(&self, schema: &str, table_name: &str, table: &Table) -> Result<()>;
}

/// Cast and overwrite every non-empty table of `snapshot` under `schema`.
///
/// The first failing table aborts the load with [`ExtractError::Load`].
pub async fn save_snapshot(
    snapshot: &Snapshot,
    schema: &str,
    session: &dyn WarehouseSession,
) -> Result<()> {
    for (table_name, table) in snapshot.iter() {
        info!("Processing table '{}'...", table_name);
        save_table(table_name, table, schema, session)
            .await
            .map_err(|e| {
                error!("Error processing table '{}': {}", table_name, e);
                ExtractError::Load {
                    table: table_name.to_string(),
                    reason: e.to_string(),
                }
            })?;
    }
    Ok(())
}

async fn save_table(
    table_name: &str,
    table: &Table,
    schema: &str,
    session: &dyn WarehouseSession,
) -> Result<()> {
    let casted = cast_for_warehouse(table);
    if casted.is_empty() {
        warn!(
            "Table '{}' has 0 rows after processing. Skipping save operation.",
            table_name
        );
        return Ok(());
    }

    session.create_schema_if_absent(schema).await?;
    session.overwrite_table(schema, table_name, &casted).await?;
    info!(
        "Saved {} rows to {}.{}",
        casted.len(),
        schema,
        table_name
    );
    Ok(())
}

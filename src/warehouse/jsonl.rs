use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{ExtractError, Result};
use crate::powerbi::table::Table;
use crate::warehouse::WarehouseSession;

/// Environment variable that overrides the output root.
pub const OUTPUT_ROOT_ENV: &str = "POWERBI_METADATA_OUTPUT";

/// Writes `<root>/<schema>/<table>.jsonl`, one object per row.
#[derive(Debug, Clone)]
pub struct JsonLinesSession {
    root: PathBuf,
}

impl JsonLinesSession {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$POWERBI_METADATA_OUTPUT`, or `powerbi-metadata` under the local data directory.
    pub fn default_root() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(OUTPUT_ROOT_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("powerbi-metadata"))
            .ok_or_else(|| {
                ExtractError::Config(format!(
                    "No local data directory; set {} to choose an output directory",
                    OUTPUT_ROOT_ENV
                ))
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, schema: &str, table_name: &str) -> PathBuf {
        self.root.join(schema).join(format!("{}.jsonl", table_name))
    }
}

#[async_trait]
impl WarehouseSession for JsonLinesSession {
    async fn create_schema_if_absent(&self, schema: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join(schema)).await?;
        Ok(())
    }

    async fn overwrite_table(&self, schema: &str, table_name: &str, table: &Table) -> Result<()> {
        let mut contents = String::new();
        for row in table.rows() {
            let object: Map<String, Value> = table
                .columns()
                .iter()
                .zip(row)
                .map(|(column, cell)| {
                    serde_json::to_value(cell).map(|value| (column.clone(), value))
                })
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ExtractError::Load {
                    table: table_name.to_string(),
                    reason: e.to_string(),
                })?;
            contents.push_str(&Value::Object(object).to_string());
            contents.push('\n');
        }

        tokio::fs::write(self.table_path(schema, table_name), contents).await?;
        Ok(())
    }
}

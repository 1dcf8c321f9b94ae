use log::{info, warn};
use serde_json::Value;

use crate::LogLevel;
use crate::error::Result;
use crate::powerbi::fetcher::PaginatedFetcher;
use crate::powerbi::flatten::TableShape;
use crate::powerbi::table::{Record, Snapshot, Table};
use crate::powerbi::tables;

const PAGE_SIZE: &str = "5000";
const WORKSPACE_FILTER: &str = "type eq 'Workspace' and state eq 'Active'";
const WORKSPACE_EXPAND: &str = "users,reports,datasets,dataflows";

/// Walks the tenant hierarchy and shapes every entity family into a table.
pub struct MetadataExtractor {
    fetcher: PaginatedFetcher,
    base_url: String,
    admin_base_url: String,
}

/// Rows accumulated for each table before shaping.
#[derive(Default)]
struct Collected {
    capacities: Vec<Record>,
    gateways: Vec<Record>,
    gateway_datasources: Vec<Record>,
    gateway_datasource_users: Vec<Record>,
    workspaces: Vec<Record>,
    workspace_users: Vec<Record>,
    reports: Vec<Record>,
    report_users: Vec<Record>,
    datasets: Vec<Record>,
    dataflows: Vec<Record>,
    apps: Vec<Record>,
    app_users: Vec<Record>,
}

impl MetadataExtractor {
    pub fn new(fetcher: PaginatedFetcher, base_url: &str, admin_base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_base_url: admin_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run the full extraction. Entities are visited one request at a time and
    /// the first failure aborts the run.
    ///
    /// With `include_user_detail` off, `apps`, `app_users` and `report_users`
    /// come back as empty tables.
    pub async fn extract_all(&self, include_user_detail: bool) -> Result<Snapshot> {
        let mut collected = Collected::default();

        info!("--- Fetching Tenant-Level Admin Data ---");
        self.collect_capacities(&mut collected).await?;

        info!("--- Fetching Gateways and their Data Sources and Users ---");
        self.collect_gateways(&mut collected).await?;

        info!("--- Fetching Workspace-Level Data ---");
        self.collect_workspaces(&mut collected).await?;

        if include_user_detail {
            info!("--- Fetching Apps and App Users ---");
            self.collect_apps(&mut collected).await?;

            info!("--- Fetching Report-Level User Access (this may take a long time) ---");
            self.collect_report_users(&mut collected).await?;
        } else {
            info!("--- Skipping Apps, App Users and Report Users ---");
        }

        Ok(collected.into_snapshot())
    }

    async fn records(&self, url: &str, params: Option<&[(&str, &str)]>) -> Result<Vec<Record>> {
        let values = self.fetcher.fetch_all(url, params).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(record) => Some(record),
                other => {
                    warn!("Skipping non-object item from {}: {}", url, other);
                    None
                }
            })
            .collect())
    }

    async fn collect_capacities(&self, collected: &mut Collected) -> Result<()> {
        info!("Fetching Capacities...");
        let url = format!("{}/capacities", self.admin_base_url);
        collected.capacities = self.records(&url, None).await?;
        Ok(())
    }

    async fn collect_gateways(&self, collected: &mut Collected) -> Result<()> {
        let url = format!("{}/gateways", self.base_url);
        let gateways = self.records(&url, None).await?;

        for gateway in gateways {
            let gateway_id = gateway.get("id").cloned().unwrap_or(Value::Null);

            if let Some(gateway_segment) = path_segment(&gateway_id) {
                info!("  - Fetching datasources for Gateway ID: {}", gateway_segment);
                let datasources_url = format!(
                    "{}/gateways/{}/datasources",
                    self.base_url, gateway_segment
                );

                for mut datasource in self.records(&datasources_url, None).await? {
                    datasource.insert("gatewayId".to_string(), gateway_id.clone());
                    let datasource_id = datasource.get("id").cloned().unwrap_or(Value::Null);
                    collected.gateway_datasources.push(datasource);

                    let Some(datasource_segment) = path_segment(&datasource_id) else {
                        continue;
                    };
                    info!(
                        "    - Fetching users for Datasource ID: {} (Gateway: {})",
                        datasource_segment, gateway_segment
                    );
                    let users_url = format!(
                        "{}/gateways/{}/datasources/{}/users",
                        self.base_url, gateway_segment, datasource_segment
                    );
                    for mut user in self.records(&users_url, None).await? {
                        user.insert("gatewayId".to_string(), gateway_id.clone());
                        user.insert("datasourceId".to_string(), datasource_id.clone());
                        collected.gateway_datasource_users.push(user);
                    }
                }
            }

            collected.gateways.push(gateway);
        }

        Ok(())
    }

    async fn collect_workspaces(&self, collected: &mut Collected) -> Result<()> {
        let url = format!("{}/groups", self.admin_base_url);
        let params = [
            ("$top", PAGE_SIZE),
            ("$filter", WORKSPACE_FILTER),
            ("$expand", WORKSPACE_EXPAND),
        ];
        let workspaces = self.records(&url, Some(&params[..])).await?;

        for workspace in workspaces {
            let workspace_id = workspace.get("id").cloned().unwrap_or(Value::Null);
            let workspace_name = workspace.get("name").cloned().unwrap_or(Value::Null);
            info!(
                "Processing Workspace: {} ({})",
                display(&workspace_name),
                display(&workspace_id)
            );

            let tags = [
                ("workspace_id", &workspace_id),
                ("workspace_name", &workspace_name),
            ];
            collected
                .workspace_users
                .extend(tagged_children(&workspace, "users", &tags));
            collected
                .reports
                .extend(tagged_children(&workspace, "reports", &tags));
            collected
                .datasets
                .extend(tagged_children(&workspace, "datasets", &tags));
            collected
                .dataflows
                .extend(tagged_children(&workspace, "dataflows", &tags));

            collected.workspaces.push(workspace);
        }

        Ok(())
    }

    async fn collect_apps(&self, collected: &mut Collected) -> Result<()> {
        let url = format!("{}/apps", self.admin_base_url);
        let apps = self.records(&url, Some(&[("$top", PAGE_SIZE)][..])).await?;

        for app in apps {
            let app_id = app.get("id").cloned().unwrap_or(Value::Null);
            let app_name = app.get("name").cloned().unwrap_or(Value::Null);
            info!(
                "    - Processing App: {} ({})",
                display(&app_name),
                display(&app_id)
            );

            if let Some(app_segment) = path_segment(&app_id) {
                let users_url = format!("{}/apps/{}/users", self.admin_base_url, app_segment);
                for mut user in self.records(&users_url, None).await? {
                    user.insert("app_id".to_string(), app_id.clone());
                    user.insert("app_name".to_string(), app_name.clone());
                    collected.app_users.push(user);
                }
            } else {
                warn!("App without an id; skipping its users");
            }

            collected.apps.push(app);
        }

        Ok(())
    }

    async fn collect_report_users(&self, collected: &mut Collected) -> Result<()> {
        let mut report_users = vec![];

        for report in &collected.reports {
            let report_id = report.get("id").cloned().unwrap_or(Value::Null);
            let report_name = report.get("name").cloned().unwrap_or(Value::Null);
            let workspace_id = report.get("workspace_id").cloned().unwrap_or(Value::Null);

            let (Some(workspace_segment), Some(report_segment)) =
                (path_segment(&workspace_id), path_segment(&report_id))
            else {
                warn!("Report without an id or workspace; skipping its users");
                continue;
            };

            info!(
                "    - Fetching users for Report: {} in Workspace ID: {}",
                display(&report_name),
                workspace_segment
            );
            let users_url = format!(
                "{}/groups/{}/reports/{}/users",
                self.admin_base_url, workspace_segment, report_segment
            );
            for mut user in self.records(&users_url, None).await? {
                user.insert("report_id".to_string(), report_id.clone());
                user.insert("report_name".to_string(), report_name.clone());
                user.insert("workspace_id".to_string(), workspace_id.clone());
                report_users.push(user);
            }
        }

        collected.report_users = report_users;
        Ok(())
    }
}

impl Collected {
    fn into_snapshot(self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let pairs: [(&TableShape, Vec<Record>); 12] = [
            (&tables::CAPACITIES, self.capacities),
            (&tables::GATEWAYS, self.gateways),
            (&tables::GATEWAY_DATASOURCES, self.gateway_datasources),
            (&tables::GATEWAY_DATASOURCE_USERS, self.gateway_datasource_users),
            (&tables::WORKSPACES, self.workspaces),
            (&tables::WORKSPACE_USERS, self.workspace_users),
            (&tables::REPORTS, self.reports),
            (&tables::REPORT_USERS, self.report_users),
            (&tables::DATASETS, self.datasets),
            (&tables::DATAFLOWS, self.dataflows),
            (&tables::APPS, self.apps),
            (&tables::APP_USERS, self.app_users),
        ];
        for (shape, records) in pairs {
            let table: Table = shape.build(records);
            info!("Table '{}': {} rows", shape.name, table.len());
            snapshot.insert(shape.name, table);
        }
        snapshot
    }
}

/// Extract a snapshot with a fresh fetcher using default retry settings.
pub async fn extract_all(
    token: &str,
    base_url: &str,
    admin_base_url: &str,
    verify_tls: bool,
    include_user_detail: bool,
) -> Result<Snapshot> {
    let fetcher = PaginatedFetcher::new(token, verify_tls, LogLevel::Information)?;
    MetadataExtractor::new(fetcher, base_url, admin_base_url)
        .extract_all(include_user_detail)
        .await
}

/// Copies of the `field` list items that are objects, tagged with parent keys.
fn tagged_children(parent: &Record, field: &str, tags: &[(&str, &Value)]) -> Vec<Record> {
    let Some(Value::Array(children)) = parent.get(field) else {
        return vec![];
    };
    children
        .iter()
        .filter_map(Value::as_object)
        .map(|child| {
            let mut child = child.clone();
            for (key, value) in tags {
                child.insert(key.to_string(), (*value).clone());
            }
            child
        })
        .collect()
}

/// URL path segment for an id, or `None` when the id is missing or blank.
fn path_segment(id: &Value) -> Option<String> {
    let raw = match id {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(urlencoding::encode(&raw).into_owned())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

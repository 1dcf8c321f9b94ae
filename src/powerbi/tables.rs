//! Shapes for the twelve tables of a metadata snapshot.

use crate::powerbi::flatten::TableShape;

pub static CAPACITIES: TableShape = TableShape::named("capacities").join_lists(&["admins"]);

pub static GATEWAYS: TableShape =
    TableShape::named("gateways").without(&["publicKey", "gatewayAnnotation"]);

pub static GATEWAY_DATASOURCES: TableShape =
    TableShape::named("gateway_datasources").hoist(&["credentialDetails", "details"]);

pub static GATEWAY_DATASOURCE_USERS: TableShape = TableShape::named("gateway_datasource_users");

pub static WORKSPACES: TableShape = TableShape::named("workspaces").keep_only(&[
    "id",
    "name",
    "isOnDedicatedCapacity",
    "capacityId",
    "type",
    "state",
]);

pub static WORKSPACE_USERS: TableShape = TableShape::named("workspace_users").hoist(&["profile"]);

pub static REPORTS: TableShape = TableShape::named("reports");

pub static REPORT_USERS: TableShape = TableShape::named("report_users").hoist(&["profile"]);

pub static DATASETS: TableShape =
    TableShape::named("datasets").json_text(&["qnaQuestions", "queryMetrics"]);

pub static DATAFLOWS: TableShape = TableShape::named("dataflows");

pub static APPS: TableShape = TableShape::named("apps").datetimes(&["lastUpdateDateTime"]);

pub static APP_USERS: TableShape = TableShape::named("app_users").hoist(&["profile"]);

//! Tenants the authorized principal has connected to the application

use crate::client::TenantClient;
use crate::error::AuthError;
use log::info;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One connected tenant as reported by the connections endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub tenant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

/// List the tenants the client's principal has connected
pub async fn list_connections(
    client: &TenantClient,
    connections_url: &str,
    cancel: &CancellationToken,
) -> Result<Vec<Connection>, AuthError> {
    client.get_json(connections_url, cancel).await
}

/// Disconnect one tenant from the application
pub async fn remove_connection(
    client: &TenantClient,
    connections_url: &str,
    id: Uuid,
    cancel: &CancellationToken,
) -> Result<(), AuthError> {
    let url = format!("{}/{}", connections_url.trim_end_matches('/'), id);
    client.delete(&url, cancel).await?;
    info!("Removed connection {} for {}", id, client.principal());
    Ok(())
}

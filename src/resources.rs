//! Read-only resources exposed next to the tools.

use crate::{
    client::{ApiClient, RequestOptions},
    error::Result,
    schema::{ReadResourceResult, Resource, TextResourceContents},
};

pub const DASHBOARD_URI: &str = "messengerflow://dashboard";

pub fn dashboard() -> Resource {
    Resource {
        uri: DASHBOARD_URI.to_string(),
        name: "dashboard".to_string(),
        description: Some(
            "Dashboard stats — messages sent, leads reached, active campaigns, response rate"
                .to_string(),
        ),
        mime_type: Some("application/json".to_string()),
    }
}

/// Current dashboard stats, pretty-printed.
pub async fn read_dashboard(client: &ApiClient) -> Result<ReadResourceResult> {
    let data = client.call("/dashboard/stats", RequestOptions::default()).await?;
    Ok(ReadResourceResult {
        contents: vec![TextResourceContents {
            uri: DASHBOARD_URI.to_string(),
            mime_type: Some("application/json".to_string()),
            text: serde_json::to_string_pretty(&data)?,
        }],
    })
}

//! Raw API request command handler

use std::sync::Arc;

use crate::api::ApiRequest;
use crate::cli::commands::RequestArgs;
use crate::cli::context::{build_client, CliNavigator};
use crate::core::config::Config;
use crate::error::{LookbookError, Result};

/// Handle `lookbook request`
pub async fn handle_request(args: RequestArgs) -> Result<()> {
    let request = build_request(&args)?;

    let config = Config::load()?;
    let client = build_client(&config, Arc::new(CliNavigator::new(false)))?;

    let response = client.send(request).await?;

    if args.include_status {
        println!("{}", response.status);
    }
    println!("{}", pretty_body(&response.body));

    if !response.is_success() {
        return Err(LookbookError::Api {
            status: response.status.as_u16(),
            body: response.body.chars().take(200).collect(),
        });
    }
    Ok(())
}

/// Turn CLI arguments into an [`ApiRequest`]
fn build_request(args: &RequestArgs) -> Result<ApiRequest> {
    let mut request = ApiRequest::new(args.method.as_method(), args.path.clone());

    for pair in &args.query {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            LookbookError::InvalidInput(format!(
                "Invalid query parameter '{}'. Expected KEY=VALUE",
                pair
            ))
        })?;
        request = request.query(key, value);
    }

    if let Some(data) = &args.data {
        let body: serde_json::Value = serde_json::from_str(data).map_err(|e| {
            LookbookError::InvalidInput(format!("--data is not valid JSON: {}", e))
        })?;
        request = request.json(&body)?;
    }

    Ok(request)
}

/// Pretty-print JSON bodies; anything else is shown as received
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

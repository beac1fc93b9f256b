use crate::errors::ClientError;
use crate::managers::api_handle::ApiHandle;
use crate::utils::url::join_path;

/// Maps the status of a credential check to pass or fail.
///
/// With API keys in use only 401, 404 and 500 fail. Without them any
/// non-2xx status fails.
pub fn interpret_check_status(api_name: &str, use_api_key: bool, status: u16) -> Result<(), ClientError> {
    if !use_api_key {
        if (200..300).contains(&status) {
            return Ok(());
        }
        return Err(ClientError::bad_status(
            status,
            format!("API check failed for {}, got status {}", api_name, status),
        ));
    }
    match status {
        401 => Err(ClientError::credential_invalid(format!("Bad API key for {}", api_name))
            .with_details(serde_json::json!({"status": status}))),
        404 => Err(ClientError::bad_status(
            status,
            format!("Check API functionality not implemented on {}", api_name),
        )),
        500 => Err(ClientError::credential_invalid(format!(
            "Got 500 response on checkAPI call, most likely a bad API key for {}",
            api_name
        ))
        .with_details(serde_json::json!({"status": status}))),
        _ => Ok(()),
    }
}

pub fn check_path(handle: &ApiHandle) -> String {
    let config = handle.config();
    join_path(&["/", config.base_path.as_str(), config.status_check_path()])
}

/// Runs `GET {basePath}/{statusCheckPath}` and interprets the status.
pub async fn check_api(handle: &ApiHandle) -> Result<(), ClientError> {
    let outcome = handle.executor().get(check_path(handle)).await?;
    interpret_check_status(handle.name(), handle.config().use_api_key, outcome.status())
}

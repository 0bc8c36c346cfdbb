//! Shared helpers for command handlers.

use obsrelay_core::{ConnectError, CoreError};
use serde_json::Value;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Name the tenant instead of the socket URL when a connect fails.
pub fn connect_failure(tenant: &str, err: CoreError) -> CliError {
    match err {
        CoreError::Connect(
            ref connect @ (ConnectError::Failed { .. } | ConnectError::Security { .. }),
        ) => CliError::ConnectionFailed {
            target: tenant.to_owned(),
            message: connect.to_string(),
        },
        other => other.into(),
    }
}

/// Confirmation line on stderr for writes, unless `--quiet`.
pub fn done(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("{message}");
    }
}

/// `--data` for raw calls: a JSON object, or `{}` when omitted.
pub fn parse_request_data(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw else {
        return Ok(Value::Object(serde_json::Map::new()));
    };
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::Validation {
            field: "--data".into(),
            reason: "request data must be a JSON object".into(),
        })
    }
}

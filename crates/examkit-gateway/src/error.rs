//! Mapping from HTTP responses and transport failures to `GatewayError`.

use serde::Deserialize;

use examkit_core::error::GatewayError;

/// Error body returned by the gateway: `{reason, message}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Map a machine-readable `reason` to an error, if it is one we know.
pub(crate) fn error_from_reason(reason: &str, status: u16, message: String) -> Option<GatewayError> {
    match reason {
        "duplicate" => Some(GatewayError::Duplicate(message)),
        "unauthorized" => Some(GatewayError::Unauthorized(message)),
        "validation" => Some(GatewayError::Validation(message)),
        "server_error" => Some(GatewayError::Server { status, message }),
        _ => None,
    }
}

/// Classify a non-success response. `subject` names the resource for 404s.
pub(crate) fn error_from_response(status: u16, body: &str, subject: &str) -> GatewayError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.to_string()
            }
        });

    if let Some(error) = parsed
        .reason
        .as_deref()
        .and_then(|reason| error_from_reason(reason, status, message.clone()))
    {
        return error;
    }

    match status {
        401 => GatewayError::Unauthorized(message),
        403 => GatewayError::Forbidden(message),
        404 => GatewayError::NotFound(subject.to_string()),
        409 => GatewayError::Duplicate(message),
        400 | 422 => GatewayError::Validation(message),
        408 | 429 => GatewayError::Server { status, message },
        s if s >= 500 => GatewayError::Server { status, message },
        _ => GatewayError::Validation(message),
    }
}

/// Classify a request that never produced a response.
pub(crate) fn error_from_transport(e: &reqwest::Error, timeout_secs: u64) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout_secs)
    } else {
        GatewayError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_takes_precedence_over_status() {
        let err = error_from_response(
            400,
            r#"{"reason": "duplicate", "message": "attempt already graded"}"#,
            "a1",
        );
        assert_eq!(err, GatewayError::Duplicate("attempt already graded".into()));
    }

    #[test]
    fn status_mapping_without_body() {
        assert_eq!(
            error_from_response(404, "", "a1"),
            GatewayError::NotFound("a1".into())
        );
        assert_eq!(
            error_from_response(403, "", "a1"),
            GatewayError::Forbidden("HTTP 403".into())
        );
        assert!(matches!(
            error_from_response(503, "down for maintenance", "a1"),
            GatewayError::Server { status: 503, message } if message == "down for maintenance"
        ));
        assert!(matches!(
            error_from_response(422, "{}", "a1"),
            GatewayError::Validation(_)
        ));
    }

    #[test]
    fn unknown_reason_falls_back_to_status() {
        let err = error_from_response(502, r#"{"reason": "teapot"}"#, "a1");
        assert!(matches!(err, GatewayError::Server { status: 502, .. }));
    }
}

use serde::Serialize;
use thiserror::Error;

/// Failures surfaced to the MCP caller.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Rejected before any download was attempted.
    #[error("Invalid parameter `{field}`: {message}")]
    InvalidParameter { field: String, message: String },
    /// The download routine failed; `message` is its own.
    #[error("Error downloading stock data: {message}")]
    UpstreamFailure { message: String },
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::UpstreamFailure {
            message: format!("{err:#}"),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParameter { .. } => ErrorCategory::InvalidParameter,
            Self::UpstreamFailure { .. } => ErrorCategory::UpstreamFailure,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let field = match self {
            Self::InvalidParameter { field, .. } => Some(field.clone()),
            Self::UpstreamFailure { .. } => None,
        };
        ErrorBody {
            error: ErrorDetail {
                category: self.category(),
                message: self.to_string(),
                field,
            },
        }
    }

    /// JSON text of [`ErrorBody`], as returned in an error tool result.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_body()).unwrap_or_else(|_| self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidParameter,
    UpstreamFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn invalid_parameter_body_names_field() {
        let err = ToolError::invalid("period", "expected one of 1d, 5d");
        let body: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
        assert_eq!(body["error"]["category"], "invalid_parameter");
        assert_eq!(body["error"]["field"], "period");
        assert_eq!(
            body["error"]["message"],
            "Invalid parameter `period`: expected one of 1d, 5d"
        );
    }

    #[test]
    fn upstream_failure_keeps_context_chain() {
        let source: anyhow::Result<()> =
            Err(anyhow::anyhow!("HTTP 404")).context("ZZZZ: request failed");
        let err = ToolError::upstream(&source.unwrap_err());
        assert_eq!(err.category(), ErrorCategory::UpstreamFailure);

        let body: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
        assert_eq!(body["error"]["category"], "upstream_failure");
        assert!(body["error"].get("field").is_none());
        assert_eq!(
            body["error"]["message"],
            "Error downloading stock data: ZZZZ: request failed: HTTP 404"
        );
    }
}

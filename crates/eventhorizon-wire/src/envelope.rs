use std::fmt;

use serde::{Deserialize, Serialize};

/// Plain error body returned with any non-conflict failure status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub response_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_type: String,
}

impl ErrorResponse {
    /// Used when the body is empty or not JSON.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = body.trim();
        Self {
            response_code: status,
            message: if message.is_empty() {
                format!("request failed with status {status}")
            } else {
                message.chars().take(500).collect()
            },
            error_type: String::new(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error_type.is_empty() {
            write!(f, "{} ({})", self.message, self.response_code)
        } else {
            write!(
                f,
                "{}: {} ({})",
                self.error_type, self.message, self.response_code
            )
        }
    }
}

/// One page of a cursor-paginated list. No `next_token` means the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl<T> Default for ListPage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_response_display_includes_type_and_code() {
        let err: ErrorResponse = serde_json::from_value(json!({
            "responseCode": 403,
            "message": "tenant is suspended",
            "errorType": "Forbidden",
        }))
        .expect("decode");
        assert_eq!(err.to_string(), "Forbidden: tenant is suspended (403)");
    }

    #[test]
    fn from_status_falls_back_for_empty_body() {
        let err = ErrorResponse::from_status(502, "  ");
        assert_eq!(err.message, "request failed with status 502");
        assert_eq!(err.response_code, 502);
    }

    #[test]
    fn list_page_without_token_is_last() {
        let page: ListPage<String> =
            serde_json::from_value(json!({"items": ["a"]})).expect("decode");
        assert_eq!(page.items, vec!["a"]);
        assert!(page.next_token.is_none());
    }
}

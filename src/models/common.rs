use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// 统一响应外壳：`{"success": bool, "data"?, "message"?, "error"?}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
            error: None,
        }
    }
}

/// 更新请求中的可空字段：缺省为 None（不修改），显式 null 为 Some(None)（清空）
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ApiResponse<()> {
    pub fn error(code: String, message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(ApiError { code, message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_skips_empty_fields() {
        let body = serde_json::to_value(ApiResponse::success(3)).unwrap();
        assert_eq!(body, json!({ "success": true, "data": 3 }));
    }

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        limit: Option<Option<i64>>,
    }

    #[test]
    fn test_double_option_distinguishes_null_from_missing() {
        let missing: Patch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.limit, None);
        let cleared: Patch = serde_json::from_value(json!({ "limit": null })).unwrap();
        assert_eq!(cleared.limit, Some(None));
        let set: Patch = serde_json::from_value(json!({ "limit": 3 })).unwrap();
        assert_eq!(set.limit, Some(Some(3)));
    }

    #[test]
    fn test_error_envelope() {
        let body = serde_json::to_value(ApiResponse::error(
            "EXPIRED".to_string(),
            "Promotion has expired".to_string(),
        ))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "success": false,
                "error": { "code": "EXPIRED", "message": "Promotion has expired" }
            })
        );
    }
}

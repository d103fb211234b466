use crate::domain::error::{AppError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// File upload carried in JSON. Exactly one of `content` (text, e.g. CSV)
/// or `content_base64` (binary, e.g. XLSX) must be set.
#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(range(min = 1))]
    pub owner_user_id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_base64: Option<String>,
}

impl IngestRequest {
    pub fn payload(&self) -> Result<Vec<u8>> {
        match (&self.content, &self.content_base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| AppError::ValidationError(format!("Invalid base64 content: {}", e))),
            _ => Err(AppError::ValidationError(
                "Exactly one of content or content_base64 is required".to_string(),
            )),
        }
    }
}

/// Trusted row read; only the dataset's owner may run it
#[derive(Debug, Default, Deserialize, Validate)]
pub struct DataRequest {
    #[validate(range(min = 1))]
    pub owner_user_id: i64,
    #[validate(range(min = 1, max = 10000))]
    pub limit: Option<usize>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub where_clause: Option<String>,
}

/// Untrusted SQL, usually produced by a language model
#[derive(Debug, Deserialize, Validate)]
pub struct CandidateQueryRequest {
    #[validate(length(min = 1, max = 20000))]
    pub sql: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(range(min = 1))]
    pub owner_user_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub project_name: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
    pub dataset_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Run derive validation, mapping failures to `ValidationError`
pub fn validated<T: Validate>(req: T) -> Result<T> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content: Option<&str>, content_base64: Option<&str>) -> IngestRequest {
        IngestRequest {
            file_name: "a.csv".to_string(),
            owner_user_id: 1,
            content: content.map(str::to_string),
            content_base64: content_base64.map(str::to_string),
        }
    }

    #[test]
    fn test_payload_requires_exactly_one_source() {
        assert_eq!(upload(Some("a\n1\n"), None).payload().unwrap(), b"a\n1\n");
        assert_eq!(upload(None, Some("YSwxCg==")).payload().unwrap(), b"a,1\n");
        assert!(upload(None, None).payload().is_err());
        assert!(upload(Some("x"), Some("eA==")).payload().is_err());
        assert!(upload(None, Some("***")).payload().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        let mut req = upload(Some("a"), None);
        req.file_name = String::new();
        assert!(matches!(validated(req), Err(AppError::ValidationError(_))));

        let mut req = upload(Some("a"), None);
        req.owner_user_id = 0;
        assert!(validated(req).is_err());

        let data = DataRequest {
            owner_user_id: 1,
            limit: Some(0),
            ..Default::default()
        };
        assert!(validated(data).is_err());
        assert!(validated(DataRequest::default()).is_err());
        let data = DataRequest {
            owner_user_id: 1,
            ..Default::default()
        };
        assert!(validated(data).is_ok());
    }
}

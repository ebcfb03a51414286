//! Bearer credentials
//!
//! Token generation and refresh happen elsewhere; this module only reads a
//! token that is assumed to stay valid for the duration of a run.

use crate::error::AppError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Supplies the bearer token for authenticated endpoints
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token
    fn bearer_token(&self) -> Result<String, AppError>;
}

/// On-disk layout of the credentials file
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    token: Option<String>,
}

/// Token read once from a JSON credentials file (`{"key", "secret", "token"}`)
pub struct FileCredentials {
    token: String,
}

impl FileCredentials {
    /// Load the token from `path`
    ///
    /// # Errors
    /// * `AppError::Credentials` if the file cannot be read or parsed, or if it
    ///   holds no token.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Credentials(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let parsed: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            AppError::Credentials(format!(
                "Failed to parse credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        match parsed.token {
            Some(token) if !token.trim().is_empty() => {
                tracing::info!("Token available but please note that it can be expired");
                Ok(Self {
                    token: token.trim().to_string(),
                })
            }
            _ => Err(AppError::Credentials(format!(
                "No token in {}, please generate a valid token",
                path.display()
            ))),
        }
    }
}

impl CredentialProvider for FileCredentials {
    fn bearer_token(&self) -> Result<String, AppError> {
        Ok(self.token.clone())
    }
}

impl fmt::Debug for FileCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Fixed token, for embedding and tests
pub struct StaticCredentials(String);

impl StaticCredentials {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Result<String, AppError> {
        if self.0.is_empty() {
            return Err(AppError::Credentials("Bearer token is empty".into()));
        }
        Ok(self.0.clone())
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredentials(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn credentials_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_token() {
        let file = credentials_file(r#"{"key": "k", "secret": "s", "token": " abc123 "}"#);
        let creds = FileCredentials::load(file.path()).unwrap();
        assert_eq!(creds.bearer_token().unwrap(), "abc123");
        assert!(!format!("{:?}", creds).contains("abc123"));
    }

    #[test]
    fn test_missing_token() {
        let file = credentials_file(r#"{"key": "k", "secret": "s"}"#);
        let err = FileCredentials::load(file.path()).unwrap_err();
        assert!(matches!(err, AppError::Credentials(_)));
        assert!(err.to_string().contains("generate a valid token"));
    }

    #[test]
    fn test_unreadable_file() {
        let err = FileCredentials::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read credentials file"));
    }

    #[test]
    fn test_static_credentials() {
        assert_eq!(StaticCredentials::new("t").bearer_token().unwrap(), "t");
        assert!(StaticCredentials::new("").bearer_token().is_err());
    }
}

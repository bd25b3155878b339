use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertificateCodeError {
    #[error("certificate code cannot be empty")]
    Empty,
}

/// Opaque token printed on a certificate.
///
/// Assigned at most once per sitting, on the first passing finalize;
/// consumers never decode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateCode(String);

impl CertificateCode {
    /// Generates a fresh code.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Rehydrates a code from storage.
    ///
    /// # Errors
    ///
    /// Returns `CertificateCodeError::Empty` for a blank token.
    pub fn from_persisted(code: impl Into<String>) -> Result<Self, CertificateCodeError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(CertificateCodeError::Empty);
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

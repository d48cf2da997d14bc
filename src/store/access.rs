//! Access tokens for local databases
//!
//! A database directory may hold `access.token`: the SHA-256 of the
//! accepted credential, URL-safe base64. Raw credentials are never stored.

use std::fs;
use std::io;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{EngineError, EngineResult};

pub const ACCESS_TOKEN_FILE: &str = "access.token";

/// Hash a credential for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check `credentials` against the database's access token, if it has one
pub fn verify(database_dir: &Path, credentials: Option<&str>) -> EngineResult<()> {
    let expected = match fs::read_to_string(database_dir.join(ACCESS_TOKEN_FILE)) {
        Ok(contents) => contents.trim().to_string(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(EngineError::connection(format!(
                "cannot read access token: {}",
                e
            )))
        }
    };

    let presented = credentials.ok_or_else(|| EngineError::auth("credentials required"))?;
    if constant_time_str_eq(&hash_token(presented), &expected) {
        Ok(())
    } else {
        Err(EngineError::auth("credentials rejected"))
    }
}

/// Install an access token for a database directory
pub fn install(database_dir: &Path, token: &str) -> io::Result<()> {
    fs::write(database_dir.join(ACCESS_TOKEN_FILE), hash_token(token))
}

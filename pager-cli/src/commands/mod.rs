//! CLI command implementations.

pub mod sign_in;

use anyhow::{Context, Result};

/// Use `secret_key` if given, otherwise prompt for it without echo.
pub fn resolve_secret(secret_key: Option<&str>) -> Result<String> {
    let secret = match secret_key {
        Some(secret) => secret.to_string(),
        None => rpassword::prompt_password("Secret key: ").context("Failed to read secret key")?,
    };

    let trimmed = secret.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Secret key must not be empty");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_secret_is_trimmed() {
        assert_eq!(resolve_secret(Some("  s3cret \n")).unwrap(), "s3cret");
    }

    #[test]
    fn blank_secret_is_rejected() {
        assert!(resolve_secret(Some("   ")).is_err());
    }
}

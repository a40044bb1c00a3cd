use crate::error::{BentoError, Result};

/// Bento names become docker container names and hostnames.
pub fn validate_bento_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(BentoError::invalid_name(name, "name is empty"));
    };

    if !first.is_ascii_alphanumeric() {
        return Err(BentoError::invalid_name(
            name,
            "name must start with a letter or digit",
        ));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(BentoError::invalid_name(
            name,
            "name may only contain [A-Za-z0-9_.-]",
        ));
    }
    Ok(())
}

/// Platform versions are image tags, e.g. `cdh5.0.3`.
pub fn validate_platform_version(version: &str) -> Result<()> {
    let is_safe = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));

    if !is_safe {
        return Err(BentoError::invalid_name(version, "invalid platform version"));
    }

    Ok(())
}

//! Target identifier normalization.

use anyhow::{Result, anyhow};

/// Lower-case and validate a target identifier.
///
/// Targets become path components (`data/<target>/…`, `<target>_parser.py`), so only
/// `[a-z0-9._-]` is accepted and `.`/`..` are rejected.
pub fn normalize_target(raw: &str) -> Result<String> {
    let target = raw.trim().to_lowercase();
    if target.is_empty() {
        return Err(anyhow!("target must not be empty"));
    }
    if target == "." || target == ".." {
        return Err(anyhow!("target must not be '{target}'"));
    }
    if target
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("target must be [a-z0-9._-] only (got '{raw}')"));
    }
    Ok(target)
}

//! Semantic validation for parsed sync configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::config::types::{StateBackendKind, SyncConfig};

/// Validate a parsed sync configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the sync config.
pub fn validate_sync(config: &SyncConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported sync version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config.state.backend == StateBackendKind::Memory && config.state.path.is_some() {
        errors.push("State backend 'memory' does not take a path".to_string());
    }

    if config.streams.is_empty() {
        errors.push("Sync must define at least one stream".to_string());
    }

    let mut seen = HashSet::new();
    for (i, stream) in config.streams.iter().enumerate() {
        if stream.name.trim().is_empty() {
            errors.push(format!("Stream {i} has an empty name"));
            continue;
        }
        let identity = stream.identity();
        if !seen.insert(identity.clone()) {
            errors.push(format!("Stream '{identity}' is defined more than once"));
        }
        if stream.cursor_field.trim().is_empty()
            || stream.cursor_field.split('.').any(str::is_empty)
        {
            errors.push(format!(
                "Stream '{identity}' has an invalid cursor_field '{}'",
                stream.cursor_field
            ));
        }
        if let Err(e) = stream.initial_cursor_value() {
            errors.push(format!("Stream '{identity}' initial_cursor: {e}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Sync validation failed:\n  - {}", errors.join("\n  - "));
    }
}

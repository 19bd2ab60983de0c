//! Supplier profile file (`config/suppliers.yaml`).
//!
//! Lists the external suppliers this deployment talks to. The engine works
//! against one supplier API today, but ids flow through every table, so the
//! profile file is the single place a new supplier gets declared.

use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SupplierProfile {
    /// Stable id used in `supplier_id` columns and webhook routes.
    pub id: String,
    pub name: String,
    /// Per-supplier API base URL override; falls back to the global one.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SupplierFile {
    suppliers: Vec<SupplierProfile>,
}

/// Loads supplier profiles from a YAML file.
///
/// # Errors
///
/// Returns [`ConfigError::SupplierProfiles`] if the file cannot be read or
/// parsed, or if two profiles share an id.
pub fn load_supplier_profiles(path: &Path) -> Result<Vec<SupplierProfile>, ConfigError> {
    let err = |reason: String| ConfigError::SupplierProfiles {
        path: path.display().to_string(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
    let file: SupplierFile = serde_yaml::from_str(&raw).map_err(|e| err(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    for profile in &file.suppliers {
        if !seen.insert(profile.id.as_str()) {
            return Err(err(format!("duplicate supplier id '{}'", profile.id)));
        }
    }

    Ok(file.suppliers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(tag: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("suppliers-{tag}-{}.yaml", std::process::id()));
        std::fs::write(&path, contents).expect("write temp suppliers file");
        path
    }

    #[test]
    fn loads_profiles_with_defaults() {
        let path = write_temp(
            "defaults",
            "suppliers:\n  - id: cjd\n    name: CJ Dropshipping\n  - id: alt\n    name: Alternate\n    enabled: false\n",
        );
        let profiles = load_supplier_profiles(&path).expect("profiles");
        std::fs::remove_file(&path).ok();

        assert_eq!(profiles.len(), 2);
        assert!(profiles[0].enabled, "enabled defaults to true");
        assert!(!profiles[1].enabled);
        assert!(profiles[0].base_url.is_none());
    }

    #[test]
    fn rejects_duplicate_supplier_ids() {
        let path = write_temp(
            "dupes",
            "suppliers:\n  - id: cjd\n    name: A\n  - id: cjd\n    name: B\n",
        );
        let result = load_supplier_profiles(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::SupplierProfiles { .. })));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_supplier_profiles(Path::new("/nonexistent/suppliers.yaml"));
        assert!(matches!(result, Err(ConfigError::SupplierProfiles { .. })));
    }
}

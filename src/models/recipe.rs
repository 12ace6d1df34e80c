use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("Failed to read rule set {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule set {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Ordered set of human-readable classification rules
///
/// Supplied by the caller per session and never mutated by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<String>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<String>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Load a rule set from a JSON file: `{"name": "...", "rules": ["..."]}`
    pub fn from_file(path: &Path) -> Result<Self, RuleSetError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuleSetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RuleSetError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rules joined one per line, in order
    pub fn render(&self) -> String {
        self.rules.join("\n")
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            name: "ACME Corp Enterprise Sort".to_string(),
            rules: vec![
                "1. If a file is an invoice or mentions a vendor (e.g., AWS, Stripe), move to 'Finance/Invoices/[VendorName]'.".to_string(),
                "2. If it mentions a specific Project (Alpha, Beta, Phoenix, etc.), move to 'Projects/[ProjectName]'.".to_string(),
                "3. If it is related to a specific department (HR, Marketing, Engineering) but not a project, move to 'Departments/[DepartmentName]'.".to_string(),
                "4. If it is a technical document (Technical Spec, Audit Report, SQL Database), move to 'Engineering/Technical'.".to_string(),
                "5. If it is a personal or miscellaneous item (like a Grocery List), move to 'Personal/Unsorted'.".to_string(),
                "6. Always rename files to a clean 'DocumentType_Project_Date' format if they are currently messy.".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_rules_are_ordered() {
        let rules = RuleSet::default();
        assert_eq!(rules.rules.len(), 6);
        assert!(rules.render().starts_with("1. If a file is an invoice"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"name": "Mini", "rules": ["invoice -> Finance"]}"#).unwrap();

        let rules = RuleSet::from_file(&path).unwrap();
        assert_eq!(rules.name, "Mini");
        assert_eq!(rules.rules, vec!["invoice -> Finance".to_string()]);
    }

    #[test]
    fn test_from_file_missing() {
        let err = RuleSet::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, RuleSetError::Read { .. }));
        assert!(err.to_string().starts_with("Failed to read rule set /definitely/not/here.json"));
    }

    #[test]
    fn test_from_file_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"name": "Mini"}"#).unwrap();

        let err = RuleSet::from_file(&path).unwrap_err();
        assert!(matches!(err, RuleSetError::Parse { .. }));
        assert!(err.to_string().contains("rules"));
    }
}

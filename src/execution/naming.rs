//! Collision-free destination naming
//!
//! `report.pdf` is tried as-is, then `report_1.pdf`, `report_2.pdf`, ...
//! until a free identifier is found or the attempt budget runs out.

use crate::storage::{join_path, split_extension, StorageBackend, StorageError};

/// Name for the `attempt`-th try (0 = unchanged)
pub fn candidate_name(file_name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    let (stem, ext) = split_extension(file_name);
    format!("{}_{}{}", stem, attempt, ext)
}

/// First identifier under `container` that does not exist yet
///
/// Existence is checked before each attempt; a concurrent writer can still
/// take the name between the check and the move.
pub async fn free_identifier(
    backend: &dyn StorageBackend,
    container: &str,
    file_name: &str,
    max_attempts: usize,
) -> Result<String, StorageError> {
    for attempt in 0..max_attempts.max(1) {
        let candidate = join_path(container, &candidate_name(file_name, attempt));
        if !backend.exists(&candidate).await? {
            if attempt > 0 {
                tracing::debug!("[Executor] {} taken {} time(s), using {}", file_name, attempt, candidate);
            }
            return Ok(candidate);
        }
    }

    Err(StorageError::AlreadyExists(format!(
        "no free name for {} in '{}' after {} attempts",
        file_name, container, max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("grocery_list.txt", 0), "grocery_list.txt");
        assert_eq!(candidate_name("grocery_list.txt", 1), "grocery_list_1.txt");
        assert_eq!(candidate_name("archive.tar.gz", 2), "archive.tar_2.gz");
        assert_eq!(candidate_name("README", 3), "README_3");
    }

    #[tokio::test]
    async fn test_nth_collision_gets_next_suffix() {
        let backend = MemoryBackend::new();
        backend.insert("Personal/grocery_list.txt", "milk");
        backend.insert("Personal/grocery_list_1.txt", "eggs");
        backend.insert("Personal/grocery_list_2.txt", "bread");

        let id = free_identifier(&backend, "Personal", "grocery_list.txt", 100).await.unwrap();
        assert_eq!(id, "Personal/grocery_list_3.txt");
    }

    #[tokio::test]
    async fn test_attempt_budget_exhausted() {
        let backend = MemoryBackend::new();
        backend.insert("Personal/a.txt", "1");
        backend.insert("Personal/a_1.txt", "2");

        let err = free_identifier(&backend, "Personal", "a.txt", 2).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }
}

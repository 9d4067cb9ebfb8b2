//! Session and task identifier utilities

use uuid::Uuid;

/// Generate a new task identifier
pub fn new_task_id() -> Uuid {
    Uuid::new_v4()
}

/// Use the caller-supplied session id, or generate one when absent or blank
pub fn resolve_session_id(supplied: Option<&str>) -> String {
    match supplied.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplied_id_is_kept() {
        assert_eq!(resolve_session_id(Some("batch-42")), "batch-42");
    }

    #[test]
    fn test_blank_id_is_generated() {
        let generated = resolve_session_id(Some("   "));
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_ne!(resolve_session_id(None), resolve_session_id(None));
    }
}

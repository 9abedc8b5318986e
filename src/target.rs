// Target identity helpers
//
// Each bridge exposes exactly one debuggable target, identified by a
// freshly generated RFC 4122 version 4 UUID that is stable for the
// bridge's lifetime.

use std::path::Path;

use uuid::Uuid;

/// Generate a target id: lowercase hex in the standard 8-4-4-4-12 grouping.
pub fn generate_target_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolve a script name to its canonical absolute path.
///
/// Empty input yields empty output, and so does a path that cannot be
/// resolved; the target URL is advisory metadata, not a hard requirement.
pub fn resolve_script_path(script_name: &str) -> String {
    if script_name.is_empty() {
        return String::new();
    }
    match std::fs::canonicalize(Path::new(script_name)) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => String::new(),
    }
}

/// Human-readable process name, used as the target title when no script
/// name was configured.
pub fn process_title() -> String {
    let name = std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "inspector".to_string());
    format!("{}[{}]", name, std::process::id())
}

/// Portable "is this tool on PATH" probe. Delegates to the `which` crate
/// rather than hand-rolling a `where`/`which` subprocess call — it already
/// handles the Windows/Unix split and `PATHEXT` correctly.
pub fn is_tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_tool_that_must_exist_on_any_posix_box() {
        // `sh` is present on every CI runner and dev box this crate targets.
        assert!(is_tool_available("sh") || is_tool_available("cmd"));
    }

    #[test]
    fn rejects_a_made_up_tool_name() {
        assert!(!is_tool_available("definitely-not-a-real-tool-xyz123"));
    }
}

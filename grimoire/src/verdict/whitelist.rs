//! Pattern-scoped and global process whitelists.

use crate::catalog::Pattern;

/// Whether `binary_name`/`binary_hash` suppresses `pattern`'s match
/// entirely: no log, no signal, and no counter increment. The caller
/// must check this before touching any counter, not after.
pub fn is_whitelisted(pattern: &Pattern, binary_name: &str, binary_hash: Option<u64>, global_whitelist: &[String]) -> bool {
    if pattern.is_whitelisted_process(binary_name) {
        return true;
    }
    if let Some(hash) = binary_hash {
        if pattern.is_whitelisted_binary(hash) {
            return true;
        }
    }
    global_whitelist.iter().any(|name| name == binary_name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::CATALOG;

    #[test]
    fn pattern_whitelist_short_circuits() {
        let pattern = CATALOG.iter().find(|p| p.name == "fork_bomb_rapid").unwrap();
        assert!(is_whitelisted(pattern, "make", None, &[]));
        assert!(!is_whitelisted(pattern, "nc", None, &[]));
    }

    #[test]
    fn global_whitelist_applies_to_every_pattern() {
        let pattern = &CATALOG[0];
        let global = vec!["trusted-agent".to_string()];
        assert!(is_whitelisted(pattern, "trusted-agent", None, &global));
    }
}

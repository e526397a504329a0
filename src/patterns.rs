//! Shell-style glob filtering over repository file lists.

use glob::Pattern;

/// Check whether a file path matches any of the given glob patterns.
///
/// Each pattern is evaluated against the raw path and, when the pattern
/// contains a `/`, also against a slash-normalized form so Windows-style
/// separators still match directory patterns like `unet/*`.
pub fn matches_any_pattern(file: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        let compiled = match Pattern::new(pattern) {
            Ok(p) => p,
            Err(_) => return false,
        };
        if compiled.matches(file) {
            return true;
        }
        if pattern.contains('/') {
            let normalized = file.replace('\\', "/");
            return compiled.matches(&normalized);
        }
        false
    })
}

/// Filter a file list by allow and ignore patterns.
///
/// With both lists empty every file passes. Otherwise files matching any
/// ignore pattern are dropped first, then files must match an allow
/// pattern (or all remaining pass when the allow list is empty).
pub fn filter_files(files: &[String], allow: &[String], ignore: &[String]) -> Vec<String> {
    if allow.is_empty() && ignore.is_empty() {
        return files.to_vec();
    }

    files
        .iter()
        .filter(|file| !matches_any_pattern(file, ignore))
        .filter(|file| allow.is_empty() || matches_any_pattern(file, allow))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_directory_wildcard() {
        let patterns = strings(&["text_encoder/*"]);
        assert!(matches_any_pattern("text_encoder/model.bin", &patterns));
        assert!(!matches_any_pattern("unet/model.bin", &patterns));
    }

    #[test]
    fn test_matches_extension_pattern() {
        let patterns = strings(&["*.json"]);
        assert!(matches_any_pattern("config.json", &patterns));
        assert!(!matches_any_pattern("model.bin", &patterns));
    }

    #[test]
    fn test_empty_patterns_never_match() {
        assert!(!matches_any_pattern("anything", &[]));
    }

    #[test]
    fn test_filter_no_patterns_returns_all() {
        let files = strings(&["a.bin", "b.json"]);
        assert_eq!(filter_files(&files, &[], &[]), files);
    }

    #[test]
    fn test_filter_allow_only() {
        let files = strings(&["text_encoder/x.bin", "unet/y.bin", "text_encoder/z.json"]);
        let allow = strings(&["text_encoder/*"]);
        assert_eq!(
            filter_files(&files, &allow, &[]),
            strings(&["text_encoder/x.bin", "text_encoder/z.json"])
        );
    }

    #[test]
    fn test_filter_ignore_only() {
        let files = strings(&["a.bin", "b.json", "c.bin"]);
        let ignore = strings(&["*.bin"]);
        assert_eq!(filter_files(&files, &[], &ignore), strings(&["b.json"]));
    }

    #[test]
    fn test_filter_ignore_wins_over_allow() {
        let files = strings(&["unet/a.bin", "unet/b.json"]);
        let allow = strings(&["unet/*"]);
        let ignore = strings(&["*.bin"]);
        assert_eq!(
            filter_files(&files, &allow, &ignore),
            strings(&["unet/b.json"])
        );
    }

    #[test]
    fn test_filter_is_monotone_under_ignore() {
        let files = strings(&["a.bin", "b.json", "sub/c.bin"]);
        let allow = strings(&["*.bin", "sub/*"]);
        let ignore = strings(&["sub/*"]);

        let with_ignore = filter_files(&files, &allow, &ignore);
        let without_ignore = filter_files(&files, &allow, &[]);
        for file in &with_ignore {
            assert!(without_ignore.contains(file));
        }
    }
}

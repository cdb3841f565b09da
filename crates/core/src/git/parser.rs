//! Parsers for git CLI output.
//!
//! Plain string scanning over the textual formats the pipeline consumes:
//! porcelain status, `%P` parent lists, and the conflict reports printed by
//! `git merge` / `git am`.

/// Paths in the unmerged (`UU`) state from `git status --porcelain` output.
pub fn conflict_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter_map(|line| line.strip_prefix("UU "))
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect()
}

/// Parent hashes from `git show --pretty=format:%P -s` output.
pub fn parent_ids(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// Conflicted file paths reported by `git merge` / `git am` output.
///
/// Two report shapes occur, sometimes together in one run:
///
/// ```text
/// CONFLICT (content): Merge conflict in src/main.rs
/// ```
///
/// ```text
/// Applying: some subject
/// Conflicts:
///         src/main.rs
///         src/lib.rs
/// ```
///
/// Duplicates are collapsed, first occurrence wins.
pub fn conflicts_from_apply_output(output: &str) -> Vec<String> {
    const CONTENT_MARKER: &str = "CONFLICT (content): Merge conflict in ";

    let mut paths: Vec<String> = Vec::new();
    let mut in_conflicts_block = false;

    for raw_line in output.lines() {
        let line = raw_line.trim_end();

        if in_conflicts_block {
            // The block lists one indented path per line and ends at the
            // first non-indented line.
            if line.starts_with('\t') || line.starts_with("    ") {
                let path = line.trim().to_string();
                if !path.is_empty() {
                    paths.push(path);
                }
                continue;
            }
            in_conflicts_block = false;
        }

        if line.trim() == "Conflicts:" {
            in_conflicts_block = true;
            continue;
        }

        if let Some(rest) = line.trim_start().strip_prefix(CONTENT_MARKER) {
            let path = rest.trim().to_string();
            if !path.is_empty() {
                paths.push(path);
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_paths_from_porcelain() {
        let status = "UU src/main.rs\n M src/lib.rs\nUU docs/README.md\n?? scratch.txt";
        assert_eq!(
            conflict_paths(status),
            vec!["src/main.rs".to_string(), "docs/README.md".to_string()]
        );
    }

    #[test]
    fn test_conflict_paths_empty_status() {
        assert!(conflict_paths("").is_empty());
    }

    #[test]
    fn test_parent_ids_two_parents() {
        let output = "aaaa1111 bbbb2222";
        assert_eq!(parent_ids(output), vec!["aaaa1111", "bbbb2222"]);
    }

    #[test]
    fn test_parent_ids_root_commit() {
        assert!(parent_ids("").is_empty());
    }

    #[test]
    fn test_conflicts_from_content_lines() {
        let output = "Auto-merging src/main.rs\n\
                      CONFLICT (content): Merge conflict in src/main.rs\n\
                      Automatic merge failed; fix conflicts and then commit the result.";
        assert_eq!(conflicts_from_apply_output(output), vec!["src/main.rs"]);
    }

    #[test]
    fn test_conflicts_from_am_block() {
        let output = "Applying: fix the widget\n\
                      Using index info to reconstruct a base tree...\n\
                      Conflicts:\n\
                      \tsrc/widget.rs\n\
                      \tsrc/frob.rs\n\
                      error: Failed to merge in the changes.";
        assert_eq!(
            conflicts_from_apply_output(output),
            vec!["src/widget.rs", "src/frob.rs"]
        );
    }

    #[test]
    fn test_conflicts_deduplicated_across_forms() {
        let output = "CONFLICT (content): Merge conflict in src/a.rs\n\
                      Conflicts:\n\
                      \tsrc/a.rs\n\
                      \tsrc/b.rs\n";
        assert_eq!(
            conflicts_from_apply_output(output),
            vec!["src/a.rs", "src/b.rs"]
        );
    }

    #[test]
    fn test_no_conflicts_reported() {
        let output = "Applying: clean change\n";
        assert!(conflicts_from_apply_output(output).is_empty());
    }
}

//! Minimal unified diff for promotion previews.
//!
//! Output follows `git diff -U3` closely enough for reviewers: file headers,
//! `@@` hunk headers, three lines of context. Catalog files are small, so a
//! quadratic LCS is fine.

const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// Render a unified diff between two texts. Empty string when identical.
pub fn unified(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = edit_script(&old_lines, &new_lines);
    if ops.iter().all(|(op, _, _)| *op == Op::Equal) {
        return String::new();
    }

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    let mut i = 0;
    while i < ops.len() {
        if ops[i].0 == Op::Equal {
            i += 1;
            continue;
        }
        // Expand a change run into a hunk with surrounding context.
        let mut start = i;
        let mut end = i;
        loop {
            end += 1;
            // Swallow equal gaps shorter than two context widths.
            let mut gap = end;
            while gap < ops.len() && ops[gap].0 == Op::Equal {
                gap += 1;
            }
            if gap == ops.len() || gap - end > CONTEXT * 2 {
                break;
            }
            end = gap;
        }
        while end < ops.len() && ops[end].0 != Op::Equal {
            end += 1;
        }
        let ctx_before = CONTEXT.min(start);
        start -= ctx_before;
        let ctx_after = CONTEXT.min(ops.len() - end);
        let end = end + ctx_after;

        let old_start = ops[start].1 + 1;
        let new_start = ops[start].2 + 1;
        let old_count = ops[start..end]
            .iter()
            .filter(|(op, _, _)| *op != Op::Insert)
            .count();
        let new_count = ops[start..end]
            .iter()
            .filter(|(op, _, _)| *op != Op::Delete)
            .count();
        out.push_str(&format!(
            "@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
        ));
        for (op, oi, ni) in &ops[start..end] {
            match op {
                Op::Equal => out.push_str(&format!(" {}\n", old_lines[*oi])),
                Op::Delete => out.push_str(&format!("-{}\n", old_lines[*oi])),
                Op::Insert => out.push_str(&format!("+{}\n", new_lines[*ni])),
            }
        }
        i = end;
    }
    out
}

/// Full edit script as (op, old index, new index); for `Insert` the old index
/// is the position the line lands before, and vice versa for `Delete`.
fn edit_script(old: &[&str], new: &[&str]) -> Vec<(Op, usize, usize)> {
    let n = old.len();
    let m = new.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }
    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push((Op::Equal, i, j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push((Op::Delete, i, j));
            i += 1;
        } else {
            ops.push((Op::Insert, i, j));
            j += 1;
        }
    }
    while i < n {
        ops.push((Op::Delete, i, j));
        i += 1;
    }
    while j < m {
        ops.push((Op::Insert, i, j));
        j += 1;
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_produce_empty_diff() {
        assert_eq!(unified("a\nb\n", "a\nb\n", "a/x", "b/x"), "");
    }

    #[test]
    fn single_line_change() {
        let diff = unified(
            "kind: Release\nversion: 1.2.3\n",
            "kind: Release\nversion: 1.2.4\n",
            "a/foo.yaml",
            "b/foo.yaml",
        );
        assert!(diff.starts_with("--- a/foo.yaml\n+++ b/foo.yaml\n"));
        assert!(diff.contains("-version: 1.2.3"));
        assert!(diff.contains("+version: 1.2.4"));
        assert!(diff.contains(" kind: Release"));
    }

    #[test]
    fn distant_changes_get_separate_hunks() {
        let old: String = (0..30).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line2\n", "LINE2\n").replace("line27\n", "LINE27\n");
        let diff = unified(&old, &new, "a/f", "b/f");
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn pure_insertion() {
        let diff = unified("a\n", "a\nb\n", "a/f", "b/f");
        assert!(diff.contains("+b"));
        assert!(!diff.contains("-a"));
    }
}

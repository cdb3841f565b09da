//! Resolution location.
//!
//! Given a conflict section's margins and the full line sequence of the
//! resolved reference file, recover the span the resolution occupies. Exact
//! structural matching is impossible (the reference file's line numbers
//! differ from the conflicted file's), so the margins are correlated by
//! fuzzy, whitespace-insensitive line comparison. Near duplicated lines
//! this can anchor on the wrong occurrence; the confidence score gives
//! consumers a signal, but the bias toward the latest occurrence is kept
//! as-is.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::ConflictSection;

/// Literal sentinel written to the dataset when no confident match exists.
pub const NOT_FOUND_SENTINEL: &str = "NOT FOUND";

/// The recovered resolution for one conflict section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// The resolved lines, or `None` when no confident match was found.
    pub resolved: Option<Vec<String>>,
    /// Fraction of margin lines that matched the reference, minimum of the
    /// head and tail sides. Empty margins count as fully matched.
    pub confidence: f64,
}

impl ResolutionRecord {
    pub fn is_found(&self) -> bool {
        self.resolved.is_some()
    }

    fn not_found(confidence: f64) -> Self {
        Self {
            resolved: None,
            confidence,
        }
    }
}

/// Highest reference index at which any target line matches.
///
/// Each target line (whitespace-stripped) is looked up as the first
/// stripped-equal reference line; the maximum matched index across all
/// target lines is returned, biasing the result toward the end of the
/// margin, which sits closest to the conflict boundary. Returns 0 when
/// nothing matches, so callers needing found-ness must not rely on the
/// bare position.
pub fn match_position(reference: &[String], target: &[String]) -> usize {
    match_position_scored(reference, target).0
}

/// `match_position` plus the count of target lines that matched anywhere.
fn match_position_scored(reference: &[String], target: &[String]) -> (usize, usize) {
    let mut position = 0;
    let mut matched = 0;

    for target_line in target {
        let wanted = target_line.trim();
        for (i, line) in reference.iter().enumerate() {
            if line.trim() == wanted {
                position = position.max(i);
                matched += 1;
                break;
            }
        }
    }

    (position, matched)
}

/// Locate the resolved span for `section` within `reference`.
///
/// A margin side is anchored when at least one of its lines matched, or the
/// margin itself is empty (position 0 is then valid by construction). With
/// both sides anchored the resolution is `reference[start+1..end]`; an
/// inverted or empty range yields an empty resolution, not a failure.
/// Never errors: an unanchorable section becomes a `NOT FOUND` record and
/// mining continues.
pub fn locate(section: &ConflictSection, reference: &[String]) -> ResolutionRecord {
    let (start, head_matched) = match_position_scored(reference, &section.margin_head);
    let (end, tail_matched) = match_position_scored(reference, &section.margin_tail);

    let confidence = side_confidence(head_matched, section.margin_head.len())
        .min(side_confidence(tail_matched, section.margin_tail.len()));

    let head_anchored = head_matched > 0 || section.margin_head.is_empty();
    let tail_anchored = tail_matched > 0 || section.margin_tail.is_empty();

    if !head_anchored || !tail_anchored {
        debug!(
            marker_start = section.marker_start,
            head_matched, tail_matched, "no confident anchor for conflict section"
        );
        return ResolutionRecord::not_found(confidence);
    }

    let lo = start + 1;
    let resolved = if lo < end {
        reference[lo..end].to_vec()
    } else {
        Vec::new()
    };

    ResolutionRecord {
        resolved: Some(resolved),
        confidence,
    }
}

fn side_confidence(matched: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matched as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_position_empty_target() {
        let reference = lines(&["a", "b", "c"]);
        assert_eq!(match_position(&reference, &[]), 0);
    }

    #[test]
    fn test_match_position_prefers_later_duplicate() {
        let reference = lines(&["a", "b", "X", "c", "d", "X"]);
        let target = lines(&["X"]);
        assert_eq!(match_position(&reference, &target), 5);
    }

    #[test]
    fn test_match_position_ignores_surrounding_whitespace() {
        let reference = lines(&["  foo();  ", "bar();"]);
        let target = lines(&["foo();"]);
        assert_eq!(match_position(&reference, &target), 0);
    }

    #[test]
    fn test_match_position_no_match_defaults_to_zero() {
        let reference = lines(&["a", "b"]);
        let target = lines(&["zzz"]);
        assert_eq!(match_position(&reference, &target), 0);
    }

    #[test]
    fn test_locate_recovers_resolution_between_margins() {
        // Scenario: two-line conflict with margin 1 on each side.
        let content = lines(&[
            "ctx1",
            "<<<<<<< A",
            "left",
            "=======",
            "right",
            ">>>>>>> B",
            "ctx2",
        ]);
        let sections = extract::extract(&content, 1);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].lines.len(), 7);

        let reference = lines(&["ctx1", "resolved", "ctx2"]);
        let record = locate(&sections[0], &reference);
        assert_eq!(record.resolved, Some(lines(&["resolved"])));
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_locate_unmatched_margins_is_not_found() {
        let content = lines(&[
            "ctx1",
            "<<<<<<< A",
            "left",
            "=======",
            "right",
            ">>>>>>> B",
            "ctx2",
        ]);
        let sections = extract::extract(&content, 1);

        let reference = lines(&["completely", "different", "file"]);
        let record = locate(&sections[0], &reference);
        assert!(!record.is_found());
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn test_locate_partial_margin_match_confidence() {
        let content = lines(&[
            "ctx1",
            "missing",
            "<<<<<<< A",
            "left",
            "=======",
            "right",
            ">>>>>>> B",
            "ctx2",
            "also-missing",
        ]);
        let sections = extract::extract(&content, 2);

        let reference = lines(&["ctx1", "resolved", "ctx2"]);
        let record = locate(&sections[0], &reference);
        assert!(record.is_found());
        assert!((record.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_locate_empty_margins_yield_empty_resolution() {
        // Conflict spans the whole file: no margins at all.
        let content = lines(&["<<<<<<< A", "left", "=======", "right", ">>>>>>> B"]);
        let sections = extract::extract(&content, 0);

        let reference = lines(&["whatever"]);
        let record = locate(&sections[0], &reference);
        assert_eq!(record.resolved, Some(Vec::new()));
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_locate_inverted_range_is_empty_not_error() {
        let content = lines(&[
            "late-line",
            "<<<<<<< A",
            "left",
            "=======",
            "right",
            ">>>>>>> B",
            "early-line",
        ]);
        let sections = extract::extract(&content, 1);

        // Margins match in reversed order in the reference.
        let reference = lines(&["early-line", "middle", "late-line"]);
        let record = locate(&sections[0], &reference);
        assert_eq!(record.resolved, Some(Vec::new()));
    }
}

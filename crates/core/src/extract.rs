//! Conflict-section extraction.
//!
//! Pure text processing: scan a file's lines for conflict markers and yield
//! bounded sections, each widened by a margin of context lines on both
//! sides. The margins are what the resolution locator later anchors on, so
//! they must never bleed into a neighbouring conflict: adjacent sections
//! split the gap between them at its midpoint, the earlier section taking
//! the extra line when the gap is odd.

use serde::{Deserialize, Serialize};

/// Marker opening a conflict region.
pub const CONFLICT_START: &str = "<<<<<<<";
/// Marker closing a conflict region.
pub const CONFLICT_END: &str = ">>>>>>>";

/// One extracted conflict region with its surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSection {
    /// First line of the expanded section (inclusive).
    pub start_line: usize,
    /// One past the last line of the expanded section (exclusive).
    pub end_line: usize,
    /// Line index of the `<<<<<<<` marker.
    pub marker_start: usize,
    /// Line index of the `>>>>>>>` marker.
    pub marker_end: usize,
    /// All section lines: head margin, conflict body, tail margin.
    pub lines: Vec<String>,
    /// Context lines before the start marker.
    pub margin_head: Vec<String>,
    /// Context lines after the end marker.
    pub margin_tail: Vec<String>,
}

impl ConflictSection {
    /// The conflict body: marker lines and everything between them.
    pub fn body(&self) -> &[String] {
        let head = self.margin_head.len();
        let tail = self.margin_tail.len();
        &self.lines[head..self.lines.len() - tail]
    }
}

/// Extract all conflict sections from `lines`, widened by `margin` context
/// lines on each side (clamped to file bounds and to the midpoint of the
/// gap before a neighbouring section).
///
/// An end marker with no pending start is skipped, tolerating malformed
/// input; a second start marker before an end re-opens the section at the
/// later line. Sections are returned in file order, one per marker pair.
pub fn extract(lines: &[String], margin: usize) -> Vec<ConflictSection> {
    let pairs = marker_pairs(lines);
    let mut sections = Vec::with_capacity(pairs.len());

    for (i, &(marker_start, marker_end)) in pairs.iter().enumerate() {
        let mut start = marker_start.saturating_sub(margin);
        let mut end = (marker_end + margin + 1).min(lines.len());

        if i > 0 {
            start = start.max(gap_split(pairs[i - 1].1, marker_start));
        }
        if i + 1 < pairs.len() {
            end = end.min(gap_split(marker_end, pairs[i + 1].0));
        }

        sections.push(ConflictSection {
            start_line: start,
            end_line: end,
            marker_start,
            marker_end,
            lines: lines[start..end].to_vec(),
            margin_head: lines[start..marker_start].to_vec(),
            margin_tail: lines[marker_end + 1..end].to_vec(),
        });
    }

    sections
}

/// `[start, end]` marker line-index pairs, in file order.
fn marker_pairs(lines: &[String]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut pending: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with(CONFLICT_START) {
            pending = Some(i);
        } else if line.starts_with(CONFLICT_END) {
            if let Some(start) = pending.take() {
                pairs.push((start, i));
            }
        }
    }

    pairs
}

/// First line index owned by the section starting at `next_start`, given the
/// previous section's end marker at `prev_end`. Lines strictly between the
/// two markers are split at the midpoint, the earlier section taking the
/// extra line for odd gaps.
fn gap_split(prev_end: usize, next_start: usize) -> usize {
    let gap_start = prev_end + 1;
    let gap_len = next_start - gap_start;
    gap_start + (gap_len + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_section_bounds_and_body() {
        let content = lines(&[
            "ctx1",
            "<<<<<<< HEAD",
            "left",
            "=======",
            "right",
            ">>>>>>> other",
            "ctx2",
        ]);

        let sections = extract(&content, 1);
        assert_eq!(sections.len(), 1);

        let section = &sections[0];
        assert_eq!(section.start_line, 0);
        assert_eq!(section.end_line, 7);
        assert_eq!(section.lines.len(), 7);
        assert_eq!(section.margin_head, vec!["ctx1"]);
        assert_eq!(section.margin_tail, vec!["ctx2"]);
        assert!(section.body()[0].starts_with(CONFLICT_START));
        assert!(section.body().last().unwrap().starts_with(CONFLICT_END));
    }

    #[test]
    fn test_sections_ascending_and_disjoint_before_expansion() {
        let content = lines(&[
            "a",
            "<<<<<<< HEAD",
            "x",
            "=======",
            "y",
            ">>>>>>> one",
            "b",
            "c",
            "<<<<<<< HEAD",
            "p",
            "=======",
            "q",
            ">>>>>>> two",
            "d",
        ]);

        let sections = extract(&content, 0);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].marker_end < sections[1].marker_start);
        for section in &sections {
            assert!(section.body()[0].starts_with(CONFLICT_START));
            assert!(section.body().last().unwrap().starts_with(CONFLICT_END));
            assert!(section.margin_head.is_empty());
            assert!(section.margin_tail.is_empty());
        }
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let content = lines(&[
            "ctx",
            "<<<<<<< HEAD",
            "x",
            "=======",
            "y",
            ">>>>>>> other",
            "ctx2",
        ]);
        assert_eq!(extract(&content, 2), extract(&content, 2));
    }

    #[test]
    fn test_margin_clamped_at_file_start() {
        let content = lines(&["<<<<<<< HEAD", "x", "=======", "y", ">>>>>>> other"]);
        let sections = extract(&content, 5);
        assert_eq!(sections[0].start_line, 0);
        assert_eq!(sections[0].end_line, content.len());
        assert!(sections[0].margin_head.is_empty());
        assert!(sections[0].margin_tail.is_empty());
    }

    #[test]
    fn test_stray_end_marker_ignored() {
        let content = lines(&[
            "a",
            ">>>>>>> stray",
            "b",
            "<<<<<<< HEAD",
            "x",
            "=======",
            "y",
            ">>>>>>> other",
        ]);
        let sections = extract(&content, 0);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].marker_start, 3);
        assert_eq!(sections[0].marker_end, 7);
    }

    #[test]
    fn test_reopened_start_anchors_to_later_line() {
        let content = lines(&[
            "<<<<<<< first",
            "a",
            "<<<<<<< second",
            "b",
            "=======",
            "c",
            ">>>>>>> other",
        ]);
        let sections = extract(&content, 0);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].marker_start, 2);
    }

    #[test]
    fn test_adjacent_margins_split_at_midpoint() {
        // Markers at 1..5 and 10..14, gap lines at 6..=9 (g1 g2 g3 g4).
        let content = lines(&[
            "pre",
            "<<<<<<< HEAD",
            "x",
            "=======",
            "y",
            ">>>>>>> one",
            "g1",
            "g2",
            "g3",
            "g4",
            "<<<<<<< HEAD",
            "p",
            "=======",
            "q",
            ">>>>>>> two",
            "post",
        ]);

        let sections = extract(&content, 10);
        assert_eq!(sections.len(), 2);

        // Even gap of 4: two lines each, no overlap.
        assert_eq!(sections[0].margin_tail, vec!["g1", "g2"]);
        assert_eq!(sections[1].margin_head, vec!["g3", "g4"]);
        assert!(sections[0].end_line <= sections[1].start_line);
    }

    #[test]
    fn test_odd_gap_gives_extra_line_to_earlier_section() {
        // Gap of exactly one line between the two conflicts.
        let content = lines(&[
            "<<<<<<< HEAD",
            "x",
            "=======",
            "y",
            ">>>>>>> one",
            "shared",
            "<<<<<<< HEAD",
            "p",
            "=======",
            "q",
            ">>>>>>> two",
        ]);

        let sections = extract(&content, 3);
        assert_eq!(sections[0].margin_tail, vec!["shared"]);
        assert!(sections[1].margin_head.is_empty());
        assert_eq!(sections[0].end_line, sections[1].start_line);
    }

    #[test]
    fn test_no_markers_no_sections() {
        let content = lines(&["just", "ordinary", "text"]);
        assert!(extract(&content, 3).is_empty());
    }

    #[test]
    fn test_unclosed_start_yields_nothing() {
        let content = lines(&["<<<<<<< HEAD", "x", "======="]);
        assert!(extract(&content, 1).is_empty());
    }
}

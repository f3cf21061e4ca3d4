//! Locating the paragraph of code around a cursor.

/// Whether a line has nothing but whitespace.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Find the contiguous run of non-blank lines containing `cursor`.
///
/// Returns the closed range `(start, end)`, or `None` when the cursor line is
/// blank or past the end of the text.
pub fn find_block<S: AsRef<str>>(lines: &[S], cursor: usize) -> Option<(usize, usize)> {
    if lines.get(cursor).map_or(true, |line| is_blank(line.as_ref())) {
        return None;
    }

    let mut start = cursor;
    while start > 0 && !is_blank(lines[start - 1].as_ref()) {
        start -= 1;
    }

    let mut end = cursor;
    while end + 1 < lines.len() && !is_blank(lines[end + 1].as_ref()) {
        end += 1;
    }

    Some((start, end))
}

/// Find the run of code lines around `cursor`, where both blank lines and
/// lines matched by `is_annotation` end the run.
///
/// A cursor on an annotation line belongs to the code directly above it.
pub fn find_code_block<S, F>(lines: &[S], cursor: usize, is_annotation: F) -> Option<(usize, usize)>
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    if cursor >= lines.len() {
        return None;
    }
    let is_code = |index: usize| {
        let line = lines[index].as_ref();
        !is_blank(line) && !is_annotation(line)
    };

    let mut anchor = cursor;
    while anchor > 0 && is_annotation(lines[anchor].as_ref()) {
        anchor -= 1;
    }
    if !is_code(anchor) {
        return None;
    }

    let mut start = anchor;
    while start > 0 && is_code(start - 1) {
        start -= 1;
    }
    let mut end = anchor;
    while end + 1 < lines.len() && is_code(end + 1) {
        end += 1;
    }

    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: [&str; 4] = ["a=1", "b=2", "", "c=3"];

    #[test]
    fn test_block_spans_neighbours() {
        assert_eq!(find_block(&LINES, 1), Some((0, 1)));
        assert_eq!(find_block(&LINES, 0), Some((0, 1)));
    }

    #[test]
    fn test_single_line_block() {
        assert_eq!(find_block(&LINES, 3), Some((3, 3)));
    }

    #[test]
    fn test_blank_line_has_no_block() {
        assert_eq!(find_block(&LINES, 2), None);
    }

    #[test]
    fn test_whitespace_only_is_blank() {
        let lines = ["x = 1", " \t ", "y = 2"];
        assert_eq!(find_block(&lines, 1), None);
        assert_eq!(find_block(&lines, 2), Some((2, 2)));
    }

    #[test]
    fn test_cursor_past_end() {
        assert_eq!(find_block(&LINES, 9), None);
        let empty: [&str; 0] = [];
        assert_eq!(find_block(&empty, 0), None);
    }

    fn is_result(line: &str) -> bool {
        line.starts_with("--> ")
    }

    #[test]
    fn test_code_block_stops_at_annotation() {
        let lines = ["x = 1", "y = 2", "--> 2", ""];
        assert_eq!(find_code_block(&lines, 0, is_result), Some((0, 1)));
        assert_eq!(find_code_block(&lines, 1, is_result), Some((0, 1)));
    }

    #[test]
    fn test_cursor_on_annotation_moves_up() {
        let lines = ["x = 1", "--> 1", "--> 1"];
        assert_eq!(find_code_block(&lines, 2, is_result), Some((0, 0)));
        let orphan = ["", "--> 1"];
        assert_eq!(find_code_block(&orphan, 1, is_result), None);
    }

    #[test]
    fn test_annotation_between_code_splits_blocks() {
        let lines = ["a = 1", "--> 1", "b = 2"];
        assert_eq!(find_code_block(&lines, 2, is_result), Some((2, 2)));
        assert_eq!(find_code_block(&lines, 0, is_result), Some((0, 0)));
    }
}

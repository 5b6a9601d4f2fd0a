//! Mark spans over the text of a single block.
//!
//! Spans use block-local byte offsets and are kept normalized: sorted by
//! start, no empty spans, and no two overlapping or touching spans with the
//! same mark.

use std::ops::Range;

use crate::nodes::Mark;

#[derive(Debug, Clone, PartialEq)]
pub struct MarkSpan {
    pub range: Range<usize>,
    pub mark: Mark,
}

/// Shift spans for `len` bytes inserted at `at`
pub(crate) fn shift_for_insert(spans: &mut [MarkSpan], at: usize, len: usize) {
    for span in spans.iter_mut() {
        if span.range.start >= at {
            span.range.start += len;
            span.range.end += len;
        } else if span.range.end > at {
            span.range.end += len;
        }
    }
}

/// Shift and shrink spans for the deletion of `range`
pub(crate) fn shift_for_delete(spans: &mut Vec<MarkSpan>, range: Range<usize>) {
    let map = |x: usize| {
        if x <= range.start {
            x
        } else if x >= range.end {
            x - (range.end - range.start)
        } else {
            range.start
        }
    };
    for span in spans.iter_mut() {
        span.range = map(span.range.start)..map(span.range.end);
    }
    spans.retain(|s| !s.range.is_empty());
}

/// Whether `range` is entirely covered by `mark`
pub(crate) fn covers(spans: &[MarkSpan], range: &Range<usize>, mark: &Mark) -> bool {
    spans
        .iter()
        .any(|s| &s.mark == mark && s.range.start <= range.start && s.range.end >= range.end)
}

pub(crate) fn remove_mark(spans: &mut Vec<MarkSpan>, range: &Range<usize>, mark: &Mark) {
    let mut out = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        let overlaps = span.range.start < range.end && span.range.end > range.start;
        if &span.mark != mark || !overlaps {
            out.push(span);
            continue;
        }
        if span.range.start < range.start {
            out.push(MarkSpan {
                range: span.range.start..range.start,
                mark: span.mark.clone(),
            });
        }
        if span.range.end > range.end {
            out.push(MarkSpan {
                range: range.end..span.range.end,
                mark: span.mark,
            });
        }
    }
    *spans = out;
}

pub(crate) fn add_mark(spans: &mut Vec<MarkSpan>, range: Range<usize>, mark: Mark) {
    if range.is_empty() {
        return;
    }
    remove_mark(spans, &range, &mark);
    spans.push(MarkSpan { range, mark });
    normalize(spans);
}

fn normalize(spans: &mut Vec<MarkSpan>) {
    spans.sort_by_key(|s| (s.range.start, s.range.end));
    let mut out: Vec<MarkSpan> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        if let Some(last) = out
            .iter_mut()
            .rev()
            .find(|l| l.mark == span.mark && l.range.end >= span.range.start)
        {
            last.range.end = last.range.end.max(span.range.end);
            continue;
        }
        out.push(span);
    }
    *spans = out;
}

/// Split a block's text into runs that share the same set of marks
pub(crate) fn runs(len: usize, spans: &[MarkSpan]) -> Vec<(Range<usize>, Vec<&Mark>)> {
    let mut bounds = vec![0, len];
    for span in spans {
        bounds.push(span.range.start.min(len));
        bounds.push(span.range.end.min(len));
    }
    bounds.sort_unstable();
    bounds.dedup();

    bounds
        .windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| {
            let marks = spans
                .iter()
                .filter(|s| s.range.start <= w[0] && s.range.end >= w[1])
                .map(|s| &s.mark)
                .collect();
            (w[0]..w[1], marks)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rainbow(range: Range<usize>) -> MarkSpan {
        MarkSpan {
            range,
            mark: Mark::Rainbow,
        }
    }

    #[test]
    fn test_add_merges_touching_spans() {
        let mut spans = vec![rainbow(0..3)];
        add_mark(&mut spans, 3..6, Mark::Rainbow);
        assert_eq!(spans, vec![rainbow(0..6)]);
    }

    #[test]
    fn test_remove_splits_span() {
        let mut spans = vec![rainbow(0..10)];
        remove_mark(&mut spans, &(3..5), &Mark::Rainbow);
        assert_eq!(spans, vec![rainbow(0..3), rainbow(5..10)]);
    }

    #[test]
    fn test_insert_inside_span_extends_it() {
        let mut spans = vec![rainbow(2..5)];
        shift_for_insert(&mut spans, 3, 2);
        assert_eq!(spans, vec![rainbow(2..7)]);

        shift_for_insert(&mut spans, 0, 1);
        assert_eq!(spans, vec![rainbow(3..8)]);
    }

    #[test]
    fn test_delete_drops_fully_covered_span() {
        let mut spans = vec![rainbow(2..4), rainbow(6..9)];
        shift_for_delete(&mut spans, 1..5);
        assert_eq!(spans, vec![rainbow(2..5)]);
    }

    #[test]
    fn test_runs_cover_whole_text() {
        let spans = vec![rainbow(2..4)];
        let runs = runs(6, &spans);
        let ranges: Vec<_> = runs.iter().map(|(r, _)| r.clone()).collect();
        assert_eq!(ranges, vec![0..2, 2..4, 4..6]);
        assert_eq!(runs[1].1, vec![&Mark::Rainbow]);
        assert!(runs[0].1.is_empty());
    }
}

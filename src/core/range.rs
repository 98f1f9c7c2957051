//! Context windows around matched lines.

/// Emitted by [`RangeFetcher::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEvent
{
    Line(u64),
    /// The next window is not contiguous with the previous one.
    Separator,
}

/// Expands each requested line to `[line - before, line + after]`, merging
/// with the window emitted just before it.
///
/// Only the immediately preceding window is remembered, so requests should be
/// sorted for the best output; going backwards yields separated windows.
#[derive(Debug, Clone)]
pub struct RangeFetcher
{
    before: u64,
    after: u64,
    prev: Option<(u64, u64)>,
}

impl RangeFetcher
{
    pub fn new(
        before: u64,
        after: u64,
    ) -> Self
    {
        Self { before, after, prev: None }
    }

    pub fn fetch<F>(
        &mut self,
        line: u64,
        mut handler: F,
    ) where
        F: FnMut(RangeEvent),
    {
        let begin = line
            .saturating_sub(self.before)
            .max(1);
        let end = line.saturating_add(self.after);

        let mut current = begin;
        match self.prev
        {
            Some((prev_begin, prev_end)) if (prev_begin..=prev_end).contains(&begin) =>
            {
                current = prev_end + 1;
            }
            Some((_, prev_end)) if prev_end + 1 != begin => handler(RangeEvent::Separator),
            _ => {}
        }

        for n in current..=end
        {
            handler(RangeEvent::Line(n));
        }
        self.prev = Some((begin, end));
    }

    /// Collect the events for a whole sequence of requests.
    pub fn expand(
        &mut self,
        lines: impl IntoIterator<Item = u64>,
    ) -> Vec<RangeEvent>
    {
        let mut events = Vec::new();
        for line in lines
        {
            self.fetch(line, |e| events.push(e));
        }
        events
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    /// Lines as numbers, separators as 0.
    fn run(
        before: u64,
        after: u64,
        lines: &[u64],
    ) -> Vec<u64>
    {
        RangeFetcher::new(before, after)
            .expand(lines.iter().copied())
            .into_iter()
            .map(|e| match e
            {
                RangeEvent::Line(n) => n,
                RangeEvent::Separator => 0,
            })
            .collect()
    }

    #[test]
    fn just_the_lines_asked()
    {
        assert_eq!(run(0, 0, &[1]), vec![1]);
        assert_eq!(run(0, 0, &[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(run(0, 0, &[10, 20, 30]), vec![10, 0, 20, 0, 30]);
        assert_eq!(run(0, 0, &[3, 2, 1]), vec![3, 0, 2, 0, 1]);
        assert_eq!(run(0, 0, &[3, 3, 3]), vec![3]);
    }

    #[test]
    fn lines_before()
    {
        assert_eq!(run(2, 0, &[1]), vec![1]);
        assert_eq!(run(2, 0, &[10]), vec![8, 9, 10]);
        assert_eq!(run(2, 0, &[11, 12, 13]), vec![9, 10, 11, 12, 13]);
        assert_eq!(run(2, 0, &[10, 20, 30]), vec![8, 9, 10, 0, 18, 19, 20, 0, 28, 29, 30]);
        assert_eq!(run(2, 0, &[10, 12, 14]), vec![8, 9, 10, 11, 12, 13, 14]);
        assert_eq!(run(2, 0, &[13, 12, 11]), vec![11, 12, 13, 0, 10, 11, 12, 0, 9, 10, 11]);
        assert_eq!(run(2, 0, &[5, 5, 5]), vec![3, 4, 5]);
    }

    #[test]
    fn lines_after()
    {
        assert_eq!(run(0, 2, &[1]), vec![1, 2, 3]);
        assert_eq!(run(0, 2, &[10]), vec![10, 11, 12]);
        assert_eq!(run(0, 2, &[11, 12, 13]), vec![11, 12, 13, 14, 15]);
        assert_eq!(run(0, 2, &[10, 20, 30]), vec![10, 11, 12, 0, 20, 21, 22, 0, 30, 31, 32]);
        assert_eq!(run(0, 2, &[10, 12, 14]), vec![10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(run(0, 2, &[13, 12, 11]), vec![13, 14, 15, 0, 12, 13, 14, 0, 11, 12, 13]);
        assert_eq!(run(0, 2, &[5, 5, 5]), vec![5, 6, 7]);
    }

    #[test]
    fn both_sides()
    {
        assert_eq!(run(2, 2, &[1]), vec![1, 2, 3]);
        assert_eq!(run(2, 2, &[10]), vec![8, 9, 10, 11, 12]);
        assert_eq!(run(2, 2, &[11, 12, 13]), vec![9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(
            run(2, 2, &[10, 20, 30]),
            vec![8, 9, 10, 11, 12, 0, 18, 19, 20, 21, 22, 0, 28, 29, 30, 31, 32]
        );
        assert_eq!(run(2, 2, &[10, 12, 14]), vec![8, 9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(
            run(2, 2, &[13, 12, 11]),
            vec![11, 12, 13, 14, 15, 0, 10, 11, 12, 13, 14, 0, 9, 10, 11, 12, 13]
        );
        assert_eq!(run(2, 2, &[5, 5, 5]), vec![3, 4, 5, 6, 7]);
    }
}

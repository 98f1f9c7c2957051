//! Property tests for the line scanner and the context expander.

use proptest::prelude::*;
use zindex::core::line_finder::{LineFinder, LineRecord, LineSink};
use zindex::core::range::{RangeEvent, RangeFetcher};

#[derive(Default)]
struct Collect
{
    lines: Vec<(u64, u64, Vec<u8>)>,
}

impl LineSink for Collect
{
    type Error = std::convert::Infallible;

    fn on_line(
        &mut self,
        number: u64,
        offset: u64,
        line: &[u8],
    ) -> Result<bool, Self::Error>
    {
        self.lines
            .push((number, offset, line.to_vec()));
        Ok(true)
    }
}

fn scan(
    data: &[u8],
    cuts: &[usize],
) -> (Vec<(u64, u64, Vec<u8>)>, Vec<LineRecord>, Option<u64>)
{
    let mut finder = LineFinder::new();
    let mut sink = Collect::default();
    let mut records = Vec::new();

    let mut bounds: Vec<usize> = cuts
        .iter()
        .map(|c| c % (data.len() + 1))
        .collect();
    bounds.sort_unstable();
    let mut start = 0;
    for end in bounds
    {
        finder
            .feed(&data[start..end], false, &mut sink)
            .unwrap();
        records.extend(finder.drain_kept());
        start = end;
    }
    finder
        .feed(&data[start..], true, &mut sink)
        .unwrap();
    records.extend(finder.drain_kept());
    (sink.lines, records, finder.sentinel())
}

proptest! {
    #[test]
    fn block_splits_do_not_change_lines(
        data in proptest::collection::vec(prop_oneof![Just(b'\n'), b'a'..=b'e'], 0..400),
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let whole = scan(&data, &[]);
        let split = scan(&data, &cuts);
        prop_assert_eq!(&whole, &split);

        // Records tile the stream exactly.
        let (_, records, sentinel) = whole;
        let mut offset = 0;
        for record in &records
        {
            prop_assert_eq!(record.offset, offset);
            offset += record.length;
        }
        prop_assert_eq!(Some(offset), sentinel);
        prop_assert_eq!(sentinel, Some(data.len() as u64));
    }

    #[test]
    fn sorted_requests_expand_to_window_union(
        mut lines in proptest::collection::vec(1u64..500, 1..40),
        before in 0u64..6,
        after in 0u64..6,
    ) {
        lines.sort_unstable();
        let events = RangeFetcher::new(before, after).expand(lines.iter().copied());

        let emitted: Vec<u64> = events
            .iter()
            .filter_map(|e| match e
            {
                RangeEvent::Line(n) => Some(*n),
                RangeEvent::Separator => None,
            })
            .collect();
        prop_assert!(emitted.windows(2).all(|w| w[0] < w[1]));

        let mut expected: Vec<u64> = lines
            .iter()
            .flat_map(|&l| l.saturating_sub(before).max(1)..=l + after)
            .collect();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(&emitted, &expected);

        // A separator only ever sits between two non-adjacent lines.
        for (i, event) in events.iter().enumerate()
        {
            if *event == RangeEvent::Separator
            {
                prop_assert!(i > 0);
                match (events[i - 1], events.get(i + 1))
                {
                    (RangeEvent::Line(a), Some(RangeEvent::Line(b))) => prop_assert!(a + 1 < *b),
                    other => prop_assert!(false, "separator out of place: {:?}", other),
                }
            }
        }
    }
}

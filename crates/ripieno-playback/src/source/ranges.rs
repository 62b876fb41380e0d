//! Play ranges: the parts of the material a run walks through.
//!
//! Playback positions inside a run are offsets on a timeline made by laying
//! the ranges end to end. Without a selection the only range is
//! `0..end_frame`, so offsets and source frames coincide.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct PlayRanges {
    ranges: Vec<Range<u64>>,
    /// Timeline offset at which each range starts.
    offsets: Vec<u64>,
    total: u64,
}

impl PlayRanges {
    /// Ranges for `selection` within `0..end`. Overlapping or touching
    /// ranges merge; parts past `end` are dropped. An empty selection, or
    /// one with nothing inside the material, plays everything.
    pub(crate) fn new(selection: &[Range<u64>], end: u64) -> Self {
        let mut sorted: Vec<Range<u64>> = selection
            .iter()
            .map(|r| r.start.min(end)..r.end.min(end))
            .filter(|r| r.start < r.end)
            .collect();
        sorted.sort_by_key(|r| r.start);

        let mut ranges: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match ranges.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => ranges.push(range),
            }
        }
        if ranges.is_empty() && end > 0 {
            ranges.push(0..end);
        }

        let mut offsets = Vec::with_capacity(ranges.len());
        let mut total = 0;
        for range in &ranges {
            offsets.push(total);
            total += range.end - range.start;
        }
        Self {
            ranges,
            offsets,
            total,
        }
    }

    pub(crate) fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    /// Length of the timeline in frames.
    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    /// Frame after the last playable frame.
    pub(crate) fn end_frame(&self) -> u64 {
        self.ranges.last().map_or(0, |r| r.end)
    }

    /// Move `frame` into the ranges: frames between ranges go to the start
    /// of the next one, frames past the last go back to the first.
    pub(crate) fn constrain(&self, frame: u64) -> u64 {
        for range in &self.ranges {
            if frame < range.end {
                return frame.max(range.start);
            }
        }
        self.ranges.first().map_or(0, |r| r.start)
    }

    /// Timeline offset of `frame`, after constraining it.
    pub(crate) fn offset_of(&self, frame: u64) -> u64 {
        let frame = self.constrain(frame);
        self.ranges
            .iter()
            .zip(&self.offsets)
            .find(|(range, _)| range.contains(&frame))
            .map_or(0, |(range, offset)| offset + frame - range.start)
    }

    /// Source frame at timeline `offset`. Offsets at or past the end map to
    /// the end of the last range.
    pub(crate) fn frame_at(&self, offset: u64) -> u64 {
        self.locate(offset).map_or(self.end_frame(), |(frame, _)| frame)
    }

    /// Source frame at `offset` and the frames left in its range.
    pub(crate) fn locate(&self, offset: u64) -> Option<(u64, u64)> {
        if offset >= self.total {
            return None;
        }
        let index = self.offsets.partition_point(|&start| start <= offset) - 1;
        let range = &self.ranges[index];
        let into = offset - self.offsets[index];
        Some((range.start + into, range.end - range.start - into))
    }
}

//! Secondary grid layout and pagination.
//!
//! [`GridLayoutEngine::rebuild`] is a pure function of the grid members, the
//! row/column budget and the requested page. It always rebuilds every page
//! from scratch, so calling it twice with the same inputs yields identical
//! output and no slot can refer to a stream that is gone.
//!
//! Each page holds at most `rows * cols` streams and is split in two grids:
//! the main grid takes every full row, and any remainder goes to an alternate
//! grid laid out as a single row sized to its member count. A page with fewer
//! streams than one full row is laid out entirely in the main grid.

use crate::classifier::{CardKind, ClassifiedStream};
use common::types::{MediaKind, TrackId};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::trace;

/// Viewport row/column budget supplied by the render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBudget {
    pub rows: usize,
    pub cols: usize,
}

impl GridBudget {
    /// Budget with both dimensions clamped to at least one.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    /// Streams per page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

/// What a grid slot renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRef {
    pub track_id: TrackId,
    pub owner: String,
    pub kind: MediaKind,
    pub card: CardKind,
}

impl From<&ClassifiedStream> for StreamRef {
    fn from(stream: &ClassifiedStream) -> Self {
        Self {
            track_id: stream.track_id.clone(),
            owner: stream.owner.label().to_string(),
            kind: stream.kind,
            card: stream.card,
        }
    }
}

/// One positioned stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridSlot {
    pub row: usize,
    pub col: usize,
    pub stream: StreamRef,
}

/// A laid-out grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridAssignment {
    pub rows: usize,
    pub cols: usize,
    /// Rows that actually hold a stream.
    pub actual_rows: usize,
    pub slots: Vec<GridSlot>,
}

impl GridAssignment {
    fn fill(streams: &[StreamRef], rows: usize, cols: usize) -> Self {
        let cols = cols.max(1);
        let slots: Vec<GridSlot> = streams
            .iter()
            .enumerate()
            .map(|(index, stream)| GridSlot {
                row: index / cols,
                col: index % cols,
                stream: stream.clone(),
            })
            .collect();
        Self {
            rows,
            cols,
            actual_rows: streams.len().div_ceil(cols),
            slots,
        }
    }

    /// Whether the grid holds no streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Main and alternate grids for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageAssignment {
    pub main: GridAssignment,
    pub alternate: GridAssignment,
}

impl PageAssignment {
    /// Every slot on the page, main grid first.
    pub fn slots(&self) -> impl Iterator<Item = &GridSlot> {
        self.main.slots.iter().chain(self.alternate.slots.iter())
    }
}

/// The full paginated layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub pages: Vec<PageAssignment>,
    pub current_page: usize,
    pub page_size: usize,
    pub total_streams: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            pages: vec![PageAssignment::default()],
            current_page: 0,
            page_size: 1,
            total_streams: 0,
        }
    }
}

impl GridLayout {
    /// The page currently shown.
    #[must_use]
    pub fn current(&self) -> Option<&PageAssignment> {
        self.pages.get(self.current_page)
    }

    /// Number of pages (always at least one).
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Every slot on every page.
    pub fn all_slots(&self) -> impl Iterator<Item = &GridSlot> {
        self.pages.iter().flat_map(PageAssignment::slots)
    }
}

/// Stateless grid solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridLayoutEngine;

impl GridLayoutEngine {
    /// Rebuild the whole layout from the grid members in insertion order.
    ///
    /// Only `SecondaryGrid` and `AudioOnly` streams are placed; anything else
    /// is ignored. `page` is clamped to the last page.
    #[must_use]
    pub fn rebuild<'a, I>(streams: I, budget: GridBudget, page: usize) -> GridLayout
    where
        I: IntoIterator<Item = &'a ClassifiedStream>,
    {
        let started = Instant::now();
        let budget = GridBudget::new(budget.rows, budget.cols);
        let members: Vec<StreamRef> = streams
            .into_iter()
            .filter(|s| s.bucket.is_grid())
            .map(StreamRef::from)
            .collect();

        let page_size = budget.page_size().max(1);
        let mut pages: Vec<PageAssignment> = members
            .chunks(page_size)
            .map(|chunk| Self::layout_page(chunk, budget))
            .collect();
        if pages.is_empty() {
            pages.push(PageAssignment::default());
        }

        let current_page = page.min(pages.len().saturating_sub(1));
        let layout = GridLayout {
            pages,
            current_page,
            page_size,
            total_streams: members.len(),
        };

        crate::observability::metrics::record_grid_rebuild(started.elapsed());
        trace!(
            target: "sc.layout",
            streams = layout.total_streams,
            pages = layout.page_count(),
            current_page = layout.current_page,
            "Grid rebuilt"
        );
        layout
    }

    fn layout_page(chunk: &[StreamRef], budget: GridBudget) -> PageAssignment {
        let cols = budget.cols;
        let full_rows = chunk.len() / cols;
        let remainder = chunk.len() % cols;

        if full_rows == 0 {
            return PageAssignment {
                main: GridAssignment::fill(chunk, 1, chunk.len().max(1)),
                alternate: GridAssignment::default(),
            };
        }

        let split = full_rows * cols;
        let (main, rest) = chunk.split_at(split.min(chunk.len()));
        let alternate = if remainder == 0 {
            GridAssignment::default()
        } else {
            GridAssignment::fill(rest, 1, remainder)
        };
        PageAssignment {
            main: GridAssignment::fill(main, full_rows, cols),
            alternate,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classifier::{Bucket, StreamOwner};
    use std::collections::HashSet;

    fn streams(n: usize) -> Vec<ClassifiedStream> {
        (0..n)
            .map(|i| ClassifiedStream {
                track_id: TrackId::new(format!("t{i}")),
                owner: StreamOwner::Participant(format!("p{i}")),
                kind: if i % 3 == 0 {
                    MediaKind::Audio
                } else {
                    MediaKind::Video
                },
                bucket: if i % 3 == 0 {
                    Bucket::AudioOnly
                } else {
                    Bucket::SecondaryGrid
                },
                card: CardKind::Video,
            })
            .collect()
    }

    #[test]
    fn test_empty_set_has_one_empty_page() {
        let layout = GridLayoutEngine::rebuild(&[], GridBudget::new(2, 2), 3);
        assert_eq!(layout.page_count(), 1);
        assert_eq!(layout.current_page, 0);
        assert_eq!(layout.total_streams, 0);
        assert!(layout.current().unwrap().main.is_empty());
    }

    #[test]
    fn test_remainder_goes_to_single_row_alternate() {
        let layout = GridLayoutEngine::rebuild(&streams(7), GridBudget::new(3, 3), 0);
        let page = layout.current().unwrap();

        assert_eq!(page.main.rows, 2);
        assert_eq!(page.main.cols, 3);
        assert_eq!(page.main.actual_rows, 2);
        assert_eq!(page.main.slots.len(), 6);
        assert_eq!(page.alternate.rows, 1);
        assert_eq!(page.alternate.cols, 1);
        assert_eq!(page.alternate.slots.len(), 1);
    }

    #[test]
    fn test_partial_row_fills_main_only() {
        let layout = GridLayoutEngine::rebuild(&streams(2), GridBudget::new(2, 4), 0);
        let page = layout.current().unwrap();
        assert_eq!(page.main.slots.len(), 2);
        assert_eq!(page.main.cols, 2);
        assert!(page.alternate.is_empty());
    }

    #[test]
    fn test_pagination_and_page_clamp() {
        let layout = GridLayoutEngine::rebuild(&streams(9), GridBudget::new(2, 2), 10);
        assert_eq!(layout.page_count(), 3);
        assert_eq!(layout.current_page, 2);
        assert_eq!(layout.current().unwrap().slots().count(), 1);
    }

    #[test]
    fn test_every_member_in_exactly_one_slot() {
        let members = streams(11);
        let layout = GridLayoutEngine::rebuild(&members, GridBudget::new(2, 3), 0);

        let placed: Vec<&TrackId> = layout.all_slots().map(|s| &s.stream.track_id).collect();
        let unique: HashSet<&TrackId> = placed.iter().copied().collect();
        assert_eq!(placed.len(), members.len());
        assert_eq!(unique.len(), members.len());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let members = streams(5);
        let first = GridLayoutEngine::rebuild(&members, GridBudget::new(2, 2), 1);
        let second = GridLayoutEngine::rebuild(&members, GridBudget::new(2, 2), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_grid_buckets_are_ignored() {
        let mut members = streams(2);
        if let Some(first) = members.first_mut() {
            first.bucket = Bucket::Primary;
        }
        let layout = GridLayoutEngine::rebuild(&members, GridBudget::new(2, 2), 0);
        assert_eq!(layout.total_streams, 1);
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        let layout = GridLayoutEngine::rebuild(&streams(3), GridBudget { rows: 0, cols: 0 }, 0);
        assert_eq!(layout.page_size, 1);
        assert_eq!(layout.page_count(), 3);
    }
}

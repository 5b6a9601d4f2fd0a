//! Pure geometry helpers: rectangles, border classification and the
//! row/column index math used by the table hover assistant.

use serde::{Deserialize, Serialize};

/// Distance in device pixels from a cell border within which the pointer
/// counts as "on" that border
pub const EDGE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Screen-space bounding box, as returned by `getBoundingClientRect`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// Edges are inclusive, matching hit testing on rendered elements
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    /// Convert a screen point into coordinates relative to this rect's origin
    pub fn to_local(&self, p: Point) -> Point {
        Point {
            x: p.x - self.left,
            y: p.y - self.top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Border {
    Top,
    Bottom,
    Left,
    Right,
}

impl Border {
    pub fn is_horizontal(&self) -> bool {
        matches!(self, Border::Top | Border::Bottom)
    }
}

/// Where a new row or column should be inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertTarget {
    Row(usize),
    Column(usize),
}

/// Classify a cell-local point against the cell's borders.
///
/// Horizontal borders win over vertical ones: `top` and `bottom` are checked
/// before `left` and `right`. Comparisons are strict, so a point exactly
/// `EDGE_THRESHOLD` away from a border does not count as on it.
pub fn classify_border(local: Point, cell: Size) -> Option<Border> {
    if local.y < EDGE_THRESHOLD {
        Some(Border::Top)
    } else if local.y > cell.height - EDGE_THRESHOLD {
        Some(Border::Bottom)
    } else if local.x < EDGE_THRESHOLD {
        Some(Border::Left)
    } else if local.x > cell.width - EDGE_THRESHOLD {
        Some(Border::Right)
    } else {
        None
    }
}

/// Translate a border hit on the cell at `row`/`col` into an insertion index
pub fn insertion_target(row: usize, col: usize, border: Border) -> InsertTarget {
    match border {
        Border::Top => InsertTarget::Row(row),
        Border::Bottom => InsertTarget::Row(row + 1),
        Border::Left => InsertTarget::Column(col),
        Border::Right => InsertTarget::Column(col + 1),
    }
}

/// Resolve which cell of a grid of rendered cell rects contains `p`
pub fn resolve_cell(rows: &[Vec<Rect>], p: Point) -> Option<(usize, usize)> {
    rows.iter().enumerate().find_map(|(r, cells)| {
        cells
            .iter()
            .position(|cell| cell.contains(p))
            .map(|c| (r, c))
    })
}

/*!
 * # Table Hover-Insert Assistant
 *
 * Shows a "+" affordance when the pointer rests on a cell border and turns a
 * click on it into a row or column insertion.
 *
 * The pure part ([`compute_hover`], [`plan_insertion`]) maps rendered
 * geometry to an [`InsertTarget`] and an affordance placement. The stateful
 * part ([`TableHoverAssistant`]) owns the affordance element and the
 * listeners that keep it alive, and tears both down on every exit path:
 * leaving the table and affordance, scrolling the table, scrolling the
 * document, or committing an insertion.
 */

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::editing::{ElementRef, SharedEngine, Side, Step, Transaction};
use crate::geometry::{
    Border, InsertTarget, Point, Rect, classify_border, insertion_target, resolve_cell,
};
use crate::listeners::{EventKind, EventTarget, ListenerScope, SharedHub};
use crate::nodes::{ElementId, NodeId};

/// Rendered geometry of one table, as measured by the host
#[derive(Debug, Clone, PartialEq)]
pub struct TableGeometry {
    pub table: NodeId,
    /// Bounding box of the table element
    pub table_rect: Rect,
    /// Bounding box of the editor content element
    pub editor_rect: Rect,
    /// Horizontal scroll offset of the table's scroll container
    pub scroll_left: f64,
    pub scroller_client_width: f64,
    pub table_client_width: f64,
    pub table_client_height: f64,
    /// Bounding box of every cell, row by row
    pub cells: Vec<Vec<Rect>>,
}

impl TableGeometry {
    /// Grid of equally sized cells starting at the table's top-left corner
    pub fn uniform(
        table: NodeId,
        table_origin: Point,
        editor_origin: Point,
        rows: usize,
        cols: usize,
        cell_width: f64,
        cell_height: f64,
    ) -> Self {
        let width = cell_width * cols as f64;
        let height = cell_height * rows as f64;
        let cells = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| {
                        Rect::new(
                            table_origin.x + c as f64 * cell_width,
                            table_origin.y + r as f64 * cell_height,
                            cell_width,
                            cell_height,
                        )
                    })
                    .collect()
            })
            .collect();
        Self {
            table,
            table_rect: Rect::new(table_origin.x, table_origin.y, width, height),
            editor_rect: Rect::new(editor_origin.x, editor_origin.y, width, height),
            scroll_left: 0.0,
            scroller_client_width: width,
            table_client_width: width,
            table_client_height: height,
            cells,
        }
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn col_count(&self) -> usize {
        self.cells.first().map(Vec::len).unwrap_or(0)
    }

    /// Hit-test a screen point against the cells
    pub fn target_at(&self, p: Point) -> PointerTarget {
        match resolve_cell(&self.cells, p) {
            Some((row, col)) => PointerTarget::Cell { row, col },
            None => PointerTarget::Other,
        }
    }
}

/// Element under the pointer during a table pointer move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Cell { row: usize, col: usize },
    Other,
}

/// What a document-wide pointer move landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hovered {
    /// No element at the point (pointer outside the window)
    Nothing,
    Table,
    Affordance,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Full-width bar on a row boundary
    Row,
    /// Full-height bar on a column boundary
    Column,
}

/// Affordance position relative to the editor content, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffordancePlacement {
    pub orientation: Orientation,
    pub top: f64,
    pub left: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverHit {
    pub target: InsertTarget,
    pub placement: AffordancePlacement,
}

/// Classify a pointer position over a table. `None` means no affordance.
pub fn compute_hover(
    geometry: &TableGeometry,
    target: PointerTarget,
    pointer: Point,
) -> Option<HoverHit> {
    let PointerTarget::Cell { row, col } = target else {
        return None;
    };
    let cell = *geometry.cells.get(row)?.get(col)?;
    let border = classify_border(cell.to_local(pointer), cell.size())?;

    let table = geometry.table_rect;
    let table_top = table.top - geometry.editor_rect.top;

    if border.is_horizontal() {
        let is_bottom = border == Border::Bottom;
        let is_top_row = row == 0 && border == Border::Top;
        let offset_y =
            (if is_bottom { cell.height } else { 0.0 }) + (if is_top_row { 0.0 } else { -1.0 });
        Some(HoverHit {
            target: insertion_target(row, col, border),
            placement: AffordancePlacement {
                orientation: Orientation::Row,
                top: table_top + (cell.top - table.top + offset_y),
                left: 0.0,
                width: Some(
                    geometry
                        .scroller_client_width
                        .min(geometry.table_client_width),
                ),
                height: None,
            },
        })
    } else {
        let total_cols = geometry.cells[row].len();
        let is_right = border == Border::Right;
        let is_right_col = col + 1 == total_cols && is_right;
        let offset_x =
            (if is_right { cell.width } else { 0.0 }) + (if is_right_col { -1.0 } else { 0.0 });
        Some(HoverHit {
            target: insertion_target(row, col, border),
            placement: AffordancePlacement {
                orientation: Orientation::Column,
                top: table_top,
                left: cell.left - table.left + offset_x - geometry.scroll_left,
                width: None,
                height: Some(geometry.table_client_height),
            },
        })
    }
}

/// Anchor cell and insertion side that realise an insertion target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPlan {
    pub row: usize,
    pub col: usize,
    pub side: Side,
    pub target: InsertTarget,
}

/// Pick the cell next to the target boundary to anchor the insertion on.
///
/// Index 0 anchors on the first row/column and inserts before it; an index
/// past the end anchors on the last and inserts after; anything else anchors
/// on the preceding row/column and inserts after it.
pub fn plan_insertion(target: InsertTarget, rows: usize, cols: usize) -> Option<InsertionPlan> {
    let anchor = |index: usize, count: usize| -> Option<(usize, Side)> {
        match index {
            _ if count == 0 => None,
            0 => Some((0, Side::Before)),
            i if i >= count => Some((count - 1, Side::After)),
            i => Some((i - 1, Side::After)),
        }
    };
    match target {
        InsertTarget::Row(index) => {
            let (row, side) = anchor(index, rows)?;
            Some(InsertionPlan {
                row,
                col: 0,
                side,
                target,
            })
        }
        InsertTarget::Column(index) => {
            let (col, side) = anchor(index, cols)?;
            Some(InsertionPlan {
                row: 0,
                col,
                side,
                target,
            })
        }
    }
}

/// Host surface that owns affordance elements
pub trait AffordanceHost {
    /// Create an affordance with its "+" button; returns the element id
    fn create(&mut self, table: NodeId) -> ElementId;
    fn place(&mut self, element: ElementId, placement: &AffordancePlacement);
    fn remove(&mut self, element: ElementId);
}

pub type SharedAffordanceHost = Rc<RefCell<dyn AffordanceHost>>;

/// In-memory [`AffordanceHost`] tracking live affordances and their placement
#[derive(Debug, Default)]
pub struct AffordanceLayer {
    live: HashMap<ElementId, Option<AffordancePlacement>>,
    created: usize,
}

impl AffordanceLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Total affordances ever created
    pub fn created(&self) -> usize {
        self.created
    }

    pub fn placement(&self, element: ElementId) -> Option<AffordancePlacement> {
        self.live.get(&element).copied().flatten()
    }
}

impl AffordanceHost for AffordanceLayer {
    fn create(&mut self, _table: NodeId) -> ElementId {
        let element = ElementId::new();
        self.live.insert(element, None);
        self.created += 1;
        element
    }

    fn place(&mut self, element: ElementId, placement: &AffordancePlacement) {
        if let Some(slot) = self.live.get_mut(&element) {
            *slot = Some(*placement);
        }
    }

    fn remove(&mut self, element: ElementId) {
        self.live.remove(&element);
    }
}

/// A visible affordance and the listeners that only live alongside it
pub struct HoverInsertState {
    element: ElementId,
    target: InsertTarget,
    _listeners: ListenerScope,
}

/// Per-table hover assistant
pub struct TableHoverAssistant {
    table: NodeId,
    engine: SharedEngine,
    hub: SharedHub,
    host: SharedAffordanceHost,
    _listeners: ListenerScope,
    state: Option<HoverInsertState>,
}

impl TableHoverAssistant {
    /// Start watching a rendered table: pointer moves over it, scrolls of its
    /// scroll container and scrolls anywhere in the document.
    pub fn attach(
        table: NodeId,
        engine: SharedEngine,
        hub: SharedHub,
        host: SharedAffordanceHost,
    ) -> Self {
        let mut listeners = ListenerScope::new(hub.clone());
        listeners.listen(EventTarget::Table(table), EventKind::PointerMove);
        listeners.listen(EventTarget::TableScroller(table), EventKind::Scroll);
        listeners.listen_capture(EventTarget::Document, EventKind::Scroll);
        Self {
            table,
            engine,
            hub,
            host,
            _listeners: listeners,
            state: None,
        }
    }

    pub fn table(&self) -> NodeId {
        self.table
    }

    pub fn current_target(&self) -> Option<InsertTarget> {
        self.state.as_ref().map(|s| s.target)
    }

    pub fn affordance(&self) -> Option<ElementId> {
        self.state.as_ref().map(|s| s.element)
    }

    pub fn on_table_pointer_move(
        &mut self,
        geometry: &TableGeometry,
        target: PointerTarget,
        pointer: Point,
    ) -> Option<InsertTarget> {
        let Some(hit) = compute_hover(geometry, target, pointer) else {
            self.teardown();
            return None;
        };
        let element = self.ensure_affordance()?;
        if let Ok(mut host) = self.host.try_borrow_mut() {
            host.place(element, &hit.placement);
        }
        if let Some(state) = self.state.as_mut() {
            state.target = hit.target;
        }
        Some(hit.target)
    }

    /// Document-wide pointer move while an affordance is shown
    pub fn on_document_pointer_move(&mut self, hovered: Hovered) {
        if hovered == Hovered::Outside {
            self.teardown();
        }
    }

    pub fn on_table_scroll(&mut self) {
        self.teardown();
    }

    pub fn on_document_scroll(&mut self) {
        self.teardown();
    }

    /// Insert the row or column the affordance points at, then hide it.
    /// Returns whether an insertion was made.
    pub fn on_affordance_click(&mut self, geometry: &TableGeometry) -> bool {
        let Some(target) = self.current_target() else {
            return false;
        };
        let inserted = self.insert(target, geometry);
        self.teardown();
        inserted
    }

    fn insert(&self, target: InsertTarget, geometry: &TableGeometry) -> bool {
        let Some(plan) = plan_insertion(target, geometry.row_count(), geometry.col_count()) else {
            return false;
        };
        let Ok(mut engine) = self.engine.try_borrow_mut() else {
            log::debug!("engine busy, dropping table insertion");
            return false;
        };
        let cell = ElementRef::TableCell {
            table: self.table,
            row: plan.row,
            col: plan.col,
        };
        let Some(pos) = engine.resolve_position(&cell) else {
            log::debug!("anchor cell {},{} not found", plan.row, plan.col);
            return false;
        };
        let step = match target {
            InsertTarget::Row(_) => Step::AddRow(plan.side),
            InsertTarget::Column(_) => Step::AddColumn(plan.side),
        };
        match engine.dispatch(Transaction::new().set_cursor(pos).step(step)) {
            Ok(_) => {
                log::debug!("inserted {target:?} via anchor {},{}", plan.row, plan.col);
                true
            }
            Err(err) => {
                log::warn!("table insertion failed: {err}");
                false
            }
        }
    }

    fn ensure_affordance(&mut self) -> Option<ElementId> {
        if let Some(state) = &self.state {
            return Some(state.element);
        }
        let element = self.host.try_borrow_mut().ok()?.create(self.table);
        let mut listeners = ListenerScope::new(self.hub.clone());
        listeners.listen_capture(EventTarget::Document, EventKind::PointerMove);
        listeners.listen(EventTarget::Element(element), EventKind::Click);
        self.state = Some(HoverInsertState {
            element,
            target: InsertTarget::Row(0),
            _listeners: listeners,
        });
        Some(element)
    }

    /// Remove the affordance and its listeners, if shown
    pub fn teardown(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        if let Ok(mut host) = self.host.try_borrow_mut() {
            host.remove(state.element);
        }
    }
}

impl Drop for TableHoverAssistant {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::{Document, DocumentEngine};
    use crate::geometry::EDGE_THRESHOLD;
    use crate::listeners::ListenerTable;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const CELL_W: f64 = 100.0;
    const CELL_H: f64 = 30.0;

    fn geometry(table: NodeId, rows: usize, cols: usize) -> TableGeometry {
        TableGeometry::uniform(
            table,
            Point::new(20.0, 50.0),
            Point::new(0.0, 10.0),
            rows,
            cols,
            CELL_W,
            CELL_H,
        )
    }

    fn cell_point(g: &TableGeometry, row: usize, col: usize, x: f64, y: f64) -> Point {
        let cell = g.cells[row][col];
        Point::new(cell.left + x, cell.top + y)
    }

    #[rstest]
    #[case(1, 0, 50.0, 2.0, Some(InsertTarget::Row(1)))]
    #[case(2, 0, 50.0, CELL_H - 2.0, Some(InsertTarget::Row(3)))]
    #[case(0, 0, 50.0, 2.0, Some(InsertTarget::Row(0)))]
    #[case(1, 1, 2.0, 15.0, Some(InsertTarget::Column(1)))]
    #[case(1, 2, CELL_W - 2.0, 15.0, Some(InsertTarget::Column(3)))]
    #[case(1, 1, 50.0, 15.0, None)]
    #[case(1, 1, 50.0, EDGE_THRESHOLD, None)]
    fn test_hover_targets(
        #[case] row: usize,
        #[case] col: usize,
        #[case] x: f64,
        #[case] y: f64,
        #[case] expected: Option<InsertTarget>,
    ) {
        let g = geometry(NodeId::new(), 3, 3);
        let p = cell_point(&g, row, col, x, y);
        let hit = compute_hover(&g, PointerTarget::Cell { row, col }, p);
        assert_eq!(hit.map(|h| h.target), expected);
    }

    #[test]
    fn test_non_cell_target_is_rejected() {
        let g = geometry(NodeId::new(), 3, 3);
        assert_eq!(compute_hover(&g, PointerTarget::Other, Point::new(21.0, 51.0)), None);
    }

    #[test]
    fn test_repeated_hover_yields_same_target() {
        let g = geometry(NodeId::new(), 3, 3);
        let p = cell_point(&g, 1, 0, 40.0, 1.0);
        let first = compute_hover(&g, g.target_at(p), p);
        let second = compute_hover(&g, g.target_at(p), p);
        assert_eq!(first, second);
    }

    #[test]
    fn test_row_bar_placement() {
        let mut g = geometry(NodeId::new(), 3, 3);
        g.scroller_client_width = 250.0;
        // top border of row 1: table_top(40) + (30 - 1)
        let p = cell_point(&g, 1, 0, 50.0, 1.0);
        let hit = compute_hover(&g, PointerTarget::Cell { row: 1, col: 0 }, p).unwrap();
        assert_eq!(
            hit.placement,
            AffordancePlacement {
                orientation: Orientation::Row,
                top: 69.0,
                left: 0.0,
                width: Some(250.0),
                height: None,
            }
        );

        // top border of the first row sits flush
        let p = cell_point(&g, 0, 0, 50.0, 1.0);
        let hit = compute_hover(&g, PointerTarget::Cell { row: 0, col: 0 }, p).unwrap();
        assert_eq!(hit.placement.top, 40.0);

        // bottom border of the last row: 40 + 60 + 30 - 1
        let p = cell_point(&g, 2, 0, 50.0, CELL_H - 1.0);
        let hit = compute_hover(&g, PointerTarget::Cell { row: 2, col: 0 }, p).unwrap();
        assert_eq!(hit.placement.top, 129.0);
    }

    #[test]
    fn test_column_bar_placement() {
        let mut g = geometry(NodeId::new(), 2, 3);
        g.scroll_left = 15.0;
        let p = cell_point(&g, 0, 1, CELL_W - 1.0, 10.0);
        let hit = compute_hover(&g, PointerTarget::Cell { row: 0, col: 1 }, p).unwrap();
        assert_eq!(
            hit.placement,
            AffordancePlacement {
                orientation: Orientation::Column,
                top: 40.0,
                left: 200.0 - 15.0,
                width: None,
                height: Some(60.0),
            }
        );

        // right border of the rightmost column is pulled in by one pixel
        let p = cell_point(&g, 0, 2, CELL_W - 1.0, 10.0);
        let hit = compute_hover(&g, PointerTarget::Cell { row: 0, col: 2 }, p).unwrap();
        assert_eq!(hit.placement.left, 300.0 - 1.0 - 15.0);
    }

    #[rstest]
    #[case(InsertTarget::Row(0), 0, 0, Side::Before)]
    #[case(InsertTarget::Row(1), 0, 0, Side::After)]
    #[case(InsertTarget::Row(3), 2, 0, Side::After)]
    #[case(InsertTarget::Row(7), 2, 0, Side::After)]
    #[case(InsertTarget::Column(0), 0, 0, Side::Before)]
    #[case(InsertTarget::Column(2), 0, 1, Side::After)]
    fn test_plan_insertion(
        #[case] target: InsertTarget,
        #[case] row: usize,
        #[case] col: usize,
        #[case] side: Side,
    ) {
        let plan = plan_insertion(target, 3, 3).unwrap();
        assert_eq!((plan.row, plan.col, plan.side), (row, col, side));
    }

    struct Fixture {
        doc: Rc<RefCell<Document>>,
        hub: Rc<RefCell<ListenerTable>>,
        layer: Rc<RefCell<AffordanceLayer>>,
        assistant: TableHoverAssistant,
        geometry: TableGeometry,
    }

    fn fixture() -> Fixture {
        let doc = Document::builder()
            .table(&[&["a", "b", "c"], &["d", "e", "f"], &["g", "h", "i"]], true)
            .paragraph("")
            .build();
        let table = doc.tables()[0].id;
        let doc = Rc::new(RefCell::new(doc));
        let hub = Rc::new(RefCell::new(ListenerTable::new()));
        let layer = Rc::new(RefCell::new(AffordanceLayer::new()));
        let engine: SharedEngine = doc.clone();
        let shared_hub: SharedHub = hub.clone();
        let host: SharedAffordanceHost = layer.clone();
        let assistant = TableHoverAssistant::attach(table, engine, shared_hub, host);
        Fixture {
            doc,
            hub,
            layer,
            assistant,
            geometry: geometry(table, 3, 3),
        }
    }

    fn hover(f: &mut Fixture, row: usize, col: usize, x: f64, y: f64) -> Option<InsertTarget> {
        let p = cell_point(&f.geometry, row, col, x, y);
        let target = f.geometry.target_at(p);
        f.assistant.on_table_pointer_move(&f.geometry, target, p)
    }

    #[test]
    fn test_attach_registers_table_and_document_listeners() {
        let f = fixture();
        let hub = f.hub.borrow();
        let table = f.assistant.table();
        assert!(hub.is_listening(EventTarget::Table(table), EventKind::PointerMove));
        assert!(hub.is_listening(EventTarget::TableScroller(table), EventKind::Scroll));
        assert!(hub
            .listeners()
            .any(|l| l.target == EventTarget::Document && l.kind == EventKind::Scroll && l.capture));
    }

    #[test]
    fn test_interior_hover_hides_affordance() {
        let mut f = fixture();
        assert_eq!(hover(&mut f, 1, 1, 50.0, 2.0), Some(InsertTarget::Row(1)));
        assert_eq!(f.layer.borrow().live_count(), 1);

        assert_eq!(hover(&mut f, 1, 1, 50.0, 15.0), None);
        assert_eq!(f.layer.borrow().live_count(), 0);
        assert_eq!(f.hub.borrow().active_count(), 3);
    }

    #[test]
    fn test_affordance_is_reused_while_hovering() {
        let mut f = fixture();
        hover(&mut f, 1, 1, 50.0, 2.0);
        hover(&mut f, 1, 1, 2.0, 15.0);
        assert_eq!(f.layer.borrow().created(), 1);
        assert_eq!(f.assistant.current_target(), Some(InsertTarget::Column(1)));
    }

    #[rstest]
    #[case::leaving(Some(Hovered::Outside), false)]
    #[case::over_affordance(Some(Hovered::Affordance), true)]
    #[case::over_table(Some(Hovered::Table), true)]
    #[case::no_element(Some(Hovered::Nothing), true)]
    #[case::table_scroll(None, false)]
    fn test_teardown_triggers(#[case] hovered: Option<Hovered>, #[case] survives: bool) {
        let mut f = fixture();
        hover(&mut f, 0, 0, 50.0, 2.0);
        match hovered {
            Some(h) => f.assistant.on_document_pointer_move(h),
            None => f.assistant.on_table_scroll(),
        }
        assert_eq!(f.assistant.affordance().is_some(), survives);
        assert_eq!(f.layer.borrow().live_count(), usize::from(survives));
        // table listeners plus, while shown, document move and button click
        let expected = if survives { 5 } else { 3 };
        assert_eq!(f.hub.borrow().active_count(), expected);
    }

    #[test]
    fn test_document_scroll_tears_down() {
        let mut f = fixture();
        hover(&mut f, 0, 0, 50.0, 2.0);
        f.assistant.on_document_scroll();
        assert_eq!(f.layer.borrow().live_count(), 0);
    }

    #[test]
    fn test_click_inserts_row_before_hovered_row() {
        let mut f = fixture();
        hover(&mut f, 1, 0, 50.0, 2.0);
        assert!(f.assistant.on_affordance_click(&f.geometry.clone()));

        let doc = f.doc.borrow();
        let table = doc.tables()[0];
        assert_eq!(table.rows, 4);
        assert_eq!(doc.cell_text(table.id, 0, 0), Some("a".to_string()));
        assert_eq!(doc.cell_text(table.id, 1, 0), Some(String::new()));
        assert_eq!(doc.cell_text(table.id, 2, 0), Some("d".to_string()));
        assert_eq!(doc.version(), 1);
        drop(doc);
        assert_eq!(f.layer.borrow().live_count(), 0);
    }

    #[test]
    fn test_click_on_bottom_of_last_row_appends() {
        let mut f = fixture();
        assert_eq!(hover(&mut f, 2, 1, 50.0, CELL_H - 2.0), Some(InsertTarget::Row(3)));
        f.assistant.on_affordance_click(&f.geometry.clone());

        let doc = f.doc.borrow();
        let table = doc.tables()[0];
        assert_eq!(table.rows, 4);
        assert_eq!(doc.cell_text(table.id, 2, 0), Some("g".to_string()));
        assert_eq!(doc.cell_text(table.id, 3, 0), Some(String::new()));
    }

    #[test]
    fn test_click_on_left_of_first_column_prepends() {
        let mut f = fixture();
        hover(&mut f, 1, 0, 1.0, 15.0);
        f.assistant.on_affordance_click(&f.geometry.clone());

        let doc = f.doc.borrow();
        let table = doc.tables()[0];
        assert_eq!(table.cols, 4);
        assert_eq!(doc.cell_text(table.id, 0, 0), Some(String::new()));
        assert_eq!(doc.cell_text(table.id, 0, 1), Some("a".to_string()));
        assert_eq!(doc.is_header_cell(table.id, 0, 0), Some(true));
    }

    #[test]
    fn test_dropping_assistant_releases_everything() {
        let mut f = fixture();
        hover(&mut f, 0, 0, 50.0, 2.0);
        let Fixture { hub, layer, assistant, .. } = f;
        drop(assistant);
        assert_eq!(hub.borrow().active_count(), 0);
        assert_eq!(layer.borrow().live_count(), 0);
    }
}

//! Placement engine
//!
//! Owns every workspace instance and turns pointer input into position
//! updates and merge decisions. All operations are synchronous and hold the
//! lock only for the duration of one call; nothing here awaits.

use crate::config::{CanvasConfig, TieBreak};
use crate::error::CraftError;
use crate::geometry::{Point, Rect};
use craft_element::{ElementId, InstanceId};
use craft_store::{SessionKey, SessionStore, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A placed, draggable occurrence of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: InstanceId,
    pub element_id: ElementId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Instance {
    #[inline]
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn move_to(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }
}

/// Result of releasing a dragged instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// Pointer never left the threshold: treat as a click on the element
    Select(ElementId),
    /// Dropped onto another instance
    Merge {
        moved: InstanceId,
        partner: InstanceId,
    },
    /// Dropped on empty canvas
    Moved,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    instance_id: InstanceId,
    /// Pointer minus instance origin at press time
    offset: Point,
    start: Point,
    moved: bool,
}

#[derive(Debug)]
struct WorkspaceState {
    canvas: CanvasConfig,
    instances: Vec<Instance>,
    drag: Option<DragState>,
}

impl WorkspaceState {
    fn index_of(&self, id: InstanceId) -> Option<usize> {
        self.instances.iter().position(|i| i.instance_id == id)
    }

    fn clamp(&self, rect: Rect) -> Rect {
        rect.clamped_to(self.canvas.width, self.canvas.height)
    }

    fn partner_for(&self, moved: &Instance) -> Option<InstanceId> {
        let rect = moved.rect();
        let mut candidates = self
            .instances
            .iter()
            .filter(|other| other.instance_id != moved.instance_id)
            .filter(|other| rect.overlaps(&other.rect()));

        match self.canvas.tie_break {
            TieBreak::FirstInOrder => candidates.next().map(|o| o.instance_id),
            TieBreak::NearestCenter => {
                let center = rect.center();
                let mut best: Option<(f64, InstanceId)> = None;
                for other in candidates {
                    let d = center.distance_sq(other.rect().center());
                    // strict `<` keeps the earliest on equal distance
                    if best.map_or(true, |(bd, _)| d < bd) {
                        best = Some((d, other.instance_id));
                    }
                }
                best.map(|(_, id)| id)
            }
        }
    }
}

/// The set of instances on the canvas
#[derive(Debug)]
pub struct Workspace {
    state: Mutex<WorkspaceState>,
}

impl Workspace {
    #[must_use]
    pub fn new(canvas: CanvasConfig) -> Self {
        Self {
            state: Mutex::new(WorkspaceState {
                canvas,
                instances: Vec::new(),
                drag: None,
            }),
        }
    }

    /// Place a new instance of `element_id` centered on `at`, clamped to the canvas
    pub fn place(&self, element_id: ElementId, at: Point) -> InstanceId {
        let mut state = self.state.lock();
        let (w, h) = (state.canvas.instance_width, state.canvas.instance_height);
        let rect = state.clamp(Rect::new(at.x - w / 2.0, at.y - h / 2.0, w, h));
        let instance = Instance {
            instance_id: InstanceId::new(),
            element_id,
            x: rect.x,
            y: rect.y,
            width: w,
            height: h,
        };
        let id = instance.instance_id;
        state.instances.push(instance);
        id
    }

    /// Start dragging `instance_id` with the pointer at `pointer`
    ///
    /// # Errors
    /// Returns [`CraftError::InstanceNotFound`] if the instance does not exist
    pub fn begin_drag(&self, instance_id: InstanceId, pointer: Point) -> Result<(), CraftError> {
        let mut state = self.state.lock();
        let idx = state
            .index_of(instance_id)
            .ok_or(CraftError::InstanceNotFound(instance_id))?;
        let origin = state.instances[idx].position();
        state.drag = Some(DragState {
            instance_id,
            offset: Point::new(pointer.x - origin.x, pointer.y - origin.y),
            start: pointer,
            moved: false,
        });
        Ok(())
    }

    /// Follow the pointer; returns the new clamped position
    ///
    /// Returns `None` when `instance_id` is not the instance being dragged.
    pub fn update_drag(&self, instance_id: InstanceId, pointer: Point) -> Option<Point> {
        let mut state = self.state.lock();
        let threshold = state.canvas.drag_threshold;
        let drag = state.drag.as_mut().filter(|d| d.instance_id == instance_id)?;

        if !drag.moved && pointer.distance_sq(drag.start) > threshold * threshold {
            drag.moved = true;
        }
        let offset = drag.offset;

        let idx = state.index_of(instance_id)?;
        let current = state.instances[idx].rect();
        let target = state.clamp(Rect {
            x: pointer.x - offset.x,
            y: pointer.y - offset.y,
            ..current
        });
        state.instances[idx].move_to(target.origin());
        Some(target.origin())
    }

    /// Release the dragged instance and decide what the gesture meant
    ///
    /// A moved instance merges with at most one partner. Returns `None` when
    /// `instance_id` is not being dragged or no longer exists.
    pub fn end_drag(&self, instance_id: InstanceId) -> Option<DragOutcome> {
        let mut state = self.state.lock();
        let drag = state.drag.filter(|d| d.instance_id == instance_id)?;
        state.drag = None;

        let idx = state.index_of(instance_id)?;
        let moved = &state.instances[idx];
        if !drag.moved {
            return Some(DragOutcome::Select(moved.element_id));
        }

        let outcome = match state.partner_for(moved) {
            Some(partner) => DragOutcome::Merge {
                moved: instance_id,
                partner,
            },
            None => DragOutcome::Moved,
        };
        tracing::debug!(instance = %instance_id, ?outcome, "drag ended");
        Some(outcome)
    }

    /// Overlapping partner for `instance_id` under the configured tie-break
    #[must_use]
    pub fn find_partner(&self, instance_id: InstanceId) -> Option<InstanceId> {
        let state = self.state.lock();
        let idx = state.index_of(instance_id)?;
        state.partner_for(&state.instances[idx])
    }

    /// Atomically swap two source instances for one result instance
    ///
    /// The result sits at the midpoint of the two sources. Returns `None`,
    /// leaving the workspace untouched, if either source is gone.
    pub fn replace_pair(
        &self,
        a: InstanceId,
        b: InstanceId,
        result: ElementId,
    ) -> Option<Instance> {
        let mut state = self.state.lock();
        let first = state.instances[state.index_of(a)?].clone();
        let second = state.instances[state.index_of(b)?].clone();
        if a == b {
            return None;
        }

        let at = first.position().midpoint(second.position());
        let instance = Instance {
            instance_id: InstanceId::new(),
            element_id: result,
            x: at.x,
            y: at.y,
            width: first.width,
            height: first.height,
        };

        state.instances.retain(|i| i.instance_id != a && i.instance_id != b);
        state.instances.push(instance.clone());
        if state.drag.is_some_and(|d| d.instance_id == a || d.instance_id == b) {
            state.drag = None;
        }
        Some(instance)
    }

    /// Remove specific instances; returns how many were removed
    pub fn remove(&self, ids: &[InstanceId]) -> usize {
        let mut state = self.state.lock();
        let before = state.instances.len();
        state.instances.retain(|i| !ids.contains(&i.instance_id));
        if state.drag.is_some_and(|d| ids.contains(&d.instance_id)) {
            state.drag = None;
        }
        before - state.instances.len()
    }

    /// Remove every instance
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.instances.clear();
        state.drag = None;
    }

    #[must_use]
    pub fn get(&self, instance_id: InstanceId) -> Option<Instance> {
        let state = self.state.lock();
        state.index_of(instance_id).map(|i| state.instances[i].clone())
    }

    /// Snapshot of all instances in list order
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        self.state.lock().instances.clone()
    }

    /// Replace all instances, e.g. from session state
    pub fn restore(&self, instances: Vec<Instance>) {
        let mut state = self.state.lock();
        state.instances = instances;
        state.drag = None;
    }

    /// Mirror the instance list into session state
    ///
    /// # Errors
    /// Returns error if the list cannot be encoded
    pub fn save(&self, session: &SessionStore) -> Result<(), StoreError> {
        session.set(SessionKey::WorkspaceInstances, &self.instances())
    }

    /// Replace all instances with those held in session state
    ///
    /// Returns how many instances were loaded.
    ///
    /// # Errors
    /// Returns error if the stored value is not an instance list
    pub fn load(&self, session: &SessionStore) -> Result<usize, StoreError> {
        let instances = session
            .get::<Vec<Instance>>(SessionKey::WorkspaceInstances)?
            .unwrap_or_default();
        let count = instances.len();
        self.restore(instances);
        Ok(count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> Workspace {
        Workspace::new(CanvasConfig::default())
    }

    fn drag(ws: &Workspace, id: InstanceId, from: Point, to: Point) -> Option<DragOutcome> {
        ws.begin_drag(id, from).unwrap();
        ws.update_drag(id, to);
        ws.end_drag(id)
    }

    #[test]
    fn place_centers_on_pointer() {
        let ws = workspace();
        let id = ws.place(ElementId::new(), Point::new(300.0, 200.0));
        let inst = ws.get(id).unwrap();
        assert_eq!(inst.position(), Point::new(240.0, 140.0));
        assert_eq!((inst.width, inst.height), (120.0, 120.0));
    }

    #[test]
    fn place_outside_canvas_is_clamped() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(-500.0, 5000.0));
        let b = ws.place(ElementId::new(), Point::new(5000.0, -10.0));
        assert_eq!(ws.get(a).unwrap().position(), Point::new(0.0, 648.0));
        assert_eq!(ws.get(b).unwrap().position(), Point::new(904.0, 0.0));
    }

    #[test]
    fn same_element_may_be_placed_twice() {
        let ws = workspace();
        let element = ElementId::new();
        let a = ws.place(element, Point::new(100.0, 100.0));
        let b = ws.place(element, Point::new(400.0, 100.0));
        assert_ne!(a, b);
        assert_eq!(ws.len(), 2);
    }

    #[test]
    fn drag_keeps_grab_offset_and_clamps() {
        let ws = workspace();
        let id = ws.place(ElementId::new(), Point::new(160.0, 160.0)); // origin (100,100)
        ws.begin_drag(id, Point::new(110.0, 120.0)).unwrap();

        let p = ws.update_drag(id, Point::new(210.0, 220.0)).unwrap();
        assert_eq!(p, Point::new(200.0, 200.0));

        let p = ws.update_drag(id, Point::new(-1000.0, -1000.0)).unwrap();
        assert_eq!(p, Point::new(0.0, 0.0));
    }

    #[test]
    fn update_without_drag_is_ignored() {
        let ws = workspace();
        let id = ws.place(ElementId::new(), Point::new(160.0, 160.0));
        assert!(ws.update_drag(id, Point::new(500.0, 500.0)).is_none());
        assert!(ws.end_drag(id).is_none());
    }

    #[test]
    fn begin_drag_unknown_instance_fails() {
        let ws = workspace();
        let err = ws.begin_drag(InstanceId::new(), Point::default()).unwrap_err();
        assert!(matches!(err, CraftError::InstanceNotFound(_)));
    }

    #[test]
    fn click_selects_instead_of_merging() {
        let ws = workspace();
        let element = ElementId::new();
        let a = ws.place(element, Point::new(160.0, 160.0));
        ws.place(ElementId::new(), Point::new(170.0, 170.0));

        let outcome = drag(&ws, a, Point::new(160.0, 160.0), Point::new(161.0, 161.0));
        assert_eq!(outcome, Some(DragOutcome::Select(element)));
    }

    #[test]
    fn drop_on_empty_canvas_just_moves() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(160.0, 160.0));
        ws.place(ElementId::new(), Point::new(800.0, 600.0));

        let outcome = drag(&ws, a, Point::new(160.0, 160.0), Point::new(400.0, 160.0));
        assert_eq!(outcome, Some(DragOutcome::Moved));
    }

    #[test]
    fn drop_onto_instance_requests_merge() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(160.0, 160.0));
        let b = ws.place(ElementId::new(), Point::new(460.0, 160.0));

        let outcome = drag(&ws, a, Point::new(160.0, 160.0), Point::new(420.0, 170.0));
        assert_eq!(outcome, Some(DragOutcome::Merge { moved: a, partner: b }));
    }

    #[test]
    fn edge_touching_drop_does_not_merge() {
        let ws = Workspace::new(CanvasConfig::default());
        let a = ws.place(ElementId::new(), Point::new(60.0, 60.0)); // (0,0)
        ws.place(ElementId::new(), Point::new(300.0, 60.0)); // (240,0)

        // Move a to (120,0): right edge at 240 touches b's left edge
        let outcome = drag(&ws, a, Point::new(60.0, 60.0), Point::new(180.0, 60.0));
        assert_eq!(outcome, Some(DragOutcome::Moved));
    }

    #[test]
    fn nearest_center_breaks_ties() {
        let ws = workspace();
        let far = ws.place(ElementId::new(), Point::new(300.0, 300.0));
        let near = ws.place(ElementId::new(), Point::new(380.0, 300.0));
        let moved = ws.place(ElementId::new(), Point::new(360.0, 300.0));

        assert!(ws.get(moved).unwrap().rect().overlaps(&ws.get(far).unwrap().rect()));
        assert_eq!(ws.find_partner(moved), Some(near));
    }

    #[test]
    fn first_in_order_uses_list_order() {
        let ws = Workspace::new(CanvasConfig {
            tie_break: TieBreak::FirstInOrder,
            ..CanvasConfig::default()
        });
        let far = ws.place(ElementId::new(), Point::new(300.0, 300.0));
        ws.place(ElementId::new(), Point::new(380.0, 300.0));
        let moved = ws.place(ElementId::new(), Point::new(360.0, 300.0));

        assert_eq!(ws.find_partner(moved), Some(far));
    }

    #[test]
    fn equal_distance_falls_back_to_list_order() {
        let ws = workspace();
        let left = ws.place(ElementId::new(), Point::new(300.0, 300.0));
        ws.place(ElementId::new(), Point::new(400.0, 300.0));
        let moved = ws.place(ElementId::new(), Point::new(350.0, 300.0));
        assert_eq!(ws.find_partner(moved), Some(left));
    }

    #[test]
    fn replace_pair_is_atomic_and_uses_midpoint() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(160.0, 160.0)); // (100,100)
        let b = ws.place(ElementId::new(), Point::new(260.0, 360.0)); // (200,300)
        let other = ws.place(ElementId::new(), Point::new(800.0, 600.0));
        let result = ElementId::new();

        let created = ws.replace_pair(a, b, result).unwrap();
        assert_eq!(created.element_id, result);
        assert_eq!(created.position(), Point::new(150.0, 200.0));

        let ids: Vec<InstanceId> = ws.instances().iter().map(|i| i.instance_id).collect();
        assert_eq!(ids, vec![other, created.instance_id]);
    }

    #[test]
    fn replace_pair_with_missing_source_changes_nothing() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(160.0, 160.0));
        let before = ws.instances();
        assert!(ws.replace_pair(a, InstanceId::new(), ElementId::new()).is_none());
        assert_eq!(ws.instances(), before);
    }

    #[test]
    fn remove_and_clear() {
        let ws = workspace();
        let a = ws.place(ElementId::new(), Point::new(100.0, 100.0));
        let b = ws.place(ElementId::new(), Point::new(400.0, 100.0));
        ws.place(ElementId::new(), Point::new(700.0, 100.0));

        assert_eq!(ws.remove(&[a, b, InstanceId::new()]), 2);
        assert_eq!(ws.len(), 1);
        ws.clear();
        assert!(ws.is_empty());
    }

    #[test]
    fn instance_json_shape() {
        let ws = workspace();
        let id = ws.place(ElementId::new(), Point::new(100.0, 100.0));
        let json = serde_json::to_value(ws.get(id).unwrap()).unwrap();
        assert!(json.get("instanceId").is_some());
        assert!(json.get("elementId").is_some());
        assert_eq!(json["width"], 120.0);
    }

    #[test]
    fn session_round_trip() {
        let session = SessionStore::new();
        let ws = workspace();
        let id = ws.place(ElementId::new(), Point::new(100.0, 100.0));
        ws.save(&session).unwrap();

        let restored = workspace();
        assert_eq!(restored.load(&session).unwrap(), 1);
        assert_eq!(restored.get(id), ws.get(id));

        session.remove(SessionKey::WorkspaceInstances);
        assert_eq!(restored.load(&session).unwrap(), 0);
        assert!(restored.is_empty());
    }
}

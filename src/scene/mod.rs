// SPDX-License-Identifier: GPL-3.0-only

//! The scene graph: a tree of [`Surface`] nodes rooted at each mapped
//! toplevel, popup and layer surface. Mirrors the commit/damage protocol a
//! wayland compositor implements on top of `wl_surface`, but kept decoupled
//! from `smithay::desktop::Space` so the shell can address views, popups and
//! layer surfaces uniformly.

pub mod damage;

use smithay::output::Output;
use smithay::utils::{Logical, Physical, Point, Rectangle, Scale, Size, Transform};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::utils::coordinates::OutputRelativePoint;
use crate::utils::IdGen;

/// What kind of client content a [`Surface`] node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Toplevel,
    Popup,
    Subsurface,
    LayerSurface,
    Cursor,
}

pub type SurfaceId = u64;

/// A node in the scene graph.
///
/// Popups attach to their *popup parent* (the surface they are visually
/// anchored to), which is not necessarily their geometric parent in the
/// `children` tree — a popup of a subsurface is still a child of the
/// toplevel for damage purposes, but its popup-parent is the subsurface.
pub struct Surface {
    pub id: SurfaceId,
    pub role: SurfaceRole,
    /// Position relative to this surface's output, top-left origin.
    pub position: OutputRelativePoint,
    pub size: Size<i32, Logical>,
    pub buffer_scale: i32,
    pub buffer_transform: Transform,
    pub alpha: f32,
    pub mapped: bool,
    parent: Option<Weak<RefCell<Surface>>>,
    popup_parent: Option<Weak<RefCell<Surface>>>,
    children: Vec<Rc<RefCell<Surface>>>,
    output: Option<Output>,
    /// Accumulated damage in this surface's own buffer-local space, not yet
    /// translated to output-relative physical coordinates.
    pending_damage: Vec<Rectangle<i32, Logical>>,
    /// References held against this node (e.g. an in-flight frame callback,
    /// a render pass that queued a texture upload). The node's storage is
    /// only torn down once `destroyed` is set and `keep_count` drops to 0.
    keep_count: u32,
    destroyed: bool,
}

impl Surface {
    pub fn new(id_gen: &IdGen, role: SurfaceRole) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            id: id_gen.next(),
            role,
            position: OutputRelativePoint::new(0, 0),
            size: Size::from((0, 0)),
            buffer_scale: 1,
            buffer_transform: Transform::Normal,
            alpha: 1.0,
            mapped: false,
            parent: None,
            popup_parent: None,
            children: Vec::new(),
            output: None,
            pending_damage: Vec::new(),
            keep_count: 0,
            destroyed: false,
        }))
    }

    pub fn map(&mut self) {
        self.mapped = true;
    }

    pub fn unmap(&mut self) {
        self.mapped = false;
        self.pending_damage.clear();
    }

    /// Attach a geometric child (e.g. a subsurface).
    pub fn add_child(parent: &Rc<RefCell<Surface>>, child: Rc<RefCell<Surface>>) {
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        parent.borrow_mut().children.push(child);
    }

    /// Attach a popup to the surface it is visually anchored to. This is
    /// independent of `add_child`: a popup's popup-parent is whichever
    /// surface it was positioned against, which may differ from its
    /// geometric parent in the tree walked for rendering order.
    pub fn set_popup_parent(popup: &Rc<RefCell<Surface>>, popup_parent: &Rc<RefCell<Surface>>) {
        popup.borrow_mut().popup_parent = Some(Rc::downgrade(popup_parent));
    }

    pub fn popup_parent(&self) -> Option<Rc<RefCell<Surface>>> {
        self.popup_parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn parent(&self) -> Option<Rc<RefCell<Surface>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Apply a commit: merge new buffer-local damage and recompute this
    /// node's contribution to the output's physical damage region.
    ///
    /// The three steps mirror the wire protocol's damage request: the
    /// damage a client submits is in its own buffer-local coordinates, so
    /// it must be (1) scaled from buffer to logical space, (2) translated
    /// by this surface's output-relative position, and only then (3)
    /// converted to the physical pixels the output actually damages.
    pub fn commit(&mut self, buffer_damage: &[Rectangle<i32, Logical>], output_scale: Scale<f64>) -> Vec<Rectangle<i32, Physical>> {
        self.pending_damage.extend_from_slice(buffer_damage);

        let physical: Vec<_> = self
            .pending_damage
            .drain(..)
            .map(|rect| {
                let translated = Rectangle::new(rect.loc + self.position.as_point(), rect.size);
                translated.to_physical_precise_up(output_scale)
            })
            .collect();

        physical
    }

    /// Depth-first walk over this surface and its children.
    ///
    /// `reverse` controls whether children are visited bottom-to-top
    /// (`false`, the order a renderer paints in) or top-to-bottom (`true`,
    /// the order hit-testing wants so the topmost surface wins).
    pub fn for_each_surface(self_rc: &Rc<RefCell<Surface>>, reverse: bool, callback: &mut dyn FnMut(&Rc<RefCell<Surface>>)) {
        if reverse {
            callback(self_rc);
        }
        let children = self_rc.borrow().children.clone();
        let iter: Box<dyn Iterator<Item = &Rc<RefCell<Surface>>>> = if reverse {
            Box::new(children.iter().rev())
        } else {
            Box::new(children.iter())
        };
        for child in iter {
            Surface::for_each_surface(child, reverse, callback);
        }
        if !reverse {
            callback(self_rc);
        }
    }

    /// Minimal single-surface render path used by plugins that draw their
    /// own content instead of delegating to the layered renderer (e.g. a
    /// screen-lock surface). Returns the damage rectangles that still need
    /// painting, already translated to physical coordinates.
    pub fn simple_render(&mut self, output_scale: Scale<f64>) -> Vec<Rectangle<i32, Physical>> {
        if !self.mapped {
            return Vec::new();
        }
        let full = Rectangle::new(Point::from((0, 0)), self.size);
        self.commit(&[full], output_scale)
    }

    pub fn damage(&self) -> &[Rectangle<i32, Logical>] {
        &self.pending_damage
    }

    pub fn get_output_geometry(&self) -> Option<Rectangle<i32, Logical>> {
        self.output.as_ref().map(|_| Rectangle::new(self.position.as_point(), self.size))
    }

    pub fn set_output(&mut self, output: Option<Output>) {
        self.output = output;
    }

    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Borrow this node past its own destruction, e.g. while a render pass
    /// still references the last-committed buffer.
    pub fn retain(&mut self) {
        self.keep_count += 1;
    }

    /// Release a `retain()`. Once `destroyed` was requested and the last
    /// reference drops, the node is detached from its parent so nothing
    /// else can observe it.
    pub fn release(self_rc: &Rc<RefCell<Surface>>) {
        let should_detach = {
            let mut node = self_rc.borrow_mut();
            if node.keep_count > 0 {
                node.keep_count -= 1;
            }
            node.destroyed && node.keep_count == 0
        };
        if should_detach {
            let parent = self_rc.borrow().parent();
            if let Some(parent) = parent {
                parent.borrow_mut().children.retain(|c| !Rc::ptr_eq(c, self_rc));
            }
        }
    }

    /// Mark for teardown. If nothing is retaining the node, it is detached
    /// immediately; otherwise detachment is deferred until the last
    /// `release()`.
    pub fn destroy(self_rc: &Rc<RefCell<Surface>>) {
        self_rc.borrow_mut().destroyed = true;
        if self_rc.borrow().keep_count == 0 {
            let parent = self_rc.borrow().parent();
            if let Some(parent) = parent {
                parent.borrow_mut().children.retain(|c| !Rc::ptr_eq(c, self_rc));
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_translates_damage_by_position() {
        let ids = IdGen::new();
        let surface = Surface::new(&ids, SurfaceRole::Toplevel);
        surface.borrow_mut().position = OutputRelativePoint::new(100, 50);
        surface.borrow_mut().map();

        let damage = vec![Rectangle::new(Point::from((0, 0)), Size::from((10, 10)))];
        let physical = surface.borrow_mut().commit(&damage, Scale::from(1.0));

        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].loc, Point::from((100, 50)));
    }

    #[test]
    fn for_each_surface_visits_children_in_requested_order() {
        let ids = IdGen::new();
        let root = Surface::new(&ids, SurfaceRole::Toplevel);
        let child_a = Surface::new(&ids, SurfaceRole::Subsurface);
        let child_b = Surface::new(&ids, SurfaceRole::Subsurface);
        Surface::add_child(&root, child_a.clone());
        Surface::add_child(&root, child_b.clone());

        let mut visited = Vec::new();
        Surface::for_each_surface(&root, false, &mut |s| visited.push(s.borrow().id));
        assert_eq!(visited, vec![child_a.borrow().id, child_b.borrow().id, root.borrow().id]);

        let mut visited_rev = Vec::new();
        Surface::for_each_surface(&root, true, &mut |s| visited_rev.push(s.borrow().id));
        assert_eq!(visited_rev, vec![root.borrow().id, child_a.borrow().id, child_b.borrow().id]);
    }

    #[test]
    fn destroy_is_deferred_while_retained() {
        let ids = IdGen::new();
        let root = Surface::new(&ids, SurfaceRole::Toplevel);
        let child = Surface::new(&ids, SurfaceRole::Subsurface);
        Surface::add_child(&root, child.clone());

        child.borrow_mut().retain();
        Surface::destroy(&child);
        assert_eq!(root.borrow().children.len(), 1, "still retained, must not detach yet");

        Surface::release(&child);
        assert_eq!(root.borrow().children.len(), 0, "last release must detach");
    }

    #[test]
    fn popup_parent_is_independent_of_geometric_parent() {
        let ids = IdGen::new();
        let toplevel = Surface::new(&ids, SurfaceRole::Toplevel);
        let subsurface = Surface::new(&ids, SurfaceRole::Subsurface);
        let popup = Surface::new(&ids, SurfaceRole::Popup);

        Surface::add_child(&toplevel, subsurface.clone());
        Surface::add_child(&toplevel, popup.clone());
        Surface::set_popup_parent(&popup, &subsurface);

        let popup_parent = popup.borrow().popup_parent().unwrap();
        assert_eq!(popup_parent.borrow().id, subsurface.borrow().id);
    }
}

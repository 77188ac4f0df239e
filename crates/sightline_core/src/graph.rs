//! # Object Graph Reader
//!
//! Structural queries against the foreign graph. Nothing here is cached:
//! every call re-reads remote memory, and every hop is sanity-checked.
//!
//! ## Contract
//!
//! No query fails. Each degrades to a neutral value instead:
//!
//! | Query                    | Neutral value              |
//! |--------------------------|----------------------------|
//! | `children()`             | empty list                 |
//! | `name()` / `type_tag()`  | `"null"` / `"unknown"`     |
//! | `parent()`, `find_*`     | invalid node               |
//! | `position()`             | origin                     |
//! | `is_descendant_of()`     | `false`                    |
//!
//! Corrupted data can form cycles. The graph is treated as a lazy, finite
//! sequence of nodes: every walk stops at the first invalid reference or at a
//! fixed hop ceiling, whichever comes first.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use sightline_shared::constants::{
    MAX_ANCESTRY_HOPS, MAX_CHILDREN, MAX_REMOTE_STRING, MAX_TRAVERSAL_NODES, NULL_NAME,
    UNKNOWN_NAME,
};
use sightline_shared::{CFrame, Vec3};

use crate::layout::GraphLayout;
use crate::remote::{RemoteMemory, RemoteRef};

/// Typed reader over a remote address space.
///
/// Cheap to clone; clones share the memory handle and layout.
#[derive(Clone)]
pub struct GraphReader {
    memory: Arc<dyn RemoteMemory>,
    layout: Arc<GraphLayout>,
}

impl std::fmt::Debug for GraphReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphReader")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl GraphReader {
    /// Creates a reader over `memory` using `layout` to locate fields.
    #[must_use]
    pub fn new(memory: Arc<dyn RemoteMemory>, layout: Arc<GraphLayout>) -> Self {
        Self { memory, layout }
    }

    /// The field layout in use.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &GraphLayout {
        &self.layout
    }

    /// Reads a `T` at `address`, or `T::zeroed()` on any fault.
    #[must_use]
    pub fn read<T: Pod>(&self, address: u64) -> T {
        let mut value = T::zeroed();
        if self
            .memory
            .read_into(address, bytemuck::bytes_of_mut(&mut value))
        {
            value
        } else {
            T::zeroed()
        }
    }

    /// Reads a pointer-sized field as a reference.
    #[inline]
    #[must_use]
    pub fn read_ref(&self, address: u64) -> RemoteRef {
        RemoteRef::new(self.read::<u64>(address))
    }

    /// Reads the NUL-terminated string behind the pointer stored at
    /// `pointer_address`. `None` when the pointer does not resolve.
    #[must_use]
    pub fn read_string_at(&self, pointer_address: u64) -> Option<String> {
        let text = self.read_ref(pointer_address);
        if !text.is_valid() {
            return None;
        }
        let mut bytes = Vec::with_capacity(32);
        for i in 0..MAX_REMOTE_STRING as u64 {
            let byte = self.read::<u8>(text.field(i));
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Wraps a reference as a queryable node.
    #[inline]
    #[must_use]
    pub fn node(&self, reference: impl Into<RemoteRef>) -> ObjectNode<'_> {
        ObjectNode {
            graph: self,
            reference: reference.into(),
        }
    }
}

/// Raw fields of a part's physics primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartProbe {
    /// World coordinate frame.
    pub cframe: CFrame,
    /// Edge lengths.
    pub size: Vec3,
    /// Transparency in `[0, 1]`.
    pub transparency: f32,
}

/// A node of the remote graph.
///
/// Borrowing view: a reference plus the reader used to resolve it.
#[derive(Clone, Copy)]
pub struct ObjectNode<'g> {
    graph: &'g GraphReader,
    reference: RemoteRef,
}

impl PartialEq for ObjectNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for ObjectNode<'_> {}

impl std::fmt::Debug for ObjectNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectNode").field(&self.reference).finish()
    }
}

impl<'g> ObjectNode<'g> {
    /// The wrapped reference.
    #[inline]
    #[must_use]
    pub fn reference(&self) -> RemoteRef {
        self.reference
    }

    /// The wrapped address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> u64 {
        self.reference.address
    }

    /// True when the reference clears the reserved low range.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.reference.is_valid()
    }

    fn layout(&self) -> &'g GraphLayout {
        self.graph.layout()
    }

    fn invalid(&self) -> ObjectNode<'g> {
        self.graph.node(RemoteRef::INVALID)
    }

    fn follow(&self, offset: u64) -> ObjectNode<'g> {
        if !self.is_valid() {
            return self.invalid();
        }
        self.graph.node(self.graph.read_ref(self.reference.field(offset)))
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        if !self.is_valid() {
            return NULL_NAME.to_owned();
        }
        self.graph
            .read_string_at(self.reference.field(self.layout().name))
            .unwrap_or_else(|| UNKNOWN_NAME.to_owned())
    }

    /// Type tag (class name), resolved through the class descriptor.
    #[must_use]
    pub fn type_tag(&self) -> String {
        if !self.is_valid() {
            return NULL_NAME.to_owned();
        }
        let descriptor = self.follow(self.layout().class_descriptor);
        if !descriptor.is_valid() {
            return UNKNOWN_NAME.to_owned();
        }
        self.graph
            .read_string_at(descriptor.reference.field(self.layout().class_name))
            .unwrap_or_else(|| UNKNOWN_NAME.to_owned())
    }

    /// Immediate children, in slot order. Invalid slots are skipped.
    #[must_use]
    pub fn children(&self) -> Vec<ObjectNode<'g>> {
        if !self.is_valid() {
            return Vec::new();
        }
        let layout = self.layout();
        let header = self.follow(layout.children);
        if !header.is_valid() {
            return Vec::new();
        }
        let begin = self.graph.read::<u64>(header.address());
        let end = self.graph.read::<u64>(header.reference.field(layout.children_end));
        if !RemoteRef::new(begin).is_valid() || end < begin || layout.child_stride == 0 {
            return Vec::new();
        }

        let slots = usize::try_from((end - begin) / layout.child_stride)
            .unwrap_or(MAX_CHILDREN)
            .min(MAX_CHILDREN);
        let mut children = Vec::with_capacity(slots);
        let mut slot = begin;
        for _ in 0..slots {
            let child = self.graph.read_ref(slot);
            if child.is_valid() {
                children.push(self.graph.node(child));
            }
            slot = slot.wrapping_add(layout.child_stride);
        }
        children
    }

    /// Parent node, or an invalid node at the root.
    #[must_use]
    pub fn parent(&self) -> ObjectNode<'g> {
        self.follow(self.layout().parent)
    }

    /// This node followed by each ancestor, stopping at the first invalid
    /// reference or after [`MAX_ANCESTRY_HOPS`] hops.
    #[must_use]
    pub fn lineage(&self) -> Lineage<'g> {
        Lineage {
            next: Some(*self),
            hops: 0,
        }
    }

    /// First immediate child named `name`.
    #[must_use]
    pub fn find_first_child(&self, name: &str) -> ObjectNode<'g> {
        self.children()
            .into_iter()
            .find(|child| child.name() == name)
            .unwrap_or_else(|| self.invalid())
    }

    /// First immediate child whose type tag is `tag`.
    #[must_use]
    pub fn find_first_child_of_class(&self, tag: &str) -> ObjectNode<'g> {
        self.children()
            .into_iter()
            .find(|child| child.type_tag() == tag)
            .unwrap_or_else(|| self.invalid())
    }

    /// Every descendant whose type tag is `tag`, in unspecified order.
    ///
    /// Walks the whole subtree. Expensive: reserved for the geometry rebuild.
    #[must_use]
    pub fn find_descendants_of_class(&self, tag: &str) -> Vec<ObjectNode<'g>> {
        let mut found = Vec::new();
        let mut stack = self.children();
        let mut visited = 0usize;

        while let Some(current) = stack.pop() {
            visited += 1;
            if visited > MAX_TRAVERSAL_NODES {
                tracing::warn!(
                    root = %self.reference,
                    "descendant traversal hit the node ceiling, result truncated"
                );
                break;
            }
            if current.type_tag() == tag {
                found.push(current);
            }
            stack.extend(current.children());
        }
        found
    }

    /// True when `ancestor` is this node or appears on its parent chain.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: RemoteRef) -> bool {
        if !ancestor.is_valid() {
            return false;
        }
        self.lineage().any(|node| node.reference == ancestor)
    }

    /// Raw primitive fields of a part. `None` when the primitive pointer does
    /// not resolve.
    #[must_use]
    pub fn part_probe(&self) -> Option<PartProbe> {
        let layout = self.layout();
        let primitive = self.follow(layout.primitive);
        if !primitive.is_valid() {
            return None;
        }
        let base = primitive.reference;
        Some(PartProbe {
            cframe: self.graph.read(base.field(layout.part_cframe)),
            size: self.graph.read(base.field(layout.part_size)),
            transparency: self.graph.read(base.field(layout.part_transparency)),
        })
    }

    /// World coordinate frame of a part, identity-at-origin on failure.
    #[must_use]
    pub fn cframe(&self) -> CFrame {
        self.part_probe().map(|probe| probe.cframe).unwrap_or_default()
    }

    /// World position of a part, origin on failure.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.cframe().position
    }

    /// World position of a camera node, origin on failure.
    #[must_use]
    pub fn camera_position(&self) -> Vec3 {
        if !self.is_valid() {
            return Vec3::ZERO;
        }
        self.graph
            .read(self.reference.field(self.layout().camera_position))
    }

    /// Model root attached to an entity node.
    #[must_use]
    pub fn model(&self) -> ObjectNode<'g> {
        self.follow(self.layout().entity_model)
    }

    /// Team node of an entity node.
    #[must_use]
    pub fn team(&self) -> ObjectNode<'g> {
        self.follow(self.layout().entity_team)
    }

    /// The distinguished local entity node of an entity container.
    #[must_use]
    pub fn local_entity(&self) -> ObjectNode<'g> {
        self.follow(self.layout().local_entity)
    }

    /// Current health of a controller, `0` when invalid.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.read_scalar(self.layout().controller_health)
    }

    /// Maximum health of a controller, `0` when invalid.
    #[must_use]
    pub fn max_health(&self) -> f32 {
        self.read_scalar(self.layout().controller_max_health)
    }

    /// Raw rig discriminant of a controller, `0` when invalid.
    #[must_use]
    pub fn rig_kind(&self) -> i32 {
        self.read_scalar(self.layout().controller_rig)
    }

    fn read_scalar<T: Pod + Zeroable>(&self, offset: u64) -> T {
        if !self.is_valid() {
            return T::zeroed();
        }
        self.graph.read(self.reference.field(offset))
    }
}

/// Lazy walk up the parent chain. See [`ObjectNode::lineage`].
#[derive(Debug)]
pub struct Lineage<'g> {
    next: Option<ObjectNode<'g>>,
    hops: usize,
}

impl<'g> Iterator for Lineage<'g> {
    type Item = ObjectNode<'g>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !current.is_valid() || self.hops > MAX_ANCESTRY_HOPS {
            return None;
        }
        self.hops += 1;
        self.next = Some(current.parent());
        Some(current)
    }
}

//! # Scene Simulation
//!
//! A synthetic remote address space and a builder that lays out object
//! graphs in it exactly as [`GraphLayout`] describes. Used by the tests and
//! benchmarks, and handy for exercising a consumer without a live target.
//!
//! ## Features
//!
//! - Bump-allocated regions; reads outside any region fault
//! - Freed regions fault, like memory the target released
//! - Global fault switch to simulate the target disappearing
//! - Read counting for "no remote read happened" assertions
//!
//! ```text
//!   SceneBuilder ──writes──> SyntheticMemory <──reads── GraphReader
//!        │                         ▲
//!        └── StandardScene         └── CountingMemory (optional wrapper)
//!            root / world / container / camera
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;
use sightline_shared::{CFrame, Vec3};

use crate::entity::MODERN_RIG_KIND;
use crate::graph::GraphReader;
use crate::layout::{GraphLayout, SchemaNames};
use crate::remote::{RemoteMemory, RemoteRef};

// =============================================================================
// SYNTHETIC MEMORY
// =============================================================================

/// First address handed out by the allocator.
const HEAP_BASE: u64 = 0x1000_0000;

/// Allocation alignment. Consecutive regions are separated by one extra
/// alignment unit so an overrun faults instead of reading a neighbour.
const ALIGN: u64 = 16;

/// Size of every node allocation.
const NODE_SIZE: usize = 0x60;

/// Size of a part's physics primitive.
const PRIMITIVE_SIZE: usize = 0x40;

/// Heap of disjoint byte regions.
#[derive(Debug)]
pub struct SyntheticMemory {
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
    next: AtomicU64,
    faulting: AtomicBool,
}

impl Default for SyntheticMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMemory {
    /// Creates an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            next: AtomicU64::new(HEAP_BASE),
            faulting: AtomicBool::new(false),
        }
    }

    /// Allocates `size` zeroed bytes and returns the region's address.
    pub fn alloc(&self, size: usize) -> u64 {
        let span = (size.max(1) as u64).div_ceil(ALIGN) * ALIGN + ALIGN;
        let address = self.next.fetch_add(span, Ordering::Relaxed);
        self.regions.write().insert(address, vec![0; size.max(1)]);
        address
    }

    /// Releases the region starting at `address`. Later reads fault.
    pub fn free(&self, address: u64) {
        self.regions.write().remove(&address);
    }

    /// Copies `bytes` to `address`. `false` if the range is not mapped.
    pub fn write_bytes(&self, address: u64, bytes: &[u8]) -> bool {
        let mut regions = self.regions.write();
        let Some((&start, region)) = regions.range_mut(..=address).next_back() else {
            return false;
        };
        let Some(offset) = in_bounds(start, region.len(), address, bytes.len()) else {
            return false;
        };
        region[offset..offset + bytes.len()].copy_from_slice(bytes);
        true
    }

    /// Writes a plain-old-data value to `address`.
    pub fn write<T: Pod>(&self, address: u64, value: T) -> bool {
        self.write_bytes(address, bytemuck::bytes_of(&value))
    }

    /// Allocates a NUL-terminated copy of `text`.
    pub fn alloc_str(&self, text: &str) -> u64 {
        let address = self.alloc(text.len() + 1);
        self.write_bytes(address, text.as_bytes());
        address
    }

    /// While set, every read faults.
    pub fn set_faulting(&self, faulting: bool) {
        self.faulting.store(faulting, Ordering::Release);
    }

    /// Number of live regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }
}

fn in_bounds(start: u64, region_len: usize, address: u64, len: usize) -> Option<usize> {
    let offset = usize::try_from(address.checked_sub(start)?).ok()?;
    (offset.checked_add(len)? <= region_len).then_some(offset)
}

impl RemoteMemory for SyntheticMemory {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> bool {
        if self.faulting.load(Ordering::Acquire) {
            return false;
        }
        let regions = self.regions.read();
        let Some((&start, region)) = regions.range(..=address).next_back() else {
            return false;
        };
        match in_bounds(start, region.len(), address, buf.len()) {
            Some(offset) => {
                buf.copy_from_slice(&region[offset..offset + buf.len()]);
                true
            }
            None => false,
        }
    }
}

/// Counts every read that reaches the wrapped memory.
#[derive(Debug, Default)]
pub struct CountingMemory<M> {
    inner: M,
    reads: AtomicU64,
}

impl<M: RemoteMemory> CountingMemory<M> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
        }
    }

    /// Reads issued so far.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// The wrapped memory.
    #[must_use]
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: RemoteMemory> RemoteMemory for CountingMemory<M> {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> bool {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read_into(address, buf)
    }
}

// =============================================================================
// SCENE BUILDER
// =============================================================================

/// Lays out nodes, parts and entities in a [`SyntheticMemory`].
///
/// Node addresses are returned as raw `u64`s. Mutators rewrite remote memory
/// in place, so readers built from [`SceneBuilder::reader`] observe changes
/// immediately.
#[derive(Debug)]
pub struct SceneBuilder {
    memory: Arc<SyntheticMemory>,
    layout: Arc<GraphLayout>,
    schema: SchemaNames,
    classes: HashMap<String, u64>,
    children: HashMap<u64, Vec<u64>>,
    arrays: HashMap<u64, u64>,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBuilder {
    /// Builder over a fresh address space with the default layout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout(GraphLayout::default())
    }

    /// Builder using a custom field layout.
    #[must_use]
    pub fn with_layout(layout: GraphLayout) -> Self {
        Self {
            memory: Arc::new(SyntheticMemory::new()),
            layout: Arc::new(layout),
            schema: SchemaNames::default(),
            classes: HashMap::new(),
            children: HashMap::new(),
            arrays: HashMap::new(),
        }
    }

    /// Same builder, laying out structural nodes and limbs with `schema`'s
    /// names.
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaNames) -> Self {
        self.schema = schema;
        self
    }

    /// The backing memory.
    #[must_use]
    pub fn memory(&self) -> Arc<SyntheticMemory> {
        Arc::clone(&self.memory)
    }

    /// The field layout nodes are written with.
    #[must_use]
    pub fn layout(&self) -> Arc<GraphLayout> {
        Arc::clone(&self.layout)
    }

    /// A reader over the backing memory.
    #[must_use]
    pub fn reader(&self) -> GraphReader {
        let memory: Arc<dyn RemoteMemory> = self.memory();
        GraphReader::new(memory, self.layout())
    }

    /// Creates a node of type `class` named `name`, optionally appended to
    /// `parent`'s children.
    pub fn node(&mut self, class: &str, name: &str, parent: Option<u64>) -> u64 {
        let node = self.memory.alloc(NODE_SIZE);
        let name_ptr = self.memory.alloc_str(name);
        let descriptor = self.class_descriptor(class);
        let header = self.memory.alloc(0x20);

        self.memory.write(node + self.layout.name, name_ptr);
        self.memory.write(node + self.layout.class_descriptor, descriptor);
        self.memory.write(node + self.layout.children, header);
        self.children.insert(node, Vec::new());

        if let Some(parent) = parent {
            self.attach(parent, node);
        }
        node
    }

    /// Creates a part with a physics primitive.
    pub fn part(
        &mut self,
        class: &str,
        name: &str,
        parent: Option<u64>,
        cframe: CFrame,
        size: Vec3,
        transparency: f32,
    ) -> u64 {
        let node = self.node(class, name, parent);
        let primitive = self.memory.alloc(PRIMITIVE_SIZE);
        self.memory.write(primitive + self.layout.part_cframe, cframe);
        self.memory.write(primitive + self.layout.part_size, size);
        self.memory
            .write(primitive + self.layout.part_transparency, transparency);
        self.memory.write(node + self.layout.primitive, primitive);
        node
    }

    /// An opaque, unrotated block of class `Part`.
    pub fn block(&mut self, parent: u64, name: &str, center: Vec3, size: Vec3) -> u64 {
        self.part("Part", name, Some(parent), CFrame::from_position(center), size, 0.0)
    }

    fn class_descriptor(&mut self, class: &str) -> u64 {
        if let Some(&descriptor) = self.classes.get(class) {
            return descriptor;
        }
        let descriptor = self.memory.alloc(0x20);
        let class_name = self.memory.alloc_str(class);
        self.memory
            .write(descriptor + self.layout.class_name, class_name);
        self.classes.insert(class.to_owned(), descriptor);
        descriptor
    }

    /// Appends `child` to `parent` and points `child` back at it.
    pub fn attach(&mut self, parent: u64, child: u64) {
        self.children.entry(parent).or_default().push(child);
        self.memory.write(child + self.layout.parent, parent);
        self.write_children(parent);
    }

    /// Removes `child` from `parent`'s children and clears its parent.
    pub fn detach(&mut self, parent: u64, child: u64) {
        if let Some(list) = self.children.get_mut(&parent) {
            list.retain(|&existing| existing != child);
        }
        self.memory.write(child + self.layout.parent, 0u64);
        self.write_children(parent);
    }

    fn write_children(&mut self, parent: u64) {
        let list = self.children.get(&parent).cloned().unwrap_or_default();
        let stride = self.layout.child_stride;
        let len = list.len() as u64;

        let array = self
            .memory
            .alloc(usize::try_from(len.max(1) * stride).unwrap_or(usize::MAX));
        for (slot, child) in (0u64..).zip(&list) {
            self.memory.write(array + slot * stride, *child);
        }

        let header = self
            .reader()
            .read_ref(parent + self.layout.children)
            .address;
        self.memory.write(header, array);
        self.memory
            .write(header + self.layout.children_end, array + len * stride);

        if let Some(old) = self.arrays.insert(parent, array) {
            self.memory.free(old);
        }
    }

    /// Renames a node.
    pub fn set_name(&mut self, node: u64, name: &str) {
        let name_ptr = self.memory.alloc_str(name);
        self.memory.write(node + self.layout.name, name_ptr);
    }

    /// Nulls a node's name pointer.
    pub fn clear_name(&mut self, node: u64) {
        self.memory.write(node + self.layout.name, 0u64);
    }

    /// Overwrites a node's parent pointer without touching any child list.
    pub fn set_parent_pointer(&mut self, node: u64, parent: u64) {
        self.memory.write(node + self.layout.parent, parent);
    }

    /// Moves a part.
    pub fn set_part_cframe(&mut self, part: u64, cframe: CFrame) {
        let primitive = self.reader().read_ref(part + self.layout.primitive);
        if primitive.is_valid() {
            self.memory
                .write(primitive.field(self.layout.part_cframe), cframe);
        }
    }

    /// Changes a part's transparency.
    pub fn set_part_transparency(&mut self, part: u64, transparency: f32) {
        let primitive = self.reader().read_ref(part + self.layout.primitive);
        if primitive.is_valid() {
            self.memory
                .write(primitive.field(self.layout.part_transparency), transparency);
        }
    }

    /// Points an entity node at its model root.
    pub fn set_model(&mut self, entity: u64, model: u64) {
        self.memory.write(entity + self.layout.entity_model, model);
    }

    /// Detaches an entity node from its model, as on death or respawn.
    pub fn clear_model(&mut self, entity: u64) {
        self.set_model(entity, 0);
    }

    /// Assigns an entity node to a team node.
    pub fn set_team(&mut self, entity: u64, team: u64) {
        self.memory.write(entity + self.layout.entity_team, team);
    }

    /// Marks `entity` as the container's local entity.
    pub fn set_local_entity(&mut self, container: u64, entity: u64) {
        self.memory
            .write(container + self.layout.local_entity, entity);
    }

    /// Places a camera node.
    pub fn set_camera_position(&mut self, camera: u64, position: Vec3) {
        self.memory
            .write(camera + self.layout.camera_position, position);
    }

    /// Sets a controller's current health.
    pub fn set_health(&mut self, controller: u64, health: f32) {
        self.memory
            .write(controller + self.layout.controller_health, health);
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Builds a detached model root for `spec`.
    pub fn spawn_model(&mut self, spec: &EntitySpec) -> EntityHandles {
        self.spawn_model_in(spec, None)
    }

    /// Builds a model root for `spec`, optionally parented.
    pub fn spawn_model_in(&mut self, spec: &EntitySpec, parent: Option<u64>) -> EntityHandles {
        let model = self.node("Model", &spec.name, parent);
        let at = spec.anchor_position;

        let controller = if spec.with_controller {
            let controller = self.node(&self.schema.controller.clone(), "Humanoid", Some(model));
            self.memory
                .write(controller + self.layout.controller_health, spec.health);
            self.memory
                .write(controller + self.layout.controller_max_health, spec.max_health);
            self.memory
                .write(controller + self.layout.controller_rig, spec.rig_kind);
            controller
        } else {
            0
        };

        let anchor = self.limb(model, &spec.anchor_name, at, Vec3::new(2.0, 2.0, 1.0));
        let limbs: Vec<(String, Vec3)> = if spec.rig_kind == MODERN_RIG_KIND {
            let names = self.schema.modern_parts.names();
            names.iter().map(|name| (*name).to_owned()).zip(MODERN_OFFSETS).collect()
        } else {
            let names = self.schema.classic_parts.names();
            std::iter::once((self.schema.classic_anchor.clone(), Vec3::ZERO))
                .chain(names.iter().map(|name| (*name).to_owned()).zip(CLASSIC_OFFSETS))
                .collect()
        };
        for (name, offset) in &limbs {
            if *name != spec.anchor_name {
                self.limb(model, name, at + *offset, Vec3::new(1.0, 1.0, 1.0));
            }
        }

        let head = if spec.with_head {
            let head_name = self.schema.head.clone();
            self.limb(model, &head_name, at + Vec3::new(0.0, 1.5, 0.0), Vec3::new(1.0, 1.0, 1.0))
        } else {
            0
        };

        EntityHandles {
            entity: 0,
            model,
            controller,
            head,
            anchor,
        }
    }

    fn limb(&mut self, model: u64, name: &str, center: Vec3, size: Vec3) -> u64 {
        self.part("Part", name, Some(model), CFrame::from_position(center), size, 0.0)
    }

    /// Adds an entity node to the scene's container and its model to the
    /// world root.
    pub fn spawn_entity(&mut self, scene: &StandardScene, spec: &EntitySpec) -> EntityHandles {
        let mut handles = self.spawn_model_in(spec, Some(scene.world));
        let kind = self.schema.entity_kind.clone();
        let entity = self.node(&kind, &spec.name, Some(scene.container));
        self.set_model(entity, handles.model);
        handles.entity = entity;
        handles
    }
}

/// Classic legacy limbs relative to the anchor, in [`ClassicPartNames`] order.
///
/// [`ClassicPartNames`]: crate::layout::ClassicPartNames
const CLASSIC_OFFSETS: [Vec3; 4] = [
    Vec3::new(-1.5, 0.0, 0.0),
    Vec3::new(1.5, 0.0, 0.0),
    Vec3::new(-0.5, -2.0, 0.0),
    Vec3::new(0.5, -2.0, 0.0),
];

/// Modern limbs relative to the anchor, in [`ModernPartNames`] order.
///
/// [`ModernPartNames`]: crate::layout::ModernPartNames
const MODERN_OFFSETS: [Vec3; 14] = [
    Vec3::new(0.0, 0.2, 0.0),
    Vec3::new(0.0, -0.8, 0.0),
    Vec3::new(-1.5, 0.3, 0.0),
    Vec3::new(1.5, 0.3, 0.0),
    Vec3::new(-1.5, -0.5, 0.0),
    Vec3::new(1.5, -0.5, 0.0),
    Vec3::new(-1.5, -1.1, 0.0),
    Vec3::new(1.5, -1.1, 0.0),
    Vec3::new(-0.5, -1.5, 0.0),
    Vec3::new(0.5, -1.5, 0.0),
    Vec3::new(-0.5, -2.2, 0.0),
    Vec3::new(0.5, -2.2, 0.0),
    Vec3::new(-0.5, -2.8, 0.0),
    Vec3::new(0.5, -2.8, 0.0),
];

/// Addresses of a spawned entity's nodes. `0` where a node was not built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityHandles {
    /// Entity node in the container (`0` for a bare model).
    pub entity: u64,
    /// Model root.
    pub model: u64,
    /// Controller.
    pub controller: u64,
    /// Head part.
    pub head: u64,
    /// Anchor part.
    pub anchor: u64,
}

/// Description of an entity to spawn.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySpec {
    /// Display name of the entity node and model.
    pub name: String,
    /// World position of the anchor part.
    pub anchor_position: Vec3,
    /// Name given to the anchor part.
    pub anchor_name: String,
    /// Raw rig discriminant written to the controller.
    pub rig_kind: i32,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Whether a head part is built.
    pub with_head: bool,
    /// Whether a controller is built.
    pub with_controller: bool,
}

impl EntitySpec {
    /// Fifteen-part rig anchored at `anchor_position`.
    #[must_use]
    pub fn modern(anchor_position: Vec3) -> Self {
        Self {
            name: "Entity".to_owned(),
            anchor_position,
            anchor_name: "HumanoidRootPart".to_owned(),
            rig_kind: MODERN_RIG_KIND,
            health: 100.0,
            max_health: 100.0,
            with_head: true,
            with_controller: true,
        }
    }

    /// Six-part rig anchored at `anchor_position`.
    #[must_use]
    pub fn classic(anchor_position: Vec3) -> Self {
        Self {
            anchor_name: "Torso".to_owned(),
            rig_kind: 0,
            ..Self::modern(anchor_position)
        }
    }

    /// Same spec, renamed.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }
}

/// The fixed skeleton most scenes share.
///
/// ```text
/// Game (DataModel)
///  ├─ Workspace (Workspace)
///  │   └─ Camera (Camera)
///  └─ Players (Players)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardScene {
    /// Scene root.
    pub root: u64,
    /// World root; models and geometry live here.
    pub world: u64,
    /// Entity container.
    pub container: u64,
    /// Camera, under the world root.
    pub camera: u64,
}

impl StandardScene {
    /// Builds the skeleton into `builder`.
    pub fn build(builder: &mut SceneBuilder) -> Self {
        let schema = builder.schema.clone();
        let root = builder.node("DataModel", "Game", None);
        let world = builder.node(&schema.world_root, "Workspace", Some(root));
        let container = builder.node(&schema.entity_container, "Players", Some(root));
        let camera = builder.node(&schema.camera, "Camera", Some(world));
        Self {
            root,
            world,
            container,
            camera,
        }
    }

    /// Root reference, for use as a fixed root source.
    #[must_use]
    pub fn root_ref(&self) -> RemoteRef {
        RemoteRef::new(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_outside_regions_fault() {
        let memory = SyntheticMemory::new();
        let base = memory.alloc(8);
        assert!(memory.write(base, 0xdead_beef_u64));

        let mut buf = [0u8; 8];
        assert!(memory.read_into(base, &mut buf));
        assert_eq!(u64::from_ne_bytes(buf), 0xdead_beef);
        assert!(!memory.read_into(base + 4, &mut buf));
        assert!(!memory.read_into(base - 8, &mut buf));
        assert!(!memory.write(base + 8, 1u8));
    }

    #[test]
    fn test_freed_and_faulting_memory() {
        let memory = SyntheticMemory::new();
        let base = memory.alloc(4);
        let mut buf = [0u8; 4];
        memory.set_faulting(true);
        assert!(!memory.read_into(base, &mut buf));
        memory.set_faulting(false);
        assert!(memory.read_into(base, &mut buf));
        memory.free(base);
        assert!(!memory.read_into(base, &mut buf));
        assert_eq!(memory.region_count(), 0);
    }

    #[test]
    fn test_detach_rewrites_child_list() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let a = scene.node("Folder", "A", Some(layout.world));
        scene.node("Folder", "B", Some(layout.world));
        scene.detach(layout.world, a);

        let graph = scene.reader();
        let names: Vec<String> = graph
            .node(layout.world)
            .children()
            .iter()
            .map(|child| child.name())
            .collect();
        assert_eq!(names, vec!["Camera", "B"]);
        assert!(!graph.node(a).parent().is_valid());
    }

    #[test]
    fn test_spawn_entity_links_container_and_world() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let handles = scene.spawn_entity(&layout, &EntitySpec::classic(Vec3::ZERO).named("bob"));
        let graph = scene.reader();

        let entity = graph.node(handles.entity);
        assert_eq!(entity.type_tag(), "Player");
        assert_eq!(entity.model().address(), handles.model);
        assert!(graph
            .node(handles.head)
            .is_descendant_of(RemoteRef::new(layout.world)));
        assert_eq!(graph.node(handles.model).children().len(), 7);
    }
}

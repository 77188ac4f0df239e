//! # Entities and the Entity Classifier
//!
//! An [`Entity`] is the resolved view of one tracked model: its identity,
//! display name, health, and the references of its named sub-parts.
//!
//! Two incompatible skeleton naming schemes exist in the wild. The
//! classifier decides which one a model follows once, and records the answer
//! as a tagged variant ([`Rig`]) so consumers never probe part names
//! themselves.
//!
//! ```text
//!            Classic                          Modern
//!   ┌──────────────────────┐   ┌──────────────────────────────────────┐
//!   │ anchor  = "Torso"    │   │ anchor = first of the configured     │
//!   │ "Left Arm"  -> hand  │   │          anchor names that resolves  │
//!   │ "Right Arm" -> hand  │   │ 14 limb parts by exact name          │
//!   │ "Left Leg"  -> foot  │   │ (upper/lower torso, arms, hands,     │
//!   │ "Right Leg" -> foot  │   │  legs, feet)                         │
//!   └──────────────────────┘   └──────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sightline_shared::constants::{FULL_HEALTH, SAMPLE_POINTS};
use sightline_shared::Vec3;

use crate::graph::{GraphReader, ObjectNode};
use crate::layout::{ClassicPartNames, ModernPartNames, SchemaNames};
use crate::remote::RemoteRef;

/// Rig discriminant stored on the controller for the modern scheme.
pub const MODERN_RIG_KIND: i32 = 1;

/// Which naming scheme a skeleton follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RigTag {
    /// Legacy six-part skeleton.
    #[default]
    Classic,
    /// Fifteen-part skeleton.
    Modern,
}

impl RigTag {
    /// Maps a raw controller value. Anything unrecognised is Classic.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        if raw == MODERN_RIG_KIND {
            Self::Modern
        } else {
            Self::Classic
        }
    }
}

/// Parts of a classic skeleton.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassicRig {
    /// "Torso" - also the anchor.
    pub torso: RemoteRef,
    /// "Left Arm"
    pub left_arm: RemoteRef,
    /// "Right Arm"
    pub right_arm: RemoteRef,
    /// "Left Leg"
    pub left_leg: RemoteRef,
    /// "Right Leg"
    pub right_leg: RemoteRef,
}

/// Parts of a modern skeleton.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ModernRig {
    pub upper_torso: RemoteRef,
    pub lower_torso: RemoteRef,
    pub left_upper_arm: RemoteRef,
    pub right_upper_arm: RemoteRef,
    pub left_lower_arm: RemoteRef,
    pub right_lower_arm: RemoteRef,
    pub left_hand: RemoteRef,
    pub right_hand: RemoteRef,
    pub left_upper_leg: RemoteRef,
    pub right_upper_leg: RemoteRef,
    pub left_lower_leg: RemoteRef,
    pub right_lower_leg: RemoteRef,
    pub left_foot: RemoteRef,
    pub right_foot: RemoteRef,
}

/// Skeleton parts, by scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rig {
    /// Legacy scheme.
    Classic(ClassicRig),
    /// Modern scheme.
    Modern(ModernRig),
}

impl Rig {
    /// The scheme tag.
    #[must_use]
    pub const fn tag(&self) -> RigTag {
        match self {
            Self::Classic(_) => RigTag::Classic,
            Self::Modern(_) => RigTag::Modern,
        }
    }
}

/// A tracked, classified entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Display name of the owning entity node.
    pub name: String,
    /// Team name, empty when unassigned.
    pub team: String,
    /// Model root.
    pub model: RemoteRef,
    /// Controller sub-object.
    pub controller: RemoteRef,
    /// Head part.
    pub head: RemoteRef,
    /// Anchor part.
    pub anchor: RemoteRef,
    /// Scheme-specific parts.
    pub rig: Rig,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
}

impl Entity {
    /// Identity key: the model-root address.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> u64 {
        self.model.address
    }

    /// Model root, anchor and head are all valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.model.is_valid() && self.anchor.is_valid() && self.head.is_valid()
    }

    /// Which scheme the skeleton follows.
    #[must_use]
    pub fn rig_tag(&self) -> RigTag {
        self.rig.tag()
    }

    /// Health as a fraction of maximum, clamped to `[0, 1]`.
    #[must_use]
    pub fn health_fraction(&self) -> f32 {
        if self.max_health > 0.0 {
            (self.health / self.max_health).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Classic "Torso". Invalid on a modern rig.
    #[must_use]
    pub fn torso(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.torso,
            Rig::Modern(_) => RemoteRef::INVALID,
        }
    }

    /// Upper torso; the classic torso stands in.
    #[must_use]
    pub fn upper_torso(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.torso,
            Rig::Modern(parts) => parts.upper_torso,
        }
    }

    /// Lower torso. Invalid on a classic rig.
    #[must_use]
    pub fn lower_torso(&self) -> RemoteRef {
        self.modern_part(|parts| parts.lower_torso)
    }

    /// Left upper arm. Invalid on a classic rig.
    #[must_use]
    pub fn left_upper_arm(&self) -> RemoteRef {
        self.modern_part(|parts| parts.left_upper_arm)
    }

    /// Right upper arm. Invalid on a classic rig.
    #[must_use]
    pub fn right_upper_arm(&self) -> RemoteRef {
        self.modern_part(|parts| parts.right_upper_arm)
    }

    /// Left lower arm. Invalid on a classic rig.
    #[must_use]
    pub fn left_lower_arm(&self) -> RemoteRef {
        self.modern_part(|parts| parts.left_lower_arm)
    }

    /// Right lower arm. Invalid on a classic rig.
    #[must_use]
    pub fn right_lower_arm(&self) -> RemoteRef {
        self.modern_part(|parts| parts.right_lower_arm)
    }

    /// Left hand; the classic left arm stands in.
    #[must_use]
    pub fn left_hand(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.left_arm,
            Rig::Modern(parts) => parts.left_hand,
        }
    }

    /// Right hand; the classic right arm stands in.
    #[must_use]
    pub fn right_hand(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.right_arm,
            Rig::Modern(parts) => parts.right_hand,
        }
    }

    /// Left upper leg. Invalid on a classic rig.
    #[must_use]
    pub fn left_upper_leg(&self) -> RemoteRef {
        self.modern_part(|parts| parts.left_upper_leg)
    }

    /// Right upper leg. Invalid on a classic rig.
    #[must_use]
    pub fn right_upper_leg(&self) -> RemoteRef {
        self.modern_part(|parts| parts.right_upper_leg)
    }

    /// Left lower leg. Invalid on a classic rig.
    #[must_use]
    pub fn left_lower_leg(&self) -> RemoteRef {
        self.modern_part(|parts| parts.left_lower_leg)
    }

    /// Right lower leg. Invalid on a classic rig.
    #[must_use]
    pub fn right_lower_leg(&self) -> RemoteRef {
        self.modern_part(|parts| parts.right_lower_leg)
    }

    /// Left foot; the classic left leg stands in.
    #[must_use]
    pub fn left_foot(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.left_leg,
            Rig::Modern(parts) => parts.left_foot,
        }
    }

    /// Right foot; the classic right leg stands in.
    #[must_use]
    pub fn right_foot(&self) -> RemoteRef {
        match &self.rig {
            Rig::Classic(parts) => parts.right_leg,
            Rig::Modern(parts) => parts.right_foot,
        }
    }

    fn modern_part(&self, pick: impl FnOnce(&ModernRig) -> RemoteRef) -> RemoteRef {
        match &self.rig {
            Rig::Classic(_) => RemoteRef::INVALID,
            Rig::Modern(parts) => pick(parts),
        }
    }

    /// The five points a visibility query samples: head, anchor, pelvis and
    /// both feet. Pelvis and feet are fixed offsets below the anchor.
    #[must_use]
    pub fn sample_points(&self, graph: &GraphReader) -> [Vec3; SAMPLE_POINTS] {
        let head = graph.node(self.head).position();
        let anchor = graph.node(self.anchor).position();
        [
            head,
            anchor,
            anchor + Vec3::new(0.0, -1.0, 0.0),
            anchor + Vec3::new(-0.5, -2.0, 0.0),
            anchor + Vec3::new(0.5, -2.0, 0.0),
        ]
    }
}

/// Resolves model roots into [`Entity`] values.
#[derive(Clone, Debug)]
pub struct EntityClassifier {
    schema: Arc<SchemaNames>,
}

impl EntityClassifier {
    /// Creates a classifier using `schema` for part and class names.
    #[must_use]
    pub fn new(schema: Arc<SchemaNames>) -> Self {
        Self { schema }
    }

    /// Classifies the model root `model`.
    ///
    /// Returns `None` unless model root, anchor and head all resolve. Name
    /// and team are left empty; see [`EntityClassifier::observe`].
    #[must_use]
    pub fn classify(&self, graph: &GraphReader, model: RemoteRef) -> Option<Entity> {
        let root = graph.node(model);
        if !root.is_valid() {
            return None;
        }

        let controller = root.find_first_child_of_class(&self.schema.controller);
        let head = root.find_first_child(&self.schema.head);
        let tag = if controller.is_valid() {
            RigTag::from_raw(controller.rig_kind())
        } else {
            RigTag::Classic
        };

        let (anchor, rig) = match tag {
            RigTag::Modern => (
                self.modern_anchor(&root),
                Rig::Modern(modern_parts(&root, &self.schema.modern_parts)),
            ),
            RigTag::Classic => {
                let parts = classic_parts(
                    &root,
                    &self.schema.classic_anchor,
                    &self.schema.classic_parts,
                );
                (parts.torso, Rig::Classic(parts))
            }
        };

        let (health, max_health) = if controller.is_valid() {
            (controller.health(), controller.max_health())
        } else {
            (FULL_HEALTH, FULL_HEALTH)
        };

        let entity = Entity {
            name: String::new(),
            team: String::new(),
            model,
            controller: controller.reference(),
            head: head.reference(),
            anchor,
            rig,
            health,
            max_health,
        };
        entity.is_valid().then_some(entity)
    }

    /// Classifies the model attached to entity node `entity_node`, filling
    /// in its display name and team.
    #[must_use]
    pub fn observe(&self, entity_node: ObjectNode<'_>, graph: &GraphReader) -> Option<Entity> {
        let model = entity_node.model();
        if !model.is_valid() {
            return None;
        }
        let mut entity = self.classify(graph, model.reference())?;
        entity.name = entity_node.name();
        entity.team = team_name(entity_node);
        Some(entity)
    }

    fn modern_anchor(&self, root: &ObjectNode<'_>) -> RemoteRef {
        self.schema
            .modern_anchors
            .iter()
            .map(|name| root.find_first_child(name))
            .find(ObjectNode::is_valid)
            .map_or(RemoteRef::INVALID, |node| node.reference())
    }
}

fn team_name(entity_node: ObjectNode<'_>) -> String {
    let team = entity_node.team();
    if team.is_valid() {
        team.name()
    } else {
        String::new()
    }
}

fn classic_parts(root: &ObjectNode<'_>, anchor_name: &str, names: &ClassicPartNames) -> ClassicRig {
    let part = |name: &str| root.find_first_child(name).reference();
    ClassicRig {
        torso: part(anchor_name),
        left_arm: part(&names.left_arm),
        right_arm: part(&names.right_arm),
        left_leg: part(&names.left_leg),
        right_leg: part(&names.right_leg),
    }
}

fn modern_parts(root: &ObjectNode<'_>, names: &ModernPartNames) -> ModernRig {
    let part = |name: &str| root.find_first_child(name).reference();
    ModernRig {
        upper_torso: part(&names.upper_torso),
        lower_torso: part(&names.lower_torso),
        left_upper_arm: part(&names.left_upper_arm),
        right_upper_arm: part(&names.right_upper_arm),
        left_lower_arm: part(&names.left_lower_arm),
        right_lower_arm: part(&names.right_lower_arm),
        left_hand: part(&names.left_hand),
        right_hand: part(&names.right_hand),
        left_upper_leg: part(&names.left_upper_leg),
        right_upper_leg: part(&names.right_upper_leg),
        left_lower_leg: part(&names.left_lower_leg),
        right_lower_leg: part(&names.right_lower_leg),
        left_foot: part(&names.left_foot),
        right_foot: part(&names.right_foot),
    }
}

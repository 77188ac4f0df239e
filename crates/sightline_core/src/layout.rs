//! # Graph Layout
//!
//! Where fields live inside remote objects, and which names and type tags
//! identify the structural nodes the core cares about.
//!
//! Offsets are target-specific and supplied by configuration. The defaults
//! describe the layout produced by [`crate::sim::SceneBuilder`]:
//!
//! ```text
//! node                        primitive
//! ┌──────────────┬──────┐     ┌────────────────┬──────┐
//! │ name ptr     │ 0x08 │     │ cframe (48 B)  │ 0x00 │
//! │ class desc   │ 0x10 │     │ size (vec3)    │ 0x30 │
//! │ children hdr │ 0x18 │     │ transparency   │ 0x3C │
//! │ parent       │ 0x20 │     └────────────────┴──────┘
//! │ primitive    │ 0x28 │
//! │ kind fields  │ 0x30+│
//! └──────────────┴──────┘
//! ```

use serde::{Deserialize, Serialize};

/// Field offsets inside remote objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphLayout {
    /// Node -> pointer to its NUL-terminated name.
    pub name: u64,
    /// Node -> pointer to its class descriptor.
    pub class_descriptor: u64,
    /// Class descriptor -> pointer to the NUL-terminated type tag.
    pub class_name: u64,
    /// Node -> pointer to its child list header.
    pub children: u64,
    /// Child list header -> end pointer. The begin pointer sits at offset 0.
    pub children_end: u64,
    /// Distance between consecutive child slots.
    pub child_stride: u64,
    /// Node -> parent node.
    pub parent: u64,
    /// Part node -> pointer to its physics primitive.
    pub primitive: u64,
    /// Primitive -> coordinate frame (rotation, then position).
    pub part_cframe: u64,
    /// Primitive -> edge lengths.
    pub part_size: u64,
    /// Primitive -> transparency.
    pub part_transparency: u64,
    /// Camera node -> world position.
    pub camera_position: u64,
    /// Entity node -> attached model root.
    pub entity_model: u64,
    /// Entity node -> team node.
    pub entity_team: u64,
    /// Entity container -> the local entity node.
    pub local_entity: u64,
    /// Controller -> current health.
    pub controller_health: u64,
    /// Controller -> maximum health.
    pub controller_max_health: u64,
    /// Controller -> rig discriminant.
    pub controller_rig: u64,
}

impl Default for GraphLayout {
    fn default() -> Self {
        Self {
            name: 0x08,
            class_descriptor: 0x10,
            class_name: 0x08,
            children: 0x18,
            children_end: 0x08,
            child_stride: 0x10,
            parent: 0x20,
            primitive: 0x28,
            part_cframe: 0x00,
            part_size: 0x30,
            part_transparency: 0x3C,
            camera_position: 0x40,
            entity_model: 0x30,
            entity_team: 0x38,
            local_entity: 0x30,
            controller_health: 0x30,
            controller_max_health: 0x34,
            controller_rig: 0x38,
        }
    }
}

/// Names and type tags of the structural nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaNames {
    /// Type tag of the container holding entity nodes.
    pub entity_container: String,
    /// Type tag of the world root holding geometry.
    pub world_root: String,
    /// Type tag of an entity node.
    pub entity_kind: String,
    /// Type tag of an entity's controller.
    pub controller: String,
    /// Name of the camera node under the world root.
    pub camera: String,
    /// Name of the head part.
    pub head: String,
    /// Anchor part name for the classic rig.
    pub classic_anchor: String,
    /// Anchor part names for the modern rig, in priority order.
    pub modern_anchors: Vec<String>,
    /// Legacy limb names of the classic rig.
    pub classic_parts: ClassicPartNames,
    /// Limb names of the modern rig.
    pub modern_parts: ModernPartNames,
    /// Type tags of solid geometry collected by the occlusion model.
    pub geometry_classes: Vec<String>,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            entity_container: "Players".to_owned(),
            world_root: "Workspace".to_owned(),
            entity_kind: "Player".to_owned(),
            controller: "Humanoid".to_owned(),
            camera: "Camera".to_owned(),
            head: "Head".to_owned(),
            classic_anchor: "Torso".to_owned(),
            modern_anchors: vec![
                "HumanoidRootPart".to_owned(),
                "Hitbox".to_owned(),
                "UpperTorso".to_owned(),
            ],
            classic_parts: ClassicPartNames::default(),
            modern_parts: ModernPartNames::default(),
            geometry_classes: vec![
                "Part".to_owned(),
                "MeshPart".to_owned(),
                "UnionOperation".to_owned(),
            ],
        }
    }
}

/// Legacy limb names of the classic rig. The arms stand in for hands and the
/// legs for feet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicPartNames {
    /// Left arm.
    pub left_arm: String,
    /// Right arm.
    pub right_arm: String,
    /// Left leg.
    pub left_leg: String,
    /// Right leg.
    pub right_leg: String,
}

impl ClassicPartNames {
    /// Names in rig order: left arm, right arm, left leg, right leg.
    #[must_use]
    pub fn names(&self) -> [&str; 4] {
        [&self.left_arm, &self.right_arm, &self.left_leg, &self.right_leg]
    }
}

impl Default for ClassicPartNames {
    fn default() -> Self {
        Self {
            left_arm: "Left Arm".to_owned(),
            right_arm: "Right Arm".to_owned(),
            left_leg: "Left Leg".to_owned(),
            right_leg: "Right Leg".to_owned(),
        }
    }
}

/// Limb names of the modern rig.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ModernPartNames {
    pub upper_torso: String,
    pub lower_torso: String,
    pub left_upper_arm: String,
    pub right_upper_arm: String,
    pub left_lower_arm: String,
    pub right_lower_arm: String,
    pub left_hand: String,
    pub right_hand: String,
    pub left_upper_leg: String,
    pub right_upper_leg: String,
    pub left_lower_leg: String,
    pub right_lower_leg: String,
    pub left_foot: String,
    pub right_foot: String,
}

impl ModernPartNames {
    /// Names in rig order, torso first, then arms, then legs.
    #[must_use]
    pub fn names(&self) -> [&str; 14] {
        [
            &self.upper_torso,
            &self.lower_torso,
            &self.left_upper_arm,
            &self.right_upper_arm,
            &self.left_lower_arm,
            &self.right_lower_arm,
            &self.left_hand,
            &self.right_hand,
            &self.left_upper_leg,
            &self.right_upper_leg,
            &self.left_lower_leg,
            &self.right_lower_leg,
            &self.left_foot,
            &self.right_foot,
        ]
    }
}

impl Default for ModernPartNames {
    fn default() -> Self {
        Self {
            upper_torso: "UpperTorso".to_owned(),
            lower_torso: "LowerTorso".to_owned(),
            left_upper_arm: "LeftUpperArm".to_owned(),
            right_upper_arm: "RightUpperArm".to_owned(),
            left_lower_arm: "LeftLowerArm".to_owned(),
            right_lower_arm: "RightLowerArm".to_owned(),
            left_hand: "LeftHand".to_owned(),
            right_hand: "RightHand".to_owned(),
            left_upper_leg: "LeftUpperLeg".to_owned(),
            right_upper_leg: "RightUpperLeg".to_owned(),
            left_lower_leg: "LeftLowerLeg".to_owned(),
            right_lower_leg: "RightLowerLeg".to_owned(),
            left_foot: "LeftFoot".to_owned(),
            right_foot: "RightFoot".to_owned(),
        }
    }
}

//! Types for working with skeleton data: bone hierarchies, reference poses,
//! and float slot names.

use hkx_lib::Transform;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The data associated with a skeleton.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkelData {
    pub bones: Vec<BoneData>,
    /// Names of the animated float slots, in slot order.
    pub float_slots: Vec<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    /// The name of the bone.
    pub name: String,
    /// The index of the parent bone in the bones list or [None] if this is a root bone.
    pub parent_index: Option<usize>,
    /// The bind time default transform of the bone relative to its parent.
    pub reference_pose: Transform,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent_index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent_index,
            reference_pose: Transform::IDENTITY,
        }
    }
}

impl SkelData {
    /// Returns the reference pose for the bone at `bone_index`.
    pub fn reference_pose(&self, bone_index: usize) -> Option<&Transform> {
        self.bones.get(bone_index).map(|b| &b.reference_pose)
    }
}

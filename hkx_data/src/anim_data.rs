//! Types for working with animation data.
//!
//! Deserialized animation objects are converted into per bone transform
//! tracks with [AnimData::fetch_all_tracks]. Predictive compressed animations
//! decode their sample blocks through the [blocks] codec and rebuild full
//! transforms from static values, scaled dynamic samples, and the skeleton's
//! reference pose.

use std::collections::BTreeMap;

use thiserror::Error;

use hkx_lib::{RecordSink, RecordSource, Transform, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::skel_data::SkelData;

mod bitutils;
pub mod blocks;
mod tracks;

pub use blocks::{BlockError, SampleBlock, StitchMode};

/// The animation type tags used by serialized animation objects.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationType {
    Unknown = 0,
    Interleaved = 1,
    Mirrored = 2,
    SplineCompressed = 3,
    QuantizedCompressed = 4,
    PredictiveCompressed = 5,
    ReferencePose = 6,
}

/// Errors while converting animation objects into transform tracks.
#[derive(Debug, Error)]
pub enum AnimError {
    /// Fetching tracks for the given animation type is not supported.
    #[error("animations of type {0:?} are not supported")]
    NotSupported(AnimationType),

    #[error("skeleton bone count {skeleton} does not match animation bone count {animation}")]
    SkeletonBoneCountMismatch { skeleton: usize, animation: usize },

    #[error(
        "skeleton float slot count {skeleton} does not match animation float slot count {animation}"
    )]
    SkeletonFloatSlotCountMismatch { skeleton: usize, animation: usize },

    /// The animation animates bones but no skeleton is attached.
    #[error("no skeleton is attached to the animation")]
    MissingSkeleton,

    #[error("transform count {transform_count} is not evenly divisible by track count {track_count}")]
    InvalidTransformCount {
        transform_count: usize,
        track_count: usize,
    },

    #[error("the {array} array range {start}..{end} is out of bounds for length {len}")]
    InvalidArrayRange {
        array: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("the dynamic scale and offset tables are too short for channel {channel}")]
    MissingScaleOffset { channel: usize },

    #[error("channel slot {slot} does not name a transform component")]
    InvalidChannelSlot { slot: usize },

    /// An error occurred while decoding compressed sample blocks.
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// A deserialized animation of any supported kind.
///
/// The engine ships several animation encodings behind one polymorphic
/// object. The supported ones are modeled as variants; the rest keep their
/// type tag and fail [fetch_all_tracks](AnimData::fetch_all_tracks).
#[derive(Debug, Clone, PartialEq)]
pub enum AnimData {
    PredictiveCompressed(PredictiveAnimation),
    InterleavedUncompressed(InterleavedAnimation),
    Unsupported(AnimationType),
}

impl AnimData {
    pub fn animation_type(&self) -> AnimationType {
        match self {
            AnimData::PredictiveCompressed(_) => AnimationType::PredictiveCompressed,
            AnimData::InterleavedUncompressed(_) => AnimationType::Interleaved,
            AnimData::Unsupported(kind) => *kind,
        }
    }

    /// Attaches the skeleton used for reference poses and count validation.
    pub fn set_skeleton(&mut self, skeleton: SkelData) -> Result<(), AnimError> {
        match self {
            AnimData::PredictiveCompressed(anim) => anim.set_skeleton(skeleton),
            AnimData::InterleavedUncompressed(anim) => anim.set_skeleton(skeleton),
            AnimData::Unsupported(kind) => Err(AnimError::NotSupported(*kind)),
        }
    }

    pub fn skeleton(&self) -> Option<&SkelData> {
        match self {
            AnimData::PredictiveCompressed(anim) => anim.skeleton(),
            AnimData::InterleavedUncompressed(anim) => anim.skeleton(),
            AnimData::Unsupported(_) => None,
        }
    }

    /// Reconstructs the per bone transform tracks.
    ///
    /// The map is keyed by bone index. Each entry holds one transform per
    /// frame in frame order. Bones the animation never touches have no entry.
    pub fn fetch_all_tracks(&self) -> Result<BTreeMap<usize, Vec<Transform>>, AnimError> {
        match self {
            AnimData::PredictiveCompressed(anim) => anim.fetch_all_tracks(),
            AnimData::InterleavedUncompressed(anim) => anim.fetch_all_tracks(),
            AnimData::Unsupported(kind) => Err(AnimError::NotSupported(*kind)),
        }
    }
}

// The int and float data blobs are partitioned into arrays by offset tables.
// Ids are indices into those tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntArrayId {
    BlockOffsets = 0,
    FirstFloatBlockOffsets = 1,
    IsAnimatedBitmap = 2,
    IsFixedRangeBitmap = 3,
    DynamicBoneTrackIndex = 4,
    DynamicFloatTrackIndex = 5,
    StaticBoneTrackIndex = 6,
    StaticFloatTrackIndex = 7,
    RenormQuaternionIndex = 8,
}

pub(crate) const INT_ARRAY_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatArrayId {
    StaticValues = 0,
    DynamicScales = 1,
    DynamicOffsets = 2,
}

pub(crate) const FLOAT_ARRAY_COUNT: usize = 3;

impl IntArrayId {
    fn name(&self) -> &'static str {
        match self {
            IntArrayId::BlockOffsets => "block offset",
            IntArrayId::FirstFloatBlockOffsets => "first float block offset",
            IntArrayId::IsAnimatedBitmap => "is animated bitmap",
            IntArrayId::IsFixedRangeBitmap => "is fixed range bitmap",
            IntArrayId::DynamicBoneTrackIndex => "dynamic bone track index",
            IntArrayId::DynamicFloatTrackIndex => "dynamic float track index",
            IntArrayId::StaticBoneTrackIndex => "static bone track index",
            IntArrayId::StaticFloatTrackIndex => "static float track index",
            IntArrayId::RenormQuaternionIndex => "renorm quaternion index",
        }
    }
}

impl FloatArrayId {
    fn name(&self) -> &'static str {
        match self {
            FloatArrayId::StaticValues => "static value",
            FloatArrayId::DynamicScales => "dynamic scale",
            FloatArrayId::DynamicOffsets => "dynamic offset",
        }
    }
}

// The data blobs reserve trailing elements past the final array.
const INT_EXTRA_ELEMS: usize = 8;
const FLOAT_EXTRA_ELEMS: usize = 4;

/// A deserialized predictive block compressed animation.
///
/// The serialized object stores every table in two flat blobs addressed by
/// offset tables. Accessors return bounds checked slices of those blobs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictiveAnimation {
    /// Concatenated compressed sample blocks.
    pub compressed_data: Vec<u8>,
    pub int_data: Vec<u16>,
    pub int_array_offsets: [usize; INT_ARRAY_COUNT],
    pub float_data: Vec<f32>,
    pub float_array_offsets: [usize; FLOAT_ARRAY_COUNT],
    pub num_bones: usize,
    pub num_float_slots: usize,
    pub num_frames: usize,
    pub first_float_block_scale_and_offset_index: i32,
    pub(crate) skeleton: Option<SkelData>,
}

impl PredictiveAnimation {
    /// Attaches the skeleton, validating that its bone and float slot counts
    /// match the animation.
    pub fn set_skeleton(&mut self, skeleton: SkelData) -> Result<(), AnimError> {
        if skeleton.bones.len() != self.num_bones {
            return Err(AnimError::SkeletonBoneCountMismatch {
                skeleton: skeleton.bones.len(),
                animation: self.num_bones,
            });
        }
        if skeleton.float_slots.len() != self.num_float_slots {
            return Err(AnimError::SkeletonFloatSlotCountMismatch {
                skeleton: skeleton.float_slots.len(),
                animation: self.num_float_slots,
            });
        }

        self.skeleton = Some(skeleton);
        Ok(())
    }

    pub fn skeleton(&self) -> Option<&SkelData> {
        self.skeleton.as_ref()
    }

    pub(crate) fn int_array(&self, id: IntArrayId) -> Result<&[u16], AnimError> {
        let start = self.int_array_offsets[id as usize];
        let end = if (id as usize) + 1 < INT_ARRAY_COUNT {
            self.int_array_offsets[id as usize + 1]
        } else {
            self.int_data.len().saturating_sub(INT_EXTRA_ELEMS)
        };

        self.int_data
            .get(start..end)
            .ok_or(AnimError::InvalidArrayRange {
                array: id.name(),
                start,
                end,
                len: self.int_data.len(),
            })
    }

    pub(crate) fn float_array(&self, id: FloatArrayId) -> Result<&[f32], AnimError> {
        let start = self.float_array_offsets[id as usize];
        let end = if (id as usize) + 1 < FLOAT_ARRAY_COUNT {
            self.float_array_offsets[id as usize + 1]
        } else {
            self.float_data.len().saturating_sub(FLOAT_EXTRA_ELEMS)
        };

        self.float_data
            .get(start..end)
            .ok_or(AnimError::InvalidArrayRange {
                array: id.name(),
                start,
                end,
                len: self.float_data.len(),
            })
    }
}

fn bind_usize(value: &Value) -> Option<usize> {
    value.as_i32().and_then(|v| usize::try_from(v).ok())
}

fn bind_offsets<const N: usize>(value: &Value) -> Option<[usize; N]> {
    let offsets: Option<Vec<usize>> = value.as_array()?.iter().map(bind_usize).collect();
    offsets?.try_into().ok()
}

impl RecordSink for PredictiveAnimation {
    fn bind_field(&mut self, name: &str, value: Value) -> bool {
        match name {
            "compressedData" => match value.to_u8_vec() {
                Some(v) => {
                    self.compressed_data = v;
                    true
                }
                None => false,
            },
            "intData" => match value.to_u16_vec() {
                Some(v) => {
                    self.int_data = v;
                    true
                }
                None => false,
            },
            "intArrayOffsets" => match bind_offsets(&value) {
                Some(v) => {
                    self.int_array_offsets = v;
                    true
                }
                None => false,
            },
            "floatData" => match value.to_f32_vec() {
                Some(v) => {
                    self.float_data = v;
                    true
                }
                None => false,
            },
            "floatArrayOffsets" => match bind_offsets(&value) {
                Some(v) => {
                    self.float_array_offsets = v;
                    true
                }
                None => false,
            },
            "numBones" => match bind_usize(&value) {
                Some(v) => {
                    self.num_bones = v;
                    true
                }
                None => false,
            },
            "numFloatSlots" => match bind_usize(&value) {
                Some(v) => {
                    self.num_float_slots = v;
                    true
                }
                None => false,
            },
            "numFrames" => match bind_usize(&value) {
                Some(v) => {
                    self.num_frames = v;
                    true
                }
                None => false,
            },
            "firstFloatBlockScaleAndOffsetIndex" => match value.as_i32() {
                Some(v) => {
                    self.first_float_block_scale_and_offset_index = v;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

impl RecordSource for PredictiveAnimation {
    fn field_value(&self, name: &str) -> Option<Value> {
        match name {
            "compressedData" => Some(Value::Array(
                self.compressed_data.iter().map(|&v| Value::U8(v)).collect(),
            )),
            "intData" => Some(Value::Array(
                self.int_data.iter().map(|&v| Value::U16(v)).collect(),
            )),
            "intArrayOffsets" => Some(Value::Array(
                self.int_array_offsets
                    .iter()
                    .map(|&v| Value::I32(v as i32))
                    .collect(),
            )),
            "floatData" => Some(Value::Array(
                self.float_data.iter().map(|&v| Value::F32(v)).collect(),
            )),
            "floatArrayOffsets" => Some(Value::Array(
                self.float_array_offsets
                    .iter()
                    .map(|&v| Value::I32(v as i32))
                    .collect(),
            )),
            "numBones" => Some(Value::I32(self.num_bones as i32)),
            "numFloatSlots" => Some(Value::I32(self.num_float_slots as i32)),
            "numFrames" => Some(Value::I32(self.num_frames as i32)),
            "firstFloatBlockScaleAndOffsetIndex" => {
                Some(Value::I32(self.first_float_block_scale_and_offset_index))
            }
            _ => None,
        }
    }
}

/// Per track tolerances chosen when an animation was compressed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackCompressionParams {
    pub static_translation_tolerance: f32,
    pub static_rotation_tolerance: f32,
    pub static_scale_tolerance: f32,
    pub static_float_tolerance: f32,
    pub dynamic_translation_tolerance: f32,
    pub dynamic_rotation_tolerance: f32,
    pub dynamic_scale_tolerance: f32,
    pub dynamic_float_tolerance: f32,
}

impl RecordSink for TrackCompressionParams {
    fn bind_field(&mut self, name: &str, value: Value) -> bool {
        let target = match name {
            "staticTranslationTolerance" => &mut self.static_translation_tolerance,
            "staticRotationTolerance" => &mut self.static_rotation_tolerance,
            "staticScaleTolerance" => &mut self.static_scale_tolerance,
            "staticFloatTolerance" => &mut self.static_float_tolerance,
            "dynamicTranslationTolerance" => &mut self.dynamic_translation_tolerance,
            "dynamicRotationTolerance" => &mut self.dynamic_rotation_tolerance,
            "dynamicScaleTolerance" => &mut self.dynamic_scale_tolerance,
            "dynamicFloatTolerance" => &mut self.dynamic_float_tolerance,
            _ => return false,
        };

        match value.as_f32() {
            Some(v) => {
                *target = v;
                true
            }
            None => false,
        }
    }
}

impl RecordSource for TrackCompressionParams {
    fn field_value(&self, name: &str) -> Option<Value> {
        let value = match name {
            "staticTranslationTolerance" => self.static_translation_tolerance,
            "staticRotationTolerance" => self.static_rotation_tolerance,
            "staticScaleTolerance" => self.static_scale_tolerance,
            "staticFloatTolerance" => self.static_float_tolerance,
            "dynamicTranslationTolerance" => self.dynamic_translation_tolerance,
            "dynamicRotationTolerance" => self.dynamic_rotation_tolerance,
            "dynamicScaleTolerance" => self.dynamic_scale_tolerance,
            "dynamicFloatTolerance" => self.dynamic_float_tolerance,
            _ => return None,
        };
        Some(Value::F32(value))
    }
}

/// An uncompressed animation storing transforms interleaved by frame:
/// `[frame0_track0, frame0_track1, ..., frame1_track0, ...]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterleavedAnimation {
    pub transforms: Vec<Transform>,
    pub num_transform_tracks: usize,
    pub num_float_tracks: usize,
    pub(crate) skeleton: Option<SkelData>,
}

impl InterleavedAnimation {
    pub fn set_skeleton(&mut self, skeleton: SkelData) -> Result<(), AnimError> {
        if skeleton.float_slots.len() != self.num_float_tracks {
            return Err(AnimError::SkeletonFloatSlotCountMismatch {
                skeleton: skeleton.float_slots.len(),
                animation: self.num_float_tracks,
            });
        }

        self.skeleton = Some(skeleton);
        Ok(())
    }

    pub fn skeleton(&self) -> Option<&SkelData> {
        self.skeleton.as_ref()
    }

    pub fn fetch_all_tracks(&self) -> Result<BTreeMap<usize, Vec<Transform>>, AnimError> {
        let mut tracks = BTreeMap::new();

        if self.num_transform_tracks == 0 || self.transforms.is_empty() {
            return Ok(tracks);
        }

        if self.transforms.len() % self.num_transform_tracks != 0 {
            return Err(AnimError::InvalidTransformCount {
                transform_count: self.transforms.len(),
                track_count: self.num_transform_tracks,
            });
        }

        let frame_count = self.transforms.len() / self.num_transform_tracks;
        for track in 0..self.num_transform_tracks {
            tracks.insert(
                track,
                (0..frame_count)
                    .map(|frame| self.transforms[frame * self.num_transform_tracks + track])
                    .collect(),
            );
        }

        Ok(tracks)
    }
}

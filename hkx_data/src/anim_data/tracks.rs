//! Reconstruction of per bone transform tracks from decoded predictive
//! compressed animations.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use hkx_lib::{Transform, Vector4};

use super::blocks::{decode_frame_channels, StitchMode};
use super::{AnimError, FloatArrayId, IntArrayId, PredictiveAnimation};

// Each bone owns 12 channel slots: translation xyz, rotation xyzw, scale xyz,
// with a padding slot after each triple. The rotation w slot is never coded.
const CHANNELS_PER_BONE: usize = 12;

// Fixed range channels quantize directly over the full 14 bit sample range.
const FIXED_RANGE_SCALE: f32 = 1.0 / ((1 << 13) - 1) as f32;

impl PredictiveAnimation {
    /// Reconstructs the per bone transform tracks.
    ///
    /// Every animated bone starts from the skeleton reference pose on every
    /// frame. Static channels overwrite one component with a single value,
    /// dynamic channels overwrite one component per frame from the decoded
    /// sample blocks, and rotations touched by either pass get their W
    /// component recovered and renormalized. Unanimated bones are omitted.
    pub fn fetch_all_tracks(&self) -> Result<BTreeMap<usize, Vec<Transform>>, AnimError> {
        let mut tracks: BTreeMap<usize, Vec<Transform>> = BTreeMap::new();

        if self.num_bones == 0 {
            return Ok(tracks);
        }

        let skeleton = self.skeleton.as_ref().ok_or(AnimError::MissingSkeleton)?;

        if self.num_float_slots > 0 {
            warn!(
                "animation has {} float slots, float tracks are not decoded",
                self.num_float_slots
            );
        }

        let is_animated = self.int_array(IntArrayId::IsAnimatedBitmap)?;
        let bone_weights = channel_weights(is_animated, self.num_bones);

        for (bone, weight) in bone_weights.iter().copied().enumerate() {
            if !weight {
                continue;
            }
            let reference_pose = skeleton
                .reference_pose(bone)
                .copied()
                .unwrap_or(Transform::IDENTITY);
            tracks.insert(bone, vec![reference_pose; self.num_frames]);
        }

        let bone_channel_count = self.num_bones * CHANNELS_PER_BONE;
        let mut recover_w = BTreeSet::new();

        // Static channels hold one value for the whole clip.
        let static_indices = self.int_array(IntArrayId::StaticBoneTrackIndex)?;
        let static_values = self.float_array(FloatArrayId::StaticValues)?;
        for (&channel, &value) in static_indices.iter().zip(static_values) {
            let channel = channel as usize;
            if channel >= bone_channel_count {
                break;
            }

            let bone = channel / CHANNELS_PER_BONE;
            let slot = channel % CHANNELS_PER_BONE;
            if let Some(frames) = tracks.get_mut(&bone) {
                for transform in frames.iter_mut() {
                    set_channel_value(transform, slot, value)?;
                }
                if is_rotation_slot(slot) {
                    recover_w.insert(bone);
                }
            }
        }

        // Dynamic channels are block compressed together, one decoded sample
        // per channel per frame.
        let dynamic_indices = self.int_array(IntArrayId::DynamicBoneTrackIndex)?;
        if !dynamic_indices.is_empty() {
            let block_offsets = self.int_array(IntArrayId::BlockOffsets)?;
            let is_fixed_range = self.int_array(IntArrayId::IsFixedRangeBitmap)?;
            let scales = self.float_array(FloatArrayId::DynamicScales)?;
            let offsets = self.float_array(FloatArrayId::DynamicOffsets)?;

            let samples = decode_frame_channels(
                &self.compressed_data,
                block_offsets,
                dynamic_indices.len(),
                self.num_frames,
                StitchMode::Lenient,
            )?;

            // Fixed range channels skip the scale and offset tables entirely,
            // so the table index only advances for ranged channels.
            let mut table_slot = 0;
            for (i, &channel) in dynamic_indices.iter().enumerate() {
                let channel = channel as usize;
                if channel >= bone_channel_count {
                    break;
                }

                let fixed_range = is_fixed_range
                    .get(i / 16)
                    .is_some_and(|word| (word >> (i % 16)) & 1 != 0);

                let (scale, offset) = if fixed_range {
                    (FIXED_RANGE_SCALE, 0.0)
                } else {
                    let scale = *scales
                        .get(table_slot)
                        .ok_or(AnimError::MissingScaleOffset { channel })?;
                    let offset = *offsets
                        .get(table_slot)
                        .ok_or(AnimError::MissingScaleOffset { channel })?;
                    table_slot += 1;
                    (scale, offset)
                };

                let bone = channel / CHANNELS_PER_BONE;
                let slot = channel % CHANNELS_PER_BONE;
                if let Some(frames) = tracks.get_mut(&bone) {
                    for (frame, transform) in frames.iter_mut().enumerate() {
                        let value = samples[i][frame] as f32 * scale + offset;
                        set_channel_value(transform, slot, value)?;
                    }
                    if is_rotation_slot(slot) {
                        recover_w.insert(bone);
                    }
                }
            }
        }

        for bone in recover_w {
            if let Some(frames) = tracks.get_mut(&bone) {
                for transform in frames.iter_mut() {
                    transform.rotation = recover_rotation_w(transform.rotation);
                }
            }
        }

        Ok(tracks)
    }
}

// Expands an is-animated bitmap of 16 channels per word, low bit first.
fn channel_weights(bitmap: &[u16], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            bitmap
                .get(i / 16)
                .is_some_and(|word| (word >> (i % 16)) & 1 != 0)
        })
        .collect()
}

fn is_rotation_slot(slot: usize) -> bool {
    (4..=6).contains(&slot)
}

fn set_channel_value(transform: &mut Transform, slot: usize, value: f32) -> Result<(), AnimError> {
    match slot {
        0 => transform.translation.x = value,
        1 => transform.translation.y = value,
        2 => transform.translation.z = value,
        4 => transform.rotation.x = value,
        5 => transform.rotation.y = value,
        6 => transform.rotation.z = value,
        8 => transform.scale.x = value,
        9 => transform.scale.y = value,
        10 => transform.scale.z = value,
        _ => return Err(AnimError::InvalidChannelSlot { slot }),
    }
    Ok(())
}

// Rotations are coded as xyz of a unit quaternion, so the magnitude of w is
// implied: w = sqrt(1 - x^2 - y^2 - z^2), clamped against quantization error
// pushing the squared length past one. The result is renormalized so the
// track always carries unit quaternions.
fn recover_rotation_w(rotation: Vector4) -> Vector4 {
    let length_squared =
        rotation.x * rotation.x + rotation.y * rotation.y + rotation.z * rotation.z;
    let w = (1.0 - length_squared).clamp(0.0, 1.0).sqrt();

    let [x, y, z, w] = glam::Vec4::new(rotation.x, rotation.y, rotation.z, w)
        .normalize()
        .to_array();
    Vector4::new(x, y, z, w)
}

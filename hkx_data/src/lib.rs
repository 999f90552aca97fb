//! # hkx_data
//!
//! hkx_data provides a more intuitive and minimal API for Havok animation and
//! skeleton data built on [hkx_lib].
//!
//! ## Features
//! - Decoding of predictive block compressed animation samples
//! - Reconstruction of per bone transform tracks from decoded animations
//! - Usage of standard Rust types like [Vec] and [`BTreeMap`](std::collections::BTreeMap)
//! - Errors for invalid data such as mismatched skeletons or malformed blocks
//!
//! ## Getting Started
//! Attach a skeleton to a deserialized animation and fetch its tracks.
/*!
```no_run
use hkx_data::prelude::*;

# fn read_animation() -> hkx_data::anim_data::AnimData { unimplemented!() }
# fn read_skeleton() -> hkx_data::skel_data::SkelData { unimplemented!() }
# fn main() -> Result<(), Box<dyn std::error::Error>> {
let mut anim = read_animation();
let skel = read_skeleton();

anim.set_skeleton(skel)?;
let tracks = anim.fetch_all_tracks()?;

for (bone_index, frames) in tracks {
    println!("bone {} has {} frames", bone_index, frames.len());
}
# Ok(())
# }
```
 */

pub mod anim_data;
pub mod skel_data;

/// Common imports for top level types.
pub mod prelude {
    pub use crate::anim_data::{AnimData, AnimationType, PredictiveAnimation};
    pub use crate::skel_data::{BoneData, SkelData};
}

//! # hkx_lib
//!
//! hkx_lib is a library for safe reading and writing of serialized Havok engine
//! objects as used by several games' binary asset files.
//!
//! The binary format lays each object out as a packed record: fields live at
//! byte offsets declared by the engine's reflected type metadata, gaps are
//! zero padding, and object starts obey the type's alignment. Rather than
//! hand written parsing code per type, a single metadata driven routine walks
//! a [TypeLayout] and reads or writes any record byte exactly:
//!
//! ```rust
//! use hkx_lib::{
//!     FieldLayout, PrimitiveCodec, RecordReader, ScalarKind, TypeLayout, read_record,
//! };
//!
//! # fn main() -> Result<(), hkx_lib::RecordError> {
//! let layout = TypeLayout::record(
//!     "Example",
//!     4,
//!     8,
//!     vec![
//!         FieldLayout::new("count", 0, TypeLayout::scalar(ScalarKind::U16)),
//!         FieldLayout::new("scale", 4, TypeLayout::scalar(ScalarKind::F32)),
//!     ],
//! );
//!
//! let data = [3u8, 0, 0, 0, 0, 0, 128, 63];
//! let mut reader = RecordReader::new(&data);
//! let record = read_record(&mut reader, &layout, &PrimitiveCodec)?;
//!
//! assert_eq!(Some(3), record.get("count").and_then(|v| v.as_u16()));
//! # Ok(())
//! # }
//! ```
//!
//! Layout metadata is supplied externally and loaded once. Scalar and array
//! fields are decoded by a [FieldCodec] implementation, and decoded values are
//! bound onto output objects by name through [RecordSink], so domain types can
//! receive fields directly without an intermediate map.

pub mod layout;
pub mod record;
pub mod value;

mod vectors;

pub use layout::{FieldLayout, ScalarKind, TypeKind, TypeLayout};
pub use record::{
    read_record, read_record_into, write_record, FieldCodec, PrimitiveCodec, RecordError,
    RecordReader, RecordSink, RecordSource, RecordWriter,
};
pub use value::{Record, Value};
pub use vectors::{Transform, Vector3, Vector4};

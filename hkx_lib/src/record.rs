use std::io::Cursor;

use binrw::BinReaderExt;
use log::warn;
use thiserror::Error;

use crate::layout::{ScalarKind, TypeKind, TypeLayout};
use crate::value::{Record, Value};

/// Errors while reading or writing serialized records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("type \"{identity}\" has an alignment of zero")]
    ZeroAlignment { identity: String },

    #[error(
        "attempted unaligned read of type \"{identity}\" at position {position} (alignment {alignment})"
    )]
    MisalignedRead {
        identity: String,
        position: u64,
        alignment: u64,
    },

    /// A byte in a padding gap was not zero.
    #[error("expected zero padding at position {position} but found {value:#04x}")]
    PaddingViolation { position: u64, value: u8 },

    /// The write cursor passed the start of a field. Reads recover from this
    /// by resyncing, writes do not.
    #[error(
        "wrote past the start of field \"{field}\" in type \"{identity}\" (position {position}, field offset {offset})"
    )]
    FieldOverrun {
        field: String,
        identity: String,
        position: u64,
        offset: u64,
    },

    #[error("wrote past the end of the object of type \"{identity}\" (position {position}, size {size})")]
    RecordOverrun {
        identity: String,
        position: u64,
        size: u64,
    },

    #[error("unable to bind field \"{field}\" in object of type \"{identity}\"")]
    FieldBinding { field: String, identity: String },

    #[error("value does not match the layout \"{identity}\"")]
    ValueMismatch { identity: String },

    /// An error occurred while reading data from a buffer.
    #[error(transparent)]
    BinRead(#[from] binrw::Error),

    /// An error occurred while writing data to a buffer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A sequential read cursor over a record buffer.
///
/// The cursor is exclusive state. Independent decodes must use independent
/// readers.
pub struct RecordReader<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn set_position(&mut self, position: u64) {
        self.inner.set_position(position);
    }

    /// Reads a little endian value at the current position.
    pub fn read_le<T>(&mut self) -> Result<T, RecordError>
    where
        T: binrw::BinRead,
        T::Args: Default,
    {
        Ok(self.inner.read_le::<T>()?)
    }

    fn assert_zero_byte(&mut self) -> Result<(), RecordError> {
        let position = self.position();
        let value: u8 = self.read_le()?;
        if value != 0 {
            return Err(RecordError::PaddingViolation { position, value });
        }
        Ok(())
    }
}

/// A sequential write cursor producing a record buffer.
#[derive(Default)]
pub struct RecordWriter {
    inner: Cursor<Vec<u8>>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        use std::io::Write;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    fn write_zero_byte(&mut self) -> Result<(), RecordError> {
        self.write_bytes(&[0u8])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

/// Receives decoded field values by name.
///
/// Implementations are the registration time accessor tables for their type:
/// a match over the known field names that rejects anything else.
pub trait RecordSink {
    /// Binds a decoded value to the named field.
    /// Returns `false` if the field is unknown or the value has the wrong shape.
    fn bind_field(&mut self, name: &str, value: Value) -> bool;
}

/// Supplies field values by name for writing.
pub trait RecordSource {
    fn field_value(&self, name: &str) -> Option<Value>;
}

impl RecordSink for Record {
    fn bind_field(&mut self, name: &str, value: Value) -> bool {
        self.set(name, value);
        true
    }
}

impl RecordSource for Record {
    fn field_value(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Decodes and encodes the non-record field types of a layout.
///
/// The record codec delegates every serializable field here, keyed by the
/// field's [TypeKind]. Supplying a different implementation replaces how
/// primitive values are interpreted without touching the record walk.
pub trait FieldCodec {
    fn read_value(
        &self,
        reader: &mut RecordReader,
        layout: &TypeLayout,
    ) -> Result<Value, RecordError>;

    fn write_value(
        &self,
        writer: &mut RecordWriter,
        layout: &TypeLayout,
        value: &Value,
    ) -> Result<(), RecordError>;
}

/// Little endian codec for scalars and fixed arrays. Nested records recurse
/// through the record codec.
pub struct PrimitiveCodec;

impl FieldCodec for PrimitiveCodec {
    fn read_value(
        &self,
        reader: &mut RecordReader,
        layout: &TypeLayout,
    ) -> Result<Value, RecordError> {
        match &layout.kind {
            TypeKind::Scalar(kind) => Ok(match kind {
                ScalarKind::U8 => Value::U8(reader.read_le()?),
                ScalarKind::I8 => Value::I8(reader.read_le()?),
                ScalarKind::U16 => Value::U16(reader.read_le()?),
                ScalarKind::I16 => Value::I16(reader.read_le()?),
                ScalarKind::U32 => Value::U32(reader.read_le()?),
                ScalarKind::I32 => Value::I32(reader.read_le()?),
                ScalarKind::U64 => Value::U64(reader.read_le()?),
                ScalarKind::I64 => Value::I64(reader.read_le()?),
                ScalarKind::F32 => Value::F32(reader.read_le()?),
                ScalarKind::F64 => Value::F64(reader.read_le()?),
            }),
            TypeKind::Array { element, count } => {
                let mut elements = Vec::with_capacity(*count);
                for _ in 0..*count {
                    elements.push(self.read_value(reader, element)?);
                }
                Ok(Value::Array(elements))
            }
            TypeKind::Record => Ok(Value::Record(read_record(reader, layout, self)?)),
        }
    }

    fn write_value(
        &self,
        writer: &mut RecordWriter,
        layout: &TypeLayout,
        value: &Value,
    ) -> Result<(), RecordError> {
        let mismatch = || RecordError::ValueMismatch {
            identity: layout.identity.clone(),
        };

        match (&layout.kind, value) {
            (TypeKind::Scalar(ScalarKind::U8), Value::U8(v)) => writer.write_bytes(&v.to_le_bytes()),
            (TypeKind::Scalar(ScalarKind::I8), Value::I8(v)) => writer.write_bytes(&v.to_le_bytes()),
            (TypeKind::Scalar(ScalarKind::U16), Value::U16(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::I16), Value::I16(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::U32), Value::U32(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::I32), Value::I32(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::U64), Value::U64(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::I64), Value::I64(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::F32), Value::F32(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Scalar(ScalarKind::F64), Value::F64(v)) => {
                writer.write_bytes(&v.to_le_bytes())
            }
            (TypeKind::Array { element, count }, Value::Array(elements)) => {
                if elements.len() != *count {
                    return Err(mismatch());
                }
                for element_value in elements {
                    self.write_value(writer, element, element_value)?;
                }
                Ok(())
            }
            (TypeKind::Record, Value::Record(record)) => write_record(writer, layout, self, record),
            _ => Err(mismatch()),
        }
    }
}

/// Reads one record into a generic [Record].
pub fn read_record(
    reader: &mut RecordReader,
    layout: &TypeLayout,
    codec: &dyn FieldCodec,
) -> Result<Record, RecordError> {
    let mut record = Record::new(layout.identity.clone());
    read_record_into(reader, layout, codec, &mut record)?;
    Ok(record)
}

/// Reads one record, binding each serializable field onto `sink` by name.
///
/// The cursor must start at a position that is a multiple of the layout's
/// alignment and ends exactly `layout.size` bytes later. Padding gaps between
/// fields must be zero. A cursor that has already passed a field's offset is
/// tolerated with a warning and resynced, since some producers emit
/// overlapping metadata.
pub fn read_record_into(
    reader: &mut RecordReader,
    layout: &TypeLayout,
    codec: &dyn FieldCodec,
    sink: &mut dyn RecordSink,
) -> Result<(), RecordError> {
    let object_offset = reader.position();

    if layout.alignment == 0 {
        return Err(RecordError::ZeroAlignment {
            identity: layout.identity.clone(),
        });
    }

    if object_offset % layout.alignment != 0 {
        return Err(RecordError::MisalignedRead {
            identity: layout.identity.clone(),
            position: object_offset,
            alignment: layout.alignment,
        });
    }

    for field in &layout.fields {
        if reader.position() - object_offset > field.offset {
            warn!(
                "read past the start of field \"{}\" in type \"{}\", resyncing to offset {}",
                field.name, layout.identity, field.offset
            );
            reader.set_position(object_offset + field.offset);
        }

        while reader.position() - object_offset < field.offset {
            reader.assert_zero_byte()?;
        }

        if field.non_serializable {
            for _ in 0..field.layout.size {
                reader.assert_zero_byte()?;
            }
            continue;
        }

        let value = codec.read_value(reader, &field.layout)?;
        if !sink.bind_field(&field.name, value) {
            return Err(RecordError::FieldBinding {
                field: field.name.clone(),
                identity: layout.identity.clone(),
            });
        }
    }

    while reader.position() - object_offset < layout.size {
        reader.assert_zero_byte()?;
    }

    if reader.position() - object_offset > layout.size {
        warn!(
            "read past the end of the object of type \"{}\", resyncing to size {}",
            layout.identity, layout.size
        );
        reader.set_position(object_offset + layout.size);
    }

    Ok(())
}

/// Writes one record, fetching each serializable field from `source` by name.
///
/// Writing mirrors reading but is stricter: a cursor past a field's offset or
/// the total size is an error rather than a resync. Advances the cursor by
/// exactly `layout.size`.
pub fn write_record(
    writer: &mut RecordWriter,
    layout: &TypeLayout,
    codec: &dyn FieldCodec,
    source: &dyn RecordSource,
) -> Result<(), RecordError> {
    let object_offset = writer.position();

    for field in &layout.fields {
        if writer.position() - object_offset > field.offset {
            return Err(RecordError::FieldOverrun {
                field: field.name.clone(),
                identity: layout.identity.clone(),
                position: writer.position(),
                offset: field.offset,
            });
        }

        while writer.position() - object_offset < field.offset {
            writer.write_zero_byte()?;
        }

        if field.non_serializable {
            for _ in 0..field.layout.size {
                writer.write_zero_byte()?;
            }
            continue;
        }

        let value = source
            .field_value(&field.name)
            .ok_or_else(|| RecordError::FieldBinding {
                field: field.name.clone(),
                identity: layout.identity.clone(),
            })?;
        codec.write_value(writer, &field.layout, &value)?;
    }

    if writer.position() - object_offset > layout.size {
        return Err(RecordError::RecordOverrun {
            identity: layout.identity.clone(),
            position: writer.position(),
            size: layout.size,
        });
    }

    while writer.position() - object_offset < layout.size {
        writer.write_zero_byte()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FieldLayout;
    use hexlit::hex;

    // A type with an interior reserved field and padding gaps:
    //   0x00 u16 "first"
    //   0x02 two bytes of padding
    //   0x04 u32 reserved
    //   0x08 f32 "second"
    //   0x0c u8  "third"
    //   0x0d three bytes of trailing padding, total size 0x10
    fn padded_layout() -> std::sync::Arc<TypeLayout> {
        TypeLayout::record(
            "TestRecord",
            4,
            16,
            vec![
                FieldLayout::new("first", 0, TypeLayout::scalar(ScalarKind::U16)),
                FieldLayout::reserved("cache", 4, TypeLayout::scalar(ScalarKind::U32)),
                FieldLayout::new("second", 8, TypeLayout::scalar(ScalarKind::F32)),
                FieldLayout::new("third", 12, TypeLayout::scalar(ScalarKind::U8)),
            ],
        )
    }

    #[test]
    fn read_padded_record() {
        let data = hex!("3412 0000 00000000 0000803F 07 000000");
        let mut reader = RecordReader::new(&data);
        let record = read_record(&mut reader, &padded_layout(), &PrimitiveCodec).unwrap();

        assert_eq!(Some(&Value::U16(0x1234)), record.get("first"));
        assert_eq!(Some(&Value::F32(1.0)), record.get("second"));
        assert_eq!(Some(&Value::U8(7)), record.get("third"));
        assert_eq!(None, record.get("cache"));
        assert_eq!(16, reader.position());
    }

    #[test]
    fn read_nonzero_padding_fails() {
        let data = hex!("3412 00FF 00000000 0000803F 07 000000");
        let mut reader = RecordReader::new(&data);
        let result = read_record(&mut reader, &padded_layout(), &PrimitiveCodec);

        assert!(matches!(
            result,
            Err(RecordError::PaddingViolation {
                position: 3,
                value: 0xFF
            })
        ));
    }

    #[test]
    fn read_nonzero_reserved_bytes_fail() {
        let data = hex!("3412 0000 01000000 0000803F 07 000000");
        let mut reader = RecordReader::new(&data);
        let result = read_record(&mut reader, &padded_layout(), &PrimitiveCodec);

        assert!(matches!(
            result,
            Err(RecordError::PaddingViolation {
                position: 4,
                value: 0x01
            })
        ));
    }

    #[test]
    fn read_misaligned_start_fails() {
        let data = hex!("0000 3412 0000 00000000 0000803F 07 000000");
        let mut reader = RecordReader::new(&data);
        reader.set_position(2);
        let result = read_record(&mut reader, &padded_layout(), &PrimitiveCodec);

        assert!(matches!(
            result,
            Err(RecordError::MisalignedRead {
                position: 2,
                alignment: 4,
                ..
            })
        ));
    }

    #[test]
    fn read_zero_alignment_fails() {
        let layout = TypeLayout::record("Degenerate", 0, 4, Vec::new());
        let mut reader = RecordReader::new(&[0u8; 4]);
        let result = read_record(&mut reader, &layout, &PrimitiveCodec);

        assert!(matches!(result, Err(RecordError::ZeroAlignment { .. })));
    }

    #[test]
    fn read_overlapping_field_resyncs() {
        // The second field starts inside the first. Reads tolerate this by
        // rewinding to the declared offset.
        let layout = TypeLayout::record(
            "Overlap",
            4,
            4,
            vec![
                FieldLayout::new("wide", 0, TypeLayout::scalar(ScalarKind::U32)),
                FieldLayout::new("low", 2, TypeLayout::scalar(ScalarKind::U16)),
            ],
        );
        let data = hex!("78563412");
        let mut reader = RecordReader::new(&data);
        let record = read_record(&mut reader, &layout, &PrimitiveCodec).unwrap();

        assert_eq!(Some(&Value::U32(0x12345678)), record.get("wide"));
        assert_eq!(Some(&Value::U16(0x1234)), record.get("low"));
        assert_eq!(4, reader.position());
    }

    #[test]
    fn write_overlapping_field_fails() {
        let layout = TypeLayout::record(
            "Overlap",
            4,
            4,
            vec![
                FieldLayout::new("wide", 0, TypeLayout::scalar(ScalarKind::U32)),
                FieldLayout::new("low", 2, TypeLayout::scalar(ScalarKind::U16)),
            ],
        );
        let mut record = Record::new("Overlap");
        record.set("wide", Value::U32(1));
        record.set("low", Value::U16(2));

        let mut writer = RecordWriter::new();
        let result = write_record(&mut writer, &layout, &PrimitiveCodec, &record);

        assert!(matches!(
            result,
            Err(RecordError::FieldOverrun {
                position: 4,
                offset: 2,
                ..
            })
        ));
    }

    #[test]
    fn write_then_read_round_trip() {
        let layout = padded_layout();

        let mut record = Record::new("TestRecord");
        record.set("first", Value::U16(0xBEEF));
        record.set("second", Value::F32(-2.5));
        record.set("third", Value::U8(42));

        let mut writer = RecordWriter::new();
        write_record(&mut writer, &layout, &PrimitiveCodec, &record).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(16, bytes.len());

        let mut reader = RecordReader::new(&bytes);
        let read_back = read_record(&mut reader, &layout, &PrimitiveCodec).unwrap();
        assert_eq!(Some(&Value::U16(0xBEEF)), read_back.get("first"));
        assert_eq!(Some(&Value::F32(-2.5)), read_back.get("second"));
        assert_eq!(Some(&Value::U8(42)), read_back.get("third"));
    }

    #[test]
    fn write_missing_field_fails() {
        let layout = padded_layout();
        let record = Record::new("TestRecord");

        let mut writer = RecordWriter::new();
        let result = write_record(&mut writer, &layout, &PrimitiveCodec, &record);

        assert!(matches!(
            result,
            Err(RecordError::FieldBinding { field, .. }) if field == "first"
        ));
    }

    #[test]
    fn read_array_field() {
        let layout = TypeLayout::record(
            "Holder",
            2,
            6,
            vec![FieldLayout::new(
                "values",
                0,
                TypeLayout::array(TypeLayout::scalar(ScalarKind::U16), 3),
            )],
        );
        let data = hex!("0100 0200 0300");
        let mut reader = RecordReader::new(&data);
        let record = read_record(&mut reader, &layout, &PrimitiveCodec).unwrap();

        assert_eq!(
            Some(vec![1u16, 2u16, 3u16]),
            record.get("values").and_then(Value::to_u16_vec)
        );
    }

    #[test]
    fn read_nested_record_field() {
        let inner = TypeLayout::record(
            "Inner",
            2,
            4,
            vec![FieldLayout::new(
                "value",
                0,
                TypeLayout::scalar(ScalarKind::U16),
            )],
        );
        let layout = TypeLayout::record(
            "Outer",
            2,
            6,
            vec![
                FieldLayout::new("inner", 0, inner),
                FieldLayout::new("tail", 4, TypeLayout::scalar(ScalarKind::U16)),
            ],
        );

        // The inner record pads from 2 to its size of 4.
        let data = hex!("0500 0000 0900");
        let mut reader = RecordReader::new(&data);
        let record = read_record(&mut reader, &layout, &PrimitiveCodec).unwrap();

        let inner_value = record
            .get("inner")
            .and_then(Value::as_record)
            .and_then(|r| r.get("value"))
            .and_then(Value::as_u16);
        assert_eq!(Some(5), inner_value);
        assert_eq!(Some(&Value::U16(9)), record.get("tail"));
    }

    #[test]
    fn write_value_mismatch_fails() {
        let layout = TypeLayout::scalar(ScalarKind::U16);
        let mut writer = RecordWriter::new();
        let result = PrimitiveCodec.write_value(&mut writer, &layout, &Value::U32(1));

        assert!(matches!(result, Err(RecordError::ValueMismatch { .. })));
    }

    #[test]
    fn sink_rejecting_field_fails_binding() {
        struct Empty;
        impl RecordSink for Empty {
            fn bind_field(&mut self, _: &str, _: Value) -> bool {
                false
            }
        }

        let layout = TypeLayout::record(
            "Rejecting",
            2,
            2,
            vec![FieldLayout::new(
                "unknown",
                0,
                TypeLayout::scalar(ScalarKind::U16),
            )],
        );
        let data = hex!("0100");
        let mut reader = RecordReader::new(&data);
        let result = read_record_into(&mut reader, &layout, &PrimitiveCodec, &mut Empty);

        assert!(matches!(
            result,
            Err(RecordError::FieldBinding { field, .. }) if field == "unknown"
        ));
    }
}

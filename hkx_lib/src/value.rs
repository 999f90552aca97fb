/// A decoded field value produced by the field dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_u8_vec(&self) -> Option<Vec<u8>> {
        self.as_array()?.iter().map(Value::as_u8).collect()
    }

    pub fn to_u16_vec(&self) -> Option<Vec<u16>> {
        self.as_array()?.iter().map(Value::as_u16).collect()
    }

    pub fn to_i32_vec(&self) -> Option<Vec<i32>> {
        self.as_array()?.iter().map(Value::as_i32).collect()
    }

    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        self.as_array()?.iter().map(Value::as_f32).collect()
    }
}

/// A generic decoded record keeping its fields in bind order.
///
/// Domain types usually bind fields directly through
/// [RecordSink](crate::record::RecordSink) instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub identity: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            fields: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Binds a value, replacing any previous binding for the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

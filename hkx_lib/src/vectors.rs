use binrw::BinRead;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 3 contiguous floats for encoding XYZ data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, PartialEq, Clone, Copy, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Vector3 {
        Vector3 { x, y, z }
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

/// 4 contiguous floats for encoding XYZW data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, PartialEq, Clone, Copy, Default)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Vector4 {
        Vector4 { x, y, z, w }
    }

    pub fn xyz(&self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<[f32; 4]> for Vector4 {
    fn from(v: [f32; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
            w: v[3],
        }
    }
}

/// A decomposed transformation consisting of a translation, rotation, and scale.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Transform {
    /// XYZ translation
    pub translation: Vector3,
    /// An XYZW unit quaternion where XYZ represent the axis component
    /// and W represents the angle component.
    pub rotation: Vector4,
    /// XYZ scale
    pub scale: Vector3,
}

impl Transform {
    /// An identity transformation representing no translation, rotation, or scale.
    pub const IDENTITY: Transform = Transform {
        translation: Vector3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        rotation: Vector4 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        },
        scale: Vector3 {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        },
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordReader;
    use hexlit::hex;

    #[test]
    fn read_vector3() {
        let data = hex!("0000803F 000000C0 0000003F");
        let mut reader = RecordReader::new(&data);
        let value: Vector3 = reader.read_le().unwrap();
        assert_eq!(1.0f32, value.x);
        assert_eq!(-2.0f32, value.y);
        assert_eq!(0.5f32, value.z);
    }

    #[test]
    fn read_vector4() {
        let data = hex!("0000803F 000000C0 0000003F 0000803F");
        let mut reader = RecordReader::new(&data);
        let value: Vector4 = reader.read_le().unwrap();
        assert_eq!(1.0f32, value.x);
        assert_eq!(-2.0f32, value.y);
        assert_eq!(0.5f32, value.z);
        assert_eq!(1.0f32, value.w);
    }

    #[test]
    fn identity_transform() {
        let transform = Transform::IDENTITY;
        assert_eq!(Vector3::new(0.0, 0.0, 0.0), transform.translation);
        assert_eq!(Vector4::new(0.0, 0.0, 0.0, 1.0), transform.rotation);
        assert_eq!(Vector3::new(1.0, 1.0, 1.0), transform.scale);
    }
}

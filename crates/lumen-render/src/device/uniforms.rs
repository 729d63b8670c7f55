use std::str::FromStr;

use crate::coords::Matrix;

/// Declared type of a program uniform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    /// Texture bound to a unit rather than stored in the uniform block.
    Sampler2d,
}

/// Returned when a declared type name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUniformType(pub String);

impl std::fmt::Display for UnknownUniformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown uniform type `{}`", self.0)
    }
}

impl std::error::Error for UnknownUniformType {}

impl FromStr for UniformType {
    type Err = UnknownUniformType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "f32" => Ok(UniformType::Float),
            "int" | "i32" => Ok(UniformType::Int),
            "vec2" | "vec2<f32>" => Ok(UniformType::Vec2),
            "vec3" | "vec3<f32>" => Ok(UniformType::Vec3),
            "vec4" | "vec4<f32>" => Ok(UniformType::Vec4),
            "mat3" | "mat3x3<f32>" => Ok(UniformType::Mat3),
            "sampler2d" => Ok(UniformType::Sampler2d),
            _ => Err(UnknownUniformType(s.to_string())),
        }
    }
}

impl UniformType {
    /// `(align, size)` in bytes under WGSL uniform address-space rules.
    fn layout(self) -> Option<(usize, usize)> {
        match self {
            UniformType::Float | UniformType::Int => Some((4, 4)),
            UniformType::Vec2 => Some((8, 8)),
            UniformType::Vec3 => Some((16, 12)),
            UniformType::Vec4 => Some((16, 16)),
            UniformType::Mat3 => Some((16, 48)),
            UniformType::Sampler2d => None,
        }
    }
}

/// A value stored in a program uniform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3(Matrix),
    /// Texture unit index.
    Sampler(u32),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Sampler(_) => UniformType::Sampler2d,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out[..8].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec3(v) => out[..12].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => out[..16].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Mat3(m) => {
                let cols = m.to_mat3_columns();
                out[..48].copy_from_slice(bytemuck::cast_slice(&cols));
            }
            UniformValue::Sampler(_) => {}
        }
    }
}

/// One field of a program's uniform block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformSlot {
    pub name: String,
    pub ty: UniformType,
}

impl UniformSlot {
    pub fn new(name: impl Into<String>, ty: UniformType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Byte layout of a program's uniform block.
///
/// Samplers take no space. The block size is rounded up to 16 bytes and is never
/// zero, so an empty block can still be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockLayout {
    fields: Vec<(UniformSlot, Option<usize>)>,
    size: usize,
}

impl UniformBlockLayout {
    pub fn new(slots: &[UniformSlot]) -> Self {
        let mut offset = 0usize;
        let mut fields = Vec::with_capacity(slots.len());

        for slot in slots {
            match slot.ty.layout() {
                Some((align, size)) => {
                    offset = offset.next_multiple_of(align);
                    fields.push((slot.clone(), Some(offset)));
                    offset += size;
                }
                None => fields.push((slot.clone(), None)),
            }
        }

        Self { fields, size: offset.next_multiple_of(16).max(16) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of `name`, or `None` for samplers and unknown names.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|(slot, _)| slot.name == name)
            .and_then(|(_, offset)| *offset)
    }

    /// Writes `value` into `block` if `name` is declared with a matching type.
    ///
    /// Returns false (and leaves `block` untouched) otherwise, so the previous
    /// value stays live on the device.
    pub fn write(&self, block: &mut [u8], name: &str, value: &UniformValue) -> bool {
        let Some((slot, Some(offset))) = self.fields.iter().find(|(slot, _)| slot.name == name) else {
            return false;
        };
        if slot.ty != value.ty() || block.len() < self.size {
            return false;
        }
        value.write(&mut block[*offset..]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(list: &[(&str, UniformType)]) -> Vec<UniformSlot> {
        list.iter().map(|(n, t)| UniformSlot::new(*n, *t)).collect()
    }

    #[test]
    fn parses_known_type_names() {
        assert_eq!("float".parse::<UniformType>(), Ok(UniformType::Float));
        assert_eq!("sampler2D".parse::<UniformType>(), Ok(UniformType::Sampler2d));
        assert_eq!("mat3".parse::<UniformType>(), Ok(UniformType::Mat3));
        assert!("dmat4".parse::<UniformType>().is_err());
    }

    #[test]
    fn layout_follows_wgsl_alignment() {
        let layout = UniformBlockLayout::new(&slots(&[
            ("alpha", UniformType::Float),
            ("offset", UniformType::Vec2),
            ("mask", UniformType::Sampler2d),
            ("other", UniformType::Mat3),
            ("tint", UniformType::Vec4),
        ]));

        assert_eq!(layout.offset_of("alpha"), Some(0));
        assert_eq!(layout.offset_of("offset"), Some(8));
        assert_eq!(layout.offset_of("mask"), None);
        assert_eq!(layout.offset_of("other"), Some(16));
        assert_eq!(layout.offset_of("tint"), Some(64));
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn empty_block_is_bindable() {
        assert_eq!(UniformBlockLayout::new(&[]).size(), 16);
    }

    #[test]
    fn write_rejects_type_mismatch_and_unknown_names() {
        let layout = UniformBlockLayout::new(&slots(&[("alpha", UniformType::Float)]));
        let mut block = vec![0u8; layout.size()];

        assert!(!layout.write(&mut block, "alpha", &UniformValue::Vec2([1.0, 2.0])));
        assert!(!layout.write(&mut block, "missing", &UniformValue::Float(1.0)));
        assert!(block.iter().all(|b| *b == 0));

        assert!(layout.write(&mut block, "alpha", &UniformValue::Float(0.5)));
        assert_eq!(&block[..4], bytemuck::bytes_of(&0.5f32));
    }
}

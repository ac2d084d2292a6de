//! Fixed, little-endian wire types for the collective and mesh-dump paths.

use crate::stats_error::StatsError;
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Copy a received byte buffer into a freshly allocated, correctly aligned
/// `Vec<T>`. Received buffers carry no alignment guarantee.
pub fn decode_vec<T: Pod>(data: &[u8], peer: usize) -> Result<Vec<T>, StatsError> {
    let width = size_of::<T>();
    if width == 0 || data.len() % width != 0 {
        return Err(StatsError::CommError {
            neighbor: peer,
            source: format!("{} bytes is not a whole number of {width}-byte records", data.len())
                .into(),
        });
    }
    let mut out = vec![T::zeroed(); data.len() / width];
    cast_slice_mut(&mut out).copy_from_slice(data);
    Ok(out)
}

/// All multi-byte fields in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// One mesh vertex as emitted per dump: `(identifier, x, y, z)`.
///
/// Layout: 32 bytes, 8-byte aligned, no padding. Coordinates travel as the
/// little-endian bit pattern of an `f64`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireVertex {
    pub id_le: u64,
    pub x_le: u64,
    pub y_le: u64,
    pub z_le: u64,
}

impl WireVertex {
    pub const SIZE: usize = 32;

    pub fn new(id: u64, pos: [f64; 3]) -> Self {
        Self {
            id_le: id.to_le(),
            x_le: pos[0].to_bits().to_le(),
            y_le: pos[1].to_bits().to_le(),
            z_le: pos[2].to_bits().to_le(),
        }
    }
    pub fn id(&self) -> u64 {
        u64::from_le(self.id_le)
    }
    pub fn position(&self) -> [f64; 3] {
        [
            f64::from_bits(u64::from_le(self.x_le)),
            f64::from_bits(u64::from_le(self.y_le)),
            f64::from_bits(u64::from_le(self.z_le)),
        ]
    }
}

/// A triangle as three raw vertex identifiers.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireTriangle {
    pub ids_le: [u64; 3],
}

impl WireTriangle {
    pub const SIZE: usize = 24;

    pub fn new(ids: [u64; 3]) -> Self {
        Self {
            ids_le: ids.map(u64::to_le),
        }
    }
    pub fn ids(&self) -> [u64; 3] {
        self.ids_le.map(u64::from_le)
    }
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireVertex>() == WireVertex::SIZE);
    assert!(align_of::<WireVertex>() == 8);
    assert!(size_of::<WireTriangle>() == WireTriangle::SIZE);
};

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    assert_eq_size!(WireTriangle, [u64; 3]);
    assert_eq_size!(WireVertex, [u64; 4]);
    assert_eq_align!(WireVertex, u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_byte_layout_is_id_then_xyz() {
        let v = WireVertex::new(0x0102_0304_0506_0708, [1.0, -2.5, 0.0]);
        let bytes = cast_slice(std::slice::from_ref(&v));
        assert_eq!(bytes.len(), WireVertex::SIZE);
        assert_eq!(&bytes[..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[16..24], &(-2.5f64).to_le_bytes());
        assert_eq!(&bytes[24..32], &0.0f64.to_le_bytes());
    }

    #[test]
    fn decode_realigns_odd_offsets() {
        let tris = [WireTriangle::new([1, 2, 3]), WireTriangle::new([4, 5, 6])];
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(cast_slice(&tris));
        let back: Vec<WireTriangle> = decode_vec(&shifted[1..], 0).unwrap();
        assert_eq!(back[1].ids(), [4, 5, 6]);
    }

    #[test]
    fn decode_rejects_partial_records() {
        let err = decode_vec::<WireVertex>(&[0u8; 33], 3).unwrap_err();
        assert!(matches!(err, StatsError::CommError { neighbor: 3, .. }));
    }
}

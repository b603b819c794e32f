//! Decoding of the `Constant` operand: type, rank, dims, encoding discriminant
//! and payload bytes (`spec.md` §4.5/§3.1).

use rt_core::{ErrorBuilder, ErrorKind, Result, Type};

use crate::reader::ByteReader;

/// How the payload bytes of a decoded constant expand into element values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantEncoding {
    /// One element per payload slot, `element_count` elements total.
    Dense = 0,
    /// A single element repeated `element_count` times.
    Splat = 1,
}

impl ConstantEncoding {
    fn from_u8(value: u8) -> Result<ConstantEncoding> {
        match value {
            0 => Ok(ConstantEncoding::Dense),
            1 => Ok(ConstantEncoding::Splat),
            other => Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("constant encoding discriminant {other} is not Dense(0) or Splat(1)"))
                .build()),
        }
    }
}

/// A fully decoded `Constant` operand, still holding its payload as raw
/// little-endian bytes; materializing it into a typed buffer is the
/// interpreter's job (it needs an allocator).
#[derive(Debug, Clone)]
pub struct DecodedConstant {
    pub element_type: Type,
    pub dims: Vec<u32>,
    pub encoding: ConstantEncoding,
    pub payload: Vec<u8>,
}

impl DecodedConstant {
    pub fn element_count(&self) -> usize {
        self.dims.iter().product::<u32>() as usize
    }

    /// Number of payload elements actually carried on the wire: all of them
    /// for `Dense`, exactly one for `Splat` regardless of the logical shape.
    pub fn stored_element_count(&self) -> usize {
        match self.encoding {
            ConstantEncoding::Dense => self.element_count(),
            ConstantEncoding::Splat => 1,
        }
    }
}

/// Reads a `Constant` operand: `type_index:u8, rank:u8, dims:i32*rank,
/// encoding:u8, payload:u8*N` where `N` is `element_size` times the element
/// count implied by `encoding` (`dense` → the shape's product, `splat` → 1).
/// There is no length prefix on the payload — its size is fully determined
/// by the already-decoded type, shape and encoding, per `spec.md` §4.5.
pub fn read_constant(reader: &mut ByteReader<'_>) -> Result<DecodedConstant> {
    let type_index = reader.read_u8()?;
    let element_type = Type::from_type_index(type_index)
        .map_err(|e| e.augment("decoding constant operand's element type"))?;
    let rank = reader.read_u8()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        let dim = reader.read_i32()?;
        let dim = u32::try_from(dim).map_err(|_| {
            ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("constant dimension {dim} must not be negative"))
                .build()
        })?;
        dims.push(dim);
    }
    let encoding = ConstantEncoding::from_u8(reader.read_u8()?)
        .map_err(|e| e.augment("decoding constant operand's encoding"))?;

    let element_size = if element_type.is_builtin() {
        element_type.element_size()?
    } else {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("constant operands must carry a builtin element type".to_string())
            .build());
    };
    let expected_elements = match encoding {
        ConstantEncoding::Dense => dims.iter().product::<u32>() as usize,
        ConstantEncoding::Splat => 1,
    };
    let payload = reader.read_bytes(expected_elements * element_size)?.to_vec();

    Ok(DecodedConstant { element_type, dims, encoding, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_constant(type_index: u8, dims: &[u32], encoding: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![type_index, dims.len() as u8];
        for &d in dims {
            bytes.extend_from_slice(&(d as i32).to_le_bytes());
        }
        bytes.push(encoding);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn decodes_dense_i32_matrix() {
        let payload: Vec<u8> = (1..=6i32).flat_map(|v| v.to_le_bytes()).collect();
        let wire = encode_constant(Type::I32.type_index(), &[2, 3], 0, &payload);
        let mut reader = ByteReader::new(&wire);
        let c = read_constant(&mut reader).unwrap();
        assert_eq!(c.element_type, Type::I32);
        assert_eq!(c.dims, vec![2, 3]);
        assert_eq!(c.encoding, ConstantEncoding::Dense);
        assert_eq!(c.element_count(), 6);
        assert_eq!(c.stored_element_count(), 6);
    }

    #[test]
    fn decodes_splat_scalar() {
        let payload = 7i32.to_le_bytes().to_vec();
        let wire = encode_constant(Type::I32.type_index(), &[4, 4], 1, &payload);
        let mut reader = ByteReader::new(&wire);
        let c = read_constant(&mut reader).unwrap();
        assert_eq!(c.element_count(), 16);
        assert_eq!(c.stored_element_count(), 1);
    }

    #[test]
    fn rejects_mismatched_payload_length() {
        let payload = vec![0u8; 3];
        let wire = encode_constant(Type::I32.type_index(), &[2], 0, &payload);
        let mut reader = ByteReader::new(&wire);
        let err = read_constant(&mut reader).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::OutOfRange);
    }

    #[test]
    fn rejects_unknown_encoding_discriminant() {
        let wire = encode_constant(Type::I32.type_index(), &[1], 9, &[0u8; 4]);
        let mut reader = ByteReader::new(&wire);
        assert!(read_constant(&mut reader).is_err());
    }

    #[test]
    fn rejects_opaque_element_type() {
        let wire = encode_constant(Type::Opaque.type_index(), &[1], 0, &[]);
        let mut reader = ByteReader::new(&wire);
        let err = read_constant(&mut reader).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_negative_dim() {
        let mut bytes = vec![Type::I32.type_index(), 1];
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.push(0); // dense
        let mut reader = ByteReader::new(&bytes);
        let err = read_constant(&mut reader).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::InvalidArgument);
    }
}

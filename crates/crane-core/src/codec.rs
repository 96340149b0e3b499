//! Packed numeric arrays: base64 text wrapping little-endian binary floats.
//!
//! The model exporter writes `base64(ndarray.tobytes())`. The text carries no
//! shape, so callers always supply `(rows, cols)` and the element type.
//! Decoding is bit-exact: bytes are reinterpreted, never parsed or rounded.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ndarray::Array2;
use serde::Deserialize;

use crate::CodecError;

/// Element type of a packed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Float32,
    Float64,
}

impl Dtype {
    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
        }
    }
}

/// A float type that can live in a packed array.
pub trait Element: Copy {
    const DTYPE: Dtype;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);
}

impl Element for f32 {
    const DTYPE: Dtype = Dtype::Float32;

    fn read_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        f32::from_le_bytes(buf)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Element for f64 {
    const DTYPE: Dtype = Dtype::Float64;

    fn read_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_le_bytes(buf)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Decode a packed array into an `f64` matrix of the given shape.
///
/// `float32` payloads are widened, which is exact.
pub fn decode(packed: &str, shape: (usize, usize), dtype: Dtype) -> Result<Array2<f64>, CodecError> {
    match dtype {
        Dtype::Float32 => Ok(decode_native::<f32>(packed, shape)?.mapv(f64::from)),
        Dtype::Float64 => decode_native::<f64>(packed, shape),
    }
}

/// Decode a packed array in its stored element type.
pub fn decode_native<T: Element>(
    packed: &str,
    (rows, cols): (usize, usize),
) -> Result<Array2<T>, CodecError> {
    if rows == 0 || cols == 0 {
        return Err(CodecError::EmptyShape { rows, cols });
    }
    let bytes = unpack(packed)?;
    let expected = rows * cols * T::DTYPE.size();
    if bytes.len() != expected {
        return Err(CodecError::Length {
            actual: bytes.len(),
            expected,
            rows,
            cols,
            dtype: T::DTYPE,
        });
    }

    let values: Vec<T> = bytes.chunks_exact(T::DTYPE.size()).map(T::read_le).collect();
    Array2::from_shape_vec((rows, cols), values).map_err(|_| CodecError::Length {
        actual: bytes.len(),
        expected,
        rows,
        cols,
        dtype: T::DTYPE,
    })
}

/// Number of elements held by a packed array.
pub fn element_count(packed: &str, dtype: Dtype) -> Result<usize, CodecError> {
    let bytes = unpack(packed)?;
    if bytes.len() % dtype.size() != 0 {
        return Err(CodecError::Ragged {
            bytes: bytes.len(),
            dtype,
        });
    }
    Ok(bytes.len() / dtype.size())
}

/// Pack values (row-major) into base64 text.
pub fn encode<T: Element>(values: &[T]) -> String {
    let mut bytes = Vec::with_capacity(values.len() * T::DTYPE.size());
    for &v in values {
        v.write_le(&mut bytes);
    }
    STANDARD.encode(bytes)
}

fn unpack(packed: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(packed.trim())?)
}

//! Scalar formats and the fixed-size numeric buffers that back binary columns.
//!
//! A buffer is an opaque, word-aligned byte region holding `len` elements of
//! one [`Format`]. Row copies and zeroing only rely on the format's byte
//! width; typed access goes through [`Scalar`].

use std::fmt;

use bytemuck::Pod;

/// A scalar numeric encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl Format {
    /// Every format in the catalog.
    pub const ALL: [Self; 8] = [
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Float32,
        Self::Float64,
    ];

    /// Width of one element in bytes.
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Allocate a zeroed buffer of `len` elements in this format.
    #[must_use]
    pub fn buffer(self, len: usize) -> NumericBuffer {
        NumericBuffer::new(self, len)
    }

    /// Short lowercase name, e.g. `f32`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "u8",
            Self::Uint16 => "u16",
            Self::Uint32 => "u32",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust numeric type that has a [`Format`].
pub trait Scalar: Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The format this type is stored as.
    const FORMAT: Format;

    /// Convert from the dynamic number representation.
    ///
    /// Float to integer conversions saturate, integer conversions wrap.
    fn from_f64(value: f64) -> Self;

    /// Convert into the dynamic number representation.
    fn to_f64(self) -> f64;
}

macro_rules! impl_scalar {
    ($($ty:ty => $format:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const FORMAT: Format = Format::$format;

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_scalar! {
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    f32 => Float32,
    f64 => Float64,
}

/// Run `$body` with `$t` bound to the Rust type of `$format`.
macro_rules! with_scalar_type {
    ($format:expr, $t:ident => $body:expr) => {
        match $format {
            Format::Uint8 => {
                type $t = u8;
                $body
            }
            Format::Uint16 => {
                type $t = u16;
                $body
            }
            Format::Uint32 => {
                type $t = u32;
                $body
            }
            Format::Int8 => {
                type $t = i8;
                $body
            }
            Format::Int16 => {
                type $t = i16;
                $body
            }
            Format::Int32 => {
                type $t = i32;
                $body
            }
            Format::Float32 => {
                type $t = f32;
                $body
            }
            Format::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// A fixed-length, zero-initialized buffer of one scalar format.
#[derive(Clone)]
pub struct NumericBuffer {
    format: Format,
    /// Number of elements.
    len: usize,
    /// Backing words; 8-byte alignment covers every format.
    words: Box<[u64]>,
}

impl NumericBuffer {
    /// Allocate a zeroed buffer of `len` elements.
    #[must_use]
    pub fn new(format: Format, len: usize) -> Self {
        let bytes = len * format.byte_width();
        Self {
            format,
            len,
            words: vec![0_u64; bytes.div_ceil(8)].into_boxed_slice(),
        }
    }

    /// The buffer's format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Number of elements the buffer holds.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer has no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw bytes of every element.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len * self.format.byte_width()]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let end = self.len * self.format.byte_width();
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..end]
    }

    /// Typed view, if `T` matches the buffer's format.
    #[must_use]
    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        (T::FORMAT == self.format).then(|| &bytemuck::cast_slice::<u64, T>(&self.words)[..self.len])
    }

    /// Mutable typed view, if `T` matches the buffer's format.
    #[must_use]
    pub fn as_mut_slice<T: Scalar>(&mut self) -> Option<&mut [T]> {
        if T::FORMAT != self.format {
            return None;
        }
        let len = self.len;
        Some(&mut bytemuck::cast_slice_mut::<u64, T>(&mut self.words)[..len])
    }

    /// Read one element as a number.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> f64 {
        with_scalar_type!(self.format, T => {
            bytemuck::cast_slice::<u64, T>(&self.words)[..self.len][index].to_f64()
        })
    }

    /// Write one element from a number, converting into the buffer's format.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: f64) {
        let len = self.len;
        with_scalar_type!(self.format, T => {
            bytemuck::cast_slice_mut::<u64, T>(&mut self.words)[..len][index] = T::from_f64(value);
        });
    }

    /// Copy element `from` over element `to`.
    pub fn copy_within(&mut self, from: usize, to: usize) {
        let width = self.format.byte_width();
        self.bytes_mut()
            .copy_within(from * width..(from + 1) * width, to * width);
    }

    /// Copy element `from` of `src` into element `to` of this buffer.
    ///
    /// # Panics
    ///
    /// Panics if the formats differ.
    pub fn copy_from(&mut self, to: usize, src: &Self, from: usize) {
        assert_eq!(self.format, src.format, "format mismatch in NumericBuffer::copy_from");
        let width = self.format.byte_width();
        self.bytes_mut()[to * width..(to + 1) * width]
            .copy_from_slice(&src.bytes()[from * width..(from + 1) * width]);
    }

    /// Zero one element.
    pub fn zero(&mut self, index: usize) {
        let width = self.format.byte_width();
        self.bytes_mut()[index * width..(index + 1) * width].fill(0);
    }
}

impl fmt::Debug for NumericBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumericBuffer")
            .field("format", &self.format)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_widths() {
        let widths: Vec<usize> = Format::ALL.iter().map(|f| f.byte_width()).collect();
        assert_eq!(widths, [1, 2, 4, 1, 2, 4, 4, 8]);
    }

    #[test]
    fn test_buffer_zeroed() {
        for format in Format::ALL {
            let buffer = format.buffer(5);
            assert_eq!(buffer.len(), 5);
            assert_eq!(buffer.bytes().len(), 5 * format.byte_width());
            assert!((0..5).all(|i| buffer.get(i) == 0.0));
        }
    }

    #[test]
    fn test_typed_view_checks_format() {
        let mut buffer = Format::Float32.buffer(3);
        assert!(buffer.as_slice::<f64>().is_none());

        buffer.as_mut_slice::<f32>().unwrap()[1] = 2.5;
        assert_eq!(buffer.get(1), 2.5);
        assert_eq!(buffer.as_slice::<f32>().unwrap(), &[0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_set_converts() {
        let mut buffer = Format::Uint8.buffer(2);
        buffer.set(0, 300.0);
        buffer.set(1, -4.0);
        // Float to int casts saturate.
        assert_eq!(buffer.get(0), 255.0);
        assert_eq!(buffer.get(1), 0.0);

        let mut buffer = Format::Int16.buffer(1);
        buffer.set(0, -12.9);
        assert_eq!(buffer.get(0), -12.0);
    }

    #[test]
    fn test_copy_and_zero() {
        let mut a = Format::Float64.buffer(4);
        a.set(3, 7.25);
        a.copy_within(3, 0);
        a.zero(3);
        assert_eq!(a.get(0), 7.25);
        assert_eq!(a.get(3), 0.0);

        let mut b = Format::Float64.buffer(2);
        b.copy_from(1, &a, 0);
        assert_eq!(b.get(1), 7.25);
    }

    #[test]
    fn test_odd_length_small_format() {
        let mut buffer = Format::Int8.buffer(3);
        buffer.set(2, -1.0);
        assert_eq!(buffer.as_slice::<i8>().unwrap(), &[0, 0, -1]);
    }
}

//! Binary (de)serialization for particle field data (spec.md §6/§12).
//!
//! Ported from `original_source/src/prtcl/util/archive.{hpp,cpp}`. The
//! original's `ArchiveWriter`/`ArchiveReader` are abstract base classes with
//! one virtual overload per component type (`bool`, `int32_t`, `int64_t`,
//! `float`, `double`); Rust has no overloading, so both traits here keep one
//! concrete method per type instead of a single generic one — that keeps
//! them object-safe, which matters because [`crate::data::field::DynVaryingField`]
//! and [`crate::data::field::DynUniformField`] need to save/load themselves
//! through a `&mut dyn ArchiveWriter` without knowing their own component
//! type at the call site.
//!
//! Declared versionless and non-portable across architectures, exactly like
//! the original (spec.md §6): no format version tag, native endianness.

use std::io::{self, Read, Write};

/// Writes primitives in the crate's native binary format.
pub trait ArchiveWriter {
    fn save_size(&mut self, value: usize) -> io::Result<()>;
    fn save_string(&mut self, value: &str) -> io::Result<()>;
    fn save_bool_values(&mut self, values: &[bool]) -> io::Result<()>;
    fn save_i32_values(&mut self, values: &[i32]) -> io::Result<()>;
    fn save_i64_values(&mut self, values: &[i64]) -> io::Result<()>;
    fn save_f32_values(&mut self, values: &[f32]) -> io::Result<()>;
    fn save_f64_values(&mut self, values: &[f64]) -> io::Result<()>;
}

/// Reads data written by an [`ArchiveWriter`].
pub trait ArchiveReader {
    fn load_size(&mut self) -> io::Result<usize>;
    fn load_string(&mut self) -> io::Result<String>;
    fn load_bool_values(&mut self, count: usize) -> io::Result<Vec<bool>>;
    fn load_i32_values(&mut self, count: usize) -> io::Result<Vec<i32>>;
    fn load_i64_values(&mut self, count: usize) -> io::Result<Vec<i64>>;
    fn load_f32_values(&mut self, count: usize) -> io::Result<Vec<f32>>;
    fn load_f64_values(&mut self, count: usize) -> io::Result<Vec<f64>>;
}

macro_rules! impl_le_bytes_values {
    ($save:ident, $load:ident, $ty:ty) => {
        fn $save(&mut self, values: &[$ty]) -> io::Result<()> {
            for value in values {
                self.inner.write_all(&value.to_le_bytes())?;
            }
            Ok(())
        }
    };
}

macro_rules! impl_le_bytes_load {
    ($load:ident, $ty:ty) => {
        fn $load(&mut self, count: usize) -> io::Result<Vec<$ty>> {
            let mut out = Vec::with_capacity(count);
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            for _ in 0..count {
                self.inner.read_exact(&mut buf)?;
                out.push(<$ty>::from_le_bytes(buf));
            }
            Ok(out)
        }
    };
}

/// A native binary archive writer over any [`Write`] stream.
pub struct NativeBinaryArchiveWriter<W: Write> {
    inner: W,
}

impl<W: Write> NativeBinaryArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        NativeBinaryArchiveWriter { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ArchiveWriter for NativeBinaryArchiveWriter<W> {
    fn save_size(&mut self, value: usize) -> io::Result<()> {
        self.inner.write_all(&(value as u64).to_le_bytes())
    }

    fn save_string(&mut self, value: &str) -> io::Result<()> {
        self.save_size(value.len())?;
        self.inner.write_all(value.as_bytes())
    }

    fn save_bool_values(&mut self, values: &[bool]) -> io::Result<()> {
        for &value in values {
            self.inner.write_all(&[value as u8])?;
        }
        Ok(())
    }

    impl_le_bytes_values!(save_i32_values, load_i32_values, i32);
    impl_le_bytes_values!(save_i64_values, load_i64_values, i64);
    impl_le_bytes_values!(save_f32_values, load_f32_values, f32);
    impl_le_bytes_values!(save_f64_values, load_f64_values, f64);
}

/// A native binary archive reader over any [`Read`] stream.
pub struct NativeBinaryArchiveReader<R: Read> {
    inner: R,
}

impl<R: Read> NativeBinaryArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        NativeBinaryArchiveReader { inner }
    }
}

impl<R: Read> ArchiveReader for NativeBinaryArchiveReader<R> {
    fn load_size(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf) as usize)
    }

    fn load_string(&mut self) -> io::Result<String> {
        let len = self.load_size()?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn load_bool_values(&mut self, count: usize) -> io::Result<Vec<bool>> {
        let mut out = Vec::with_capacity(count);
        let mut byte = [0u8; 1];
        for _ in 0..count {
            self.inner.read_exact(&mut byte)?;
            out.push(byte[0] != 0);
        }
        Ok(out)
    }

    impl_le_bytes_load!(load_i32_values, i32);
    impl_le_bytes_load!(load_i64_values, i64);
    impl_le_bytes_load!(load_f32_values, f32);
    impl_le_bytes_load!(load_f64_values, f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_string_and_size() {
        let mut buf = Vec::new();
        {
            let mut writer = NativeBinaryArchiveWriter::new(&mut buf);
            writer.save_size(42).unwrap();
            writer.save_string("fluid").unwrap();
        }
        let mut reader = NativeBinaryArchiveReader::new(buf.as_slice());
        assert_eq!(reader.load_size().unwrap(), 42);
        assert_eq!(reader.load_string().unwrap(), "fluid");
    }

    #[test]
    fn round_trips_every_component_type() {
        let mut buf = Vec::new();
        {
            let mut writer = NativeBinaryArchiveWriter::new(&mut buf);
            writer.save_bool_values(&[true, false, true]).unwrap();
            writer.save_i32_values(&[1i32, -2, 3]).unwrap();
            writer.save_i64_values(&[1i64, -2, 3]).unwrap();
            writer.save_f32_values(&[1.5f32, -2.5]).unwrap();
            writer.save_f64_values(&[1.5f64, -2.5]).unwrap();
        }
        let mut reader = NativeBinaryArchiveReader::new(buf.as_slice());
        assert_eq!(reader.load_bool_values(3).unwrap(), vec![true, false, true]);
        assert_eq!(reader.load_i32_values(3).unwrap(), vec![1, -2, 3]);
        assert_eq!(reader.load_i64_values(3).unwrap(), vec![1, -2, 3]);
        assert_eq!(reader.load_f32_values(2).unwrap(), vec![1.5, -2.5]);
        assert_eq!(reader.load_f64_values(2).unwrap(), vec![1.5, -2.5]);
    }

    #[test]
    fn errors_on_truncated_input() {
        let buf = vec![0u8; 3];
        let mut reader = NativeBinaryArchiveReader::new(buf.as_slice());
        assert!(reader.load_size().is_err());
    }
}

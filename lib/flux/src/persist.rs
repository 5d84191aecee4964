//! Length-prefixed binary primitives for on-disk files: strings, booleans
//! and byte blobs, each framed with a length prefix so a reader can recover
//! the shape without schema knowledge. Unlike the bounded IPC wire format,
//! a persisted file grows without a fixed capacity, so these operate
//! directly against any `io::Write`/`io::Read`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

pub trait PersistWrite: Write {
    fn write_string(&mut self, value: &str) -> io::Result<()> {
        self.write_u32::<BigEndian>(value.len() as u32)?;
        self.write_all(value.as_bytes())
    }

    fn write_bool_field(&mut self, value: bool) -> io::Result<()> {
        self.write_u8(value as u8)
    }

    fn write_bytes(&mut self, value: &[u8]) -> io::Result<()> {
        self.write_u32::<BigEndian>(value.len() as u32)?;
        self.write_all(value)
    }
}

pub trait PersistRead: Read {
    fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_u32::<BigEndian>()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn read_bool_field(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_u32::<BigEndian>()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<W: Write + ?Sized> PersistWrite for W {}
impl<R: Read + ?Sized> PersistRead for R {}

/// Writes `contents` to `path` atomically: the full contents are written to
/// a sibling temporary file, flushed, then renamed over `path`. A reader
/// never observes a partially written file.
pub fn atomic_write<F>(path: &Path, write_contents: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let tmp_path = path.with_extension("tmp");

    let mut tmp_file = File::create(&tmp_path)?;
    write_contents(&mut tmp_file)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_roundtrips() {
        let mut buf = Vec::new();
        buf.write_string("alice").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_string().unwrap(), "alice");
    }

    #[test]
    fn empty_string_roundtrips() {
        let mut buf = Vec::new();
        buf.write_string("").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_string().unwrap(), "");
    }

    #[test]
    fn bool_and_bytes_roundtrip() {
        let mut buf = Vec::new();
        buf.write_bool_field(true).unwrap();
        buf.write_bool_field(false).unwrap();
        buf.write_bytes(&[9, 8, 7]).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_bool_field().unwrap(), true);
        assert_eq!(cursor.read_bool_field().unwrap(), false);
        assert_eq!(cursor.read_bytes().unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = std::env::temp_dir().join(format!("flux-persist-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("world.dat");

        fs::write(&path, b"old").unwrap();

        atomic_write(&path, |file| file.write_all(b"new")).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!path.with_extension("tmp").exists());

        fs::remove_dir_all(&dir).ok();
    }
}

use std::fs;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};

/// A sysfs attribute kept open for repeated positioned access
pub struct Attribute {
	file: fs::File,
	path: PathBuf,
}

impl Attribute {
	pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> io::Result<Self> {
		let path = path.as_ref().to_path_buf();
		let file = fs::OpenOptions::new()
			.read(true)
			.write(writable)
			.open(&path)?;
		Ok(Attribute {
			file,
			path,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read_at_start(&self, buf: &mut [u8]) -> io::Result<usize> {
		// attributes are regenerated on every read at offset 0
		self.file.read_at(buf, 0)
	}

	pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
		// the kernel wants a whole value in one write
		let l = self.file.write_at(data, 0)?;
		if l != data.len() {
			Err(io::Error::new(io::ErrorKind::Other, "failed to write whole value"))
		} else {
			Ok(())
		}
	}

	/// first byte of the attribute
	pub fn read_first(&self) -> io::Result<u8> {
		let mut buf = [0u8; 2];
		match self.read_at_start(&mut buf)? {
			0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty attribute")),
			_ => Ok(buf[0]),
		}
	}
}

pub fn write_once<P: AsRef<Path>>(path: P, data: &[u8]) -> io::Result<()> {
	Attribute::open(path, true)?.write_all(data)
}

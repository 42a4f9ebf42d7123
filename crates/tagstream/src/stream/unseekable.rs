use std::io::{self, Read, Seek, SeekFrom};

/// Adapter for inputs that cannot seek, such as pipes and sockets.
///
/// Every seek, including position queries, fails with
/// [`io::ErrorKind::Unsupported`], so readers built on it report no virtual
/// offsets.
#[derive(Debug)]
pub struct Unseekable<R>(R);

impl<R: Read> Unseekable<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read> Read for Unseekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Seek for Unseekable<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream does not support seeking",
        ))
    }
}

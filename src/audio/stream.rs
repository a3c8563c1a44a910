//! Raw PCM byte sources.
//!
//! A [`PcmStream`] exposes the sample data region of an audio source as a
//! plain byte stream with a known size. [`WavStream`] reads the data chunk
//! of a WAV file; [`MemoryStream`] serves bytes held in memory.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;

/// Byte-level access to raw PCM data
pub trait PcmStream: Send {
    /// Read up to `buffer.len()` bytes. Returns 0 once the data is exhausted.
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Advance by up to `amount` bytes, returning how many were skipped
    fn skip(&mut self, amount: u64) -> io::Result<u64>;

    /// Bytes left before the end of the data
    fn remaining(&self) -> u64;

    /// Return to the first byte of the data
    fn rewind(&mut self) -> io::Result<()>;

    /// Release the underlying resource
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The data chunk of a WAV file
pub struct WavStream {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    data_offset: u64,
    data_len: u64,
    position: u64,
}

impl WavStream {
    /// Open a WAV file and position at the start of its sample data
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, AudioFormat), AudioError> {
        let path = path.as_ref().to_path_buf();
        let (mut reader, format, data_len) = Self::open_reader(&path)?;
        let data_offset = reader.stream_position()?;

        Ok((
            Self {
                path,
                reader: Some(reader),
                data_offset,
                data_len,
                position: 0,
            },
            format,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(path: &Path) -> Result<(BufReader<File>, AudioFormat, u64), AudioError> {
        let wav = hound::WavReader::new(BufReader::new(File::open(path)?))?;
        let format = AudioFormat::try_from(wav.spec())?;
        let data_len = wav.len() as u64 * format.bytes_per_sample() as u64;

        Ok((wav.into_inner(), format, data_len))
    }

    fn reader(&mut self) -> io::Result<&mut BufReader<File>> {
        self.reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream closed"))
    }

    /// Replace the handle with a fresh one positioned at the data start
    fn reopen(&mut self) -> io::Result<()> {
        let (mut reader, _, _) = Self::open_reader(&self.path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        reader.seek(SeekFrom::Start(self.data_offset))?;
        self.reader = Some(reader);
        Ok(())
    }
}

impl PcmStream for WavStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let want = buffer.len().min(self.remaining() as usize);
        if want == 0 {
            return Ok(0);
        }
        let n = self.reader()?.read(&mut buffer[..want])?;
        self.position += n as u64;
        Ok(n)
    }

    fn skip(&mut self, amount: u64) -> io::Result<u64> {
        let amount = amount.min(self.remaining());
        if amount == 0 {
            return Ok(0);
        }
        let offset = i64::try_from(amount)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        self.reader()?.seek_relative(offset)?;
        self.position += amount;
        Ok(amount)
    }

    fn remaining(&self) -> u64 {
        self.data_len.saturating_sub(self.position)
    }

    fn rewind(&mut self) -> io::Result<()> {
        let offset = self.data_offset;
        let seeked = match self.reader.as_mut() {
            Some(reader) => reader.seek(SeekFrom::Start(offset)).is_ok(),
            None => false,
        };
        if !seeked {
            self.reopen()?;
        }
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// PCM bytes held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl PcmStream for MemoryStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let n = buffer.len().min(self.data.len() - self.position);
        buffer[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn skip(&mut self, amount: u64) -> io::Result<u64> {
        let n = amount.min(self.remaining());
        self.position += n as usize;
        Ok(n)
    }

    fn remaining(&self) -> u64 {
        (self.data.len() - self.position) as u64
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        Ok(())
    }
}

//! Byte level transports the GNSS client talks through.
//!
//! [`SerialTransport`] drives a real UART through `serialport`, while
//! [`StubTransport`] replays a recorded byte stream in a loop and collects
//! whatever is written back, which is how the pipeline is exercised without
//! hardware.
use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{self, ErrorKind, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use serialport::SerialPort;

/// Byte written in place of an empty replay stream
pub const STUB_PAD_BYTE: u8 = 0x00;
const SERIAL_READ_CHUNK: usize = 1024;

/// A bidirectional byte transport.
///
/// Reads may return fewer bytes than requested; an empty read means the
/// stream is exhausted. Writes are all-or-nothing per call.
pub trait Transport: Send + Sync {
    /// Read at most `size` bytes
    fn read(&self, size: usize) -> BoxFuture<'_, io::Result<Vec<u8>>>;
    /// Write the whole buffer and return the number of bytes written
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::new(ErrorKind::Other, "transport lock poisoned")
}

/// UART transport backed by `serialport`.
///
/// Blocking port reads run on the blocking thread pool and whatever the port
/// returns is buffered, so that byte-at-a-time framing stays cheap.
pub struct SerialTransport {
    reader: Arc<Mutex<Box<dyn SerialPort>>>,
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    pending: Mutex<VecDeque<u8>>,
}

impl SerialTransport {
    /// Open the serial device with the given baud rate and read timeout
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        let writer = port.try_clone().map_err(io::Error::from)?;
        log::info!("Opened serial port {path} at {baud_rate} baud");
        Ok(Self {
            reader: Arc::new(Mutex::new(port)),
            writer: Arc::new(Mutex::new(writer)),
            pending: Mutex::new(VecDeque::with_capacity(SERIAL_READ_CHUNK)),
        })
    }

    fn take_pending(&self, size: usize) -> io::Result<Option<Vec<u8>>> {
        let mut pending = self.pending.lock().map_err(poisoned)?;
        if pending.is_empty() {
            return Ok(None);
        }
        let n = size.min(pending.len());
        Ok(Some(pending.drain(..n).collect()))
    }
}

impl Transport for SerialTransport {
    fn read(&self, size: usize) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        Box::pin(async move {
            if size == 0 {
                return Ok(Vec::new());
            }
            loop {
                if let Some(bytes) = self.take_pending(size)? {
                    return Ok(bytes);
                }
                let port = self.reader.clone();
                let chunk = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
                    let mut port = port.lock().map_err(poisoned)?;
                    let mut buf = vec![0u8; SERIAL_READ_CHUNK];
                    match port.read(&mut buf) {
                        Ok(n) => {
                            buf.truncate(n);
                            Ok(buf)
                        }
                        // a quiet line is not the end of the stream
                        Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
                        Err(e) => Err(e),
                    }
                })
                .await
                .map_err(|e| io::Error::new(ErrorKind::Other, e))??;
                self.pending.lock().map_err(poisoned)?.extend(chunk);
            }
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let port = self.writer.clone();
            let data = data.to_vec();
            tokio::task::spawn_blocking(move || -> io::Result<usize> {
                let mut port = port.lock().map_err(poisoned)?;
                port.write_all(&data)?;
                port.flush()?;
                Ok(data.len())
            })
            .await
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?
        })
    }
}

/// Replay transport.
///
/// The input stream is circular: reaching its end seeks back to the start.
/// An empty input is replaced by a single pad byte. Writes are appended to
/// the output stream.
pub struct StubTransport<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
    empty_input: bool,
}

impl<R: Read + Seek + Send, W: Write + Send> StubTransport<R, W> {
    /// Wrap an input and an output stream
    pub fn new(mut input: R, output: W) -> io::Result<Self> {
        let len = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;
        if len == 0 {
            log::warn!("Stub transport input is empty, padding reads with {STUB_PAD_BYTE:#04X}");
        }
        Ok(Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            empty_input: len == 0,
        })
    }

    /// Consume the transport and hand back the output stream
    pub fn into_output(self) -> io::Result<W> {
        self.output.into_inner().map_err(poisoned)
    }

    fn read_circular(&self, size: usize) -> io::Result<Vec<u8>> {
        if self.empty_input {
            return Ok(vec![STUB_PAD_BYTE; size]);
        }
        let mut input = self.input.lock().map_err(poisoned)?;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = input.read(&mut buf[filled..])?;
            if n == 0 {
                input.seek(SeekFrom::Start(0))?;
                continue;
            }
            filled += n;
        }
        Ok(buf)
    }
}

impl StubTransport<File, File> {
    /// Replay `input` and append everything written to `output`
    pub fn from_files(input: impl AsRef<Path>, output: impl AsRef<Path>) -> io::Result<Self> {
        let input_file = File::open(input.as_ref())?;
        let output_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output.as_ref())?;
        log::info!(
            "Using mock GNSS transport: input {:?}, output {:?}",
            input.as_ref(),
            output.as_ref()
        );
        Self::new(input_file, output_file)
    }
}

#[derive(Debug, Default, Clone)]
/// In-memory output sink that stays readable while a transport writes to it
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(poisoned)?.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Seek + Send, W: Write + Send> Transport for StubTransport<R, W> {
    fn read(&self, size: usize) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        Box::pin(async move {
            // replay never blocks, so give the other tasks a turn
            tokio::task::yield_now().await;
            self.read_circular(size)
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let mut output = self.output.lock().map_err(poisoned)?;
            output.write_all(data)?;
            output.flush()?;
            Ok(data.len())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn stub_read_wraps_around() {
        let stub = StubTransport::new(Cursor::new(b"abc".to_vec()), Vec::new()).unwrap();
        assert_eq!(stub.read(2).await.unwrap(), b"ab");
        assert_eq!(stub.read(3).await.unwrap(), b"cab");
        assert_eq!(stub.read(1).await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn stub_pads_empty_input() {
        let stub = StubTransport::new(Cursor::new(Vec::new()), Vec::new()).unwrap();
        assert_eq!(stub.read(1).await.unwrap(), vec![STUB_PAD_BYTE]);
    }

    #[tokio::test]
    async fn stub_appends_writes() {
        let stub = StubTransport::new(Cursor::new(b"x".to_vec()), Vec::new()).unwrap();
        assert_eq!(stub.write(b"hello ").await.unwrap(), 6);
        assert_eq!(stub.write(b"world").await.unwrap(), 5);
        assert_eq!(stub.into_output().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn shared_buffer_is_observable() {
        let sink = SharedBuffer::new();
        let stub = StubTransport::new(Cursor::new(b"x".to_vec()), sink.clone()).unwrap();
        stub.write(b"abc").await.unwrap();
        assert_eq!(sink.contents(), b"abc");
    }

    #[tokio::test]
    async fn stub_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, b"$GP").unwrap();
        let stub = StubTransport::from_files(&input, &output).unwrap();
        assert_eq!(stub.read(4).await.unwrap(), b"$GP$");
        stub.write(b"done").await.unwrap();
        drop(stub);
        assert_eq!(std::fs::read(&output).unwrap(), b"done");
    }
}

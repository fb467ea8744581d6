use std::cmp::min;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::sync::{Arc, Mutex};

/// A scripted server: reads come from a canned transcript, writes are recorded.
///
/// The write log is shared so tests can inspect it after the stream has been moved into (and
/// dropped by) a client.
#[derive(Debug, Default)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    written: Arc<Mutex<Vec<u8>>>,
    err_on_read: bool,
    eof_on_read: bool,
    read_delay: usize,
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::default().with_buf(read_buf)
    }

    pub fn with_buf(mut self, read_buf: Vec<u8>) -> MockStream {
        self.read_buf = read_buf;
        self
    }

    pub fn with_eof(mut self) -> MockStream {
        self.eof_on_read = true;
        self
    }

    pub fn with_err(mut self) -> MockStream {
        self.err_on_read = true;
        self
    }

    pub fn with_delay(mut self) -> MockStream {
        self.read_delay = 1;
        self
    }

    /// A handle to everything written to this stream.
    pub fn written_log(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.eof_on_read {
            return Ok(0);
        }
        if self.err_on_read {
            return Err(Error::new(ErrorKind::Other, "MockStream Error"));
        }
        if self.read_pos >= self.read_buf.len() {
            return Err(Error::new(ErrorKind::UnexpectedEof, "EOF"));
        }
        let mut write_len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if self.read_delay > 0 {
            self.read_delay -= 1;
            write_len = min(write_len, 1);
        }
        let max_pos = self.read_pos + write_len;
        buf[..write_len].copy_from_slice(&self.read_buf[self.read_pos..max_pos]);
        self.read_pos += write_len;
        Ok(write_len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One scripted stream per connection, for driving connectors in tests.
#[derive(Debug, Default)]
pub struct Transcripts {
    scripts: Mutex<VecDeque<Vec<u8>>>,
    logs: Mutex<Vec<Arc<Mutex<Vec<u8>>>>>,
}

impl Transcripts {
    pub fn new<S: AsRef<[u8]>>(scripts: &[S]) -> Transcripts {
        Transcripts {
            scripts: Mutex::new(scripts.iter().map(|s| s.as_ref().to_vec()).collect()),
            logs: Mutex::default(),
        }
    }

    /// The stream for the next connection. Fails once the scripts run out.
    pub fn next_stream(&self) -> Result<MockStream> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::new(ErrorKind::ConnectionRefused, "no more transcripts"))?;
        let stream = MockStream::new(script);
        self.logs.lock().unwrap().push(stream.written_log());
        Ok(stream)
    }

    /// How many connections have been made.
    pub fn connections(&self) -> usize {
        self.logs.lock().unwrap().len()
    }

    /// Everything written on the `n`th connection.
    pub fn written(&self, n: usize) -> String {
        let logs = self.logs.lock().unwrap();
        let log = logs[n].lock().unwrap();
        String::from_utf8_lossy(&log).into_owned()
    }
}

use anyhow::{Context, Result};
use log::debug;
use osmodump_messages::OutputTarget;
use std::fs::File;
use std::io::{self, Write};

/// Output destination for sample bytes.
///
/// Owns the file it opened and closes it when dropped. Standard output is
/// flushed but never closed.
pub struct SinkWriter {
    writer: Box<dyn Write + Send>,
    target: OutputTarget,
    written: u64,
}

impl SinkWriter {
    pub fn open(target: &OutputTarget) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match target {
            OutputTarget::Stdout => Box::new(io::stdout()),
            OutputTarget::File(path) => Box::new(
                File::create(path).with_context(|| format!("Failed to open {}", path.display()))?,
            ),
        };
        debug!("sink opened: {}", target);
        Ok(Self {
            writer,
            target: target.clone(),
            written: 0,
        })
    }

    /// Wrap an arbitrary writer, treated like a file sink.
    pub fn from_writer<W: Write + Send + 'static>(writer: W, name: &str) -> Self {
        Self {
            writer: Box::new(writer),
            target: OutputTarget::File(name.into()),
            written: 0,
        }
    }

    pub fn is_stdout(&self) -> bool {
        self.target == OutputTarget::Stdout
    }

    /// Total bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Write one transfer unit and return how many bytes were accepted.
    /// Anything short of `buf.len()` means samples were lost.
    pub fn write_block(&mut self, buf: &[u8]) -> usize {
        let mut done = 0;
        while done < buf.len() {
            match self.writer.write(&buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("sink write failed after {} bytes: {}", done, e);
                    break;
                }
            }
        }
        self.written += done as u64;
        done
    }

    /// Flush and release the sink.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Accepts at most `limit` bytes in total.
    struct LimitedWriter {
        limit: usize,
        taken: usize,
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit - self.taken);
            self.taken += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dash_selects_stdout() {
        let sink = SinkWriter::open(&OutputTarget::from_name("-")).unwrap();
        assert!(sink.is_stdout());
        sink.close().unwrap();
    }

    #[test]
    fn test_file_sink_writes_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let mut sink = SinkWriter::open(&OutputTarget::File(path.clone())).unwrap();
        assert_eq!(sink.write_block(&[1, 2, 3, 4]), 4);
        assert_eq!(sink.write_block(&[5, 6]), 2);
        assert_eq!(sink.bytes_written(), 6);
        sink.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_unopenable_file_is_an_error() {
        let target = OutputTarget::File(PathBuf::from("/nonexistent/dir/capture.bin"));
        let err = SinkWriter::open(&target).err().unwrap();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_short_write_is_reported() {
        let mut sink = SinkWriter::from_writer(LimitedWriter { limit: 10, taken: 0 }, "limited");
        assert_eq!(sink.write_block(&[0u8; 8]), 8);
        assert_eq!(sink.write_block(&[0u8; 8]), 2);
        assert_eq!(sink.write_block(&[0u8; 8]), 0);
        assert_eq!(sink.bytes_written(), 10);
    }
}

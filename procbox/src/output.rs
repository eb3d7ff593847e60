//! Tail-following readers over a tracker's capture file.

use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

/// Pacing for re-reads while the child is alive but quiet. Child exit
/// wakes blocked readers immediately through the watch channel.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A reader over a process's merged stdout/stderr capture file.
///
/// Each reader owns an independent descriptor positioned at the start of
/// the file, so any number of concurrent readers observe identical byte
/// streams. End of file is only reported once the child has exited;
/// before that, a reader that catches up to the writer blocks until more
/// output arrives or the child exits.
pub struct OutputReader {
    file: File,
    finished: watch::Receiver<Option<i32>>,
}

impl OutputReader {
    pub(crate) async fn open(
        path: &Path,
        finished: watch::Receiver<Option<i32>>,
    ) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self { file, finished })
    }

    /// Read captured output into `buf`, returning the number of bytes
    /// read. `Ok(0)` means the child has exited and everything it wrote
    /// has been consumed.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // Snapshot before reading: output written before the exit we
            // observe here is already visible to the read below, so a
            // short read after a positive snapshot is a true EOF.
            let finished =
                self.finished.borrow().is_some() || self.finished.has_changed().is_err();

            let n = self.file.read(buf).await?;
            if n > 0 || finished {
                return Ok(n);
            }

            tokio::select! {
                _ = self.finished.changed() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Drain the capture file until the child exits and EOF is reached.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn capture_file(dir: &tempfile::TempDir, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("stdout-test");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_eof_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = capture_file(&dir, b"hello");
        let (tx, rx) = watch::channel(Some(0));
        drop(tx);

        let mut reader = OutputReader::open(&path, rx).await.unwrap();
        assert_eq!(reader.read_to_end().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_blocks_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = capture_file(&dir, b"early");
        let (tx, rx) = watch::channel(None);

        let mut reader = OutputReader::open(&path, rx).await.unwrap();

        let read_all = tokio::spawn(async move { reader.read_to_end().await });

        // Append while the reader is already past the initial contents,
        // then signal exit.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(b" late").unwrap();
        tx.send(Some(0)).unwrap();

        let out = read_all.await.unwrap().unwrap();
        assert_eq!(out, b"early late");
    }

    #[tokio::test]
    async fn test_exit_wakes_blocked_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = capture_file(&dir, b"");
        let (tx, rx) = watch::channel(None);

        let mut reader = OutputReader::open(&path, rx).await.unwrap();
        let read_all = tokio::spawn(async move { reader.read_to_end().await });

        tx.send(Some(0)).unwrap();

        let out = tokio::time::timeout(Duration::from_secs(1), read_all)
            .await
            .expect("reader must wake on exit")
            .unwrap()
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_independent_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = capture_file(&dir, b"same bytes");
        let (tx, rx) = watch::channel(Some(0));
        drop(tx);

        let mut first = OutputReader::open(&path, rx.clone()).await.unwrap();
        let mut second = OutputReader::open(&path, rx).await.unwrap();

        assert_eq!(
            first.read_to_end().await.unwrap(),
            second.read_to_end().await.unwrap()
        );
    }
}

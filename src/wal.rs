use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode one transaction to [len][bincode][crc32] format.
fn encode_txn(writer: &mut impl Write, txn: &[Event]) -> io::Result<()> {
    let payload =
        bincode::serialize(txn).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only Write-Ahead Log of service transactions.
///
/// Format per entry: `[u32: len][bincode: Vec<Event>][u32: crc32]`
/// - One entry holds every event of one create/write/delete, so a cascade
///   (successor creation, chained deletes) is replayed all-or-nothing.
/// - Truncated last entry (crash) is discarded whole via length-prefix + CRC check.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append a transaction and fsync. Used by tests only;
    /// production code uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, txn: &[Event]) -> io::Result<()> {
        self.append_buffered(txn)?;
        self.flush_sync()
    }

    /// Buffer a transaction without flushing or syncing.
    pub fn append_buffered(&mut self, txn: &[Event]) -> io::Result<()> {
        encode_txn(&mut self.writer, txn)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot transaction to a temp file and fsync.
    pub fn write_compact_file(path: &Path, snapshot: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        if !snapshot.is_empty() {
            encode_txn(&mut writer, snapshot)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the WAL and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, snapshot: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, snapshot)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all complete transactions in order.
    /// A truncated/corrupt trailing entry ends the replay.
    pub fn replay(path: &Path) -> io::Result<Vec<Vec<Event>>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut txns = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("wal {}: crc mismatch, dropping tail", path.display());
                break;
            }

            match bincode::deserialize::<Vec<Event>>(&payload) {
                Ok(txn) => txns.push(txn),
                Err(_) => break,
            }
        }

        Ok(txns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceState;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dutyplan_test_wal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn state_change() -> Event {
        Event::StateChanged {
            id: Ulid::new(),
            state: ServiceState::Confirmed,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let _ = fs::remove_file(&path);

        let txns = vec![
            vec![state_change(), Event::ServiceDeleted { id: Ulid::new() }],
            vec![state_change()],
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for t in &txns {
                wal.append(t).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, txns);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_truncated_transaction_whole() {
        let path = tmp_path("truncation.wal");
        let _ = fs::remove_file(&path);

        let first = vec![state_change()];
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        // Second transaction cut off halfway through its payload.
        {
            let second = vec![state_change(), state_change(), state_change()];
            let payload = bincode::serialize(&second).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload[..payload.len() / 2]).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![first]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let _ = fs::remove_file(&path);
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let _ = fs::remove_file(&path);

        {
            let payload = bincode::serialize(&vec![Event::ServiceDeleted { id: Ulid::new() }]).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let _ = fs::remove_file(&path);

        let snapshot = vec![state_change()];
        let after = vec![Event::ServiceDeleted { id: Ulid::new() }];
        {
            let mut wal = Wal::open(&path).unwrap();
            for _ in 0..10 {
                wal.append(&[state_change()]).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 10);
            wal.compact(&snapshot).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&after).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![snapshot, after]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_to_empty_state() {
        let path = tmp_path("compact_empty.wal");
        let _ = fs::remove_file(&path);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&[state_change()]).unwrap();
            wal.compact(&[]).unwrap();
        }
        assert!(Wal::replay(&path).unwrap().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        let _ = fs::remove_file(&path);
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ballast_base::{err, ChangeId, Result, Stamp};

use crate::log::Checkpoint;
use crate::record::{ChangeRecord, ChangeState};

// On-disk frame. The journal itself does not interpret these beyond
// framing; the ChangeLog view gives them chain semantics.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// A freshly prepared record, appended at prepare time.
    Record(Box<ChangeRecord>),
    /// Terminal-state transition of the prepared tail record.
    Seal {
        id: ChangeId,
        state: ChangeState,
        approved: Stamp,
    },
    /// Opaque compaction/audit marker, preserved verbatim.
    Checkpoint(Checkpoint),
}

// An append-only file of frames:
//
//   magic (8 bytes) | format vers (u32 LE) | frame*
//   frame := body len (u32 LE) | crc32c of body (u32 LE) | msgpack body
//
// Appends are write + flush + fsync before returning. On open, replay
// stops at the first frame whose length or checksum does not hold and
// truncates the file there: a torn tail write is indistinguishable from
// a frame that was never acknowledged, so it is discarded.
pub struct Journal {
    file: File,
    path: PathBuf,
}

impl Journal {
    pub const MAGIC: &'static [u8; 8] = b"ballastj";
    pub const VERS: u32 = 0;

    const HEADER_LEN: u64 = 12;
    // A frame body larger than this is corruption, not data.
    const MAX_FRAME_LEN: u32 = 64 << 20;

    /// Open (or create) the journal at `path`, take the exclusive file
    /// lock, and replay existing frames. Returns the journal positioned
    /// for append and the decoded frames in file order.
    pub fn open(path: &Path) -> Result<(Journal, Vec<Frame>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| err("journal is locked by another process"))?;

        let end = file.seek(SeekFrom::End(0))?;
        if end == 0 {
            file.write_all(Self::MAGIC)?;
            file.write_all(&Self::VERS.to_le_bytes())?;
            file.flush()?;
            file.sync_data()?;
            info!(target: "ballast", path = %path.display(), "created journal");
            return Ok((
                Journal {
                    file,
                    path: path.to_owned(),
                },
                Vec::new(),
            ));
        }

        file.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if magic != *Self::MAGIC {
            return Err(err("bad magic number in journal"));
        }
        let mut vers = [0u8; 4];
        file.read_exact(&mut vers)?;
        let vers = u32::from_le_bytes(vers);
        if vers > Self::VERS {
            return Err(err("unsupported future journal format version"));
        }

        let mut frames = Vec::new();
        let mut good_end = Self::HEADER_LEN;
        loop {
            match Self::read_frame(&mut file, end)? {
                Some((frame, next)) => {
                    frames.push(frame);
                    good_end = next;
                }
                None => break,
            }
        }
        if good_end < end {
            warn!(
                target: "ballast",
                path = %path.display(),
                dropped = end - good_end,
                "discarding torn journal tail"
            );
            file.set_len(good_end)?;
            file.sync_data()?;
        }
        file.seek(SeekFrom::Start(good_end))?;
        Ok((
            Journal {
                file,
                path: path.to_owned(),
            },
            frames,
        ))
    }

    // Returns the decoded frame and the offset just past it, or None when
    // the remaining bytes do not hold a whole valid frame (torn tail).
    // A CRC-valid body that fails to decode is corruption in acknowledged
    // data and is a hard error.
    fn read_frame(file: &mut File, end: u64) -> Result<Option<(Frame, u64)>> {
        let at = file.stream_position()?;
        if at == end {
            return Ok(None);
        }
        if end - at < 8 {
            return Ok(None);
        }
        let mut hdr = [0u8; 8];
        file.read_exact(&mut hdr)?;
        let len = u32::from_le_bytes(hdr[0..4].try_into().expect("4-byte slice"));
        let crc = u32::from_le_bytes(hdr[4..8].try_into().expect("4-byte slice"));
        if len > Self::MAX_FRAME_LEN || end - at - 8 < len as u64 {
            file.seek(SeekFrom::Start(at))?;
            return Ok(None);
        }
        let mut body = vec![0u8; len as usize];
        file.read_exact(&mut body)?;
        if crc32c::crc32c(&body) != crc {
            file.seek(SeekFrom::Start(at))?;
            return Ok(None);
        }
        let frame: Frame = rmp_serde::from_slice(&body)
            .map_err(|_| err("malformed change record in journal"))?;
        Ok(Some((frame, at + 8 + len as u64)))
    }

    /// Append one frame durably: the write is fsynced before this
    /// returns, so an acknowledged frame survives any crash.
    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        let body = rmp_serde::to_vec(frame)?;
        let len = u32::try_from(body.len()).map_err(|_| err("frame body too large"))?;
        if len > Self::MAX_FRAME_LEN {
            return Err(err("frame body too large"));
        }
        let crc = crc32c::crc32c(&body);
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.write_all(&body)?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

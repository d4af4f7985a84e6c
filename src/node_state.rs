//! Persistent per-node Raft state.
//!
//! A single fixed-size little-endian record in `node.state`, rewritten in
//! full and fsynced whenever a field changes. Invariant:
//! `last_applied <= commit_index <= last_index`.

use std::error::Error as StdError;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use validit::less_equal;
use validit::Validate;

use crate::pio;

/// Identity of a cluster member, used to record votes.
pub type NodeId = u64;

/// Encoded record size: term, commit index, last index, last applied,
/// vote flag, voted-for id.
const STATE_SIZE: usize = 8 + 8 + 8 + 8 + 1 + 8;

pub(crate) struct NodeState {
    file: File,
    term: i64,
    voted_for: Option<NodeId>,
    commit_index: u64,
    last_index: u64,
    last_applied: u64,
}

impl NodeState {
    /// Open `node.state`, restoring all fields verbatim when the file holds
    /// a full record and starting from zeros otherwise.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;

        let mut state = Self {
            file,
            term: 0,
            voted_for: None,
            commit_index: 0,
            last_index: 0,
            last_applied: 0,
        };

        if state.file.metadata()?.len() >= STATE_SIZE as u64 {
            let mut buf = [0u8; STATE_SIZE];
            pio::read_exact_at(&state.file, &mut buf, 0)?;
            state.decode(&buf);
        }

        Ok(state)
    }

    pub fn term(&self) -> i64 {
        self.term
    }

    /// Advance to the next term, returning it. Entering a new term always
    /// discards the previous vote.
    pub fn increment_term(&mut self) -> i64 {
        self.term += 1;
        self.voted_for = None;
        self.term
    }

    /// Adopt a greater term observed from a peer. Terms never move
    /// backwards; a stale value is ignored.
    pub fn update_term(&mut self, term: i64) {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
        }
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    /// True when this node can grant its vote to `member`: either no vote
    /// has been cast in the current term, or it was cast for `member`.
    pub fn is_voted_for(&self, member: NodeId) -> bool {
        match self.voted_for {
            None => true,
            Some(id) => id == member,
        }
    }

    pub fn set_voted_for(&mut self, member: Option<NodeId>) {
        self.voted_for = member;
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn set_commit_index(&mut self, index: u64) {
        self.commit_index = index;
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn set_last_index(&mut self, index: u64) {
        self.last_index = index;
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn set_last_applied(&mut self, index: u64) {
        self.last_applied = index;
    }

    /// Rewrite the record and fsync it. Mutations are not visible to a
    /// reopened store until this has run.
    pub fn persist(&self) -> io::Result<()> {
        #[cfg(debug_assertions)]
        if let Err(e) = self.validate() {
            panic!("node state invariant violated: {}", e);
        }

        let mut buf = [0u8; STATE_SIZE];
        self.encode(&mut buf);
        pio::write_all_at(&self.file, &buf, 0)?;
        self.file.sync_data()
    }

    fn encode(&self, buf: &mut [u8; STATE_SIZE]) {
        let mut w = &mut buf[..];
        w.write_i64::<LittleEndian>(self.term).unwrap();
        w.write_u64::<LittleEndian>(self.commit_index).unwrap();
        w.write_u64::<LittleEndian>(self.last_index).unwrap();
        w.write_u64::<LittleEndian>(self.last_applied).unwrap();
        w.write_u8(self.voted_for.is_some() as u8).unwrap();
        w.write_u64::<LittleEndian>(self.voted_for.unwrap_or(0)).unwrap();
    }

    fn decode(&mut self, buf: &[u8; STATE_SIZE]) {
        let mut r = &buf[..];
        self.term = r.read_i64::<LittleEndian>().unwrap();
        self.commit_index = r.read_u64::<LittleEndian>().unwrap();
        self.last_index = r.read_u64::<LittleEndian>().unwrap();
        self.last_applied = r.read_u64::<LittleEndian>().unwrap();
        let voted = r.read_u8().unwrap() != 0;
        let member = r.read_u64::<LittleEndian>().unwrap();
        self.voted_for = voted.then_some(member);
    }
}

impl Validate for NodeState {
    fn validate(&self) -> Result<(), Box<dyn StdError>> {
        less_equal!(self.last_applied, self.commit_index);
        less_equal!(self.commit_index, self.last_index);
        Ok(())
    }
}

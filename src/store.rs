//! Latest-value frame store shared between the render loop and HTTP readers.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

/// One fully rendered frame of text. Cloning shares the buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TextFrame(Arc<str>);

impl TextFrame {
    /// The sentinel served before the first frame is ready.
    pub fn empty() -> Self {
        Self(Arc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of text rows in the frame.
    pub fn rows(&self) -> usize {
        self.0.lines().count()
    }
}

impl Default for TextFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<String> for TextFrame {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for TextFrame {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl Deref for TextFrame {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextFrame({} bytes, {} rows)", self.0.len(), self.rows())
    }
}

/// Single-slot, overwrite-on-publish cell. Readers always get a whole frame;
/// frames published between two reads are simply skipped.
#[derive(Debug, Default)]
pub struct FrameStore {
    slot: RwLock<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    sequence: u64,
    frame: TextFrame,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current frame.
    pub fn publish(&self, frame: TextFrame) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.sequence += 1;
        slot.frame = frame;
    }

    /// The most recently published frame, or the empty sentinel.
    pub fn read_latest(&self) -> TextFrame {
        self.read_latest_with_sequence().1
    }

    /// Like [`read_latest`](Self::read_latest), paired with the number of
    /// publishes so far (0 before the first).
    pub fn read_latest_with_sequence(&self) -> (u64, TextFrame) {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        (slot.sequence, slot.frame.clone())
    }
}

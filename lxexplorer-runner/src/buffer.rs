use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

/// Append-only capture buffer with a hard size limit.
///
/// Readers take snapshots under a read lock, so they always observe a prefix
/// of the final contents and never a half-written chunk.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: RwLock<Vec<u8>>,
    limit: usize,
    truncated: AtomicBool,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: RwLock::new(Vec::new()),
            limit,
            truncated: AtomicBool::new(false),
        }
    }

    /// Append a chunk, dropping whatever exceeds the limit.
    ///
    /// Returns the number of bytes kept.
    pub fn append(&self, chunk: &[u8]) -> usize {
        let mut bytes = self.bytes.write();
        let remaining = self.limit.saturating_sub(bytes.len());
        let keep = chunk.len().min(remaining);
        if keep < chunk.len() {
            self.truncated.store(true, Ordering::Release);
        }
        if let Some(kept) = chunk.get(..keep) {
            bytes.extend_from_slice(kept);
        }
        keep
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Lossy UTF-8 view of the current contents.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes.read()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once any byte has been dropped because of the limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Acquire)
    }
}

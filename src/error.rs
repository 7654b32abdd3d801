//! Error types for the lumo runtime memory core.

use std::fmt;

/// Errors surfaced by the heap as ordinary values.
///
/// `OutOfMemory` is the only error expected during normal operation; the
/// interpreter reacts by collecting and retrying, or by raising an
/// out-of-memory condition in the running program. `RegionTooSmall` can
/// only happen at init and indicates a misconfigured embedding.
///
/// Caller misuse (freeing a non-head block, popping a mismatched root,
/// leaving a non-top recovery point) is not represented here: those are
/// bugs in the calling layer, reported loudly and treated as no-ops rather
/// than returned as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No run of free blocks is large enough for the request.
    OutOfMemory,
    /// The configured region cannot hold even one table byte's worth of
    /// blocks.
    RegionTooSmall { total_bytes: usize },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::OutOfMemory => write!(f, "out of memory"),
            HeapError::RegionTooSmall { total_bytes } => {
                write!(f, "heap region too small: {} bytes", total_bytes)
            }
        }
    }
}

impl std::error::Error for HeapError {}

/// Result alias for heap operations.
pub type HeapResult<T> = Result<T, HeapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(HeapError::OutOfMemory.to_string(), "out of memory");
        assert_eq!(
            HeapError::RegionTooSmall { total_bytes: 12 }.to_string(),
            "heap region too small: 12 bytes"
        );
    }
}

//! The message envelope every payload travels through a channel wrapped in.

/// Transport wrapper a channel places around every user payload.
///
/// `sequence` and `last_message` are transport detail: routines written
/// against the plain payload type never see them. Routines that need to
/// observe them directly can be built with the `_with_envelope` constructors
/// in [`crate::routine`].
#[derive(Debug, Clone, Default)]
pub struct Envelope<T> {
    pub sequence: u64,
    pub last_message: bool,
    pub payload: T,
}

//! Process-wide serialization of manifest rendering.
//!
//! The manifest rendering library used by rendering steps is not safe to
//! call concurrently from one process. Every call into it goes through
//! [`render_exclusive`]; nothing else takes this lock.

use std::sync::{Mutex, PoisonError};

static RENDER_LOCK: Mutex<()> = Mutex::new(());

/// Run `render` while holding the render lock.
///
/// Blocking: call from `tokio::task::spawn_blocking` in async code.
pub fn render_exclusive<T>(render: impl FnOnce() -> T) -> T {
    // A panicking render leaves no shared state behind the lock.
    let _guard = RENDER_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    render()
}

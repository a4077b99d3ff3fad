// src/state.rs

//! The process-wide `Flags` instance.
//!
//! The first construction call stores the instance; every later call gets the same one
//! back and its arguments are ignored. Nothing replaces the instance except
//! [`reset_for_testing`].

use crate::core::resolver::{Flags, FlagsOptions};
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to the process-wide resolver. The mutex serializes lazy resolution
/// when several threads read flags during startup.
pub type SharedFlags = Arc<Mutex<Flags>>;

lazy_static! {
    static ref FLAGS: Mutex<Option<SharedFlags>> = Mutex::new(None);
}

/// Returns the stored instance, creating it from `options` and the process arguments
/// on the first call.
pub fn get_or_create(options: FlagsOptions) -> SharedFlags {
    get_or_init(|| Flags::new(options))
}

/// Returns the stored instance, creating it with `init` on the first call.
/// `init` is not called when an instance already exists.
pub fn get_or_init(init: impl FnOnce() -> Flags) -> SharedFlags {
    let mut slot = FLAGS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(shared) = &*slot {
        log::trace!("Reusing the existing flags instance.");
        return Arc::clone(shared);
    }

    log::debug!("Creating the process-wide flags instance.");
    let shared = Arc::new(Mutex::new(init()));
    *slot = Some(Arc::clone(&shared));
    shared
}

/// The stored instance, if one was created.
pub fn instance() -> Option<SharedFlags> {
    FLAGS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
}

/// Drops the stored instance so the next construction call creates a fresh one.
/// Handles obtained earlier keep working on the old instance.
pub fn reset_for_testing() {
    *FLAGS.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Locks a shared instance. A panic in another holder does not make the flags unusable.
pub fn lock(shared: &SharedFlags) -> MutexGuard<'_, Flags> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

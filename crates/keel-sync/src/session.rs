//! The sync transport surface consumed by the orchestrator.

/// Terminal status of a transport operation.
pub type Status = keel_error::Result<()>;

/// Continuation invoked when a transport operation finishes. May be called
/// from any thread.
pub type CompletionCallback = Box<dyn FnOnce(Status) + Send>;

/// Download progress notifications: `(transferred, transferable)` bytes.
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

/// One sync session bound to a realm file.
///
/// Implementations deliver completion callbacks on whatever thread the
/// transport runs on; callers own their thread-safety. `force_close` must
/// synchronously or asynchronously flush pending completion callbacks (with
/// an error status) so no continuation is leaked.
pub trait SyncSession: Send + Sync {
    /// Register a continuation for the next download completion.
    fn wait_for_download_completion(&self, callback: CompletionCallback);

    /// Register a continuation for the next upload completion.
    fn wait_for_upload_completion(&self, callback: CompletionCallback);

    /// Ask the session to pause; the callback fires once the session has
    /// released the database file.
    fn pause_async(&self, callback: CompletionCallback);

    /// Restart the session if it was paused or dropped.
    fn revive_if_needed(&self);

    /// Tear the session down immediately, flushing pending continuations.
    fn force_close(&self);

    /// Register a download progress notifier, returning a non-zero token.
    fn register_progress_notifier(&self, callback: ProgressCallback) -> u64;

    /// Remove a previously registered progress notifier.
    fn unregister_progress_notifier(&self, token: u64);
}

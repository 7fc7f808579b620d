use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install the Ctrl+C handler. The first press asks virtual users to stop
/// after their in-flight request; the second exits immediately.
pub fn register(logger: slog::Logger) -> Result<Interrupted, ctrlc::Error> {
    let interrupted = Interrupted::new();
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        if on_signal(&flag, &logger) {
            // Written directly, the async drain would not flush before exit.
            eprintln!("User requested abort (Ctrl+C twice)");
            std::process::exit(1);
        }
    })?;
    Ok(interrupted)
}

/// Raise the flag on the first signal. Returns true when the flag was
/// already raised and the process should abort.
fn on_signal(flag: &Interrupted, logger: &slog::Logger) -> bool {
    if flag.interrupted() {
        return true;
    }
    slog::warn!(
        logger,
        "Stopping virtual users, waiting for in-flight requests (Ctrl+C again to abort)..."
    );
    flag.interrupt();
    false
}

#[derive(Clone, Debug, Default)]
pub struct Interrupted {
    interrupted: Arc<AtomicBool>,
}

impl Interrupted {
    /// A flag that nothing raises until [`Interrupted::interrupt`] is called.
    pub fn new() -> Interrupted {
        Interrupted::default()
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

//! Plain-text diagnostic dump written when a job fails unexpectedly.
//!
//! Panics are caught at the job boundary, long after the panicking frame has
//! unwound. [`install_panic_hook`] records the backtrace on the panicking
//! thread so the dump can show where the panic was raised rather than where
//! it was caught.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::error::Error as _;
use std::fmt::Write as _;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::{error, info};

use crate::error::JobError;

pub const DUMP_FILE_NAME: &str = "ERR_DETECT_IMGCOMP.txt";

thread_local! {
    static PANIC_BACKTRACE: Cell<Option<String>> = const { Cell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that stores the panicking thread's backtrace for
/// [`take_panic_backtrace`]. Safe to call repeatedly; installs only once.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = PANIC_BACKTRACE.try_with(|slot| slot.set(Some(trace)));
            previous(info);
        }));
    });
}

/// Takes the backtrace recorded by the last panic on this thread, if any.
pub fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.try_with(Cell::take).ok().flatten()
}

/// Writes `error`, its source chain and a backtrace to
/// `<output_dir>/ERR_DETECT_IMGCOMP.txt`, replacing any earlier dump.
pub fn write_dump(output_dir: &Path, error: &JobError) -> std::io::Result<PathBuf> {
    let mut text = String::new();
    let _ = writeln!(text, "error: {error}");
    let _ = writeln!(text, "kind: {:?}", error.kind());
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(text, "caused by: {cause}");
        source = cause.source();
    }
    match error {
        JobError::Unexpected {
            backtrace: Some(trace),
            ..
        } => {
            let _ = writeln!(text, "\nbacktrace (at panic):\n{trace}");
        }
        _ => {
            let _ = writeln!(
                text,
                "\nbacktrace (at job boundary):\n{}",
                Backtrace::force_capture()
            );
        }
    }

    let path = output_dir.join(DUMP_FILE_NAME);
    match std::fs::write(&path, text) {
        Ok(()) => {
            info!(path = %path.display(), "[JOB] Wrote diagnostic dump");
            Ok(path)
        }
        Err(e) => {
            error!(path = %path.display(), error = ?e, "[JOB] Failed to write diagnostic dump");
            Err(e)
        }
    }
}

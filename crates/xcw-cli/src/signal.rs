use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(_sig: libc::c_int) {
    // Only async-signal-safe work here.
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Routes SIGINT/SIGTERM into the tail's cancel flag. The handler itself
/// only flips an atomic; a helper thread propagates it.
pub fn install_cancel_handler(cancel: Arc<AtomicBool>) {
    #[cfg(unix)]
    unsafe {
        let handler: extern "C" fn(libc::c_int) = on_signal;
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }

    std::thread::Builder::new()
        .name("xcw-signal".to_string())
        .spawn(move || loop {
            if SIGNALLED.load(Ordering::SeqCst) {
                cancel.store(true, Ordering::SeqCst);
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        })
        .ok();
}

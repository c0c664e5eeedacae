use ironscan_twain::Handle;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DestroyWindow, PostMessageW, WINDOW_EX_STYLE, WINDOW_STYLE, WM_NULL,
};

/// Hidden window owned by the manager, used as the parent of the data source manager and as the
/// target of readiness wake-ups.
#[derive(Debug)]
pub(crate) struct NativeWindow(Handle);

impl NativeWindow {
    pub(crate) fn create() -> windows::core::Result<Self> {
        // SAFETY: the predefined `STATIC` class needs no registration; every optional argument is
        // left empty.
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("STATIC"),
                PCWSTR::null(),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                None,
                None,
                None,
                None,
            )
        }?;

        debug!(hwnd = ?hwnd.0, "Root window created");

        Ok(Self(Handle::new(hwnd.0)))
    }

    pub(crate) fn handle(&self) -> Handle {
        self.0
    }
}

impl Drop for NativeWindow {
    fn drop(&mut self) {
        // SAFETY: the window was created by `create` and is destroyed only here.
        if let Err(error) = unsafe { DestroyWindow(HWND(self.0.as_raw())) } {
            warn!(%error, "Failed to destroy root window");
        }
    }
}

/// Wakes up the message loop owning `window`.
pub(crate) fn wake(window: Handle) {
    if window.is_null() {
        return;
    }

    // SAFETY: it is safe to call PostMessageW from any thread with a valid window handle
    if let Err(error) = unsafe { PostMessageW(Some(HWND(window.as_raw())), WM_NULL, WPARAM(0), LPARAM(0)) } {
        error!(%error, "Failed to wake up the message loop");
    }
}

use core::ffi::c_void;

/// Whether a source must register a callback to be usable.
///
/// Without a native message loop the callback is the only way readiness is ever reported.
pub const CALLBACK_REQUIRED: bool = cfg!(not(windows));

/// Native event loop used while waiting for readiness in message-pump mode.
pub trait EventPump {
    /// Blocks until the next native event and returns a pointer to it.
    ///
    /// Returns `None` when the loop must stop (quit requested or error).
    fn next_event(&mut self) -> Option<*mut c_void>;

    /// Hands an event the data source did not claim back to the host.
    fn dispatch_event(&mut self, event: *mut c_void);
}

#[cfg(windows)]
pub use self::win32::Win32EventPump;

#[cfg(windows)]
mod win32 {
    use core::ffi::c_void;
    use core::ptr;

    use windows::Win32::UI::WindowsAndMessaging::{DispatchMessageW, GetMessageW, TranslateMessage, MSG};

    use super::EventPump;

    /// The thread message queue: `GetMessageW`, `TranslateMessage`, `DispatchMessageW`.
    #[derive(Debug, Default)]
    pub struct Win32EventPump {
        msg: MSG,
    }

    impl Win32EventPump {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl EventPump for Win32EventPump {
        fn next_event(&mut self) -> Option<*mut c_void> {
            // SAFETY: `msg` is a valid, writable MSG.
            let ret = unsafe { GetMessageW(&mut self.msg, None, 0, 0) };

            // 0 is WM_QUIT, -1 is an error
            if ret.0 == 0 || ret.0 == -1 {
                debug!(ret = ret.0, "Message loop stopped");
                return None;
            }

            Some(ptr::from_mut(&mut self.msg).cast())
        }

        fn dispatch_event(&mut self, event: *mut c_void) {
            let msg = event.cast::<MSG>().cast_const();

            // SAFETY: `event` was returned by `next_event` and points to `self.msg`.
            let _ = unsafe { TranslateMessage(msg) };
            // SAFETY: same as above.
            unsafe { DispatchMessageW(msg) };
        }
    }
}

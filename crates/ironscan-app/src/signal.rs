use ironscan_twain::{Handle, Msg};
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct Slot {
    message: Msg,
    wake: Handle,
}

/// Readiness message of one source, shared between the waiting thread and the native callback.
///
/// The message is written by whichever thread the data source manager runs the callback on and
/// taken by the thread waiting for readiness. A message posted before anyone waits is kept until
/// it is taken or explicitly cleared.
#[derive(Debug)]
pub struct ReadySignal {
    slot: Mutex<Slot>,
    posted: Condvar,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                message: Msg::NULL,
                wake: Handle::NULL,
            }),
            posted: Condvar::new(),
        }
    }

    /// Window woken up with a `WM_NULL` message whenever a message is posted.
    pub(crate) fn set_wake_window(&self, window: Handle) {
        self.slot.lock().wake = window;
    }

    /// Stores `message` and wakes the waiter.
    #[cfg_attr(feature = "__test", visibility::make(pub))]
    pub(crate) fn post(&self, message: Msg) {
        let wake = {
            let mut slot = self.slot.lock();
            slot.message = message;
            slot.wake
        };

        self.posted.notify_one();

        #[cfg(windows)]
        crate::window::wake(wake);
        #[cfg(not(windows))]
        let _ = wake;
    }

    /// Stores `message` without waking anyone, for the message loop that already runs on the
    /// waiting thread.
    pub(crate) fn store(&self, message: Msg) {
        self.slot.lock().message = message;
    }

    pub fn peek(&self) -> Msg {
        self.slot.lock().message
    }

    /// Returns the current message and resets it to `Msg::NULL`.
    #[cfg_attr(feature = "__test", visibility::make(pub))]
    pub(crate) fn take(&self) -> Msg {
        core::mem::replace(&mut self.slot.lock().message, Msg::NULL)
    }

    #[cfg_attr(feature = "__test", visibility::make(pub))]
    pub(crate) fn clear(&self) {
        self.store(Msg::NULL);
    }

    /// Blocks until a message other than `Msg::NULL` is posted, then takes it.
    pub(crate) fn wait(&self) -> Msg {
        let mut slot = self.slot.lock();

        while slot.message == Msg::NULL {
            self.posted.wait(&mut slot);
        }

        core::mem::replace(&mut slot.message, Msg::NULL)
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

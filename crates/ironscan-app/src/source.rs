use core::ffi::c_void;
use core::{fmt, ptr};
use std::sync::Arc;

use ironscan_twain::{
    Callback, Callback2, Dat, DataGroup, DsState, DsmState, Event, Handle, IccProfileMemory, Identity, Msg, Payload,
    PendingXfers, ReturnCode, SetupFileXfer, Status, UserInterface,
};

use crate::callback::{callback_proc, CallbackRegistry};
use crate::manager::Manager;
use crate::memory::{NativeHandle, OwnedMemory};
use crate::signal::ReadySignal;
use crate::transition::{self, Effect};
use crate::wait::{EventPump, CALLBACK_REQUIRED};

/// Step of the cleanup cascade, issued in order from the current state down to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupStep {
    EndXfer,
    Reset,
    Disable,
    Close,
}

impl CleanupStep {
    fn plan(state: DsState) -> &'static [Self] {
        match state {
            DsState::Xferring => &[Self::EndXfer, Self::Reset, Self::Disable, Self::Close],
            DsState::XferReady => &[Self::Reset, Self::Disable, Self::Close],
            DsState::Enabled => &[Self::Disable, Self::Close],
            DsState::Open => &[Self::Close],
            DsState::Closed => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Checked,
    Unchecked,
}

/// One data source session, bound to the [`Manager`] it was created by.
pub struct Source<'m> {
    manager: &'m Manager,
    identity: Identity,
    state: DsState,
    ui_parent: Handle,
    signal: Arc<ReadySignal>,
}

impl<'m> Source<'m> {
    pub(crate) fn new(manager: &'m Manager, identity: Identity) -> Self {
        Self {
            manager,
            identity,
            state: DsState::Closed,
            ui_parent: Handle::NULL,
            signal: Arc::new(ReadySignal::new()),
        }
    }

    pub fn state(&self) -> DsState {
        self.state
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn manager(&self) -> &'m Manager {
        self.manager
    }

    /// Whether the readiness callback of this session is registered.
    pub fn uses_callback(&self) -> bool {
        CallbackRegistry::global().is_bound(self.identity.id(), &self.signal)
    }

    /// Opens the source and registers the readiness callback.
    ///
    /// `Callback2` is tried first, then the legacy `Callback`. Where a callback is mandatory, failing
    /// to register one closes the source again and reports `Failure`.
    pub fn open(&mut self) -> ReturnCode {
        let rc = self.exchange(DataGroup::CONTROL, Dat::IDENTITY, Msg::OPEN_DS, ptr::null_mut(), Gate::Checked);
        if !rc.is_success() {
            return rc;
        }

        let id = self.identity.id();
        self.signal.clear();
        self.signal.set_wake_window(self.manager.root_window());

        if self.register_callback() {
            if let Err(error) = CallbackRegistry::global().insert(id, &self.signal) {
                error!(source_id = id, %error, "Failed to record the callback registration");
                self.rollback_open();
                return ReturnCode::FAILURE;
            }
        } else if CALLBACK_REQUIRED {
            warn!(source_id = id, "Source rejected both callback forms");
            self.rollback_open();
            return ReturnCode::FAILURE;
        } else {
            debug!(source_id = id, "Source rejected both callback forms, relying on the message loop");
        }

        rc
    }

    pub fn close(&mut self) -> ReturnCode {
        self.exchange(DataGroup::CONTROL, Dat::IDENTITY, Msg::CLOSE_DS, ptr::null_mut(), Gate::Checked)
    }

    /// Enables the source, showing its user interface as described by `ui`.
    ///
    /// With `ui_only` the source only shows its settings dialog and reports `CloseDsOk` when done.
    pub fn enable(&mut self, ui: UserInterface, ui_only: bool) -> ReturnCode {
        // A readiness message left over from a previous session must not satisfy the next wait.
        // Only a call that can actually enable the source may discard it.
        if self.state == DsState::Open {
            self.signal.clear();
        }

        let mut ui = ui;
        let msg = if ui_only { Msg::ENABLE_DS_UI_ONLY } else { Msg::ENABLE_DS };
        let rc = self.call(DataGroup::CONTROL, msg, &mut ui);

        if rc.is_success() || (!ui_only && rc == ReturnCode::CHECK_STATUS) {
            self.ui_parent = ui.parent();
        }

        rc
    }

    pub fn disable(&mut self) -> ReturnCode {
        let mut ui = UserInterface::new(false, false, self.ui_parent);
        self.call(DataGroup::CONTROL, Msg::DISABLE_DS, &mut ui)
    }

    /// Blocks until the source reports readiness.
    ///
    /// - `XferReady`: `Success`, the source moves to `XferReady`.
    /// - `CloseDsOk`: `Success`, the source is disabled on a best-effort basis and stays `Enabled` if
    ///   that fails.
    /// - `CloseDsReq`: `Cancel`, the source stays `Enabled` and should be disabled by the caller.
    ///
    /// On Windows this runs the thread message loop and must be called from the thread owning the
    /// windows. Elsewhere it waits for the callback and may be called from any thread.
    pub fn wait_ready(&mut self) -> ReturnCode {
        #[cfg(windows)]
        {
            self.wait_ready_with(&mut crate::wait::Win32EventPump::new())
        }

        #[cfg(not(windows))]
        {
            if self.state != DsState::Enabled {
                return ReturnCode::FAILURE;
            }

            if !self.uses_callback() {
                debug!(source_id = self.identity.id(), "Cannot wait for readiness without a callback");
                return ReturnCode::FAILURE;
            }

            let message = self.signal.wait();
            self.settle_ready(message)
        }
    }

    /// Runs `pump` until the source reports readiness, with the same outcomes as [`Self::wait_ready`].
    ///
    /// Every event is first offered to the source. Events it does not claim are dispatched back to
    /// the host. Without a registered callback the readiness message is read from the claimed events.
    pub fn wait_ready_with(&mut self, pump: &mut dyn EventPump) -> ReturnCode {
        if self.state != DsState::Enabled {
            return ReturnCode::FAILURE;
        }

        let uses_callback = self.uses_callback();

        while self.signal.peek() == Msg::NULL {
            let Some(raw) = pump.next_event() else {
                return ReturnCode::FAILURE;
            };

            let mut event = Event::new(raw);
            let rc = self.call(DataGroup::CONTROL, Msg::PROCESS_EVENT, &mut event);

            match rc {
                ReturnCode::NOT_DS_EVENT => {
                    pump.dispatch_event(raw);
                    self.absorb_event(&event, uses_callback);
                }
                ReturnCode::DS_EVENT => self.absorb_event(&event, uses_callback),
                _ => return rc,
            }
        }

        let message = self.signal.take();
        self.settle_ready(message)
    }

    /// Offers a single native event to the source without blocking.
    ///
    /// Returns the outcome of the readiness message when this event completed the wait (same
    /// outcomes as [`Self::wait_ready`]), the result of the dispatch call otherwise.
    pub fn process_event(&mut self, event: *mut c_void) -> ReturnCode {
        let uses_callback = self.uses_callback();

        let mut twain_event = Event::new(event);
        let rc = self.call(DataGroup::CONTROL, Msg::PROCESS_EVENT, &mut twain_event);

        if rc == ReturnCode::NOT_DS_EVENT || rc == ReturnCode::DS_EVENT {
            self.absorb_event(&twain_event, uses_callback);

            if self.state == DsState::Enabled && self.signal.peek().is_readiness() {
                let message = self.signal.take();
                return self.settle_ready(message);
            }
        }

        rc
    }

    /// Generic dispatch call on this source.
    ///
    /// The local state follows the result as for the dedicated operations. Identity calls go through
    /// [`Self::open`] and [`Self::close`] and are rejected here.
    pub fn call<P: Payload>(&mut self, group: DataGroup, msg: Msg, data: &mut P) -> ReturnCode {
        if P::DAT == Dat::IDENTITY {
            return ReturnCode::FAILURE;
        }

        self.exchange(group, P::DAT, msg, ptr::from_mut(data).cast(), Gate::Checked)
    }

    /// Dispatch call with an untyped payload, typically for custom data types.
    ///
    /// # Safety
    ///
    /// `data` must point to what the source expects for `dat` and `msg` (or be null where allowed)
    /// for the duration of the call.
    pub unsafe fn call_raw(&mut self, group: DataGroup, dat: Dat, msg: Msg, data: *mut c_void) -> ReturnCode {
        if dat == Dat::IDENTITY {
            return ReturnCode::FAILURE;
        }

        self.exchange(group, dat, msg, data, Gate::Checked)
    }

    /// `PendingXfers` with `msg`.
    ///
    /// After `EndXfer` the source goes back to `Enabled` when no transfer is pending and the image
    /// group is active, to `XferReady` otherwise. After `Reset` it goes back to `Enabled` when the
    /// image group is active. Audio sessions stay where they are and are left to the caller.
    pub fn pending_xfers(&mut self, msg: Msg, data: &mut PendingXfers) -> ReturnCode {
        self.call(DataGroup::CONTROL, msg, data)
    }

    pub fn xfer_group(&mut self, msg: Msg, group: &mut DataGroup) -> ReturnCode {
        self.call(DataGroup::CONTROL, msg, group)
    }

    /// Status of the last operation on this source.
    pub fn status(&mut self, status: &mut Status) -> ReturnCode {
        self.call(DataGroup::CONTROL, Msg::GET, status)
    }

    pub fn setup_file_xfer(&mut self, msg: Msg, data: &mut SetupFileXfer) -> ReturnCode {
        self.call(DataGroup::CONTROL, msg, data)
    }

    pub fn image_file_xfer(&mut self) -> ReturnCode {
        self.exchange(DataGroup::IMAGE, Dat::IMAGE_FILE_XFER, Msg::GET, ptr::null_mut(), Gate::Checked)
    }

    /// Native image transfer. The image handle is owned by the caller when the transfer is done.
    pub fn image_native_xfer(&mut self) -> (ReturnCode, Option<NativeHandle>) {
        let mut handle = Handle::NULL;
        let rc = self.exchange(
            DataGroup::IMAGE,
            Dat::IMAGE_NATIVE_XFER,
            Msg::GET,
            ptr::from_mut(&mut handle).cast(),
            Gate::Checked,
        );

        let image = if rc == ReturnCode::XFER_DONE {
            // SAFETY: the data source hands the image over on `XferDone`.
            unsafe { NativeHandle::from_raw(handle) }
        } else {
            None
        };

        (rc, image)
    }

    pub fn audio_file_xfer(&mut self) -> ReturnCode {
        self.exchange(DataGroup::AUDIO, Dat::AUDIO_FILE_XFER, Msg::GET, ptr::null_mut(), Gate::Checked)
    }

    /// Native audio transfer. The audio handle is owned by the caller on success.
    pub fn audio_native_xfer(&mut self) -> (ReturnCode, Option<NativeHandle>) {
        let mut handle = Handle::NULL;
        let rc = self.exchange(
            DataGroup::AUDIO,
            Dat::AUDIO_NATIVE_XFER,
            Msg::GET,
            ptr::from_mut(&mut handle).cast(),
            Gate::Checked,
        );

        let audio = if rc.is_success() || rc == ReturnCode::XFER_DONE {
            // SAFETY: the data source hands the audio snippet over on success.
            unsafe { NativeHandle::from_raw(handle) }
        } else {
            None
        };

        (rc, audio)
    }

    /// ICC profile of the current image, owned by the caller on success.
    pub fn icc_profile(&mut self) -> (ReturnCode, Option<OwnedMemory>) {
        let mut profile = IccProfileMemory::default();
        let rc = self.call(DataGroup::IMAGE, Msg::GET, &mut profile);

        let memory = if rc.is_success() {
            // SAFETY: the data source allocates the block and hands it over on success.
            unsafe { OwnedMemory::from_raw(profile.0) }
        } else {
            None
        };

        (rc, memory)
    }

    /// Brings the source back to `Closed`, whatever its current state.
    ///
    /// Every step runs even if the previous one failed. If the source still is not closed at the
    /// end, its callback registration is dropped and it is considered closed anyway.
    pub fn cleanup(&mut self) {
        let id = self.identity.id();

        for step in CleanupStep::plan(self.state) {
            let rc = match step {
                CleanupStep::EndXfer => {
                    let mut pending = PendingXfers::new();
                    self.exchange(
                        DataGroup::CONTROL,
                        Dat::PENDING_XFERS,
                        Msg::END_XFER,
                        ptr::from_mut(&mut pending).cast(),
                        Gate::Unchecked,
                    )
                }
                CleanupStep::Reset => {
                    if self.state == DsState::Enabled {
                        continue;
                    }

                    let mut pending = PendingXfers::new();
                    self.exchange(
                        DataGroup::CONTROL,
                        Dat::PENDING_XFERS,
                        Msg::RESET,
                        ptr::from_mut(&mut pending).cast(),
                        Gate::Unchecked,
                    )
                }
                CleanupStep::Disable => {
                    let mut ui = UserInterface::new(false, false, self.ui_parent);
                    self.exchange(
                        DataGroup::CONTROL,
                        Dat::USER_INTERFACE,
                        Msg::DISABLE_DS,
                        ptr::from_mut(&mut ui).cast(),
                        Gate::Unchecked,
                    )
                }
                CleanupStep::Close => self.exchange(
                    DataGroup::CONTROL,
                    Dat::IDENTITY,
                    Msg::CLOSE_DS,
                    ptr::null_mut(),
                    Gate::Unchecked,
                ),
            };

            if !rc.is_success() {
                warn!(source_id = id, ?step, %rc, "Cleanup step failed");
            }
        }

        if self.state != DsState::Closed {
            warn!(source_id = id, state = %self.state, "Source not closed by cleanup, forcing it");
            CallbackRegistry::global().remove(id);
            self.state = DsState::Closed;
        }
    }

    /// Shared path of every dispatch call: state gate, call, local transition.
    fn exchange(&mut self, group: DataGroup, dat: Dat, msg: Msg, data: *mut c_void, gate: Gate) -> ReturnCode {
        if self.manager.state() != DsmState::Open {
            return ReturnCode::FAILURE;
        }

        let rule = transition::rule_for(dat, msg);

        if gate == Gate::Checked {
            let allowed = match rule {
                Some(rule) => rule.from.contains(&self.state),
                None => self.state != DsState::Closed,
            };

            if !allowed {
                debug!(source_id = self.identity.id(), state = %self.state, ?dat, ?msg, "Call not allowed in this state");
                return ReturnCode::FAILURE;
            }
        }

        let identity = ptr::from_mut(&mut self.identity);

        // Identity calls address the manager and carry the source identity as payload.
        let (dest, data) = if dat == Dat::IDENTITY {
            (ptr::null_mut(), identity.cast::<c_void>())
        } else {
            (identity, data)
        };

        // SAFETY: `dest` is null or our identity, and callers pass the payload bound to `dat`.
        let rc = unsafe { self.manager.dispatch(dest, group, dat, msg, data) };

        if let Some(rule) = rule.filter(|rule| rule.accept.matches(rc)) {
            self.apply(rule.effect, data, rc);
        }

        rc
    }

    fn apply(&mut self, effect: Effect, data: *mut c_void, rc: ReturnCode) {
        match effect {
            Effect::Enter(to) => self.enter(to, rc),
            Effect::EndXfer => {
                let count = if data.is_null() {
                    0
                } else {
                    // SAFETY: `Dat::PENDING_XFERS` payloads are `PendingXfers` records.
                    unsafe { data.cast::<PendingXfers>().read_unaligned() }.count()
                };

                let to = if self.active_group() == DataGroup::IMAGE && count == 0 {
                    DsState::Enabled
                } else {
                    DsState::XferReady
                };

                self.enter(to, rc);
            }
            Effect::Reset => {
                if self.active_group() == DataGroup::IMAGE {
                    self.enter(DsState::Enabled, rc);
                }
            }
        }
    }

    /// Data group of the pending transfers, assumed to be images when the source cannot tell.
    fn active_group(&mut self) -> DataGroup {
        let mut group = DataGroup::IMAGE;

        let rc = self.exchange(
            DataGroup::CONTROL,
            Dat::XFER_GROUP,
            Msg::GET,
            ptr::from_mut(&mut group).cast(),
            Gate::Unchecked,
        );

        if rc.is_success() {
            group
        } else {
            DataGroup::IMAGE
        }
    }

    fn enter(&mut self, to: DsState, rc: ReturnCode) {
        let id = self.identity.id();
        debug!(source_id = id, from = %self.state, %to, %rc, "Source state transition");

        if to == DsState::Closed {
            CallbackRegistry::global().remove(id);
        }

        self.state = to;
    }

    fn register_callback(&mut self) -> bool {
        let id = self.identity.id();

        if let Ok(ref_con) = usize::try_from(id) {
            let mut callback = Callback2::new(callback_proc, ref_con);
            let rc = self.call(DataGroup::CONTROL, Msg::REGISTER_CALLBACK, &mut callback);

            if rc.is_success() {
                debug!(source_id = id, "Registered Callback2");
                return true;
            }

            debug!(source_id = id, %rc, "Callback2 rejected");
        }

        if let Ok(ref_con) = u32::try_from(id) {
            let mut callback = Callback::new(callback_proc, ref_con);
            let rc = self.call(DataGroup::CONTROL, Msg::REGISTER_CALLBACK, &mut callback);

            if rc.is_success() {
                debug!(source_id = id, "Registered Callback");
                return true;
            }

            debug!(source_id = id, %rc, "Callback rejected");
        }

        false
    }

    fn rollback_open(&mut self) {
        let rc = self.close();

        if !rc.is_success() {
            warn!(source_id = self.identity.id(), %rc, "Failed to close the source while rolling back open");
            CallbackRegistry::global().remove(self.identity.id());
            self.state = DsState::Closed;
        }
    }

    fn absorb_event(&self, event: &Event, uses_callback: bool) {
        let message = event.message();

        if !uses_callback && message.is_readiness() {
            self.signal.store(message);
        }
    }

    fn settle_ready(&mut self, message: Msg) -> ReturnCode {
        debug!(source_id = self.identity.id(), ?message, "Readiness reported");

        match message {
            Msg::XFER_READY => {
                self.enter(DsState::XferReady, ReturnCode::SUCCESS);
                ReturnCode::SUCCESS
            }
            Msg::CLOSE_DS_OK => {
                let rc = self.disable();
                if !rc.is_success() {
                    warn!(source_id = self.identity.id(), %rc, "Failed to disable the source after CloseDsOk");
                }

                ReturnCode::SUCCESS
            }
            Msg::CLOSE_DS_REQ => ReturnCode::CANCEL,
            _ => ReturnCode::FAILURE,
        }
    }
}

impl Drop for Source<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("ui_parent", &self.ui_parent)
            .finish_non_exhaustive()
    }
}

//! Scripted data source manager.
//!
//! The state lives in a thread local, so every test drives its own manager without interference.
//! Identity ids are drawn from a process-wide counter because the callback registry is shared by
//! all threads.

use core::cell::RefCell;
use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use ironscan_app::memory::{self, MemoryHooks};
use ironscan_app::{DsmLibrary, LibraryError};
use ironscan_twain::{
    Callback, Callback2, CallbackProc, ConditionCode, Dat, DataGroup, DsmEntry, EntryPoint, Event, Handle, Identity,
    IdentityId, Memory, MemoryFlags, Msg, PendingXfers, ReturnCode, Status, SupportedGroups,
};

/// Contents of the ICC profile handed out by the mock.
pub const ICC_PROFILE: &[u8] = b"icc-profile";

static NEXT_ID: AtomicU32 = AtomicU32::new(0x0001_0000);

fn next_id() -> IdentityId {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    IdentityId::try_from(id).unwrap_or(IdentityId::MAX)
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::new());
}

struct State {
    trace: Vec<String>,
    script: HashMap<(Dat, Msg), VecDeque<ReturnCode>>,
    installed: Vec<Identity>,
    default_source: usize,
    cursor: usize,
    accept_callback2: bool,
    accept_callback: bool,
    notifier: Option<Notifier>,
    version2: bool,
    pending: u16,
    xfer_group: DataGroup,
    events: VecDeque<Msg>,
    condition: ConditionCode,
}

impl State {
    fn new() -> Self {
        Self {
            trace: Vec::new(),
            script: HashMap::new(),
            installed: Vec::new(),
            default_source: 0,
            cursor: 0,
            accept_callback2: true,
            accept_callback: true,
            notifier: None,
            version2: false,
            pending: 0,
            xfer_group: DataGroup::IMAGE,
            events: VecDeque::new(),
            condition: ConditionCode::SUCCESS,
        }
    }

    fn next(&mut self, dat: Dat, msg: Msg, fallback: ReturnCode) -> ReturnCode {
        self.script
            .get_mut(&(dat, msg))
            .and_then(VecDeque::pop_front)
            .unwrap_or(fallback)
    }

    fn find_installed(&self, request: &Identity) -> Option<Identity> {
        let product = request.product_name();
        let manufacturer = request.manufacturer();

        self.installed
            .iter()
            .find(|installed| {
                installed.product_name() == product
                    && (manufacturer.is_empty() || installed.manufacturer() == manufacturer)
            })
            .copied()
    }

    /// # Safety
    ///
    /// Pointers are the ones passed to `DSM_Entry` by the application side.
    unsafe fn handle(&mut self, origin: *mut Identity, dat: Dat, msg: Msg, data: *mut c_void) -> ReturnCode {
        match (dat, msg) {
            (Dat::PARENT, Msg::OPEN_DSM) => {
                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    // SAFETY: the origin is the application identity, locked for the call.
                    let mut app = unsafe { read::<Identity>(origin.cast()) };
                    app.set_id(next_id());

                    if self.version2 && app.is_app2() {
                        app.set_supported_groups(app.supported_groups() | SupportedGroups::DSM2);
                    }

                    // SAFETY: same as above.
                    unsafe { write(origin.cast(), app) };
                }

                rc
            }
            (Dat::ENTRY_POINT, Msg::GET) => {
                let fallback = if self.version2 {
                    ReturnCode::SUCCESS
                } else {
                    ReturnCode::FAILURE
                };
                let rc = self.next(dat, msg, fallback);

                if rc.is_success() {
                    let entry_point = EntryPoint::with_memory(mock_allocate, mock_free, mock_lock, mock_unlock);
                    // SAFETY: `Dat::ENTRY_POINT` payload.
                    unsafe { write(data, entry_point) };
                }

                rc
            }
            (Dat::IDENTITY, Msg::GET_DEFAULT | Msg::USER_SELECT) => {
                let Some(identity) = self.installed.get(self.default_source).copied() else {
                    self.condition = ConditionCode::NO_DS;
                    return self.next(dat, msg, ReturnCode::FAILURE);
                };

                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    // SAFETY: `Dat::IDENTITY` payload.
                    unsafe { write(data, identity) };
                }

                rc
            }
            (Dat::IDENTITY, Msg::GET_FIRST | Msg::GET_NEXT) => {
                if msg == Msg::GET_FIRST {
                    self.cursor = 0;
                }

                let Some(identity) = self.installed.get(self.cursor).copied() else {
                    return self.next(dat, msg, ReturnCode::END_OF_LIST);
                };

                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    self.cursor += 1;
                    // SAFETY: `Dat::IDENTITY` payload.
                    unsafe { write(data, identity) };
                }

                rc
            }
            (Dat::IDENTITY, Msg::SET) => {
                // SAFETY: `Dat::IDENTITY` payload.
                let request = unsafe { read::<Identity>(data) };

                match self.installed.iter().position(|installed| installed.id() == request.id()) {
                    Some(index) => {
                        let rc = self.next(dat, msg, ReturnCode::SUCCESS);
                        if rc.is_success() {
                            self.default_source = index;
                        }
                        rc
                    }
                    None => self.next(dat, msg, ReturnCode::FAILURE),
                }
            }
            (Dat::IDENTITY, Msg::OPEN_DS) => {
                // SAFETY: `Dat::IDENTITY` payload.
                let request = unsafe { read::<Identity>(data) };

                let Some(identity) = self.find_installed(&request) else {
                    self.condition = ConditionCode::NO_DS;
                    return self.next(dat, msg, ReturnCode::FAILURE);
                };

                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    // SAFETY: `Dat::IDENTITY` payload.
                    unsafe { write(data, identity) };
                }

                rc
            }
            (Dat::IDENTITY, Msg::CLOSE_DS) => {
                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    self.notifier = None;
                }

                rc
            }
            (Dat::CALLBACK2, Msg::REGISTER_CALLBACK) => {
                let fallback = if self.accept_callback2 {
                    ReturnCode::SUCCESS
                } else {
                    ReturnCode::FAILURE
                };
                let rc = self.next(dat, msg, fallback);

                if rc.is_success() {
                    // SAFETY: `Dat::CALLBACK2` payload.
                    let callback = unsafe { read::<Callback2>(data) };
                    self.notifier = callback.proc().map(|proc| Notifier {
                        proc,
                        ref_con: callback.ref_con(),
                        form: Dat::CALLBACK2,
                    });
                }

                rc
            }
            (Dat::CALLBACK, Msg::REGISTER_CALLBACK) => {
                let fallback = if self.accept_callback {
                    ReturnCode::SUCCESS
                } else {
                    ReturnCode::FAILURE
                };
                let rc = self.next(dat, msg, fallback);

                if rc.is_success() {
                    // SAFETY: `Dat::CALLBACK` payload.
                    let callback = unsafe { read::<Callback>(data) };
                    self.notifier = callback.proc().map(|proc| Notifier {
                        proc,
                        ref_con: usize::try_from(callback.ref_con()).unwrap_or(0),
                        form: Dat::CALLBACK,
                    });
                }

                rc
            }
            (Dat::EVENT, Msg::PROCESS_EVENT) => match self.events.pop_front() {
                Some(message) => {
                    // SAFETY: `Dat::EVENT` payload.
                    let mut event = unsafe { read::<Event>(data) };
                    event.set_message(message);
                    // SAFETY: same as above.
                    unsafe { write(data, event) };

                    self.next(dat, msg, ReturnCode::DS_EVENT)
                }
                None => self.next(dat, msg, ReturnCode::NOT_DS_EVENT),
            },
            (Dat::PENDING_XFERS, Msg::END_XFER | Msg::RESET | Msg::GET) => {
                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    self.pending = match msg {
                        Msg::END_XFER => self.pending.saturating_sub(1),
                        Msg::RESET => 0,
                        _ => self.pending,
                    };

                    // SAFETY: `Dat::PENDING_XFERS` payload.
                    unsafe { write(data, PendingXfers::with_count(self.pending)) };
                }

                rc
            }
            (Dat::XFER_GROUP, Msg::GET) => {
                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    // SAFETY: `Dat::XFER_GROUP` payload.
                    unsafe { write(data, self.xfer_group) };
                }

                rc
            }
            (Dat::STATUS, Msg::GET) => {
                // SAFETY: `Dat::STATUS` payload.
                unsafe { write(data, Status::with_condition(self.condition)) };
                self.next(dat, msg, ReturnCode::SUCCESS)
            }
            (Dat::IMAGE_NATIVE_XFER | Dat::AUDIO_NATIVE_XFER, Msg::GET) => {
                let fallback = if dat == Dat::IMAGE_NATIVE_XFER {
                    ReturnCode::XFER_DONE
                } else {
                    ReturnCode::SUCCESS
                };
                let rc = self.next(dat, msg, fallback);

                if rc == ReturnCode::XFER_DONE || rc.is_success() {
                    // SAFETY: native transfers take a pointer to a handle.
                    unsafe { write(data, memory::allocate(16)) };
                }

                rc
            }
            (Dat::ICC_PROFILE, Msg::GET) => {
                let rc = self.next(dat, msg, ReturnCode::SUCCESS);

                if rc.is_success() {
                    let length = u32::try_from(ICC_PROFILE.len()).unwrap_or(u32::MAX);
                    let handle = memory::allocate(length);

                    // SAFETY: freshly allocated with the current hooks.
                    let target = unsafe { memory::lock(handle) };
                    if !target.is_null() {
                        // SAFETY: the block is `ICC_PROFILE.len()` bytes long.
                        unsafe { ptr::copy_nonoverlapping(ICC_PROFILE.as_ptr(), target.cast::<u8>(), ICC_PROFILE.len()) };
                    }
                    // SAFETY: locked above.
                    unsafe { memory::unlock(handle) };

                    let profile = Memory::new(MemoryFlags::APP_OWNS | MemoryFlags::HANDLE, length, handle.as_raw());
                    // SAFETY: `Dat::ICC_PROFILE` payload.
                    unsafe { write(data, profile) };
                }

                rc
            }
            _ => self.next(dat, msg, ReturnCode::SUCCESS),
        }
    }
}

/// # Safety
///
/// `data` must point to a readable `T`.
unsafe fn read<T>(data: *mut c_void) -> T {
    // SAFETY: upheld by the caller, records are packed so no alignment is assumed.
    unsafe { data.cast::<T>().read_unaligned() }
}

/// # Safety
///
/// `data` must point to a writable `T`.
unsafe fn write<T>(data: *mut c_void, value: T) {
    // SAFETY: upheld by the caller.
    unsafe { data.cast::<T>().write_unaligned(value) }
}

unsafe extern "system" fn mock_entry(
    origin: *mut Identity,
    _dest: *mut Identity,
    group: DataGroup,
    dat: Dat,
    msg: Msg,
    data: *mut c_void,
) -> ReturnCode {
    STATE.with_borrow_mut(|state| {
        // SAFETY: the pointers come straight from the application side.
        let rc = unsafe { state.handle(origin, dat, msg, data) };
        state.trace.push(format!("{} {} {} -> {rc}", group_name(group), dat_name(dat), msg_name(msg)));
        rc
    })
}

unsafe extern "system" fn mock_allocate(size: u32) -> Handle {
    MemoryHooks::platform_default().allocate(size)
}

unsafe extern "system" fn mock_free(handle: Handle) {
    // SAFETY: the mock hooks share the platform allocator.
    unsafe { MemoryHooks::platform_default().free(handle) }
}

unsafe extern "system" fn mock_lock(handle: Handle) -> *mut c_void {
    // SAFETY: same as above.
    unsafe { MemoryHooks::platform_default().lock(handle) }
}

unsafe extern "system" fn mock_unlock(handle: Handle) {
    // SAFETY: same as above.
    unsafe { MemoryHooks::platform_default().unlock(handle) }
}

fn record(line: &str) {
    STATE.with_borrow_mut(|state| state.trace.push(line.to_owned()));
}

fn group_name(group: DataGroup) -> String {
    match group {
        DataGroup::CONTROL => "Control".to_owned(),
        DataGroup::IMAGE => "Image".to_owned(),
        DataGroup::AUDIO => "Audio".to_owned(),
        other => format!("{other:?}"),
    }
}

fn dat_name(dat: Dat) -> String {
    let name = match dat {
        Dat::NULL => "Null",
        Dat::CAPABILITY => "Capability",
        Dat::EVENT => "Event",
        Dat::IDENTITY => "Identity",
        Dat::PARENT => "Parent",
        Dat::PENDING_XFERS => "PendingXfers",
        Dat::SETUP_FILE_XFER => "SetupFileXfer",
        Dat::STATUS => "Status",
        Dat::USER_INTERFACE => "UserInterface",
        Dat::XFER_GROUP => "XferGroup",
        Dat::CALLBACK => "Callback",
        Dat::CALLBACK2 => "Callback2",
        Dat::IMAGE_NATIVE_XFER => "ImageNativeXfer",
        Dat::IMAGE_FILE_XFER => "ImageFileXfer",
        Dat::AUDIO_FILE_XFER => "AudioFileXfer",
        Dat::AUDIO_NATIVE_XFER => "AudioNativeXfer",
        Dat::ICC_PROFILE => "IccProfile",
        Dat::ENTRY_POINT => "EntryPoint",
        other => return format!("{other:?}"),
    };

    name.to_owned()
}

fn msg_name(msg: Msg) -> String {
    let name = match msg {
        Msg::NULL => "Null",
        Msg::GET => "Get",
        Msg::GET_DEFAULT => "GetDefault",
        Msg::GET_FIRST => "GetFirst",
        Msg::GET_NEXT => "GetNext",
        Msg::SET => "Set",
        Msg::RESET => "Reset",
        Msg::OPEN_DSM => "OpenDsm",
        Msg::CLOSE_DSM => "CloseDsm",
        Msg::OPEN_DS => "OpenDs",
        Msg::CLOSE_DS => "CloseDs",
        Msg::USER_SELECT => "UserSelect",
        Msg::DISABLE_DS => "DisableDs",
        Msg::ENABLE_DS => "EnableDs",
        Msg::ENABLE_DS_UI_ONLY => "EnableDsUiOnly",
        Msg::PROCESS_EVENT => "ProcessEvent",
        Msg::END_XFER => "EndXfer",
        Msg::REGISTER_CALLBACK => "RegisterCallback",
        other => return format!("{other:?}"),
    };

    name.to_owned()
}

/// Readiness callback registered by the application, callable from any thread.
#[derive(Clone, Copy)]
pub struct Notifier {
    proc: CallbackProc,
    ref_con: usize,
    form: Dat,
}

impl Notifier {
    /// `Dat::CALLBACK2` or `Dat::CALLBACK`, whichever was registered.
    pub fn form(&self) -> Dat {
        self.form
    }

    pub fn ref_con(&self) -> usize {
        self.ref_con
    }

    /// Invokes the callback the way a data source reports `msg`.
    pub fn notify(&self, msg: Msg) -> ReturnCode {
        // SAFETY: the callback only reads the reference constant smuggled through `data`.
        unsafe {
            (self.proc)(
                ptr::null_mut(),
                ptr::null_mut(),
                DataGroup::CONTROL,
                Dat::NULL,
                msg,
                ptr::without_provenance_mut(self.ref_con),
            )
        }
    }
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("ref_con", &self.ref_con)
            .field("form", &self.form)
            .finish_non_exhaustive()
    }
}

/// Handle on the data source manager of the current thread.
///
/// Creating one resets the thread state.
#[derive(Debug)]
pub struct MockDsm {
    _not_send: core::marker::PhantomData<*const ()>,
}

impl MockDsm {
    pub fn install() -> Self {
        STATE.with_borrow_mut(|state| *state = State::new());

        Self {
            _not_send: core::marker::PhantomData,
        }
    }

    /// A library resolving to this manager.
    pub fn library(&self) -> Box<dyn DsmLibrary> {
        Box::new(MockLibrary::default())
    }

    /// Installs a source and returns its identity.
    pub fn add_source(&self, product_name: &str, manufacturer: &str) -> Identity {
        let mut identity = Identity::source_request(product_name, manufacturer);
        identity.set_id(next_id());
        STATE.with_borrow_mut(|state| state.installed.push(identity));
        identity
    }

    /// Makes the installed source at `index` the default one.
    pub fn set_default(&self, index: usize) {
        STATE.with_borrow_mut(|state| state.default_source = index);
    }

    pub fn default_source(&self) -> Identity {
        STATE.with_borrow(|state| state.installed.get(state.default_source).copied().unwrap_or(Identity::empty()))
    }

    /// Queues `rc` as the result of the next `dat`/`msg` call, whatever the mock would have answered.
    pub fn script(&self, dat: Dat, msg: Msg, rc: ReturnCode) {
        STATE.with_borrow_mut(|state| state.script.entry((dat, msg)).or_default().push_back(rc));
    }

    pub fn reject_callbacks(&self, callback2: bool, callback: bool) {
        STATE.with_borrow_mut(|state| {
            state.accept_callback2 = !callback2;
            state.accept_callback = !callback;
        });
    }

    /// Behaves as a version 2 manager: reports `DSM2` and publishes its memory entry points.
    pub fn enable_version2(&self) {
        STATE.with_borrow_mut(|state| state.version2 = true);
    }

    pub fn set_pending(&self, count: u16) {
        STATE.with_borrow_mut(|state| state.pending = count);
    }

    pub fn pending(&self) -> u16 {
        STATE.with_borrow(|state| state.pending)
    }

    pub fn set_xfer_group(&self, group: DataGroup) {
        STATE.with_borrow_mut(|state| state.xfer_group = group);
    }

    pub fn set_condition(&self, condition: ConditionCode) {
        STATE.with_borrow_mut(|state| state.condition = condition);
    }

    /// Makes the next processed event a data source event carrying `msg`.
    pub fn queue_event_message(&self, msg: Msg) {
        STATE.with_borrow_mut(|state| state.events.push_back(msg));
    }

    /// Callback registered by the last opened source.
    pub fn notifier(&self) -> Option<Notifier> {
        STATE.with_borrow(|state| state.notifier)
    }

    /// Calls received so far, one per line.
    pub fn trace(&self) -> String {
        STATE.with_borrow(|state| state.trace.iter().map(|line| format!("{line}\n")).collect())
    }

    /// Same as [`Self::trace`], clearing it.
    pub fn take_trace(&self) -> String {
        let trace = self.trace();
        STATE.with_borrow_mut(|state| state.trace.clear());
        trace
    }
}

/// [`DsmLibrary`] resolving to the scripted manager.
#[derive(Debug, Default)]
pub struct MockLibrary {
    loaded: bool,
    fail_load: bool,
    missing_entry: bool,
}

impl MockLibrary {
    /// A library that cannot be loaded.
    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    /// A library that loads but exposes no entry point.
    pub fn without_entry() -> Self {
        Self {
            missing_entry: true,
            ..Self::default()
        }
    }
}

impl DsmLibrary for MockLibrary {
    fn load(&mut self, prefer_legacy: bool) -> Result<(), LibraryError> {
        if self.fail_load {
            return Err(LibraryError::NotFound {
                candidates: vec![PathBuf::from("libmockdsm.so")],
            });
        }

        record(if prefer_legacy { "library load (legacy)" } else { "library load" });
        self.loaded = true;

        Ok(())
    }

    fn resolve(&self) -> Option<DsmEntry> {
        let entry: DsmEntry = mock_entry;
        (self.loaded && !self.missing_entry).then_some(entry)
    }

    fn unload(&mut self) {
        if self.loaded {
            record("library unload");
            self.loaded = false;
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

use core::cell::Cell;
use core::ffi::c_void;
use core::{fmt, ptr};

use ironscan_twain::{
    Dat, DataGroup, DsmEntry, DsmState, EntryPoint, Handle, Identity, Msg, Payload, ReturnCode, Status,
};
use parking_lot::ReentrantMutex;

use crate::library::{DsmLibrary, LibraryError, NativeDsmLibrary};
use crate::memory::{self, MemoryHooks};
use crate::source::Source;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("data source manager is already loaded (state {0})")]
    WrongState(DsmState),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("data source manager library does not expose a dispatch entry point")]
    MissingEntry,
}

enum RootWindow {
    None,
    Borrowed(Handle),
    #[cfg(windows)]
    Owned(crate::window::NativeWindow),
}

impl RootWindow {
    fn handle(&self) -> Handle {
        match self {
            Self::None => Handle::NULL,
            Self::Borrowed(handle) => *handle,
            #[cfg(windows)]
            Self::Owned(window) => window.handle(),
        }
    }
}

/// Application side of a data source manager session.
///
/// Goes through `PreSession`, `Loaded` and `Open`. Every [`Source`] borrows the manager, so the
/// manager can only be closed or unloaded once all its sources are gone.
pub struct Manager {
    // Locked for the whole duration of a dispatch call: the data source manager writes into it.
    app_identity: ReentrantMutex<Cell<Identity>>,
    state: DsmState,
    library: Box<dyn DsmLibrary>,
    entry: Option<DsmEntry>,
    root_window: RootWindow,
}

impl Manager {
    /// A manager using the data source manager installed on the system.
    pub fn new(app_identity: Identity) -> Self {
        Self::with_library(app_identity, Box::new(NativeDsmLibrary::new()))
    }

    pub fn with_library(app_identity: Identity, library: Box<dyn DsmLibrary>) -> Self {
        Self {
            app_identity: ReentrantMutex::new(Cell::new(app_identity)),
            state: DsmState::PreSession,
            library,
            entry: None,
            root_window: RootWindow::None,
        }
    }

    pub fn state(&self) -> DsmState {
        self.state
    }

    /// Identity of the application, as last updated by the data source manager.
    pub fn identity(&self) -> Identity {
        self.app_identity.lock().get()
    }

    /// Window given to the data source manager on `open`.
    pub fn root_window(&self) -> Handle {
        self.root_window.handle()
    }

    /// Loads the data source manager library and resolves its entry point.
    ///
    /// On failure the state is left as is and nothing stays loaded.
    pub fn load(&mut self, prefer_legacy: bool) -> Result<(), LoadError> {
        if self.state != DsmState::PreSession {
            return Err(LoadError::WrongState(self.state));
        }

        self.library.load(prefer_legacy)?;

        let Some(entry) = self.library.resolve() else {
            self.library.unload();
            return Err(LoadError::MissingEntry);
        };

        self.entry = Some(entry);
        self.enter(DsmState::Loaded);

        Ok(())
    }

    /// Releases the library. Does nothing and returns `false` unless `Loaded`.
    pub fn unload(&mut self) -> bool {
        if self.state != DsmState::Loaded {
            return false;
        }

        self.release();

        true
    }

    /// Opens the data source manager with `root_window` as parent.
    ///
    /// Without a window, a hidden one is created on Windows and owned by the manager.
    pub fn open(&mut self, root_window: Option<Handle>) -> ReturnCode {
        if self.state != DsmState::Loaded {
            return ReturnCode::FAILURE;
        }

        let mut parent = match self.prepare_root_window(root_window) {
            Some(parent) => parent,
            None => return ReturnCode::FAILURE,
        };

        let rc = self.dispatch_parent(Msg::OPEN_DSM, &mut parent);

        if rc.is_success() {
            memory::reset_hooks();

            if self.identity().is_dsm2() {
                self.adopt_memory_hooks();
            }

            self.enter(DsmState::Open);
        } else {
            debug!(%rc, "OpenDsm failed");
        }

        rc
    }

    /// Closes the data source manager. On failure the manager stays `Open`.
    pub fn close(&mut self) -> ReturnCode {
        if self.state != DsmState::Open {
            return ReturnCode::FAILURE;
        }

        let mut parent = self.root_window.handle();
        let rc = self.dispatch_parent(Msg::CLOSE_DSM, &mut parent);

        if rc.is_success() {
            self.enter(DsmState::Loaded);
        } else {
            debug!(%rc, "CloseDsm failed");
        }

        rc
    }

    /// Brings the manager back to `PreSession`, whatever its current state.
    ///
    /// A failure to close is logged and the library is released anyway.
    pub fn cleanup(&mut self) {
        match self.state {
            DsmState::Open => {
                let rc = self.close();
                if !rc.is_success() {
                    warn!(%rc, "Failed to close the data source manager during cleanup");
                }

                self.release();
            }
            DsmState::Loaded => self.release(),
            DsmState::PreSession => {}
        }
    }

    /// A closed source named after a product and its manufacturer.
    ///
    /// Whether it can be opened depends on such a source being installed.
    pub fn create_source(&self, product_name: &str, manufacturer: &str) -> Source<'_> {
        Source::new(self, Identity::source_request(product_name, manufacturer))
    }

    pub fn default_source(&self) -> Result<Source<'_>, ReturnCode> {
        self.query_source(Msg::GET_DEFAULT)
    }

    /// Shows the source selection dialog of the data source manager.
    pub fn show_source_dialog(&self) -> Result<Source<'_>, ReturnCode> {
        self.query_source(Msg::USER_SELECT)
    }

    /// Enumerates the installed sources.
    ///
    /// Returns the collected sources together with the code that ended the enumeration:
    /// `EndOfList` when it ran to completion. Sources collected before a failure are kept.
    pub fn sources(&self) -> (Vec<Source<'_>>, ReturnCode) {
        let mut sources = Vec::new();

        if self.state != DsmState::Open {
            return (sources, ReturnCode::FAILURE);
        }

        let mut identity = Identity::empty();
        let mut rc = self.dispatch_manager(Dat::IDENTITY, Msg::GET_FIRST, &mut identity);

        while rc.is_success() {
            sources.push(Source::new(self, identity));

            identity = Identity::empty();
            rc = self.dispatch_manager(Dat::IDENTITY, Msg::GET_NEXT, &mut identity);
        }

        debug!(count = sources.len(), %rc, "Sources enumerated");

        (sources, rc)
    }

    pub fn set_default_source(&self, source: &Source<'_>) -> ReturnCode {
        if self.state != DsmState::Open {
            return ReturnCode::FAILURE;
        }

        let mut identity = source.identity();
        self.dispatch_manager(Dat::IDENTITY, Msg::SET, &mut identity)
    }

    /// Status of the last manager-level operation.
    pub fn status(&self, status: &mut Status) -> ReturnCode {
        if self.state != DsmState::Open {
            return ReturnCode::FAILURE;
        }

        self.dispatch_manager(Status::DAT, Msg::GET, status)
    }

    /// Issues a dispatch call with the application identity as origin.
    ///
    /// # Safety
    ///
    /// `dest` must be null or point to a live identity and `data` must point to the payload `dat`
    /// expects (or be null where allowed), both for the duration of the call.
    pub(crate) unsafe fn dispatch(
        &self,
        dest: *mut Identity,
        group: DataGroup,
        dat: Dat,
        msg: Msg,
        data: *mut c_void,
    ) -> ReturnCode {
        let Some(entry) = self.entry else {
            return ReturnCode::FAILURE;
        };

        let origin = self.app_identity.lock();

        // SAFETY: the entry stays valid while the library is loaded, `origin` is locked for the
        // call and the rest is upheld by the caller.
        unsafe { entry(origin.as_ptr(), dest, group, dat, msg, data) }
    }

    fn dispatch_manager<P: Payload>(&self, dat: Dat, msg: Msg, data: &mut P) -> ReturnCode {
        debug_assert_eq!(dat, P::DAT);

        // SAFETY: manager-level call, `data` is the payload bound to `dat`.
        unsafe { self.dispatch(ptr::null_mut(), DataGroup::CONTROL, dat, msg, ptr::from_mut(data).cast()) }
    }

    fn dispatch_parent(&self, msg: Msg, parent: &mut Handle) -> ReturnCode {
        // SAFETY: `Dat::PARENT` takes a pointer to the window handle.
        unsafe {
            self.dispatch(
                ptr::null_mut(),
                DataGroup::CONTROL,
                Dat::PARENT,
                msg,
                ptr::from_mut(parent).cast(),
            )
        }
    }

    fn query_source(&self, msg: Msg) -> Result<Source<'_>, ReturnCode> {
        if self.state != DsmState::Open {
            return Err(ReturnCode::FAILURE);
        }

        let mut identity = Identity::empty();
        let rc = self.dispatch_manager(Dat::IDENTITY, msg, &mut identity);

        if rc.is_success() {
            Ok(Source::new(self, identity))
        } else {
            Err(rc)
        }
    }

    fn adopt_memory_hooks(&self) {
        let mut entry_point = EntryPoint::new();
        let rc = self.dispatch_manager(Dat::ENTRY_POINT, Msg::GET, &mut entry_point);

        if !rc.is_success() {
            warn!(%rc, "Version 2 data source manager did not provide its entry points");
            return;
        }

        match MemoryHooks::from_entry_point(&entry_point) {
            Some(hooks) => {
                debug!("Using the memory hooks of the data source manager");
                memory::set_hooks(hooks);
            }
            None => warn!(?entry_point, "Incomplete memory hooks, keeping platform defaults"),
        }
    }

    #[cfg(windows)]
    fn prepare_root_window(&mut self, requested: Option<Handle>) -> Option<Handle> {
        match requested.filter(|handle| !handle.is_null()) {
            Some(handle) => {
                // Replacing an owned window destroys it.
                self.root_window = RootWindow::Borrowed(handle);
            }
            None => {
                if !matches!(self.root_window, RootWindow::Owned(_)) {
                    match crate::window::NativeWindow::create() {
                        Ok(window) => self.root_window = RootWindow::Owned(window),
                        Err(error) => {
                            error!(%error, "Failed to create the root window");
                            return None;
                        }
                    }
                }
            }
        }

        Some(self.root_window.handle())
    }

    #[cfg(not(windows))]
    fn prepare_root_window(&mut self, requested: Option<Handle>) -> Option<Handle> {
        self.root_window = match requested {
            Some(handle) => RootWindow::Borrowed(handle),
            None => RootWindow::None,
        };

        Some(self.root_window.handle())
    }

    /// Unconditional release: root window, entry point, library.
    fn release(&mut self) {
        self.root_window = RootWindow::None;
        self.entry = None;
        self.library.unload();
        self.enter(DsmState::PreSession);
    }

    fn enter(&mut self, to: DsmState) {
        debug!(from = %self.state, %to, "Manager state transition");
        self.state = to;
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("state", &self.state)
            .field("identity", &self.identity())
            .field("root_window", &self.root_window.handle())
            .finish_non_exhaustive()
    }
}

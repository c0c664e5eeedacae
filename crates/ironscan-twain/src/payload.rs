use core::ffi::c_void;
use core::fmt;
use core::ptr;

use bitflags::bitflags;

use crate::{
    CallbackProc, ConditionCode, Dat, DataGroup, DsmEntry, Identity, MemAllocate, MemFree, MemLock, MemUnlock, Msg,
    Str255,
};

/// Record that can be exchanged through the dispatch entry point.
///
/// # Safety
///
/// Implementors must have the exact memory layout the data source manager expects for `DAT`,
/// since a pointer to the value is handed over to native code as is.
pub unsafe trait Payload {
    const DAT: Dat;
}

/// Opaque native handle (`TW_HANDLE`): a window handle, an event pointer, or a memory handle.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(*mut c_void);

// SAFETY: a handle is an opaque token; dereferencing it is always done through native APIs which
// accept calls from any thread.
unsafe impl Send for Handle {}

// SAFETY: same as above, the value itself is never dereferenced on the Rust side.
unsafe impl Sync for Handle {}

impl Handle {
    pub const NULL: Self = Self(ptr::null_mut());

    pub const fn new(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.0)
    }
}

/// `TW_USERINTERFACE`
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct UserInterface {
    show_ui: u16,
    modal_ui: u16,
    parent: Handle,
}

impl UserInterface {
    pub fn new(show_ui: bool, modal_ui: bool, parent: Handle) -> Self {
        Self {
            show_ui: u16::from(show_ui),
            modal_ui: u16::from(modal_ui),
            parent,
        }
    }

    pub fn show_ui(&self) -> bool {
        self.show_ui != 0
    }

    pub fn modal_ui(&self) -> bool {
        self.modal_ui != 0
    }

    pub fn parent(&self) -> Handle {
        self.parent
    }
}

// SAFETY: layout matches `TW_USERINTERFACE`.
unsafe impl Payload for UserInterface {
    const DAT: Dat = Dat::USER_INTERFACE;
}

/// `TW_PENDINGXFERS`
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingXfers {
    count: u16,
    eoj: u32,
}

impl PendingXfers {
    /// The source cannot tell how many transfers remain.
    pub const UNKNOWN_COUNT: u16 = 0xffff;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(count: u16) -> Self {
        Self { count, eoj: 0 }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn set_count(&mut self, count: u16) {
        self.count = count;
    }

    pub fn end_of_job(&self) -> u32 {
        self.eoj
    }
}

// SAFETY: layout matches `TW_PENDINGXFERS`.
unsafe impl Payload for PendingXfers {
    const DAT: Dat = Dat::PENDING_XFERS;
}

/// `TW_EVENT`: a native windowing event forwarded to the source, and the message it yielded.
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct Event {
    event: *mut c_void,
    message: Msg,
}

impl Event {
    pub fn new(event: *mut c_void) -> Self {
        Self {
            event,
            message: Msg::NULL,
        }
    }

    pub fn event(&self) -> *mut c_void {
        self.event
    }

    pub fn message(&self) -> Msg {
        self.message
    }

    pub fn set_message(&mut self, message: Msg) {
        self.message = message;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event", &self.event())
            .field("message", &self.message())
            .finish()
    }
}

// SAFETY: layout matches `TW_EVENT`.
unsafe impl Payload for Event {
    const DAT: Dat = Dat::EVENT;
}

/// `TW_STATUS`
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    condition_code: ConditionCode,
    data: u16,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(condition_code: ConditionCode) -> Self {
        Self { condition_code, data: 0 }
    }

    pub fn condition_code(&self) -> ConditionCode {
        self.condition_code
    }

    pub fn data(&self) -> u16 {
        self.data
    }
}

// SAFETY: layout matches `TW_STATUS`.
unsafe impl Payload for Status {
    const DAT: Dat = Dat::STATUS;
}

/// `TW_CALLBACK`
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct Callback {
    proc: Option<CallbackProc>,
    ref_con: u32,
    message: i16,
}

impl Callback {
    pub fn new(proc: CallbackProc, ref_con: u32) -> Self {
        Self {
            proc: Some(proc),
            ref_con,
            message: 0,
        }
    }

    pub fn proc(&self) -> Option<CallbackProc> {
        self.proc
    }

    pub fn ref_con(&self) -> u32 {
        self.ref_con
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("registered", &self.proc().is_some())
            .field("ref_con", &self.ref_con())
            .finish()
    }
}

// SAFETY: layout matches `TW_CALLBACK`.
unsafe impl Payload for Callback {
    const DAT: Dat = Dat::CALLBACK;
}

/// `TW_CALLBACK2`, whose reference constant is pointer sized.
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct Callback2 {
    proc: Option<CallbackProc>,
    ref_con: usize,
    message: i16,
}

impl Callback2 {
    pub fn new(proc: CallbackProc, ref_con: usize) -> Self {
        Self {
            proc: Some(proc),
            ref_con,
            message: 0,
        }
    }

    pub fn proc(&self) -> Option<CallbackProc> {
        self.proc
    }

    pub fn ref_con(&self) -> usize {
        self.ref_con
    }
}

impl fmt::Debug for Callback2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback2")
            .field("registered", &self.proc().is_some())
            .field("ref_con", &self.ref_con())
            .finish()
    }
}

// SAFETY: layout matches `TW_CALLBACK2`.
unsafe impl Payload for Callback2 {
    const DAT: Dat = Dat::CALLBACK2;
}

/// `TW_ENTRYPOINT`, handed out by version 2 managers.
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct EntryPoint {
    size: u32,
    dsm_entry: Option<DsmEntry>,
    mem_allocate: Option<MemAllocate>,
    mem_free: Option<MemFree>,
    mem_lock: Option<MemLock>,
    mem_unlock: Option<MemUnlock>,
}

impl EntryPoint {
    pub fn new() -> Self {
        let size = u32::try_from(size_of::<Self>()).unwrap_or(u32::MAX);

        Self {
            size,
            dsm_entry: None,
            mem_allocate: None,
            mem_free: None,
            mem_lock: None,
            mem_unlock: None,
        }
    }

    pub fn with_memory(
        mem_allocate: MemAllocate,
        mem_free: MemFree,
        mem_lock: MemLock,
        mem_unlock: MemUnlock,
    ) -> Self {
        Self {
            mem_allocate: Some(mem_allocate),
            mem_free: Some(mem_free),
            mem_lock: Some(mem_lock),
            mem_unlock: Some(mem_unlock),
            ..Self::new()
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn dsm_entry(&self) -> Option<DsmEntry> {
        self.dsm_entry
    }

    pub fn mem_allocate(&self) -> Option<MemAllocate> {
        self.mem_allocate
    }

    pub fn mem_free(&self) -> Option<MemFree> {
        self.mem_free
    }

    pub fn mem_lock(&self) -> Option<MemLock> {
        self.mem_lock
    }

    pub fn mem_unlock(&self) -> Option<MemUnlock> {
        self.mem_unlock
    }
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("size", &self.size())
            .field("dsm_entry", &self.dsm_entry().is_some())
            .field("memory", &self.mem_allocate().is_some())
            .finish_non_exhaustive()
    }
}

// SAFETY: layout matches `TW_ENTRYPOINT`.
unsafe impl Payload for EntryPoint {
    const DAT: Dat = Dat::ENTRY_POINT;
}

bitflags! {
    /// `TWMF_*` flags of a [`Memory`] record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryFlags: u32 {
        const APP_OWNS = 0x0001;
        const DSM_OWNS = 0x0002;
        const DS_OWNS = 0x0004;
        const POINTER = 0x0008;
        const HANDLE = 0x0010;

        const _ = !0;
    }
}

/// `TW_MEMORY`
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct Memory {
    flags: u32,
    length: u32,
    the_mem: *mut c_void,
}

impl Memory {
    pub fn new(flags: MemoryFlags, length: u32, the_mem: *mut c_void) -> Self {
        Self {
            flags: flags.bits(),
            length,
            the_mem,
        }
    }

    pub fn flags(&self) -> MemoryFlags {
        MemoryFlags::from_bits_retain(self.flags)
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn the_mem(&self) -> *mut c_void {
        self.the_mem
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(MemoryFlags::empty(), 0, ptr::null_mut())
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("flags", &self.flags())
            .field("length", &self.length())
            .field("the_mem", &self.the_mem())
            .finish()
    }
}

/// `TW_MEMORY` holding an ICC profile (`DAT_ICCPROFILE`).
///
/// On success the block is owned by the application and must be released with the
/// memory hooks of the session.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default)]
pub struct IccProfileMemory(pub Memory);

// SAFETY: a transparent wrapper around `TW_MEMORY`.
unsafe impl Payload for IccProfileMemory {
    const DAT: Dat = Dat::ICC_PROFILE;
}

/// `TWFF_*` file formats.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileFormat(u16);

impl FileFormat {
    pub const TIFF: Self = Self(0);
    pub const PICT: Self = Self(1);
    pub const BMP: Self = Self(2);
    pub const XBM: Self = Self(3);
    pub const JFIF: Self = Self(4);
    pub const FPX: Self = Self(5);
    pub const TIFF_MULTI: Self = Self(6);
    pub const PNG: Self = Self(7);
    pub const SPIFF: Self = Self(8);
    pub const EXIF: Self = Self(9);
    pub const PDF: Self = Self(10);
    pub const JP2: Self = Self(11);
    pub const JPX: Self = Self(13);
    pub const DEJAVU: Self = Self(14);
    pub const PDFA: Self = Self(15);
    pub const PDFA2: Self = Self(16);
    pub const PDFRASTER: Self = Self(17);

    // Audio formats share the field.
    pub const WAV: Self = Self(0);
    pub const AIFF: Self = Self(1);
    pub const AU: Self = Self(3);
    pub const SND: Self = Self(4);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

/// `TW_SETUPFILEXFER`
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupFileXfer {
    file_name: Str255,
    format: FileFormat,
    vref_num: i16,
}

impl SetupFileXfer {
    /// `TWON_DONTCARE16`, the volume reference is only meaningful on classic macOS.
    pub const DONT_CARE_VREF: i16 = -1;

    pub fn new(file_name: &str, format: FileFormat) -> Self {
        Self {
            file_name: Str255::new(file_name),
            format,
            vref_num: Self::DONT_CARE_VREF,
        }
    }

    pub fn file_name(&self) -> Str255 {
        self.file_name
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

// SAFETY: layout matches `TW_SETUPFILEXFER`.
unsafe impl Payload for SetupFileXfer {
    const DAT: Dat = Dat::SETUP_FILE_XFER;
}

// SAFETY: `TW_UINT32` group mask used by `DAT_XFERGROUP`.
unsafe impl Payload for DataGroup {
    const DAT: Dat = Dat::XFER_GROUP;
}

// SAFETY: layout matches `TW_IDENTITY`.
unsafe impl Payload for Identity {
    const DAT: Dat = Dat::IDENTITY;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_interface_flags() {
        let ui = UserInterface::new(true, false, Handle::NULL);
        assert!(ui.show_ui());
        assert!(!ui.modal_ui());
        assert!(ui.parent().is_null());
    }

    #[test]
    fn entry_point_reports_its_size() {
        let entry = EntryPoint::new();
        assert_eq!(usize::try_from(entry.size()).ok(), Some(size_of::<EntryPoint>()));
        assert!(entry.mem_allocate().is_none());
    }

    #[test]
    fn memory_flags_round_trip_unknown_bits() {
        let memory = Memory::new(MemoryFlags::from_bits_retain(0x8000_0011), 4, ptr::null_mut());
        assert!(memory.flags().contains(MemoryFlags::APP_OWNS | MemoryFlags::HANDLE));
    }
}

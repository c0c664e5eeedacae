#![doc = include_str!("../README.md")]
#![doc(html_logo_url = "https://cdnweb.devolutions.net/images/projects/devolutions/logos/devolutions-icon-shadow.svg")]

mod addressing;
mod codes;
mod identity;
mod payload;
mod state;
mod strings;

use core::ffi::c_void;

pub use self::addressing::{Dat, DataGroup, Msg, SupportedGroups};
pub use self::codes::{ConditionCode, ReturnCode};
pub use self::identity::{Identity, IdentityId, Version};
pub use self::payload::{
    Callback, Callback2, EntryPoint, Event, FileFormat, Handle, IccProfileMemory, Memory, MemoryFlags, Payload,
    PendingXfers, SetupFileXfer, Status, UserInterface,
};
pub use self::state::{DsState, DsmState};
pub use self::strings::{FixedStr, Str255, Str32};

/// Major protocol version spoken by this implementation.
pub const PROTOCOL_MAJOR: u16 = 2;

/// Minor protocol version spoken by this implementation.
pub const PROTOCOL_MINOR: u16 = 3;

/// The single dispatch entry point exported by the data source manager (`DSM_Entry`).
///
/// `dest` is null for manager-level exchanges and points at the source identity otherwise.
pub type DsmEntry = unsafe extern "system" fn(
    origin: *mut Identity,
    dest: *mut Identity,
    group: DataGroup,
    dat: Dat,
    msg: Msg,
    data: *mut c_void,
) -> ReturnCode;

/// Asynchronous notification procedure registered with `Dat::CALLBACK`/`Dat::CALLBACK2`.
///
/// It shares the shape of [`DsmEntry`]: the data source manager calls it with the readiness message
/// and the registered reference constant in place of the data pointer.
pub type CallbackProc = DsmEntry;

/// `DSM_MemAllocate`.
pub type MemAllocate = unsafe extern "system" fn(size: u32) -> Handle;

/// `DSM_MemFree`.
pub type MemFree = unsafe extern "system" fn(handle: Handle);

/// `DSM_MemLock`.
pub type MemLock = unsafe extern "system" fn(handle: Handle) -> *mut c_void;

/// `DSM_MemUnlock`.
pub type MemUnlock = unsafe extern "system" fn(handle: Handle);

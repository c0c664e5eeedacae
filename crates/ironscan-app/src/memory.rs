//! Memory shared with the data source.
//!
//! Blocks handed over by a data source (native transfers, ICC profiles) must be released with the
//! allocator the data source manager expects. Version 2 managers publish their allocator through
//! `Dat::ENTRY_POINT`; older ones use the platform allocator. The hooks are process-wide, like the
//! data source manager itself.

use core::ffi::c_void;
use core::{fmt, slice};
use std::sync::OnceLock;

use ironscan_twain::{EntryPoint, Handle, MemAllocate, MemFree, MemLock, MemUnlock, Memory, MemoryFlags};
use parking_lot::RwLock;

#[derive(Clone, Copy)]
pub struct MemoryHooks {
    allocate: MemAllocate,
    free: MemFree,
    lock: MemLock,
    unlock: MemUnlock,
}

impl MemoryHooks {
    pub fn new(allocate: MemAllocate, free: MemFree, lock: MemLock, unlock: MemUnlock) -> Self {
        Self {
            allocate,
            free,
            lock,
            unlock,
        }
    }

    /// Hooks published by a version 2 manager, if all four are present.
    pub fn from_entry_point(entry_point: &EntryPoint) -> Option<Self> {
        Some(Self::new(
            entry_point.mem_allocate()?,
            entry_point.mem_free()?,
            entry_point.mem_lock()?,
            entry_point.mem_unlock()?,
        ))
    }

    pub fn platform_default() -> Self {
        Self::new(platform::allocate, platform::free, platform::lock, platform::unlock)
    }

    /// Allocates `size` bytes. Returns a null handle on exhaustion.
    pub fn allocate(&self, size: u32) -> Handle {
        // SAFETY: the hooks come either from the platform or from the data source manager, both
        // accept any size.
        unsafe { (self.allocate)(size) }
    }

    /// # Safety
    ///
    /// `handle` must come from this allocator and must not be used afterwards.
    pub unsafe fn free(&self, handle: Handle) {
        // SAFETY: upheld by the caller.
        unsafe { (self.free)(handle) }
    }

    /// # Safety
    ///
    /// `handle` must be a live handle from this allocator.
    pub unsafe fn lock(&self, handle: Handle) -> *mut c_void {
        // SAFETY: upheld by the caller.
        unsafe { (self.lock)(handle) }
    }

    /// # Safety
    ///
    /// `handle` must have been locked with [`Self::lock`].
    pub unsafe fn unlock(&self, handle: Handle) {
        // SAFETY: upheld by the caller.
        unsafe { (self.unlock)(handle) }
    }
}

impl fmt::Debug for MemoryHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHooks").finish_non_exhaustive()
    }
}

fn hooks_slot() -> &'static RwLock<MemoryHooks> {
    static HOOKS: OnceLock<RwLock<MemoryHooks>> = OnceLock::new();
    HOOKS.get_or_init(|| RwLock::new(MemoryHooks::platform_default()))
}

pub fn hooks() -> MemoryHooks {
    *hooks_slot().read()
}

pub fn set_hooks(hooks: MemoryHooks) {
    *hooks_slot().write() = hooks;
}

pub fn reset_hooks() {
    set_hooks(MemoryHooks::platform_default());
}

/// Allocates `size` bytes with the current hooks. Returns a null handle on exhaustion.
pub fn allocate(size: u32) -> Handle {
    hooks().allocate(size)
}

/// Releases `handle` with the current hooks.
///
/// # Safety
///
/// `handle` must come from the current allocator and must not be used afterwards.
pub unsafe fn free(handle: Handle) {
    // SAFETY: upheld by the caller.
    unsafe { hooks().free(handle) }
}

/// Locks `handle` with the current hooks.
///
/// # Safety
///
/// `handle` must be a live handle from the current allocator.
pub unsafe fn lock(handle: Handle) -> *mut c_void {
    // SAFETY: upheld by the caller.
    unsafe { hooks().lock(handle) }
}

/// Unlocks `handle` with the current hooks.
///
/// # Safety
///
/// `handle` must have been locked with [`lock`].
pub unsafe fn unlock(handle: Handle) {
    // SAFETY: upheld by the caller.
    unsafe { hooks().unlock(handle) }
}

/// A memory handle owned by the application, released exactly once on drop.
pub struct NativeHandle(Handle);

impl NativeHandle {
    /// Takes ownership of a handle allocated by the data source. Returns `None` for a null handle.
    ///
    /// # Safety
    ///
    /// The handle must have been allocated with the current hooks and handed over to the
    /// application.
    pub unsafe fn from_raw(handle: Handle) -> Option<Self> {
        (!handle.is_null()).then_some(Self(handle))
    }

    pub fn as_raw(&self) -> Handle {
        self.0
    }

    /// Gives the handle back without releasing it.
    pub fn into_raw(self) -> Handle {
        let handle = self.0;
        core::mem::forget(self);
        handle
    }

    /// Locks the handle for reading `len` bytes.
    ///
    /// # Safety
    ///
    /// The block behind the handle must be at least `len` bytes long.
    pub unsafe fn lock(&self, len: usize) -> Option<Locked<'_>> {
        // SAFETY: the handle is owned and alive.
        let data = unsafe { lock(self.0) };

        (!data.is_null()).then_some(Locked {
            handle: Some(self.0),
            data,
            len,
            _owner: core::marker::PhantomData,
        })
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        trace!(handle = ?self.0, "Releasing native handle");
        // SAFETY: the handle is owned and released only here.
        unsafe { free(self.0) };
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeHandle").field(&self.0).finish()
    }
}

/// A locked view over application-owned memory, unlocked on drop.
pub struct Locked<'a> {
    handle: Option<Handle>,
    data: *mut c_void,
    len: usize,
    _owner: core::marker::PhantomData<&'a ()>,
}

impl Locked<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `data` points to at least `len` bytes for the lifetime of the lock.
        unsafe { slice::from_raw_parts(self.data.cast::<u8>(), self.len) }
    }
}

impl Drop for Locked<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle {
            // SAFETY: the handle was locked in `NativeHandle::lock` or `OwnedMemory::lock`.
            unsafe { unlock(handle) };
        }
    }
}

/// A `TW_MEMORY` block handed over to the application, released exactly once on drop.
pub struct OwnedMemory(Memory);

impl OwnedMemory {
    /// Takes ownership of a block handed over by the data source. Returns `None` for a null block.
    ///
    /// # Safety
    ///
    /// `memory` must describe a live block allocated with the current hooks and owned by the
    /// application.
    pub unsafe fn from_raw(memory: Memory) -> Option<Self> {
        (!memory.the_mem().is_null()).then_some(Self(memory))
    }

    pub fn flags(&self) -> MemoryFlags {
        self.0.flags()
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.0.length()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.0.length() == 0
    }

    pub fn lock(&self) -> Option<Locked<'_>> {
        let the_mem = self.0.the_mem();

        if self.flags().contains(MemoryFlags::HANDLE) {
            let handle = Handle::new(the_mem);
            // SAFETY: the block is owned and alive.
            let data = unsafe { lock(handle) };

            (!data.is_null()).then_some(Locked {
                handle: Some(handle),
                data,
                len: self.len(),
                _owner: core::marker::PhantomData,
            })
        } else {
            Some(Locked {
                handle: None,
                data: the_mem,
                len: self.len(),
                _owner: core::marker::PhantomData,
            })
        }
    }
}

impl Drop for OwnedMemory {
    fn drop(&mut self) {
        // SAFETY: the block is owned and released only here.
        unsafe { free(Handle::new(self.0.the_mem())) };
    }
}

impl fmt::Debug for OwnedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedMemory").field(&self.0).finish()
    }
}

#[cfg(not(windows))]
mod platform {
    use core::ffi::c_void;

    use ironscan_twain::Handle;

    pub(super) unsafe extern "system" fn allocate(size: u32) -> Handle {
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        // SAFETY: `malloc` accepts any size and reports exhaustion with a null pointer.
        Handle::new(unsafe { libc::malloc(size) })
    }

    pub(super) unsafe extern "system" fn free(handle: Handle) {
        // SAFETY: the handle was returned by `allocate`.
        unsafe { libc::free(handle.as_raw()) }
    }

    pub(super) unsafe extern "system" fn lock(handle: Handle) -> *mut c_void {
        handle.as_raw()
    }

    pub(super) unsafe extern "system" fn unlock(_handle: Handle) {}
}

#[cfg(windows)]
mod platform {
    use core::ffi::c_void;

    use ironscan_twain::Handle;
    use windows::Win32::Foundation::HGLOBAL;
    use windows::Win32::System::Memory::{GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock, GHND};

    pub(super) unsafe extern "system" fn allocate(size: u32) -> Handle {
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        // SAFETY: `GlobalAlloc` reports exhaustion as an error, turned into a null handle.
        match unsafe { GlobalAlloc(GHND, size) } {
            Ok(handle) => Handle::new(handle.0),
            Err(error) => {
                error!(%error, size, "GlobalAlloc failed");
                Handle::NULL
            }
        }
    }

    pub(super) unsafe extern "system" fn free(handle: Handle) {
        // SAFETY: the handle was returned by `allocate`.
        if let Err(error) = unsafe { GlobalFree(Some(HGLOBAL(handle.as_raw()))) } {
            error!(%error, "GlobalFree failed");
        }
    }

    pub(super) unsafe extern "system" fn lock(handle: Handle) -> *mut c_void {
        // SAFETY: the handle was returned by `allocate`.
        unsafe { GlobalLock(HGLOBAL(handle.as_raw())) }
    }

    pub(super) unsafe extern "system" fn unlock(handle: Handle) {
        // SAFETY: the handle was locked by `lock`.
        let _ = unsafe { GlobalUnlock(HGLOBAL(handle.as_raw())) };
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static FREED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "system" fn counting_free(handle: Handle) {
        FREED.fetch_add(1, Ordering::SeqCst);
        // SAFETY: allocated by the platform allocator in the test below.
        unsafe { MemoryHooks::platform_default().free(handle) }
    }

    #[test]
    fn owned_blocks_are_released_once() {
        let default = MemoryHooks::platform_default();
        set_hooks(MemoryHooks::new(default.allocate, counting_free, default.lock, default.unlock));

        let handle = allocate(16);
        // SAFETY: freshly allocated with the current hooks.
        let owned = unsafe { NativeHandle::from_raw(handle) }.unwrap();
        drop(owned);

        // SAFETY: a null handle is never owned.
        assert!(unsafe { NativeHandle::from_raw(Handle::NULL) }.is_none());

        let block = allocate(4);
        // SAFETY: same as above, handed over as a handle.
        let memory = unsafe { OwnedMemory::from_raw(Memory::new(MemoryFlags::APP_OWNS | MemoryFlags::HANDLE, 4, block.as_raw())) }
            .unwrap();
        assert_eq!(memory.len(), 4);
        assert_eq!(memory.lock().map(|locked| locked.as_bytes().len()), Some(4));
        drop(memory);

        assert_eq!(FREED.load(Ordering::SeqCst), 2);
        reset_hooks();
    }
}

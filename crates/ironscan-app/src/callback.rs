use core::ffi::c_void;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, TryReserveError};
use std::sync::{Arc, OnceLock, Weak};

use ironscan_twain::{Dat, DataGroup, Identity, IdentityId, Msg, ReturnCode};
use parking_lot::Mutex;

use crate::signal::ReadySignal;

/// Process-wide map from a source identity id to the readiness signal of the open session.
///
/// The native callback carries nothing but the id, so this is the only way back to the session.
/// Entries are weak: a session dropped without closing can never be reached through a stale entry.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    inner: Mutex<HashMap<IdentityId, Weak<ReadySignal>>>,
}

impl CallbackRegistry {
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<CallbackRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::default)
    }

    pub(crate) fn insert(&self, id: IdentityId, signal: &Arc<ReadySignal>) -> Result<(), TryReserveError> {
        let mut inner = self.inner.lock();
        inner.try_reserve(1)?;

        match inner.entry(id) {
            Entry::Occupied(mut entry) => {
                warn!(source_id = id, "Replacing stale callback registration");
                entry.insert(Arc::downgrade(signal));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(signal));
            }
        }

        Ok(())
    }

    pub(crate) fn remove(&self, id: IdentityId) -> bool {
        self.inner.lock().remove(&id).is_some()
    }

    #[cfg_attr(feature = "__test", visibility::make(pub))]
    pub(crate) fn lookup(&self, id: IdentityId) -> Option<Arc<ReadySignal>> {
        self.inner.lock().get(&id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.inner.lock().contains_key(&id)
    }

    /// Whether `id` is registered and bound to this very signal.
    pub(crate) fn is_bound(&self, id: IdentityId, signal: &Arc<ReadySignal>) -> bool {
        self.inner
            .lock()
            .get(&id)
            .is_some_and(|registered| Weak::ptr_eq(registered, &Arc::downgrade(signal)))
    }
}

/// Procedure registered with `Dat::CALLBACK2` and `Dat::CALLBACK`.
///
/// The reference constant given at registration, the source identity id, comes back as the data
/// pointer.
pub(crate) unsafe extern "system" fn callback_proc(
    _origin: *mut Identity,
    _dest: *mut Identity,
    _group: DataGroup,
    _dat: Dat,
    msg: Msg,
    data: *mut c_void,
) -> ReturnCode {
    if !(msg.is_readiness() || msg == Msg::NULL) {
        return ReturnCode::FAILURE;
    }

    let Ok(id) = IdentityId::try_from(data.addr()) else {
        return ReturnCode::FAILURE;
    };

    let Some(signal) = CallbackRegistry::global().lookup(id) else {
        debug!(source_id = id, ?msg, "Readiness notification for an unknown source");
        return ReturnCode::FAILURE;
    };

    trace!(source_id = id, ?msg, "Readiness notification");
    signal.post(msg);

    ReturnCode::SUCCESS
}

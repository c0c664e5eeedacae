#![allow(clippy::missing_panics_doc, reason = "test helpers")]
#![allow(clippy::panic, reason = "test helpers")]

mod mock;

use ironscan_app::Manager;
use ironscan_twain::{DsmState, Identity, ReturnCode, SupportedGroups, Version};

pub use self::mock::{MockDsm, MockLibrary, Notifier, ICC_PROFILE};

/// Identity of the test application.
pub fn app_identity() -> Identity {
    Identity::application(
        Version::new(1, 0, "ironscan tests"),
        SupportedGroups::IMAGE,
        "Devolutions",
        "ironscan",
        "testsuite",
    )
}

/// A manager loaded from `dsm` and opened without a parent window.
pub fn open_manager(dsm: &MockDsm) -> Manager {
    let mut manager = Manager::with_library(app_identity(), dsm.library());

    if let Err(error) = manager.load(false) {
        panic!("mock library failed to load: {error}");
    }

    assert_eq!(manager.open(None), ReturnCode::SUCCESS);
    assert_eq!(manager.state(), DsmState::Open);

    manager
}

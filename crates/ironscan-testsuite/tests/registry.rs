use ironscan_app::CallbackRegistry;
use ironscan_testsuite::{open_manager, MockDsm};
use ironscan_twain::{DsState, Handle, Msg, ReturnCode, UserInterface};

fn ui() -> UserInterface {
    UserInterface::new(false, false, Handle::NULL)
}

#[test]
fn callbacks_reach_their_own_session() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.add_source("Camera", "Initech");
    let manager = open_manager(&dsm);

    let mut flatbed = manager.create_source("Flatbed", "Acme");
    assert_eq!(flatbed.open(), ReturnCode::SUCCESS);
    let flatbed_notifier = dsm.notifier().unwrap();

    let mut camera = manager.create_source("Camera", "Initech");
    assert_eq!(camera.open(), ReturnCode::SUCCESS);
    let camera_notifier = dsm.notifier().unwrap();

    assert_ne!(flatbed.identity().id(), camera.identity().id());
    assert_ne!(flatbed_notifier.ref_con(), camera_notifier.ref_con());

    assert_eq!(flatbed.enable(ui(), false), ReturnCode::SUCCESS);
    assert_eq!(camera.enable(ui(), false), ReturnCode::SUCCESS);

    assert_eq!(camera_notifier.notify(Msg::XFER_READY), ReturnCode::SUCCESS);

    let mut raw = 0u64;
    assert_eq!(
        flatbed.process_event(core::ptr::from_mut(&mut raw).cast()),
        ReturnCode::NOT_DS_EVENT
    );
    assert_eq!(flatbed.state(), DsState::Enabled);

    assert_eq!(camera.wait_ready(), ReturnCode::SUCCESS);
    assert_eq!(camera.state(), DsState::XferReady);
}

#[test]
fn registration_follows_the_session() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    let registry = CallbackRegistry::global();

    assert_eq!(source.open(), ReturnCode::SUCCESS);
    let id = source.identity().id();
    assert!(registry.lookup(id).is_some());

    assert_eq!(source.close(), ReturnCode::SUCCESS);
    assert!(registry.lookup(id).is_none());
    assert!(!source.uses_callback());

    assert_eq!(source.open(), ReturnCode::SUCCESS);
    assert!(source.uses_callback());
    assert!(registry.contains(id));
}

#[test]
fn signal_found_through_the_registry_wakes_the_session() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    assert_eq!(source.enable(ui(), false), ReturnCode::SUCCESS);

    let signal = CallbackRegistry::global().lookup(source.identity().id()).unwrap();
    signal.post(Msg::XFER_READY);
    drop(signal);

    assert_eq!(source.wait_ready(), ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::XferReady);
}

#[test]
fn notifications_outside_readiness_are_ignored() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    let notifier = dsm.notifier().unwrap();

    assert_eq!(notifier.notify(Msg::DEVICE_EVENT), ReturnCode::FAILURE);

    let signal = CallbackRegistry::global().lookup(source.identity().id()).unwrap();
    assert_eq!(signal.peek(), Msg::NULL);
}

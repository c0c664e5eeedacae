use expect_test::expect;
use ironscan_app::{LibraryError, LoadError, Manager};
use ironscan_testsuite::{app_identity, open_manager, MockDsm, MockLibrary};
use ironscan_twain::{ConditionCode, Dat, DsmState, Msg, ReturnCode, Status};

#[test]
fn full_lifecycle() {
    let dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), dsm.library());
    assert_eq!(manager.state(), DsmState::PreSession);

    manager.load(false).unwrap();
    assert_eq!(manager.state(), DsmState::Loaded);

    assert_eq!(manager.open(None), ReturnCode::SUCCESS);
    assert_eq!(manager.state(), DsmState::Open);
    assert_ne!(manager.identity().id(), 0);

    assert_eq!(manager.close(), ReturnCode::SUCCESS);
    assert_eq!(manager.state(), DsmState::Loaded);

    assert!(manager.unload());
    assert_eq!(manager.state(), DsmState::PreSession);

    expect![[r#"
        library load
        Control Parent OpenDsm -> Success
        Control Parent CloseDsm -> Success
        library unload
    "#]]
    .assert_eq(&dsm.take_trace());

    drop(manager);
    assert_eq!(dsm.trace(), "");
}

#[test]
fn legacy_preference_is_forwarded_to_the_library() {
    let dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), dsm.library());

    manager.load(true).unwrap();

    expect![[r#"
        library load (legacy)
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn load_twice_is_rejected() {
    let dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), dsm.library());
    manager.load(false).unwrap();

    let error = manager.load(false).unwrap_err();

    assert!(matches!(error, LoadError::WrongState(DsmState::Loaded)));
    assert_eq!(manager.state(), DsmState::Loaded);
}

#[test]
fn library_failure_leaves_pre_session() {
    let _dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), Box::new(MockLibrary::failing()));

    let error = manager.load(false).unwrap_err();

    assert!(matches!(error, LoadError::Library(LibraryError::NotFound { .. })));
    assert_eq!(manager.state(), DsmState::PreSession);
    assert_eq!(manager.open(None), ReturnCode::FAILURE);
}

#[test]
fn missing_entry_point_releases_the_library() {
    let dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), Box::new(MockLibrary::without_entry()));

    let error = manager.load(false).unwrap_err();

    assert!(matches!(error, LoadError::MissingEntry));
    assert_eq!(manager.state(), DsmState::PreSession);
    expect![[r#"
        library load
        library unload
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn unload_requires_loaded() {
    let dsm = MockDsm::install();
    let mut manager = Manager::with_library(app_identity(), dsm.library());
    assert!(!manager.unload());

    let mut manager = open_manager(&dsm);
    assert!(!manager.unload());
    assert_eq!(manager.state(), DsmState::Open);
}

#[test]
fn failed_open_stays_loaded() {
    let dsm = MockDsm::install();
    dsm.script(Dat::PARENT, Msg::OPEN_DSM, ReturnCode::FAILURE);
    let mut manager = Manager::with_library(app_identity(), dsm.library());
    manager.load(false).unwrap();

    assert_eq!(manager.open(None), ReturnCode::FAILURE);
    assert_eq!(manager.state(), DsmState::Loaded);

    assert_eq!(manager.open(None), ReturnCode::SUCCESS);
    assert_eq!(manager.state(), DsmState::Open);
}

#[test]
fn failed_close_stays_open() {
    let dsm = MockDsm::install();
    let mut manager = open_manager(&dsm);
    dsm.script(Dat::PARENT, Msg::CLOSE_DSM, ReturnCode::FAILURE);

    assert_eq!(manager.close(), ReturnCode::FAILURE);
    assert_eq!(manager.state(), DsmState::Open);
}

#[test]
fn operations_require_open() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let mut manager = Manager::with_library(app_identity(), dsm.library());
    manager.load(false).unwrap();
    dsm.take_trace();

    assert_eq!(manager.close(), ReturnCode::FAILURE);
    assert_eq!(manager.default_source().unwrap_err(), ReturnCode::FAILURE);
    assert_eq!(manager.show_source_dialog().unwrap_err(), ReturnCode::FAILURE);
    assert_eq!(manager.status(&mut Status::new()), ReturnCode::FAILURE);

    let (sources, rc) = manager.sources();
    assert!(sources.is_empty());
    assert_eq!(rc, ReturnCode::FAILURE);

    assert_eq!(dsm.trace(), "");
}

#[test]
fn version_2_manager_publishes_its_entry_points() {
    let dsm = MockDsm::install();
    dsm.enable_version2();

    let manager = open_manager(&dsm);

    assert!(manager.identity().is_dsm2());
    expect![[r#"
        library load
        Control Parent OpenDsm -> Success
        Control EntryPoint Get -> Success
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn version_2_manager_without_entry_points_still_opens() {
    let dsm = MockDsm::install();
    dsm.enable_version2();
    dsm.script(Dat::ENTRY_POINT, Msg::GET, ReturnCode::FAILURE);

    let manager = open_manager(&dsm);

    assert_eq!(manager.state(), DsmState::Open);
}

#[test]
fn sources_are_enumerated_to_the_end_of_the_list() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.add_source("Sheetfed", "Acme");
    dsm.add_source("Camera", "Initech");
    let manager = open_manager(&dsm);

    let (sources, rc) = manager.sources();

    assert_eq!(rc, ReturnCode::END_OF_LIST);
    let names: Vec<String> = sources
        .iter()
        .map(|source| source.identity().product_name().to_string_lossy())
        .collect();
    assert_eq!(names, ["Flatbed", "Sheetfed", "Camera"]);
}

#[test]
fn enumeration_failure_keeps_collected_sources() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.add_source("Sheetfed", "Acme");
    dsm.script(Dat::IDENTITY, Msg::GET_NEXT, ReturnCode::FAILURE);
    let manager = open_manager(&dsm);

    let (sources, rc) = manager.sources();

    assert_eq!(rc, ReturnCode::FAILURE);
    assert_eq!(sources.len(), 1);
}

#[test]
fn empty_system_has_no_default_source() {
    let dsm = MockDsm::install();
    let manager = open_manager(&dsm);

    assert_eq!(manager.default_source().unwrap_err(), ReturnCode::FAILURE);

    let (sources, rc) = manager.sources();
    assert!(sources.is_empty());
    assert_eq!(rc, ReturnCode::END_OF_LIST);

    let mut status = Status::new();
    assert_eq!(manager.status(&mut status), ReturnCode::SUCCESS);
    assert_eq!(status.condition_code(), ConditionCode::NO_DS);
}

#[test]
fn default_source_can_be_changed() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let camera = dsm.add_source("Camera", "Initech");
    let manager = open_manager(&dsm);

    let (sources, _) = manager.sources();
    let chosen = sources
        .iter()
        .find(|source| source.identity().id() == camera.id())
        .unwrap();
    assert_eq!(manager.set_default_source(chosen), ReturnCode::SUCCESS);

    let default = manager.default_source().unwrap();
    assert_eq!(default.identity().product_name(), "Camera");

    let selected = manager.show_source_dialog().unwrap();
    assert_eq!(selected.identity().id(), camera.id());
}

#[test]
fn cancelled_selection_dialog_is_reported() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.script(Dat::IDENTITY, Msg::USER_SELECT, ReturnCode::CANCEL);
    let manager = open_manager(&dsm);

    assert_eq!(manager.show_source_dialog().unwrap_err(), ReturnCode::CANCEL);
}

#[test]
fn cleanup_from_open_releases_everything() {
    let dsm = MockDsm::install();
    let mut manager = open_manager(&dsm);
    dsm.take_trace();

    manager.cleanup();

    assert_eq!(manager.state(), DsmState::PreSession);
    expect![[r#"
        Control Parent CloseDsm -> Success
        library unload
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn cleanup_releases_the_library_even_if_close_fails() {
    let dsm = MockDsm::install();
    let mut manager = open_manager(&dsm);
    dsm.script(Dat::PARENT, Msg::CLOSE_DSM, ReturnCode::FAILURE);
    dsm.take_trace();

    manager.cleanup();

    assert_eq!(manager.state(), DsmState::PreSession);
    expect![[r#"
        Control Parent CloseDsm -> Failure
        library unload
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn dropping_an_open_manager_cleans_up() {
    let dsm = MockDsm::install();
    let manager = open_manager(&dsm);
    dsm.take_trace();

    drop(manager);

    expect![[r#"
        Control Parent CloseDsm -> Success
        library unload
    "#]]
    .assert_eq(&dsm.take_trace());
}

use expect_test::expect;
use ironscan_app::{CallbackRegistry, CALLBACK_REQUIRED};
use ironscan_testsuite::{open_manager, MockDsm};
use ironscan_twain::{
    ConditionCode, Dat, DataGroup, DsState, Handle, Msg, PendingXfers, ReturnCode, Status, UserInterface,
};
use rstest::rstest;

fn ui() -> UserInterface {
    UserInterface::new(true, false, Handle::NULL)
}

#[test]
fn open_registers_the_readiness_callback() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.create_source("Flatbed", "Acme");
    dsm.take_trace();

    assert_eq!(source.open(), ReturnCode::SUCCESS);

    assert_eq!(source.state(), DsState::Open);
    assert_ne!(source.identity().id(), 0);
    assert!(source.uses_callback());
    assert!(CallbackRegistry::global().contains(source.identity().id()));
    assert_eq!(dsm.notifier().unwrap().form(), Dat::CALLBACK2);
    expect![[r#"
        Control Identity OpenDs -> Success
        Control Callback2 RegisterCallback -> Success
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn legacy_callback_is_the_fallback() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.reject_callbacks(true, false);
    let manager = open_manager(&dsm);
    let mut source = manager.create_source("Flatbed", "");
    dsm.take_trace();

    assert_eq!(source.open(), ReturnCode::SUCCESS);

    assert!(source.uses_callback());
    assert_eq!(dsm.notifier().unwrap().form(), Dat::CALLBACK);
    expect![[r#"
        Control Identity OpenDs -> Success
        Control Callback2 RegisterCallback -> Failure
        Control Callback RegisterCallback -> Success
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn source_without_callback() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.reject_callbacks(true, true);
    let manager = open_manager(&dsm);
    let mut source = manager.create_source("Flatbed", "Acme");

    let rc = source.open();

    assert!(!source.uses_callback());
    assert!(!CallbackRegistry::global().contains(source.identity().id()));

    if CALLBACK_REQUIRED {
        assert_eq!(rc, ReturnCode::FAILURE);
        assert_eq!(source.state(), DsState::Closed);
        assert!(dsm.trace().ends_with("Control Identity CloseDs -> Success\n"));
    } else {
        assert_eq!(rc, ReturnCode::SUCCESS);
        assert_eq!(source.state(), DsState::Open);
    }
}

#[test]
fn unknown_source_does_not_open() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.create_source("Nonexistent", "Nobody");

    assert_eq!(source.open(), ReturnCode::FAILURE);
    assert_eq!(source.state(), DsState::Closed);

    let mut status = Status::new();
    assert_eq!(manager.status(&mut status), ReturnCode::SUCCESS);
    assert_eq!(status.condition_code(), ConditionCode::NO_DS);
}

#[test]
fn enable_and_disable() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);

    assert_eq!(source.enable(ui(), false), ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::Enabled);

    assert_eq!(source.disable(), ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::Open);

    assert_eq!(source.enable(ui(), true), ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::Enabled);

    assert_eq!(source.disable(), ReturnCode::SUCCESS);
    assert_eq!(source.close(), ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::Closed);
    assert!(!CallbackRegistry::global().contains(source.identity().id()));
}

#[rstest]
#[case::check_status(false, ReturnCode::CHECK_STATUS, DsState::Enabled)]
#[case::ui_only_check_status(true, ReturnCode::CHECK_STATUS, DsState::Open)]
#[case::failure(false, ReturnCode::FAILURE, DsState::Open)]
#[case::cancel(false, ReturnCode::CANCEL, DsState::Open)]
fn enable_outcomes(#[case] ui_only: bool, #[case] rc: ReturnCode, #[case] expected: DsState) {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);

    let msg = if ui_only { Msg::ENABLE_DS_UI_ONLY } else { Msg::ENABLE_DS };
    dsm.script(Dat::USER_INTERFACE, msg, rc);

    assert_eq!(source.enable(ui(), ui_only), rc);
    assert_eq!(source.state(), expected);
}

#[test]
fn failed_close_keeps_the_source_open() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    dsm.script(Dat::IDENTITY, Msg::CLOSE_DS, ReturnCode::FAILURE);

    assert_eq!(source.close(), ReturnCode::FAILURE);

    assert_eq!(source.state(), DsState::Open);
    assert!(source.uses_callback());
}

#[test]
fn calls_out_of_sequence_never_reach_the_manager() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    dsm.take_trace();

    assert_eq!(source.enable(ui(), false), ReturnCode::FAILURE);
    assert_eq!(source.close(), ReturnCode::FAILURE);
    assert_eq!(source.status(&mut Status::new()), ReturnCode::FAILURE);

    assert_eq!(source.open(), ReturnCode::SUCCESS);
    dsm.take_trace();

    assert_eq!(source.open(), ReturnCode::FAILURE);
    assert_eq!(source.disable(), ReturnCode::FAILURE);
    assert_eq!(
        source.pending_xfers(Msg::END_XFER, &mut PendingXfers::new()),
        ReturnCode::FAILURE
    );
    assert_eq!(source.image_native_xfer().0, ReturnCode::FAILURE);
    assert_eq!(source.wait_ready(), ReturnCode::FAILURE);

    assert_eq!(source.state(), DsState::Open);
    assert_eq!(dsm.trace(), "");
}

#[test]
fn untracked_calls_are_forwarded_in_any_open_state() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    dsm.set_condition(ConditionCode::PAPER_JAM);
    dsm.set_xfer_group(DataGroup::AUDIO);
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    dsm.take_trace();

    let mut status = Status::new();
    assert_eq!(source.status(&mut status), ReturnCode::SUCCESS);
    assert_eq!(status.condition_code(), ConditionCode::PAPER_JAM);

    let mut group = DataGroup::IMAGE;
    assert_eq!(source.xfer_group(Msg::GET, &mut group), ReturnCode::SUCCESS);
    assert_eq!(group, DataGroup::AUDIO);

    assert_eq!(source.state(), DsState::Open);
    expect![[r#"
        Control Status Get -> Success
        Control XferGroup Get -> Success
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn identity_is_not_a_generic_call() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    dsm.take_trace();

    let mut identity = source.identity();
    assert_eq!(source.call(DataGroup::CONTROL, Msg::CLOSE_DS, &mut identity), ReturnCode::FAILURE);

    // SAFETY: rejected before reaching the manager.
    let rc = unsafe { source.call_raw(DataGroup::CONTROL, Dat::IDENTITY, Msg::CLOSE_DS, core::ptr::null_mut()) };
    assert_eq!(rc, ReturnCode::FAILURE);

    assert_eq!(source.state(), DsState::Open);
    assert_eq!(dsm.trace(), "");
}

#[test]
fn custom_data_goes_through_the_raw_call() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let manager = open_manager(&dsm);
    let mut source = manager.default_source().unwrap();
    assert_eq!(source.open(), ReturnCode::SUCCESS);
    dsm.take_trace();

    let mut custom = [0u8; 8];
    // SAFETY: the mock ignores the payload of custom data types.
    let rc = unsafe {
        source.call_raw(
            DataGroup::CONTROL,
            Dat::CUSTOM_DS_DATA,
            Msg::GET,
            custom.as_mut_ptr().cast(),
        )
    };

    assert_eq!(rc, ReturnCode::SUCCESS);
    assert_eq!(source.state(), DsState::Open);
    expect![[r#"
        Control Dat(12) Get -> Success
    "#]]
    .assert_eq(&dsm.take_trace());
}

#[test]
fn source_calls_require_an_open_manager() {
    let dsm = MockDsm::install();
    dsm.add_source("Flatbed", "Acme");
    let mut manager = open_manager(&dsm);
    assert_eq!(manager.close(), ReturnCode::SUCCESS);
    dsm.take_trace();

    let mut source = manager.create_source("Flatbed", "Acme");

    assert_eq!(source.open(), ReturnCode::FAILURE);
    assert_eq!(dsm.trace(), "");
}

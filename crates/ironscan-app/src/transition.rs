//! Local state changes attached to successful dispatch calls.
//!
//! A source never changes state on its own: every transition follows a dispatch call matched by
//! one rule of [`RULES`]. The rule also restricts the states the call may be issued from.

use ironscan_twain::{Dat, DsState, Msg, ReturnCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Accept {
    Success,
    SuccessOrCheckStatus,
    SuccessOrXferDone,
    XferDone,
}

impl Accept {
    pub(crate) fn matches(self, rc: ReturnCode) -> bool {
        match self {
            Self::Success => rc == ReturnCode::SUCCESS,
            Self::SuccessOrCheckStatus => rc == ReturnCode::SUCCESS || rc == ReturnCode::CHECK_STATUS,
            Self::SuccessOrXferDone => rc == ReturnCode::SUCCESS || rc == ReturnCode::XFER_DONE,
            Self::XferDone => rc == ReturnCode::XFER_DONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    Enter(DsState),
    /// Back to `Enabled` when the image group is active and nothing is pending, `XferReady` otherwise.
    EndXfer,
    /// Back to `Enabled` when the image group is active, unchanged otherwise.
    Reset,
}

#[derive(Debug)]
pub(crate) struct Rule {
    pub(crate) dat: Dat,
    /// `None` matches every message.
    pub(crate) msg: Option<Msg>,
    pub(crate) from: &'static [DsState],
    pub(crate) accept: Accept,
    pub(crate) effect: Effect,
}

const TRANSFER_STATES: &[DsState] = &[DsState::XferReady, DsState::Xferring];

pub(crate) const RULES: &[Rule] = &[
    Rule {
        dat: Dat::IDENTITY,
        msg: Some(Msg::OPEN_DS),
        from: &[DsState::Closed],
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Open),
    },
    Rule {
        dat: Dat::IDENTITY,
        msg: Some(Msg::CLOSE_DS),
        from: &[DsState::Open],
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Closed),
    },
    Rule {
        dat: Dat::USER_INTERFACE,
        msg: Some(Msg::ENABLE_DS),
        from: &[DsState::Open],
        accept: Accept::SuccessOrCheckStatus,
        effect: Effect::Enter(DsState::Enabled),
    },
    Rule {
        dat: Dat::USER_INTERFACE,
        msg: Some(Msg::ENABLE_DS_UI_ONLY),
        from: &[DsState::Open],
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Enabled),
    },
    Rule {
        dat: Dat::USER_INTERFACE,
        msg: Some(Msg::DISABLE_DS),
        from: &[DsState::Enabled],
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Open),
    },
    Rule {
        dat: Dat::PENDING_XFERS,
        msg: Some(Msg::END_XFER),
        from: &[DsState::Xferring],
        accept: Accept::Success,
        effect: Effect::EndXfer,
    },
    Rule {
        dat: Dat::PENDING_XFERS,
        msg: Some(Msg::RESET),
        from: &[DsState::XferReady],
        accept: Accept::Success,
        effect: Effect::Reset,
    },
    Rule {
        dat: Dat::IMAGE_FILE_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Xferring),
    },
    Rule {
        dat: Dat::IMAGE_MEM_FILE_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::SuccessOrXferDone,
        effect: Effect::Enter(DsState::Xferring),
    },
    Rule {
        dat: Dat::IMAGE_MEM_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::SuccessOrXferDone,
        effect: Effect::Enter(DsState::Xferring),
    },
    Rule {
        dat: Dat::IMAGE_NATIVE_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::XferDone,
        effect: Effect::Enter(DsState::Xferring),
    },
    Rule {
        dat: Dat::AUDIO_FILE_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::XferDone,
        effect: Effect::Enter(DsState::Xferring),
    },
    Rule {
        dat: Dat::AUDIO_NATIVE_XFER,
        msg: None,
        from: TRANSFER_STATES,
        accept: Accept::Success,
        effect: Effect::Enter(DsState::Xferring),
    },
];

pub(crate) fn rule_for(dat: Dat, msg: Msg) -> Option<&'static Rule> {
    RULES
        .iter()
        .find(|rule| rule.dat == dat && rule.msg.is_none_or(|expected| expected == msg))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Dat::IDENTITY, Msg::OPEN_DS, ReturnCode::SUCCESS, Some(Effect::Enter(DsState::Open)))]
    #[case(Dat::IDENTITY, Msg::OPEN_DS, ReturnCode::FAILURE, None)]
    #[case(Dat::USER_INTERFACE, Msg::ENABLE_DS, ReturnCode::CHECK_STATUS, Some(Effect::Enter(DsState::Enabled)))]
    #[case(Dat::USER_INTERFACE, Msg::ENABLE_DS_UI_ONLY, ReturnCode::CHECK_STATUS, None)]
    #[case(Dat::IMAGE_NATIVE_XFER, Msg::GET, ReturnCode::SUCCESS, None)]
    #[case(Dat::IMAGE_NATIVE_XFER, Msg::GET, ReturnCode::XFER_DONE, Some(Effect::Enter(DsState::Xferring)))]
    #[case(Dat::IMAGE_MEM_XFER, Msg::GET, ReturnCode::SUCCESS, Some(Effect::Enter(DsState::Xferring)))]
    #[case(Dat::AUDIO_NATIVE_XFER, Msg::GET, ReturnCode::XFER_DONE, None)]
    #[case(Dat::PENDING_XFERS, Msg::END_XFER, ReturnCode::SUCCESS, Some(Effect::EndXfer))]
    #[case(Dat::PENDING_XFERS, Msg::GET, ReturnCode::SUCCESS, None)]
    #[case(Dat::CAPABILITY, Msg::GET, ReturnCode::SUCCESS, None)]
    fn effect_of_dispatch(#[case] dat: Dat, #[case] msg: Msg, #[case] rc: ReturnCode, #[case] expected: Option<Effect>) {
        let effect = rule_for(dat, msg)
            .filter(|rule| rule.accept.matches(rc))
            .map(|rule| rule.effect);

        assert_eq!(effect, expected);
    }

    #[test]
    fn every_rule_has_an_origin_state() {
        for rule in RULES {
            assert!(!rule.from.is_empty(), "{rule:?}");
        }
    }
}

use crate::config::ServerConfig;
use crate::error::CommandError;
use crate::output::Output;

/// How a command reacts to a disabled or inactive target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Report problems as errors and stop, instead of warning
    pub is_error: bool,

    /// Also report a target that is switched off
    pub check_active: bool,
}

impl ErrorPolicy {
    pub const BLOCKING: Self = Self {
        is_error: true,
        check_active: true,
    };

    pub const WARN: Self = Self {
        is_error: false,
        check_active: true,
    };

    pub const WARN_IGNORE_ACTIVE: Self = Self {
        is_error: false,
        check_active: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    Continue,
    WarnAndContinue(Vec<String>),
    ErrorAndAbort(Vec<String>),
}

impl TargetAction {
    /// Emits the messages. Returns `false` when the command must stop.
    pub fn report(&self, out: &mut dyn Output) -> bool {
        match self {
            TargetAction::Continue => true,
            TargetAction::WarnAndContinue(messages) => {
                messages.iter().for_each(|m| out.warning(m));
                true
            }
            TargetAction::ErrorAndAbort(messages) => {
                messages.iter().for_each(|m| out.error(m));
                false
            }
        }
    }
}

/// Decides what a command does with a target, given its configuration state.
///
/// Disabled wins over inactive: once the disabled reasons are reported the
/// active flag is not looked at.
pub fn classify(config: &ServerConfig, policy: ErrorPolicy) -> TargetAction {
    let messages = if config.disabled() {
        config.msg_list.clone()
    } else if policy.check_active && !config.active {
        vec![CommandError::TargetInactive(config.name.clone()).to_string()]
    } else {
        return TargetAction::Continue;
    };

    if policy.is_error {
        TargetAction::ErrorAndAbort(messages)
    } else {
        TargetAction::WarnAndContinue(messages)
    }
}

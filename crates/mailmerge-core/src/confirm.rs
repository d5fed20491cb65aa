//! Per-message confirmation.

use crate::ui::{Action, Ui};
use std::io;
use tracing::info;

/// Where the confirmation gate stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    /// Every message is confirmed by the user.
    Prompting,
    /// The user approved all remaining messages (or confirmation is off).
    ApprovedAll,
    /// The user cancelled; nothing more is sent.
    Aborted,
}

/// Confirmation gate for one run.
#[derive(Debug, Clone)]
pub struct Confirmation {
    state: ConfirmState,
}

impl Confirmation {
    /// Creates the gate. With `skip_confirm` every message is pre-approved.
    #[must_use]
    pub const fn new(skip_confirm: bool) -> Self {
        let state = if skip_confirm {
            ConfirmState::ApprovedAll
        } else {
            ConfirmState::Prompting
        };
        Self { state }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConfirmState {
        self.state
    }

    /// Decides whether the message for `destination` goes out.
    ///
    /// Returns `Send` or `SendAll` to transmit, `DontSend` to skip this
    /// message and `AbortSend` to stop the run. Answers other than these
    /// count as `DontSend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the UI cannot read the answer.
    pub fn confirm<U: Ui>(&mut self, ui: &mut U, destination: &str) -> io::Result<Action> {
        match self.state {
            ConfirmState::ApprovedAll => return Ok(Action::Send),
            ConfirmState::Aborted => return Ok(Action::AbortSend),
            ConfirmState::Prompting => {}
        }

        let prompt = format!("Send email to {destination} [(Y)es/(N)o/Yes to (A)ll/(C)ancel]? ");
        let action = match ui.confirm(&prompt)? {
            Action::Send => Action::Send,
            Action::SendAll => {
                info!("skip further confirmation");
                ui.log("Skip further confirmation");
                self.state = ConfirmState::ApprovedAll;
                Action::SendAll
            }
            Action::AbortSend => {
                self.state = ConfirmState::Aborted;
                Action::AbortSend
            }
            Action::DontSend | Action::ContinueOnError => Action::DontSend,
        };
        Ok(action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Scripted {
        answers: VecDeque<Action>,
        prompts: Vec<String>,
        logs: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[Action]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Ui for Scripted {
        fn confirm(&mut self, prompt: &str) -> io::Result<Action> {
            self.prompts.push(prompt.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no answer"))
        }

        fn log(&mut self, message: &str) {
            self.logs.push(message.to_string());
        }
    }

    #[test]
    fn test_disabled_never_prompts() {
        let mut gate = Confirmation::new(true);
        let mut ui = Scripted::default();
        assert_eq!(gate.confirm(&mut ui, "a@x.com").unwrap(), Action::Send);
        assert!(ui.prompts.is_empty());
    }

    #[test]
    fn test_send_keeps_prompting() {
        let mut gate = Confirmation::new(false);
        let mut ui = Scripted::new(&[Action::Send, Action::DontSend]);
        assert_eq!(gate.confirm(&mut ui, "a@x.com").unwrap(), Action::Send);
        assert_eq!(gate.confirm(&mut ui, "b@x.com").unwrap(), Action::DontSend);
        assert_eq!(gate.state(), ConfirmState::Prompting);
        assert_eq!(
            ui.prompts[0],
            "Send email to a@x.com [(Y)es/(N)o/Yes to (A)ll/(C)ancel]? "
        );
    }

    #[test]
    fn test_send_all_latches() {
        let mut gate = Confirmation::new(false);
        let mut ui = Scripted::new(&[Action::SendAll]);
        assert_eq!(gate.confirm(&mut ui, "a@x.com").unwrap(), Action::SendAll);
        assert_eq!(gate.state(), ConfirmState::ApprovedAll);
        assert_eq!(gate.confirm(&mut ui, "b@x.com").unwrap(), Action::Send);
        assert_eq!(ui.prompts.len(), 1);
        assert_eq!(ui.logs, ["Skip further confirmation"]);
    }

    #[test]
    fn test_abort_is_terminal() {
        let mut gate = Confirmation::new(false);
        let mut ui = Scripted::new(&[Action::AbortSend]);
        assert_eq!(gate.confirm(&mut ui, "a@x.com").unwrap(), Action::AbortSend);
        assert_eq!(gate.state(), ConfirmState::Aborted);
        assert_eq!(gate.confirm(&mut ui, "b@x.com").unwrap(), Action::AbortSend);
        assert_eq!(ui.prompts.len(), 1);
    }

    #[test]
    fn test_ui_error_propagates() {
        let mut gate = Confirmation::new(false);
        let mut ui = Scripted::default();
        assert!(gate.confirm(&mut ui, "a@x.com").is_err());
    }
}

//! User interaction seam.

use std::io;

/// Decision taken for a message, by the user or by the run itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send this message.
    Send,
    /// Send this message and every following one without asking.
    SendAll,
    /// Skip this message.
    DontSend,
    /// Stop the run.
    AbortSend,
    /// The row failed; carry on with the next one.
    ContinueOnError,
}

/// Where run messages and confirmation prompts go.
pub trait Ui {
    /// Asks the user what to do with a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn confirm(&mut self, prompt: &str) -> io::Result<Action>;

    /// Shows a progress or warning message.
    fn log(&mut self, message: &str);
}

impl<U: Ui + ?Sized> Ui for &mut U {
    fn confirm(&mut self, prompt: &str) -> io::Result<Action> {
        (**self).confirm(prompt)
    }

    fn log(&mut self, message: &str) {
        (**self).log(message);
    }
}

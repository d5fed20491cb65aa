//! Terminal prompts and progress output.

use mailmerge_core::{Action, Ui};
use std::io::{self, BufRead, StdinLock, Stdout, Write};

/// Line-oriented console UI.
pub struct ConsoleUi<R, W> {
    input: R,
    output: W,
}

impl ConsoleUi<StdinLock<'static>, Stdout> {
    /// Console on the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleUi<R, W> {
    /// Console on arbitrary streams.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `label` and reads one trimmed line. Returns `None` at end of
    /// input.
    pub fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Ui for ConsoleUi<R, W> {
    fn confirm(&mut self, prompt: &str) -> io::Result<Action> {
        Ok(self
            .prompt(prompt)?
            .map_or(Action::DontSend, |answer| parse_answer(&answer)))
    }

    fn log(&mut self, message: &str) {
        // Progress output is best effort.
        let _ = writeln!(self.output, "{message}");
    }
}

fn parse_answer(answer: &str) -> Action {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" => Action::Send,
        "a" => Action::SendAll,
        "c" => Action::AbortSend,
        _ => Action::DontSend,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn console(input: &str) -> ConsoleUi<Cursor<Vec<u8>>, Vec<u8>> {
        ConsoleUi::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_answers() {
        assert_eq!(parse_answer("y"), Action::Send);
        assert_eq!(parse_answer(" Y "), Action::Send);
        assert_eq!(parse_answer("a"), Action::SendAll);
        assert_eq!(parse_answer("C"), Action::AbortSend);
        assert_eq!(parse_answer("n"), Action::DontSend);
        assert_eq!(parse_answer("yes please"), Action::DontSend);
        assert_eq!(parse_answer(""), Action::DontSend);
    }

    #[test]
    fn test_confirm_reads_one_line_each() {
        let mut ui = console("y\nA\n");
        assert_eq!(ui.confirm("Send? ").unwrap(), Action::Send);
        assert_eq!(ui.confirm("Send? ").unwrap(), Action::SendAll);
        assert_eq!(ui.confirm("Send? ").unwrap(), Action::DontSend);
        assert_eq!(String::from_utf8(ui.output).unwrap(), "Send? Send? Send? ");
    }

    #[test]
    fn test_log_appends_newline() {
        let mut ui = console("");
        ui.log("Sent email to: a@example.com");
        assert_eq!(
            String::from_utf8(ui.output).unwrap(),
            "Sent email to: a@example.com\n"
        );
    }

    #[test]
    fn test_prompt_trims_and_detects_eof() {
        let mut ui = console("  jane  \n");
        assert_eq!(ui.prompt("Username: ").unwrap().as_deref(), Some("jane"));
        assert_eq!(ui.prompt("Username: ").unwrap(), None);
    }
}

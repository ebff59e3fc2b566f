//! Interactive questions asked while generating a migration

use std::io::{self, BufRead, Write};

/// Asks the user for input
pub trait Prompter {
    /// Ask a free-form question; the answer is returned trimmed
    fn ask(&mut self, question: &str) -> io::Result<String>;

    /// Ask a yes/no question; an empty answer yields `default`
    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool>;
}

/// Prompter reading answers line by line from `input` and writing questions to `output`
pub struct ConsolePrompter<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompter on the process's standard input and output
    pub fn stdio() -> Self {
        ConsolePrompter {
            input: io::stdin().lock(),
            output: io::stdout(),
        }
    }
}

impl<R: BufRead, W: Write> ConsolePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ConsolePrompter { input, output }
    }

    fn read_answer(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Prompter for ConsolePrompter<R, W> {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        self.read_answer(&format!("{} ", question))
    }

    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.read_answer(&format!("{} {} ", question, hint))?;
        if answer.is_empty() {
            return Ok(default);
        }
        Ok(answer.to_lowercase().starts_with('y'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ask_trims_answer() {
        let mut output = Vec::new();
        let mut prompter = ConsolePrompter::new(Cursor::new("  add users \n"), &mut output);
        assert_eq!(prompter.ask("Migration name:").unwrap(), "add users");
        drop(prompter);
        assert_eq!(String::from_utf8(output).unwrap(), "Migration name: ");
    }

    #[test]
    fn test_confirm() {
        let mut prompter = ConsolePrompter::new(Cursor::new("\nyes\nN\nmaybe\n"), io::sink());
        assert!(prompter.confirm("Overwrite schema file?", true).unwrap());
        assert!(prompter.confirm("Overwrite schema file?", false).unwrap());
        assert!(!prompter.confirm("Overwrite schema file?", true).unwrap());
        assert!(!prompter.confirm("Overwrite schema file?", true).unwrap());
        // end of input takes the default
        assert!(!prompter.confirm("Overwrite schema file?", false).unwrap());
    }
}

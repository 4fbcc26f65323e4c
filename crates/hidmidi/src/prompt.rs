//! Line-based console prompts for the setup wizard
//!
//! Every prompt re-asks until it gets valid input. End of input cancels the
//! wizard and raises the quit signal.

use crate::error::{Error, Result};
use crate::shutdown::QuitSignal;
use std::io::{BufRead, Write};

/// Reads answers from `input` and writes prompts to `output`
pub struct Prompter<R, W> {
    input: R,
    output: W,
    quit: Option<QuitSignal>,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            quit: None,
        }
    }

    /// Raise `quit` when input ends
    pub fn with_quit(mut self, quit: QuitSignal) -> Self {
        self.quit = Some(quit);
        self
    }

    /// Print a line of text
    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    fn is_quit(&self) -> bool {
        self.quit.as_ref().map(|quit| quit.is_raised()).unwrap_or(false)
    }

    fn read_line(&mut self) -> Result<String> {
        if self.is_quit() {
            return Err(Error::Cancelled);
        }
        write!(self.output, "> ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            if let Some(quit) = &self.quit {
                quit.raise();
            }
            return Err(Error::Cancelled);
        }
        if self.is_quit() {
            return Err(Error::Cancelled);
        }
        Ok(line.trim().to_string())
    }

    /// Ask for a whole number in `[min, max]`
    pub fn number(&mut self, label: &str, min: i64, max: i64) -> Result<i64> {
        if !label.is_empty() {
            writeln!(self.output, "{}", label)?;
        }
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                writeln!(self.output, "Empty input. Please enter a number.")?;
                continue;
            }
            match line.parse::<i64>() {
                Ok(n) if (min..=max).contains(&n) => return Ok(n),
                Ok(_) => writeln!(
                    self.output,
                    "Invalid input. Please enter a whole number between {} and {}.",
                    min, max
                )?,
                Err(_) => writeln!(self.output, "Invalid input. Please enter a number.")?,
            }
        }
    }

    /// Ask for a value in 0-127
    pub fn midi_value(&mut self, label: &str, min: u8) -> Result<u8> {
        let n = self.number(label, min as i64, 127)?;
        Ok(n as u8)
    }

    /// Present a numbered list and return the chosen index
    pub fn choose<S: AsRef<str>>(&mut self, title: &str, items: &[S]) -> Result<usize> {
        if items.is_empty() {
            return Err(Error::Cancelled);
        }
        writeln!(self.output, "{}", title)?;
        for (i, item) in items.iter().enumerate() {
            writeln!(self.output, "[{}] {}", i, item.as_ref())?;
        }
        let n = self.number("", 0, items.len() as i64 - 1)?;
        Ok(n as usize)
    }

    /// Ask a yes/no question answered with 0 or 1
    pub fn yes_no(&mut self, label: &str) -> Result<bool> {
        Ok(self.number(label, 0, 1)? == 1)
    }

    /// Ask for non-empty text
    pub fn text(&mut self, label: &str) -> Result<String> {
        writeln!(self.output, "{}", label)?;
        loop {
            let line = self.read_line()?;
            if !line.is_empty() {
                return Ok(line);
            }
            writeln!(self.output, "Input cannot be empty. Please enter a name.")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_number_reprompts_until_valid() {
        let mut p = prompter("\nabc\n99\n 7 \n");
        assert_eq!(p.number("Enter MIDI Channel (1-16):", 1, 16).unwrap(), 7);
        let out = String::from_utf8(p.output.clone()).unwrap();
        assert!(out.contains("Empty input"));
        assert!(out.contains("Please enter a number."));
        assert!(out.contains("between 1 and 16"));
    }

    #[test]
    fn test_eof_cancels_and_raises_quit() {
        let quit = QuitSignal::new();
        let mut p = prompter("").with_quit(quit.clone());
        assert!(matches!(p.number("?", 0, 1), Err(Error::Cancelled)));
        assert!(quit.is_raised());
    }

    #[test]
    fn test_raised_quit_cancels_before_reading() {
        let quit = QuitSignal::new();
        quit.raise();
        let mut p = prompter("5\n").with_quit(quit);
        assert!(matches!(p.number("Enter MIDI Channel (1-16):", 1, 16), Err(Error::Cancelled)));
        assert!(matches!(p.text("Filename:"), Err(Error::Cancelled)));
    }

    #[test]
    fn test_choose_lists_items() {
        let mut p = prompter("1\n");
        let idx = p.choose("Select port:", &["A", "B"]).unwrap();
        assert_eq!(idx, 1);
        let out = String::from_utf8(p.output.clone()).unwrap();
        assert!(out.contains("[0] A"));
        assert!(out.contains("[1] B"));
    }

    #[test]
    fn test_choose_empty_list_cancels() {
        let mut p = prompter("0\n");
        let empty: [&str; 0] = [];
        assert!(matches!(p.choose("Nothing", &empty), Err(Error::Cancelled)));
    }

    #[test]
    fn test_text_skips_blank_lines() {
        let mut p = prompter("   \n my_stick \n");
        assert_eq!(p.text("Filename:").unwrap(), "my_stick");
    }

    #[test]
    fn test_midi_value_respects_minimum() {
        let mut p = prompter("0\n100\n");
        assert_eq!(p.midi_value("Velocity (1-127):", 1).unwrap(), 100);
    }
}

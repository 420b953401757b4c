//! Terminal presentation of text frames.
//!
//! The screen is cleared once when the sink is created. Each frame then moves
//! the cursor home and overwrites the previous one in place, so there is no
//! blank flash between frames.

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor,
    style::Print,
    terminal::{Clear, ClearType},
    ExecutableCommand, QueueableCommand,
};

use crate::error::Result;
use crate::player::FrameSink;
use crate::store::TextFrame;

pub struct TerminalSink<W: Write> {
    out: W,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Result<Self> {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    /// Hides the cursor and clears the screen.
    pub fn new(mut out: W) -> Result<Self> {
        out.execute(cursor::Hide)?;
        out.execute(Clear(ClearType::All))?;
        Ok(Self { out })
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> FrameSink for TerminalSink<W> {
    fn present(&mut self, frame: &TextFrame) -> Result<()> {
        self.out.queue(cursor::MoveTo(0, 0))?;
        self.out.queue(Print(frame.as_str()))?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for TerminalSink<W> {
    fn drop(&mut self) {
        let _ = self.out.execute(cursor::Show);
        let _ = self.out.execute(Print("\n"));
    }
}

//! Interactive chat loop.
//!
//! Every turn is an independent request: no history is sent back to the
//! backend. The active model is re-read from its record on each turn.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::client::Backend;
use crate::store::ActiveModelStore;

/// Typed alone on a line (any case) to leave the chat.
pub const EXIT_COMMAND: &str = "exit";

pub struct ChatSession<'a, B: Backend + ?Sized> {
    backend: &'a B,
    models: &'a ActiveModelStore,
}

impl<'a, B: Backend + ?Sized> ChatSession<'a, B> {
    pub fn new(backend: &'a B, models: &'a ActiveModelStore) -> Self {
        Self { backend, models }
    }

    /// Run until the exit sentinel or end of input. Returns the number of
    /// requests issued.
    pub async fn run<R, W>(&self, input: &mut R, out: &mut W) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(model) = self.models.get() else {
            writeln!(out, "[ERROR] No model selected.")?;
            return Ok(0);
        };
        writeln!(
            out,
            "[INFO] Starting chat with model '{model}'. Type '{EXIT_COMMAND}' to stop."
        )?;

        let mut turns = 0;
        let mut line = String::new();
        loop {
            write!(out, "You: ")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                writeln!(out)?;
                break;
            }
            let prompt = line.trim_end_matches(['\r', '\n']);
            if prompt.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
                writeln!(out, "[INFO] Exiting chat.")?;
                break;
            }

            let Some(model) = self.models.get() else {
                writeln!(out, "[ERROR] No model selected.")?;
                break;
            };

            turns += 1;
            match self.backend.generate(&model, prompt).await {
                Ok(answer) => writeln!(out, "AI: {answer}")?,
                Err(e) => writeln!(out, "[ERROR] Failed to communicate with model: {e}")?,
            }
        }

        Ok(turns)
    }
}

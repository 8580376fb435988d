//! Daemon - the main conversational loops
//!
//! The voice loop listens, gates transcripts by wake word and runs turns
//! through the [`Session`]; the text loop does the same from a line reader
//! without the wake gate. Both own all memory state; only the speech queue
//! is shared with the audio worker.

use std::io::Write;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::Result;
use crate::session::{Session, SessionCommand};
use crate::voice::{AudioDispatcher, Directive, Listener, WakeGate, WakeState};

/// Pause before listening again after a device or backend fault
const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

const WAKE_REPLY: &str = "なに？";
const STOP_REPLY: &str = "終了するね";
const EXIT_REPLY: &str = "またね！";
const RESET_REPLY: &str = "会話をリセットしたよ。";
const EMPTY_SUMMARY: &str = "(まだ要約は空だよ)";
const COMPACTED_NOTICE: &str = "(ちょっと昔の会話を要約して覚え直したよ)";

/// Whether a loop keeps going after a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Loop settings that are not part of the session
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Display and spoken name of the assistant
    pub assistant_name: String,
    /// Put the wake gate back to sleep after this long unaddressed
    pub idle_sleep: Option<Duration>,
}

/// Drives a [`Session`] from speech or text
pub struct Daemon {
    session: Session,
    gate: WakeGate,
    voice: Option<AudioDispatcher>,
    options: DaemonOptions,
}

impl Daemon {
    /// Create a daemon; `voice` is `None` when muted
    #[must_use]
    pub fn new(
        session: Session,
        gate: WakeGate,
        voice: Option<AudioDispatcher>,
        options: DaemonOptions,
    ) -> Self {
        Self {
            session,
            gate,
            voice,
            options,
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Voice loop: runs until a stop word or an exit command
    ///
    /// Capture misses are retried silently and failed turns are reported
    /// without ending the loop.
    ///
    /// # Errors
    ///
    /// Returns error only if writing to `out` or the final save fails
    #[allow(clippy::future_not_send)]
    pub async fn run_voice<L, W>(&mut self, listener: &mut L, out: &mut W) -> Result<()>
    where
        L: Listener + ?Sized,
        W: Write,
    {
        let name = self.options.assistant_name.clone();
        writeln!(out, "{name}起動。最初に『{name}』って呼んでね")?;
        self.say(format!("起動したよ。{name}、って呼んで。"));

        let mut state = WakeState::asleep();
        loop {
            // never record our own voice
            if let Some(voice) = &self.voice {
                voice.wait_idle().await;
            }

            let transcript = match listener.listen().await {
                Ok(text) => text,
                Err(e) if e.is_miss() => {
                    tracing::trace!(reason = %e, "nothing heard");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "listen failed");
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                    continue;
                }
            };
            tracing::info!(transcript = %transcript, "heard");

            if let Some(command) = SessionCommand::parse(&transcript) {
                if self.handle_command(command, out)? == Flow::Stop {
                    break;
                }
                continue;
            }

            let now = Instant::now();
            if let Some(window) = self.options.idle_sleep {
                state = state.expire_if_idle(now, window);
            }

            let (next, directive) = self.gate.classify(state, &transcript, now);
            state = next;

            match directive {
                Directive::Ignore => {}
                Directive::Stop => {
                    self.say(STOP_REPLY);
                    break;
                }
                Directive::WakeOnly => self.say(WAKE_REPLY),
                Directive::Converse(text) => self.converse(&text, out).await?,
            }
        }

        self.session.persist()
    }

    /// Text loop: one line per turn until EOF or an exit command
    ///
    /// # Errors
    ///
    /// Returns error if reading input, writing output or the final save fails
    #[allow(clippy::future_not_send)]
    pub async fn run_text<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(
            out,
            "{}起動しました。終了: exit / リセット: reset / 要約表示: summary",
            self.options.assistant_name
        )?;

        let mut lines = input.lines();
        loop {
            write!(out, "\nあなた: ")?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            if let Some(command) = SessionCommand::parse(text) {
                if self.handle_command(command, out)? == Flow::Stop {
                    break;
                }
                continue;
            }

            self.converse(text, out).await?;
        }

        self.session.persist()
    }

    /// Let queued speech finish and stop the audio worker
    pub async fn shutdown(self) {
        if let Some(voice) = self.voice {
            voice.shutdown().await;
        }
    }

    async fn converse<W: Write>(&mut self, text: &str, out: &mut W) -> Result<()> {
        write!(out, "{}: ", self.options.assistant_name)?;
        out.flush()?;

        let result = self
            .session
            .respond(text, self.voice.as_ref(), |delta| {
                let _ = write!(out, "{delta}");
                let _ = out.flush();
            })
            .await;
        writeln!(out)?;

        match result {
            Ok(outcome) if outcome.compacted => writeln!(out, "{COMPACTED_NOTICE}")?,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                writeln!(out, "(応答できなかったよ: {e})")?;
            }
        }
        Ok(())
    }

    fn handle_command<W: Write>(&mut self, command: SessionCommand, out: &mut W) -> Result<Flow> {
        let name = &self.options.assistant_name;
        match command {
            SessionCommand::Exit => {
                writeln!(out, "{name}: {EXIT_REPLY}")?;
                self.say(EXIT_REPLY);
                Ok(Flow::Stop)
            }
            SessionCommand::Reset => {
                if let Err(e) = self.session.reset() {
                    tracing::error!(error = %e, "failed to save reset history");
                }
                writeln!(out, "{name}: {RESET_REPLY}")?;
                Ok(Flow::Continue)
            }
            SessionCommand::Summary => {
                let summary = self.session.summary();
                writeln!(out, "\n--- 長期記憶（要約） ---")?;
                writeln!(
                    out,
                    "{}",
                    if summary.is_empty() { EMPTY_SUMMARY } else { summary }
                )?;
                writeln!(out, "----------------------")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn say(&self, text: impl Into<String>) {
        if let Some(voice) = &self.voice {
            voice.enqueue(text);
        }
    }
}

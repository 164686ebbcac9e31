//! Moves typed by a person.

use async_trait::async_trait;
use chess_core::Game;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio_util::sync::CancellationToken;

use super::{Choice, MoveSource};
use crate::error::{Result, SessionError};
use crate::session::move_prefix;

const RESIGN: &str = "resign";
const SHOW: &str = "show";

/// Reads one move per line. Bad or illegal text is reported and re-prompted;
/// only the end of input is an error.
pub struct HumanInput<R, W> {
    lines: Lines<R>,
    out: W,
}

impl HumanInput<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> HumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, out: W) -> Self {
        Self {
            lines: reader.lines(),
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<R, W> MoveSource for HumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn choose_move(&mut self, game: &Game, cancel: &CancellationToken) -> Result<Choice> {
        loop {
            self.write(&move_prefix(game)).await?;

            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Choice::Cancelled),
                line = self.lines.next_line() => line?,
            };
            let Some(line) = line else {
                return Err(SessionError::Input(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "input closed",
                )));
            };

            let text = line.trim();
            match text {
                "" => continue,
                RESIGN => return Ok(Choice::Resign),
                SHOW => {
                    self.write(&format!("{}\n", game.render())).await?;
                    continue;
                }
                _ => {}
            }

            // SAN first; long algebraic is accepted too
            let decoded = game
                .decode_san(text)
                .or_else(|san_err| game.decode_uci(text).map_err(|_| san_err));
            match decoded {
                Ok(mv) => return Ok(Choice::Move(mv)),
                Err(e) => self.write(&format!("{e}\n")).await?,
            }
        }
    }
}

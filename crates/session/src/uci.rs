//! UCI engine wrapper (async I/O over the child's stdin/stdout)

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::{Result, SessionError};

/// Outcome of one timed search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Best move in UCI notation
    pub best_move: String,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    /// Elapsed search time reported by the engine, in milliseconds
    pub time_ms: Option<u64>,
    pub nps: Option<u64>,
}

/// A running UCI engine process
pub struct UciEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciEngine {
    /// Spawn the engine and run the UCI handshake
    pub async fn new(path: &str, threads: usize) -> Result<Self> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Engine(format!("Failed to spawn engine {path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| SessionError::Engine("engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SessionError::Engine("engine stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine
            .send(&format!("setoption name Threads value {threads}"))
            .await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;
        engine.send("ucinewgame").await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<()> {
        debug!(cmd, "UCI <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to read from engine: {e}")))?;
        if read == 0 {
            return Err(SessionError::Engine("engine closed its output".into()));
        }
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "UCI >");
        Ok(trimmed)
    }

    async fn wait_for(&mut self, expected: &str) -> Result<()> {
        loop {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
    }

    /// Search `fen` for `movetime` and return the engine's choice
    pub async fn best_move(&mut self, fen: &str, movetime: Duration) -> Result<SearchResult> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {}", movetime.as_millis()))
            .await?;

        let mut result = SearchResult::default();
        loop {
            let line = self.read_line().await?;
            if line.starts_with("info") {
                apply_info(&mut result, &line);
            } else if line.starts_with("bestmove") {
                result.best_move = parse_bestmove(&line)?;
                return Ok(result);
            }
        }
    }

    /// Send quit and wait for the process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Value following `key` in a whitespace-separated UCI line
fn field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
    }
    None
}

/// Fold one `info` line into the running statistics. Lines without a
/// statistic (e.g. `info string ...`) leave it untouched.
fn apply_info(result: &mut SearchResult, line: &str) {
    if line.starts_with("info string") {
        return;
    }
    if let Some(depth) = field(line, "depth") {
        result.depth = Some(depth);
    }
    if let Some(nodes) = field(line, "nodes") {
        result.nodes = Some(nodes);
    }
    if let Some(time) = field(line, "time") {
        result.time_ms = Some(time);
    }
    if let Some(nps) = field(line, "nps") {
        result.nps = Some(nps);
    }
}

fn parse_bestmove(line: &str) -> Result<String> {
    match line.split_whitespace().nth(1) {
        Some("(none)") | None => Err(SessionError::Engine(format!(
            "engine returned no move: {line}"
        ))),
        Some(mv) => Ok(mv.to_string()),
    }
}

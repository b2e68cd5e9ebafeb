//! Wires the core interpreter up to a real terminal and filesystem.
//!
//! The core only trades in opaque bytes and strings (see [`crate::io_channel`] and
//! [`crate::interpreter::ExecutionState`]); this module is where "read a line from stdin" and
//! "write a save file" actually happen, so the core itself never touches a terminal or the
//! filesystem.

use crate::error::{GameError, Result};
use crate::interpreter::{ExecutionState, Interpreter};
use crate::io_channel::{IoChannel, StatusType};
use log::{error, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const RECENT_OUTPUT_CAP: usize = 2000;

/// An [`IoChannel`] that prints to stdout and keeps a capped tail of recent output for crash
/// reports (§7: a fatal error should be able to show "what the player last saw").
pub struct TerminalIoChannel {
    recent_output: String,
}

impl TerminalIoChannel {
    pub fn new() -> TerminalIoChannel {
        TerminalIoChannel {
            recent_output: String::new(),
        }
    }

    pub fn recent_output(&self) -> &str {
        &self.recent_output
    }

    fn remember(&mut self, text: &str) {
        self.recent_output.push_str(text);
        if self.recent_output.len() > RECENT_OUTPUT_CAP {
            let cut = self.recent_output.len() - RECENT_OUTPUT_CAP;
            self.recent_output.drain(..cut);
        }
    }
}

impl Default for TerminalIoChannel {
    fn default() -> Self {
        TerminalIoChannel::new()
    }
}

impl IoChannel for TerminalIoChannel {
    fn print(&mut self, _window: u8, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
        self.remember(text);
    }

    fn print_debug(&mut self, text: &str) {
        eprintln!("[debug] {text}");
    }

    fn status(&mut self, game_type: StatusType, room: &str, left: i16, right: i16) {
        match game_type {
            StatusType::Score => eprintln!("[status] {room}  score: {left}  moves: {right}"),
            StatusType::Time => eprintln!("[status] {room}  {left:02}:{right:02}"),
        }
    }

    fn quit(&mut self) {
        println!();
    }
}

/// Runs the pull-based opcode loop to completion, mediating `read`/`read_char`/`save`/`restore`
/// through stdin and the filesystem.
pub struct Driver {
    pub interpreter: Interpreter<TerminalIoChannel>,
    save_dir: PathBuf,
}

impl Driver {
    pub fn new(interpreter: Interpreter<TerminalIoChannel>, save_dir: PathBuf) -> Driver {
        Driver {
            interpreter,
            save_dir,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            let state = self.interpreter.step()?;
            match state {
                ExecutionState::Running => continue,
                ExecutionState::Quit => return Ok(()),
                ExecutionState::AwaitingInput { .. } => {
                    let line = self.read_line()?;
                    self.interpreter.submit_input(&line)?;
                }
                ExecutionState::AwaitingReadChar => {
                    let line = self.read_line()?;
                    let zscii = line.bytes().next().unwrap_or(13);
                    self.interpreter.submit_read_char(zscii)?;
                }
                ExecutionState::AwaitingSave { bytes } => {
                    let success = self.do_save(&bytes);
                    self.interpreter.submit_save_result(success)?;
                }
                ExecutionState::AwaitingRestore => {
                    let bytes = self.do_restore();
                    self.interpreter.submit_restore_result(bytes)?;
                }
            }
        }
    }

    fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| GameError::MalformedImage(format!("stdin read failed: {e}")))?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn prompt_filename(&self, verb: &str) -> Result<PathBuf> {
        print!("{verb} file name [story.qzl]: ");
        io::stdout()
            .flush()
            .map_err(|e| GameError::MalformedImage(format!("stdout flush failed: {e}")))?;
        let line = self.read_line()?;
        let name = if line.is_empty() { "story.qzl".to_string() } else { line };
        Ok(self.save_dir.join(name))
    }

    fn do_save(&mut self, bytes: &[u8]) -> bool {
        let path = match self.prompt_filename("Save") {
            Ok(p) => p,
            Err(e) => {
                warn!("save aborted: {e}");
                return false;
            }
        };
        match std::fs::write(&path, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to write save file {}: {e}", path.display());
                false
            }
        }
    }

    fn do_restore(&mut self) -> Option<Vec<u8>> {
        let path = self.prompt_filename("Restore").ok()?;
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("failed to read save file {}: {e}", path.display());
                None
            }
        }
    }
}

/// A compact crash report: PC, call-stack depth, and the last bit of output the player saw.
/// §7 rules out partial-undo recovery, so a fatal [`GameError`] always ends the run here.
pub fn report_crash(err: &GameError, driver: &Driver) {
    error!("fatal error: {err}");
    error!("pc = {:#06x}", driver.interpreter.vm.pc);
    error!("call stack depth = {}", driver.interpreter.vm.call_stack.depth());
    let tail = driver.interpreter.io.recent_output();
    if !tail.is_empty() {
        error!("recent output:\n{tail}");
    }
}

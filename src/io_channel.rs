//! The host-facing commands the interpreter issues for the ones that never need to suspend:
//! `print`, `print_debug`, `status`, and `quit` (§6). `read`, `read_char`, `save`, and `restore`
//! are not part of this trait: they suspend the interpreter (see [`crate::interpreter`]) rather
//! than resolving immediately, so the Driver mediates them itself through `submit_*` calls.
//!
//! Grounded on the source lineage's `display_trait.rs` (a `ZMachineDisplay` trait carrying the
//! same print/window/status responsibilities, plus a fair amount of terminal-specific surface —
//! cursor position, buffered mode, resize handling — this crate's interface drops, since the I/O
//! channel here is a narrow host boundary rather than a terminal renderer).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    Score,
    Time,
}

#[derive(Debug, Clone)]
pub struct IoError {
    pub message: String,
}

impl IoError {
    pub fn new(message: impl Into<String>) -> IoError {
        IoError {
            message: message.into(),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I/O channel error: {}", self.message)
    }
}

impl std::error::Error for IoError {}

/// The host boundary for everything that doesn't need to suspend the opcode loop.
pub trait IoChannel {
    /// Print `text` to window 0 (lower, scrolling) or 1 (upper, fixed status area).
    fn print(&mut self, window: u8, text: &str);

    /// Print an out-of-band diagnostic line, distinct from in-game output.
    fn print_debug(&mut self, text: &str);

    /// Update the status line (v1-3 only; v4+ games draw their own).
    fn status(&mut self, game_type: StatusType, room: &str, left: i16, right: i16);

    /// Terminal: the game asked to quit.
    fn quit(&mut self);
}

/// A headless [`IoChannel`] that buffers everything in memory, for tests and scripted runs.
#[derive(Default)]
pub struct HeadlessIoChannel {
    pub lower_window: String,
    pub upper_window: String,
    pub debug_log: Vec<String>,
    pub last_status: Option<(StatusType, String, i16, i16)>,
    pub quit_requested: bool,
}

impl HeadlessIoChannel {
    pub fn new() -> HeadlessIoChannel {
        HeadlessIoChannel::default()
    }
}

impl IoChannel for HeadlessIoChannel {
    fn print(&mut self, window: u8, text: &str) {
        if window == 0 {
            self.lower_window.push_str(text);
        } else {
            self.upper_window.push_str(text);
        }
    }

    fn print_debug(&mut self, text: &str) {
        self.debug_log.push(text.to_string());
    }

    fn status(&mut self, game_type: StatusType, room: &str, left: i16, right: i16) {
        self.last_status = Some((game_type, room.to_string(), left, right));
    }

    fn quit(&mut self) {
        self.quit_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_channel_buffers_both_windows_separately() {
        let mut io = HeadlessIoChannel::new();
        io.print(0, "hello");
        io.print(1, "SCORE");
        assert_eq!(io.lower_window, "hello");
        assert_eq!(io.upper_window, "SCORE");
    }

    #[test]
    fn headless_channel_records_quit() {
        let mut io = HeadlessIoChannel::new();
        assert!(!io.quit_requested);
        io.quit();
        assert!(io.quit_requested);
    }
}

//! Terminal rendering for session events.
//!
//! Generated text goes to stdout so it can be piped; playback progress and
//! diagnostics go to stderr.

use crate::stream::events::SessionEvent;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Format a chunk duration for the progress line.
fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Render one session event to the terminal.
///
/// `quiet` suppresses everything except errors. `verbose` adds per-chunk
/// playback progress at level 1 and completion ticks at level 2.
pub fn render_event(event: &SessionEvent, quiet: bool, verbose: u8) {
    match event {
        SessionEvent::Metadata { text } => {
            if !quiet && verbose >= 1
                && let Some(text) = text
            {
                eprintln!("{DIM}{text}{RESET}");
            }
        }
        SessionEvent::TextGenerated { text, .. } => {
            if !quiet {
                print!("{text}");
                let _ = io::stdout().flush();
            }
        }
        SessionEvent::ChunkStarted {
            sequence_id,
            text,
            duration_ms,
        } => {
            if !quiet && verbose >= 1 {
                eprintln!(
                    "{DIM}▶ chunk {sequence_id} ({}) {text}{RESET}",
                    format_duration_ms(*duration_ms)
                );
            }
        }
        SessionEvent::ChunkCompleted { sequence_id } => {
            if !quiet && verbose >= 2 {
                eprintln!("{DIM}✓ chunk {sequence_id}{RESET}");
            }
        }
        SessionEvent::AllCompleted { chunks_played } => {
            if !quiet {
                println!();
                if verbose >= 1 {
                    eprintln!("{GREEN}done ({chunks_played} chunks played){RESET}");
                }
            }
        }
        SessionEvent::Warning { message } => {
            if !quiet {
                eprintln!("{YELLOW}warning: {message}{RESET}");
            }
        }
        SessionEvent::SessionError { message } => {
            eprintln!("{RED}error: {message}{RESET}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0ms");
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(1000), "1s");
        assert_eq!(format_duration_ms(1250), "1.2s");
        assert_eq!(format_duration_ms(12000), "12s");
    }
}

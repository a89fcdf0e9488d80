/// Operator commands read from the console, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pause the stream and open a fresh one.
    Reinit,
    /// Shut the audio subsystem down and bring it back up.
    FullRestart,
    /// Call `debug_break`. Stops only under a debugger with a breakpoint
    /// set on that function; otherwise just logs.
    Breakpoint,
    Quit,
}

impl Command {
    /// Parse one input line. Anything outside the vocabulary yields `None`
    /// and is ignored by the loop.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "reinit" => Some(Self::Reinit),
            "s" | "full-restart" => Some(Self::FullRestart),
            "d" | "breakpoint" => Some(Self::Breakpoint),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub const MENU: &str = "\
Commands:
  r  reinit        pause the stream and open a new one
  s  full-restart  shut the audio subsystem down and restart it
  d  breakpoint    call `debug_break` (set a debugger breakpoint there to stop)
  q  quit          stop playback and exit
";

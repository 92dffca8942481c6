use std::path::PathBuf;

use anyhow::bail;

use crate::controller::Gesture;

pub const HELP: &str = "\
commands:
  t, tap            record / play / overdub
  h, hold           undo while looping, delete all while stopped
  d, double         stop
  dh, double-hold   delete all while looping
  u, undo           undo the last layer
  r, redo           restore the last undone layer
  l, level          print the input level
  e, export <path>  write the loop to a wav file
  ?, help           show this message
  q, quit           tear down and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Gesture(Gesture),
    Undo,
    Redo,
    Level,
    Export(PathBuf),
    Help,
    Quit,
}

/// Parses one line of console input. Blank lines yield `None`.
pub fn parse(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "t" | "tap" => ConsoleCommand::Gesture(Gesture::Tap),
        "h" | "hold" => ConsoleCommand::Gesture(Gesture::Hold),
        "d" | "double" => ConsoleCommand::Gesture(Gesture::DoubleTap),
        "dh" | "double-hold" => ConsoleCommand::Gesture(Gesture::DoubleTapHold),
        "u" | "undo" => ConsoleCommand::Undo,
        "r" | "redo" => ConsoleCommand::Redo,
        "l" | "level" => ConsoleCommand::Level,
        "e" | "export" => {
            let path = words.collect::<Vec<_>>().join(" ");
            if path.is_empty() {
                bail!("export needs a destination path");
            }
            ConsoleCommand::Export(PathBuf::from(path))
        }
        "?" | "help" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        other => bail!("unknown command '{}', type 'help' for a list", other),
    };

    Ok(Some(command))
}

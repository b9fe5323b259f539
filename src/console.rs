// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Line-oriented command source driving the device registry.
//!
//! ```text
//! add <device_id>     Add a device
//! remove <device_id>  Remove a device
//! list                List devices
//! exit                Stop the controller
//! ```

use std::io::BufRead;
use std::io::Write;

use anyhow::bail;
use anyhow::Result;
use tracing::info;

use crate::controller::ControlHandle;

pub const HELP: &str = "Commands:
  add <device_id>     Add device
  remove <device_id>  Remove device
  list                List devices
  exit                Stop controller";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(String),
    List,
    Exit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some(action) = words.first() else {
        return Ok(None);
    };

    let cmd = match (action.to_lowercase().as_str(), &words[1..]) {
        ("add", [id]) => Command::Add(id.to_string()),
        ("remove", [id]) => Command::Remove(id.to_string()),
        ("list", []) => Command::List,
        ("exit", []) => Command::Exit,
        _ => bail!("Invalid command: {}", line.trim()),
    };
    Ok(Some(cmd))
}

/// Apply `cmd` and report the result on `out`. Returns false once the
/// controller has been asked to stop.
pub fn execute<W: Write>(handle: &ControlHandle, cmd: &Command, out: &mut W) -> Result<bool> {
    match cmd {
        Command::Add(id) => match handle.registry.add(id.as_str()) {
            Ok(()) => writeln!(out, "Added device: {}", id)?,
            Err(e) => writeln!(out, "Warning: {}", e)?,
        },
        Command::Remove(id) => match handle.registry.remove(id) {
            Ok(()) => writeln!(out, "Removed device: {}", id)?,
            Err(e) => writeln!(out, "Warning: {}", e)?,
        },
        Command::List => {
            let devices = handle.registry.snapshot();
            let listed = if devices.is_empty() {
                "None".to_string()
            } else {
                devices.join(", ")
            };
            writeln!(out, "Connected devices ({}): {}", devices.len(), listed)?;
        }
        Command::Exit => {
            info!("Stopping controller on request");
            writeln!(out, "Stopping controller...")?;
            handle.stop();
            return Ok(false);
        }
    }
    Ok(true)
}

/// Read commands from `input` until `exit`, end of input or shutdown. End of
/// input stops the controller as well.
pub fn run<R: BufRead, W: Write>(handle: &ControlHandle, input: R, out: &mut W) -> Result<()> {
    writeln!(out, "{}", HELP)?;

    for line in input.lines() {
        if handle.is_stopped() {
            return Ok(());
        }
        let line = line?;
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "Error: {}", e)?;
                continue;
            }
        };
        if !execute(handle, &cmd, out)? {
            return Ok(());
        }
    }

    handle.stop();
    Ok(())
}

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::process::Command;
use watch_tools::transport::Runner;
use watch_tools::{Result, WatchError};

/// Runner recording every command line instead of running it.
#[derive(Debug, Default)]
pub struct Recorder {
    /// Program and arguments of each command, in order.
    pub calls: Vec<Vec<String>>,
    /// Served, in order, as standard output of `output` calls.
    pub outputs: VecDeque<String>,
    /// Commands whose command line contains one of these fail.
    pub failing: Vec<String>,
    /// Everything fed to `send` calls.
    pub sent: Vec<u8>,
    /// Served as standard output of `receive` calls.
    pub stream: Vec<u8>,
}

impl Recorder {
    pub fn with_output(output: &str) -> Self {
        let mut r = Self::default();
        r.outputs.push_back(output.to_string());
        r
    }

    pub fn failing(pattern: &str) -> Self {
        Self {
            failing: vec![pattern.to_string()],
            ..Self::default()
        }
    }

    /// Each recorded command as one space separated line.
    pub fn lines(&self) -> Vec<String> {
        self.calls.iter().map(|c| c.join(" ")).collect()
    }

    fn record(&mut self, cmd: &Command) -> Result<()> {
        let call: Vec<String> = std::iter::once(cmd.get_program())
            .chain(cmd.get_args())
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let line = call.join(" ");
        self.calls.push(call);
        if self.failing.iter().any(|f| line.contains(f.as_str())) {
            return Err(WatchError::CommandFailed {
                program: cmd.get_program().to_string_lossy().into_owned(),
                code: Some(1),
            });
        }
        Ok(())
    }
}

impl Runner for Recorder {
    fn run(&mut self, cmd: Command) -> Result<()> {
        self.record(&cmd)
    }

    fn output(&mut self, cmd: Command) -> Result<String> {
        self.record(&cmd)?;
        Ok(self.outputs.pop_front().unwrap_or_default())
    }

    fn send(&mut self, cmd: Command, input: &mut dyn Read) -> Result<u64> {
        self.record(&cmd)?;
        Ok(io::copy(input, &mut self.sent)?)
    }

    fn receive(&mut self, cmd: Command, output: &mut dyn Write) -> Result<u64> {
        // a failing command still delivers its stream, like a transfer
        // interrupted at the end
        let recorded = self.record(&cmd);
        output.write_all(&self.stream)?;
        recorded?;
        Ok(self.stream.len() as u64)
    }
}

/// Image of `sectors` 512 byte sectors, every byte of sector `n` set to
/// `n as u8`.
pub fn numbered_image(sectors: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(sectors * 512);
    for s in 0..sectors {
        bytes.extend(std::iter::repeat(s as u8).take(512));
    }
    bytes
}

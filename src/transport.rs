//! Command lines for reaching the watch and the runner executing them.
//!
//! A [`Remote`] only builds [`Command`]s, it never spawns anything. Commands
//! are handed to a [`Runner`]; [`System`] runs them for real, tests use a
//! runner that records them.

use crate::{Result, WatchError};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// How the watch is reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// `ssh`/`scp` over USB networking or wifi.
    Ssh,
    /// Android debug bridge.
    Adb,
}

/// Account a remote command runs as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Login {
    /// `root`
    Root,
    /// The session user owning the launcher and its settings.
    User,
}

/// Name of the session user on the watch.
pub const USER: &str = "ceres";

impl Login {
    /// Account name on the watch.
    pub fn name(&self) -> &'static str {
        match self {
            Login::Root => "root",
            Login::User => USER,
        }
    }
}

/// Something that can run external commands.
///
/// A command exiting unsuccessfully is reported as
/// [`WatchError::CommandFailed`].
pub trait Runner {
    /// Run `cmd` to completion with inherited stdio.
    fn run(&mut self, cmd: Command) -> Result<()>;

    /// Run `cmd` and capture its standard output.
    fn output(&mut self, cmd: Command) -> Result<String>;

    /// Run `cmd`, feeding `input` to its standard input.
    /// Returns the number of bytes sent.
    fn send(&mut self, cmd: Command, input: &mut dyn Read) -> Result<u64>;

    /// Run `cmd`, copying its standard output into `output`.
    /// Returns the number of bytes received.
    fn receive(&mut self, cmd: Command, output: &mut dyn Write) -> Result<u64>;
}

impl<R: Runner + ?Sized> Runner for &mut R {
    fn run(&mut self, cmd: Command) -> Result<()> {
        (**self).run(cmd)
    }

    fn output(&mut self, cmd: Command) -> Result<String> {
        (**self).output(cmd)
    }

    fn send(&mut self, cmd: Command, input: &mut dyn Read) -> Result<u64> {
        (**self).send(cmd, input)
    }

    fn receive(&mut self, cmd: Command, output: &mut dyn Write) -> Result<u64> {
        (**self).receive(cmd, output)
    }
}

/// Runs commands as child processes of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct System;

fn program(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn check(cmd: &Command, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        debug!("{:?} exited with {}", cmd, status);
        Err(WatchError::CommandFailed {
            program: program(cmd),
            code: status.code(),
        })
    }
}

impl Runner for System {
    fn run(&mut self, mut cmd: Command) -> Result<()> {
        debug!("running {:?}", cmd);
        let status = cmd.status()?;
        check(&cmd, status)
    }

    fn output(&mut self, mut cmd: Command) -> Result<String> {
        debug!("running {:?}", cmd);
        let out = cmd.stderr(Stdio::inherit()).output()?;
        check(&cmd, out.status)?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn send(&mut self, mut cmd: Command, input: &mut dyn Read) -> Result<u64> {
        debug!("streaming into {:?}", cmd);
        let mut child = cmd.stdin(Stdio::piped()).spawn()?;
        let sent = match child.stdin.take() {
            // stdin is closed when dropped at the end of this arm
            Some(mut stdin) => io::copy(input, &mut stdin),
            None => Err(io::Error::new(io::ErrorKind::Other, "child has no stdin")),
        };
        let status = child.wait()?;
        check(&cmd, status)?;
        Ok(sent?)
    }

    fn receive(&mut self, mut cmd: Command, output: &mut dyn Write) -> Result<u64> {
        debug!("streaming from {:?}", cmd);
        let mut child = cmd.stdout(Stdio::piped()).spawn()?;
        let received = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, output),
            None => Err(io::Error::new(io::ErrorKind::Other, "child has no stdout")),
        };
        if received.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let received = received?;
        check(&cmd, status)?;
        output.flush()?;
        Ok(received)
    }
}

/// Quote `s` for a POSIX shell.
pub fn quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"@%+=:,./_-".contains(&b));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Address of the watch and the transport used to reach it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Remote {
    mode: Mode,
    host: String,
    port: u16,
}

impl Remote {
    /// Create a remote reached with `mode` at `host:port`. Host and port are
    /// ignored by ADB.
    pub fn new(mode: Mode, host: &str, port: u16) -> Self {
        Self {
            mode,
            host: host.to_string(),
            port,
        }
    }

    /// Transport used.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Login and address of the watch, `adb` when using ADB.
    pub fn address(&self, login: Login) -> String {
        match self.mode {
            Mode::Ssh => format!("{}@{}", login.name(), self.host),
            Mode::Adb => "adb".to_string(),
        }
    }

    /// Human readable label of `path` on the watch, e.g.
    /// `root@192.168.2.15:/dev/mmcblk0p21`.
    pub fn label(&self, login: Login, path: &str) -> String {
        format!("{}:{}", self.address(login), path)
    }

    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p").arg(self.port.to_string());
        cmd
    }

    fn scp(&self) -> Command {
        let mut cmd = Command::new("scp");
        cmd.arg("-P").arg(self.port.to_string()).arg("-r");
        cmd
    }

    /// Run the shell command line `command` on the watch as `login`.
    pub fn shell(&self, login: Login, command: &str) -> Command {
        match self.mode {
            Mode::Ssh => {
                let mut cmd = self.ssh();
                cmd.arg(format!("{}@{}", login.name(), self.host)).arg(command);
                cmd
            }
            Mode::Adb => {
                let mut cmd = Command::new("adb");
                cmd.arg("shell");
                match login {
                    Login::Root => cmd.arg(command),
                    Login::User => cmd.arg(format!("su -l {} -c {}", USER, quote(command))),
                };
                cmd
            }
        }
    }

    /// Check whether the watch answers, without prompting for anything.
    pub fn probe(&self) -> Command {
        match self.mode {
            Mode::Ssh => {
                let mut cmd = self.ssh();
                cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=3"])
                    .arg(format!("{}@{}", Login::Root.name(), self.host))
                    .arg("true");
                cmd
            }
            Mode::Adb => {
                let mut cmd = Command::new("adb");
                cmd.arg("get-state");
                cmd
            }
        }
    }

    /// Copy the local file or folder `local` to `remote` on the watch.
    pub fn push(&self, login: Login, local: &Path, remote: &str) -> Command {
        match self.mode {
            Mode::Ssh => {
                let mut cmd = self.scp();
                cmd.arg(local)
                    .arg(format!("{}@{}:{}", login.name(), self.host, remote));
                cmd
            }
            Mode::Adb => {
                let mut cmd = Command::new("adb");
                cmd.arg("push").arg(local).arg(remote);
                cmd
            }
        }
    }

    /// Copy the file or folder `remote` from the watch to `local`.
    pub fn pull(&self, login: Login, remote: &str, local: &Path) -> Command {
        match self.mode {
            Mode::Ssh => {
                let mut cmd = self.scp();
                cmd.arg(format!("{}@{}:{}", login.name(), self.host, remote))
                    .arg(local);
                cmd
            }
            Mode::Adb => {
                let mut cmd = Command::new("adb");
                cmd.arg("pull").arg(remote).arg(local);
                cmd
            }
        }
    }

    /// Reboot the watch, into the bootloader if `bootloader` is set.
    pub fn reboot(&self, bootloader: bool) -> Command {
        match self.mode {
            Mode::Ssh if bootloader => self.shell(Login::Root, "reboot bootloader"),
            Mode::Ssh => self.shell(Login::Root, "reboot"),
            Mode::Adb => {
                let mut cmd = Command::new("adb");
                cmd.arg("reboot");
                if bootloader {
                    cmd.arg("bootloader");
                }
                cmd
            }
        }
    }

    /// Host key entry of the watch in `known_hosts`.
    pub fn known_hosts_entry(&self) -> String {
        if self.port == crate::DEFAULT_PORT {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }
}

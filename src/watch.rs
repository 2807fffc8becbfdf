//! Day to day management of a watch: settings backups, screenshots, time,
//! wallpapers and watchfaces.

use crate::transport::{quote, Login, Mode, Remote, Runner, USER};
use crate::{Result, WatchError};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Folder backups are written to when none is given.
pub const DEFAULT_BACKUP_DIR: &str = "watch-backup";
/// File a screenshot is saved to when none is given.
pub const DEFAULT_SCREENSHOT: &str = "screenshot.jpg";
/// Address of this machine as seen from the watch over USB networking.
pub const DEFAULT_GATEWAY: &str = "192.168.2.1";
/// Name server configured by [`Watch::routing`].
pub const NAMESERVER: &str = "1.1.1.1";

const WALLPAPER_DIR: &str = "/home/ceres/Pictures/wallpapers";
const WATCHFACE_DIR: &str = "/usr/share/asteroid-launcher/watchfaces";
const SCREENSHOT_PATH: &str = "/tmp/watch-screenshot.jpg";
const WALLPAPER_KEY: &str = "/desktop/asteroid/background-filename";
const WATCHFACE_KEY: &str = "/desktop/asteroid/watchface";
/// Unit running the session of [`USER`].
const SESSION_UNIT: &str = "user@1000";

/// A category of settings saved by [`Watch::backup`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SettingsGroup {
    /// Subfolder of the backup holding this group.
    pub folder: &'static str,
    /// Owner of the files on the watch.
    pub login: Login,
    /// Files and folders making up the group.
    pub paths: &'static [&'static str],
}

/// Everything a backup contains.
pub const SETTINGS: [SettingsGroup; 2] = [
    SettingsGroup {
        folder: "system",
        login: Login::Root,
        paths: &["/var/lib/connman", "/var/lib/bluetooth"],
    },
    SettingsGroup {
        folder: "user",
        login: Login::User,
        paths: &["/home/ceres/.config"],
    },
];

/// Display behaviour selected by [`Watch::screen`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScreenMode {
    /// Keep the display on.
    On,
    /// Let the display blank normally.
    Off,
}

/// Split `/a/b/c` into `/a/b/` and `c`.
fn split_remote(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("./", path),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", path.display()),
            )
            .into()
        })
}

/// Value for a dconf string key pointing at `path`.
fn file_url(path: &str) -> String {
    format!("'file://{path}'")
}

/// Management commands for one watch.
#[derive(Debug)]
pub struct Watch<R, W> {
    remote: Remote,
    runner: R,
    out: W,
    poll_interval: Duration,
    attempts: u32,
}

impl<R: Runner, W: Write> Watch<R, W> {
    /// Manage the watch at `remote`, running commands with `runner` and
    /// printing to `out`.
    pub fn new(remote: Remote, runner: R, out: W) -> Self {
        Self {
            remote,
            runner,
            out,
            poll_interval: Duration::from_secs(1),
            attempts: 120,
        }
    }

    /// How often and how many times [`wait`](Self::wait) probes the watch.
    pub fn polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.attempts = attempts;
        self
    }

    /// Take back the runner and the output.
    pub fn into_inner(self) -> (R, W) {
        (self.runner, self.out)
    }

    fn root(&mut self, command: &str) -> Result<()> {
        let cmd = self.remote.shell(Login::Root, command);
        self.runner.run(cmd)
    }

    fn user(&mut self, command: &str) -> Result<()> {
        let cmd = self.remote.shell(Login::User, command);
        self.runner.run(cmd)
    }

    /// Push `local` into the folder `remote_dir` owned by `login`.
    fn push(&mut self, login: Login, local: &Path, remote_dir: &str) -> Result<()> {
        let cmd = self.remote.push(login, local, remote_dir);
        self.runner.run(cmd)?;
        // adb always writes as root
        if self.remote.mode() == Mode::Adb && login == Login::User {
            let target = format!("{}/{}", remote_dir.trim_end_matches('/'), file_name(local)?);
            self.root(&format!("chown -R {USER}:{USER} {}", quote(&target)))?;
        }
        Ok(())
    }

    /// Copy the settings of the watch into `dir/system` and `dir/user`.
    pub fn backup(&mut self, dir: &Path) -> Result<()> {
        for group in SETTINGS {
            let folder = dir.join(group.folder);
            fs::create_dir_all(&folder)?;
            for path in group.paths {
                debug!("backing up {} into {}", path, folder.display());
                let cmd = self.remote.pull(group.login, path, &folder);
                self.runner.run(cmd)?;
            }
        }
        writeln!(self.out, "settings saved to {}", dir.display())?;
        Ok(())
    }

    /// Put settings saved by [`backup`](Self::backup) back onto the watch.
    pub fn restore(&mut self, dir: &Path) -> Result<()> {
        for group in SETTINGS {
            let folder = dir.join(group.folder);
            if !folder.is_dir() {
                return Err(WatchError::MissingBackup(folder));
            }
        }
        for group in SETTINGS {
            let folder = dir.join(group.folder);
            for path in group.paths {
                let (parent, name) = split_remote(path);
                let local = folder.join(name);
                if !local.exists() {
                    warn!("{} is not in the backup, skipping", local.display());
                    continue;
                }
                self.push(group.login, &local, parent)?;
            }
        }
        writeln!(self.out, "settings restored from {}", dir.display())?;
        Ok(())
    }

    /// Reboot into the bootloader.
    pub fn fastboot(&mut self) -> Result<()> {
        let cmd = self.remote.reboot(true);
        self.runner.run(cmd)
    }

    /// Reboot the watch.
    pub fn reboot(&mut self) -> Result<()> {
        let cmd = self.remote.reboot(false);
        self.runner.run(cmd)
    }

    /// Drop the host key of the watch from `known_hosts`, e.g. after
    /// flashing a new image.
    pub fn forget_keys(&mut self) -> Result<()> {
        if self.remote.mode() == Mode::Adb {
            return Err(WatchError::Unsupported("forgetting host keys with adb"));
        }
        let mut cmd = Command::new("ssh-keygen");
        cmd.arg("-R").arg(self.remote.known_hosts_entry());
        self.runner.run(cmd)
    }

    /// Whether the watch answers.
    pub fn present(&mut self) -> bool {
        let cmd = self.remote.probe();
        match self.runner.run(cmd) {
            Ok(()) => true,
            Err(e) => {
                debug!("watch not present: {}", e);
                false
            }
        }
    }

    /// Block until the watch answers.
    pub fn wait(&mut self) -> Result<()> {
        for attempt in 0..self.attempts {
            if self.present() {
                return Ok(());
            }
            trace!("waiting for the watch, attempt {}", attempt + 1);
            thread::sleep(self.poll_interval);
        }
        Err(WatchError::NotPresent)
    }

    /// Take a screenshot and save it to `local`.
    pub fn snap(&mut self, local: &Path) -> Result<()> {
        if local.exists() {
            return Err(WatchError::DestinationExists(local.to_path_buf()));
        }
        self.user(&format!("screenshottool {SCREENSHOT_PATH} 0"))?;
        let cmd = self.remote.pull(Login::User, SCREENSHOT_PATH, local);
        self.runner.run(cmd)?;
        self.user(&format!("rm -f {SCREENSHOT_PATH}"))?;
        writeln!(self.out, "screenshot saved to {}", local.display())?;
        Ok(())
    }

    /// Set the clock of the watch to `now`.
    pub fn set_time(&mut self, now: SystemTime) -> Result<()> {
        let secs = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| WatchError::Overflow("time before the epoch"))?
            .as_secs();
        self.root(&format!("date -u -s @{secs}"))
    }

    /// Print the timezones the watch knows about.
    pub fn list_timezones(&mut self) -> Result<()> {
        let cmd = self.remote.shell(Login::Root, "timedatectl list-timezones");
        let zones = self.runner.output(cmd)?;
        self.out.write_all(zones.as_bytes())?;
        Ok(())
    }

    /// Set the timezone, e.g. `Europe/Berlin`.
    pub fn set_timezone(&mut self, zone: &str) -> Result<()> {
        self.root(&format!("timedatectl set-timezone {}", quote(zone)))
    }

    /// Upload `image` and make it the wallpaper.
    pub fn wallpaper(&mut self, image: &Path) -> Result<()> {
        let name = file_name(image)?;
        self.user(&format!("mkdir -p {WALLPAPER_DIR}"))?;
        self.push(Login::User, image, &format!("{WALLPAPER_DIR}/"))?;
        let url = file_url(&format!("{WALLPAPER_DIR}/{name}"));
        self.user(&format!("dconf write {WALLPAPER_KEY} {}", quote(&url)))
    }

    /// Restart the user session, reloading the launcher.
    pub fn restart(&mut self) -> Result<()> {
        self.root(&format!("systemctl restart {SESSION_UNIT}"))
    }

    /// Route the traffic of the watch through `gateway` and set a name
    /// server.
    pub fn routing(&mut self, gateway: &str) -> Result<()> {
        self.root(&format!(
            "ip route replace default via {} && echo 'nameserver {}' > /etc/resolv.conf",
            quote(gateway),
            NAMESERVER
        ))
    }

    /// Upload a watchface tree. `dir` must contain the `usr` folder to
    /// merge into the root of the watch.
    pub fn push_face(&mut self, dir: &Path) -> Result<()> {
        let usr = dir.join("usr");
        if !usr.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has no usr folder", dir.display()),
            )
            .into());
        }
        self.push(Login::Root, &usr, "/")?;
        writeln!(self.out, "watchface pushed from {}", dir.display())?;
        Ok(())
    }

    /// Make the installed watchface `name` the active one.
    pub fn watchface(&mut self, name: &str) -> Result<()> {
        let name = name.strip_suffix(".qml").unwrap_or(name);
        let url = file_url(&format!("{WATCHFACE_DIR}/{name}.qml"));
        self.user(&format!("dconf write {WATCHFACE_KEY} {}", quote(&url)))
    }

    /// Keep the display on, or let it blank again.
    pub fn screen(&mut self, mode: ScreenMode) -> Result<()> {
        let inhibit = match mode {
            ScreenMode::On => "stay-on",
            ScreenMode::Off => "disabled",
        };
        self.root(&format!("mcetool --set-inhibit-mode={inhibit}"))
    }
}

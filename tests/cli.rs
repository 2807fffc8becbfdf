use std::process::{Command, Output};
use tempfile::NamedTempFile;

fn watch_image(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_watch-image"))
        .args(args)
        .output()
        .expect("failed to run watch-image")
}

fn watch_util(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_watch-util"))
        .args(args)
        .output()
        .expect("failed to run watch-util")
}

#[test]
fn help_lists_watches_and_exits_1() {
    let out = watch_image(&["--help"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--dryrun"));
    assert!(stdout.contains("catfish"));
}

#[test]
fn version_exits_0() {
    let out = watch_image(&["-v"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("watch-image "));
}

#[test]
fn bad_codename_prints_help() {
    for args in [&["-s", "nosuchwatch"][..], &["-r"][..]] {
        let out = watch_image(args);
        assert_eq!(out.status.code(), Some(0));
        assert!(String::from_utf8_lossy(&out.stdout).contains("Supported watches"));
    }
}

#[test]
fn save_refuses_existing_image() {
    let image = NamedTempFile::new().unwrap();
    let path = image.path().to_str().unwrap();
    let out = watch_image(&["-s", "-i", path, "catfish"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn restore_needs_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("original-catfish.img");
    let out = watch_image(&["-r", "-N", "-i", missing.to_str().unwrap(), "catfish"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
}

#[test]
fn dry_run_save_describes_the_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("new.img");
    let out = watch_image(&["-s", "-N", "-R", "10.0.0.9", "-i", image.to_str().unwrap(), "sparrow"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("[dry run] saving root@10.0.0.9:/dev/mmcblk0 to "));
    assert!(!image.exists());
}

#[test]
fn util_without_command_shows_help() {
    let out = watch_util(&[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("settimezone"));
}

#[test]
fn default_image_follows_the_codename() {
    let dir = tempfile::tempdir().unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_watch-image"))
        .args(["-r", "-N", "catfish"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("original-catfish.img"));

    let out = Command::new(env!("CARGO_BIN_EXE_watch-image"))
        .args(["-s", "-N", "sparrow"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).trim_end().ends_with(" to original-sparrow.img"));
}

#[test]
fn sector_size_must_be_512_or_4096() {
    let out = watch_image(&["--sector-size", "1000", "-s", "-N", "catfish"]);
    assert_ne!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stderr).contains("512 or 4096"));

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("new.img");
    let out = watch_image(&["--sector-size", "4096", "-s", "-N", "-i", image.to_str().unwrap(), "catfish"]);
    assert_eq!(out.status.code(), Some(0));
}

use std::time::Duration;

use assert_cmd::Command;

const TIMEOUT_DURATION: Duration = Duration::from_secs(20);

fn headless_command() -> Result<Command, anyhow::Error> {
    let mut command = Command::cargo_bin(env!("CARGO_PKG_NAME"))?;
    command.env("HEADLESS", "true").timeout(TIMEOUT_DURATION);
    Ok(command)
}

#[test]
fn main_doesnt_panic() -> Result<(), anyhow::Error> {
    headless_command()?.assert().success();
    Ok(())
}

#[test]
fn main_survives_failing_device() -> Result<(), anyhow::Error> {
    let assert = headless_command()?
        .env("DEPTH_CLOUD_FAILED_STARTS", "2")
        .env("DEPTH_CLOUD_HEADLESS_FRAMES", "92")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("restarting at frame 0"));
    assert!(stdout.contains("restarting at frame 90"));
    assert_eq!(stdout.matches("restart failed").count(), 1);
    assert!(stdout.contains("Synthetic depth camera started"));
    Ok(())
}

#[test]
fn main_ignores_malformed_settings() -> Result<(), anyhow::Error> {
    headless_command()?
        .env("DEPTH_CLOUD_FAILED_STARTS", "many")
        .env("DEPTH_CLOUD_HEADLESS_FRAMES", "-1")
        .assert()
        .success();
    Ok(())
}

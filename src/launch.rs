use crate::error::{Error, Result};
use std::{
    path::Path,
    process::{Command, Stdio},
};

/// Spawn an external tool detached from our stdio and forget about it.
///
/// Success means the process started; nobody waits on it and its exit
/// status is never reported. Returns the child pid for the log line.
pub fn spawn_detached(command: &[String]) -> Result<u32> {
    let Some((program, args)) = command.split_first() else {
        return Err(Error::ConfigMissing { field: "command" });
    };
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| Error::fs("spawn", Path::new(program), err))?;
    let pid = child.id();
    tracing::info!(%program, pid, "launched");
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_filesystem_error() {
        let command = vec!["balmora-test-no-such-binary".to_string()];
        let err = spawn_detached(&command).unwrap_err();
        assert!(matches!(err, Error::FileSystem { op: "spawn", .. }));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_returns_without_waiting() {
        let command = vec!["sleep".to_string(), "30".to_string()];
        let started = std::time::Instant::now();
        let pid = spawn_detached(&command).unwrap();
        assert!(pid > 0);
        assert!(started.elapsed().as_secs() < 5);
    }
}

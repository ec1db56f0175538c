use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

const EXIT_POLL: Duration = Duration::from_millis(20);

/// Locate an executable the way a shell would.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Quote one argument for `sh -c`.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=@,+%".contains(&b));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

pub fn shell_join<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
pub fn terminate_process(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(%status, "producer already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to query producer status"),
    }

    request_exit(child);

    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(%status, "producer exited");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "failed to query producer status");
                break;
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(EXIT_POLL));
    }

    warn!(pid = child.id(), ?grace, "producer ignored termination, killing it");
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill producer");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap producer");
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

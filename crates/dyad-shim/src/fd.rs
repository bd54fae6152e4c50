//! Descriptor and path probes used by the applicability checks.

use libc::c_int;

use tracing::debug;

pub(crate) fn is_path_dir(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

pub(crate) fn is_fd_dir(fd: c_int) -> bool {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        return false;
    }
    (st.st_mode & libc::S_IFMT) == libc::S_IFDIR
}

/// The filesystem path behind `fd`, when it has one. Pipes, sockets and
/// unlinked files resolve to non-path targets and yield `None`.
pub(crate) fn fd_path(fd: c_int) -> Option<String> {
    let target = std::fs::read_link(format!("/proc/self/fd/{fd}")).ok()?;
    let s = target.to_str()?;
    if !s.starts_with('/') || s.ends_with(" (deleted)") {
        return None;
    }
    Some(s.to_string())
}

/// Whether `fd` was opened write-only. `None` when the descriptor cannot be
/// queried at all.
pub(crate) fn is_wronly(fd: c_int) -> Option<bool> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        debug!(fd, "fcntl(F_GETFL) failed");
        return None;
    }
    Some((flags & libc::O_ACCMODE) == libc::O_WRONLY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_fd_path_resolves_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("probe.txt");
        std::fs::write(&file_path, b"x").unwrap();
        let f = std::fs::File::open(&file_path).unwrap();
        let resolved = fd_path(f.as_raw_fd()).unwrap();
        assert!(resolved.ends_with("probe.txt"));
    }

    #[test]
    fn test_fd_path_rejects_pipes() {
        let mut fds = [0 as c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        assert!(fd_path(fds[0]).is_none());
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }

    #[test]
    fn test_is_wronly_matches_open_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("mode.txt");

        let w = std::fs::File::create(&file_path).unwrap();
        assert_eq!(is_wronly(w.as_raw_fd()), Some(true));

        let r = std::fs::File::open(&file_path).unwrap();
        assert_eq!(is_wronly(r.as_raw_fd()), Some(false));
    }

    #[test]
    fn test_is_fd_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = std::fs::File::open(tmp.path()).unwrap();
        assert!(is_fd_dir(dir.as_raw_fd()));

        let file_path = tmp.path().join("f");
        std::fs::write(&file_path, b"x").unwrap();
        let f = std::fs::File::open(&file_path).unwrap();
        assert!(!is_fd_dir(f.as_raw_fd()));
    }

    #[test]
    fn test_is_path_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(is_path_dir(tmp.path().to_str().unwrap()));
        assert!(!is_path_dir("/definitely/not/a/real/path"));
    }
}

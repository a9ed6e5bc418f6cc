use crate::error::{Result, ShellError};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolve `argv[0]` to something `Command::new` can launch.
///
/// Reads `PATH` from the process environment at call time, so a `PATH`
/// changed by the parent process is honoured. Shell variables set with
/// `set` play no part here.
pub(crate) fn resolve_program(name: &str) -> Result<PathBuf> {
    let search_paths = std::env::var_os("PATH").unwrap_or_default();
    find_command_path(&search_paths, Path::new(name))
        .map(Cow::into_owned)
        .ok_or_else(|| ShellError::CommandNotFound {
            program: name.to_string(),
        })
}

/// Resolve a command path the way `execvp` would.
///
/// - Any path containing a separator (`/bin/ls`, `./run`, `bin/tool`) is
///   used as-is when it exists; permission problems surface at spawn time.
/// - A bare name is looked up in each directory of `search_paths` in order.
///   The first executable file wins; failing that, the first plain file is
///   returned so that spawning it reports permission denied rather than
///   not found.
/// - An empty name resolves to nothing.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(std::path::Component::Normal(name)), None) => {
            find_in_path(search_paths, name).map(Cow::Owned)
        }
        _ => path.exists().then_some(Cow::Borrowed(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    let mut denied = None;
    for candidate in std::env::split_paths(search_paths).map(|dir| dir.join(cmd)) {
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if denied.is_none() && candidate.is_file() {
            denied = Some(candidate);
        }
    }
    denied
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/does/not/matter"), path);
        assert_eq!(found.as_deref(), Some(path));
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/xsh_nonexisting");
        assert!(find_command_path(osstr("/bin"), path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nosuchprogram123")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_files_are_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let plain = tempfile::tempdir().unwrap();
        File::create(plain.path().join("tool")).unwrap();

        let exec = tempfile::tempdir().unwrap();
        let tool = exec.path().join("tool");
        File::create(&tool).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let search = std::env::join_paths([plain.path(), exec.path()]).unwrap();
        let found = find_command_path(&search, Path::new("tool")).unwrap();
        assert_eq!(found.as_ref(), tool.as_path());
    }

    #[test]
    fn relative_with_separator_is_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        File::create(dir.path().join("bin").join("tool")).unwrap();

        let search = dir.path().as_os_str();
        assert!(find_command_path(search, Path::new("bin/xsh_missing_tool")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_match_is_kept_as_last_resort() {
        let plain = tempfile::tempdir().unwrap();
        let tool = plain.path().join("tool");
        File::create(&tool).unwrap();

        let found = find_command_path(plain.path().as_os_str(), Path::new("tool")).unwrap();
        assert_eq!(found.as_ref(), tool.as_path());
    }

    #[test]
    fn resolve_reports_not_found() {
        let err = resolve_program("nosuchprogram123").unwrap_err();
        assert!(matches!(err, ShellError::CommandNotFound { .. }));
        assert_eq!(err.exit_code(), 127);
    }
}

//! cd - Change directory builtin
//!
//! Supports:
//! - cd [dir] - change to directory
//! - cd, cd ~ - change to the home directory
//! - cd ~/sub - path relative to the home directory
//!
//! The working directory is process-wide: a successful `cd` is visible to
//! every later command and to the host.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::interpreter::builtin_dispatch::BuiltinContext;

/// Handle the cd builtin command
pub fn handle_cd(ctx: &mut BuiltinContext<'_>) -> io::Result<i32> {
    if ctx.args.len() > 1 {
        writeln!(ctx.stderr, "embsh: cd: too many arguments")?;
        return Ok(1);
    }

    let target = match ctx.args.first().map(String::as_str) {
        None | Some("~") => home_directory(ctx.home_dir),
        Some(dir) => match dir.strip_prefix("~/") {
            Some(rest) => home_directory(ctx.home_dir).map(|home| home.join(rest)),
            None => Some(PathBuf::from(dir)),
        },
    };
    let Some(target) = target else {
        writeln!(ctx.stderr, "embsh: cd: HOME not set")?;
        return Ok(1);
    };

    if !target.exists() {
        writeln!(ctx.stderr, "embsh: cd: {}: No such file or directory", target.display())?;
        return Ok(1);
    }
    if !target.is_dir() {
        writeln!(ctx.stderr, "embsh: cd: {}: Not a directory", target.display())?;
        return Ok(1);
    }

    match env::set_current_dir(&target) {
        Ok(()) => {
            debug!(dir = %target.display(), "changed directory");
            Ok(0)
        }
        Err(e) => {
            writeln!(ctx.stderr, "embsh: cd: {}: {}", target.display(), e)?;
            Ok(1)
        }
    }
}

/// Configured home, else `HOME`, else `USERPROFILE`.
fn home_directory(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(home) = configured {
        return Some(home.to_path_buf());
    }
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var_os(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::builtin_dispatch::test_support::run;
    use crate::interpreter::builtin_dispatch::Builtin;
    use crate::CWD_LOCK;
    use std::env;

    /// Restores the working directory when a test ends.
    struct CwdGuard(std::path::PathBuf);

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = env::set_current_dir(&self.0);
        }
    }

    #[test]
    fn test_cd_to_directory() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = CwdGuard(env::current_dir().unwrap());
        let dir = tempfile::tempdir().unwrap();

        let (status, out, err) = run(Builtin::Cd, &[dir.path().to_str().unwrap()], 0, None);
        assert_eq!(status, 0);
        assert!(out.is_empty());
        assert!(err.is_empty());
        assert_eq!(
            env::current_dir().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_cd_missing_directory_keeps_cwd() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = env::current_dir().unwrap();

        let (status, _, err) = run(Builtin::Cd, &["/definitely/does/not/exist"], 0, None);
        assert_eq!(status, 1);
        assert!(err.contains("No such file or directory"));
        assert_eq!(env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_cd_not_a_directory() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = tempfile::NamedTempFile::new().unwrap();

        let (status, _, err) = run(Builtin::Cd, &[file.path().to_str().unwrap()], 0, None);
        assert_eq!(status, 1);
        assert!(err.contains("Not a directory"));
    }

    #[test]
    fn test_cd_home() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = CwdGuard(env::current_dir().unwrap());
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join("sub")).unwrap();

        let (status, _, _) = run(Builtin::Cd, &[], 0, Some(home.path()));
        assert_eq!(status, 0);
        assert_eq!(
            env::current_dir().unwrap().canonicalize().unwrap(),
            home.path().canonicalize().unwrap()
        );

        let (status, _, _) = run(Builtin::Cd, &["~/sub"], 0, Some(home.path()));
        assert_eq!(status, 0);
        assert_eq!(
            env::current_dir().unwrap().canonicalize().unwrap(),
            home.path().join("sub").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_cd_too_many_arguments() {
        let (status, _, err) = run(Builtin::Cd, &["a", "b"], 0, None);
        assert_eq!(status, 1);
        assert!(err.contains("too many arguments"));
    }
}

//! pwd - Print working directory builtin
//!
//! `-P` prints the physical path with symlinks resolved; `-L` (default)
//! prints the directory as the process reports it.

use std::env;
use std::io::{self, Write};

use crate::interpreter::builtin_dispatch::BuiltinContext;

pub fn handle_pwd(ctx: &mut BuiltinContext<'_>) -> io::Result<i32> {
    let mut physical = false;
    for arg in ctx.args {
        match arg.as_str() {
            "-P" => physical = true,
            "-L" => physical = false,
            "--" => break,
            // Ignore unknown options (bash behavior)
            _ => {}
        }
    }

    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            writeln!(ctx.stderr, "embsh: pwd: {}", e)?;
            return Ok(1);
        }
    };
    let cwd = if physical {
        cwd.canonicalize().unwrap_or(cwd)
    } else {
        cwd
    };

    writeln!(ctx.stdout, "{}", cwd.display())?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::builtin_dispatch::test_support::run;
    use crate::interpreter::builtin_dispatch::Builtin;
    use crate::CWD_LOCK;

    #[test]
    fn test_pwd_prints_cwd() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let expected = format!("{}\n", std::env::current_dir().unwrap().display());
        let (status, out, err) = run(Builtin::Pwd, &[], 0, None);
        assert_eq!(status, 0);
        assert_eq!(out, expected);
        assert!(err.is_empty());
    }

    #[test]
    fn test_pwd_physical() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let expected = format!(
            "{}\n",
            std::env::current_dir().unwrap().canonicalize().unwrap().display()
        );
        let (status, out, _) = run(Builtin::Pwd, &["-P"], 0, None);
        assert_eq!(status, 0);
        assert_eq!(out, expected);
    }
}

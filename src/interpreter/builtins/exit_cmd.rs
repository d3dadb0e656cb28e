//! exit - Exit shell builtin

use std::io::{self, Write};

use crate::interpreter::builtin_dispatch::BuiltinContext;

/// Handle the exit builtin command.
///
/// # Returns
/// The status to exit with. Whether that ends the host process or only
/// the current evaluation is decided by the caller.
pub fn handle_exit(ctx: &mut BuiltinContext<'_>) -> io::Result<i32> {
    let Some(arg) = ctx.args.first() else {
        // Use last command's exit code when no argument given
        return Ok(ctx.last_status);
    };

    // Empty string or non-numeric is an error
    let numeric = !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit() || c == '-');
    match arg.parse::<i64>() {
        // Exit codes are modulo 256 (wrap around)
        Ok(parsed) if numeric => Ok(parsed.rem_euclid(256) as i32),
        _ => {
            writeln!(ctx.stderr, "embsh: exit: {}: numeric argument required", arg)?;
            Ok(2)
        }
    }
}

//! Terminal detection for colored output.

use std::io::IsTerminal;

/// Whether human output should be colored.
///
/// `--no-color` and `NO_COLOR` always win; `CLICOLOR_FORCE` colors even when
/// stdout is piped.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    if no_color_flag || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0") {
        return true;
    }
    if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
        return false;
    }
    std::io::stdout().is_terminal()
}

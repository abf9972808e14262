use std::fmt::Display;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::{colors_enabled, style};
use indicatif::ProgressBar;

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn brand_accent<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).cyan()
}

pub fn brand_muted<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).dim()
}

pub fn brand_success<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).green()
}

pub fn brand_warning<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).yellow()
}

pub fn brand_error<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).red()
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn section(title: &str) {
    println!();
    println!("{}", brand_accent(title).bold());
}

pub fn step(message: &str) {
    println!("{} {}", brand_accent("•").bold(), message);
}

pub fn success(message: &str) {
    println!("{} {}", brand_success("✓").bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", brand_warning("!").bold(), message);
}

pub fn error(message: &str) {
    println!("{} {}", brand_error("✗").bold(), message);
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", brand_error("✗").bold(), message);
}

pub fn muted(message: &str) {
    println!("{}", brand_muted(message));
}

/// Print only with `--verbose`.
pub fn detail(message: &str) {
    if is_verbose() {
        muted(message);
    }
}

pub fn emphasized(value: &str) -> String {
    if std::io::stdout().is_terminal() && colors_enabled() {
        format!("\x1b[3m{}\x1b[23m", value)
    } else {
        format!("'{}'", value)
    }
}

/// Run `work` behind a spinner when attached to a terminal.
pub fn with_spinner<T, F>(message: &str, work: F) -> T
where
    F: FnOnce() -> T,
{
    if !(std::io::stdout().is_terminal() && std::io::stderr().is_terminal()) {
        return work();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    let result = work();
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_round_trip() {
        set_verbose(false);
        assert!(!is_verbose());

        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
    }

    #[test]
    fn emphasized_falls_back_to_quoted_text_in_non_tty_context() {
        assert_eq!(emphasized("shop"), "'shop'");
    }

    #[test]
    fn with_spinner_runs_work_in_non_tty_context() {
        assert_eq!(with_spinner("Working...", || 42usize), 42);
    }
}

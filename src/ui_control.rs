use log::{debug, info, warn};
use std::process::Command;

use crate::errors::*;

/// Pauses and resumes the desktop app around ledger writes.
pub trait UiControl {
    fn close(&self) -> Result<()>;
    fn open(&self) -> Result<()>;
}

/// Runs configured shell commands to close and reopen the app.
#[derive(Clone, Debug)]
pub struct CommandUiControl {
    close_command: String,
    open_command: String,
}

impl CommandUiControl {
    pub fn new(close_command: &str, open_command: &str) -> CommandUiControl {
        CommandUiControl {
            close_command: close_command.to_string(),
            open_command: open_command.to_string(),
        }
    }
}

impl UiControl for CommandUiControl {
    fn close(&self) -> Result<()> {
        info!("Closing HomeBudget UI");
        run_shell(&self.close_command)
    }

    fn open(&self) -> Result<()> {
        info!("Reopening HomeBudget UI");
        run_shell(&self.open_command)
    }
}

fn run_shell(command: &str) -> Result<()> {
    debug!("Running UI command: {}", command);
    let mut shell = if cfg!(windows) {
        let mut shell = Command::new("cmd");
        shell.arg("/C");
        shell
    } else {
        let mut shell = Command::new("sh");
        shell.arg("-c");
        shell
    };
    let status = shell
        .arg(command)
        .status()
        .map_err(|err| Error::from(ErrorKind::UiControl(format!("{}: {}", command, err))))?;
    ensure!(
        status.success(),
        ErrorKind::UiControl(format!("{} exited with {}", command, status))
    );
    Ok(())
}

/// Closes the UI, runs `action`, and always tries to reopen the UI.  A
/// failed close aborts before `action` runs; a failed reopen is only logged.
pub fn around<T, F>(control: Option<&dyn UiControl>, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let control = match control {
        Some(control) => control,
        None => return action(),
    };
    control.close().chain_err(|| "Failed to close UI")?;
    let result = action();
    if let Err(err) = control.open() {
        warn!("Failed to reopen UI: {}", err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingControl {
        calls: RefCell<Vec<&'static str>>,
        fail_close: bool,
        fail_open: bool,
    }

    impl RecordingControl {
        fn new(fail_close: bool, fail_open: bool) -> RecordingControl {
            RecordingControl {
                calls: RefCell::new(Vec::new()),
                fail_close,
                fail_open,
            }
        }
    }

    impl UiControl for RecordingControl {
        fn close(&self) -> Result<()> {
            self.calls.borrow_mut().push("close");
            ensure!(!self.fail_close, ErrorKind::UiControl("close".to_string()));
            Ok(())
        }

        fn open(&self) -> Result<()> {
            self.calls.borrow_mut().push("open");
            ensure!(!self.fail_open, ErrorKind::UiControl("open".to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_around_brackets_action() {
        let control = RecordingControl::new(false, false);
        let value = around(Some(&control as &dyn UiControl), || {
            control.calls.borrow_mut().push("action");
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(*control.calls.borrow(), vec!["close", "action", "open"]);
    }

    #[test]
    fn test_around_reopens_after_failure() {
        let control = RecordingControl::new(false, true);
        let result: Result<()> = around(Some(&control as &dyn UiControl), || bail!("storage failed"));
        assert_eq!(result.unwrap_err().to_string(), "storage failed");
        assert_eq!(*control.calls.borrow(), vec!["close", "open"]);
    }

    #[test]
    fn test_around_skips_action_when_close_fails() {
        let control = RecordingControl::new(true, false);
        let result = around(Some(&control as &dyn UiControl), || Ok(1));
        assert!(result.is_err());
        assert_eq!(*control.calls.borrow(), vec!["close"]);
    }

    #[test]
    fn test_around_without_control() {
        assert_eq!(around(None, || Ok("done")).unwrap(), "done");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_ui_control() {
        assert!(CommandUiControl::new("true", "true").close().is_ok());
        let err = CommandUiControl::new("exit 3", "true").close().unwrap_err();
        match err.kind() {
            ErrorKind::UiControl(_) => {}
            other => panic!("unexpected error: {}", other),
        }
    }
}

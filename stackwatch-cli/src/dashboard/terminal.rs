use std::io::{self, IsTerminal, Stdout};

use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

/// Owns the terminal for the dashboard run and puts it back on drop,
/// whether the run ends normally, with an error, or by panic.
pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    raw: bool,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        // Raw mode only makes sense when a person is typing
        let raw = io::stdin().is_terminal();
        if raw {
            enable_raw_mode()?;
        }

        let mut stdout = io::stdout();
        let terminal = execute!(stdout, EnterAlternateScreen, Hide)
            .and_then(|()| Terminal::new(CrosstermBackend::new(stdout)));
        match terminal {
            Ok(terminal) => Ok(Self { terminal, raw }),
            Err(e) => {
                let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
                if raw {
                    let _ = disable_raw_mode();
                }
                Err(e)
            }
        }
    }

    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(self.terminal.backend_mut(), Show, LeaveAlternateScreen);
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

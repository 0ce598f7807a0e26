//! Interactive breakpoint prompt

use std::io::{self, Read, Write};

use crate::domain::Breadcrumb;

/// Blocks the poller until a human lets the GPU continue
pub trait BreakpointPrompt: Send {
    /// Return once the GPU may move past `breadcrumb`
    ///
    /// # Errors
    /// Any error stops the poller; the GPU stays parked on `breadcrumb`.
    fn confirm(&mut self, breadcrumb: Breadcrumb) -> io::Result<()>;
}

impl<F> BreakpointPrompt for F
where
    F: FnMut(Breadcrumb) -> io::Result<()> + Send,
{
    fn confirm(&mut self, breadcrumb: Breadcrumb) -> io::Result<()> {
        self(breadcrumb)
    }
}

/// Prompt on stdout, wait for a `y` on stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl BreakpointPrompt for StdinPrompt {
    fn confirm(&mut self, breadcrumb: Breadcrumb) -> io::Result<()> {
        {
            let mut stdout = io::stdout().lock();
            write!(stdout, "GPU is on breadcrumb {}, continue?", breadcrumb.0)?;
            stdout.flush()?;
        }
        wait_for_yes(&mut io::stdin().lock())
    }
}

/// Consume input one byte at a time until a `y`
fn wait_for_yes(input: &mut impl Read) -> io::Result<()> {
    let mut byte = [0u8; 1];
    loop {
        if input.read(&mut byte)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed at breakpoint"));
        }
        if byte[0] == b'y' {
            return Ok(());
        }
    }
}

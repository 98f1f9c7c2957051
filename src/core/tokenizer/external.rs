//! Tokenizer delegating to a long-lived external filter process.
//!
//! The command runs under `/bin/sh -c`. For every input line it must print
//! exactly one line; that line is split on the delimiter into keys.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use super::{IndexSink, TokenizeError};

#[derive(Debug)]
pub struct ExternalTokenizer
{
    command: String,
    delimiter: Vec<u8>,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    response: Vec<u8>,
}

impl ExternalTokenizer
{
    /// Spawn `command` once; it is reused for every line of the build.
    pub fn spawn(
        command: &str,
        delimiter: impl Into<Vec<u8>>,
    ) -> std::io::Result<Self>
    {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        debug!(pid = child.id(), command, "spawned external indexer");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout unavailable"))?;

        Ok(Self {
            command: command.to_string(),
            delimiter: delimiter.into(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            response: Vec::new(),
        })
    }

    pub fn describe(&self) -> String
    {
        self.command
            .clone()
    }

    pub fn index(
        &mut self,
        sink: &mut dyn IndexSink,
        line: &[u8],
    ) -> Result<(), TokenizeError>
    {
        self.stdin
            .write_all(line)?;
        self.stdin
            .write_all(b"\n")?;
        self.stdin
            .flush()?;

        self.response
            .clear();
        let read = self
            .stdout
            .read_until(b'\n', &mut self.response)?;
        if read == 0 || self.response.last() != Some(&b'\n')
        {
            return Err(TokenizeError::Protocol("child process died".to_string()));
        }
        // Anything already buffered past the first line is a second line.
        if !self
            .stdout
            .buffer()
            .is_empty()
        {
            let mut extra = String::from_utf8_lossy(&self.response).into_owned();
            extra.push_str(&String::from_utf8_lossy(self.stdout.buffer()));
            return Err(TokenizeError::Protocol(format!(
                "child process emitted more than one line: '{extra}'"
            )));
        }

        let body = &self.response[..self.response.len() - 1];
        if self.delimiter.is_empty()
        {
            if !body.is_empty()
            {
                sink.add(body, 0)?;
            }
            return Ok(());
        }
        for key in split_on(body, &self.delimiter)
        {
            if !key.is_empty()
            {
                sink.add(key, 0)?;
            }
        }
        Ok(())
    }
}

fn split_on<'a>(
    haystack: &'a [u8],
    delimiter: &'a [u8],
) -> impl Iterator<Item = &'a [u8]> + 'a
{
    let mut rest = Some(haystack);
    std::iter::from_fn(move || {
        let current = rest?;
        match memchr::memmem::find(current, delimiter)
        {
            Some(pos) =>
            {
                rest = Some(&current[pos + delimiter.len()..]);
                Some(&current[..pos])
            }
            None =>
            {
                rest = None;
                Some(current)
            }
        }
    })
}

impl Drop for ExternalTokenizer
{
    fn drop(&mut self)
    {
        debug!(pid = self.child.id(), "stopping external indexer");
        // The child may already have exited; either way it must be reaped.
        let _ = self
            .child
            .kill();
        let _ = self
            .child
            .wait();
    }
}

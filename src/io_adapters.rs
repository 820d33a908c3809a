use anyhow::Result;
use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, ErrorKind, Read, Write};

/// Where the read-eval loop gets its lines from.
pub trait LineSource {
    /// Show `prompt` and block until one line is available.
    ///
    /// Returns the line without its terminating newline, or `None` at end of
    /// input. `out` is the stream command output goes to; sources that print
    /// the prompt themselves write it there.
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> Result<Option<String>>;
}

/// Line source over any buffered reader: piped stdin, files, in-memory input.
pub struct StreamSource<R> {
    reader: R,
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl<R: BufRead> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            limit: None,
        }
    }

    /// Keep at most `limit + 1` bytes of each line.
    ///
    /// The rest of an over-long line is read and thrown away, so the caller
    /// still sees it as too long but memory stays bounded.
    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(reader)
        }
    }

    /// Consume input up to and including the next newline. Returns the number
    /// of bytes skipped.
    fn skip_rest_of_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(skipped);
            }
            let (used, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            self.reader.consume(used);
            skipped += used;
            if done {
                return Ok(skipped);
            }
        }
    }
}

impl<R: BufRead> LineSource for StreamSource<R> {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> Result<Option<String>> {
        write!(out, "{prompt}")?;
        out.flush()?;

        // Reused across reads, but cleared first so no bytes of the previous line survive.
        self.buf.clear();
        let read = match self.limit {
            Some(limit) => (&mut self.reader)
                .take(limit as u64 + 1)
                .read_until(b'\n', &mut self.buf)?,
            None => self.reader.read_until(b'\n', &mut self.buf)?,
        };
        if read == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        } else if self.limit.is_some_and(|limit| self.buf.len() > limit) {
            let skipped = self.skip_rest_of_line()?;
            debug!("discarded {skipped} bytes past the line limit");
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Interactive line source backed by `rustyline`, with in-memory history.
pub struct EditorSource {
    editor: DefaultEditor,
}

impl EditorSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> Result<Option<String>> {
        out.flush()?;
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                debug!("interrupted at the prompt");
                Ok(Some(String::new()))
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stream_source_prints_prompt_and_strips_newline() {
        let mut src = StreamSource::new(Cursor::new(b"echo hi\nls\n".to_vec()));
        let mut out = Vec::new();
        assert_eq!(src.read_line("rux> ", &mut out).unwrap().as_deref(), Some("echo hi"));
        assert_eq!(src.read_line("rux> ", &mut out).unwrap().as_deref(), Some("ls"));
        assert_eq!(src.read_line("rux> ", &mut out).unwrap(), None);
        assert_eq!(out, b"rux> rux> rux> ");
    }

    #[test]
    fn test_stream_source_returns_last_line_without_newline() {
        let mut src = StreamSource::new(Cursor::new(b"pid".to_vec()));
        let mut out = Vec::new();
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("pid"));
        assert_eq!(src.read_line("", &mut out).unwrap(), None);
    }

    #[test]
    fn test_stream_source_keeps_empty_lines() {
        let mut src = StreamSource::new(Cursor::new(b"\n\nx\n".to_vec()));
        let mut out = Vec::new();
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some(""));
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some(""));
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_stream_source_with_limit_caps_long_lines() {
        let input = format!("{}\nnext\n", "z".repeat(10_000));
        let mut src = StreamSource::with_limit(Cursor::new(input.into_bytes()), 8);
        let mut out = Vec::new();
        let line = src.read_line("", &mut out).unwrap().unwrap();
        assert_eq!(line, "z".repeat(9));
        assert!(src.buf.capacity() < 10_000);
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("next"));
        assert_eq!(src.read_line("", &mut out).unwrap(), None);
    }

    #[test]
    fn test_stream_source_with_limit_keeps_lines_at_the_limit() {
        let mut src = StreamSource::with_limit(Cursor::new(b"12345678\nab\n".to_vec()), 8);
        let mut out = Vec::new();
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("12345678"));
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("ab"));
    }

    #[test]
    fn test_stream_source_with_limit_handles_unterminated_tail() {
        let mut src = StreamSource::with_limit(Cursor::new(b"abcdefghijkl".to_vec()), 4);
        let mut out = Vec::new();
        assert_eq!(src.read_line("", &mut out).unwrap().as_deref(), Some("abcde"));
        assert_eq!(src.read_line("", &mut out).unwrap(), None);
    }

    #[test]
    fn test_stream_source_decodes_invalid_utf8_lossily() {
        let mut src = StreamSource::new(Cursor::new(b"echo \xff\n".to_vec()));
        let mut out = Vec::new();
        let line = src.read_line("", &mut out).unwrap().unwrap();
        assert_eq!(line, "echo \u{FFFD}");
    }
}

/// Reassembles lines from arbitrary chunks of process output.
///
/// `\n`, `\r\n` and a lone `\r` all terminate a line. Bytes are held until a
/// terminator arrives so multi-byte UTF-8 sequences split across reads are
/// decoded intact; invalid UTF-8 is replaced lossily.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    /// Last chunk ended in `\r`; swallow a leading `\n` of the next one
    skip_lf: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut bytes = chunk;

        if self.skip_lf {
            self.skip_lf = false;
            if let Some(rest) = bytes.strip_prefix(b"\n") {
                bytes = rest;
            }
        }

        while let Some(pos) = bytes.iter().position(|b| *b == b'\n' || *b == b'\r') {
            self.pending.extend_from_slice(&bytes[..pos]);
            lines.push(self.take_line());

            if bytes[pos] == b'\r' {
                match bytes.get(pos + 1) {
                    Some(b'\n') => bytes = &bytes[pos + 2..],
                    Some(_) => bytes = &bytes[pos + 1..],
                    None => {
                        self.skip_lf = true;
                        bytes = &[];
                    }
                }
            } else {
                bytes = &bytes[pos + 1..];
            }
        }

        self.pending.extend_from_slice(bytes);
        lines
    }

    /// Flush an unterminated trailing line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        self.skip_lf = false;
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

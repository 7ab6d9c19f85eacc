//! Line reassembly for the UART notification stream.

/// Buffers raw notification chunks and emits a line whenever a newline
/// arrives.
///
/// The peripheral chunks its output arbitrarily: a notification may carry a
/// fraction of a line, several lines, or split a multi-byte UTF-8 character
/// across two notifications. Splitting happens on the raw bytes *before*
/// decoding; `\n` never occurs inside a multi-byte UTF-8 sequence, so a
/// straddling character simply stays buffered until its line completes.
/// Emitted lines have the terminator stripped; a `\r` before it is preserved
/// as payload, matching the module firmware convention.
///
/// Invariant: the buffer retained between calls never contains a newline.
pub struct LineReassembler {
    buffer: Vec<u8>,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Append one received chunk and drain every line it completes, in
    /// arrival order. Returns an empty vec while no newline has arrived.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);
            line.pop();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Discard any buffered remainder. Called on disconnect: a trailing
    /// unterminated line is never emitted, and a fresh connection starts
    /// with an empty buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `data` split at every combination of two cut points and check
    /// the emitted lines and remainder are chunking-independent.
    fn assert_chunking_invariant(data: &[u8], expected: &[&str], remainder: usize) {
        for i in 0..=data.len() {
            for j in i..=data.len() {
                let mut r = LineReassembler::new();
                let mut lines = Vec::new();
                lines.extend(r.push(&data[..i]));
                lines.extend(r.push(&data[i..j]));
                lines.extend(r.push(&data[j..]));
                assert_eq!(lines, expected, "cut points {i}/{j}");
                assert_eq!(r.pending(), remainder, "cut points {i}/{j}");
            }
        }
    }

    #[test]
    fn single_line_in_one_chunk() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"OK\n"), vec!["OK"]);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn no_newline_emits_nothing() {
        let mut r = LineReassembler::new();
        assert!(r.push(b"tem").is_empty());
        assert!(r.push(b"p=2").is_empty());
        assert_eq!(r.pending(), 6);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"a\nb\nc"), vec!["a", "b"]);
        assert_eq!(r.pending(), 1);
        assert_eq!(r.push(b"\n"), vec!["c"]);
    }

    #[test]
    fn lines_survive_any_chunking() {
        assert_chunking_invariant(b"temp=21\nhum=40\nrest", &["temp=21", "hum=40"], 4);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        // "日本語\n" in UTF-8; every cut point lands inside some character.
        assert_chunking_invariant("日本語\n".as_bytes(), &["日本語"], 0);
    }

    #[test]
    fn empty_lines_are_emitted() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"\n\n"), vec!["", ""]);
    }

    #[test]
    fn carriage_return_is_preserved() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"OK\r\n"), vec!["OK\r"]);
    }

    #[test]
    fn clear_discards_unterminated_tail() {
        let mut r = LineReassembler::new();
        assert!(r.push(b"abc").is_empty());
        r.clear();
        assert_eq!(r.pending(), 0);
        assert_eq!(r.push(b"def\n"), vec!["def"]);
    }
}

/// Reassembles decoded text fragments into complete event blocks.
///
/// A block ends at a blank line (`\n\n`, or `\r\n\r\n`). Whatever follows the
/// last delimiter stays buffered until the next fragment completes it.
#[derive(Debug, Default)]
pub struct EventFramer {
    buf: String,
}

impl EventFramer {
    /// Appends a fragment and returns every block it completed, in order.
    ///
    /// Blank and whitespace-only blocks are skipped.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buf.push_str(fragment);
        let mut blocks = Vec::new();
        while let Some((idx, delim_len)) = find_block_delimiter(&self.buf) {
            let block = self.buf[..idx].to_string();
            self.buf.drain(..idx + delim_len);
            if !block.trim().is_empty() {
                blocks.push(block);
            }
        }
        blocks
    }

    /// The incomplete trailing block, if any.
    pub fn remainder(&self) -> &str {
        &self.buf
    }

    /// Drains the buffer at end of stream, returning the unterminated block
    /// unless it is blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        (!rest.trim().is_empty()).then_some(rest)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

fn find_block_delimiter(buf: &str) -> Option<(usize, usize)> {
    let lf = buf.find("\n\n").map(|idx| (idx, 2));
    let crlf = buf.find("\r\n\r\n").map(|idx| (idx, 4));
    match (lf, crlf) {
        (Some(lf), Some(crlf)) if crlf.0 < lf.0 => Some(crlf),
        (Some(lf), _) => Some(lf),
        (None, crlf) => crlf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "data: {\"type\":\"log\",\"content\":\"Reading CSV file...\"}\n\n\
        data: {\"type\":\"result\",\"data\":{\"id\":1}}\n\n\
        \n\n\
        data: {\"type\":\"close\"}\n\n\
        data: {\"type\":\"log\",\"con";

    fn frame_split(splits: &[usize]) -> (Vec<String>, String) {
        let mut framer = EventFramer::default();
        let mut blocks = Vec::new();
        let mut start = 0;
        for &end in splits.iter().chain(std::iter::once(&STREAM.len())) {
            blocks.extend(framer.push(&STREAM[start..end]));
            start = end;
        }
        (blocks, framer.remainder().to_string())
    }

    #[test]
    fn yields_complete_blocks_and_keeps_the_tail() {
        let (blocks, rest) = frame_split(&[]);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].contains("Reading CSV"));
        assert!(blocks[2].contains("close"));
        assert_eq!(rest, "data: {\"type\":\"log\",\"con");
    }

    #[test]
    fn single_and_pairwise_splits_frame_identically() {
        let whole = frame_split(&[]);
        for a in 0..=STREAM.len() {
            assert_eq!(frame_split(&[a]), whole, "split at {a}");
            for b in (a..=STREAM.len()).step_by(7) {
                assert_eq!(frame_split(&[a, b]), whole, "split at {a},{b}");
            }
        }
    }

    #[test]
    fn byte_at_a_time_frames_identically() {
        let splits: Vec<usize> = (1..STREAM.len()).collect();
        assert_eq!(frame_split(&splits), frame_split(&[]));
    }

    #[test]
    fn crlf_blank_line_delimits_blocks() {
        let mut framer = EventFramer::default();
        let blocks = framer.push("data: a\r\n\r\ndata: b\n\n");
        assert_eq!(blocks, vec!["data: a".to_string(), "data: b".to_string()]);
    }

    #[test]
    fn whitespace_only_blocks_are_skipped() {
        let mut framer = EventFramer::default();
        assert!(framer.push("  \n\n\t\n\n").is_empty());
        assert_eq!(framer.remainder(), "");
    }

    #[test]
    fn finish_returns_unterminated_block() {
        let mut framer = EventFramer::default();
        assert!(framer.push("data: {\"type\":\"close\"}").is_empty());
        assert_eq!(framer.finish().as_deref(), Some("data: {\"type\":\"close\"}"));
        assert_eq!(framer.finish(), None);
    }
}

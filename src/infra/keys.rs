//! Raw terminal input bytes to key events.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const ESC: u8 = 0x1b;

/// Longest control sequence kept while waiting for its final byte. Anything longer is
/// discarded up to its final byte.
pub const MAX_CONTROL_SEQUENCE_LEN: usize = 32;

/// Incremental decoder; keeps an incomplete escape or UTF-8 sequence until more bytes arrive.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    pending: Vec<u8>,
    after_cr: bool,
    discarding: bool,
}

#[derive(Debug, Eq, PartialEq)]
enum Decoded {
    Key(KeyEvent),
    Skip,
    Incomplete,
    Overlong,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<KeyEvent> {
        self.pending.extend_from_slice(bytes);
        let mut keys = Vec::new();
        let mut offset = 0usize;

        while offset < self.pending.len() {
            let rest = &self.pending[offset..];
            let byte = rest[0];

            if self.discarding {
                if (0x20..=0x3f).contains(&byte) {
                    offset += 1;
                    continue;
                }
                self.discarding = false;
                if (0x40..=0x7e).contains(&byte) {
                    offset += 1;
                    continue;
                }
            }

            // CR NUL and CR LF are a single Enter on the wire.
            if self.after_cr && (byte == 0x00 || byte == b'\n') {
                self.after_cr = false;
                offset += 1;
                continue;
            }
            self.after_cr = byte == b'\r';

            let (decoded, used) = decode_one(rest);
            match decoded {
                Decoded::Key(key) => keys.push(key),
                Decoded::Skip => {}
                Decoded::Overlong => self.discarding = true,
                Decoded::Incomplete => {
                    // A lone ESC at the end of a read is the Escape key itself.
                    if rest == [ESC] {
                        keys.push(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
                        offset += 1;
                    }
                    break;
                }
            }
            offset += used;
        }

        self.pending.drain(..offset);
        keys
    }
}

fn decode_one(bytes: &[u8]) -> (Decoded, usize) {
    let byte = bytes[0];
    match byte {
        ESC => decode_escape(bytes),
        b'\r' | b'\n' => (key(KeyCode::Enter), 1),
        0x7f | 0x08 => (key(KeyCode::Backspace), 1),
        b'\t' => (key(KeyCode::Tab), 1),
        0x00 => (Decoded::Skip, 1),
        0x01..=0x1a => {
            let letter = (b'a' + byte - 1) as char;
            (
                Decoded::Key(KeyEvent::new(KeyCode::Char(letter), KeyModifiers::CONTROL)),
                1,
            )
        }
        0x1c..=0x1f => (Decoded::Skip, 1),
        _ => decode_utf8(bytes),
    }
}

fn decode_escape(bytes: &[u8]) -> (Decoded, usize) {
    let Some(&next) = bytes.get(1) else {
        return (Decoded::Incomplete, 0);
    };
    match next {
        b'[' | b'O' => decode_control_sequence(bytes),
        ESC => (key(KeyCode::Esc), 1),
        _ => match decode_utf8(&bytes[1..]) {
            (Decoded::Key(KeyEvent { code, .. }), used) => (
                Decoded::Key(KeyEvent::new(code, KeyModifiers::ALT)),
                used + 1,
            ),
            (other, used) => (other, used + 1),
        },
    }
}

fn decode_control_sequence(bytes: &[u8]) -> (Decoded, usize) {
    // bytes[0] == ESC, bytes[1] is '[' or 'O'
    let mut index = 2usize;
    while let Some(&byte) = bytes.get(index) {
        if (0x40..=0x7e).contains(&byte) {
            let params = &bytes[2..index];
            let used = index + 1;
            let code = match byte {
                b'A' => Some(KeyCode::Up),
                b'B' => Some(KeyCode::Down),
                b'C' => Some(KeyCode::Right),
                b'D' => Some(KeyCode::Left),
                b'H' => Some(KeyCode::Home),
                b'F' => Some(KeyCode::End),
                b'~' => tilde_key(params),
                _ => None,
            };
            return match code {
                Some(code) => (key(code), used),
                None => (Decoded::Skip, used),
            };
        }
        if !(0x20..=0x3f).contains(&byte) {
            // Not a well-formed sequence; drop the introducer and resync.
            return (Decoded::Skip, 2);
        }
        index += 1;
        if index >= MAX_CONTROL_SEQUENCE_LEN {
            return (Decoded::Overlong, index);
        }
    }
    (Decoded::Incomplete, 0)
}

fn tilde_key(params: &[u8]) -> Option<KeyCode> {
    let first = params.split(|byte| *byte == b';').next()?;
    match first {
        b"1" | b"7" => Some(KeyCode::Home),
        b"2" => Some(KeyCode::Insert),
        b"3" => Some(KeyCode::Delete),
        b"4" | b"8" => Some(KeyCode::End),
        b"5" => Some(KeyCode::PageUp),
        b"6" => Some(KeyCode::PageDown),
        _ => None,
    }
}

fn decode_utf8(bytes: &[u8]) -> (Decoded, usize) {
    let width = match bytes[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return (Decoded::Skip, 1),
    };
    if bytes.len() < width {
        return (Decoded::Incomplete, 0);
    }
    match std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|text| text.chars().next())
    {
        Some(ch) => (key(KeyCode::Char(ch)), width),
        None => (Decoded::Skip, 1),
    }
}

fn key(code: KeyCode) -> Decoded {
    Decoded::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(keys: &[KeyEvent]) -> Vec<KeyCode> {
        keys.iter().map(|key| key.code).collect()
    }

    #[test]
    fn decodes_printable_and_control_bytes() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"jk\r\x03");
        assert_eq!(
            codes(&keys),
            vec![
                KeyCode::Char('j'),
                KeyCode::Char('k'),
                KeyCode::Enter,
                KeyCode::Char('c')
            ]
        );
        assert_eq!(keys[3].modifiers, KeyModifiers::CONTROL);
    }

    #[test]
    fn cr_lf_and_cr_nul_are_one_enter() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(codes(&decoder.feed(b"\r\n")), vec![KeyCode::Enter]);
        assert_eq!(codes(&decoder.feed(b"\r\0")), vec![KeyCode::Enter]);
        assert_eq!(codes(&decoder.feed(b"\r")), vec![KeyCode::Enter]);
        assert_eq!(codes(&decoder.feed(b"\n")), Vec::<KeyCode>::new());
    }

    #[test]
    fn decodes_cursor_and_paging_sequences() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1b[A\x1bOB\x1b[5~\x1b[6~\x1b[H\x1b[4~");
        assert_eq!(
            codes(&keys),
            vec![
                KeyCode::Up,
                KeyCode::Down,
                KeyCode::PageUp,
                KeyCode::PageDown,
                KeyCode::Home,
                KeyCode::End
            ]
        );
    }

    #[test]
    fn sequences_split_across_reads_are_reassembled() {
        let mut decoder = KeyDecoder::new();
        assert!(decoder.feed(b"\x1b[").is_empty());
        assert_eq!(codes(&decoder.feed(b"B")), vec![KeyCode::Down]);

        let snowman = "☃".as_bytes();
        assert!(decoder.feed(&snowman[..1]).is_empty());
        assert_eq!(codes(&decoder.feed(&snowman[1..])), vec![KeyCode::Char('☃')]);
    }

    #[test]
    fn lone_escape_is_the_escape_key() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(codes(&decoder.feed(b"\x1b")), vec![KeyCode::Esc]);
        let keys = decoder.feed(b"\x1bq");
        assert_eq!(codes(&keys), vec![KeyCode::Char('q')]);
        assert_eq!(keys[0].modifiers, KeyModifiers::ALT);
    }

    #[test]
    fn overlong_control_sequences_are_dropped_and_decoding_resumes() {
        let mut decoder = KeyDecoder::new();
        assert!(decoder.feed(b"\x1b[").is_empty());
        for _ in 0..64 {
            assert!(decoder.feed(&[b'0'; 1024]).is_empty());
            assert!(decoder.pending.len() < MAX_CONTROL_SEQUENCE_LEN);
        }
        assert_eq!(codes(&decoder.feed(b"~j")), vec![KeyCode::Char('j')]);
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn overlong_sequence_in_one_read_is_dropped() {
        let mut decoder = KeyDecoder::new();
        let mut bytes = b"\x1b[".to_vec();
        bytes.extend_from_slice(&[b';'; 100]);
        bytes.extend_from_slice(b"Aq");
        assert_eq!(codes(&decoder.feed(&bytes)), vec![KeyCode::Char('q')]);
    }

    #[test]
    fn unknown_sequences_are_skipped() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(codes(&decoder.feed(b"\x1b[99zq")), vec![KeyCode::Char('q')]);
    }
}

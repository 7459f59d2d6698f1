//! Byte-level keyboard decoding for raw-mode terminals.
//!
//! Arrow keys arrive as `ESC [ A` (or `ESC O A` in application mode). The
//! decoder is fed one byte at a time; when a sequence stalls the caller
//! waits a few milliseconds and then calls [`KeyDecoder::flush`], which hands
//! back whatever was collected.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    CtrlC,
    Char(char),
    /// A sequence the decoder does not know, bytes as received
    Unknown(Vec<u8>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Idle,
    Escape,
    EscapeBracket,
}

#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: DecodeState,
    pending: Vec<u8>,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waiting for the rest of an escape sequence
    pub fn is_pending(&self) -> bool {
        self.state != DecodeState::Idle
    }

    pub fn feed(&mut self, byte: u8) -> Option<Key> {
        match self.state {
            DecodeState::Idle => match byte {
                0x1b => {
                    self.state = DecodeState::Escape;
                    self.pending.push(byte);
                    None
                }
                0x03 => Some(Key::CtrlC),
                b'\r' | b'\n' => Some(Key::Enter),
                0x20..=0x7e => Some(Key::Char(byte as char)),
                _ => Some(Key::Unknown(vec![byte])),
            },
            DecodeState::Escape => {
                self.pending.push(byte);
                if byte == b'[' || byte == b'O' {
                    self.state = DecodeState::EscapeBracket;
                    None
                } else {
                    Some(self.finish_unknown())
                }
            }
            DecodeState::EscapeBracket => {
                self.pending.push(byte);
                let key = match byte {
                    b'A' => Key::Up,
                    b'B' => Key::Down,
                    b'C' => Key::Right,
                    b'D' => Key::Left,
                    // Parameter bytes of a longer CSI sequence
                    b'0'..=b'9' | b';' => return None,
                    _ => return Some(self.finish_unknown()),
                };
                self.reset();
                Some(key)
            }
        }
    }

    /// Resolve a stalled sequence: a lone ESC is the Escape key, anything
    /// longer comes back raw
    pub fn flush(&mut self) -> Option<Key> {
        match self.state {
            DecodeState::Idle => None,
            DecodeState::Escape => {
                self.reset();
                Some(Key::Escape)
            }
            DecodeState::EscapeBracket => Some(self.finish_unknown()),
        }
    }

    fn finish_unknown(&mut self) -> Key {
        let bytes = std::mem::take(&mut self.pending);
        self.state = DecodeState::Idle;
        Key::Unknown(bytes)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.state = DecodeState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<Key> {
        let mut decoder = KeyDecoder::new();
        let mut keys: Vec<Key> = bytes.iter().filter_map(|b| decoder.feed(*b)).collect();
        keys.extend(decoder.flush());
        keys
    }

    #[test]
    fn test_plain_characters() {
        assert_eq!(
            decode(b"jq"),
            vec![Key::Char('j'), Key::Char('q')]
        );
        assert_eq!(decode(&[0x03]), vec![Key::CtrlC]);
        assert_eq!(decode(b"\r"), vec![Key::Enter]);
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(decode(b"\x1b[A"), vec![Key::Up]);
        assert_eq!(decode(b"\x1b[B"), vec![Key::Down]);
        assert_eq!(decode(b"\x1bOC"), vec![Key::Right]);
        assert_eq!(decode(b"\x1b[D\x1b[A"), vec![Key::Left, Key::Up]);
    }

    #[test]
    fn test_lone_escape_resolves_on_flush() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(decoder.feed(0x1b), None);
        assert!(decoder.is_pending());
        assert_eq!(decoder.flush(), Some(Key::Escape));
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_partial_sequence_returned_as_is() {
        assert_eq!(decode(b"\x1b["), vec![Key::Unknown(b"\x1b[".to_vec())]);
        assert_eq!(decode(b"\x1bx"), vec![Key::Unknown(b"\x1bx".to_vec())]);
        assert_eq!(decode(b"\x1b[Z"), vec![Key::Unknown(b"\x1b[Z".to_vec())]);
    }

    #[test]
    fn test_long_csi_sequence_is_unknown() {
        // Delete key: ESC [ 3 ~
        assert_eq!(decode(b"\x1b[3~k"), vec![Key::Unknown(b"\x1b[3~".to_vec()), Key::Char('k')]);
    }

    #[test]
    fn test_decoder_recovers_after_unknown() {
        assert_eq!(
            decode(b"\x1b[Zj\x1b[B"),
            vec![Key::Unknown(b"\x1b[Z".to_vec()), Key::Char('j'), Key::Down]
        );
    }
}

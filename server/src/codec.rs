//! Newline-delimited framing of inbound client messages.

use crate::error::ProtocolError;
use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Longest line a client may send, newline excluded.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Splits inbound bytes into lines.
///
/// A line that is not UTF-8 or runs past the length limit is yielded as an
/// `Err` item and skipped, so the stream only ends on EOF or an I/O failure.
/// Over-long lines are discarded up to their newline without being buffered.
#[derive(Debug)]
pub struct ClientLineCodec {
    inner: LinesCodec,
}

impl ClientLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn frame(
        &self,
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> io::Result<Option<Result<String, ProtocolError>>> {
        match decoded {
            Ok(line) => Ok(line.map(Ok)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(
                ProtocolError::LineTooLong(self.inner.max_length()),
            ))),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Err(ProtocolError::InvalidUtf8)))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Default for ClientLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientLineCodec {
    type Item = Result<String, ProtocolError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let decoded = self.inner.decode(src);
        self.frame(decoded)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let decoded = self.inner.decode_eof(src);
        self.frame(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ClientLineCodec, bytes: &[u8]) -> Vec<Result<String, String>> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame.map_err(|e| e.to_string()));
        }
        frames
    }

    #[test]
    fn test_splits_lines() {
        let mut codec = ClientLineCodec::new();
        let frames = decode_all(&mut codec, b"first\nsecond\r\npartial");

        assert_eq!(
            frames,
            vec![Ok("first".to_string()), Ok("second".to_string())]
        );
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let mut codec = ClientLineCodec::new();
        let frames = decode_all(&mut codec, b"\xff\xfe\nafter\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err("message is not valid UTF-8".to_string()));
        assert_eq!(frames[1], Ok("after".to_string()));
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut codec = ClientLineCodec::with_max_length(8);
        let frames = decode_all(&mut codec, b"0123456789abcdef\nok\n");

        assert_eq!(
            frames,
            vec![
                Err("message exceeds 8 bytes".to_string()),
                Ok("ok".to_string())
            ]
        );
    }

    #[test]
    fn test_overlong_line_is_not_buffered() {
        let mut codec = ClientLineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Err(ProtocolError::LineTooLong(8)))
        ));
        // The rest of the line is dropped as it arrives
        buf.extend_from_slice(b"more bytes without end");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"tail\nnext\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().unwrap(), "next");
    }

    #[test]
    fn test_last_line_without_newline_at_eof() {
        let mut codec = ClientLineCodec::new();
        let mut buf = BytesMut::from(&b"last"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap().unwrap(), "last");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameDecoder, FrameError, LengthPrefixedDecoder, NUL, PREFIX_LEN};

/// 将一帧负载解析为字符串数组。
///
/// # 教案式说明
/// - **Why**：字符串数组约定把多条 `utf8 ++ 0x00` 直接拼接为一个长度前缀帧的负载；
/// - **How**：要求最后一个字节是终止符，去掉它后按 `0x00` 切分，空片段保留为空字符串；
/// - **What**：空负载或末字节非 `0x00` 返回 [`FrameError::NoTermination`]。
pub fn parse_string_array(payload: &[u8]) -> Result<Vec<String>, FrameError> {
    match payload.split_last() {
        Some((&NUL, body)) => Ok(body
            .split(|byte| *byte == NUL)
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect()),
        _ => {
            let pending = payload
                .iter()
                .rev()
                .take_while(|byte| **byte != NUL)
                .count();
            Err(FrameError::NoTermination { pending })
        }
    }
}

/// 解析一整段“长度前缀 + 字符串数组负载”。
///
/// 与流式解码器不同，这里把声明长度 `0` 解释为空数组，使
/// `decode_string_array_frame(encode_string_array(s)) == s` 对任意数组成立。
pub fn decode_string_array_frame(frame: &[u8]) -> Result<Vec<String>, FrameError> {
    if frame.len() < PREFIX_LEN {
        return Err(FrameError::Incomplete {
            expected: PREFIX_LEN,
            received: frame.len(),
        });
    }
    let (prefix, payload) = frame.split_at(PREFIX_LEN);
    let declared = i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if declared < 0 {
        return Err(FrameError::InvalidLength { declared });
    }
    let declared = declared as usize;
    if payload.len() < declared {
        return Err(FrameError::Incomplete {
            expected: declared,
            received: payload.len(),
        });
    }
    if payload.len() > declared {
        return Err(FrameError::TrailingBytes {
            extra: payload.len() - declared,
        });
    }
    if declared == 0 {
        return Ok(Vec::new());
    }
    parse_string_array(payload)
}

/// 字符串数组帧的构造器：先写占位前缀，逐条写入字符串与终止符，最后回填长度。
///
/// ```rust
/// use spark_codec_frame::StringArrayEncoder;
///
/// let mut encoder = StringArrayEncoder::with_payload_capacity(4);
/// encoder.push("A");
/// encoder.push("B");
/// let frame = encoder.finish().unwrap();
/// assert_eq!(&frame[..], &[0, 0, 0, 4, 65, 0, 66, 0]);
/// ```
#[derive(Debug)]
pub struct StringArrayEncoder {
    buffer: BytesMut,
}

impl StringArrayEncoder {
    /// 按预估负载长度一次性分配缓冲。
    pub fn with_payload_capacity(payload_capacity: usize) -> Self {
        let mut buffer = BytesMut::with_capacity(PREFIX_LEN + payload_capacity);
        buffer.put_slice(&[0; PREFIX_LEN]);
        Self { buffer }
    }

    /// 写入一条字符串及其终止符。
    pub fn push(&mut self, text: &str) -> &mut Self {
        self.buffer.put_slice(text.as_bytes());
        self.buffer.put_u8(NUL);
        self
    }

    /// 写入空值：只有一个终止符，解码后为空字符串。
    pub fn push_null(&mut self) -> &mut Self {
        self.buffer.put_u8(NUL);
        self
    }

    /// 已写入的负载字节数（不含前缀）。
    pub fn payload_len(&self) -> usize {
        self.buffer.len() - PREFIX_LEN
    }

    /// 回填长度前缀并冻结为只读帧。
    pub fn finish(mut self) -> Result<Bytes, FrameError> {
        let payload_len = self.payload_len();
        let declared = i32::try_from(payload_len).map_err(|_| FrameError::FrameTooLarge {
            declared: payload_len,
            limit: i32::MAX as usize,
        })?;
        self.buffer[..PREFIX_LEN].copy_from_slice(&declared.to_be_bytes());
        Ok(self.buffer.freeze())
    }
}

/// 编码字符串数组；`None` 与空字符串都编码为单个终止符。
pub fn encode_string_array<S: AsRef<str>>(strings: &[Option<S>]) -> Result<Bytes, FrameError> {
    let capacity = strings
        .iter()
        .map(|text| text.as_ref().map_or(0, |t| t.as_ref().len()) + 1)
        .sum();
    let mut encoder = StringArrayEncoder::with_payload_capacity(capacity);
    for text in strings {
        match text {
            Some(text) => encoder.push(text.as_ref()),
            None => encoder.push_null(),
        };
    }
    encoder.finish()
}

/// 长度前缀帧 + 字符串数组负载的组合解码器。
#[derive(Debug, Default)]
pub struct StringArrayDecoder {
    frames: LengthPrefixedDecoder,
}

impl StringArrayDecoder {
    /// 基于给定的帧解码器构造。
    pub fn new(frames: LengthPrefixedDecoder) -> Self {
        Self { frames }
    }
}

impl FrameDecoder for StringArrayDecoder {
    type Item = Vec<String>;

    fn feed(&mut self, byte: u8) -> Result<Option<Vec<String>>, FrameError> {
        match self.frames.feed(byte)? {
            Some(payload) => parse_string_array(&payload).map(Some),
            None => Ok(None),
        }
    }

    fn finish(&mut self) -> Result<(), FrameError> {
        self.frames.finish()
    }

    fn pending_len(&self) -> usize {
        self.frames.pending_len()
    }

    fn feed_slice(&mut self, bytes: &[u8]) -> Result<(usize, Option<Vec<String>>), FrameError> {
        let (consumed, frame) = self.frames.feed_slice(bytes)?;
        match frame {
            Some(payload) => Ok((consumed, Some(parse_string_array(&payload)?))),
            None => Ok((consumed, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_two_strings_with_prefix() {
        let frame = encode_string_array(&[Some("A"), Some("B")]).expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 4, 65, 0, 66, 0]);
        assert_eq!(
            decode_string_array_frame(&frame).expect("decode"),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn null_and_empty_encode_as_single_terminator() {
        let frame = encode_string_array(&[None, Some(""), Some("x")]).expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 4, 0, 0, b'x', 0]);
        assert_eq!(
            decode_string_array_frame(&frame).expect("decode"),
            vec![String::new(), String::new(), "x".to_string()]
        );
    }

    #[test]
    fn empty_array_round_trips_through_whole_frame_parse() {
        let frame = encode_string_array::<&str>(&[]).expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 0]);
        assert!(decode_string_array_frame(&frame).expect("decode").is_empty());
    }

    #[test]
    fn payload_without_trailing_terminator_is_rejected() {
        assert_eq!(
            parse_string_array(b"A\0B"),
            Err(FrameError::NoTermination { pending: 1 })
        );
        assert_eq!(
            parse_string_array(&[]),
            Err(FrameError::NoTermination { pending: 0 })
        );
    }

    #[test]
    fn interior_empty_elements_are_preserved() {
        assert_eq!(
            parse_string_array(b"A\0\0B\0").expect("parse"),
            vec!["A".to_string(), String::new(), "B".to_string()]
        );
    }

    #[test]
    fn whole_frame_parse_reports_trailing_bytes() {
        assert_eq!(
            decode_string_array_frame(&[0, 0, 0, 2, b'A', 0, 9]),
            Err(FrameError::TrailingBytes { extra: 1 })
        );
    }

    #[test]
    fn streaming_decoder_yields_arrays() {
        let mut decoder = StringArrayDecoder::default();
        let mut out = Vec::new();
        decoder
            .decode_all(&[0, 0, 0, 4, 65, 0, 66, 0, 0, 0, 0, 1, 0], &mut out)
            .expect("decode");
        assert_eq!(
            out,
            vec![vec!["A".to_string(), "B".to_string()], vec![String::new()]]
        );
        assert_eq!(decoder.finish(), Ok(()));
    }
}

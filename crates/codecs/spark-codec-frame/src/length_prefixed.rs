use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameDecoder, FrameError};

/// 长度前缀字节数。
pub const PREFIX_LEN: usize = 4;

/// 预留负载缓冲时的单次上限，避免恶意声明长度直接触发巨额分配。
const MAX_RESERVE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitingPrefix,
    AwaitingPayload { declared: usize },
}

/// 4 字节大端长度前缀帧的增量解码器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 二进制消息可能包含任意字节（包括 `0x00`），只能依靠显式长度恢复边界。
///
/// ## 逻辑 (How)
/// - `AwaitingPrefix`：收满 4 字节后按大端 `i32` 解析声明长度，清空缓冲进入下一阶段；
/// - `AwaitingPayload`：收满声明长度后整体冻结为一帧，回到 `AwaitingPrefix`；
/// - 缓冲只保存“当前阶段”的字节，所以恰好收完前缀后流结束时缓冲为空，按正常结束处理。
///
/// ## 契约 (What)
/// - 声明长度 `<= 0`：[`FrameError::InvalidLength`]，视为流损坏；
/// - 超过 `max_frame_len`：[`FrameError::FrameTooLarge`]；
/// - 结束时缓冲非空（1–3 字节前缀或部分负载）：[`FrameError::Incomplete`]。
///
/// ## 注意事项 (Trade-offs)
/// - 负载缓冲按需增长，单次预留不超过 64 KiB；未设置上限时单帧最大约 2 GiB。
#[derive(Debug)]
pub struct LengthPrefixedDecoder {
    phase: Phase,
    pending: BytesMut,
    max_frame_len: Option<usize>,
}

impl LengthPrefixedDecoder {
    /// 创建不限制帧长的解码器。
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingPrefix,
            pending: BytesMut::with_capacity(PREFIX_LEN),
            max_frame_len: None,
        }
    }

    /// 设置单帧负载上限。
    pub fn with_max_frame_len(mut self, limit: usize) -> Self {
        self.max_frame_len = Some(limit);
        self
    }

    /// 是否正处于帧边界（等待新的前缀且没有缓冲字节）。
    pub fn at_boundary(&self) -> bool {
        self.phase == Phase::AwaitingPrefix && self.pending.is_empty()
    }

    fn on_prefix_complete(&mut self) -> Result<(), FrameError> {
        let declared = i32::from_be_bytes([
            self.pending[0],
            self.pending[1],
            self.pending[2],
            self.pending[3],
        ]);
        self.pending.clear();
        if declared <= 0 {
            return Err(FrameError::InvalidLength { declared });
        }
        let declared = declared as usize;
        if let Some(limit) = self.max_frame_len
            && declared > limit
        {
            return Err(FrameError::FrameTooLarge { declared, limit });
        }
        self.pending.reserve(declared.min(MAX_RESERVE));
        self.phase = Phase::AwaitingPayload { declared };
        Ok(())
    }

    fn take_frame(&mut self) -> Bytes {
        self.phase = Phase::AwaitingPrefix;
        self.pending.split().freeze()
    }
}

impl Default for LengthPrefixedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for LengthPrefixedDecoder {
    type Item = Bytes;

    fn feed(&mut self, byte: u8) -> Result<Option<Bytes>, FrameError> {
        self.pending.put_u8(byte);
        match self.phase {
            Phase::AwaitingPrefix => {
                if self.pending.len() == PREFIX_LEN {
                    self.on_prefix_complete()?;
                }
                Ok(None)
            }
            Phase::AwaitingPayload { declared } => {
                if self.pending.len() == declared {
                    Ok(Some(self.take_frame()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn finish(&mut self) -> Result<(), FrameError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let expected = match self.phase {
            Phase::AwaitingPrefix => PREFIX_LEN,
            Phase::AwaitingPayload { declared } => declared,
        };
        Err(FrameError::Incomplete {
            expected,
            received: self.pending.len(),
        })
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn feed_slice(&mut self, bytes: &[u8]) -> Result<(usize, Option<Bytes>), FrameError> {
        let mut consumed = 0;
        while consumed < bytes.len() {
            match self.phase {
                Phase::AwaitingPayload { declared } => {
                    let needed = declared - self.pending.len();
                    let take = needed.min(bytes.len() - consumed);
                    self.pending
                        .extend_from_slice(&bytes[consumed..consumed + take]);
                    consumed += take;
                    if self.pending.len() == declared {
                        return Ok((consumed, Some(self.take_frame())));
                    }
                }
                Phase::AwaitingPrefix => {
                    let item = self.feed(bytes[consumed])?;
                    consumed += 1;
                    if item.is_some() {
                        return Ok((consumed, item));
                    }
                }
            }
        }
        Ok((consumed, None))
    }
}

/// 为单个负载加上 4 字节大端长度前缀。
///
/// 空负载或超过 `i32::MAX` 的负载无法被解码端接受，直接拒绝。
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::InvalidLength { declared: 0 });
    }
    let declared = i32::try_from(payload.len()).map_err(|_| FrameError::FrameTooLarge {
        declared: payload.len(),
        limit: i32::MAX as usize,
    })?;
    let mut buffer = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    buffer.put_i32(declared);
    buffer.extend_from_slice(payload);
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<(Vec<Bytes>, Result<(), FrameError>), FrameError> {
        let mut decoder = LengthPrefixedDecoder::new();
        let mut out = Vec::new();
        decoder.decode_all(bytes, &mut out)?;
        Ok((out, decoder.finish()))
    }

    #[test]
    fn zero_length_prefix_is_invalid() {
        assert_eq!(
            decode(&[0, 0, 0, 0]).unwrap_err(),
            FrameError::InvalidLength { declared: 0 }
        );
    }

    #[test]
    fn negative_length_prefix_is_invalid() {
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xfe]).unwrap_err(),
            FrameError::InvalidLength { declared: -2 }
        );
    }

    #[test]
    fn exact_prefix_then_end_is_clean() {
        let (frames, end) = decode(&[0, 0, 0, 9]).expect("prefix accepted");
        assert!(frames.is_empty());
        assert_eq!(end, Ok(()));
    }

    #[test]
    fn partial_prefix_is_incomplete() {
        for len in 1..PREFIX_LEN {
            let (_, end) = decode(&vec![0; len]).expect("no frame error");
            assert_eq!(
                end,
                Err(FrameError::Incomplete {
                    expected: PREFIX_LEN,
                    received: len
                })
            );
        }
    }

    #[test]
    fn partial_payload_is_incomplete() {
        let (_, end) = decode(&[0, 0, 0, 3, 1, 2]).expect("no frame error");
        assert_eq!(
            end,
            Err(FrameError::Incomplete {
                expected: 3,
                received: 2
            })
        );
    }

    #[test]
    fn frames_survive_byte_at_a_time_delivery() {
        let input = [0, 0, 0, 2, 7, 8, 0, 0, 0, 1, 0];
        let mut decoder = LengthPrefixedDecoder::new();
        let mut frames = Vec::new();
        for byte in input {
            if let Some(frame) = decoder.feed(byte).expect("feed") {
                frames.push(frame);
            }
        }
        assert_eq!(frames, vec![Bytes::from_static(&[7, 8]), Bytes::from_static(&[0])]);
        assert!(decoder.at_boundary());
    }

    #[test]
    fn limit_rejects_oversized_frames() {
        let mut decoder = LengthPrefixedDecoder::new().with_max_frame_len(8);
        let mut out = Vec::new();
        let err = decoder.decode_all(&[0, 0, 0, 9], &mut out).unwrap_err();
        assert_eq!(err, FrameError::FrameTooLarge { declared: 9, limit: 8 });
    }

    #[test]
    fn encode_frame_writes_big_endian_prefix() {
        let frame = encode_frame(b"AB").expect("non-empty payload");
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'A', b'B']);
        assert_eq!(
            encode_frame(&[]).unwrap_err(),
            FrameError::InvalidLength { declared: 0 }
        );
    }
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameDecoder, FrameError};

/// 字符串终止符。
pub const NUL: u8 = 0x00;

/// `0x00` 结尾字符串的增量解码器。
///
/// # 设计动机（Why）
/// - 旧版握手协议直接在裸字节流上发送 `utf8 ++ 0x00`，没有长度前缀，只能边收边找终止符。
///
/// # 行为概览（How）
/// - 非零字节追加到 `pending`；遇到 `0x00` 时把 `pending` 按 UTF-8 解释为一条消息并清空；
/// - 非法 UTF-8 序列替换为 U+FFFD，不中断流；
/// - 终止符本身永不出现在输出中。
///
/// # 契约说明（What）
/// - 空输入：零条消息，正常结束；单个 `0x00`：一条空字符串；
/// - 结束时 `pending` 非空：[`FrameError::NoTermination`]。
#[derive(Debug, Default)]
pub struct NulStringDecoder {
    pending: BytesMut,
}

impl NulStringDecoder {
    /// 创建空解码器。
    pub fn new() -> Self {
        Self::default()
    }

    fn take_message(&mut self) -> String {
        let raw = self.pending.split();
        String::from_utf8_lossy(&raw).into_owned()
    }
}

impl FrameDecoder for NulStringDecoder {
    type Item = String;

    fn feed(&mut self, byte: u8) -> Result<Option<String>, FrameError> {
        if byte == NUL {
            return Ok(Some(self.take_message()));
        }
        self.pending.put_u8(byte);
        Ok(None)
    }

    fn finish(&mut self) -> Result<(), FrameError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(FrameError::NoTermination {
                pending: self.pending.len(),
            })
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn feed_slice(&mut self, bytes: &[u8]) -> Result<(usize, Option<String>), FrameError> {
        match bytes.iter().position(|byte| *byte == NUL) {
            Some(pos) => {
                self.pending.extend_from_slice(&bytes[..pos]);
                Ok((pos + 1, Some(self.take_message())))
            }
            None => {
                self.pending.extend_from_slice(bytes);
                Ok((bytes.len(), None))
            }
        }
    }
}

/// 编码单条 `0x00` 结尾字符串。
pub fn encode_nul_string(text: &str) -> Bytes {
    let mut buffer = BytesMut::with_capacity(text.len() + 1);
    buffer.extend_from_slice(text.as_bytes());
    buffer.put_u8(NUL);
    buffer.freeze()
}

use crate::FrameError;

/// 增量分帧解码器的统一契约。
///
/// # 教案式说明
/// - **Why**：拉取式 [`FramedStream`](crate::FramedStream) 与推送式
///   [`FramedObserver`](crate::FramedObserver) 必须行为一致，最直接的办法是让二者驱动
///   同一个显式状态机，而不是各自持有闭包捕获的缓冲；
/// - **How**：每次喂入一个字节，识别到分隔边界时返回完整消息并清空内部缓冲；
/// - **What**：
///   - `feed` 返回 `Ok(Some(item))` 表示刚好完成一条消息；`Err` 后解码器不应继续使用；
///   - `finish` 在源正常结束时调用：缓冲为空返回 `Ok(())`，否则返回截断错误；
/// - **Trade-offs**：逐字节推进使切分点无关性一目了然，批量场景可由实现方覆写
///   [`FrameDecoder::feed_slice`] 做快速路径。
pub trait FrameDecoder {
    /// 解码得到的消息类型。
    type Item;

    /// 喂入一个字节。
    fn feed(&mut self, byte: u8) -> Result<Option<Self::Item>, FrameError>;

    /// 源正常结束时检查是否残留未完成的消息。
    fn finish(&mut self) -> Result<(), FrameError>;

    /// 当前缓冲中尚未构成完整消息的字节数。
    fn pending_len(&self) -> usize;

    /// 从 `bytes` 中逐字节推进，直到产出一条消息或耗尽输入。
    ///
    /// 返回 `(消耗的字节数, 可能的消息)`；调用方需把剩余字节再次喂入。
    fn feed_slice(&mut self, bytes: &[u8]) -> Result<(usize, Option<Self::Item>), FrameError> {
        for (index, byte) in bytes.iter().enumerate() {
            if let Some(item) = self.feed(*byte)? {
                return Ok((index + 1, Some(item)));
            }
        }
        Ok((bytes.len(), None))
    }

    /// 将整块输入全部解码，消息按顺序追加到 `out`。
    fn decode_all(&mut self, mut bytes: &[u8], out: &mut Vec<Self::Item>) -> Result<(), FrameError> {
        while !bytes.is_empty() {
            let (consumed, item) = self.feed_slice(bytes)?;
            if let Some(item) = item {
                out.push(item);
            }
            bytes = &bytes[consumed..];
        }
        Ok(())
    }
}

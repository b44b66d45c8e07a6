use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes};
use futures_util::{Stream, ready};

use crate::{FrameDecoder, FrameError};

/// 拉取式分帧适配器：把“字节块流”转换为“消息流”。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 连接的接收流以任意大小的块交付字节；上层只关心完整消息。
///
/// ## 逻辑 (How)
/// - 保存当前块及其读取位置，每次 `poll_next` 先消费剩余字节，耗尽后再向源拉取；
/// - 源产出 `Err` 时原样转发并终止，不再执行结束检查；
/// - 源正常结束时调用 [`FrameDecoder::finish`]，残留字节转为错误项。
///
/// ## 契约 (What)
/// - 输出与块的切分方式无关；错误项之后流立即结束；
/// - [`FramedStream::into_parts`] 交还源、解码器与尚未消费的字节，便于切换协议。
#[derive(Debug)]
pub struct FramedStream<S, D> {
    source: S,
    decoder: D,
    chunk: Bytes,
    done: bool,
}

impl<S, D> FramedStream<S, D> {
    /// 在 `source` 上用 `decoder` 分帧。
    pub fn new(source: S, decoder: D) -> Self {
        Self {
            source,
            decoder,
            chunk: Bytes::new(),
            done: false,
        }
    }

    /// 以一段已缓冲的字节作为起点，常用于协议切换后接续旧流的剩余数据。
    pub fn with_buffered(source: S, decoder: D, buffered: Bytes) -> Self {
        Self {
            source,
            decoder,
            chunk: buffered,
            done: false,
        }
    }

    /// 只读访问解码器。
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// 拆回源、解码器以及当前块中尚未消费的字节。
    pub fn into_parts(self) -> (S, D, Bytes) {
        (self.source, self.decoder, self.chunk)
    }
}

impl<S, D, B, E> Stream for FramedStream<S, D>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    D: FrameDecoder + Unpin,
    B: Into<Bytes>,
    E: From<FrameError>,
{
    type Item = Result<D::Item, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }

            if !this.chunk.is_empty() {
                match this.decoder.feed_slice(&this.chunk) {
                    Ok((consumed, item)) => {
                        this.chunk.advance(consumed);
                        if let Some(item) = item {
                            return Poll::Ready(Some(Ok(item)));
                        }
                    }
                    Err(err) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(err.into())));
                    }
                }
                continue;
            }

            match ready!(Pin::new(&mut this.source).poll_next(cx)) {
                Some(Ok(chunk)) => this.chunk = chunk.into(),
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.done = true;
                    return match this.decoder.finish() {
                        Ok(()) => Poll::Ready(None),
                        Err(err) => Poll::Ready(Some(Err(err.into()))),
                    };
                }
            }
        }
    }
}

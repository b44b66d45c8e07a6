//! 分帧解码的性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：字节流可能在任意位置被切开，解码结果必须只取决于字节序列本身；
//!   同时拉取式与推送式两种入口必须给出相同的消息序列与终止事件。
//! - **设计手法 (How)**：用 Proptest 生成消息与随机切分点，把编码后的字节按切分点拆成块，
//!   分别交给 [`FramedStream`] 与 [`FramedObserver`]，与原始消息逐项比对。
//! - **合同 (What)**：
//!   - 不含 `0x00` 的字符串序列经编码、任意切分、解码后保持不变；
//!   - 非空二进制负载经长度前缀编码后同理；
//!   - 字符串数组整帧编码再整帧解析得到原数组（包括空数组）；
//!   - 任意字节输入下，拉取与推送的事件序列完全一致。

use bytes::Bytes;
use futures::{StreamExt, executor::block_on, stream};
use proptest::prelude::*;
use spark_codec_frame::{
    FrameDecoder, FrameError, FramedObserver, FramedStream, LengthPrefixedDecoder,
    NulStringDecoder, StringArrayDecoder, decode_string_array_frame, encode_frame,
    encode_nul_string, encode_string_array,
};
use spark_socket_core::Observer;

/// 按切分点把 `bytes` 拆成若干块；切分点取模后排序去重。
fn split_at_points(bytes: &[u8], cuts: &[usize]) -> Vec<Bytes> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut points: Vec<usize> = cuts.iter().map(|cut| cut % bytes.len()).collect();
    points.push(0);
    points.push(bytes.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|range| Bytes::copy_from_slice(&bytes[range[0]..range[1]]))
        .collect()
}

fn pull<D>(chunks: Vec<Bytes>, decoder: D) -> Vec<Result<D::Item, FrameError>>
where
    D: FrameDecoder + Unpin,
{
    let source = stream::iter(chunks.into_iter().map(Ok::<_, FrameError>));
    block_on(FramedStream::new(source, decoder).collect())
}

#[derive(Debug, PartialEq)]
enum Event<T> {
    Next(T),
    Error(FrameError),
    Completed,
}

struct Recorder<T> {
    events: Vec<Event<T>>,
}

impl<T: Send> Observer<T, FrameError> for Recorder<T> {
    fn on_next(&mut self, item: T) {
        self.events.push(Event::Next(item));
    }

    fn on_error(&mut self, error: FrameError) {
        self.events.push(Event::Error(error));
    }

    fn on_completed(&mut self) {
        self.events.push(Event::Completed);
    }
}

fn push<D>(chunks: Vec<Bytes>, decoder: D) -> Vec<Event<D::Item>>
where
    D: FrameDecoder + Send,
    D::Item: Send,
{
    let mut framed = FramedObserver::new(decoder, Recorder { events: Vec::new() });
    for chunk in chunks {
        Observer::<Bytes, FrameError>::on_next(&mut framed, chunk);
    }
    Observer::<Bytes, FrameError>::on_completed(&mut framed);
    framed.into_inner().events
}

/// 把拉取结果改写成与推送相同的事件形式。
fn as_events<T>(items: Vec<Result<T, FrameError>>) -> Vec<Event<T>> {
    let mut events = Vec::with_capacity(items.len() + 1);
    let mut failed = false;
    for item in items {
        match item {
            Ok(item) => events.push(Event::Next(item)),
            Err(err) => {
                events.push(Event::Error(err));
                failed = true;
            }
        }
    }
    if !failed {
        events.push(Event::Completed);
    }
    events
}

fn text_without_nul() -> impl Strategy<Value = String> {
    "[^\\x00]{0,16}"
}

proptest! {
    #[test]
    fn prop_nul_strings_survive_any_split(
        messages in prop::collection::vec(text_without_nul(), 0..8),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut wire = Vec::new();
        for message in &messages {
            wire.extend_from_slice(&encode_nul_string(message));
        }
        let decoded: Vec<String> = pull(split_at_points(&wire, &cuts), NulStringDecoder::new())
            .into_iter()
            .collect::<Result<_, _>>()
            .expect("well-formed input");
        prop_assert_eq!(decoded, messages);
    }

    #[test]
    fn prop_length_prefixed_frames_survive_any_split(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 0..6),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut wire = Vec::new();
        for payload in &payloads {
            wire.extend_from_slice(&encode_frame(payload).expect("non-empty payload"));
        }
        let decoded: Vec<Bytes> = pull(split_at_points(&wire, &cuts), LengthPrefixedDecoder::new())
            .into_iter()
            .collect::<Result<_, _>>()
            .expect("well-formed input");
        let expected: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn prop_string_array_frame_round_trips(
        strings in prop::collection::vec(text_without_nul(), 0..6),
    ) {
        let frame = encode_string_array(
            &strings.iter().map(|text| Some(text.as_str())).collect::<Vec<_>>(),
        )
        .expect("encode");
        prop_assert_eq!(decode_string_array_frame(&frame).expect("decode"), strings);
    }

    #[test]
    fn prop_non_empty_string_arrays_stream_decode(
        arrays in prop::collection::vec(prop::collection::vec(text_without_nul(), 1..4), 0..4),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut wire = Vec::new();
        for array in &arrays {
            let items: Vec<Option<&str>> = array.iter().map(|text| Some(text.as_str())).collect();
            wire.extend_from_slice(&encode_string_array(&items).expect("encode"));
        }
        let decoded: Vec<Vec<String>> = pull(split_at_points(&wire, &cuts), StringArrayDecoder::default())
            .into_iter()
            .collect::<Result<_, _>>()
            .expect("well-formed input");
        prop_assert_eq!(decoded, arrays);
    }

    #[test]
    fn prop_pull_and_push_agree_on_arbitrary_bytes(
        wire in prop::collection::vec(any::<u8>(), 0..48),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let chunks = split_at_points(&wire, &cuts);
        prop_assert_eq!(
            as_events(pull(chunks.clone(), NulStringDecoder::new())),
            push(chunks.clone(), NulStringDecoder::new())
        );
        prop_assert_eq!(
            as_events(pull(chunks.clone(), LengthPrefixedDecoder::new())),
            push(chunks, LengthPrefixedDecoder::new())
        );
    }
}

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `spark-codec-frame` 提供字节流上的两种消息分帧：以 `0x00` 结尾的字符串，
//! 以及 4 字节大端长度前缀的二进制帧。
//!
//! # 教案背景（Why）
//! - 套接字只交付连续字节流，消息边界必须由分帧协议恢复；数据可能逐字节到达，
//!   也可能在任意位置被切开，解码器必须与切分点无关；
//! - 同一连接上常先用 `0x00` 结尾字符串完成握手，再切换到长度前缀帧，因此两种解码器
//!   共享同一套 [`FrameDecoder`] 契约，可在流中途替换。
//!
//! # 使用概览（How）
//! - 纯状态机：[`NulStringDecoder`]、[`LengthPrefixedDecoder`]、[`StringArrayDecoder`]，
//!   单字节 `feed` 即可推进，不做任何 IO；
//! - 拉取式：[`FramedStream`] 把任意“字节块流”变成“消息流”；
//! - 推送式：[`FramedObserver`] 把字节块回调变成消息回调，两者共用同一个解码器实例。
//!
//! # 合约说明（What）
//! - 流结束时解码器内仍有未完成字节即为致命错误，绝不静默丢弃或重同步；
//! - 长度前缀按有符号 32 位解释，非正值视为流已损坏（[`FrameError::InvalidLength`]）。
//!
//! # 风险提示（Trade-offs）
//! - 编码端不检查字符串内部的 `0x00`；含 `0x00` 的文本在解码端会被拆成多条消息。

mod decoder;
mod error;
mod length_prefixed;
mod nul;
mod observer;
mod stream;
mod string_array;

pub use crate::decoder::FrameDecoder;
pub use crate::error::FrameError;
pub use crate::length_prefixed::{LengthPrefixedDecoder, PREFIX_LEN, encode_frame};
pub use crate::nul::{NUL, NulStringDecoder, encode_nul_string};
pub use crate::observer::FramedObserver;
pub use crate::stream::FramedStream;
pub use crate::string_array::{
    StringArrayDecoder, StringArrayEncoder, decode_string_array_frame, encode_string_array,
    parse_string_array,
};

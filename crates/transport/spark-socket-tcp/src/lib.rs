#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `spark-socket-tcp` 基于 Tokio 提供 TCP 连接与监听器，核心是无竞态、幂等的释放协调。
//!
//! # 教案背景（Why）
//! - 一条连接会同时被接收循环、发送方与监听器的级联释放持有，物理关闭必须恰好一次，
//!   且“本地释放打断的接收”与“对端关闭”需要严格区分；
//! - 所有阻塞操作（`accept`/`read`/`connect`/`write`）都要能被及时打断，否则释放会被
//!   一个永不返回的系统调用拖住。
//!
//! # 使用概览（How）
//! - [`connect`]/[`connect_with_config`]：建立 [`Connection`]；
//! - [`listen`]/[`listen_with_config`]：得到 [`Listener`]，通过 [`Listener::accept_all`]
//!   持续接受连接；
//! - [`Connection::receive_all`] 返回字节块流，[`Connection::receive_framed`] 叠加
//!   `spark-codec-frame` 的分帧解码器；
//! - `dispose` 可并发多次调用，全部调用者得到同一个 [`DisposeOutcome`]。
//!
//! # 合约说明（What）
//! - 释放期间被打断的接收/接受流正常结束，不产生错误；
//! - 对端主动关闭时，活跃的接收流默认产出 [`ConnectionError::RemoteClosed`]；
//! - 日志通过 [`TcpSocketConfig::with_logger`] 注入，默认不输出。
//!
//! ```no_run
//! use spark_codec_frame::{NulStringDecoder, encode_nul_string};
//! use spark_socket_tcp::{Cancellation, DEFAULT_BACKLOG, connect, listen};
//! use futures::StreamExt;
//!
//! # async fn demo() -> Result<(), spark_socket_tcp::ConnectionError> {
//! let listener = listen("127.0.0.1:0".parse().unwrap(), DEFAULT_BACKLOG).await?;
//! let client = connect(listener.local_addr(), None, &Cancellation::new()).await?;
//! let server = listener.accept_all(Cancellation::new()).next().await.unwrap()?;
//! server.send(&encode_nul_string("Welcome!")).await?;
//! let mut strings = client.receive_framed(Cancellation::new(), NulStringDecoder::new());
//! assert_eq!(strings.next().await.unwrap()?, "Welcome!");
//! client.dispose().await;
//! listener.dispose().await;
//! # Ok(())
//! # }
//! ```

mod acceptor;
mod config;
mod connection;
mod connector;
mod disposal;
mod error;
mod listener;
mod receiver;
mod util;

pub use crate::acceptor::AcceptStream;
pub use crate::config::{
    DEFAULT_DISCONNECT_TIMEOUT, DEFAULT_RECEIVE_BUFFER_SIZE, PeerClosePolicy, TcpSocketConfig,
    TcpSocketSettings,
};
pub use crate::connection::Connection;
pub use crate::connector::{connect, connect_with_config};
pub use crate::disposal::{DisposalCoordinator, DisposalState, DisposeOutcome};
pub use crate::error::ConnectionError;
pub use crate::listener::{DEFAULT_BACKLOG, Listener, listen, listen_with_config};
pub use crate::receiver::{ByteStream, ReceiveStream};
pub use spark_socket_core::Cancellation;

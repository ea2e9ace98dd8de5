//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 拨号器
//!
//! [`Dialer`] 负责对目标发起一次连接尝试，返回独占的连接句柄。
//! 闸门只关心成功与否，句柄上的通道、队列等操作由调用方负责。

use crate::error::DialError;
use crate::target::Target;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// 拨号器
#[async_trait]
pub trait Dialer: Send + Sync {
    /// 连接句柄
    type Handle: Send + 'static;

    /// 发起一次连接尝试
    async fn dial(&self, target: &Target) -> Result<Self::Handle, DialError>;
}

#[async_trait]
impl<D: Dialer + ?Sized> Dialer for Arc<D> {
    type Handle = D::Handle;

    async fn dial(&self, target: &Target) -> Result<Self::Handle, DialError> {
        (**self).dial(target).await
    }
}

/// TCP 拨号器
#[derive(Debug, Clone)]
pub struct TcpDialer {
    nodelay: bool,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置是否启用 TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Handle = TcpConnection;

    async fn dial(&self, target: &Target) -> Result<TcpConnection, DialError> {
        let authority = target.authority();
        trace!("拨号: {}", authority);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(authority.as_str())
            .await
            .map_err(|e| DialError::Unreachable(format!("解析 {} 失败: {}", authority, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(DialError::Unreachable(format!(
                "{} 没有可用的地址",
                authority
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay).map_err(DialError::from_io)?;
                    debug!("已连接 {} ({})", authority, addr);
                    return Ok(TcpConnection { stream, peer: addr });
                }
                Err(e) => {
                    trace!("连接 {} 失败: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(DialError::from_io).unwrap_or_else(|| {
            DialError::Unreachable(format!("{} 没有可用的地址", authority))
        }))
    }
}

/// TCP 连接句柄
///
/// 独占持有底层连接，调用方负责通过 [`TcpConnection::close`] 关闭。
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    /// 对端地址
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 取出底层连接
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// 关闭连接
    pub async fn close(mut self) -> std::io::Result<()> {
        debug!("关闭连接: {}", self.peer);
        self.stream.shutdown().await
    }
}

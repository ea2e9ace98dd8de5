//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! AMQP 拨号器
//!
//! 与消息服务完成 AMQP 握手与认证后才视为连接成功，仅端口可达不算就绪。
//! 认证失败、虚拟主机不存在等错误不可重试，映射为 [`DialError::Fatal`]。

use crate::dialer::Dialer;
use crate::error::DialError;
use crate::target::Target;
use async_trait::async_trait;
use lapin::protocol::{AMQPErrorKind, AMQPHardError, AMQPSoftError};
use lapin::{Connection, ConnectionProperties};
use secrecy::ExposeSecret;
use tracing::{debug, trace};

/// 关闭连接时使用的应答码
const REPLY_SUCCESS: u16 = 200;

/// 在管理界面中显示的连接名
const CONNECTION_NAME: &str = "dialgate";

/// AMQP 拨号器
#[derive(Debug, Clone, Default)]
pub struct AmqpDialer;

impl AmqpDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for AmqpDialer {
    type Handle = AmqpConnection;

    async fn dial(&self, target: &Target) -> Result<AmqpConnection, DialError> {
        if !matches!(target.scheme(), "amqp" | "amqps") {
            return Err(DialError::Fatal(format!(
                "不支持的协议: {}",
                target.scheme()
            )));
        }

        let url = target
            .url()
            .map_err(|e| DialError::Fatal(e.to_string()))?;
        trace!("AMQP 拨号: {}", target.redacted_url());

        let connection = Connection::connect(
            url.expose_secret(),
            ConnectionProperties::default().with_connection_name(CONNECTION_NAME.into()),
        )
        .await
        .map_err(|e| classify(&e))?;

        debug!("AMQP 握手完成: {}", target.redacted_url());
        Ok(AmqpConnection {
            connection,
            authority: target.authority(),
        })
    }
}

/// 将 lapin 错误归类为瞬时或致命错误
pub fn classify(err: &lapin::Error) -> DialError {
    match err {
        lapin::Error::ProtocolError(amqp_error) => match amqp_error.kind() {
            AMQPErrorKind::Soft(AMQPSoftError::ACCESSREFUSED)
            | AMQPErrorKind::Hard(AMQPHardError::NOTALLOWED)
            | AMQPErrorKind::Hard(AMQPHardError::INVALIDPATH) => DialError::Fatal(err.to_string()),
            _ => DialError::Refused(err.to_string()),
        },
        lapin::Error::InvalidProtocolVersion(_) => DialError::Fatal(err.to_string()),
        lapin::Error::IOError(io_error) => {
            DialError::from_io(std::io::Error::new(io_error.kind(), io_error.to_string()))
        }
        _ => DialError::Unreachable(err.to_string()),
    }
}

/// AMQP 连接句柄
///
/// 独占持有已认证的连接，调用方负责通过 [`AmqpConnection::close`] 关闭。
pub struct AmqpConnection {
    connection: Connection,
    authority: String,
}

impl std::fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("authority", &self.authority)
            .field("status", &self.connection.status().state())
            .finish()
    }
}

impl AmqpConnection {
    /// 对端地址 `host:port`
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// 取出底层连接
    pub fn into_inner(self) -> Connection {
        self.connection
    }

    /// 关闭连接
    pub async fn close(self) -> Result<(), DialError> {
        debug!("关闭 AMQP 连接: {}", self.authority);
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| classify(&e))
    }
}

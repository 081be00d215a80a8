/// 统一的WebSocket管理模块
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::core::error::ExchangeError;

pub type Result<T> = std::result::Result<T, ExchangeError>;

/// 截取日志预览，回退到字符边界避免多字节字符处切断
fn log_preview(text: &str) -> &str {
    const MAX_PREVIEW: usize = 200;
    if text.len() <= MAX_PREVIEW {
        return text;
    }
    let mut end = MAX_PREVIEW;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============= WebSocket基础定义 =============

/// WebSocket连接状态
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

// ============= WebSocket Trait定义 =============

/// WebSocket客户端trait
#[async_trait]
pub trait WebSocketClient: Send + Sync {
    /// 连接到WebSocket服务器
    async fn connect(&mut self) -> Result<()>;

    /// 断开连接
    async fn disconnect(&mut self) -> Result<()>;

    /// 发送消息
    async fn send(&mut self, message: String) -> Result<()>;

    /// 接收消息
    async fn receive(&mut self) -> Result<Option<String>>;

    /// 发送心跳
    async fn ping(&self) -> Result<()>;

    /// 获取连接状态
    fn get_state(&self) -> ConnectionState;
}

// ============= 基础WebSocket客户端实现 =============

/// 基础WebSocket客户端实现
#[derive(Clone)]
pub struct BaseWebSocketClient {
    url: String,
    state: Arc<RwLock<ConnectionState>>,
    ws_stream: Arc<Mutex<Option<WebSocketStream<MaybeTlsStream<TcpStream>>>>>,
}

impl BaseWebSocketClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            ws_stream: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl WebSocketClient for BaseWebSocketClient {
    async fn connect(&mut self) -> Result<()> {
        *self.state.write().await = ConnectionState::Connecting;

        log::info!("🔌 正在连接WebSocket: {}", self.url);

        match connect_async(&self.url).await {
            Ok((ws_stream, _)) => {
                log::info!("✅ WebSocket连接成功: {}", self.url);
                *self.ws_stream.lock().await = Some(ws_stream);
                *self.state.write().await = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                log::error!("❌ WebSocket连接失败: {}", e);
                *self.state.write().await = ConnectionState::Disconnected;
                Err(ExchangeError::WebSocketError(format!(
                    "Connection failed: {}",
                    e
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut ws_stream) = self.ws_stream.lock().await.take() {
            let _ = ws_stream.close(None).await;
            log::info!("🔌 WebSocket连接已断开");
        }
        *self.state.write().await = ConnectionState::Disconnected;
        Ok(())
    }

    async fn send(&mut self, message: String) -> Result<()> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            ws_stream
                .send(Message::Text(message.clone()))
                .await
                .map_err(|e| {
                    log::error!("❌ 发送WebSocket消息失败: {}", e);
                    ExchangeError::WebSocketError(format!("Send failed: {}", e))
                })?;
            log::trace!("📤 发送WebSocket消息: {}", message);
            Ok(())
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    // 只在TRACE级别记录原始消息
                    log::trace!("📥 接收WebSocket消息: {}", log_preview(&text));
                    Ok(Some(text))
                }
                Some(Ok(Message::Ping(data))) => {
                    // 自动回复Pong
                    let _ = ws_stream.send(Message::Pong(data)).await;
                    log::trace!("🎾 回复WebSocket Ping");
                    Ok(None)
                }
                Some(Ok(Message::Close(_))) => {
                    log::info!("🔚 WebSocket连接关闭");
                    *self.state.write().await = ConnectionState::Disconnected;
                    Ok(None)
                }
                Some(Ok(_)) => Ok(None), // 其他消息类型忽略
                Some(Err(e)) => {
                    log::error!("❌ WebSocket接收错误: {}", e);
                    Err(ExchangeError::WebSocketError(format!(
                        "Receive error: {}",
                        e
                    )))
                }
                None => {
                    log::debug!("🔄 WebSocket流结束");
                    *self.state.write().await = ConnectionState::Disconnected;
                    Ok(None)
                }
            }
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            ws_stream.send(Message::Ping(vec![])).await.map_err(|e| {
                log::error!("❌ 发送心跳失败: {}", e);
                ExchangeError::WebSocketError(format!("Ping failed: {}", e))
            })?;
            Ok(())
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    fn get_state(&self) -> ConnectionState {
        // 同步方法，使用try_read避免阻塞
        self.state
            .try_read()
            .map(|state| state.clone())
            .unwrap_or(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_preview_short_text_unchanged() {
        assert_eq!(log_preview("hello"), "hello");
    }

    #[test]
    fn test_log_preview_multibyte_boundary() {
        // 每个汉字3字节，200不落在字符边界上
        let text = "价".repeat(100);
        let preview = log_preview(&text);
        assert!(preview.len() <= 200);
        assert_eq!(preview.len() % 3, 0);
        assert!(text.starts_with(preview));
    }

    #[test]
    fn test_log_preview_long_ascii() {
        let text = "a".repeat(500);
        assert_eq!(log_preview(&text).len(), 200);
    }
}

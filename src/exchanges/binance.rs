//! Binance现货适配器
//!
//! REST签名与公共请求、余额/订单/行情映射、UserDataStream
//! 订阅及listenKey自动续期。策略核心只见Exchange trait，
//! 所有Binance细节收敛在本模块内。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

use crate::core::config::{ApiKeys, Config};
use crate::core::error::ExchangeError;
use crate::core::exchange::{Exchange, OrderUpdateHandler};
use crate::core::types::{
    Balance, Order, OrderBook, OrderRequest, OrderSide, OrderStatus, OrderType, Result, Ticker,
    Trade,
};
use crate::core::websocket::{ConnectionState, WebSocketClient};
use crate::utils::{SignatureHelper, SymbolPair};

/// ListenKey状态，超过25分钟需要续期（官方有效期60分钟，提前续）
#[derive(Debug, Clone, Default)]
struct ListenKeyState {
    listen_key: Option<String>,
    last_keepalive: Option<DateTime<Utc>>,
    keepalive_running: bool,
}

impl ListenKeyState {
    fn needs_keepalive(&self) -> bool {
        match self.last_keepalive {
            Some(last) => Utc::now().signed_duration_since(last).num_minutes() >= 25,
            None => true,
        }
    }
}

/// Binance现货交易所实现
#[derive(Clone)]
pub struct BinanceExchange {
    config: Config,
    api_keys: ApiKeys,
    client: reqwest::Client,
    listen_key: Arc<RwLock<ListenKeyState>>,
    handlers: Arc<RwLock<Vec<OrderUpdateHandler>>>,
    /// Binance原生符号 -> 统一符号，用于用户流事件还原
    symbol_registry: Arc<RwLock<HashMap<String, String>>>,
    subscription_seq: Arc<AtomicU32>,
}

impl BinanceExchange {
    pub fn new(config: Config, api_keys: ApiKeys) -> Self {
        Self {
            config,
            api_keys,
            client: reqwest::Client::new(),
            listen_key: Arc::new(RwLock::new(ListenKeyState::default())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            symbol_registry: Arc::new(RwLock::new(HashMap::new())),
            subscription_seq: Arc::new(AtomicU32::new(1)),
        }
    }

    /// 统一符号转Binance原生符号，同时登记反向映射
    async fn to_exchange_symbol(&self, symbol: &str) -> Result<String> {
        let pair = SymbolPair::parse(symbol)?;
        let native = pair.to_binance();
        self.symbol_registry
            .write()
            .await
            .insert(native.clone(), pair.unified());
        Ok(native)
    }

    async fn send_signed_request<T>(
        &self,
        method: &str,
        endpoint: &str,
        mut params: HashMap<String, String>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        params.insert(
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        );
        params.insert("recvWindow".to_string(), "5000".to_string());

        // 按字母顺序排序参数生成签名
        let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
        sorted_params.sort_by_key(|&(k, _)| k);
        let query_string: Vec<String> = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let query_string = query_string.join("&");

        let signature =
            SignatureHelper::binance_signature(&self.api_keys.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.rest_base_url, endpoint, query_string, signature
        );

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "DELETE" => self.client.delete(&url),
            _ => return Err(ExchangeError::Other("不支持的HTTP方法".to_string())),
        };

        let response = request
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(ExchangeError::ApiError {
                code: status_code,
                message: error_text,
            })
        }
    }

    async fn send_public_request<T>(
        &self,
        endpoint: &str,
        params: Option<HashMap<String, String>>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut url = format!("{}{}", self.config.rest_base_url, endpoint);
        if let Some(params) = params {
            if !params.is_empty() {
                url = format!("{}?{}", url, SignatureHelper::build_query_string(&params));
            }
        }

        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(ExchangeError::ApiError {
                code: status_code,
                message: error_text,
            })
        }
    }

    /// 创建UserDataStream的listenKey
    async fn create_listen_key(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct ListenKeyResponse {
            #[serde(rename = "listenKey")]
            listen_key: String,
        }

        let url = format!("{}/api/v3/userDataStream", self.config.rest_base_url);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            let resp: ListenKeyResponse = response
                .json()
                .await
                .map_err(|e| ExchangeError::ParseError(e.to_string()))?;
            log::info!("✅ 已创建Binance listenKey");
            Ok(resp.listen_key)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(ExchangeError::ApiError {
                code: status_code,
                message: error_text,
            })
        }
    }

    /// 延长listenKey有效期
    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let url = format!(
            "{}/api/v3/userDataStream?listenKey={}",
            self.config.rest_base_url, listen_key
        );
        let response = self
            .client
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(ExchangeError::ApiError {
                code: status_code,
                message: format!("延长listenKey失败: {}", error_text),
            })
        }
    }

    /// 启动listenKey自动续期任务，每25分钟执行一次
    async fn start_keepalive_task(&self) {
        {
            let mut state = self.listen_key.write().await;
            if state.keepalive_running {
                log::debug!("listenKey续期任务已在运行，跳过启动");
                return;
            }
            state.keepalive_running = true;
        }

        let exchange = self.clone();
        tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(25 * 60));
            log::info!("🔄 启动listenKey自动续期任务");

            loop {
                timer.tick().await;

                let key = {
                    let state = exchange.listen_key.read().await;
                    if !state.needs_keepalive() {
                        continue;
                    }
                    match state.listen_key.clone() {
                        Some(key) => key,
                        None => {
                            break;
                        }
                    }
                };

                match exchange.keepalive_listen_key(&key).await {
                    Ok(()) => {
                        exchange.listen_key.write().await.last_keepalive = Some(Utc::now());
                        log::info!("✅ listenKey续期成功");
                    }
                    Err(e) => {
                        log::error!("❌ listenKey续期失败: {}", e);
                        // 续期失败时重建listenKey
                        match exchange.create_listen_key().await {
                            Ok(new_key) => {
                                let mut state = exchange.listen_key.write().await;
                                state.listen_key = Some(new_key);
                                state.last_keepalive = Some(Utc::now());
                                log::info!("✅ 重新创建listenKey成功");
                            }
                            Err(e) => {
                                log::error!("❌ 重新创建listenKey失败: {}", e);
                                let mut state = exchange.listen_key.write().await;
                                state.listen_key = None;
                                state.keepalive_running = false;
                                break;
                            }
                        }
                    }
                }
            }

            log::info!("⏹️ listenKey自动续期任务已停止");
        });
    }

    /// 解析executionReport事件为统一订单结构
    async fn parse_execution_report(&self, value: &serde_json::Value) -> Option<Order> {
        if value.get("e")?.as_str()? != "executionReport" {
            return None;
        }

        let native_symbol = value.get("s")?.as_str()?;
        let symbol = self
            .symbol_registry
            .read()
            .await
            .get(native_symbol)
            .cloned()
            .unwrap_or_else(|| native_symbol.to_string());

        let side = match value.get("S")?.as_str()? {
            "BUY" => OrderSide::Buy,
            _ => OrderSide::Sell,
        };
        let order_type = match value.get("o")?.as_str()? {
            "MARKET" => OrderType::Market,
            _ => OrderType::Limit,
        };
        let status = match value.get("X")?.as_str()? {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => return None,
        };

        let amount: f64 = value.get("q")?.as_str()?.parse().ok()?;
        let filled: f64 = value.get("z")?.as_str()?.parse().ok()?;
        let price: f64 = value.get("p")?.as_str()?.parse().ok()?;
        let event_time = value.get("E").and_then(|t| t.as_i64()).unwrap_or(0);

        Some(Order {
            id: value.get("i")?.as_i64()?.to_string(),
            client_order_id: value
                .get("c")
                .and_then(|c| c.as_str())
                .map(|c| c.to_string()),
            symbol,
            side,
            order_type,
            amount,
            price: if price > 0.0 { Some(price) } else { None },
            filled,
            remaining: amount - filled,
            status,
            timestamp: DateTime::from_timestamp_millis(event_time).unwrap_or_else(Utc::now),
        })
    }

    /// 用户数据流读取循环：断线后以新listenKey重连
    async fn run_user_stream(self, listen_key: String) {
        let mut current_key = listen_key;

        loop {
            let url = format!("{}/ws/{}", self.config.ws_base_url, current_key);
            let mut ws = crate::core::websocket::BaseWebSocketClient::new(url);

            if let Err(e) = ws.connect().await {
                log::error!("❌ 用户数据流连接失败: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }

            loop {
                match ws.receive().await {
                    Ok(Some(text)) => {
                        let value: serde_json::Value = match serde_json::from_str(&text) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if let Some(order) = self.parse_execution_report(&value).await {
                            log::debug!(
                                "📡 订单更新: {} {:?} {:.4}/{:.4}",
                                order.id,
                                order.status,
                                order.filled,
                                order.amount
                            );
                            let handlers = self.handlers.read().await.clone();
                            for handler in &handlers {
                                handler(order.clone());
                            }
                        }
                    }
                    Ok(None) => {
                        if ws.get_state() == ConnectionState::Disconnected {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("⚠️ 用户数据流接收错误: {}", e);
                        break;
                    }
                }
            }

            // 订阅已被全部释放时退出循环
            if self.handlers.read().await.is_empty() {
                log::info!("⏹️ 用户数据流无订阅者，停止读取");
                return;
            }

            log::warn!("⚠️ 用户数据流断开，5秒后重连");
            tokio::time::sleep(Duration::from_secs(5)).await;

            match self.create_listen_key().await {
                Ok(new_key) => {
                    let mut state = self.listen_key.write().await;
                    state.listen_key = Some(new_key.clone());
                    state.last_keepalive = Some(Utc::now());
                    current_key = new_key;
                }
                Err(e) => {
                    log::error!("❌ 重连时创建listenKey失败: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn get_balance(&self) -> Result<HashMap<String, Balance>> {
        #[derive(Deserialize)]
        struct AccountResponse {
            balances: Vec<BinanceAsset>,
        }

        #[derive(Deserialize)]
        struct BinanceAsset {
            asset: String,
            free: String,
            locked: String,
        }

        let account: AccountResponse = self
            .send_signed_request("GET", "/api/v3/account", HashMap::new())
            .await?;

        let mut balances = HashMap::new();
        for asset in account.balances {
            let free: f64 = asset.free.parse().unwrap_or(0.0);
            let used: f64 = asset.locked.parse().unwrap_or(0.0);
            if free > 0.0 || used > 0.0 {
                balances.insert(
                    asset.asset.clone(),
                    Balance {
                        asset: asset.asset,
                        free,
                        used,
                        total: free + used,
                    },
                );
            }
        }
        Ok(balances)
    }

    async fn create_order(&self, order_request: OrderRequest) -> Result<Order> {
        let exchange_symbol = self.to_exchange_symbol(&order_request.symbol).await?;

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);
        params.insert(
            "side".to_string(),
            match order_request.side {
                OrderSide::Buy => "BUY".to_string(),
                OrderSide::Sell => "SELL".to_string(),
            },
        );
        params.insert(
            "type".to_string(),
            match order_request.order_type {
                OrderType::Market => "MARKET".to_string(),
                OrderType::Limit => "LIMIT".to_string(),
            },
        );
        params.insert("quantity".to_string(), order_request.amount.to_string());

        if let Some(price) = order_request.price {
            params.insert("price".to_string(), price.to_string());
        }
        if order_request.order_type == OrderType::Limit {
            params.insert("timeInForce".to_string(), "GTC".to_string());
        }
        if let Some(client_order_id) = &order_request.client_order_id {
            params.insert("newClientOrderId".to_string(), client_order_id.clone());
        }

        #[derive(Deserialize)]
        struct BinanceOrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId")]
            client_order_id: Option<String>,
            #[serde(rename = "origQty")]
            orig_qty: String,
            price: Option<String>,
            #[serde(rename = "executedQty")]
            executed_qty: String,
            status: String,
            #[serde(rename = "transactTime")]
            transact_time: Option<i64>,
        }

        let response: BinanceOrderResponse = self
            .send_signed_request("POST", "/api/v3/order", params)
            .await?;

        let amount: f64 = response.orig_qty.parse().unwrap_or(0.0);
        let filled: f64 = response.executed_qty.parse().unwrap_or(0.0);

        Ok(Order {
            id: response.order_id.to_string(),
            client_order_id: response.client_order_id,
            symbol: order_request.symbol,
            side: order_request.side,
            order_type: order_request.order_type,
            amount,
            price: response
                .price
                .as_ref()
                .and_then(|p| p.parse::<f64>().ok())
                .filter(|p| *p > 0.0),
            filled,
            remaining: amount - filled,
            status: match response.status.as_str() {
                "NEW" => OrderStatus::New,
                "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
                "FILLED" => OrderStatus::Filled,
                "CANCELED" => OrderStatus::Canceled,
                "REJECTED" => OrderStatus::Rejected,
                "EXPIRED" => OrderStatus::Expired,
                _ => OrderStatus::New,
            },
            timestamp: response
                .transact_time
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<()> {
        let exchange_symbol = self.to_exchange_symbol(symbol).await?;

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);
        params.insert("orderId".to_string(), order_id.to_string());

        let _: serde_json::Value = self
            .send_signed_request("DELETE", "/api/v3/order", params)
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let exchange_symbol = self.to_exchange_symbol(symbol).await?;

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);

        // 没有挂单时Binance返回-2011，对上层来说是成功撤净
        match self
            .send_signed_request::<serde_json::Value>("DELETE", "/api/v3/openOrders", params)
            .await
        {
            Ok(_) => Ok(()),
            Err(ExchangeError::ApiError { message, .. }) if message.contains("-2011") => {
                log::debug!("{} 无挂单可撤", symbol);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let exchange_symbol = self.to_exchange_symbol(symbol).await?;

        #[derive(Deserialize)]
        struct BinanceTicker {
            #[serde(rename = "highPrice")]
            high_price: String,
            #[serde(rename = "lowPrice")]
            low_price: String,
            #[serde(rename = "bidPrice")]
            bid_price: String,
            #[serde(rename = "askPrice")]
            ask_price: String,
            #[serde(rename = "lastPrice")]
            last_price: String,
            volume: String,
            #[serde(rename = "closeTime")]
            close_time: i64,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);

        let ticker: BinanceTicker = self
            .send_public_request("/api/v3/ticker/24hr", Some(params))
            .await?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            high: ticker.high_price.parse().unwrap_or(0.0),
            low: ticker.low_price.parse().unwrap_or(0.0),
            bid: ticker.bid_price.parse().unwrap_or(0.0),
            ask: ticker.ask_price.parse().unwrap_or(0.0),
            last: ticker.last_price.parse().unwrap_or(0.0),
            volume: ticker.volume.parse().unwrap_or(0.0),
            timestamp: DateTime::from_timestamp_millis(ticker.close_time).unwrap_or_else(Utc::now),
        })
    }

    async fn get_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook> {
        let exchange_symbol = self.to_exchange_symbol(symbol).await?;

        #[derive(Deserialize)]
        struct BinanceDepth {
            bids: Vec<[String; 2]>,
            asks: Vec<[String; 2]>,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);
        params.insert("limit".to_string(), limit.unwrap_or(100).to_string());

        let depth: BinanceDepth = self
            .send_public_request("/api/v3/depth", Some(params))
            .await?;

        let parse_side = |entries: Vec<[String; 2]>| -> Vec<[f64; 2]> {
            entries
                .into_iter()
                .filter_map(|[p, q]| {
                    let price: f64 = p.parse().ok()?;
                    let qty: f64 = q.parse().ok()?;
                    Some([price, qty])
                })
                .collect()
        };

        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: parse_side(depth.bids),
            asks: parse_side(depth.asks),
            timestamp: Utc::now(),
        })
    }

    async fn get_recent_trades(&self, symbol: &str, limit: Option<u32>) -> Result<Vec<Trade>> {
        let exchange_symbol = self.to_exchange_symbol(symbol).await?;

        #[derive(Deserialize)]
        struct BinanceTrade {
            id: i64,
            price: String,
            qty: String,
            time: i64,
            #[serde(rename = "isBuyerMaker")]
            is_buyer_maker: bool,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), exchange_symbol);
        params.insert("limit".to_string(), limit.unwrap_or(100).to_string());

        let trades: Vec<BinanceTrade> = self
            .send_public_request("/api/v3/trades", Some(params))
            .await?;

        Ok(trades
            .into_iter()
            .map(|t| Trade {
                id: t.id.to_string(),
                symbol: symbol.to_string(),
                // isBuyerMaker为true代表主动卖出
                side: if t.is_buyer_maker {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                },
                amount: t.qty.parse().unwrap_or(0.0),
                price: t.price.parse().unwrap_or(0.0),
                timestamp: DateTime::from_timestamp_millis(t.time).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn connect_user_data_stream(&self) -> Result<()> {
        {
            let state = self.listen_key.read().await;
            if state.listen_key.is_some() {
                log::debug!("用户数据流已建立，跳过重复连接");
                return Ok(());
            }
        }

        let listen_key = self.create_listen_key().await?;
        {
            let mut state = self.listen_key.write().await;
            state.listen_key = Some(listen_key.clone());
            state.last_keepalive = Some(Utc::now());
        }

        self.start_keepalive_task().await;

        let exchange = self.clone();
        tokio::spawn(async move {
            exchange.run_user_stream(listen_key).await;
        });

        Ok(())
    }

    async fn subscribe_user_orders(&self, handler: OrderUpdateHandler) -> Result<String> {
        self.handlers.write().await.push(handler);
        let id = self.subscription_seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("binance-user-orders-{}", id))
    }

    async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.send_public_request("/api/v3/ping", None).await?;
        Ok(())
    }
}

//! Outbound adapters (driven side): venue integrations, the broker bridge
//! and the record store, plus the transport and codec helpers they share.

pub mod binance;
pub mod codec;
pub mod http;
pub mod huobi;
pub mod jsonl;
pub mod okx;
pub mod rabbitmq;
pub mod signing;
pub mod websocket;

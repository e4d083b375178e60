//! WebSocket transport — one JSON text frame per envelope

use super::{Connector, Link};
use agentlink_core::{Envelope, Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMsg};
use tracing::{debug, warn};

/// Connects to `{base_url}/{name}`, e.g. `ws://127.0.0.1:9225/sidepanel`.
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    fn kind(&self) -> &str {
        "ws"
    }

    async fn connect(&self, name: &str) -> Result<Link> {
        let url = self.url_for(name);
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::connect_failed(name, format!("{}: {}", url, e)))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Envelope>();

        // Writer: ends when the endpoint drops its sender or the socket fails.
        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping unserializable envelope: {}", e);
                        continue;
                    }
                };
                if ws_tx.send(WsMsg::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: dropping `in_tx` signals the link drop to the endpoint.
        let reader_url = url.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(WsMsg::Text(text)) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            if in_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring frame from {}: {}", reader_url, e),
                    },
                    Ok(WsMsg::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("ws read error on {}: {}", reader_url, e);
                        break;
                    }
                }
            }
            debug!("ws link closed: {}", reader_url);
        });

        debug!("ws link opened: {}", url);
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

//! [`SubscriberEndpoint`] implementation over an axum server.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use soilgate_app::ports::{EndpointContext, SubscriberEndpoint};
use soilgate_app::shutdown::StopSignal;
use soilgate_domain::error::GatewayError;

use crate::config::SessionConfig;
use crate::router;
use crate::state::AppState;

/// Subscriber endpoint serving WebSocket sessions over HTTP.
pub struct AxumEndpoint {
    addr: String,
    config: SessionConfig,
    listener: Option<TcpListener>,
}

impl AxumEndpoint {
    /// Endpoint that will listen on `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            listener: None,
        }
    }
}

impl SubscriberEndpoint for AxumEndpoint {
    async fn bind(&mut self) -> Result<SocketAddr, GatewayError> {
        let bind_error = |source| GatewayError::Bind {
            addr: self.addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!(%local_addr, "subscriber endpoint listening");
        self.listener = Some(listener);
        Ok(local_addr)
    }

    fn serve(
        self,
        ctx: EndpointContext,
        stop: StopSignal,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'static {
        async move {
            let Some(listener) = self.listener else {
                return Err(GatewayError::Bind {
                    addr: self.addr,
                    source: io::Error::new(io::ErrorKind::NotConnected, "endpoint was never bound"),
                });
            };
            let app = router::build(AppState::new(ctx, self.config));
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.stopped())
                .await
                .map_err(GatewayError::Endpoint)?;
            tracing::info!("subscriber endpoint stopped accepting");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use soilgate_app::hub::BroadcastHub;
    use soilgate_app::shutdown::SessionTracker;
    use soilgate_domain::measurement::Measurement;
    use soilgate_domain::time::now;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    struct Server {
        addr: SocketAddr,
        hub: Arc<BroadcastHub>,
        sessions: SessionTracker,
        stop: watch::Sender<bool>,
        task: JoinHandle<Result<(), GatewayError>>,
    }

    async fn serve(config: SessionConfig) -> Server {
        let mut endpoint = AxumEndpoint::new("127.0.0.1:0", config);
        let addr = endpoint.bind().await.unwrap();
        let hub = Arc::new(BroadcastHub::new("Connected to soil moisture server"));
        let sessions = SessionTracker::new();
        let ctx = EndpointContext {
            hub: Arc::clone(&hub),
            sessions: sessions.clone(),
        };
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(endpoint.serve(ctx, StopSignal::new(rx)));
        Server {
            addr,
            hub,
            sessions,
            stop,
            task,
        }
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return text.as_str().to_owned();
            }
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn should_greet_then_stream_measurements() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();

        assert_eq!(
            next_text(&mut ws).await,
            r#"{"type":"connection","message":"Connected to soil moisture server"}"#
        );

        server.hub.publish(&Measurement::soil_moisture(42, now()));
        assert_eq!(
            next_text(&mut ws).await,
            r#"{"type":"soilMoisture","value":42}"#
        );
    }

    #[tokio::test]
    async fn should_accept_subscribers_on_root_path() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
            .await
            .unwrap();

        assert!(next_text(&mut ws).await.contains("\"connection\""));
    }

    #[tokio::test]
    async fn should_ignore_inbound_messages() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        next_text(&mut ws).await;

        ws.send(Message::Text("hello gateway".into())).await.unwrap();
        server.hub.publish(&Measurement::soil_moisture(7, now()));

        assert_eq!(next_text(&mut ws).await, r#"{"type":"soilMoisture","value":7}"#);
        assert_eq!(server.hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn should_unsubscribe_when_client_disconnects() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        next_text(&mut ws).await;
        assert_eq!(server.hub.subscriber_count(), 1);

        ws.close(None).await.unwrap();

        wait_until(|| server.hub.subscriber_count() == 0).await;
        wait_until(|| server.sessions.active() == 0).await;
    }

    #[tokio::test]
    async fn should_serve_with_idle_pings_disabled() {
        let server = serve(SessionConfig {
            ping_interval: Duration::ZERO,
            ..SessionConfig::default()
        })
        .await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        next_text(&mut ws).await;

        server.hub.publish(&Measurement::soil_moisture(18, now()));

        assert_eq!(next_text(&mut ws).await, r#"{"type":"soilMoisture","value":18}"#);
        assert_eq!(server.hub.subscriber_count(), 1);
        assert_eq!(server.sessions.active(), 1);
    }

    #[tokio::test]
    async fn should_unsubscribe_when_session_is_aborted() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        next_text(&mut ws).await;
        assert_eq!(server.hub.subscriber_count(), 1);

        assert_eq!(server.sessions.abort_all(), 1);

        wait_until(|| server.sessions.active() == 0).await;
        wait_until(|| server.hub.subscriber_count() == 0).await;
        // The transport went with the session.
        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(ended.is_ok());
    }

    #[tokio::test]
    async fn should_close_sessions_when_hub_closes_and_stop_serving() {
        let server = serve(SessionConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        next_text(&mut ws).await;

        server.stop.send_replace(true);
        server.hub.close_all();

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        let served = tokio::time::timeout(Duration::from_secs(2), server.task)
            .await
            .unwrap()
            .unwrap();
        assert!(served.is_ok());
        wait_until(|| server.sessions.active() == 0).await;
    }

    #[tokio::test]
    async fn should_fail_to_bind_an_invalid_address() {
        let mut endpoint = AxumEndpoint::new("not-an-address", SessionConfig::default());
        let err = endpoint.bind().await.unwrap_err();
        assert!(matches!(err, GatewayError::Bind { .. }));
    }

    #[tokio::test]
    async fn should_refuse_to_serve_unbound_endpoint() {
        let endpoint = AxumEndpoint::new("127.0.0.1:0", SessionConfig::default());
        let (_stop, rx) = watch::channel(false);
        let ctx = EndpointContext {
            hub: Arc::new(BroadcastHub::new("hi")),
            sessions: SessionTracker::new(),
        };
        let result = endpoint.serve(ctx, StopSignal::new(rx)).await;
        assert!(matches!(result, Err(GatewayError::Bind { .. })));
    }
}

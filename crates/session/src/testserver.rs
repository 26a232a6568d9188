//! In-Process WebSocket-Gegenstelle fuer Session-Tests

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bbbot_api::{ApiError, ApiResult, JoinApi, JoinCredentials};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Startet einen Ein-Verbindungs-Testserver und gibt dessen URL zurueck
pub async fn test_server<F, Fut>(skript: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        skript(ws).await;
    });
    (format!("ws://{addr}/html5client/websocket"), handle)
}

/// Naechster Text-Frame als JSON (None bei Verbindungsende)
pub async fn lesen(ws: &mut ServerWs) -> Option<Value> {
    while let Some(Ok(frame)) = ws.next().await {
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

pub async fn schreiben(ws: &mut ServerWs, wert: Value) {
    ws.send(Message::Text(wert.to_string().into())).await.unwrap();
}

/// Liest bis zum Verbindungsende
pub async fn bis_ende(ws: &mut ServerWs) {
    while lesen(ws).await.is_some() {}
}

/// Beantwortet den naechsten Methodenaufruf und gibt ihn zurueck
pub async fn methode_beantworten(ws: &mut ServerWs, erwartet: &str, ergebnis: Value) -> Value {
    let call = lesen(ws).await.unwrap();
    assert_eq!(call["msg"], "method");
    assert_eq!(call["method"], erwartet);
    schreiben(ws, json!({"msg": "result", "id": call["id"], "result": ergebnis})).await;
    call
}

/// Handshake, `current-user` und `validateAuthToken`; gibt die Sub-ID zurueck
pub async fn join_abwickeln(ws: &mut ServerWs) -> Value {
    schreiben(ws, json!({"server_id": "0"})).await;
    let connect = lesen(ws).await.unwrap();
    assert_eq!(connect["msg"], "connect");
    schreiben(ws, json!({"msg": "connected", "session": "sess-1"})).await;

    let sub = lesen(ws).await.unwrap();
    assert_eq!(sub["msg"], "sub");
    assert_eq!(sub["name"], "current-user");
    schreiben(ws, json!({"msg": "ready", "subs": [sub["id"]]})).await;

    let call = methode_beantworten(ws, "validateAuthToken", json!(true)).await;
    assert_eq!(call["params"], json!(["int-1", "w_bot", "tok", "w_bot"]));
    sub["id"].clone()
}

pub fn credentials() -> JoinCredentials {
    JoinCredentials {
        join_url: "https://bbb.example/html5client/join?sessionToken=sess".into(),
        cookies: vec!["JSESSIONID=abc".into()],
        internal_user_id: "w_bot".into(),
        auth_token: "tok".into(),
        session_token: "sess".into(),
        internal_meeting_id: "int-1".into(),
    }
}

/// REST-Join-Attrappe
pub enum FakeJoin {
    Erfolg,
    Abgelehnt,
    /// Kehrt nie zurueck
    Haengt,
    /// Erfolg nach einer Verzoegerung
    Verzoegert(Duration),
}

#[async_trait]
impl JoinApi for FakeJoin {
    async fn join(&self, _: &str, _: &str, _: bool) -> ApiResult<JoinCredentials> {
        match self {
            FakeJoin::Erfolg => Ok(credentials()),
            FakeJoin::Abgelehnt => Err(ApiError::Rejected {
                message_key: "invalidPassword".into(),
                message: "wrong password".into(),
            }),
            FakeJoin::Haengt => std::future::pending().await,
            FakeJoin::Verzoegert(dauer) => {
                tokio::time::sleep(*dauer).await;
                Ok(credentials())
            }
        }
    }
}

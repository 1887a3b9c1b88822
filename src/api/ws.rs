use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast;

use crate::notifications::ChangeReport;

use super::AppState;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let reports = state.reports.subscribe();
    ws.on_upgrade(move |socket| forward_reports(socket, reports))
}

/// Pushes every poll report to the client as text until either side closes.
async fn forward_reports(mut socket: WebSocket, mut reports: broadcast::Receiver<ChangeReport>) {
    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Ok(report) => {
                    if socket.send(Message::Text(report.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log_warn!("websocket client lagged, {skipped} report(s) skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                // Pings are answered by axum; anything else is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    log_debug!("websocket connection closed");
}

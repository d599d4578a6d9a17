use std::{net::SocketAddr, ops::ControlFlow};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_extra::{headers, TypedHeader};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{api::ApiError, channel, pairing::UserId, utils::event::ActionRequest, AppState};

use super::{Notice, Outbound, Sender};

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

#[derive(Deserialize)]
pub struct ConnectArgs {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(ConnectArgs { user_id }): Query<ConnectArgs>,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let user_agent = if let Some(TypedHeader(user_agent)) = user_agent {
        user_agent.to_string()
    } else {
        String::from("Unknown browser")
    };
    // no id in the query: the server picks one and announces it
    let user = match UserId::new(user_id.unwrap_or_else(|| Uuid::new_v4().to_string())) {
        Ok(user) => user,
        Err(e) => return ApiError::from(e).into_response(),
    };
    info!("user {} {} connected from {}", user, user_agent, addr);
    ws.on_upgrade(move |socket| handle_socket(state, user, socket, addr))
}

async fn handle_socket(state: AppState, user: UserId, socket: WebSocket, who: SocketAddr) {
    let (tx, mut rx) = unbounded_channel::<Outbound>();
    let conn = state.hub().register(&user, tx.clone());
    send_notice(
        &tx,
        &Notice::Connected {
            user_id: user.clone(),
        },
    );

    let (mut sender, mut receiver) = socket.split();
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.to_string())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_user = user.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut cnt = 0;
        while let Some(Ok(msg)) = receiver.next().await {
            cnt += 1;
            if process_message(&recv_state, &recv_user, &tx, msg, who).is_break() {
                break;
            }
        }
        cnt
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        cnt = &mut recv_task => {
            send_task.abort();
            if let Ok(cnt) = cnt {
                debug!("{} sent {} frames", who, cnt);
            }
        }
    }

    close_connection(&state, &user, conn);
    info!("user {} from {} disconnected", user, who);
}

/// Drop one connection. Losing the last one is a disconnect, unless the
/// user has reconnected before the table lock is taken.
fn close_connection(state: &AppState, user: &UserId, conn: Uuid) {
    if state.hub().unregister(user, conn) {
        state.relay.disconnect_if_gone(user);
    }
}

fn send_notice(tx: &Sender<Outbound>, notice: &Notice) {
    match serde_json::to_string(notice) {
        Ok(text) => {
            if tx.send(Outbound::from(text)).is_err() {
                debug!("connection already closed, dropping {:?}", notice);
            }
        }
        Err(e) => error!("failed to encode {:?}: {}", notice, e),
    }
}

fn process_message(
    state: &AppState,
    user: &UserId,
    tx: &Sender<Outbound>,
    msg: Message,
    who: SocketAddr,
) -> ControlFlow<(), ()> {
    match msg {
        Message::Text(t) => match serde_json::from_str::<ActionRequest>(&t) {
            Ok(request) => {
                if request.user_id.as_deref().is_some_and(|id| id != user.as_str()) {
                    warn!("{} sent a frame for another user: {:?}", who, t);
                    send_notice(
                        tx,
                        &Notice::Error {
                            message: "userId does not match this connection".to_owned(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                match request.into_action() {
                    Ok(action) => {
                        channel::dispatch(&state.relay, user, action);
                    }
                    Err(e) => send_notice(
                        tx,
                        &Notice::Error {
                            message: e.to_string(),
                        },
                    ),
                }
            }
            Err(e) => {
                warn!("{} sent unknown message: {:?} ({})", who, t, e);
                send_notice(
                    tx,
                    &Notice::Error {
                        message: "malformed frame".to_owned(),
                    },
                );
            }
        },
        Message::Binary(d) => {
            debug!("{} sent {} bytes", who, d.len());
        }
        Message::Close(c) => {
            if let Some(cf) = c {
                info!(
                    "{} sent close with code {} and reason `{}`",
                    who, cf.code, cf.reason
                );
            } else {
                info!("{who} somehow sent close message without CloseFrame");
            }
            return ControlFlow::Break(());
        }
        // axum answers pings itself
        Message::Pong(_) | Message::Ping(_) => {}
    }
    ControlFlow::Continue(())
}

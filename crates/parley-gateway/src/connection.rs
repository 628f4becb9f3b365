use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_types::events::{ChatEvent, GatewayCommand};

use crate::bus::EventBus;
use crate::subscriptions;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle one subscription connection. The client opens live subscriptions
/// by sending `Subscribe` frames; each one gets its own forwarding task
/// (bus stream -> visibility filter -> outbound channel). Disconnecting
/// aborts every forwarding task, which drops the bus listeners.
pub async fn handle_connection(socket: WebSocket, bus: EventBus) {
    let (mut sender, mut receiver) = socket.split();

    info!("subscription client connected");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();

    let subscription_tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward filtered events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read Subscribe commands from the client
    let bus_recv = bus.clone();
    let tasks_recv = subscription_tasks.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Subscribe(request)) => {
                        debug!("subscription opened on {:?}", request.topic());

                        let mut stream = bus_recv.subscribe(&[request.topic()]);
                        let event_tx = event_tx.clone();
                        let task = tokio::spawn(async move {
                            while let Some(event) = stream.next().await {
                                if !subscriptions::event_visible(&request, &event) {
                                    continue;
                                }
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                        });

                        tasks_recv
                            .lock()
                            .expect("subscription task registry poisoned")
                            .push(task);
                    }
                    Err(e) => {
                        warn!(
                            "bad gateway command: {} -- raw: {}",
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    for task in subscription_tasks
        .lock()
        .expect("subscription task registry poisoned")
        .drain(..)
    {
        task.abort();
    }

    info!("subscription client disconnected");
}

//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Ein zweiter Task liest Frames vom Socket und signalisiert das
//! Verbindungsende ueber ein `CancellationToken`; eine gerade laufende
//! Anfrage wird dann abgebrochen und die Verbindung abgeraeumt.
//!
//! ## Ablauf
//! ```text
//! Verbunden --connect--> Authentifiziert --(join/leave/speak/audio)--> ...
//!     |                        |
//!     +--- Timeout/Fehler -----+----- EOF/Timeout/Shutdown ---> trennen
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Ohne eingehenden Frame innerhalb von `verbindungs_timeout_sek` wird
//!   die Verbindung getrennt

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use sprechfunk_core::types::ConnectionId;
use sprechfunk_protocol::{
    control::{ConnectedResponse, ControlMessage, ControlPayload, ErrorCode},
    wire::FrameCodec,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{jetzt_ms, DispatcherContext, MessageDispatcher};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// Groesse der Eingangs-Queue zwischen Lese-Task und Verbindungs-Task
const EINGANG_QUEUE_GROESSE: usize = 64;

type Schreiber<S> = SplitSink<Framed<S, FrameCodec>, ControlMessage>;

/// Verarbeitet eine einzelne Client-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            connection_id: ConnectionId::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, die Verbindung inaktiv wird oder ein
    /// Shutdown-Signal eingeht. Raeumt danach immer vollstaendig ab.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer_addr = self.peer_addr;
        let connection_id = self.connection_id;
        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Neue Verbindung");

        let (mut sink, mut strom) = Framed::new(stream, FrameCodec::new()).split();
        let abbruch = CancellationToken::new();
        let (eingang_tx, mut eingang_rx) = mpsc::channel::<ControlMessage>(EINGANG_QUEUE_GROESSE);

        // Lese-Task: Socket -> Eingangs-Queue
        let lese_abbruch = abbruch.clone();
        let lese_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = lese_abbruch.cancelled() => break,
                    frame = strom.next() => match frame {
                        Some(Ok(nachricht)) => {
                            tracing::trace!(
                                connection_id = %connection_id,
                                request_id = nachricht.request_id,
                                art = nachricht.payload.art(),
                                "Nachricht empfangen"
                            );
                            if eingang_tx.send(nachricht).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(connection_id = %connection_id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(connection_id = %connection_id, "Verbindung vom Client getrennt");
                            break;
                        }
                    },
                }
            }
            lese_abbruch.cancel();
        });

        let auth_timeout = Duration::from_millis(self.state.config.auth_timeout_ms);
        let auth = tokio::time::timeout(
            auth_timeout,
            self.authentifizieren(&mut eingang_rx, &mut sink),
        )
        .await;

        match auth {
            Ok(Some((ctx, sende_rx))) => {
                self.hauptschleife(ctx, sende_rx, &mut eingang_rx, &mut sink, &abbruch, &mut shutdown_rx)
                    .await;
            }
            Ok(None) => {}
            Err(_) => {
                tracing::warn!(connection_id = %connection_id, "Keine Authentifizierung innerhalb des Zeitlimits");
                let _ = sink.send(SignalingError::Timeout.als_nachricht(0)).await;
            }
        }

        // Cleanup beim Verbindungsende (auch nach abgebrochener Authentifizierung)
        abbruch.cancel();
        self.state.lifecycle.trennen(connection_id).await;
        // Ein im Senden blockierter Lese-Task wird so frei
        drop(eingang_rx);
        let _ = sink.close().await;
        let _ = lese_task.await;

        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Verbindungs-Task beendet");
    }

    /// Wartet auf `connect` und oeffnet die Sitzung
    ///
    /// Vor der Authentifizierung ist nur `ping` erlaubt. Gibt `None` zurueck
    /// wenn die Verbindung geschlossen werden soll.
    async fn authentifizieren<S>(
        &self,
        eingang_rx: &mut mpsc::Receiver<ControlMessage>,
        sink: &mut Schreiber<S>,
    ) -> Option<(DispatcherContext, mpsc::Receiver<ControlMessage>)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        loop {
            let nachricht = eingang_rx.recv().await?;
            let request_id = nachricht.request_id;

            match nachricht.payload {
                ControlPayload::Ping(ping) => {
                    let pong = ControlMessage::pong(request_id, ping.timestamp_ms, jetzt_ms());
                    sink.send(pong).await.ok()?;
                }
                ControlPayload::Pong(_) => {}
                ControlPayload::Connect(req) => {
                    tracing::debug!(
                        connection_id = %self.connection_id,
                        client_version = req.client_version.as_deref().unwrap_or("unbekannt"),
                        "Authentifizierung"
                    );
                    return match self
                        .state
                        .lifecycle
                        .verbinden(self.connection_id, &req.token)
                        .await
                    {
                        Ok((sitzung, sende_rx)) => {
                            let begruessung = ControlMessage::new(
                                request_id,
                                ControlPayload::Connected(ConnectedResponse {
                                    connection_id: self.connection_id,
                                    user_id: sitzung.user_id,
                                    server_id: self.state.config.server_id,
                                    message: format!("Willkommen auf {}", self.state.config.server_name),
                                }),
                            );
                            sink.send(begruessung).await.ok()?;
                            Some((
                                DispatcherContext {
                                    connection_id: self.connection_id,
                                    user_id: sitzung.user_id,
                                },
                                sende_rx,
                            ))
                        }
                        Err(e) => {
                            tracing::info!(connection_id = %self.connection_id, fehler = %e, "Authentifizierung abgelehnt");
                            let _ = sink.send(e.als_nachricht(request_id)).await;
                            None
                        }
                    };
                }
                andere => {
                    tracing::debug!(
                        connection_id = %self.connection_id,
                        art = andere.art(),
                        "Nachricht vor der Authentifizierung"
                    );
                    let fehler = SignalingError::Unauthorized("Authentifizierung erforderlich".into());
                    let _ = sink.send(fehler.als_nachricht(request_id)).await;
                    return None;
                }
            }
        }
    }

    async fn hauptschleife<S>(
        &self,
        ctx: DispatcherContext,
        mut sende_rx: mpsc::Receiver<ControlMessage>,
        eingang_rx: &mut mpsc::Receiver<ControlMessage>,
        sink: &mut Schreiber<S>,
        abbruch: &CancellationToken,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection_id = ctx.connection_id;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        let mut ping_takt =
            tokio::time::interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);
        let mut ping_request_id: u32 = 0;

        loop {
            tokio::select! {
                _ = abbruch.cancelled() => break,

                // Eingehende Nachricht vom Client
                nachricht = eingang_rx.recv() => {
                    let Some(nachricht) = nachricht else { break };
                    letzter_empfang = Instant::now();

                    // Verbindungsende bricht eine laufende Anfrage ab
                    let antwort = tokio::select! {
                        _ = abbruch.cancelled() => None,
                        antwort = dispatcher.dispatch(nachricht, &ctx) => Some(antwort),
                    };
                    let Some(antwort) = antwort else { break };

                    if let Some(antwort) = antwort {
                        if let Err(e) = sink.send(antwort).await {
                            tracing::warn!(connection_id = %connection_id, fehler = %e, "Senden fehlgeschlagen");
                            break;
                        }
                    }
                }

                // Ausgehende Ereignisse aus dem Router
                ausgehend = sende_rx.recv() => {
                    let Some(ausgehend) = ausgehend else { break };
                    if let Err(e) = sink.send(ausgehend).await {
                        tracing::warn!(connection_id = %connection_id, fehler = %e, "Ereignis-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = ping_takt.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(connection_id = %connection_id, "Verbindungs-Timeout");
                        break;
                    }
                    ping_request_id = ping_request_id.wrapping_add(1);
                    if let Err(e) = sink.send(ControlMessage::ping(ping_request_id, jetzt_ms())).await {
                        tracing::warn!(connection_id = %connection_id, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %connection_id, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = sink.send(abschied).await;
                        break;
                    }
                }
            }
        }
    }
}

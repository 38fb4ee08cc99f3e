//! Message-Dispatcher – Routet ControlMessages an den Lifecycle-Controller
//!
//! Wird erst nach erfolgreicher Authentifizierung aufgerufen; die
//! `connect`-Phase behandelt die `ClientConnection` selbst.
//!
//! Zustandsfehler (Kanal voll, keine Mitgliedschaft, nicht im Kanal) gehen
//! nur an die anfragende Verbindung zurueck. Ein Stopp ohne Start und
//! Audio ausserhalb einer Uebertragung bleiben ohne Antwort.

use sprechfunk_core::types::{ConnectionId, UserId};
use sprechfunk_protocol::control::{
    ControlMessage, ControlPayload, ErrorCode, LeftChannelResponse,
};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Dispatcher-Kontext – die authentifizierte Verbindung
#[derive(Debug, Clone, Copy)]
pub struct DispatcherContext {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende ControlMessage und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine direkte Antwort gesendet wird; die
    /// Ereignisse an den Kanal laufen ueber den Router.
    pub async fn dispatch(
        &self,
        message: ControlMessage,
        ctx: &DispatcherContext,
    ) -> Option<ControlMessage> {
        let request_id = message.request_id;
        let lifecycle = &self.state.lifecycle;

        match message.payload {
            // -------------------------------------------------------------------
            // Kanal
            // -------------------------------------------------------------------
            ControlPayload::JoinChannel(req) => {
                match lifecycle.kanal_beitreten(ctx.connection_id, req.channel_id).await {
                    Ok(zustand) => Some(ControlMessage::new(
                        request_id,
                        ControlPayload::ChannelState(zustand),
                    )),
                    Err(e) => Some(e.als_nachricht(request_id)),
                }
            }

            ControlPayload::LeaveChannel => match lifecycle.kanal_verlassen(ctx.connection_id).await {
                Ok(channel_id) => Some(ControlMessage::new(
                    request_id,
                    ControlPayload::LeftChannel(LeftChannelResponse { channel_id }),
                )),
                Err(e) => Some(e.als_nachricht(request_id)),
            },

            // -------------------------------------------------------------------
            // Sprechen
            // -------------------------------------------------------------------
            ControlPayload::StartSpeaking => match lifecycle.sprechen_starten(ctx.connection_id).await {
                Ok(_) => None,
                Err(e) => Some(e.als_nachricht(request_id)),
            },

            ControlPayload::StopSpeaking => {
                if let Err(e) = lifecycle.sprechen_beenden(ctx.connection_id).await {
                    tracing::debug!(connection_id = %ctx.connection_id, fehler = %e, "stop_speaking ignoriert");
                }
                None
            }

            ControlPayload::AudioData(audio) => {
                lifecycle.audio_weiterleiten(ctx.connection_id, audio).await;
                None
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ControlPayload::Ping(ping) => Some(ControlMessage::pong(
                request_id,
                ping.timestamp_ms,
                jetzt_ms(),
            )),
            ControlPayload::Pong(_) => None,

            // -------------------------------------------------------------------
            // Unerwartete Nachrichten
            // -------------------------------------------------------------------
            ControlPayload::Connect(_) => Some(ControlMessage::error(
                request_id,
                ErrorCode::AlreadyAuthenticated,
                "Bereits authentifiziert",
            )),

            ControlPayload::Connected(_)
            | ControlPayload::ChannelState(_)
            | ControlPayload::UserJoined(_)
            | ControlPayload::UserLeft(_)
            | ControlPayload::LeftChannel(_)
            | ControlPayload::UserSpeaking(_)
            | ControlPayload::Error(_) => {
                tracing::warn!(
                    connection_id = %ctx.connection_id,
                    request_id,
                    "Unerwartete Server->Client Nachricht vom Client empfangen"
                );
                Some(ControlMessage::error(
                    request_id,
                    ErrorCode::InvalidRequest,
                    "Unerwartete Nachricht",
                ))
            }
        }
    }
}

/// Aktuelle Unix-Zeit in Millisekunden
pub(crate) fn jetzt_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

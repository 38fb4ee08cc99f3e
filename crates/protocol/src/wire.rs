//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE)                   | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Das Framing selbst uebernimmt `LengthDelimitedCodec`; dieser Codec legt
//! nur die JSON-Schicht darueber.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::control::ControlMessage;

/// Standard-maximale Frame-Groesse (256 KB – Audio-Frames sind klein)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// tokio-util Codec fuer `ControlMessage`-Frames
///
/// Fuer `tokio_util::codec::Framed` gedacht:
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use sprechfunk_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug)]
pub struct FrameCodec {
    laengen_codec: LengthDelimitedCodec,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        let laengen_codec = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(max_frame_size)
            .new_codec();
        Self {
            laengen_codec,
            max_frame_size,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = ControlMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.laengen_codec.decode(src)? else {
            return Ok(None);
        };

        serde_json::from_slice(&frame).map(Some).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Deserialisierung fehlgeschlagen: {e}"),
            )
        })
    }
}

impl Encoder<ControlMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {e}"),
            )
        })?;

        // LengthDelimitedCodec lehnt zu grosse Frames selbst ab
        self.laengen_codec.encode(Bytes::from(json), dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{AudioDataMessage, ControlPayload};
    use bytes::BufMut;

    fn audio_nachricht(request_id: u32) -> ControlMessage {
        ControlMessage::new(
            request_id,
            ControlPayload::AudioData(AudioDataMessage::vom_client("AAECAw==")),
        )
    }

    #[test]
    fn laengenfeld_ist_big_endian_u32() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(audio_nachricht(42), &mut buf).unwrap();

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), 4 + payload_len);

        let decoded = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(decoded.request_id, 42);
    }

    #[test]
    fn unvollstaendiger_frame_wartet_auf_daten() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(audio_nachricht(1), &mut buf).unwrap();

        let half = buf.len() / 2;
        let mut teil = buf.split_to(half);
        assert!(codec.decode(&mut teil).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn zu_grosse_nachricht_beim_encode() {
        let mut codec = FrameCodec::with_max_size(10);
        let mut buf = BytesMut::new();
        assert!(codec.encode(audio_nachricht(1), &mut buf).is_err());
    }

    #[test]
    fn kaputtes_json_ist_invalid_data() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"{{{");
        let fehler = codec.decode(&mut buf).unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn mehrere_nachrichten_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 1..=3u32 {
            codec.encode(audio_nachricht(i), &mut buf).unwrap();
        }
        for i in 1..=3u32 {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg.request_id, i);
        }
        assert!(buf.is_empty());
    }
}

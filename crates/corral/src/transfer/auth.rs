//! Challenge-response authentication for scheduler connections.
//!
//! Both sides send a request carrying a random challenge, answer the peer's
//! challenge sealed with the shared key, and verify the peer's answer.
//! A successful exchange yields a sealer/opener pair that encrypts all
//! subsequent frames. Without a configured key both sides must agree on
//! plaintext mode.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use bincode::Options;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use orion::aead::streaming::{Nonce, StreamOpener, StreamSealer, StreamTag};
use orion::kdf::SecretKey;
use orion::util::secure_rand_bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::common::error::CorralError;

const CHALLENGE_LENGTH: usize = 16;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct Challenge {
    #[serde(with = "serde_bytes")]
    pub challenge: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum HandshakeMode {
    Plaintext,
    Encrypted(Challenge),
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct HandshakeRequest {
    pub protocol: u32,
    pub role: Cow<'static, str>,
    pub mode: HandshakeMode,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct ChallengeAnswer {
    #[serde(with = "serde_bytes")]
    pub answer: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum HandshakeResponse {
    Plaintext,
    Encrypted(ChallengeAnswer),
    Error(String),
}

pub(crate) struct Authenticator {
    protocol: u32,
    my_role: &'static str,
    peer_role: &'static str,
    secret_key: Option<Arc<SecretKey>>,
    challenge: Vec<u8>,
    sealer: Option<StreamSealer>,
    error: Option<String>,
}

impl Authenticator {
    pub fn new(
        protocol: u32,
        my_role: &'static str,
        peer_role: &'static str,
        secret_key: Option<Arc<SecretKey>>,
    ) -> Self {
        Authenticator {
            protocol,
            my_role,
            peer_role,
            secret_key,
            challenge: Default::default(),
            sealer: None,
            error: None,
        }
    }

    pub fn make_request(&mut self) -> crate::Result<HandshakeRequest> {
        let mode = if self.secret_key.is_some() {
            let mut challenge = vec![0; CHALLENGE_LENGTH];
            secure_rand_bytes(&mut challenge).map_err(|_| "Generating challenge failed")?;
            self.challenge.clone_from(&challenge);
            HandshakeMode::Encrypted(Challenge { challenge })
        } else {
            HandshakeMode::Plaintext
        };
        Ok(HandshakeRequest {
            protocol: self.protocol,
            role: Cow::Borrowed(self.my_role),
            mode,
        })
    }

    fn reject(&mut self, message: String) -> crate::Result<HandshakeResponse> {
        self.error = Some(message.clone());
        Ok(HandshakeResponse::Error(message))
    }

    pub fn make_response(&mut self, request: HandshakeRequest) -> crate::Result<HandshakeResponse> {
        if request.protocol != self.protocol {
            return self.reject(format!(
                "Protocol mismatch, expected {}, got {}",
                self.protocol, request.protocol
            ));
        }
        if request.role != self.peer_role {
            return self.reject(format!(
                "Expected peer role {}, got {}",
                self.peer_role, request.role
            ));
        }

        match (request.mode, &self.secret_key) {
            (HandshakeMode::Plaintext, None) => Ok(HandshakeResponse::Plaintext),
            (HandshakeMode::Encrypted(msg), Some(key)) => {
                if msg.challenge.len() != CHALLENGE_LENGTH {
                    return self.reject(format!(
                        "Invalid challenge length ({})",
                        msg.challenge.len()
                    ));
                }
                let (mut sealer, nonce) =
                    StreamSealer::new(key).map_err(|_| "Creating sealer failed")?;

                let mut answer = Vec::new();
                answer.extend_from_slice(self.my_role.as_bytes());
                answer.extend_from_slice(&msg.challenge);
                let answer = sealer
                    .seal_chunk(&answer, &StreamTag::Message)
                    .map_err(|_| "Cannot seal challenge")?;
                self.sealer = Some(sealer);

                Ok(HandshakeResponse::Encrypted(ChallengeAnswer {
                    answer,
                    nonce: nonce.as_ref().into(),
                }))
            }
            (HandshakeMode::Encrypted(_), None) => {
                self.reject("Peer requests authentication".to_string())
            }
            (HandshakeMode::Plaintext, Some(_)) => {
                self.reject("Peer does not support authentication".to_string())
            }
        }
    }

    pub fn finish(
        mut self,
        response: HandshakeResponse,
    ) -> crate::Result<(Option<StreamSealer>, Option<StreamOpener>)> {
        if let Some(error) = std::mem::take(&mut self.error) {
            return Err(format!("Authentication failed: {error}").into());
        }

        let opener = match (response, &self.secret_key) {
            (HandshakeResponse::Error(message), _) => {
                return Err(format!("Received authentication error: {message}").into());
            }
            (HandshakeResponse::Plaintext, None) => None,
            (HandshakeResponse::Encrypted(answer), Some(key)) => {
                let nonce = Nonce::from_slice(&answer.nonce).map_err(|_| "Invalid nonce")?;
                let mut opener =
                    StreamOpener::new(key, &nonce).map_err(|_| "Failed to create opener")?;
                let (opened, tag) = opener
                    .open_chunk(&answer.answer)
                    .map_err(|_| CorralError::from("Cannot verify challenge"))?;

                let mut expected = Vec::new();
                expected.extend_from_slice(self.peer_role.as_bytes());
                expected.extend_from_slice(&self.challenge);
                if tag != StreamTag::Message || opened != expected {
                    return Err("Received challenge does not match".into());
                }
                Some(opener)
            }
            (_, _) => {
                return Err("Invalid authentication state".into());
            }
        };
        Ok((self.sealer, opener))
    }
}

pub async fn do_authentication<T: AsyncRead + AsyncWrite>(
    protocol: u32,
    my_role: &'static str,
    peer_role: &'static str,
    secret_key: Option<Arc<SecretKey>>,
    writer: &mut SplitSink<Framed<T, LengthDelimitedCodec>, Bytes>,
    reader: &mut SplitStream<Framed<T, LengthDelimitedCodec>>,
) -> crate::Result<(Option<StreamSealer>, Option<StreamOpener>)> {
    let mut authenticator = Authenticator::new(protocol, my_role, peer_role, secret_key);

    let request = authenticator.make_request()?;
    timeout(HANDSHAKE_TIMEOUT, writer.send(serialize(&request)?.into()))
        .await
        .map_err(|_| "Sending authentication request timeouted")?
        .map_err(|_| "Sending authentication request failed")?;

    let peer_request = timeout(HANDSHAKE_TIMEOUT, reader.next())
        .await
        .map_err(|_| "Authentication request did not arrive")?
        .ok_or_else(|| CorralError::from("Connection closed during authentication"))??;
    let peer_request: HandshakeRequest = deserialize(&peer_request)?;

    let response = authenticator.make_response(peer_request)?;
    timeout(HANDSHAKE_TIMEOUT, writer.send(serialize(&response)?.into()))
        .await
        .map_err(|_| "Sending authentication response timeouted")?
        .map_err(|_| "Sending authentication response failed")?;

    let peer_response = timeout(HANDSHAKE_TIMEOUT, reader.next())
        .await
        .map_err(|_| "Authentication response did not arrive")?
        .ok_or_else(|| CorralError::from("Connection closed during authentication"))??;
    let peer_response: HandshakeResponse = deserialize(&peer_response)?;

    authenticator.finish(peer_response)
}

pub fn open_message<T>(opener: &mut Option<StreamOpener>, message_data: &[u8]) -> crate::Result<T>
where
    T: DeserializeOwned,
{
    match opener {
        Some(opener) => {
            let (message, tag) = opener
                .open_chunk(message_data)
                .map_err(|_| CorralError::from("Cannot decrypt message"))?;
            if tag != StreamTag::Message {
                return Err("Unexpected stream tag".into());
            }
            deserialize(&message)
        }
        None => deserialize(message_data),
    }
}

pub fn seal_message(sealer: &mut Option<StreamSealer>, data: Bytes) -> crate::Result<Bytes> {
    match sealer {
        Some(sealer) => Ok(sealer
            .seal_chunk(&data, &StreamTag::Message)
            .map_err(|_| CorralError::from("Cannot encrypt message"))?
            .into()),
        None => Ok(data),
    }
}

pub async fn forward_queue_to_sealed_sink<E, S: futures::Sink<Bytes, Error = E> + Unpin>(
    mut queue: UnboundedReceiver<Bytes>,
    mut sink: S,
    mut sealer: Option<StreamSealer>,
) -> crate::Result<()>
where
    E: std::fmt::Debug,
{
    while let Some(data) = queue.recv().await {
        let frame = seal_message(&mut sealer, data)?;
        if let Err(e) = sink.send(frame).await {
            log::debug!("Forwarding to connection failed: {e:?}");
            return Err("Connection send failed".into());
        }
    }
    Ok(())
}

#[inline]
pub fn serialize<T>(value: &T) -> crate::Result<Vec<u8>>
where
    T: serde::Serialize + ?Sized,
{
    bincode::DefaultOptions::new()
        .with_limit(crate::MAX_FRAME_SIZE as u64)
        .with_fixint_encoding()
        .serialize(value)
        .map_err(|e| format!("Serialization failed: {e:?}").into())
}

#[inline]
pub fn deserialize<'a, T>(bytes: &'a [u8]) -> crate::Result<T>
where
    T: Deserialize<'a>,
{
    bincode::DefaultOptions::new()
        .with_limit(crate::MAX_FRAME_SIZE as u64)
        .with_fixint_encoding()
        .deserialize(bytes)
        .map_err(|e| format!("Deserialization failed: {e:?}").into())
}

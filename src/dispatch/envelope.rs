//! Tagged message envelopes exchanged over the relay transport.
//!
//! On the wire an envelope is a flat JSON object of string values whose
//! `DataType` entry selects the message kind, e.g.
//! `{"DataType":"ChatMessage","UserID":"Ada","Message":"hi"}`.

use std::fmt;

use indexmap::IndexMap;

use crate::{error::CoordinatorError, relay::MemberId};

/// Key holding the message tag.
pub const DATA_TYPE_KEY: &str = "DataType";

const CHAT_USER_KEY: &str = "UserID";
const CHAT_MESSAGE_KEY: &str = "Message";
const READY_PLAYER_KEY: &str = "PlayerName";
const READY_FLAG_KEY: &str = "IsReady";

/// Message tag carried in the `DataType` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Free-form chat line.
    ChatMessage,
    /// A participant toggled its ready flag.
    Ready,
    /// The owner started the match.
    StartGame,
    /// Gameplay state of one player.
    UpdatePlayer,
    /// Tag this build does not know about; dropped by the dispatcher.
    Unknown(String),
}

impl DataType {
    /// Parse a wire tag. `PlayerUpdate` is accepted as an alias of `UpdatePlayer`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "ChatMessage" => Self::ChatMessage,
            "Ready" => Self::Ready,
            "StartGame" => Self::StartGame,
            "UpdatePlayer" | "PlayerUpdate" => Self::UpdatePlayer,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire representation of the tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ChatMessage => "ChatMessage",
            Self::Ready => "Ready",
            Self::StartGame => "StartGame",
            Self::UpdatePlayer => "UpdatePlayer",
            Self::Unknown(tag) => tag.as_str(),
        }
    }

    /// Whether the dispatcher routes this tag.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable tagged payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    data_type: DataType,
    fields: IndexMap<String, String>,
}

impl Envelope {
    /// Build an envelope; a stray `DataType` entry in `fields` is ignored.
    pub fn new<I, K, V>(data_type: DataType, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (Into::<String>::into(key), Into::<String>::into(value)))
            .filter(|(key, _)| key != DATA_TYPE_KEY)
            .collect();
        Self { data_type, fields }
    }

    /// Message tag.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Payload fields, in wire order, without the tag.
    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    /// Look up one payload field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, CoordinatorError> {
        self.field(key).ok_or_else(|| {
            CoordinatorError::MalformedEnvelope(format!(
                "`{}` envelope is missing `{key}`",
                self.data_type
            ))
        })
    }

    fn expect_type(&self, expected: DataType) -> Result<(), CoordinatorError> {
        if self.data_type == expected {
            Ok(())
        } else {
            Err(CoordinatorError::MalformedEnvelope(format!(
                "expected `{expected}` envelope, got `{}`",
                self.data_type
            )))
        }
    }

    /// Serialise to the flat JSON wire form, tag first.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut wire: IndexMap<&str, &str> = IndexMap::with_capacity(self.fields.len() + 1);
        wire.insert(DATA_TYPE_KEY, self.data_type.as_str());
        for (key, value) in &self.fields {
            wire.insert(key.as_str(), value.as_str());
        }
        serde_json::to_vec(&wire)
    }

    /// Parse the flat JSON wire form.
    ///
    /// Fails when the bytes are not a JSON object of string values or carry no
    /// `DataType`. An unrecognised tag still decodes, as [`DataType::Unknown`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CoordinatorError> {
        let mut fields: IndexMap<String, String> = serde_json::from_slice(bytes)
            .map_err(|err| CoordinatorError::MalformedEnvelope(err.to_string()))?;
        let tag = fields.shift_remove(DATA_TYPE_KEY).ok_or_else(|| {
            CoordinatorError::MalformedEnvelope(format!("missing `{DATA_TYPE_KEY}` field"))
        })?;
        Ok(Self {
            data_type: DataType::parse(&tag),
            fields,
        })
    }
}

/// Chat line as carried by a `ChatMessage` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Display name of the author.
    pub user: String,
    /// Message text.
    pub message: String,
}

impl From<ChatMessage> for Envelope {
    fn from(value: ChatMessage) -> Self {
        Envelope::new(
            DataType::ChatMessage,
            [
                (CHAT_USER_KEY, value.user),
                (CHAT_MESSAGE_KEY, value.message),
            ],
        )
    }
}

impl TryFrom<&Envelope> for ChatMessage {
    type Error = CoordinatorError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        envelope.expect_type(DataType::ChatMessage)?;
        Ok(Self {
            user: envelope.require(CHAT_USER_KEY)?.to_string(),
            message: envelope.require(CHAT_MESSAGE_KEY)?.to_string(),
        })
    }
}

/// Ready toggle announced by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyMessage {
    /// Participant whose flag changed.
    pub member: MemberId,
    /// New flag value.
    pub ready: bool,
}

impl From<ReadyMessage> for Envelope {
    fn from(value: ReadyMessage) -> Self {
        // Capitalised booleans match what existing clients emit.
        let ready = if value.ready { "True" } else { "False" };
        Envelope::new(
            DataType::Ready,
            [
                (READY_PLAYER_KEY, value.member.0.to_string()),
                (READY_FLAG_KEY, ready.to_string()),
            ],
        )
    }
}

impl TryFrom<&Envelope> for ReadyMessage {
    type Error = CoordinatorError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        envelope.expect_type(DataType::Ready)?;
        let raw_member = envelope.require(READY_PLAYER_KEY)?;
        let member = raw_member.trim().parse::<u64>().map_err(|_| {
            CoordinatorError::MalformedEnvelope(format!("invalid player id `{raw_member}`"))
        })?;
        let raw_ready = envelope.require(READY_FLAG_KEY)?;
        let ready = match raw_ready.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => {
                return Err(CoordinatorError::MalformedEnvelope(format!(
                    "invalid ready flag `{raw_ready}`"
                )));
            }
        };
        Ok(Self {
            member: MemberId(member),
            ready,
        })
    }
}

/// Owner's announcement that the match begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartGameMessage;

impl From<StartGameMessage> for Envelope {
    fn from(_: StartGameMessage) -> Self {
        Envelope::new(DataType::StartGame, std::iter::empty::<(String, String)>())
    }
}

/// Gameplay state of one player, relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerUpdateMessage {
    /// Game-defined fields, in wire order.
    pub fields: IndexMap<String, String>,
}

impl From<PlayerUpdateMessage> for Envelope {
    fn from(value: PlayerUpdateMessage) -> Self {
        Envelope::new(DataType::UpdatePlayer, value.fields)
    }
}

impl TryFrom<&Envelope> for PlayerUpdateMessage {
    type Error = CoordinatorError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        envelope.expect_type(DataType::UpdatePlayer)?;
        Ok(Self {
            fields: envelope.fields.clone(),
        })
    }
}

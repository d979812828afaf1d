// src/abi/event.rs
//
// Log decoding: indexed parameters live in topic slots, everything else in
// the data payload. An indexed dynamic value is stored on chain as its
// keccak hash, so it can only be surfaced as that hash.

use ethers_core::types::H256;
use serde_json::{json, Value as Json};

use crate::abi::{codec, event_topic, ParamKind, Value};
use crate::rpc::error::GatewayError;

/// An event fragment of a contract interface.
#[derive(Debug, Clone)]
pub struct EventAbi {
    pub name: String,
    pub inputs: Vec<EventParam>,
    pub anonymous: bool,
}

#[derive(Debug, Clone)]
pub struct EventParam {
    pub name: String,
    pub kind: ParamKind,
    pub indexed: bool,
}

impl EventAbi {
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(|p| p.kind.to_string()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// Topic zero for non-anonymous events.
    pub fn topic0(&self) -> H256 {
        event_topic(&self.signature())
    }

    pub fn from_json(entry: &Json) -> Result<Self, GatewayError> {
        let name = entry
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| GatewayError::invalid_argument("ABI event missing 'name'"))?
            .to_string();
        let inputs = entry
            .get("inputs")
            .and_then(Json::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let ty = item.get("type").and_then(Json::as_str).ok_or_else(|| {
                            GatewayError::invalid_argument("ABI event parameter missing 'type'")
                        })?;
                        Ok(EventParam {
                            name: item
                                .get("name")
                                .and_then(Json::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            kind: ParamKind::parse(ty)?,
                            indexed: item
                                .get("indexed")
                                .and_then(Json::as_bool)
                                .unwrap_or(false),
                        })
                    })
                    .collect::<Result<Vec<_>, GatewayError>>()
            })
            .transpose()?
            .unwrap_or_default();
        let anonymous = entry.get("anonymous").and_then(Json::as_bool).unwrap_or(false);
        Ok(Self { name, inputs, anonymous })
    }

    /// Locate an event by name in a JSON ABI array.
    pub fn find_in_abi(abi: &Json, name: &str) -> Result<Self, GatewayError> {
        let entries = abi
            .as_array()
            .ok_or_else(|| GatewayError::invalid_argument("ABI must be a JSON array"))?;
        entries
            .iter()
            .find(|e| {
                e.get("type").and_then(Json::as_str) == Some("event")
                    && e.get("name").and_then(Json::as_str) == Some(name)
            })
            .map(Self::from_json)
            .transpose()?
            .ok_or_else(|| {
                GatewayError::invalid_argument(format!("event '{name}' not found in ABI"))
            })
    }
}

/// One decoded event parameter. `hashed` marks the lossy case: an indexed
/// dynamic value whose topic slot holds only the keccak hash of the
/// original data.
#[derive(Debug, Clone)]
pub struct DecodedEventParam {
    pub name: String,
    pub value: Value,
    pub indexed: bool,
    pub hashed: bool,
}

#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub name: String,
    pub params: Vec<DecodedEventParam>,
}

impl DecodedEvent {
    pub fn to_json(&self) -> Json {
        json!({
            "event": self.name,
            "params": self.params.iter().map(|p| {
                json!({
                    "name": p.name,
                    "value": p.value.to_json(),
                    "indexed": p.indexed,
                    "hashed": p.hashed,
                })
            }).collect::<Vec<_>>(),
        })
    }
}

/// Decode one log against an event fragment.
pub fn decode_log(
    event: &EventAbi,
    topics: &[H256],
    data: &[u8],
) -> Result<DecodedEvent, GatewayError> {
    let mut topic_iter = topics.iter();
    if !event.anonymous {
        let topic0 = topic_iter.next().ok_or_else(|| {
            GatewayError::decode(0, "log has no topics but the event is not anonymous")
        })?;
        if *topic0 != event.topic0() {
            return Err(GatewayError::decode(
                0,
                format!("topic0 does not match event signature {}", event.signature()),
            ));
        }
    }

    // Decode the non-indexed payload as one frame, in declaration order.
    let data_kinds: Vec<ParamKind> = event
        .inputs
        .iter()
        .filter(|p| !p.indexed)
        .map(|p| p.kind.clone())
        .collect();
    let mut data_values = codec::decode_values(&data_kinds, data)?.into_iter();

    let mut params = Vec::with_capacity(event.inputs.len());
    for input in &event.inputs {
        if input.indexed {
            let topic = topic_iter.next().ok_or_else(|| {
                GatewayError::decode(
                    0,
                    format!("log is missing a topic for indexed parameter '{}'", input.name),
                )
            })?;
            if input.kind.is_dynamic() {
                // Only the hash of the original value is recoverable.
                params.push(DecodedEventParam {
                    name: input.name.clone(),
                    value: Value::FixedBytes(topic.as_bytes().to_vec()),
                    indexed: true,
                    hashed: true,
                });
            } else {
                let values = codec::decode_values(
                    std::slice::from_ref(&input.kind),
                    topic.as_bytes(),
                )?;
                params.push(DecodedEventParam {
                    name: input.name.clone(),
                    value: values.into_iter().next().expect("one kind yields one value"),
                    indexed: true,
                    hashed: false,
                });
            }
        } else {
            let value = data_values.next().ok_or_else(|| {
                GatewayError::decode(0, format!("missing data value for '{}'", input.name))
            })?;
            params.push(DecodedEventParam {
                name: input.name.clone(),
                value,
                indexed: false,
                hashed: false,
            });
        }
    }

    Ok(DecodedEvent { name: event.name.clone(), params })
}

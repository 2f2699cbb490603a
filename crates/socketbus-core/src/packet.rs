//! Packet implementation.
//! The [`Packet`] is the unit of data exchanged between peers over a transport connection.
use serde::{Deserialize, Serialize};

use crate::{Str, Value};

/// A packet is made of its typed payload and the namespace it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// The packet data
    pub inner: PacketData,
    /// The namespace the packet belongs to
    pub ns: Str,
}

impl Packet {
    /// Create a connect packet for the given namespace
    pub fn connect(ns: impl Into<Str>) -> Self {
        Self {
            inner: PacketData::Connect,
            ns: ns.into(),
        }
    }

    /// Create a disconnect packet for the given namespace
    pub fn disconnect(ns: impl Into<Str>) -> Self {
        Self {
            inner: PacketData::Disconnect,
            ns: ns.into(),
        }
    }

    /// Create an event packet for the given namespace.
    /// The first element of `data` is the event name.
    pub fn event(ns: impl Into<Str>, event: impl Into<String>, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(event.into()));
        data.extend(args);
        Self {
            inner: PacketData::Event(data, None),
            ns: ns.into(),
        }
    }

    /// Create an ack packet for the given namespace.
    pub fn ack(ns: impl Into<Str>, data: Vec<Value>, ack: i64) -> Self {
        Self {
            inner: PacketData::EventAck(data, ack),
            ns: ns.into(),
        }
    }

    /// Create an error packet for the given namespace.
    pub fn error(ns: impl Into<Str>, data: Value) -> Self {
        Self {
            inner: PacketData::Error(data),
            ns: ns.into(),
        }
    }
}

/// | Type          | ID  | Usage                                                          |
/// |---------------|-----|----------------------------------------------------------------|
/// | CONNECT       | 0   | Asks for / confirms a connection to a namespace.               |
/// | DISCONNECT    | 1   | Leaves a namespace.                                            |
/// | EVENT         | 2   | Sends an event, the first data element being its name.         |
/// | ACK           | 3   | Acknowledges an event that carried an ack id.                  |
/// | ERROR         | 4   | Reports an error, for example a rejected namespace connection. |
/// | BINARY_EVENT  | 5   | Same as EVENT, flagged as carrying binary data.                |
#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Connect packet
    Connect,
    /// Disconnect packet, used to disconnect from a namespace
    Disconnect,
    /// Event packet with optional ack id, to request an ack from the other side
    Event(Vec<Value>, Option<i64>),
    /// Event ack packet, to acknowledge an event
    EventAck(Vec<Value>, i64),
    /// Error packet
    Error(Value),
    /// Binary event packet with optional ack id, to request an ack from the other side
    BinaryEvent(Vec<Value>, Option<i64>),
}

impl PacketData {
    /// Returns the index of the packet type
    pub fn index(&self) -> u8 {
        match self {
            PacketData::Connect => 0,
            PacketData::Disconnect => 1,
            PacketData::Event(_, _) => 2,
            PacketData::EventAck(_, _) => 3,
            PacketData::Error(_) => 4,
            PacketData::BinaryEvent(_, _) => 5,
        }
    }

    /// Set the ack id for the packet
    /// It will only set the ack id for the packets that support it
    pub fn set_ack_id(&mut self, ack_id: i64) {
        match self {
            PacketData::Event(_, ack) | PacketData::BinaryEvent(_, ack) => *ack = Some(ack_id),
            PacketData::EventAck(_, ack) => *ack = ack_id,
            _ => {}
        };
    }

    /// Returns the ack id carried by the packet if any
    pub fn ack_id(&self) -> Option<i64> {
        match self {
            PacketData::Event(_, ack) | PacketData::BinaryEvent(_, ack) => *ack,
            PacketData::EventAck(_, ack) => Some(*ack),
            _ => None,
        }
    }

    /// Returns the event name of an event packet
    pub fn event_name(&self) -> Option<&str> {
        match self {
            PacketData::Event(data, _) | PacketData::BinaryEvent(data, _) => {
                data.first().and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

impl Serialize for Packet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct RawPacket<'a> {
            r#type: u8,
            nsp: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            data: Option<RawData<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<i64>,
        }
        #[derive(Serialize)]
        #[serde(untagged)]
        enum RawData<'a> {
            Seq(&'a [Value]),
            Value(&'a Value),
        }

        let data = match &self.inner {
            PacketData::Connect | PacketData::Disconnect => None,
            PacketData::Event(v, _) | PacketData::BinaryEvent(v, _) | PacketData::EventAck(v, _) => {
                Some(RawData::Seq(v))
            }
            PacketData::Error(v) => Some(RawData::Value(v)),
        };
        let raw = RawPacket {
            r#type: self.inner.index(),
            nsp: &self.ns,
            data,
            id: self.inner.ack_id(),
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawPacket {
            r#type: u8,
            nsp: Option<String>,
            data: Option<Value>,
            id: Option<i64>,
        }
        let raw = RawPacket::deserialize(deserializer)?;
        let seq = |data: Option<Value>| -> Result<Vec<Value>, D::Error> {
            match data {
                Some(Value::Array(v)) => Ok(v),
                None => Ok(Vec::new()),
                Some(_) => Err(serde::de::Error::custom("packet data must be an array")),
            }
        };
        let inner = match raw.r#type {
            0 => PacketData::Connect,
            1 => PacketData::Disconnect,
            2 => PacketData::Event(seq(raw.data)?, raw.id),
            3 => PacketData::EventAck(
                seq(raw.data)?,
                raw.id
                    .ok_or_else(|| serde::de::Error::custom("missing field: id"))?,
            ),
            4 => PacketData::Error(raw.data.unwrap_or(Value::Null)),
            5 => PacketData::BinaryEvent(seq(raw.data)?, raw.id),
            i => return Err(serde::de::Error::custom(format!("invalid packet type {i}"))),
        };
        let ns = raw.nsp.map(Str::Owned).unwrap_or(Str::Borrowed(crate::DEFAULT_NS));
        Ok(Self { inner, ns })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Packet, PacketData};

    #[test]
    fn event_packet_starts_with_name() {
        let packet = Packet::event("/chat", "message", vec![json!(1), json!("two")]);
        assert_eq!(packet.ns, "/chat");
        assert_eq!(packet.inner.event_name(), Some("message"));
        assert_eq!(
            packet.inner,
            PacketData::Event(vec![json!("message"), json!(1), json!("two")], None)
        );
    }

    #[test]
    fn set_ack_id() {
        let mut packet = Packet::event("/", "ev", vec![]);
        packet.inner.set_ack_id(7);
        assert_eq!(packet.inner.ack_id(), Some(7));

        let mut packet = Packet::connect("/");
        packet.inner.set_ack_id(7);
        assert_eq!(packet.inner.ack_id(), None);
    }

    #[test]
    fn serialize_wire_fields() {
        let mut packet = Packet::event("/", "ping", vec![json!({ "active": 1 })]);
        packet.inner.set_ack_id(3);
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            value,
            json!({ "type": 2, "nsp": "/", "data": ["ping", { "active": 1 }], "id": 3 })
        );

        let value = serde_json::to_value(Packet::connect("/admin")).unwrap();
        assert_eq!(value, json!({ "type": 0, "nsp": "/admin" }));

        let value = serde_json::to_value(Packet::error("/", json!("unauthorized"))).unwrap();
        assert_eq!(value, json!({ "type": 4, "nsp": "/", "data": "unauthorized" }));
    }

    #[test]
    fn deserialize_wire_fields() {
        let packet: Packet =
            serde_json::from_value(json!({ "type": 3, "nsp": "/", "data": [42], "id": 7 }))
                .unwrap();
        assert_eq!(packet.inner, PacketData::EventAck(vec![json!(42)], 7));

        let packet: Packet = serde_json::from_value(json!({ "type": 1 })).unwrap();
        assert_eq!(packet, Packet::disconnect("/"));

        let packet: Packet =
            serde_json::from_value(json!({ "type": 5, "nsp": "/bin", "data": ["file"] }))
                .unwrap();
        assert_eq!(
            packet.inner,
            PacketData::BinaryEvent(vec![json!("file")], None)
        );
    }

    #[test]
    fn deserialize_invalid() {
        let res = serde_json::from_value::<Packet>(json!({ "type": 9, "nsp": "/" }));
        assert!(res.is_err());
        let res = serde_json::from_value::<Packet>(json!({ "type": 3, "nsp": "/", "data": [] }));
        assert!(res.is_err());
        let res =
            serde_json::from_value::<Packet>(json!({ "type": 2, "nsp": "/", "data": "nope" }));
        assert!(res.is_err());
    }
}

//! Typed enumerations shared across the graph model and merge engine.
//!
//! All wire forms use SCREAMING_SNAKE_CASE (the submitter contract). Unknown
//! values are a hard parse error — payload decoding must never silently
//! default an enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

// ---------------------------------------------------------------------------
// Node type
// ---------------------------------------------------------------------------

/// Structural role of a node in the application graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Endpoint,
    Topic,
    Service,
    Class,
    Method,
    PrivateMethod,
    Interface,
    Field,
    Constructor,
}

impl NodeType {
    /// Wire name, e.g. `PRIVATE_METHOD`.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Endpoint => "ENDPOINT",
            NodeType::Topic => "TOPIC",
            NodeType::Service => "SERVICE",
            NodeType::Class => "CLASS",
            NodeType::Method => "METHOD",
            NodeType::PrivateMethod => "PRIVATE_METHOD",
            NodeType::Interface => "INTERFACE",
            NodeType::Field => "FIELD",
            NodeType::Constructor => "CONSTRUCTOR",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENDPOINT" => Ok(NodeType::Endpoint),
            "TOPIC" => Ok(NodeType::Topic),
            "SERVICE" => Ok(NodeType::Service),
            "CLASS" => Ok(NodeType::Class),
            "METHOD" => Ok(NodeType::Method),
            "PRIVATE_METHOD" => Ok(NodeType::PrivateMethod),
            "INTERFACE" => Ok(NodeType::Interface),
            "FIELD" => Ok(NodeType::Field),
            "CONSTRUCTOR" => Ok(NodeType::Constructor),
            other => Err(EngineError::InvalidEnum {
                field: "node type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Source-level visibility of a node. Drives the zoom-level policy for
/// method-like nodes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
    PackagePrivate,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Private => "PRIVATE",
            Visibility::Protected => "PROTECTED",
            Visibility::PackagePrivate => "PACKAGE_PRIVATE",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Visibility::Public),
            "PRIVATE" => Ok(Visibility::Private),
            "PROTECTED" => Ok(Visibility::Protected),
            "PACKAGE_PRIVATE" => Ok(Visibility::PackagePrivate),
            other => Err(EngineError::InvalidEnum {
                field: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge type
// ---------------------------------------------------------------------------

/// Relationship carried by an edge. `RuntimeCall` and `FlowsTo` are only
/// produced by the merge engine, never by static submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Call,
    Handles,
    Produces,
    Consumes,
    BelongsTo,
    Defines,
    RuntimeCall,
    DependsOn,
    FlowsTo,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Call => "CALL",
            EdgeType::Handles => "HANDLES",
            EdgeType::Produces => "PRODUCES",
            EdgeType::Consumes => "CONSUMES",
            EdgeType::BelongsTo => "BELONGS_TO",
            EdgeType::Defines => "DEFINES",
            EdgeType::RuntimeCall => "RUNTIME_CALL",
            EdgeType::DependsOn => "DEPENDS_ON",
            EdgeType::FlowsTo => "FLOWS_TO",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALL" => Ok(EdgeType::Call),
            "HANDLES" => Ok(EdgeType::Handles),
            "PRODUCES" => Ok(EdgeType::Produces),
            "CONSUMES" => Ok(EdgeType::Consumes),
            "BELONGS_TO" => Ok(EdgeType::BelongsTo),
            "DEFINES" => Ok(EdgeType::Defines),
            "RUNTIME_CALL" => Ok(EdgeType::RuntimeCall),
            "DEPENDS_ON" => Ok(EdgeType::DependsOn),
            "FLOWS_TO" => Ok(EdgeType::FlowsTo),
            other => Err(EngineError::InvalidEnum {
                field: "edge type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Event type
// ---------------------------------------------------------------------------

/// Runtime event kinds emitted by the in-process agent.
///
/// The agent historically emitted `START`/`END` and `ASYNC_SEND`/
/// `ASYNC_RECEIVE`; those are accepted as synonyms when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    MethodEnter,
    MethodExit,
    ProduceTopic,
    ConsumeTopic,
    Checkpoint,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MethodEnter => "METHOD_ENTER",
            EventType::MethodExit => "METHOD_EXIT",
            EventType::ProduceTopic => "PRODUCE_TOPIC",
            EventType::ConsumeTopic => "CONSUME_TOPIC",
            EventType::Checkpoint => "CHECKPOINT",
            EventType::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "METHOD_ENTER" | "START" => Ok(EventType::MethodEnter),
            "METHOD_EXIT" | "END" => Ok(EventType::MethodExit),
            "PRODUCE_TOPIC" | "ASYNC_SEND" => Ok(EventType::ProduceTopic),
            "CONSUME_TOPIC" | "ASYNC_RECEIVE" => Ok(EventType::ConsumeTopic),
            "CHECKPOINT" => Ok(EventType::Checkpoint),
            "ERROR" => Ok(EventType::Error),
            other => Err(EngineError::InvalidEnum {
                field: "event type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Zoom level
// ---------------------------------------------------------------------------

/// Visualization coarseness of a node: 1 is the business overview, 5 is
/// runtime-discovered detail. Assigned once by the zoom policy and preserved
/// across merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoomLevel {
    Business,
    Service,
    Public,
    Private,
    Runtime,
}

impl ZoomLevel {
    /// Numeric level in `1..=5`.
    pub fn level(&self) -> u8 {
        match self {
            ZoomLevel::Business => 1,
            ZoomLevel::Service => 2,
            ZoomLevel::Public => 3,
            ZoomLevel::Private => 4,
            ZoomLevel::Runtime => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(ZoomLevel::Business),
            2 => Some(ZoomLevel::Service),
            3 => Some(ZoomLevel::Public),
            4 => Some(ZoomLevel::Private),
            5 => Some(ZoomLevel::Runtime),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_wire_name() {
        for ty in [
            NodeType::Endpoint,
            NodeType::Topic,
            NodeType::Service,
            NodeType::Class,
            NodeType::Method,
            NodeType::PrivateMethod,
            NodeType::Interface,
            NodeType::Field,
            NodeType::Constructor,
        ] {
            assert_eq!(ty.as_str().parse::<NodeType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let err = "LAMBDA".parse::<NodeType>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidEnum { .. }));
        assert!("INTERNAL".parse::<Visibility>().is_err());
        assert!("POINTS_AT".parse::<EdgeType>().is_err());
        assert!("HEARTBEAT".parse::<EventType>().is_err());
    }

    #[test]
    fn event_type_accepts_legacy_synonyms() {
        assert_eq!("START".parse::<EventType>().unwrap(), EventType::MethodEnter);
        assert_eq!("END".parse::<EventType>().unwrap(), EventType::MethodExit);
        assert_eq!(
            "ASYNC_SEND".parse::<EventType>().unwrap(),
            EventType::ProduceTopic
        );
        assert_eq!(
            "ASYNC_RECEIVE".parse::<EventType>().unwrap(),
            EventType::ConsumeTopic
        );
    }

    #[test]
    fn zoom_levels_cover_one_through_five() {
        for level in 1..=5u8 {
            assert_eq!(ZoomLevel::from_level(level).unwrap().level(), level);
        }
        assert!(ZoomLevel::from_level(0).is_none());
        assert!(ZoomLevel::from_level(6).is_none());
    }
}

//! Data items carried along edges
//!
//! A [`Datum`] is either a type-erased payload or one of the control markers.
//! The engine never looks inside payloads; connected processes agree on the
//! concrete type through the port type tags checked at connection time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::stamp::Stamp;

/// Shared, type-erased payload
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Discriminant of a [`Datum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumKind {
    Value,
    Empty,
    Complete,
    Flush,
    Error,
}

/// One unit of data, or a control marker, sent between two ports
#[derive(Clone)]
pub enum Datum {
    /// Payload data
    Value(Payload),
    /// No data this step; keeps branches in lock-step
    Empty,
    /// End of stream
    Complete,
    /// Request to flush buffered state downstream
    Flush,
    /// Soft error reported by the producer
    Error(String),
}

impl Datum {
    /// Wrap a value as a payload datum
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    pub fn from_payload(payload: Payload) -> Self {
        Self::Value(payload)
    }

    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn complete() -> Self {
        Self::Complete
    }

    pub fn flush() -> Self {
        Self::Flush
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn kind(&self) -> DatumKind {
        match self {
            Self::Value(_) => DatumKind::Value,
            Self::Empty => DatumKind::Empty,
            Self::Complete => DatumKind::Complete,
            Self::Flush => DatumKind::Flush,
            Self::Error(_) => DatumKind::Error,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Borrow the payload as `T`, if this is a value of that type
    pub fn get<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Value(payload) => payload.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Value(payload) => Some(payload),
            _ => None,
        }
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Empty => f.write_str("Empty"),
            Self::Complete => f.write_str("Complete"),
            Self::Flush => f.write_str("Flush"),
            Self::Error(message) => f.debug_tuple("Error").field(message).finish(),
        }
    }
}

/// A datum paired with its stamp, as stored on an edge
#[derive(Debug, Clone)]
pub struct EdgeDatum {
    pub datum: Datum,
    pub stamp: Stamp,
}

impl EdgeDatum {
    pub fn new(datum: Datum, stamp: Stamp) -> Self {
        Self { datum, stamp }
    }
}

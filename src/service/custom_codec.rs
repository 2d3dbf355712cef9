use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Domain object carried by a field that uses a custom codec.
///
/// Implementations are opaque to the codec; `as_any` lets callers
/// downcast back to the concrete type.
pub trait CustomValue: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Per-field hook converting between a domain representation and the
/// on-wire text.
///
/// Decoding is best-effort enrichment, not validation: a `None` from
/// [`decode`](CustomFieldCodec::decode) makes the parser keep the raw
/// text instead of failing.
pub trait CustomFieldCodec: fmt::Debug + Send + Sync {
    /// Convert a domain value back to its wire text. Padding and length
    /// prefixing stay the field kind's job.
    fn encode(&self, value: &dyn CustomValue) -> String;

    /// Convert wire text into the domain value, or decline.
    fn decode(&self, raw: &str) -> Option<Arc<dyn CustomValue>>;
}

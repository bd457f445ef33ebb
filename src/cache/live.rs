//! Live versus historical source selection.
//!
//! The choice is a view over server state and is re-evaluated on every read;
//! the computing frame moves continuously while the server steps.

use crate::domain::types::Activation;

use super::store::BodyCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The plug's live cache for the frame being computed.
    Live,
    /// The operation's historical cache for a previously computed frame.
    Historical,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Live => "live",
            SourceKind::Historical => "historical",
        }
    }
}

/// Pick the source for a read. Inactive operations never read live data.
pub fn resolve_source(is_live: bool, activation: Activation) -> SourceKind {
    if is_live && activation != Activation::Inactive {
        SourceKind::Live
    } else {
        SourceKind::Historical
    }
}

/// Read-only borrow of the cache a read resolved to.
#[derive(Debug, Clone, Copy)]
pub enum BodySource<'a> {
    Live(&'a BodyCache),
    Historical(&'a BodyCache),
}

impl<'a> BodySource<'a> {
    pub fn kind(&self) -> SourceKind {
        match self {
            BodySource::Live(_) => SourceKind::Live,
            BodySource::Historical(_) => SourceKind::Historical,
        }
    }

    pub fn cache(&self) -> &'a BodyCache {
        match self {
            BodySource::Live(cache) | BodySource::Historical(cache) => cache,
        }
    }

    pub fn is_live(&self) -> bool {
        self.kind() == SourceKind::Live
    }
}

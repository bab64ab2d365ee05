//! Shared helpers with no domain meaning.

pub(crate) mod lock;

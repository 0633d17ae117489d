//! POF encoding and decoding: the positional [`PofWriter`] and
//! [`PofReader`], plus one-shot [`serialize`] and [`deserialize`].

mod handler;
mod property;
mod reader;
mod writer;

pub use reader::PofReader;
pub use writer::PofWriter;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::PofConfig;
use crate::context::TypeContext;
use crate::error::PofError;
use crate::types::PofValue;

/// Encodes `value` as a complete POF stream.
pub fn serialize(
    ctx: Arc<dyn TypeContext>,
    config: PofConfig,
    value: &PofValue,
) -> Result<Bytes, PofError> {
    let mut writer = PofWriter::new(ctx, config);
    writer.write_object(-1, value)?;
    writer.into_bytes()
}

/// Decodes the single value at the start of `bytes`.
pub fn deserialize(
    ctx: Arc<dyn TypeContext>,
    config: PofConfig,
    bytes: impl Into<Bytes>,
) -> Result<PofValue, PofError> {
    PofReader::new(ctx, config, bytes).read_object(-1)
}

/// State owned by a root reader or writer and borrowed by its nested ones.
pub(crate) enum StateRef<'a, S> {
    Owned(Box<S>),
    Borrowed(&'a mut S),
}

impl<S> Deref for StateRef<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        match self {
            Self::Owned(s) => s,
            Self::Borrowed(s) => s,
        }
    }
}

impl<S> DerefMut for StateRef<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        match self {
            Self::Owned(s) => s,
            Self::Borrowed(s) => s,
        }
    }
}

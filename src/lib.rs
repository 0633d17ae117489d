//! pofr: a pure-Rust Portable Object Format (POF) codec.
//!
//! POF is a compact, self-describing binary format. Every value starts with
//! a packed-integer type tag; user types are sparse streams of indexed
//! properties, which lets old and new versions of a type read each other's
//! data.
//!
//! # Architecture
//!
//! - **`wire`**: packed integers, type tags, UTF-8 strings, skipping
//! - **`buffer`**: positioned input over `bytes::Bytes`
//! - **`types`**: the `PofValue` model, decimals, temporal values
//! - **`codec`**: the positional `PofWriter` and `PofReader`
//! - **`context`**: user-type registration (`TypeContext`, `PofSerializer`)
//! - **`identity`**: object identity and reference tracking
//!
//! ```
//! use std::sync::Arc;
//! use pofr::{PofConfig, PofValue, SimplePofContext, TypeContext};
//!
//! let ctx: Arc<dyn TypeContext> = Arc::new(SimplePofContext::builder().build()?);
//! let value = PofValue::Collection(vec![PofValue::from("a"), PofValue::from(7)]);
//! let bytes = pofr::serialize(ctx.clone(), PofConfig::default(), &value)?;
//! assert_eq!(pofr::deserialize(ctx, PofConfig::default(), bytes)?, value);
//! # Ok::<(), pofr::PofError>(())
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod types;
pub mod wire;

pub use codec::{PofReader, PofWriter, deserialize, serialize};
pub use config::PofConfig;
pub use context::{
    Evolvable, EvolvableObjectSerializer, EvolvablePortableObject, PofSerializer, PortableObject,
    PortableObjectSerializer, SimplePofContext, SimplePofContextBuilder, TypeContext,
};
pub use error::PofError;
pub use types::{
    DayTimeInterval, Decimal, PofObject, PofValue, RawDate, RawDateTime, RawQuad, RawTime,
    SparseArray, TimeInterval, TimeZone, YearMonthInterval,
};

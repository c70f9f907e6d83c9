//! # znp-link
//!
//! Host-side command engine for Zigbee network coprocessors that speak a
//! framed, checksum-protected binary protocol over a serial byte link.
//!
//! The crate turns the raw byte stream into a typed request/response
//! interface:
//!
//! - **Framing** (`framing`): delimiter-stuffed and length-prefixed frame
//!   codecs behind one trait, with incremental decoding and stream
//!   resynchronization after corrupt units.
//! - **Schema** (`schema`): a static catalog mapping command names and wire
//!   identifiers to ordered, typed parameter lists.
//! - **Payload codec** (`payload`): reads and writes the closed set of
//!   parameter types, including the variable-length lists whose element
//!   count lives in a sibling field.
//! - **Objects** (`object`): [`ZnpObject`], the decoded/encoded unit of
//!   work tying a frame to its schema entry.
//! - **Correlation** (`waitress`): pending waiters matched against every
//!   inbound object, with per-waiter deadlines and cancellation.
//! - **Execution** (`driver`): a single-flight queue serializing
//!   synchronous exchanges over the shared link, with reset handling and
//!   an event stream for unsolicited indications.
//! - **Delivery** (`delivery`): the bounded recovery ladder wrapped around
//!   application data requests.
//!
//! ## Example
//!
//! ```ignore
//! use znp_link::{CodecKind, Driver, Payload, Subsystem};
//!
//! #[tokio::main]
//! async fn main() -> znp_link::Result<()> {
//!     let (reader, writer) = open_serial_port()?; // transport is caller-supplied
//!     let driver = Driver::new(reader, writer, CodecKind::LengthPrefixed);
//!
//!     let version = driver
//!         .request_expect_reply(Subsystem::Sys, "version", Payload::new())
//!         .await?;
//!     println!("firmware revision: {}", version.payload.u32("revision")?);
//!     Ok(())
//! }
//! ```

pub mod delivery;
pub mod driver;
pub mod error;
pub mod framing;
pub mod object;
pub mod payload;
pub mod schema;
pub mod status;
pub mod waitress;

pub use delivery::{Delivery, DeliveryOptions, Destination};
pub use driver::{Driver, RequestOptions};
pub use error::{Result, ZnpError};
pub use framing::{CodecKind, DecodeEvent, Direction, Frame, FrameCodec, FrameError};
pub use object::ZnpObject;
pub use payload::{NetworkDescriptor, Payload, RouteStatus, RoutingEntry, Value};
pub use schema::{CommandDescriptor, CommandKind, Parameter, ParameterType, Subsystem};
pub use status::{FailureKind, ZnpStatus};
pub use waitress::{Matcher, Waiter, Waitress};

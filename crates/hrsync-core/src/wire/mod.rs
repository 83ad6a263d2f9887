//! Wire codec for the remote system's XML-RPC value grammar
//!
//! Lossless two-way conversion between [`Value`] and the protocol's nested
//! textual markup. The remote protocol has no true null, so JSON `null`
//! entering through [`Value::from_json`] becomes boolean-false; that is
//! the one documented lossy case.

mod decode;
mod encode;
mod value;

pub use decode::decode_response;
pub use encode::{encode_call, encode_value};
pub use value::Value;

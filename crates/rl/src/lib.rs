//! RL codec (C8): two dialects sharing one `Codec` contract that turns a
//! `WorldModel` into labelled tensors and an agent's tensors back into
//! commands.
//!
//! `dl` is the discrete multi-tensor dialect (separate `move`/
//! `sensorAction` signals); `scalar` is the single-axis dialect with a
//! folded-in halt token.

pub mod codec;
pub mod dl;
pub mod scalar;
pub mod spaces;
pub mod tensor;

pub use codec::{can_move_state, Codec, CodecMismatch, DecodedCommand};
pub use dl::{DlCodec, DlCodecConfig};
pub use scalar::RlCodec;
pub use spaces::SignalSpec;
pub use tensor::{Dtype, Tensor};

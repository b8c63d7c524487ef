pub mod bits;
mod buffer;
mod cb_search;
pub mod consts;
pub mod ctl;
pub mod dec;
pub mod enc;
mod errors;
mod filters;
mod lpc;
pub mod lsp;
pub mod ltp;
pub mod modes;
mod quant_lsp;
pub mod submodes;
pub mod vbr;

pub use bits::{BitReader, BitWriter};
pub use buffer::FrameBuffer;
pub use ctl::{ControlArg, Request, Response};
pub use dec::{DecodeStatus, Decoder, NbDecoder, CODEC_TYPE_SPEEX};
pub use enc::NbEncoder;
pub use errors::{Error, Result};
pub use modes::{FrameLayout, NbMode, NbModeParams};
pub use submodes::{CelpSubmode, Submode, SubmodeParams};

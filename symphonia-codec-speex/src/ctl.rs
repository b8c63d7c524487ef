//! Typed control surface shared by the encoder and the decoder.

use num_traits::FromPrimitive;

use crate::consts::CtlCode;
use crate::errors::{Error, Result};

/// Untyped argument of an integer-coded request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlArg {
    None,
    Int(i32),
    Float(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Request {
    SetEnhancer(bool),
    GetEnhancer,
    GetFrameSize,
    /// Quality level in 0..=10, mapped to a submode.
    SetQuality(i32),
    SetMode(i32),
    GetMode,
    SetLowMode(i32),
    GetLowMode,
    SetHighMode(i32),
    GetHighMode,
    SetVbr(bool),
    GetVbr,
    SetVbrQuality(f32),
    GetVbrQuality,
    SetComplexity(i32),
    GetComplexity,
    /// Highest bit-rate not above the requested one is chosen.
    SetBitrate(i32),
    GetBitrate,
    SetSamplingRate(i32),
    GetSamplingRate,
    ResetState,
    GetRelativeQuality,
    SetDtx(bool),
    GetDtx,
    GetLookahead,
    GetPitchRange,
    GetLastPitch,
    GetLastPitchGain,
    GetLostCount,
    GetPiGain,
    GetExc,
    GetInnov,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Done,
    Bool(bool),
    Int(i32),
    Float(f32),
    Range(i32, i32),
    Samples(Vec<f32>),
}

fn int_arg(arg: ControlArg) -> Result<i32> {
    match arg {
        ControlArg::Int(v) => Ok(v),
        _ => Err(Error::InvalidArgument("integer argument expected")),
    }
}

fn bool_arg(arg: ControlArg) -> Result<bool> {
    match arg {
        ControlArg::Int(0) => Ok(false),
        ControlArg::Int(1) => Ok(true),
        _ => Err(Error::InvalidArgument("0 or 1 expected")),
    }
}

fn float_arg(arg: ControlArg) -> Result<f32> {
    match arg {
        ControlArg::Float(v) => Ok(v),
        ControlArg::Int(v) => Ok(v as f32),
        ControlArg::None => Err(Error::InvalidArgument("numeric argument expected")),
    }
}

impl Request {
    /// Decode an integer command code and its argument.
    pub fn from_code(code: i32, arg: ControlArg) -> Result<Self> {
        let Some(code) = CtlCode::from_i32(code) else {
            return Err(Error::UnsupportedControl("unknown command code"));
        };
        Ok(match code {
            CtlCode::SetEnh => Request::SetEnhancer(bool_arg(arg)?),
            CtlCode::GetEnh => Request::GetEnhancer,
            CtlCode::GetFrameSize => Request::GetFrameSize,
            CtlCode::SetQuality => Request::SetQuality(int_arg(arg)?),
            CtlCode::SetMode => Request::SetMode(int_arg(arg)?),
            CtlCode::GetMode => Request::GetMode,
            CtlCode::SetLowMode => Request::SetLowMode(int_arg(arg)?),
            CtlCode::GetLowMode => Request::GetLowMode,
            CtlCode::SetHighMode => Request::SetHighMode(int_arg(arg)?),
            CtlCode::GetHighMode => Request::GetHighMode,
            CtlCode::SetVbr => Request::SetVbr(bool_arg(arg)?),
            CtlCode::GetVbr => Request::GetVbr,
            CtlCode::SetVbrQuality => Request::SetVbrQuality(float_arg(arg)?),
            CtlCode::GetVbrQuality => Request::GetVbrQuality,
            CtlCode::SetComplexity => Request::SetComplexity(int_arg(arg)?),
            CtlCode::GetComplexity => Request::GetComplexity,
            CtlCode::SetBitrate => Request::SetBitrate(int_arg(arg)?),
            CtlCode::GetBitrate => Request::GetBitrate,
            CtlCode::SetSamplingRate => Request::SetSamplingRate(int_arg(arg)?),
            CtlCode::GetSamplingRate => Request::GetSamplingRate,
            CtlCode::ResetState => Request::ResetState,
            CtlCode::GetRelativeQuality => Request::GetRelativeQuality,
            CtlCode::SetDtx => Request::SetDtx(bool_arg(arg)?),
            CtlCode::GetDtx => Request::GetDtx,
            CtlCode::GetLookahead => Request::GetLookahead,
            CtlCode::GetPitchRange => Request::GetPitchRange,
            CtlCode::GetLastPitch => Request::GetLastPitch,
            CtlCode::GetLastPitchGain => Request::GetLastPitchGain,
            CtlCode::GetLostCount => Request::GetLostCount,
            CtlCode::GetPiGain => Request::GetPiGain,
            CtlCode::GetExc => Request::GetExc,
            CtlCode::GetInnov => Request::GetInnov,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::SetEnhancer(_) => "SetEnhancer",
            Request::GetEnhancer => "GetEnhancer",
            Request::GetFrameSize => "GetFrameSize",
            Request::SetQuality(_) => "SetQuality",
            Request::SetMode(_) => "SetMode",
            Request::GetMode => "GetMode",
            Request::SetLowMode(_) => "SetLowMode",
            Request::GetLowMode => "GetLowMode",
            Request::SetHighMode(_) => "SetHighMode",
            Request::GetHighMode => "GetHighMode",
            Request::SetVbr(_) => "SetVbr",
            Request::GetVbr => "GetVbr",
            Request::SetVbrQuality(_) => "SetVbrQuality",
            Request::GetVbrQuality => "GetVbrQuality",
            Request::SetComplexity(_) => "SetComplexity",
            Request::GetComplexity => "GetComplexity",
            Request::SetBitrate(_) => "SetBitrate",
            Request::GetBitrate => "GetBitrate",
            Request::SetSamplingRate(_) => "SetSamplingRate",
            Request::GetSamplingRate => "GetSamplingRate",
            Request::ResetState => "ResetState",
            Request::GetRelativeQuality => "GetRelativeQuality",
            Request::SetDtx(_) => "SetDtx",
            Request::GetDtx => "GetDtx",
            Request::GetLookahead => "GetLookahead",
            Request::GetPitchRange => "GetPitchRange",
            Request::GetLastPitch => "GetLastPitch",
            Request::GetLastPitchGain => "GetLastPitchGain",
            Request::GetLostCount => "GetLostCount",
            Request::GetPiGain => "GetPiGain",
            Request::GetExc => "GetExc",
            Request::GetInnov => "GetInnov",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_integer_codes() {
        assert_eq!(Request::from_code(4, ControlArg::Int(8)).unwrap(), Request::SetQuality(8));
        assert_eq!(Request::from_code(12, ControlArg::Int(1)).unwrap(), Request::SetVbr(true));
        assert_eq!(Request::from_code(14, ControlArg::Int(5)).unwrap(), Request::SetVbrQuality(5.0));
        assert_eq!(Request::from_code(43, ControlArg::None).unwrap(), Request::GetLastPitchGain);
    }

    #[test]
    fn rejects_unknown_codes_and_bad_arguments() {
        assert!(matches!(Request::from_code(2, ControlArg::None), Err(Error::UnsupportedControl(_))));
        assert!(matches!(Request::from_code(999, ControlArg::None), Err(Error::UnsupportedControl(_))));
        assert!(matches!(Request::from_code(4, ControlArg::None), Err(Error::InvalidArgument(_))));
        assert!(matches!(Request::from_code(12, ControlArg::Int(2)), Err(Error::InvalidArgument(_))));
    }
}

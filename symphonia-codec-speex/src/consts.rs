use num_derive::FromPrimitive;

/// Width of the wideband flag leading every frame
pub const WIDEBAND_FLAG_BITS: u32 = 1;
/// Width of the submode id following the wideband flag
pub const SUBMODE_BITS: u32 = 4;
/// Smallest number of bits that can still hold a frame header
pub const FRAME_HEADER_BITS: usize = (WIDEBAND_FLAG_BITS + SUBMODE_BITS) as usize;

/// Width of the transmitted open-loop pitch for low bit-rate pitch submodes
pub const OL_PITCH_BITS: u32 = 7;
/// Width of the forced open-loop pitch gain
pub const OL_PITCH_COEF_BITS: u32 = 4;
/// Width of the frame excitation gain
pub const OL_GAIN_BITS: u32 = 5;

/// Reserved submode ids, never valid table indices.
#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq, Eq)]
pub enum ReservedId {
    UserInband = 13,
    Inband = 14,
    Terminator = 15,
}

/// Standard inband request codes carried after a [`ReservedId::Inband`] id.
/// Codes 1 and 10 to 15 are reserved and only reach the fallback handler.
#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq, Eq, Hash)]
pub enum InbandCode {
    EnhancerRequest = 0,
    ModeRequest = 2,
    LowModeRequest = 3,
    HighModeRequest = 4,
    VbrQualityRequest = 5,
    AcknowledgeRequest = 6,
    VbrRequest = 7,
    Char = 8,
    Stereo = 9,
}

/// Payload width of an inband request, fixed by its code so that receivers
/// without a handler can skip it.
pub const fn inband_payload_bits(code: u8) -> u32 {
    match code {
        0..=1 => 1,
        2..=7 => 4,
        8..=9 => 8,
        10..=11 => 16,
        12..=13 => 32,
        _ => 64,
    }
}

/// Integer command codes of the control surface.
#[repr(i32)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq, Eq)]
pub enum CtlCode {
    SetEnh = 0,
    GetEnh = 1,
    GetFrameSize = 3,
    SetQuality = 4,
    SetMode = 6,
    GetMode = 7,
    SetLowMode = 8,
    GetLowMode = 9,
    SetHighMode = 10,
    GetHighMode = 11,
    SetVbr = 12,
    GetVbr = 13,
    SetVbrQuality = 14,
    GetVbrQuality = 15,
    SetComplexity = 16,
    GetComplexity = 17,
    SetBitrate = 18,
    GetBitrate = 19,
    SetSamplingRate = 24,
    GetSamplingRate = 25,
    ResetState = 26,
    GetRelativeQuality = 29,
    SetDtx = 34,
    GetDtx = 35,
    GetLookahead = 39,
    GetPitchRange = 40,
    GetLastPitch = 41,
    GetLostCount = 42,
    GetLastPitchGain = 43,
    GetPiGain = 100,
    GetExc = 101,
    GetInnov = 102,
}

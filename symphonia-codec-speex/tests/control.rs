mod common;

use std::sync::{Arc, Mutex};

use common::*;
use symphonia_codec_speex::consts::InbandCode;
use symphonia_codec_speex::{
    BitReader, BitWriter, ControlArg, DecodeStatus, Error, NbDecoder, NbEncoder, NbMode, Request,
    Response,
};

fn request(code: i32, arg: ControlArg) -> Request {
    Request::from_code(code, arg).unwrap()
}

#[test]
fn integer_codes_drive_the_encoder() {
    let mode = NbMode::narrowband();
    let mut enc = NbEncoder::new(mode.clone());

    assert_eq!(enc.ctl(request(3, ControlArg::None)).unwrap(), Response::Int(160));
    enc.ctl(request(4, ControlArg::Int(8))).unwrap();
    assert_eq!(enc.ctl(request(7, ControlArg::None)).unwrap(), Response::Int(5));
    assert_eq!(enc.ctl(request(19, ControlArg::None)).unwrap(), Response::Int(18000));

    // Out-of-range values leave the state alone
    assert!(matches!(enc.ctl(request(4, ControlArg::Int(11))), Err(Error::InvalidArgument(_))));
    assert!(matches!(enc.ctl(request(6, ControlArg::Int(7))), Err(Error::InvalidArgument(_))));
    assert!(matches!(enc.ctl(request(16, ControlArg::Int(-1))), Err(Error::InvalidArgument(_))));
    assert!(matches!(enc.ctl(request(14, ControlArg::Float(10.5))), Err(Error::InvalidArgument(_))));
    assert_eq!(enc.ctl(Request::GetMode).unwrap(), Response::Int(5));

    enc.ctl(request(16, ControlArg::Int(10))).unwrap();
    assert_eq!(enc.ctl(request(17, ControlArg::None)).unwrap(), Response::Int(10));
    enc.ctl(request(12, ControlArg::Int(1))).unwrap();
    assert_eq!(enc.ctl(request(13, ControlArg::None)).unwrap(), Response::Bool(true));
    enc.ctl(request(14, ControlArg::Float(6.5))).unwrap();
    assert_eq!(enc.ctl(request(15, ControlArg::None)).unwrap(), Response::Float(6.5));
    assert_eq!(enc.ctl(request(39, ControlArg::None)).unwrap(), Response::Int(80));
    assert_eq!(enc.ctl(request(40, ControlArg::None)).unwrap(), Response::Range(17, 144));

    assert!(matches!(enc.ctl(request(41, ControlArg::None)), Err(Error::UnsupportedControl(_))));
    assert!(matches!(enc.ctl(request(10, ControlArg::Int(1))), Err(Error::UnsupportedControl(_))));
    assert!(matches!(Request::from_code(5, ControlArg::None), Err(Error::UnsupportedControl(_))));
}

#[test]
fn introspection_follows_the_last_frame() {
    let mode = NbMode::narrowband();
    let mut enc = NbEncoder::new(mode.clone());
    let (packets, _) = encode(&mut enc, &harmonic(64, 3 * FRAME));

    let Response::Samples(exc) = enc.ctl(Request::GetExc).unwrap() else {
        panic!("excitation expected");
    };
    assert_eq!(exc.len(), FRAME);
    let Response::Samples(pi) = enc.ctl(Request::GetPiGain).unwrap() else {
        panic!("pi gains expected");
    };
    assert_eq!(pi.len(), 4);

    let mut dec = NbDecoder::new(mode);
    decode(&mut dec, &packets, &[]);
    let Response::Samples(dec_pi) = dec.ctl(Request::GetPiGain).unwrap() else {
        panic!("pi gains expected");
    };
    let Response::Samples(dec_exc) = dec.ctl(Request::GetExc).unwrap() else {
        panic!("excitation expected");
    };
    assert!(pi.iter().zip(&dec_pi).all(|(a, b)| (a - b).abs() < 1e-4));
    assert!(exc.iter().zip(&dec_exc).all(|(a, b)| (a - b).abs() < 1e-2));
    assert!(matches!(dec.ctl(Request::GetInnov), Err(Error::UnsupportedControl(_))));
}

#[test]
fn vbr_follows_the_signal() {
    let mode = NbMode::narrowband();
    let mut enc = NbEncoder::new(mode.clone());
    enc.ctl(Request::SetVbr(true)).unwrap();
    enc.ctl(Request::SetVbrQuality(8.0)).unwrap();

    let mut signal = harmonic(60, 15 * FRAME);
    signal.extend(noise(3, 15 * FRAME, 20.0));
    let mut submodes = Vec::new();
    let mut packets = Vec::new();
    for frame in signal.chunks_exact(FRAME) {
        let mut bits = BitWriter::new();
        enc.encode(frame, &mut bits).unwrap();
        assert_eq!(bits.len() as u32, mode.bits_per_frame(enc.submode()).unwrap());
        submodes.push(enc.submode());
        bits.insert_terminator();
        packets.push(bits.into_bytes());
    }
    let loud = submodes[5..15].iter().sum::<usize>();
    let quiet = submodes[20..].iter().sum::<usize>();
    assert!(loud > quiet, "{:?}", submodes);
    assert!(submodes.iter().all(|id| *id > 0), "silence sent without DTX: {:?}", submodes);

    let decoded = decode(&mut NbDecoder::new(mode), &packets, &[]);
    assert_eq!(decoded.len(), 30);
}

#[test]
fn dtx_sends_silence_frames() {
    let mode = NbMode::narrowband();
    let mut enc = NbEncoder::new(mode.clone());
    enc.ctl(Request::SetVbr(true)).unwrap();
    enc.ctl(Request::SetDtx(true)).unwrap();
    assert_eq!(enc.ctl(Request::GetDtx).unwrap(), Response::Bool(true));

    let (packets, _) = encode(&mut enc, &vec![0.0f32; 60 * FRAME]);
    let silent = packets.iter().filter(|p| p.len() == 1).count();
    assert!(silent > 0);

    let decoded = decode(&mut NbDecoder::new(mode), &packets, &[]);
    assert!(decoded.iter().all(|f| f.iter().all(|x| x.is_finite())));
}

#[test]
fn inband_signaling_reaches_handlers() {
    let mode = NbMode::narrowband();
    let mut enc = NbEncoder::new(mode.clone());
    let mut bits = BitWriter::new();
    enc.write_inband_request(InbandCode::ModeRequest as u8, 4, &mut bits).unwrap();
    enc.write_inband_request(InbandCode::Stereo as u8, 0x7f, &mut bits).unwrap();
    enc.write_inband_request(12, 0xdead_beef, &mut bits).unwrap();
    enc.write_user_inband(b"speex", &mut bits).unwrap();
    enc.encode(&harmonic(50, FRAME), &mut bits).unwrap();
    bits.insert_terminator();
    let stream = bits.into_bytes();

    let modes = Arc::new(Mutex::new(Vec::new()));
    let unknown = Arc::new(Mutex::new(Vec::new()));
    let user = Arc::new(Mutex::new(Vec::new()));

    let mut dec = NbDecoder::new(mode);
    let m = modes.clone();
    dec.inband_mut()
        .register(InbandCode::ModeRequest, Box::new(move |_: u8, p: u64| m.lock().unwrap().push(p)));
    let u = unknown.clone();
    dec.inband_mut()
        .set_fallback(Box::new(move |c: u8, p: u64| u.lock().unwrap().push((c, p))));
    let d = user.clone();
    dec.inband_mut()
        .set_user_handler(Box::new(move |data: &[u8]| d.lock().unwrap().extend_from_slice(data)));

    let mut reader = BitReader::new(&stream);
    let mut out = vec![0.0f32; FRAME];
    assert_eq!(dec.decode(Some(&mut reader), &mut out).unwrap(), DecodeStatus::Decoded);
    assert_eq!(dec.decode(Some(&mut reader), &mut out).unwrap(), DecodeStatus::EndOfStream);

    assert_eq!(*modes.lock().unwrap(), vec![4]);
    assert_eq!(*unknown.lock().unwrap(), vec![(InbandCode::Stereo as u8, 0x7f), (12, 0xdead_beef)]);
    assert_eq!(&user.lock().unwrap()[..], b"speex");
}

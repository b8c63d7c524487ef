//! Inband signaling carried between frames.

use std::collections::HashMap;

use log::debug;
use num_traits::FromPrimitive;

use crate::bits::BitReader;
use crate::consts::{inband_payload_bits, InbandCode};
use crate::errors::Result;

/// Receives inband requests with their raw 4-bit code. Whatever the handler
/// does, the frame that follows is decoded.
pub trait InbandHandler: Send + Sync {
    fn handle(&self, code: u8, payload: u64);
}

impl<F> InbandHandler for F
where
    F: Fn(u8, u64) + Send + Sync,
{
    fn handle(&self, code: u8, payload: u64) {
        self(code, payload)
    }
}

/// Receives user inband data.
pub trait UserInbandHandler: Send + Sync {
    fn handle(&self, data: &[u8]);
}

impl<F> UserInbandHandler for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn handle(&self, data: &[u8]) {
        self(data)
    }
}

/// Handler that skips what it receives.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreInband;

impl InbandHandler for IgnoreInband {
    fn handle(&self, code: u8, payload: u64) {
        debug!("speex: ignoring inband request {} ({})", code, payload);
    }
}

impl UserInbandHandler for IgnoreInband {
    fn handle(&self, data: &[u8]) {
        debug!("speex: ignoring {} bytes of user inband data", data.len());
    }
}

pub struct InbandRegistry {
    handlers: HashMap<InbandCode, Box<dyn InbandHandler>>,
    fallback: Box<dyn InbandHandler>,
    user: Box<dyn UserInbandHandler>,
}

impl Default for InbandRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Box::new(IgnoreInband),
            user: Box::new(IgnoreInband),
        }
    }
}

impl std::fmt::Debug for InbandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InbandRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InbandRegistry {
    pub fn register(&mut self, code: InbandCode, handler: Box<dyn InbandHandler>) {
        self.handlers.insert(code, handler);
    }

    /// Handler for reserved codes and codes nobody registered.
    pub fn set_fallback(&mut self, handler: Box<dyn InbandHandler>) {
        self.fallback = handler;
    }

    pub fn set_user_handler(&mut self, handler: Box<dyn UserInbandHandler>) {
        self.user = handler;
    }

    /// Read the code and payload following an inband id and dispatch them.
    pub fn dispatch(&self, bits: &mut BitReader) -> Result<()> {
        let raw = bits.read(4)? as u8;
        let payload = bits.read_u64(inband_payload_bits(raw))?;
        match InbandCode::from_u8(raw).and_then(|code| self.handlers.get(&code)) {
            Some(handler) => handler.handle(raw, payload),
            None => self.fallback.handle(raw, payload),
        }
        Ok(())
    }

    /// Read the user data following a user inband id and pass it on.
    pub fn dispatch_user(&self, bits: &mut BitReader) -> Result<()> {
        let len = bits.read(4)? as usize;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(bits.read(8)? as u8);
        }
        self.user.handle(&data);
        Ok(())
    }
}

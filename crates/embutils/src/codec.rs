//! Item serialization and stream framing.
//!
//! [`Serialized`] turns an item into raw bytes and back. A [`StreamCodec`]
//! adds the framing needed to pull one item at a time out of a byte stream.

use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::cobs;
use crate::error::Result;
use crate::serial::Device;

/// Frame delimiter used by [`CobsCodec`].
pub const COBS_DELIMITER: u8 = 0x00;

/// Upper bound on the bytes read while looking for a delimiter.
const MAX_FRAME_BYTES: usize = 4096;

/// Items with a raw byte representation.
pub trait Serialized: Sized {
    /// Raw bytes of the item.
    fn serialize(&self) -> Vec<u8>;

    /// Rebuild an item from raw bytes. `None` when the bytes are not a valid
    /// item.
    fn deserialize(data: &[u8]) -> Option<Self>;
}

/// Framing of items on a byte stream.
pub trait StreamCodec: Send + Sync + 'static {
    /// Item type carried by the stream.
    type Item: Clone + Send + fmt::Debug + 'static;

    /// Bytes to write for `item`, framing included.
    fn encode(&self, item: &Self::Item) -> Vec<u8>;

    /// Decode one framed item.
    fn decode(&self, data: &[u8]) -> Option<Self::Item>;

    /// Read at most one item from `device`.
    ///
    /// Returns `Ok(None)` when nothing valid was available.
    ///
    /// # Errors
    ///
    /// Returns an error only when the device connection fails.
    fn decode_stream(&self, device: &Device) -> Result<Option<Self::Item>>;
}

/// COBS framing with a zero delimiter after every item.
pub struct CobsCodec<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> CobsCodec<T> {
    /// Create the codec.
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for CobsCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CobsCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CobsCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CobsCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> StreamCodec for CobsCodec<T>
where
    T: Serialized + Clone + Send + fmt::Debug + 'static,
{
    type Item = T;

    fn encode(&self, item: &T) -> Vec<u8> {
        let mut data = cobs::encode(&item.serialize());
        data.push(COBS_DELIMITER);
        data
    }

    fn decode(&self, data: &[u8]) -> Option<T> {
        let data = data.strip_suffix(&[COBS_DELIMITER]).unwrap_or(data);
        match cobs::decode(data) {
            Ok(raw) => T::deserialize(&raw),
            Err(e) => {
                trace!(error = %e, len = data.len(), "Dropping undecodable frame");
                None
            }
        }
    }

    fn decode_stream(&self, device: &Device) -> Result<Option<T>> {
        let first = device.read(1)?;
        match first.first() {
            None | Some(&COBS_DELIMITER) => return Ok(None),
            Some(_) => {}
        }

        let mut frame = first;
        frame.extend(device.read_until(&[COBS_DELIMITER], Some(MAX_FRAME_BYTES))?);
        if frame.last() != Some(&COBS_DELIMITER) {
            trace!(len = frame.len(), "Incomplete frame");
            return Ok(None);
        }

        let item = self.decode(&frame);
        if item.is_none() {
            trace!(raw = %hex::encode(&frame), "Frame did not deserialize");
        }
        Ok(item)
    }
}

//! Conversion between application content and the opaque payload bytes
//! stored in each entry record.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::error::{LogError, LogResult};

pub trait ContentMarshal<C>: Send + Sync {
    /// Append the encoded form of `content` to `sink`.
    fn marshal(&self, content: &C, sink: &mut Vec<u8>) -> LogResult<()>;

    /// Decode one content value from exactly `source`.
    fn unmarshal(&self, source: &[u8]) -> LogResult<C>;
}

/// Marshal backed by serde + bincode's standard configuration.
pub struct BincodeMarshal<C> {
    _content: PhantomData<fn() -> C>,
}

impl<C> BincodeMarshal<C> {
    pub fn new() -> Self {
        Self {
            _content: PhantomData,
        }
    }
}

impl<C> Default for BincodeMarshal<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ContentMarshal<C> for BincodeMarshal<C>
where
    C: Serialize + DeserializeOwned,
{
    fn marshal(&self, content: &C, sink: &mut Vec<u8>) -> LogResult<()> {
        bincode::serde::encode_into_std_write(content, sink, bincode::config::standard())
            .map_err(|e| {
                warn!("Failed to encode log content: {}", e);
                LogError::Marshal(e.to_string())
            })?;
        Ok(())
    }

    fn unmarshal(&self, source: &[u8]) -> LogResult<C> {
        let (content, _) =
            bincode::serde::decode_from_slice(source, bincode::config::standard()).map_err(
                |e| {
                    warn!("Failed to decode log content: {}", e);
                    LogError::Marshal(e.to_string())
                },
            )?;
        Ok(content)
    }
}

/// Stores raw byte payloads untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesMarshal;

impl ContentMarshal<Vec<u8>> for BytesMarshal {
    fn marshal(&self, content: &Vec<u8>, sink: &mut Vec<u8>) -> LogResult<()> {
        sink.extend_from_slice(content);
        Ok(())
    }

    fn unmarshal(&self, source: &[u8]) -> LogResult<Vec<u8>> {
        Ok(source.to_vec())
    }
}

//! The seam between the turn driver and the network.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;
use crate::types::{StreamFrame, StreamRequest};

/// Frames of one turn, in wire order.
///
/// Dropping the stream abandons the underlying connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame>> + Send>>;

/// Something that can run one streaming chat turn.
///
/// `open_stream` resolves once the response headers are in.  An `Err` here
/// means the turn never started streaming: a transport failure, a generic
/// HTTP failure, or the payment-required gate.  Errors yielded by the
/// returned stream are transport failures mid-turn.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &StreamRequest) -> Result<FrameStream>;
}

//! Broker-agnostic outcome of handling one delivery (spec §4.2, §7).

use judge_common::wire::ReplyMessage;

/// What the consumer layer should do with the delivery that produced this.
///
/// The Handler never touches the broker itself — it only decides. `AckOnly`
/// is reserved for the consumer's own housekeeping deliveries (e.g. a
/// malformed message it chooses not to reply to) and is never constructed
/// here.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Ack the delivery and publish `reply` to its `replyTo`.
    AckAndReply(ReplyMessage),
    /// Nack the delivery with requeue; a transient failure, try again.
    Requeue,
    /// Ack the delivery with no reply.
    AckOnly,
}

use futures_util::{Sink, SinkExt};

use crate::ws::{
    client::Handler,
    message::NormalizedMessage,
    packet::{Packet, PacketStreamError, Receive},
};

/// Ack a receive packet, then hand its message to the handler.
///
/// The ack is sent whether or not the payload decodes, a bad payload must not
/// cause redelivery. No deduplication by message id.
pub(crate) async fn dispatch<S>(
    sink: &mut S,
    handler: &dyn Handler,
    receive: Receive,
) -> Result<(), PacketStreamError>
where
    S: Sink<Packet, Error = PacketStreamError> + Unpin,
{
    log::trace!(
        "Received message {} seq {} from {}",
        receive.message_id,
        receive.message_seq,
        receive.from_uid
    );

    let acked = sink.send(Packet::ReceiveAck(receive.ack())).await;
    if let Err(ref err) = acked {
        log::debug!("Send ack of message {} failed: {}", receive.message_id, err);
    }

    match NormalizedMessage::from_receive(&receive) {
        Ok(message) => handler.on_message(message),
        Err(err) => {
            log::warn!(
                "Drop message {} with undecodable payload: {}",
                receive.message_id,
                err
            );
        }
    }

    acked
}

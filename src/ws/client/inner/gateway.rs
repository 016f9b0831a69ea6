use super::{handshake::ClientStateHandshake, ClientInner};
use crate::ws::client::{ConnectGatewayError, Connector, GatewayUrl};

#[derive(Debug)]
pub(crate) struct ClientStateGateway<'a> {
    pub gateway: &'a GatewayUrl,
}

impl ClientInner<ClientStateGateway<'_>> {
    pub async fn connect<C: Connector>(
        self,
        connector: &C,
    ) -> Result<ClientInner<ClientStateHandshake<C::Transport>>, ConnectGatewayError> {
        log::debug!("Connecting gateway: {}", self.state.gateway);

        let transport = connector.connect(self.state.gateway).await?;

        log::debug!("Move to handshake state");

        Ok(ClientInner {
            state: ClientStateHandshake { transport },
        })
    }
}

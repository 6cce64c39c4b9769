// WebSocket transport: shared gateway state plus the axum router that
// upgrades `/ws` requests into broker sessions.
use crate::config::GatewayConfig;
use crate::connection;
use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use courier_auth::CraAuthenticator;
use courier_broker::{BrokerRouter, EventMessenger, ProcedureTable, SessionChannels};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct GatewayState {
    pub(crate) router: Arc<BrokerRouter>,
    pub(crate) procedures: Arc<ProcedureTable>,
    pub(crate) channels: Arc<SessionChannels>,
}

impl GatewayState {
    pub fn new(
        router: Arc<BrokerRouter>,
        procedures: Arc<ProcedureTable>,
        channels: Arc<SessionChannels>,
    ) -> Self {
        Self {
            router,
            procedures,
            channels,
        }
    }

    /// Builds the engine from configuration. Only the reserved CRA
    /// procedures are callable on the returned table.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let settings = config.broker_settings()?;
        let procedures = ProcedureTable::new(
            &settings,
            CraAuthenticator::new(Arc::new(config.cra_secrets.clone())),
        );
        Ok(Self::with_procedures(config, settings, procedures))
    }

    /// Like [`GatewayState::from_config`] with a caller-populated table.
    pub fn with_procedures(
        config: &GatewayConfig,
        settings: courier_common::BrokerSettings,
        procedures: ProcedureTable,
    ) -> Self {
        let channels = Arc::new(SessionChannels::new(config.outbound_queue_capacity));
        let router = Arc::new(BrokerRouter::new(settings, channels.clone()));
        Self::new(router, Arc::new(procedures), channels)
    }

    pub fn router(&self) -> &BrokerRouter {
        &self.router
    }

    pub fn channels(&self) -> &SessionChannels {
        &self.channels
    }

    pub fn messenger(&self) -> EventMessenger {
        EventMessenger::new(Arc::clone(&self.router))
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: GatewayState) -> std::io::Result<()> {
    axum::serve(listener, build_router(state).into_make_service()).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}
